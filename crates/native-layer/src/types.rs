//! Core types shared across the native boundary.

/// Detected platform the native layer runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Android,
    Ios,
    /// In-process stand-in for a device.
    Simulated,
    Unsupported,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Android => write!(f, "Android"),
            Platform::Ios => write!(f, "iOS"),
            Platform::Simulated => write!(f, "Simulated"),
            Platform::Unsupported => write!(f, "Unsupported"),
        }
    }
}

/// A native feature area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Update,
    Permission,
    Picker,
    Share,
    Dialog,
    Device,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Update,
        Capability::Permission,
        Capability::Picker,
        Capability::Share,
        Capability::Dialog,
        Capability::Device,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Capability::Update => "update",
            Capability::Permission => "permission",
            Capability::Picker => "picker",
            Capability::Share => "share",
            Capability::Dialog => "dialog",
            Capability::Device => "device",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tag carried by every inbound native message: which outcome of which
/// capability this occurrence reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackTag {
    /// `(available: bool, type_allowed: bool)`
    UpdateAvailable,
    /// `(version_code: int)`
    UpdateVersionCode,
    /// `(days: int)`
    UpdateStalenessDays,
    /// `(install_status: int)`
    UpdateInstallState,
    /// `(bytes_downloaded: long, bytes_total: long)`
    UpdateDownloading,
    /// `(code: int, message: string)`
    UpdateError,
    /// `(permissions: string[], all: bool)`
    PermissionGranted,
    /// `(permissions: string[])`
    PermissionDenied,
    /// `(message: string)`
    PermissionError,
    /// `(status: bool, message_or_json: string, error_code: int)`
    ImagePicked,
    /// `(positive: bool)`
    DialogClicked,
    /// `(value: string)`
    ValueSelected,
}

impl CallbackTag {
    pub const ALL: [CallbackTag; 12] = [
        CallbackTag::UpdateAvailable,
        CallbackTag::UpdateVersionCode,
        CallbackTag::UpdateStalenessDays,
        CallbackTag::UpdateInstallState,
        CallbackTag::UpdateDownloading,
        CallbackTag::UpdateError,
        CallbackTag::PermissionGranted,
        CallbackTag::PermissionDenied,
        CallbackTag::PermissionError,
        CallbackTag::ImagePicked,
        CallbackTag::DialogClicked,
        CallbackTag::ValueSelected,
    ];

    /// The capability whose invocations emit this outcome.
    pub fn capability(self) -> Capability {
        match self {
            CallbackTag::UpdateAvailable
            | CallbackTag::UpdateVersionCode
            | CallbackTag::UpdateStalenessDays
            | CallbackTag::UpdateInstallState
            | CallbackTag::UpdateDownloading
            | CallbackTag::UpdateError => Capability::Update,
            CallbackTag::PermissionGranted
            | CallbackTag::PermissionDenied
            | CallbackTag::PermissionError => Capability::Permission,
            CallbackTag::ImagePicked => Capability::Picker,
            CallbackTag::DialogClicked | CallbackTag::ValueSelected => Capability::Dialog,
        }
    }

    /// Channel name used for this outcome.
    pub fn name(self) -> &'static str {
        match self {
            CallbackTag::UpdateAvailable => "update-available",
            CallbackTag::UpdateVersionCode => "update-version-code",
            CallbackTag::UpdateStalenessDays => "update-staleness-days",
            CallbackTag::UpdateInstallState => "update-install-state",
            CallbackTag::UpdateDownloading => "update-downloading",
            CallbackTag::UpdateError => "update-error",
            CallbackTag::PermissionGranted => "permission-granted",
            CallbackTag::PermissionDenied => "permission-denied",
            CallbackTag::PermissionError => "permission-error",
            CallbackTag::ImagePicked => "image-picked",
            CallbackTag::DialogClicked => "dialog-clicked",
            CallbackTag::ValueSelected => "value-selected",
        }
    }
}

impl std::fmt::Display for CallbackTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A primitive argument as delivered by the native layer.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Str(String),
    StrList(Vec<String>),
}

impl NativeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            NativeValue::Int(i) => Some(*i),
            NativeValue::Long(l) => i32::try_from(*l).ok(),
            _ => None,
        }
    }

    /// Widening accessor: an `Int` is accepted where a `Long` is expected.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            NativeValue::Int(i) => Some(i64::from(*i)),
            NativeValue::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// A null list is reported by some platforms when nothing matched.
    pub fn as_str_list(&self) -> Option<Vec<String>> {
        match self {
            NativeValue::StrList(list) => Some(list.clone()),
            NativeValue::Null => Some(Vec::new()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NativeValue::Null => "null",
            NativeValue::Bool(_) => "bool",
            NativeValue::Int(_) => "int",
            NativeValue::Long(_) => "long",
            NativeValue::Str(_) => "string",
            NativeValue::StrList(_) => "string[]",
        }
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        NativeValue::Bool(value)
    }
}

impl From<i32> for NativeValue {
    fn from(value: i32) -> Self {
        NativeValue::Int(value)
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        NativeValue::Long(value)
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        NativeValue::Str(value.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        NativeValue::Str(value)
    }
}

impl From<Vec<String>> for NativeValue {
    fn from(value: Vec<String>) -> Self {
        NativeValue::StrList(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tag_maps_to_a_callback_capability() {
        for tag in CallbackTag::ALL {
            assert!(!matches!(
                tag.capability(),
                Capability::Share | Capability::Device
            ));
        }
        let mut names: Vec<_> = CallbackTag::ALL.iter().map(|t| t.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), CallbackTag::ALL.len());
    }

    #[test]
    fn long_accessor_widens_ints() {
        assert_eq!(NativeValue::Int(7).as_long(), Some(7));
        assert_eq!(NativeValue::Long(i64::MAX).as_int(), None);
        assert_eq!(NativeValue::Null.as_str_list(), Some(Vec::new()));
        assert_eq!(NativeValue::Str("x".into()).as_bool(), None);
    }
}
