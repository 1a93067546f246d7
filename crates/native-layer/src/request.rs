//! Typed requests handed to the native layer.
//!
//! Each capability has one configuration struct. Configurations are plain
//! values: they are validated once before firing and then frozen inside the
//! [`NativeRequest`] that crosses the boundary.

use crate::types::Capability;
use std::collections::BTreeSet;

/// Where an app update comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateMode {
    #[default]
    PlayStore,
    ThirdParty,
}

impl UpdateMode {
    pub fn code(self) -> i32 {
        match self {
            UpdateMode::PlayStore => 0,
            UpdateMode::ThirdParty => 1,
        }
    }
}

/// How the update flow is presented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateType {
    #[default]
    Flexible,
    Immediate,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateConfig {
    pub mode: UpdateMode,
    pub update_type: UpdateType,
    /// Download link, required for third-party updates.
    pub link: Option<String>,
}

impl UpdateConfig {
    pub fn validate(&self) -> Result<(), String> {
        match (&self.mode, &self.link) {
            (UpdateMode::ThirdParty, None) => {
                Err("third-party update requires a download link".to_string())
            }
            (_, Some(link)) if link.trim().is_empty() => {
                Err("update link can't be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Steps of the update flow. `Check` starts a session; the remaining steps
/// are issued against that session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStep {
    Check,
    Start,
    Complete,
    /// Pick up a download left pending by a previous run.
    Resume,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionConfig {
    pub names: BTreeSet<String>,
}

impl PermissionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.names.is_empty() {
            return Err("no permissions requested".to_string());
        }
        if self.names.iter().any(|n| n.trim().is_empty()) {
            return Err("permission name can't be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PickerSource {
    /// Let the user choose between camera and gallery.
    #[default]
    Choice,
    Camera,
    Gallery,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickerConfig {
    pub source: PickerSource,
    pub max_width: u32,
    pub max_height: u32,
    /// Compression quality, 1..=100.
    pub quality: u8,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            source: PickerSource::Choice,
            max_width: 612,
            max_height: 816,
            quality: 80,
        }
    }
}

impl PickerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(format!(
                "picker bounds must be positive, got {}x{}",
                self.max_width, self.max_height
            ));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(format!(
                "picker quality must be in 1..=100, got {}",
                self.quality
            ));
        }
        Ok(())
    }
}

/// A file attached to a share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShareFile {
    Path(String),
    Uri(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ShareKind {
    #[default]
    Text,
    /// One or more attached files.
    Files,
    WhatsApp {
        phone: Option<String>,
    },
    Email {
        subject: String,
        html: bool,
        to: Vec<String>,
        cc: Vec<String>,
        bcc: Vec<String>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShareConfig {
    pub message: String,
    /// Chooser header text.
    pub header: Option<String>,
    pub files: Vec<ShareFile>,
    pub kind: ShareKind,
}

impl ShareConfig {
    pub fn validate(&self) -> Result<(), String> {
        if matches!(self.kind, ShareKind::Files) && self.files.is_empty() {
            return Err("file share needs at least one file".to_string());
        }
        let empty_file = self.files.iter().any(|f| match f {
            ShareFile::Path(p) | ShareFile::Uri(p) => p.trim().is_empty(),
        });
        if empty_file {
            return Err("shared file path can't be empty".to_string());
        }
        if let ShareKind::Email { to, cc, bcc, .. } = &self.kind {
            if to.iter().chain(cc).chain(bcc).any(|a| !a.contains('@')) {
                return Err("invalid e-mail recipient".to_string());
            }
        }
        Ok(())
    }
}

/// Dialogs and transient UI owned by the native layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogConfig {
    Alert {
        title: String,
        message: String,
        positive: String,
    },
    Confirm {
        title: String,
        message: String,
        positive: String,
        negative: String,
    },
    TimePicker {
        /// `(hour, minute)`; current time when absent.
        initial: Option<(u32, u32)>,
        is_24_hour: bool,
    },
    DatePicker {
        /// `(year, month 1..=12, day)`; today when absent.
        initial: Option<(i32, u32, u32)>,
    },
    Progress {
        title: String,
        message: String,
        cancelable: bool,
    },
    DismissProgress,
    Toast {
        message: String,
        long: bool,
    },
}

impl DialogConfig {
    /// Whether the native layer reports back for this dialog.
    pub fn expects_callback(&self) -> bool {
        matches!(
            self,
            DialogConfig::Alert { .. }
                | DialogConfig::Confirm { .. }
                | DialogConfig::TimePicker { .. }
                | DialogConfig::DatePicker { .. }
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            DialogConfig::TimePicker {
                initial: Some((hour, minute)),
                ..
            } if *hour > 23 || *minute > 59 => {
                Err(format!("invalid initial time {hour}:{minute:02}"))
            }
            DialogConfig::DatePicker {
                initial: Some((_, month, day)),
            } if !(1..=12).contains(month) || !(1..=31).contains(day) => {
                Err(format!("invalid initial date {month}/{day}"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceAction {
    OpenSettings,
    EnableLocation,
}

/// One native invocation. The capability is fixed by the variant, so routing
/// never depends on method names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeRequest {
    Update { step: UpdateStep, config: UpdateConfig },
    Permission(PermissionConfig),
    Picker(PickerConfig),
    Share(ShareConfig),
    Dialog(DialogConfig),
    Device(DeviceAction),
}

impl NativeRequest {
    pub fn capability(&self) -> Capability {
        match self {
            NativeRequest::Update { .. } => Capability::Update,
            NativeRequest::Permission(_) => Capability::Permission,
            NativeRequest::Picker(_) => Capability::Picker,
            NativeRequest::Share(_) => Capability::Share,
            NativeRequest::Dialog(_) => Capability::Dialog,
            NativeRequest::Device(_) => Capability::Device,
        }
    }

    pub fn expects_callback(&self) -> bool {
        match self {
            NativeRequest::Update { .. }
            | NativeRequest::Permission(_)
            | NativeRequest::Picker(_) => true,
            NativeRequest::Dialog(dialog) => dialog.expects_callback(),
            NativeRequest::Share(_) | NativeRequest::Device(_) => false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            NativeRequest::Update { config, .. } => config.validate(),
            NativeRequest::Permission(config) => config.validate(),
            NativeRequest::Picker(config) => config.validate(),
            NativeRequest::Share(config) => config.validate(),
            NativeRequest::Dialog(config) => config.validate(),
            NativeRequest::Device(_) => Ok(()),
        }
    }
}

/// Synchronous questions answered by the native layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeQuery {
    CheckPermission(String),
    PermissionRationale(String),
    DeviceRooted,
}

impl NativeQuery {
    /// Answer used when no native layer is present.
    pub fn inert_answer(&self) -> bool {
        match self {
            NativeQuery::CheckPermission(_) | NativeQuery::PermissionRationale(_) => true,
            NativeQuery::DeviceRooted => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_party_update_needs_link() {
        let mut config = UpdateConfig {
            mode: UpdateMode::ThirdParty,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.link = Some("  ".into());
        assert!(config.validate().is_err());
        config.link = Some("https://example.com/app.apk".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn picker_bounds_and_quality() {
        assert!(PickerConfig::default().validate().is_ok());
        let zero_width = PickerConfig {
            max_width: 0,
            ..Default::default()
        };
        assert!(zero_width.validate().is_err());
        for quality in [0u8, 101] {
            let config = PickerConfig {
                quality,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "quality {quality}");
        }
    }

    #[test]
    fn share_and_dialog_callbacks() {
        let share = NativeRequest::Share(ShareConfig::default());
        assert!(!share.expects_callback());
        let toast = NativeRequest::Dialog(DialogConfig::Toast {
            message: "hi".into(),
            long: false,
        });
        assert!(!toast.expects_callback());
        let picker = NativeRequest::Dialog(DialogConfig::DatePicker { initial: None });
        assert!(picker.expects_callback());
        assert_eq!(picker.capability(), Capability::Dialog);
    }

    #[test]
    fn email_recipients_are_checked() {
        let config = ShareConfig {
            message: "report".into(),
            kind: ShareKind::Email {
                subject: "Weekly".into(),
                html: false,
                to: vec!["nobody".into()],
                cc: Vec::new(),
                bcc: Vec::new(),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
