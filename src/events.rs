//! Typed events published on the bus, one type per native outcome.
//!
//! Payloads are decoded and validated on the native callback thread; only
//! well-formed values ever reach a channel.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Identifies one native invocation. Every event produced by that invocation
/// carries the same id, so overlapping invocations can be told apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An event as delivered to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery<T> {
    pub token: TokenId,
    pub payload: T,
}

impl<T> Deref for Delivery<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.payload
    }
}

// ============================================================================
// Update
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateAvailability {
    pub available: bool,
    /// The requested update type is allowed by the store.
    pub type_allowed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionCode(pub i32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StalenessDays(pub i32);

/// Install status as reported by the store's update service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallStatus {
    Unknown,
    Pending,
    Downloading,
    Installing,
    Installed,
    Failed,
    Canceled,
    Downloaded,
}

impl InstallStatus {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => InstallStatus::Unknown,
            1 => InstallStatus::Pending,
            2 => InstallStatus::Downloading,
            3 => InstallStatus::Installing,
            4 => InstallStatus::Installed,
            5 => InstallStatus::Failed,
            6 => InstallStatus::Canceled,
            11 => InstallStatus::Downloaded,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        match self {
            InstallStatus::Unknown => 0,
            InstallStatus::Pending => 1,
            InstallStatus::Downloading => 2,
            InstallStatus::Installing => 3,
            InstallStatus::Installed => 4,
            InstallStatus::Failed => 5,
            InstallStatus::Canceled => 6,
            InstallStatus::Downloaded => 11,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstallState(pub InstallStatus);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes_downloaded: i64,
    pub bytes_total: i64,
}

impl DownloadProgress {
    /// Whole percent, 0 when the total is unknown.
    pub fn percent(&self) -> u8 {
        if self.bytes_total <= 0 {
            return 0;
        }
        let pct = self.bytes_downloaded.clamp(0, self.bytes_total) * 100 / self.bytes_total;
        pct as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateFailure {
    pub code: i32,
    pub message: String,
}

// ============================================================================
// Permission
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionsGranted {
    pub permissions: Vec<String>,
    /// Every requested permission was granted.
    pub all: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionsDenied {
    pub permissions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionFailure {
    pub message: String,
}

// ============================================================================
// Picker
// ============================================================================

/// Picked image, as described by the native layer's JSON payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    /// Decoded bounds; -1 when the native side couldn't read them.
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub orientation: i32,
    pub uri: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub cache_file_path: Option<String>,
    /// Inline image bytes, when the native side was asked for them.
    #[serde(default, rename = "imageBase64")]
    pub base64: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickerErrorCode {
    PermissionFailed,
    FileNotReadable,
    Internal,
    FileCantCreate,
    Other(i32),
}

impl PickerErrorCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => PickerErrorCode::PermissionFailed,
            2 => PickerErrorCode::FileNotReadable,
            4 => PickerErrorCode::Internal,
            5 => PickerErrorCode::FileCantCreate,
            other => PickerErrorCode::Other(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickerFailure {
    pub code: PickerErrorCode,
    pub message: String,
}

/// Outcome of one picker invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePicked {
    pub result: Result<ImageData, PickerFailure>,
}

// ============================================================================
// Dialog
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DialogClicked {
    pub positive: bool,
}

/// Value chosen in a time or date picker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectedValue {
    Time(NaiveTime),
    Date(NaiveDate),
}

impl fmt::Display for SelectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectedValue::Time(t) => write!(f, "{}", t.format("%H:%M")),
            SelectedValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueSelected(pub SelectedValue);
