//! Simulated native backend.
//!
//! Answers every request from a [`Script`] on a freshly spawned thread, the
//! way a device answers from its own callback threads. Used by the demo host
//! and by tests; it never touches real platform APIs.

use crate::backend::{CallbackSink, NativeBackend};
use crate::error::NativeError;
use crate::request::{
    DeviceAction, DialogConfig, NativeQuery, NativeRequest, PickerConfig, PickerSource,
    UpdateStep,
};
use crate::types::{CallbackTag, NativeValue, Platform};
use log::{debug, info};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Install status codes as reported by the store's update service.
pub mod install_status {
    pub const PENDING: i32 = 1;
    pub const DOWNLOADING: i32 = 2;
    pub const INSTALLING: i32 = 3;
    pub const INSTALLED: i32 = 4;
    pub const DOWNLOADED: i32 = 11;
}

type Signal = (CallbackTag, Vec<NativeValue>);

/// Canned answers of the simulated device.
#[derive(Clone, Debug)]
pub struct Script {
    pub update_available: bool,
    pub update_type_allowed: bool,
    pub version_code: i32,
    pub staleness_days: i32,
    pub download_total_bytes: i64,
    pub download_chunks: u32,
    /// Permissions the simulated user refuses.
    pub denied_permissions: BTreeSet<String>,
    pub rooted: bool,
    /// `(error_code, message)` reported instead of a picked image.
    pub picker_error: Option<(i32, String)>,
    /// Size of the image "on disk" before scaling to the picker bounds.
    pub image_size: (u32, u32),
    /// Button pressed on confirmation dialogs.
    pub confirm_positive: bool,
    pub selected_time: (u32, u32),
    pub selected_date: (i32, u32, u32),
    /// Pause before each callback.
    pub callback_delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            update_available: true,
            update_type_allowed: true,
            version_code: 42,
            staleness_days: 3,
            download_total_bytes: 4 * 1024 * 1024,
            download_chunks: 4,
            denied_permissions: BTreeSet::new(),
            rooted: false,
            picker_error: None,
            image_size: (3024, 4032),
            confirm_positive: true,
            selected_time: (9, 30),
            selected_date: (2024, 5, 17),
            callback_delay: Duration::from_millis(5),
        }
    }
}

/// Simulated native backend.
pub struct SimulatedBackend {
    script: Script,
    logging: AtomicBool,
    shut_down: AtomicBool,
    downloaded: AtomicBool,
    invocations: AtomicUsize,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::with_script(Script::default())
    }

    pub fn with_script(script: Script) -> Self {
        Self {
            script,
            logging: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            downloaded: AtomicBool::new(false),
            invocations: AtomicUsize::new(0),
        }
    }

    /// Number of invocations accepted so far.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn log(&self, message: &str) {
        if self.logging.load(Ordering::Relaxed) {
            info!("[simulated] {}", message);
        } else {
            debug!("[simulated] {}", message);
        }
    }

    fn respond(&self, request: &NativeRequest) -> Vec<Signal> {
        match request {
            NativeRequest::Update { step, .. } => self.respond_update(*step),
            NativeRequest::Permission(config) => self.respond_permission(&config.names),
            NativeRequest::Picker(config) => vec![self.respond_picker(config)],
            NativeRequest::Dialog(dialog) => self.respond_dialog(dialog),
            NativeRequest::Share(share) => {
                self.log(&format!("share {:?} with {} file(s)", share.kind, share.files.len()));
                Vec::new()
            }
            NativeRequest::Device(action) => {
                if *action == DeviceAction::EnableLocation {
                    self.log("location settings requested");
                }
                Vec::new()
            }
        }
    }

    fn respond_update(&self, step: UpdateStep) -> Vec<Signal> {
        let s = &self.script;
        match step {
            UpdateStep::Check => {
                let mut signals = vec![(
                    CallbackTag::UpdateAvailable,
                    vec![s.update_available.into(), s.update_type_allowed.into()],
                )];
                if s.update_available {
                    signals.push((CallbackTag::UpdateVersionCode, vec![s.version_code.into()]));
                    signals.push((
                        CallbackTag::UpdateStalenessDays,
                        vec![s.staleness_days.into()],
                    ));
                }
                signals
            }
            UpdateStep::Start if !s.update_available => vec![update_error(
                "startUpdate() : Error : no update available",
            )],
            UpdateStep::Start => {
                let mut signals = vec![
                    install_state(install_status::PENDING),
                    install_state(install_status::DOWNLOADING),
                ];
                let chunks = i64::from(s.download_chunks.max(1));
                for chunk in 1..=chunks {
                    let downloaded = s.download_total_bytes * chunk / chunks;
                    signals.push((
                        CallbackTag::UpdateDownloading,
                        vec![downloaded.into(), s.download_total_bytes.into()],
                    ));
                }
                signals.push(install_state(install_status::DOWNLOADED));
                self.downloaded.store(true, Ordering::SeqCst);
                signals
            }
            UpdateStep::Complete if !self.downloaded.load(Ordering::SeqCst) => vec![update_error(
                "completeUpdate() : Error : nothing downloaded",
            )],
            UpdateStep::Complete => vec![
                install_state(install_status::INSTALLING),
                install_state(install_status::INSTALLED),
            ],
            UpdateStep::Resume if self.downloaded.load(Ordering::SeqCst) => {
                vec![install_state(install_status::DOWNLOADED)]
            }
            UpdateStep::Resume => Vec::new(),
        }
    }

    fn respond_permission(&self, names: &BTreeSet<String>) -> Vec<Signal> {
        if names.is_empty() {
            return vec![(
                CallbackTag::PermissionError,
                vec!["No permissions requested".into()],
            )];
        }

        let (denied, granted): (Vec<String>, Vec<String>) = names
            .iter()
            .cloned()
            .partition(|n| self.script.denied_permissions.contains(n));

        let mut signals = Vec::new();
        if !granted.is_empty() {
            signals.push((
                CallbackTag::PermissionGranted,
                vec![granted.into(), denied.is_empty().into()],
            ));
        }
        if !denied.is_empty() {
            signals.push((CallbackTag::PermissionDenied, vec![denied.into()]));
        }
        signals
    }

    fn respond_picker(&self, config: &PickerConfig) -> Signal {
        if let Some((code, message)) = &self.script.picker_error {
            return (
                CallbackTag::ImagePicked,
                vec![false.into(), message.clone().into(), (*code).into()],
            );
        }

        let (width, height) = fit_within(self.script.image_size, config);
        let folder = match config.source {
            PickerSource::Camera => "camera",
            PickerSource::Gallery | PickerSource::Choice => "gallery",
        };
        let path = format!("/sim/{}/IMG_0001.jpg", folder);
        let payload = json!({
            "width": width,
            "height": height,
            "mimeType": "image/jpeg",
            "orientation": 0,
            "uri": format!("content://sim{}", path),
            "path": path,
            "cacheFilePath": format!("/sim/cache/IMG_0001_q{}.jpg", config.quality),
        });

        (
            CallbackTag::ImagePicked,
            vec![true.into(), payload.to_string().into(), NativeValue::Int(0)],
        )
    }

    fn respond_dialog(&self, dialog: &DialogConfig) -> Vec<Signal> {
        let s = &self.script;
        match dialog {
            DialogConfig::Alert { .. } => vec![(CallbackTag::DialogClicked, vec![true.into()])],
            DialogConfig::Confirm { .. } => vec![(
                CallbackTag::DialogClicked,
                vec![s.confirm_positive.into()],
            )],
            DialogConfig::TimePicker { initial, .. } => {
                let (hour, minute) = initial.unwrap_or(s.selected_time);
                vec![(
                    CallbackTag::ValueSelected,
                    vec![format!("{}:{:02}:00", hour, minute).into()],
                )]
            }
            DialogConfig::DatePicker { initial } => {
                let (year, month, day) = initial.unwrap_or(s.selected_date);
                vec![(
                    CallbackTag::ValueSelected,
                    vec![format!("{}/{}/{}", month, day, year).into()],
                )]
            }
            DialogConfig::Progress { .. }
            | DialogConfig::DismissProgress
            | DialogConfig::Toast { .. } => Vec::new(),
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeBackend for SimulatedBackend {
    fn platform(&self) -> Platform {
        Platform::Simulated
    }

    fn invoke(
        &self,
        request: NativeRequest,
        sink: Arc<dyn CallbackSink>,
    ) -> Result<(), NativeError> {
        if self.is_shut_down() {
            return Err(NativeError::ShutDown);
        }
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.log(&format!("invoke {:?}", request));

        let signals = self.respond(&request);
        if signals.is_empty() {
            return Ok(());
        }

        let delay = self.script.callback_delay;
        thread::Builder::new()
            .name("native-callback".to_string())
            .spawn(move || {
                for (tag, args) in signals {
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    sink.on_signal(tag, args);
                }
            })?;

        Ok(())
    }

    fn query(&self, query: &NativeQuery) -> Result<bool, NativeError> {
        if self.is_shut_down() {
            return Err(NativeError::ShutDown);
        }
        let denied = &self.script.denied_permissions;
        Ok(match query {
            NativeQuery::CheckPermission(name) => !denied.contains(name),
            NativeQuery::PermissionRationale(name) => denied.contains(name),
            NativeQuery::DeviceRooted => self.script.rooted,
        })
    }

    fn set_logging(&self, enabled: bool) {
        self.logging.store(enabled, Ordering::Relaxed);
    }

    fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            self.log("shut down");
        }
    }
}

fn install_state(status: i32) -> Signal {
    (CallbackTag::UpdateInstallState, vec![status.into()])
}

fn update_error(message: &str) -> Signal {
    (CallbackTag::UpdateError, vec![NativeValue::Int(-1), message.into()])
}

/// Scale `size` down to fit the picker bounds, keeping the aspect ratio.
fn fit_within(size: (u32, u32), config: &PickerConfig) -> (u32, u32) {
    let (width, height) = (u64::from(size.0.max(1)), u64::from(size.1.max(1)));
    let (max_w, max_h) = (u64::from(config.max_width), u64::from(config.max_height));
    if width <= max_w && height <= max_h {
        return size;
    }
    // Compare width/max_w against height/max_h without floats.
    let (w, h) = if width * max_h >= height * max_w {
        (max_w, (height * max_w / width).max(1))
    } else {
        ((width * max_h / height).max(1), max_h)
    };
    (w as u32, h as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{PermissionConfig, UpdateConfig};
    use std::sync::Mutex;
    use std::sync::mpsc;

    struct ChannelSink(Mutex<mpsc::Sender<(CallbackTag, Vec<NativeValue>)>>);

    impl CallbackSink for ChannelSink {
        fn on_signal(&self, tag: CallbackTag, args: Vec<NativeValue>) {
            let _ = self.0.lock().unwrap().send((tag, args));
        }
    }

    fn sink() -> (Arc<dyn CallbackSink>, mpsc::Receiver<Signal>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(ChannelSink(Mutex::new(tx))), rx)
    }

    fn quick() -> Script {
        Script {
            callback_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn permission_split_between_granted_and_denied() {
        let mut script = quick();
        script.denied_permissions.insert("CAMERA".into());
        let backend = SimulatedBackend::with_script(script);
        let (sink, rx) = sink();

        let names = ["CAMERA", "STORAGE"].iter().map(|s| s.to_string()).collect();
        backend
            .invoke(NativeRequest::Permission(PermissionConfig { names }), sink)
            .unwrap();

        let (tag, args) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(tag, CallbackTag::PermissionGranted);
        assert_eq!(args[0], NativeValue::StrList(vec!["STORAGE".into()]));
        assert_eq!(args[1], NativeValue::Bool(false));
        let (tag, _) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(tag, CallbackTag::PermissionDenied);
        assert_eq!(backend.invocations(), 1);
    }

    #[test]
    fn update_start_reports_progress_then_downloaded() {
        let backend = SimulatedBackend::with_script(quick());
        let (sink, rx) = sink();
        let request = NativeRequest::Update {
            step: UpdateStep::Start,
            config: UpdateConfig::default(),
        };
        backend.invoke(request, sink).unwrap();

        let tags: Vec<CallbackTag> = rx.iter().map(|(tag, _)| tag).collect();
        assert_eq!(tags.first(), Some(&CallbackTag::UpdateInstallState));
        assert_eq!(
            tags.iter()
                .filter(|t| **t == CallbackTag::UpdateDownloading)
                .count(),
            4
        );
        assert_eq!(tags.last(), Some(&CallbackTag::UpdateInstallState));
    }

    #[test]
    fn shut_down_backend_rejects_calls() {
        let backend = SimulatedBackend::with_script(quick());
        backend.shutdown();
        let (sink, _rx) = sink();
        let result = backend.invoke(NativeRequest::Device(DeviceAction::OpenSettings), sink);
        assert!(matches!(result, Err(NativeError::ShutDown)));
        assert!(backend.query(&NativeQuery::DeviceRooted).is_err());
        assert_eq!(backend.invocations(), 0);
    }

    #[test]
    fn picked_image_fits_bounds() {
        let config = PickerConfig::default();
        let (w, h) = fit_within((3024, 4032), &config);
        assert!(w <= config.max_width && h <= config.max_height);
        assert_eq!(fit_within((100, 100), &config), (100, 100));
    }
}
