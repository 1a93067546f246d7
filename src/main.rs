//! native-bridge demo host.
//!
//! Installs the bridge on the simulated native layer, fires a few commands
//! and drains the queue from a poll timer on the main thread, the way an
//! application's UI loop would.

use log::{error, info, warn};
use native_bridge::commands::UpdateSession;
use native_bridge::config::PlatformChoice;
use native_bridge::events::{
    DownloadProgress, ImagePicked, InstallState, InstallStatus, PermissionsDenied,
    PermissionsGranted, UpdateAvailability, UpdateFailure, ValueSelected,
};
use native_bridge::{BridgeConfig, BridgeError, BridgeRoot, Delivery, handler, logging};
use native_layer::Platform;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Give up on the scripted flow after this long.
const DEMO_TIMEOUT: Duration = Duration::from_secs(10);

type SessionSlot = Arc<Mutex<Option<UpdateSession>>>;

fn with_session(slot: &SessionSlot, f: impl FnOnce(&UpdateSession)) {
    match slot.lock() {
        Ok(guard) => {
            if let Some(session) = guard.as_ref() {
                f(session);
            }
        }
        Err(_) => error!("Update session lock poisoned"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut config = BridgeConfig::load_default();
    logging::init(&config);

    if config.platform == PlatformChoice::Auto && config.resolve_platform() == Platform::Unsupported
    {
        info!("No native platform detected, using the simulated one");
        config.platform = PlatformChoice::Simulated;
    }

    let root = BridgeRoot::new();
    let bridge = root.install_from_config(&config);
    info!("Bridge ready on {}", bridge.platform());

    let bus = root.bus().clone();
    let session: SessionSlot = Arc::new(Mutex::new(None));
    let done = Arc::new(AtomicBool::new(false));

    // ---- handlers, kept alive for the whole run ----

    let slot = session.clone();
    let on_available = handler(move |e: &Delivery<UpdateAvailability>| {
        info!("[{}] update available: {}", e.token, e.available);
        if e.available && e.type_allowed {
            with_session(&slot, |s| {
                if let Err(err) = s.start() {
                    warn!("Failed to start update: {}", err);
                }
            });
        }
    });
    bus.update_available.subscribe(&on_available);

    let on_progress = handler(|e: &Delivery<DownloadProgress>| {
        info!(
            "[{}] downloading {}% ({}/{} bytes)",
            e.token,
            e.percent(),
            e.bytes_downloaded,
            e.bytes_total
        );
    });
    bus.update_downloading.subscribe(&on_progress);

    let (slot, finished) = (session.clone(), done.clone());
    let on_install_state = handler(move |e: &Delivery<InstallState>| {
        let InstallState(status) = e.payload;
        info!("[{}] install state: {:?}", e.token, status);
        match status {
            InstallStatus::Downloaded => with_session(&slot, |s| {
                if let Err(err) = s.complete() {
                    warn!("Failed to complete update: {}", err);
                }
            }),
            InstallStatus::Installed | InstallStatus::Failed | InstallStatus::Canceled => {
                finished.store(true, Ordering::SeqCst)
            }
            _ => {}
        }
    });
    bus.update_install_state.subscribe(&on_install_state);

    let finished = done.clone();
    let on_update_error = handler(move |e: &Delivery<UpdateFailure>| {
        warn!("[{}] update failed ({}): {}", e.token, e.code, e.message);
        finished.store(true, Ordering::SeqCst);
    });
    bus.update_error.subscribe(&on_update_error);

    let on_granted = handler(|e: &Delivery<PermissionsGranted>| {
        info!("[{}] granted {:?} (all: {})", e.token, e.permissions, e.all);
    });
    bus.permission_granted.subscribe(&on_granted);

    let on_denied = handler(|e: &Delivery<PermissionsDenied>| {
        warn!("[{}] denied {:?}", e.token, e.permissions);
    });
    bus.permission_denied.subscribe(&on_denied);

    let on_image = handler(|e: &Delivery<ImagePicked>| match &e.result {
        Ok(image) => info!(
            "[{}] picked {} ({}x{})",
            e.token, image.uri, image.width, image.height
        ),
        Err(failure) => warn!("[{}] picker failed: {}", e.token, failure.message),
    });
    bus.image_picked.subscribe(&on_image);

    let on_value = handler(|e: &Delivery<ValueSelected>| {
        info!("[{}] selected {}", e.token, e.0);
    });
    bus.value_selected.subscribe(&on_value);

    let on_error = handler(|e: &BridgeError| error!("bridge error: {}", e));
    bus.bridge_error.subscribe(&on_error);

    // ---- commands ----

    bridge
        .permissions()
        .permissions(["android.permission.CAMERA", "android.permission.READ_MEDIA_IMAGES"])
        .request()?;
    bridge.image_picker().gallery().pick()?;
    bridge.dialog().date_picker().show()?;

    let checked = bridge.update().flexible().check()?;
    if checked.check_dispatch().is_inert() {
        info!("Native layer unavailable, nothing to wait for");
        return Ok(());
    }
    if let Ok(mut slot) = session.lock() {
        *slot = Some(checked);
    }

    // ---- poll loop ----

    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(1)));
    let started = tokio::time::Instant::now();
    while !done.load(Ordering::SeqCst) {
        ticker.tick().await;
        root.drain()?;
        if started.elapsed() > DEMO_TIMEOUT {
            warn!("Update flow did not finish in {:?}", DEMO_TIMEOUT);
            break;
        }
    }

    // One more tick for anything queued by the last handlers.
    root.drain()?;
    info!("In flight at exit: {:?}", bridge.in_flight());
    Ok(())
}
