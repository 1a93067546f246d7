//! Bridge root and instance lifecycle.
//!
//! The application owns one [`BridgeRoot`]. It holds the dispatch queue and
//! the event bus, both of which outlive bridge instances, and at most one
//! live [`BridgeHandle`]. Installing a new instance retires the previous one
//! in the same step: from then on every call through an old handle fails
//! with `ConcurrentReinitialization` and its late callbacks are dropped.

use crate::commands::{
    CommandDefaults, DialogCommand, Dispatch, FINE_LOCATION, PermissionCommand, PickerCommand,
    ShareCommand, Ticket, UpdateCommand,
};
use crate::config::BridgeConfig;
use crate::dispatch_queue::{DispatchQueue, DrainReport, Producer};
use crate::error::{BridgeError, Result};
use crate::event_bus::EventBus;
use crate::receiver::{NativeCallbackReceiver, ValueKind};
use crate::token::{OperationState, TokenRegistry};
use log::{debug, error, info, warn};
use native_layer::{
    Capability, DeviceAction, DialogConfig, NativeBackend, NativeQuery, NativeRequest, Platform,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Lifecycle of a bridge instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Ready,
    Replaced,
}

/// Owning root of the bridge.
pub struct BridgeRoot {
    queue: DispatchQueue,
    bus: Arc<EventBus>,
    current: Mutex<Option<BridgeHandle>>,
    /// Generation of the live instance, 0 before the first install.
    live_generation: Arc<AtomicU64>,
    next_token: Arc<AtomicU64>,
}

impl BridgeRoot {
    pub fn new() -> Self {
        Self {
            queue: DispatchQueue::new(),
            bus: Arc::new(EventBus::new()),
            current: Mutex::new(None),
            live_generation: Arc::new(AtomicU64::new(0)),
            next_token: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Install a bridge instance with default builder settings. `None` runs
    /// every capability inert.
    pub fn install(&self, backend: Option<Box<dyn NativeBackend>>) -> BridgeHandle {
        self.install_with(backend, CommandDefaults::default())
    }

    /// Install an instance for the platform and settings in `config`.
    pub fn install_from_config(&self, config: &BridgeConfig) -> BridgeHandle {
        let platform = config.resolve_platform();
        let backend = native_layer::create_backend(platform);
        if backend.is_none() {
            info!("No native layer for {}, capabilities run inert", platform);
        }
        let handle = self.install_with(backend, config.command_defaults());
        if config.native_logging {
            if let Err(e) = handle.set_native_logging(true) {
                warn!("Failed to enable native logging: {}", e);
            }
        }
        handle
    }

    /// Install an instance, retiring the previous one.
    pub fn install_with(
        &self,
        backend: Option<Box<dyn NativeBackend>>,
        defaults: CommandDefaults,
    ) -> BridgeHandle {
        let mut current = self.lock_current();

        let generation = self.live_generation.load(Ordering::Acquire) + 1;
        let platform = backend
            .as_ref()
            .map(|b| b.platform())
            .unwrap_or(Platform::Unsupported);
        let handle = BridgeHandle {
            inner: Arc::new(Instance {
                generation,
                platform,
                backend,
                tokens: TokenRegistry::new(generation, self.next_token.clone()),
                producer: self.queue.producer(),
                bus: self.bus.clone(),
                live_generation: self.live_generation.clone(),
                defaults,
            }),
        };

        // Flip first so the old instance is unreachable before it shuts down.
        self.live_generation.store(generation, Ordering::Release);
        if let Some(previous) = current.replace(handle.clone()) {
            info!(
                "Replacing bridge instance {} with {}",
                previous.generation(),
                generation
            );
            previous.inner.teardown();
        } else {
            info!("Bridge instance {} ready ({})", generation, platform);
        }

        handle
    }

    pub fn state(&self) -> Lifecycle {
        match self.lock_current().as_ref() {
            Some(_) => Lifecycle::Ready,
            None => Lifecycle::Uninitialized,
        }
    }

    /// The live instance, if one is installed.
    pub fn handle(&self) -> Option<BridgeHandle> {
        self.lock_current().clone()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Enqueue handle for code that produces its own events.
    pub fn producer(&self) -> Producer {
        self.queue.producer()
    }

    /// Callbacks waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Run one drain tick on the designated thread. Failures of individual
    /// actions are logged and published on `bridge_error`.
    pub fn drain(&self) -> Result<DrainReport> {
        let bus = self.bus.clone();
        let report = self.queue.drain_and_run(&|err| {
            error!("Bridge error: {}", err);
            if let Err(e) = bus.bridge_error.publish(&err) {
                error!("Failed to publish bridge error: {}", e);
            }
        })?;
        if report.total() > 0 {
            debug!("Drained {} callback(s), {} failed", report.total(), report.failed);
        }
        Ok(report)
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<BridgeHandle>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for BridgeRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BridgeRoot {
    fn drop(&mut self) {
        let current = self
            .current
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = current {
            self.live_generation.fetch_add(1, Ordering::AcqRel);
            handle.inner.teardown();
        }
    }
}

/// One bridge instance and its native context.
struct Instance {
    generation: u64,
    platform: Platform,
    backend: Option<Box<dyn NativeBackend>>,
    tokens: TokenRegistry,
    producer: Producer,
    bus: Arc<EventBus>,
    live_generation: Arc<AtomicU64>,
    defaults: CommandDefaults,
}

impl Instance {
    fn teardown(&self) {
        if let Some(backend) = &self.backend {
            backend.shutdown();
        }
        self.tokens.log_orphans();
        debug!("Bridge instance {} torn down", self.generation);
    }
}

/// Handle to a bridge instance. Cheap to clone; the only way to build
/// commands.
#[derive(Clone)]
pub struct BridgeHandle {
    inner: Arc<Instance>,
}

impl BridgeHandle {
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn platform(&self) -> Platform {
        self.inner.platform
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.inner.live_generation.load(Ordering::Acquire) == self.inner.generation {
            Lifecycle::Ready
        } else {
            Lifecycle::Replaced
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// Fired invocations not yet settled, per capability.
    pub fn in_flight(&self) -> BTreeMap<Capability, usize> {
        self.inner.tokens.in_flight()
    }

    pub fn update(&self) -> UpdateCommand {
        UpdateCommand::new(self.clone())
    }

    pub fn permissions(&self) -> PermissionCommand {
        PermissionCommand::new(self.clone())
    }

    pub fn image_picker(&self) -> PickerCommand {
        PickerCommand::new(self.clone(), self.inner.defaults.picker.clone())
    }

    pub fn share(&self) -> ShareCommand {
        ShareCommand::new(self.clone())
    }

    pub fn dialog(&self) -> DialogCommand {
        DialogCommand::new(self.clone(), &self.inner.defaults)
    }

    /// Whether `permission` is currently granted.
    pub fn check_permission(&self, permission: &str) -> Result<bool> {
        self.query(NativeQuery::CheckPermission(permission.to_string()))
    }

    /// Whether the platform suggests explaining why `permission` is needed.
    pub fn should_show_rationale(&self, permission: &str) -> Result<bool> {
        self.query(NativeQuery::PermissionRationale(permission.to_string()))
    }

    pub fn is_device_rooted(&self) -> Result<bool> {
        self.query(NativeQuery::DeviceRooted)
    }

    /// Open the application's system settings page.
    pub fn open_settings(&self) -> Result<Dispatch> {
        self.fire(NativeRequest::Device(DeviceAction::OpenSettings), ValueKind::Any)
    }

    /// Ask the user to turn on location services. Needs the fine location
    /// permission.
    pub fn enable_location(&self) -> Result<Dispatch> {
        if !self.check_permission(FINE_LOCATION)? {
            warn!("Location permission not granted, not enabling location");
            return Err(BridgeError::PermissionRequired(FINE_LOCATION.to_string()));
        }
        self.fire(
            NativeRequest::Device(DeviceAction::EnableLocation),
            ValueKind::Any,
        )
    }

    /// Show a short toast.
    pub fn toast(&self, message: &str) -> Result<Dispatch> {
        let config = DialogConfig::Toast {
            message: message.to_string(),
            long: false,
        };
        self.fire(NativeRequest::Dialog(config), ValueKind::Any)
    }

    /// Toggle the native layer's own diagnostic logging.
    pub fn set_native_logging(&self, enabled: bool) -> Result<()> {
        self.ensure_live()?;
        match &self.inner.backend {
            Some(backend) => backend.set_logging(enabled),
            None => debug!("native logging: no native layer"),
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        match self.lifecycle() {
            Lifecycle::Ready => Ok(()),
            _ => Err(BridgeError::ConcurrentReinitialization),
        }
    }

    fn query(&self, query: NativeQuery) -> Result<bool> {
        self.ensure_live()?;
        let Some(backend) = &self.inner.backend else {
            debug!("{:?}: no native layer, answering inert", query);
            return Ok(query.inert_answer());
        };
        let capability = match query {
            NativeQuery::CheckPermission(_) | NativeQuery::PermissionRationale(_) => {
                Capability::Permission
            }
            NativeQuery::DeviceRooted => Capability::Device,
        };
        backend
            .query(&query)
            .map_err(|e| BridgeError::native(capability, &e))
    }

    /// Issue one native invocation with a fresh listener token.
    pub(crate) fn fire(&self, request: NativeRequest, value_kind: ValueKind) -> Result<Dispatch> {
        self.ensure_live()?;
        let capability = request.capability();
        request
            .validate()
            .map_err(|reason| BridgeError::InvalidConfig { capability, reason })?;

        let Some(backend) = &self.inner.backend else {
            debug!("{}: no native layer, nothing invoked", capability);
            return Ok(Dispatch::Inert(capability));
        };

        let token = self.inner.tokens.issue(capability);
        let receiver = Arc::new(
            NativeCallbackReceiver::new(
                token.clone(),
                self.inner.producer.clone(),
                self.inner.bus.clone(),
                self.inner.live_generation.clone(),
            )
            .expecting(value_kind),
        );

        let expects_callback = request.expects_callback();
        debug!("Firing {} as {}", capability, token.id());
        match backend.invoke(request, receiver.clone()) {
            Ok(()) if !expects_callback => {
                token.settle(OperationState::Completed);
            }
            Ok(()) => {}
            Err(e) => receiver.reject(&e),
        }

        Ok(Dispatch::Fired(Ticket(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use native_layer::simulated::{Script, SimulatedBackend};
    use std::time::Duration;

    fn simulated() -> Box<dyn NativeBackend> {
        Box::new(SimulatedBackend::with_script(Script {
            callback_delay: Duration::ZERO,
            ..Default::default()
        }))
    }

    #[test]
    fn lifecycle_transitions() {
        let root = BridgeRoot::new();
        assert_eq!(root.state(), Lifecycle::Uninitialized);
        assert!(root.handle().is_none());

        let first = root.install(None);
        assert_eq!(root.state(), Lifecycle::Ready);
        assert_eq!(first.lifecycle(), Lifecycle::Ready);

        let second = root.install(Some(simulated()));
        assert_eq!(first.lifecycle(), Lifecycle::Replaced);
        assert_eq!(second.lifecycle(), Lifecycle::Ready);
        assert_eq!(root.handle().map(|h| h.generation()), Some(second.generation()));
        assert_eq!(second.platform(), Platform::Simulated);
    }

    #[test]
    fn replaced_handle_rejects_every_call() {
        let root = BridgeRoot::new();
        let old = root.install(None);
        let _new = root.install(None);

        assert!(matches!(
            old.check_permission("CAMERA"),
            Err(BridgeError::ConcurrentReinitialization)
        ));
        assert!(matches!(
            old.toast("hi"),
            Err(BridgeError::ConcurrentReinitialization)
        ));
        assert!(matches!(
            old.set_native_logging(true),
            Err(BridgeError::ConcurrentReinitialization)
        ));
    }

    #[test]
    fn inert_queries_answer_defaults() {
        let root = BridgeRoot::new();
        let handle = root.install(None);
        assert!(handle.check_permission("CAMERA").unwrap());
        assert!(handle.should_show_rationale("CAMERA").unwrap());
        assert!(!handle.is_device_rooted().unwrap());
        assert!(handle.open_settings().unwrap().is_inert());
        assert!(handle.enable_location().unwrap().is_inert());
    }

    #[test]
    fn enable_location_requires_permission() {
        let mut script = Script::default();
        script.denied_permissions.insert(FINE_LOCATION.to_string());
        let root = BridgeRoot::new();
        let handle = root.install(Some(Box::new(SimulatedBackend::with_script(script))));
        assert!(matches!(
            handle.enable_location(),
            Err(BridgeError::PermissionRequired(_))
        ));
    }

    #[test]
    fn fire_and_forget_settles_immediately() {
        let root = BridgeRoot::new();
        let handle = root.install(Some(simulated()));
        let dispatch = handle.toast("saved").unwrap();
        let ticket = dispatch.ticket().unwrap();
        assert_eq!(ticket.state(), OperationState::Completed);
        assert!(handle.in_flight().is_empty());
    }

    #[test]
    fn drain_publishes_action_errors() {
        let root = BridgeRoot::new();
        let errors = Arc::new(Mutex::new(0));
        let e = errors.clone();
        let h = crate::event_bus::handler(move |_: &BridgeError| *e.lock().unwrap() += 1);
        root.bus().bridge_error.subscribe(&h);

        root.producer()
            .enqueue(|| Err(BridgeError::config("broken action")));
        let report = root.drain().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(*errors.lock().unwrap(), 1);
    }
}
