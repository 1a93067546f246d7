//! Event bus for native outcomes.
//!
//! Design principles:
//! - One typed channel per outcome, fixed at compile time
//! - Publishing only happens inside a dispatch-queue drain
//! - Subscribers are held weakly; dropping a handler unsubscribes it
//! - Each publish iterates a snapshot, so (un)subscribing from a handler
//!   takes effect on the next publish
//! - A panicking handler doesn't keep the event from the rest of the snapshot

use crate::dispatch_queue::{on_dispatch_thread, panic_message};
use crate::error::{BridgeError, Result};
use crate::events::*;
use log::{debug, error, trace};
use native_layer::CallbackTag;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

/// A subscriber. The caller keeps the `Arc` alive for as long as it wants
/// to receive events.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<T, F>(f: F) -> Handler<T>
where
    F: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Named broadcast point.
pub struct EventChannel<T> {
    name: &'static str,
    subscribers: Mutex<Vec<Weak<dyn Fn(&T) + Send + Sync>>>,
}

impl<T> EventChannel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Add a subscriber. Subscribing the same handler twice has no effect.
    pub fn subscribe(&self, handler: &Handler<T>) {
        let weak = Arc::downgrade(handler);
        let mut subs = self.lock();
        if !subs.iter().any(|s| Weak::ptr_eq(s, &weak)) {
            subs.push(weak);
        }
    }

    /// Remove a subscriber. Unknown handlers are ignored.
    pub fn unsubscribe(&self, handler: &Handler<T>) {
        let weak = Arc::downgrade(handler);
        self.lock().retain(|s| !Weak::ptr_eq(s, &weak));
    }

    /// Live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|s| s.strong_count() > 0).count()
    }

    /// Deliver `event` to every subscriber present at entry, in subscription
    /// order. Returns the number of handlers called.
    ///
    /// Must be called from inside a drained action. Every handler in the
    /// snapshot runs even if an earlier one panics; the panics come back as
    /// one `HandlerPanicked` after the last handler.
    pub fn publish(&self, event: &T) -> Result<usize> {
        if !on_dispatch_thread() {
            return Err(BridgeError::NotDispatchThread);
        }

        let snapshot: Vec<Handler<T>> = {
            let mut subs = self.lock();
            subs.retain(|s| s.strong_count() > 0);
            subs.iter().filter_map(Weak::upgrade).collect()
        };

        if snapshot.is_empty() {
            trace!("No subscribers on {}, event dropped", self.name);
            return Ok(0);
        }

        let mut panics = Vec::new();
        for handler in &snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                let message = panic_message(payload.as_ref());
                error!("Handler on {} panicked: {}", self.name, message);
                panics.push(message);
            }
        }

        if panics.is_empty() {
            Ok(snapshot.len())
        } else {
            Err(BridgeError::HandlerPanicked(panics.join("; ")))
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Weak<dyn Fn(&T) + Send + Sync>>> {
        // A handler can't panic while the list is locked, but recover anyway.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A decoded native outcome, keyed by the channel it belongs on.
#[derive(Clone, Debug, PartialEq)]
pub enum BusEvent {
    UpdateAvailable(UpdateAvailability),
    UpdateVersionCode(VersionCode),
    UpdateStalenessDays(StalenessDays),
    UpdateInstallState(InstallState),
    UpdateDownloading(DownloadProgress),
    UpdateError(UpdateFailure),
    PermissionGranted(PermissionsGranted),
    PermissionDenied(PermissionsDenied),
    PermissionError(PermissionFailure),
    ImagePicked(ImagePicked),
    DialogClicked(DialogClicked),
    ValueSelected(ValueSelected),
}

impl BusEvent {
    pub fn tag(&self) -> CallbackTag {
        match self {
            BusEvent::UpdateAvailable(_) => CallbackTag::UpdateAvailable,
            BusEvent::UpdateVersionCode(_) => CallbackTag::UpdateVersionCode,
            BusEvent::UpdateStalenessDays(_) => CallbackTag::UpdateStalenessDays,
            BusEvent::UpdateInstallState(_) => CallbackTag::UpdateInstallState,
            BusEvent::UpdateDownloading(_) => CallbackTag::UpdateDownloading,
            BusEvent::UpdateError(_) => CallbackTag::UpdateError,
            BusEvent::PermissionGranted(_) => CallbackTag::PermissionGranted,
            BusEvent::PermissionDenied(_) => CallbackTag::PermissionDenied,
            BusEvent::PermissionError(_) => CallbackTag::PermissionError,
            BusEvent::ImagePicked(_) => CallbackTag::ImagePicked,
            BusEvent::DialogClicked(_) => CallbackTag::DialogClicked,
            BusEvent::ValueSelected(_) => CallbackTag::ValueSelected,
        }
    }
}

/// Every outcome channel of the bridge, plus the shared error channel.
pub struct EventBus {
    pub update_available: EventChannel<Delivery<UpdateAvailability>>,
    pub update_version_code: EventChannel<Delivery<VersionCode>>,
    pub update_staleness_days: EventChannel<Delivery<StalenessDays>>,
    pub update_install_state: EventChannel<Delivery<InstallState>>,
    pub update_downloading: EventChannel<Delivery<DownloadProgress>>,
    pub update_error: EventChannel<Delivery<UpdateFailure>>,
    pub permission_granted: EventChannel<Delivery<PermissionsGranted>>,
    pub permission_denied: EventChannel<Delivery<PermissionsDenied>>,
    pub permission_error: EventChannel<Delivery<PermissionFailure>>,
    pub image_picked: EventChannel<Delivery<ImagePicked>>,
    pub dialog_clicked: EventChannel<Delivery<DialogClicked>>,
    pub value_selected: EventChannel<Delivery<ValueSelected>>,
    /// Drain-time failures and malformed payloads.
    pub bridge_error: EventChannel<BridgeError>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            update_available: EventChannel::new(CallbackTag::UpdateAvailable.name()),
            update_version_code: EventChannel::new(CallbackTag::UpdateVersionCode.name()),
            update_staleness_days: EventChannel::new(CallbackTag::UpdateStalenessDays.name()),
            update_install_state: EventChannel::new(CallbackTag::UpdateInstallState.name()),
            update_downloading: EventChannel::new(CallbackTag::UpdateDownloading.name()),
            update_error: EventChannel::new(CallbackTag::UpdateError.name()),
            permission_granted: EventChannel::new(CallbackTag::PermissionGranted.name()),
            permission_denied: EventChannel::new(CallbackTag::PermissionDenied.name()),
            permission_error: EventChannel::new(CallbackTag::PermissionError.name()),
            image_picked: EventChannel::new(CallbackTag::ImagePicked.name()),
            dialog_clicked: EventChannel::new(CallbackTag::DialogClicked.name()),
            value_selected: EventChannel::new(CallbackTag::ValueSelected.name()),
            bridge_error: EventChannel::new("bridge-error"),
        }
    }

    /// Publish a decoded outcome on its channel.
    pub fn route(&self, token: TokenId, event: BusEvent) -> Result<usize> {
        debug!("Routing {} for token {}", event.tag(), token);
        match event {
            BusEvent::UpdateAvailable(payload) => {
                self.update_available.publish(&Delivery { token, payload })
            }
            BusEvent::UpdateVersionCode(payload) => {
                self.update_version_code.publish(&Delivery { token, payload })
            }
            BusEvent::UpdateStalenessDays(payload) => {
                self.update_staleness_days.publish(&Delivery { token, payload })
            }
            BusEvent::UpdateInstallState(payload) => {
                self.update_install_state.publish(&Delivery { token, payload })
            }
            BusEvent::UpdateDownloading(payload) => {
                self.update_downloading.publish(&Delivery { token, payload })
            }
            BusEvent::UpdateError(payload) => {
                self.update_error.publish(&Delivery { token, payload })
            }
            BusEvent::PermissionGranted(payload) => {
                self.permission_granted.publish(&Delivery { token, payload })
            }
            BusEvent::PermissionDenied(payload) => {
                self.permission_denied.publish(&Delivery { token, payload })
            }
            BusEvent::PermissionError(payload) => {
                self.permission_error.publish(&Delivery { token, payload })
            }
            BusEvent::ImagePicked(payload) => {
                self.image_picked.publish(&Delivery { token, payload })
            }
            BusEvent::DialogClicked(payload) => {
                self.dialog_clicked.publish(&Delivery { token, payload })
            }
            BusEvent::ValueSelected(payload) => {
                self.value_selected.publish(&Delivery { token, payload })
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch_queue::DispatchQueue;
    use std::sync::Mutex;

    /// Run `f` inside a drain tick, where publishing is allowed.
    fn in_drain<F>(f: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let queue = DispatchQueue::new();
        queue.enqueue(f);
        let report = queue.drain_and_run(&|e| panic!("{e}")).unwrap();
        assert_eq!(report.ran, 1);
    }

    #[test]
    fn publish_outside_a_drain_is_refused() {
        let channel = EventChannel::<u32>::new("numbers");
        assert!(matches!(
            channel.publish(&1),
            Err(BridgeError::NotDispatchThread)
        ));
    }

    #[test]
    fn subscribe_is_idempotent_and_weak() {
        let channel = EventChannel::<u32>::new("numbers");
        let h = handler(|_: &u32| {});
        channel.subscribe(&h);
        channel.subscribe(&h);
        assert_eq!(channel.subscriber_count(), 1);

        channel.unsubscribe(&h);
        channel.unsubscribe(&h);
        assert_eq!(channel.subscriber_count(), 0);

        channel.subscribe(&h);
        drop(h);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn empty_channel_drops_silently() {
        let channel = Arc::new(EventChannel::<u32>::new("numbers"));
        let c = channel.clone();
        in_drain(move || {
            assert_eq!(c.publish(&7)?, 0);
            Ok(())
        });
    }

    #[test]
    fn subscription_changes_apply_to_the_next_publish() {
        // h1 subscribes h2 and unsubscribes itself during the first publish.
        let channel = Arc::new(EventChannel::<&'static str>::new("names"));
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c2 = calls.clone();
        let h2: Handler<&'static str> = handler(move |e: &&'static str| {
            c2.lock().unwrap().push(format!("h2:{e}"));
        });

        let h1_slot: Arc<Mutex<Option<Handler<&'static str>>>> = Arc::new(Mutex::new(None));
        let (c1, ch, h2c, slot) = (calls.clone(), channel.clone(), h2.clone(), h1_slot.clone());
        let h1: Handler<&'static str> = handler(move |e: &&'static str| {
            c1.lock().unwrap().push(format!("h1:{e}"));
            ch.subscribe(&h2c);
            if let Some(me) = slot.lock().unwrap().as_ref() {
                ch.unsubscribe(me);
            }
        });
        *h1_slot.lock().unwrap() = Some(h1.clone());
        channel.subscribe(&h1);

        let ch = channel.clone();
        in_drain(move || {
            assert_eq!(ch.publish(&"first")?, 1);
            assert_eq!(ch.publish(&"second")?, 1);
            Ok(())
        });

        assert_eq!(*calls.lock().unwrap(), vec!["h1:first", "h2:second"]);
        drop(h1_slot);
        drop(h2);
    }

    #[test]
    fn panicking_handler_does_not_skip_the_rest_of_the_snapshot() {
        let channel = Arc::new(EventChannel::<u32>::new("numbers"));
        let h1 = handler(|_: &u32| panic!("h1 failed"));
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        let h2 = handler(move |n: &u32| r.lock().unwrap().push(*n));
        channel.subscribe(&h1);
        channel.subscribe(&h2);

        let queue = DispatchQueue::new();
        let ch = channel.clone();
        queue.enqueue(move || ch.publish(&5).map(|_| ()));
        let errors = Mutex::new(Vec::new());
        let report = queue
            .drain_and_run(&|e| errors.lock().unwrap().push(e))
            .unwrap();

        assert_eq!(*received.lock().unwrap(), vec![5]);
        assert_eq!(report.failed, 1);
        let errors = errors.into_inner().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], BridgeError::HandlerPanicked(m) if m.contains("h1 failed")));
    }

    #[test]
    fn route_reaches_the_matching_channel_only() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let on_clicked = handler(move |d: &Delivery<DialogClicked>| {
            s.lock().unwrap().push((d.token, d.positive));
        });
        bus.dialog_clicked.subscribe(&on_clicked);

        let b = bus.clone();
        in_drain(move || {
            let event = BusEvent::DialogClicked(DialogClicked { positive: true });
            assert_eq!(event.tag(), CallbackTag::DialogClicked);
            assert_eq!(b.route(TokenId(3), event)?, 1);
            let other = BusEvent::ValueSelected(ValueSelected(SelectedValue::Time(
                chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            )));
            assert_eq!(b.route(TokenId(4), other)?, 0);
            Ok(())
        });

        assert_eq!(*seen.lock().unwrap(), vec![(TokenId(3), true)]);
    }
}
