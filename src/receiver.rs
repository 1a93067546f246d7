//! Native callback receiver.
//!
//! Runs on whatever thread the native layer calls back on. It decodes the
//! raw arguments into a typed event right there, then hands a publish
//! action to the dispatch queue. It never touches the bus directly and
//! never panics back into the native layer.

use crate::dispatch_queue::Producer;
use crate::error::BridgeError;
use crate::event_bus::{BusEvent, EventBus};
use crate::events::*;
use crate::token::{ListenerToken, OperationState};
use chrono::{NaiveDate, NaiveTime};
use log::{debug, warn};
use native_layer::{CallbackSink, CallbackTag, Capability, NativeError, NativeValue};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Format of a time picker result.
const TIME_FORMAT: &str = "%H:%M:%S";
/// Format of a date picker result (month/day/year, not zero padded).
const DATE_FORMAT: &str = "%m/%d/%Y";

/// What a `value-selected` string is expected to hold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueKind {
    #[default]
    Any,
    Time,
    Date,
}

/// Receives the callbacks of exactly one invocation.
pub struct NativeCallbackReceiver {
    token: Arc<ListenerToken>,
    value_kind: ValueKind,
    producer: Producer,
    bus: Arc<EventBus>,
    /// Generation of the live bridge instance.
    live_generation: Arc<AtomicU64>,
}

impl NativeCallbackReceiver {
    pub(crate) fn new(
        token: Arc<ListenerToken>,
        producer: Producer,
        bus: Arc<EventBus>,
        live_generation: Arc<AtomicU64>,
    ) -> Self {
        Self {
            token,
            value_kind: ValueKind::Any,
            producer,
            bus,
            live_generation,
        }
    }

    pub(crate) fn expecting(mut self, kind: ValueKind) -> Self {
        self.value_kind = kind;
        self
    }

    pub fn token(&self) -> &Arc<ListenerToken> {
        &self.token
    }

    fn is_stale(&self) -> bool {
        self.live_generation.load(Ordering::Acquire) != self.token.generation()
    }

    /// Report a failed synchronous invocation on the capability's error
    /// channel, through the queue like any other outcome.
    pub(crate) fn reject(&self, err: &NativeError) {
        let capability = self.token.capability();
        warn!("{} invocation {} failed: {}", capability, self.token.id(), err);

        let event = match capability {
            Capability::Update => Some(BusEvent::UpdateError(UpdateFailure {
                code: err.code(),
                message: err.to_string(),
            })),
            Capability::Permission => Some(BusEvent::PermissionError(PermissionFailure {
                message: err.to_string(),
            })),
            Capability::Picker => Some(BusEvent::ImagePicked(ImagePicked {
                result: Err(PickerFailure {
                    code: PickerErrorCode::from_code(err.code()),
                    message: err.to_string(),
                }),
            })),
            Capability::Share | Capability::Dialog | Capability::Device => None,
        };

        match event {
            Some(event) => self.post(event),
            None => {
                let error = BridgeError::native(capability, err);
                let token = self.token.clone();
                let bus = self.bus.clone();
                let live = self.live_generation.clone();
                self.producer.enqueue(move || {
                    if live.load(Ordering::Acquire) != token.generation() {
                        debug!(
                            "Dropping {} failure for replaced instance {}",
                            capability,
                            token.id()
                        );
                        return Ok(());
                    }
                    token.settle(OperationState::Failed);
                    bus.bridge_error.publish(&error)?;
                    Ok(())
                });
            }
        }
    }

    fn post(&self, event: BusEvent) {
        let token = self.token.clone();
        let bus = self.bus.clone();
        let live = self.live_generation.clone();
        self.producer.enqueue(move || {
            // The instance may have been replaced while this waited.
            if live.load(Ordering::Acquire) != token.generation() {
                debug!("Dropping {} for replaced instance {}", event.tag(), token.id());
                return Ok(());
            }
            if let Some(outcome) = settlement(&event) {
                token.settle(outcome);
            }
            bus.route(token.id(), event)?;
            Ok(())
        });
    }

    fn report_malformed(&self, tag: CallbackTag, reason: String) {
        warn!("Malformed {} payload for {}: {}", tag, self.token.id(), reason);
        let bus = self.bus.clone();
        self.producer.enqueue(move || {
            bus.bridge_error
                .publish(&BridgeError::MalformedCallbackPayload { tag, reason })?;
            Ok(())
        });
    }
}

impl CallbackSink for NativeCallbackReceiver {
    fn on_signal(&self, tag: CallbackTag, args: Vec<NativeValue>) {
        if self.is_stale() {
            debug!("Ignoring late {} for replaced instance {}", tag, self.token.id());
            return;
        }
        if tag.capability() != self.token.capability() {
            self.report_malformed(
                tag,
                format!("unexpected outcome for a {} invocation", self.token.capability()),
            );
            return;
        }

        match decode(tag, &args, self.value_kind) {
            Ok(event) => self.post(event),
            Err(reason) => self.report_malformed(tag, reason),
        }
    }
}

/// Final state an outcome moves its invocation to, if any.
fn settlement(event: &BusEvent) -> Option<OperationState> {
    match event {
        BusEvent::UpdateAvailable(_)
        | BusEvent::PermissionGranted(_)
        | BusEvent::PermissionDenied(_)
        | BusEvent::DialogClicked(_)
        | BusEvent::ValueSelected(_) => Some(OperationState::Completed),
        BusEvent::UpdateInstallState(InstallState(status)) => match status {
            InstallStatus::Downloaded | InstallStatus::Installed => {
                Some(OperationState::Completed)
            }
            InstallStatus::Failed | InstallStatus::Canceled => Some(OperationState::Failed),
            _ => None,
        },
        BusEvent::UpdateError(_) | BusEvent::PermissionError(_) => Some(OperationState::Failed),
        BusEvent::ImagePicked(picked) => Some(if picked.result.is_ok() {
            OperationState::Completed
        } else {
            OperationState::Failed
        }),
        BusEvent::UpdateVersionCode(_)
        | BusEvent::UpdateStalenessDays(_)
        | BusEvent::UpdateDownloading(_) => None,
    }
}

/// Decode and validate one raw signal.
pub fn decode(
    tag: CallbackTag,
    args: &[NativeValue],
    value_kind: ValueKind,
) -> Result<BusEvent, String> {
    let a = Args(args);
    Ok(match tag {
        CallbackTag::UpdateAvailable => {
            a.arity(2)?;
            BusEvent::UpdateAvailable(UpdateAvailability {
                available: a.bool(0)?,
                type_allowed: a.bool(1)?,
            })
        }
        CallbackTag::UpdateVersionCode => {
            a.arity(1)?;
            BusEvent::UpdateVersionCode(VersionCode(a.int(0)?))
        }
        CallbackTag::UpdateStalenessDays => {
            a.arity(1)?;
            BusEvent::UpdateStalenessDays(StalenessDays(a.int(0)?))
        }
        CallbackTag::UpdateInstallState => {
            a.arity(1)?;
            let code = a.int(0)?;
            let status = InstallStatus::from_code(code)
                .ok_or_else(|| format!("unknown install status {}", code))?;
            BusEvent::UpdateInstallState(InstallState(status))
        }
        CallbackTag::UpdateDownloading => {
            a.arity(2)?;
            let (bytes_downloaded, bytes_total) = (a.long(0)?, a.long(1)?);
            if bytes_downloaded < 0 || bytes_total < 0 {
                return Err(format!(
                    "negative byte count {}/{}",
                    bytes_downloaded, bytes_total
                ));
            }
            BusEvent::UpdateDownloading(DownloadProgress {
                bytes_downloaded,
                bytes_total,
            })
        }
        CallbackTag::UpdateError => {
            a.arity(2)?;
            BusEvent::UpdateError(UpdateFailure {
                code: a.int(0)?,
                message: a.str(1)?.to_string(),
            })
        }
        CallbackTag::PermissionGranted => {
            a.arity(2)?;
            BusEvent::PermissionGranted(PermissionsGranted {
                permissions: a.str_list(0)?,
                all: a.bool(1)?,
            })
        }
        CallbackTag::PermissionDenied => {
            a.arity(1)?;
            BusEvent::PermissionDenied(PermissionsDenied {
                permissions: a.str_list(0)?,
            })
        }
        CallbackTag::PermissionError => {
            a.arity(1)?;
            BusEvent::PermissionError(PermissionFailure {
                message: a.str(0)?.to_string(),
            })
        }
        CallbackTag::ImagePicked => {
            a.arity(3)?;
            let result = if a.bool(0)? {
                let image: ImageData = serde_json::from_str(a.str(1)?)
                    .map_err(|e| format!("bad image JSON: {}", e))?;
                Ok(image)
            } else {
                Err(PickerFailure {
                    code: PickerErrorCode::from_code(a.int(2)?),
                    message: a.str(1)?.to_string(),
                })
            };
            BusEvent::ImagePicked(ImagePicked { result })
        }
        CallbackTag::DialogClicked => {
            a.arity(1)?;
            BusEvent::DialogClicked(DialogClicked {
                positive: a.bool(0)?,
            })
        }
        CallbackTag::ValueSelected => {
            a.arity(1)?;
            BusEvent::ValueSelected(ValueSelected(parse_value(a.str(0)?, value_kind)?))
        }
    })
}

fn parse_value(raw: &str, kind: ValueKind) -> Result<SelectedValue, String> {
    let raw = raw.trim();
    let time = || NaiveTime::parse_from_str(raw, TIME_FORMAT).map(SelectedValue::Time);
    let date = || NaiveDate::parse_from_str(raw, DATE_FORMAT).map(SelectedValue::Date);

    let parsed = match kind {
        ValueKind::Time => time().ok(),
        ValueKind::Date => date().ok(),
        ValueKind::Any => time().or_else(|_| date()).ok(),
    };
    parsed.ok_or_else(|| format!("unparseable selected value {:?}", raw))
}

/// Positional accessors with descriptive errors.
struct Args<'a>(&'a [NativeValue]);

impl<'a> Args<'a> {
    fn arity(&self, expected: usize) -> Result<(), String> {
        if self.0.len() == expected {
            Ok(())
        } else {
            Err(format!("expected {} argument(s), got {}", expected, self.0.len()))
        }
    }

    fn get(&self, index: usize) -> Result<&'a NativeValue, String> {
        self.0
            .get(index)
            .ok_or_else(|| format!("missing argument {}", index))
    }

    fn mismatch(&self, index: usize, expected: &str) -> String {
        let kind = self.0.get(index).map(NativeValue::kind).unwrap_or("nothing");
        format!("argument {}: expected {}, got {}", index, expected, kind)
    }

    fn bool(&self, index: usize) -> Result<bool, String> {
        self.get(index)?
            .as_bool()
            .ok_or_else(|| self.mismatch(index, "bool"))
    }

    fn int(&self, index: usize) -> Result<i32, String> {
        self.get(index)?
            .as_int()
            .ok_or_else(|| self.mismatch(index, "int"))
    }

    fn long(&self, index: usize) -> Result<i64, String> {
        self.get(index)?
            .as_long()
            .ok_or_else(|| self.mismatch(index, "long"))
    }

    fn str(&self, index: usize) -> Result<&'a str, String> {
        self.get(index)?
            .as_str()
            .ok_or_else(|| self.mismatch(index, "string"))
    }

    fn str_list(&self, index: usize) -> Result<Vec<String>, String> {
        self.get(index)?
            .as_str_list()
            .ok_or_else(|| self.mismatch(index, "string[]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch_queue::DispatchQueue;
    use crate::event_bus::handler;
    use crate::token::TokenRegistry;
    use std::sync::Mutex;

    #[test]
    fn decodes_time_and_date_values() {
        let time = decode(
            CallbackTag::ValueSelected,
            &[NativeValue::from("9:30:00")],
            ValueKind::Time,
        )
        .unwrap();
        assert_eq!(
            time,
            BusEvent::ValueSelected(ValueSelected(SelectedValue::Time(
                NaiveTime::from_hms_opt(9, 30, 0).unwrap()
            )))
        );

        let date = decode(
            CallbackTag::ValueSelected,
            &[NativeValue::from("5/17/2024")],
            ValueKind::Any,
        )
        .unwrap();
        assert_eq!(
            date,
            BusEvent::ValueSelected(ValueSelected(SelectedValue::Date(
                NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
            )))
        );

        let value = |raw: &str, kind| {
            decode(CallbackTag::ValueSelected, &[NativeValue::from(raw)], kind)
        };
        assert!(value("5/17/2024", ValueKind::Time).is_err());
        assert!(value("13/40/2024", ValueKind::Date).is_err());
    }

    #[test]
    fn rejects_wrong_shapes() {
        let any = |tag, args: &[NativeValue]| decode(tag, args, ValueKind::Any);

        let err = any(CallbackTag::UpdateAvailable, &[NativeValue::Bool(true)]).unwrap_err();
        assert!(err.contains("expected 2"));

        let err = any(CallbackTag::DialogClicked, &[NativeValue::from("yes")]).unwrap_err();
        assert!(err.contains("expected bool, got string"));

        assert!(any(CallbackTag::UpdateInstallState, &[NativeValue::Int(7)]).is_err());
        let bad_json = [
            NativeValue::Bool(true),
            NativeValue::from("{not json"),
            NativeValue::Int(0),
        ];
        assert!(any(CallbackTag::ImagePicked, &bad_json).is_err());
    }

    #[test]
    fn int_download_counts_are_widened() {
        let event = decode(
            CallbackTag::UpdateDownloading,
            &[NativeValue::Int(10), NativeValue::Long(40)],
            ValueKind::Any,
        )
        .unwrap();
        assert_eq!(
            event,
            BusEvent::UpdateDownloading(DownloadProgress {
                bytes_downloaded: 10,
                bytes_total: 40
            })
        );
    }

    #[test]
    fn picker_failure_keeps_error_code() {
        let event = decode(
            CallbackTag::ImagePicked,
            &[NativeValue::Bool(false), NativeValue::from("denied"), NativeValue::Int(1)],
            ValueKind::Any,
        )
        .unwrap();
        let BusEvent::ImagePicked(picked) = event else {
            panic!("wrong event");
        };
        let failure = picked.result.unwrap_err();
        assert_eq!(failure.code, PickerErrorCode::PermissionFailed);
        let event = BusEvent::ImagePicked(ImagePicked {
            result: Err(failure),
        });
        assert_eq!(settlement(&event), Some(OperationState::Failed));
    }

    struct Fixture {
        queue: DispatchQueue,
        bus: Arc<EventBus>,
        live: Arc<AtomicU64>,
        registry: TokenRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                queue: DispatchQueue::new(),
                bus: Arc::new(EventBus::new()),
                live: Arc::new(AtomicU64::new(1)),
                registry: TokenRegistry::new(1, Arc::new(AtomicU64::new(0))),
            }
        }

        fn receiver(&self, capability: Capability) -> NativeCallbackReceiver {
            NativeCallbackReceiver::new(
                self.registry.issue(capability),
                self.queue.producer(),
                self.bus.clone(),
                self.live.clone(),
            )
        }

        fn drain(&self) {
            self.queue.drain_and_run(&|e| panic!("{e}")).unwrap();
        }
    }

    #[test]
    fn signal_is_published_only_on_drain_and_settles_token() {
        let fx = Fixture::new();
        let receiver = fx.receiver(Capability::Dialog);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let h = handler(move |d: &Delivery<DialogClicked>| s.lock().unwrap().push(d.positive));
        fx.bus.dialog_clicked.subscribe(&h);

        receiver.on_signal(CallbackTag::DialogClicked, vec![false.into()]);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(receiver.token().state(), OperationState::Fired);

        fx.drain();
        assert_eq!(*seen.lock().unwrap(), vec![false]);
        assert_eq!(receiver.token().state(), OperationState::Completed);
    }

    #[test]
    fn malformed_payload_goes_to_the_error_channel() {
        let fx = Fixture::new();
        let receiver = fx.receiver(Capability::Permission);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        let h = handler(move |err: &BridgeError| e.lock().unwrap().push(err.to_string()));
        fx.bus.bridge_error.subscribe(&h);

        receiver.on_signal(CallbackTag::PermissionGranted, vec![NativeValue::Int(3)]);
        receiver.on_signal(CallbackTag::DialogClicked, vec![true.into()]);
        fx.drain();

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("permission-granted"));
        assert_eq!(receiver.token().state(), OperationState::Fired);
    }

    #[test]
    fn late_signal_for_replaced_instance_is_dropped() {
        let fx = Fixture::new();
        let receiver = fx.receiver(Capability::Dialog);
        let calls = Arc::new(Mutex::new(0));
        let c = calls.clone();
        let h = handler(move |_: &Delivery<DialogClicked>| *c.lock().unwrap() += 1);
        fx.bus.dialog_clicked.subscribe(&h);

        // Queued before the replacement, drained after it.
        receiver.on_signal(CallbackTag::DialogClicked, vec![true.into()]);
        fx.live.store(2, Ordering::Release);
        receiver.on_signal(CallbackTag::DialogClicked, vec![true.into()]);
        fx.drain();

        assert_eq!(*calls.lock().unwrap(), 0);
        assert_eq!(fx.queue.pending(), 0);
    }

    #[test]
    fn rejected_share_reports_native_invocation_error() {
        let fx = Fixture::new();
        let receiver = fx.receiver(Capability::Share);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        let h = handler(move |err: &BridgeError| {
            e.lock().unwrap().push(matches!(
                err,
                BridgeError::NativeInvocation { capability: Capability::Share, .. }
            ))
        });
        fx.bus.bridge_error.subscribe(&h);

        receiver.reject(&NativeError::Unavailable);
        fx.drain();
        assert_eq!(*errors.lock().unwrap(), vec![true]);
        assert_eq!(receiver.token().state(), OperationState::Failed);
    }

    #[test]
    fn rejection_for_replaced_instance_is_dropped() {
        let fx = Fixture::new();
        let receiver = fx.receiver(Capability::Dialog);
        let errors = Arc::new(Mutex::new(0));
        let e = errors.clone();
        let h = handler(move |_: &BridgeError| *e.lock().unwrap() += 1);
        fx.bus.bridge_error.subscribe(&h);

        receiver.reject(&NativeError::ShutDown);
        fx.live.store(2, Ordering::Release);
        fx.drain();

        assert_eq!(*errors.lock().unwrap(), 0);
        assert_eq!(receiver.token().state(), OperationState::Fired);
    }
}
