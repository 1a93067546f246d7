//! Native dialogs, pickers for time and date, progress indicator and toasts.

use super::{CommandDefaults, Dispatch, OneShot};
use crate::bridge::BridgeHandle;
use crate::error::Result;
use crate::receiver::ValueKind;
use native_layer::{Capability, DialogConfig, NativeRequest};

/// Builds one dialog. Starts as an empty alert; pick the kind with one of
/// the kind setters, then refine it.
pub struct DialogCommand {
    handle: BridgeHandle,
    positive_label: String,
    negative_label: String,
    shot: OneShot<DialogConfig>,
}

impl DialogCommand {
    pub(crate) fn new(handle: BridgeHandle, defaults: &CommandDefaults) -> Self {
        Self {
            handle,
            positive_label: defaults.positive_label.clone(),
            negative_label: defaults.negative_label.clone(),
            shot: OneShot::new(
                Capability::Dialog,
                DialogConfig::Alert {
                    title: String::new(),
                    message: String::new(),
                    positive: defaults.positive_label.clone(),
                },
            ),
        }
    }

    // ---- kinds ----

    /// Message with a single button. Reports `dialog_clicked(true)`.
    pub fn alert(mut self, title: impl Into<String>, message: impl Into<String>) -> Self {
        let config = DialogConfig::Alert {
            title: title.into(),
            message: message.into(),
            positive: self.positive_label.clone(),
        };
        self.shot.edit(|c| *c = config);
        self
    }

    /// Question with positive and negative buttons. Reports
    /// `dialog_clicked`.
    pub fn confirm(mut self, title: impl Into<String>, message: impl Into<String>) -> Self {
        let config = DialogConfig::Confirm {
            title: title.into(),
            message: message.into(),
            positive: self.positive_label.clone(),
            negative: self.negative_label.clone(),
        };
        self.shot.edit(|c| *c = config);
        self
    }

    /// Reports `value_selected` with a time.
    pub fn time_picker(mut self) -> Self {
        self.shot.edit(|c| {
            *c = DialogConfig::TimePicker {
                initial: None,
                is_24_hour: false,
            }
        });
        self
    }

    /// Reports `value_selected` with a date.
    pub fn date_picker(mut self) -> Self {
        self.shot
            .edit(|c| *c = DialogConfig::DatePicker { initial: None });
        self
    }

    pub fn progress(mut self, title: impl Into<String>, message: impl Into<String>) -> Self {
        let config = DialogConfig::Progress {
            title: title.into(),
            message: message.into(),
            cancelable: true,
        };
        self.shot.edit(|c| *c = config);
        self
    }

    pub fn dismiss_progress(mut self) -> Self {
        self.shot.edit(|c| *c = DialogConfig::DismissProgress);
        self
    }

    pub fn toast(mut self, message: impl Into<String>) -> Self {
        let config = DialogConfig::Toast {
            message: message.into(),
            long: false,
        };
        self.shot.edit(|c| *c = config);
        self
    }

    // ---- refinements ----

    pub fn positive(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.shot.edit(|c| match c {
            DialogConfig::Alert { positive, .. } | DialogConfig::Confirm { positive, .. } => {
                *positive = label.clone()
            }
            _ => {}
        });
        self.positive_label = label;
        self
    }

    pub fn negative(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.shot.edit(|c| {
            if let DialogConfig::Confirm { negative, .. } = c {
                *negative = label.clone();
            }
        });
        self.negative_label = label;
        self
    }

    pub fn initial_time(mut self, hour: u32, minute: u32) -> Self {
        self.shot.edit(|c| {
            if let DialogConfig::TimePicker { initial, .. } = c {
                *initial = Some((hour, minute));
            }
        });
        self
    }

    pub fn twenty_four_hour(mut self, enabled: bool) -> Self {
        self.shot.edit(|c| {
            if let DialogConfig::TimePicker { is_24_hour, .. } = c {
                *is_24_hour = enabled;
            }
        });
        self
    }

    pub fn initial_date(mut self, year: i32, month: u32, day: u32) -> Self {
        self.shot.edit(|c| {
            if let DialogConfig::DatePicker { initial } = c {
                *initial = Some((year, month, day));
            }
        });
        self
    }

    pub fn cancelable(mut self, enabled: bool) -> Self {
        self.shot.edit(|c| {
            if let DialogConfig::Progress { cancelable, .. } = c {
                *cancelable = enabled;
            }
        });
        self
    }

    /// Show a toast for the long duration.
    pub fn long(mut self) -> Self {
        self.shot.edit(|c| {
            if let DialogConfig::Toast { long, .. } = c {
                *long = true;
            }
        });
        self
    }

    /// Show the dialog.
    pub fn show(&mut self) -> Result<Dispatch> {
        let value_kind = match self.shot.peek() {
            Some(DialogConfig::TimePicker { .. }) => ValueKind::Time,
            Some(DialogConfig::DatePicker { .. }) => ValueKind::Date,
            _ => ValueKind::Any,
        };
        let config = self.shot.take(DialogConfig::validate)?;
        self.handle.fire(NativeRequest::Dialog(config), value_kind)
    }
}
