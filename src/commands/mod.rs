//! One-shot command builders, one per capability.
//!
//! A builder is created by a [`BridgeHandle`](crate::bridge::BridgeHandle),
//! configured with chained setters, and fired exactly once by its terminal
//! method. Firing freezes the configuration, issues one native invocation
//! and binds one fresh listener token to it.

pub mod dialog;
pub mod permission;
pub mod picker;
pub mod share;
pub mod update;

pub use dialog::DialogCommand;
pub use permission::{FINE_LOCATION, PermissionCommand};
pub use picker::PickerCommand;
pub use share::ShareCommand;
pub use update::{UpdateCommand, UpdateSession};

use crate::error::{BridgeError, Result};
use crate::events::TokenId;
use crate::token::{ListenerToken, OperationState};
use log::warn;
use native_layer::{Capability, PickerConfig};
use std::sync::Arc;

/// Result of a terminal call.
#[derive(Clone, Debug)]
pub enum Dispatch {
    /// The native layer accepted the invocation.
    Fired(Ticket),
    /// No native layer: nothing was invoked and no callback will follow.
    Inert(Capability),
}

impl Dispatch {
    pub fn is_inert(&self) -> bool {
        matches!(self, Dispatch::Inert(_))
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        match self {
            Dispatch::Fired(ticket) => Some(ticket),
            Dispatch::Inert(_) => None,
        }
    }

    /// Id carried by every event of this invocation.
    pub fn token_id(&self) -> Option<TokenId> {
        self.ticket().map(Ticket::id)
    }

    pub fn capability(&self) -> Capability {
        match self {
            Dispatch::Fired(ticket) => ticket.capability(),
            Dispatch::Inert(capability) => *capability,
        }
    }

    /// For callers that can't proceed without the native layer.
    pub fn require_native(self) -> Result<Ticket> {
        match self {
            Dispatch::Fired(ticket) => Ok(ticket),
            Dispatch::Inert(capability) => Err(BridgeError::PlatformUnsupported(capability)),
        }
    }
}

/// Application-side view of a fired invocation.
#[derive(Clone, Debug)]
pub struct Ticket(pub(crate) Arc<ListenerToken>);

impl Ticket {
    pub fn id(&self) -> TokenId {
        self.0.id()
    }

    pub fn capability(&self) -> Capability {
        self.0.capability()
    }

    pub fn state(&self) -> OperationState {
        self.0.state()
    }
}

/// Defaults applied to freshly created builders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandDefaults {
    pub picker: PickerConfig,
    pub positive_label: String,
    pub negative_label: String,
}

impl Default for CommandDefaults {
    fn default() -> Self {
        Self {
            picker: PickerConfig::default(),
            positive_label: "OK".to_string(),
            negative_label: "Cancel".to_string(),
        }
    }
}

/// Configuration slot of a single-use builder.
pub(crate) struct OneShot<C> {
    capability: Capability,
    config: Option<C>,
}

impl<C> OneShot<C> {
    pub(crate) fn new(capability: Capability, config: C) -> Self {
        Self {
            capability,
            config: Some(config),
        }
    }

    /// Apply a setter. Setters on a fired builder are ignored.
    pub(crate) fn edit(&mut self, f: impl FnOnce(&mut C)) {
        match self.config.as_mut() {
            Some(config) => f(config),
            None => warn!(
                "{} command already fired, setting ignored",
                self.capability
            ),
        }
    }

    pub(crate) fn peek(&self) -> Option<&C> {
        self.config.as_ref()
    }

    /// Validate and freeze the configuration. An invalid configuration
    /// leaves the builder unfired.
    pub(crate) fn take(
        &mut self,
        validate: impl FnOnce(&C) -> std::result::Result<(), String>,
    ) -> Result<C> {
        let config = self
            .config
            .as_ref()
            .ok_or(BridgeError::AlreadyFired(self.capability))?;
        validate(config).map_err(|reason| BridgeError::InvalidConfig {
            capability: self.capability,
            reason,
        })?;
        self.config
            .take()
            .ok_or(BridgeError::AlreadyFired(self.capability))
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.config.is_none()
    }
}
