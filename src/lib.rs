//! native-bridge: deliver native platform callbacks to one application
//! thread.
//!
//! Native completions arrive on arbitrary threads. Each one is decoded by a
//! [`NativeCallbackReceiver`](receiver::NativeCallbackReceiver), queued on
//! the [`DispatchQueue`](dispatch_queue::DispatchQueue) and published on the
//! [`EventBus`](event_bus::EventBus) when the host drains the queue from its
//! poll loop.

pub mod bridge;
pub mod commands;
pub mod config;
pub mod dispatch_queue;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod logging;
pub mod receiver;
pub mod token;

pub use bridge::{BridgeHandle, BridgeRoot, Lifecycle};
pub use commands::{Dispatch, Ticket};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use event_bus::{EventBus, EventChannel, Handler, handler};
pub use events::{Delivery, TokenId};
pub use token::OperationState;

pub use native_layer;
