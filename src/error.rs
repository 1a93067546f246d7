//! Error types for the bridge core.

use native_layer::{Capability, CallbackTag, NativeError};

/// Bridge errors.
///
/// Returned from application-facing calls, and published on the
/// `bridge-error` channel when they happen inside a drain tick or on a
/// native callback thread.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("{0}: native layer not available on this platform")]
    PlatformUnsupported(Capability),

    #[error("{capability}: native call failed ({code}): {message}")]
    NativeInvocation {
        capability: Capability,
        code: i32,
        message: String,
    },

    #[error("malformed {tag} payload: {reason}")]
    MalformedCallbackPayload { tag: CallbackTag, reason: String },

    #[error("bridge instance was replaced")]
    ConcurrentReinitialization,

    #[error("{0} command already fired")]
    AlreadyFired(Capability),

    #[error("invalid {capability} configuration: {reason}")]
    InvalidConfig {
        capability: Capability,
        reason: String,
    },

    #[error("permission required: {0}")]
    PermissionRequired(String),

    #[error("dispatch queue drained off its designated thread")]
    NotDispatchThread,

    #[error("dispatch queue drained from inside a drain tick")]
    ReentrantDrain,

    #[error("event handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn native(capability: Capability, err: &NativeError) -> Self {
        Self::NativeInvocation {
            capability,
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn config<T: std::fmt::Display>(inner: T) -> Self {
        Self::Config(inner.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
