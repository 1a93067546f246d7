//! Error types for native-layer

/// Errors reported synchronously by a native backend.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    #[error("native layer unavailable")]
    Unavailable,

    #[error("native call rejected ({code}): {message}")]
    Rejected { code: i32, message: String },

    #[error("native layer shut down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NativeError {
    /// Numeric code forwarded to error events. Codes other than `Rejected`
    /// map to `-1`, the generic failure code of the native plugin.
    pub fn code(&self) -> i32 {
        match self {
            NativeError::Rejected { code, .. } => *code,
            _ => -1,
        }
    }
}
