use crate::error::NativeError;
use crate::request::{NativeQuery, NativeRequest};
use crate::types::{CallbackTag, NativeValue, Platform};
use std::sync::Arc;

/// Environment variable that forces a platform (`android`, `ios`,
/// `simulated`, `none`).
pub const PLATFORM_ENV: &str = "NATIVE_BRIDGE_PLATFORM";

/// Receiving end of one invocation's callbacks.
///
/// The native layer may call this from any thread, any number of times, or
/// never. Implementations must return promptly and must not panic.
pub trait CallbackSink: Send + Sync {
    fn on_signal(&self, tag: CallbackTag, args: Vec<NativeValue>);
}

/// Trait that every native platform backend must implement.
/// The bridge core only ever talks to the platform through it.
pub trait NativeBackend: Send + Sync {
    /// Platform this backend drives.
    fn platform(&self) -> Platform;

    /// Issue one native invocation. Callbacks for this invocation, if any,
    /// are delivered to `sink` and to no other sink.
    fn invoke(&self, request: NativeRequest, sink: Arc<dyn CallbackSink>)
    -> Result<(), NativeError>;

    /// Answer a synchronous question.
    fn query(&self, query: &NativeQuery) -> Result<bool, NativeError>;

    /// Toggle the native side's own diagnostic logging.
    fn set_logging(&self, _enabled: bool) {}

    /// Release native resources. Called once when the owning bridge instance
    /// is replaced or dropped; must tolerate in-flight invocations.
    fn shutdown(&self) {}
}

/// Detect the platform from the environment and the compilation target.
pub fn detect_platform() -> Platform {
    if let Ok(value) = std::env::var(PLATFORM_ENV) {
        match value.to_lowercase().as_str() {
            "android" => return Platform::Android,
            "ios" => return Platform::Ios,
            "simulated" | "sim" => return Platform::Simulated,
            "none" | "unsupported" => return Platform::Unsupported,
            other => log::warn!("Ignoring unknown {}={}", PLATFORM_ENV, other),
        }
    }

    if cfg!(target_os = "android") {
        return Platform::Android;
    }
    if cfg!(target_os = "ios") {
        return Platform::Ios;
    }

    Platform::Unsupported
}

/// Create the backend for a platform.
/// Returns None when no backend for that platform is compiled in; callers
/// then run every capability inert.
pub fn create_backend(platform: Platform) -> Option<Box<dyn NativeBackend>> {
    match platform {
        #[cfg(feature = "simulated")]
        Platform::Simulated => Some(Box::new(crate::simulated::SimulatedBackend::new())),

        // Device bindings are registered by the host application through
        // its own NativeBackend implementation.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Use a mutex to ensure tests that modify env vars don't race
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_detect_platform_override() {
        let _guard = ENV_LOCK.lock().unwrap();

        unsafe {
            env::set_var(PLATFORM_ENV, "Simulated");
        }
        assert_eq!(detect_platform(), Platform::Simulated);
        unsafe {
            env::set_var(PLATFORM_ENV, "none");
        }
        assert_eq!(detect_platform(), Platform::Unsupported);
        unsafe {
            env::remove_var(PLATFORM_ENV);
        }
    }

    #[test]
    fn test_detect_platform_host() {
        let _guard = ENV_LOCK.lock().unwrap();

        unsafe {
            env::remove_var(PLATFORM_ENV);
        }
        if !cfg!(any(target_os = "android", target_os = "ios")) {
            assert_eq!(detect_platform(), Platform::Unsupported);
        }
    }

    #[test]
    fn test_create_backend_unsupported() {
        assert!(create_backend(Platform::Unsupported).is_none());
        assert!(create_backend(Platform::Android).is_none());
        #[cfg(feature = "simulated")]
        assert_eq!(
            create_backend(Platform::Simulated).map(|b| b.platform()),
            Some(Platform::Simulated)
        );
    }
}
