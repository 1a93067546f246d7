//! Logger setup for hosts of the bridge.

use crate::config::BridgeConfig;
use env_logger::{Builder, Env};

/// Initialise `env_logger`. `RUST_LOG` overrides the configured filter.
/// Calling it again is harmless.
pub fn init(config: &BridgeConfig) {
    let env = Env::default().default_filter_or(config.log_filter.as_str());
    if Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialised");
    }
}
