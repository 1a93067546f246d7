//! native-layer: the boundary between the bridge core and the platform.
//!
//! Everything the core hands to the platform (typed requests, queries) and
//! everything the platform hands back (raw callback signals) is defined here.
//! Platform bindings implement [`NativeBackend`]; the `simulated` backend
//! stands in for a real device and answers on its own threads.

pub mod backend;
pub mod error;
pub mod request;
pub mod types;

#[cfg(feature = "simulated")]
pub mod simulated;

pub use backend::*;
pub use error::NativeError;
pub use request::*;
pub use types::*;
