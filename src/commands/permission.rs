//! Runtime permission requests.

use super::{Dispatch, OneShot};
use crate::bridge::BridgeHandle;
use crate::error::Result;
use crate::receiver::ValueKind;
use native_layer::{Capability, NativeRequest, PermissionConfig};

/// Permission needed by `enable_location`.
pub const FINE_LOCATION: &str = "android.permission.ACCESS_FINE_LOCATION";

pub struct PermissionCommand {
    handle: BridgeHandle,
    shot: OneShot<PermissionConfig>,
}

impl PermissionCommand {
    pub(crate) fn new(handle: BridgeHandle) -> Self {
        Self {
            handle,
            shot: OneShot::new(Capability::Permission, PermissionConfig::default()),
        }
    }

    pub fn permission(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.shot.edit(|c| {
            c.names.insert(name);
        });
        self
    }

    pub fn permissions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.shot.edit(|c| c.names.extend(names));
        self
    }

    /// Ask the user. Outcomes arrive on `permission_granted`,
    /// `permission_denied` or `permission_error`.
    pub fn request(&mut self) -> Result<Dispatch> {
        let config = self.shot.take(PermissionConfig::validate)?;
        self.handle
            .fire(NativeRequest::Permission(config), ValueKind::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeRoot;
    use crate::error::BridgeError;

    #[test]
    fn without_native_layer_request_is_inert() {
        let root = BridgeRoot::new();
        let handle = root.install(None);
        let dispatch = handle.permissions().permission("X").request().unwrap();
        assert!(matches!(dispatch, Dispatch::Inert(Capability::Permission)));
        assert_eq!(root.pending(), 0);
    }

    #[test]
    fn empty_request_is_invalid() {
        let root = BridgeRoot::new();
        let handle = root.install(None);
        let result = handle.permissions().permissions(Vec::<String>::new()).request();
        assert!(matches!(result, Err(BridgeError::InvalidConfig { .. })));
    }
}
