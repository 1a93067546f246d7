//! Image picking from camera or gallery.

use super::{Dispatch, OneShot};
use crate::bridge::BridgeHandle;
use crate::error::Result;
use crate::receiver::ValueKind;
use native_layer::{Capability, NativeRequest, PickerConfig, PickerSource};

pub struct PickerCommand {
    handle: BridgeHandle,
    shot: OneShot<PickerConfig>,
}

impl PickerCommand {
    pub(crate) fn new(handle: BridgeHandle, defaults: PickerConfig) -> Self {
        Self {
            handle,
            shot: OneShot::new(Capability::Picker, defaults),
        }
    }

    pub fn source(mut self, source: PickerSource) -> Self {
        self.shot.edit(|c| c.source = source);
        self
    }

    pub fn camera(self) -> Self {
        self.source(PickerSource::Camera)
    }

    pub fn gallery(self) -> Self {
        self.source(PickerSource::Gallery)
    }

    /// Bounds the picked image is scaled down to.
    pub fn max_size(mut self, width: u32, height: u32) -> Self {
        self.shot.edit(|c| {
            c.max_width = width;
            c.max_height = height;
        });
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.shot.edit(|c| c.quality = quality);
        self
    }

    /// Open the picker. The outcome arrives on `image_picked`.
    pub fn pick(&mut self) -> Result<Dispatch> {
        let config = self.shot.take(PickerConfig::validate)?;
        self.handle.fire(NativeRequest::Picker(config), ValueKind::Any)
    }
}
