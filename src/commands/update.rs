//! App update flow: check, then start / complete / resume on the session
//! returned by the check.

use super::{Dispatch, OneShot};
use crate::bridge::BridgeHandle;
use crate::error::Result;
use crate::receiver::ValueKind;
use native_layer::{Capability, NativeRequest, UpdateConfig, UpdateMode, UpdateStep, UpdateType};

pub struct UpdateCommand {
    handle: BridgeHandle,
    shot: OneShot<UpdateConfig>,
}

impl UpdateCommand {
    pub(crate) fn new(handle: BridgeHandle) -> Self {
        Self {
            handle,
            shot: OneShot::new(Capability::Update, UpdateConfig::default()),
        }
    }

    /// Update through the platform store (default).
    pub fn play_store(mut self) -> Self {
        self.shot.edit(|c| {
            c.mode = UpdateMode::PlayStore;
            c.link = None;
        });
        self
    }

    /// Update from a download link outside the store.
    pub fn third_party(mut self, link: impl Into<String>) -> Self {
        let link = link.into();
        self.shot.edit(|c| {
            c.mode = UpdateMode::ThirdParty;
            c.link = Some(link);
        });
        self
    }

    pub fn update_type(mut self, update_type: UpdateType) -> Self {
        self.shot.edit(|c| c.update_type = update_type);
        self
    }

    pub fn immediate(self) -> Self {
        self.update_type(UpdateType::Immediate)
    }

    pub fn flexible(self) -> Self {
        self.update_type(UpdateType::Flexible)
    }

    /// Ask whether an update is available. Outcomes arrive on
    /// `update_available`, `update_version_code` and `update_staleness_days`.
    pub fn check(&mut self) -> Result<UpdateSession> {
        let config = self.shot.take(UpdateConfig::validate)?;
        let check = self.handle.fire(
            NativeRequest::Update {
                step: UpdateStep::Check,
                config: config.clone(),
            },
            ValueKind::Any,
        )?;
        Ok(UpdateSession {
            handle: self.handle.clone(),
            config,
            check,
        })
    }
}

/// Retained handle of a checked update. Each step is its own invocation
/// with its own token.
#[derive(Clone)]
pub struct UpdateSession {
    handle: BridgeHandle,
    config: UpdateConfig,
    check: Dispatch,
}

impl UpdateSession {
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Dispatch of the initial check.
    pub fn check_dispatch(&self) -> &Dispatch {
        &self.check
    }

    /// Start downloading. Progress arrives on `update_install_state` and
    /// `update_downloading`.
    pub fn start(&self) -> Result<Dispatch> {
        self.step(UpdateStep::Start)
    }

    /// Install a downloaded update.
    pub fn complete(&self) -> Result<Dispatch> {
        self.step(UpdateStep::Complete)
    }

    /// Pick up an update left pending by a previous run.
    pub fn resume(&self) -> Result<Dispatch> {
        self.step(UpdateStep::Resume)
    }

    fn step(&self, step: UpdateStep) -> Result<Dispatch> {
        self.handle.fire(
            NativeRequest::Update {
                step,
                config: self.config.clone(),
            },
            ValueKind::Any,
        )
    }
}
