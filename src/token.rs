//! Listener tokens: one per fired native invocation.

use crate::events::TokenId;
use log::{debug, warn};
use native_layer::Capability;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Where an invocation stands after it was fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationState {
    Fired,
    Completed,
    Failed,
}

impl OperationState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => OperationState::Completed,
            2 => OperationState::Failed,
            _ => OperationState::Fired,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            OperationState::Fired => 0,
            OperationState::Completed => 1,
            OperationState::Failed => 2,
        }
    }

    pub fn is_settled(self) -> bool {
        self != OperationState::Fired
    }
}

/// The bridge-side proxy of one invocation's eventual callback(s).
///
/// Lives from fire until the native layer stops referring to it. A native
/// layer that never calls back keeps it alive forever; that is a leak, not
/// an error.
#[derive(Debug)]
pub struct ListenerToken {
    id: TokenId,
    capability: Capability,
    generation: u64,
    state: AtomicU8,
}

impl ListenerToken {
    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Bridge instance the token was issued by.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> OperationState {
        OperationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `Fired` to a final state. Later outcomes are still
    /// delivered but don't change the state again.
    pub fn settle(&self, outcome: OperationState) -> bool {
        if !outcome.is_settled() {
            return false;
        }
        let settled = self
            .state
            .compare_exchange(
                OperationState::Fired.as_u8(),
                outcome.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if settled {
            debug!("{} {} settled: {:?}", self.capability, self.id, outcome);
        }
        settled
    }
}

/// Issues tokens for one bridge instance and tracks the ones still alive.
pub struct TokenRegistry {
    generation: u64,
    next_id: Arc<AtomicU64>,
    issued: Mutex<Vec<Weak<ListenerToken>>>,
}

impl TokenRegistry {
    /// `next_id` is shared across instances so ids stay unique after a
    /// reinstall.
    pub fn new(generation: u64, next_id: Arc<AtomicU64>) -> Self {
        Self {
            generation,
            next_id,
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn issue(&self, capability: Capability) -> Arc<ListenerToken> {
        let id = TokenId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let token = Arc::new(ListenerToken {
            id,
            capability,
            generation: self.generation,
            state: AtomicU8::new(OperationState::Fired.as_u8()),
        });

        let mut issued = self.lock();
        issued.retain(|t| t.strong_count() > 0);
        issued.push(Arc::downgrade(&token));
        token
    }

    /// Unsettled tokens still referenced, per capability.
    pub fn in_flight(&self) -> BTreeMap<Capability, usize> {
        let mut counts = BTreeMap::new();
        for token in self.lock().iter().filter_map(Weak::upgrade) {
            if !token.state().is_settled() {
                *counts.entry(token.capability()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Log tokens the native layer still holds when the instance goes away.
    pub fn log_orphans(&self) {
        for (capability, count) in self.in_flight() {
            warn!(
                "{} {} invocation(s) still pending at teardown (generation {})",
                count, capability, self.generation
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Weak<ListenerToken>>> {
        self.issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
