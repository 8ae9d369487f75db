//! Render-thread identity.

use std::sync::OnceLock;
use std::thread::{self, ThreadId};

use crate::error::{InvariantViolation, RenderResult};

/// Latches the first thread that runs a frame and rejects render-thread-only
/// calls from any other thread.
#[derive(Debug, Default)]
pub struct RenderThreadGuard {
    owner: OnceLock<ThreadId>,
}

impl RenderThreadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the calling thread if no thread has been latched yet.
    pub fn latch(&self) -> RenderResult<()> {
        let current = thread::current().id();
        let owner = *self.owner.get_or_init(|| {
            log::debug!("render thread latched: {current:?}");
            current
        });
        self.check_owner(owner, current, "latch")
    }

    /// Fails with `WrongThread` unless the caller is the latched thread.
    /// Before latching, every caller is accepted.
    pub fn verify(&self, operation: &'static str) -> RenderResult<()> {
        match self.owner.get() {
            Some(owner) => self.check_owner(*owner, thread::current().id(), operation),
            None => Ok(()),
        }
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner.get().copied()
    }

    fn check_owner(
        &self,
        owner: ThreadId,
        current: ThreadId,
        operation: &'static str,
    ) -> RenderResult<()> {
        if owner == current {
            return Ok(());
        }
        log::error!("{operation} called from {current:?}, render thread is {owner:?}");
        Err(InvariantViolation::WrongThread { operation }.into())
    }
}
