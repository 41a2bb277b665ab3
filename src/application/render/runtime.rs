use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{runtime::Handle, task::AbortHandle};

/// Single-slot mailbox holding at most one scheduled render for a viewer.
///
/// Scheduling replaces (and aborts) whatever was pending. Each scheduled task
/// carries a generation number; when its timer fires it claims the slot under
/// the lock and only runs if no newer task was scheduled in the meantime, so a
/// superseded task never runs even if its timer already elapsed.
#[derive(Default, Clone)]
pub struct PendingRender {
    slot: Arc<Mutex<PendingSlot>>,
}

#[derive(Default)]
struct PendingSlot {
    generation: u64,
    handle: Option<AbortHandle>,
}

impl PendingRender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless another task is scheduled first.
    /// Returns `true` when a pending task was superseded.
    pub fn schedule<F>(&self, runtime: &Handle, delay: Duration, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.lock();

        let superseded = match slot.handle.take() {
            Some(previous) => {
                previous.abort();
                true
            }
            None => false,
        };

        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        let pending = self.clone();

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if pending.claim(generation) {
                task();
            }
        });
        slot.handle = Some(handle.abort_handle());

        superseded
    }

    /// Drop the scheduled task, if any. Returns `true` when one was waiting.
    pub(crate) fn cancel(&self) -> bool {
        let mut slot = self.lock();
        slot.generation = slot.generation.wrapping_add(1);
        match slot.handle.take() {
            Some(previous) => {
                previous.abort();
                true
            }
            None => false,
        }
    }

    /// Whether a scheduled task has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.lock().handle.is_some()
    }

    fn claim(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        slot.handle = None;
        true
    }

    fn lock(&self) -> MutexGuard<'_, PendingSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
