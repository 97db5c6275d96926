//! Cooperative pause/resume checked by the run loop between batches.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    Running,
    Paused,
}

#[derive(Debug, Default)]
struct Inner {
    paused: Mutex<bool>,
    resumed: Notify,
}

/// Shared between the controlling caller (toggle) and the run loop (wait).
#[derive(Debug, Clone, Default)]
pub struct PauseGate {
    inner: Arc<Inner>,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.inner.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PauseState {
        if *self.flag() {
            PauseState::Paused
        } else {
            PauseState::Running
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PauseState::Paused
    }

    /// Flip the state and return the new one. Resuming wakes a blocked run loop.
    pub fn toggle(&self) -> PauseState {
        let mut paused = self.flag();
        *paused = !*paused;
        if *paused {
            PauseState::Paused
        } else {
            self.inner.resumed.notify_waiters();
            PauseState::Running
        }
    }

    /// Block while paused, re-checking every `poll`. Returns `false` when
    /// `cancel` fires first.
    pub async fn wait_until_running(&self, poll: Duration, cancel: &CancellationToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let notified = self.inner.resumed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_paused() {
                return true;
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(poll) => {}
                _ = cancel.cancelled() => return false,
            }
        }
    }
}
