//! Definition of [`RetryTimer`], which schedules flush retries of [`OutBox`][crate::OutBox].

use std::time::Duration;

use log::error;
use tokio::{runtime::Handle, task::JoinHandle, time::sleep};

/// Holds at most one pending timer.
///
/// Every timer gets new generation number, which is passed to the callback.
/// Callback must check it with [`RetryTimer::fire`], because aborted timer
/// may still run if it has already passed its sleep.
#[derive(Default)]
pub(crate) struct RetryTimer {
    /// Task of the pending timer.
    pending: Option<JoinHandle<()>>,
    /// Generation of the last set timer.
    generation: u64,
}

impl RetryTimer {
    /// Returns true if timer is set and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Set timer with the specified delay, unless some timer is already pending.
    pub fn set_once<F>(&mut self, delay: Duration, on_fire: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if self.pending.is_some() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            error!("can not set retry timer: no tokio runtime");
            return;
        };
        self.generation += 1;
        let generation = self.generation;
        self.pending = Some(runtime.spawn(async move {
            sleep(delay).await;
            on_fire(generation);
        }));
    }

    /// Mark timer of the given generation as fired.
    /// Returns false if it was cancelled or replaced.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.pending.is_some() && self.generation == generation {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Cancel pending timer.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.abort();
        }
    }
}
