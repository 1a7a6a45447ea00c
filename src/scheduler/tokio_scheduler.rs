use std::time::Duration;

use tokio::{
    runtime::Handle,
    time::{self, Instant, MissedTickBehavior},
};

use super::{clamp_period, OnceTask, RepeatingTask, Scheduler, TimerHandle};
use crate::errors::SchedulerError;

/// Real-time scheduler backed by Tokio timers.
///
/// Each scheduled callback runs inside its own Tokio task on the runtime the
/// scheduler was created for.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
    started: Instant,
}

impl TokioScheduler {
    /// Creates a scheduler that spawns its timers on `handle`.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        TokioScheduler {
            handle,
            started: Instant::now(),
        }
    }

    /// Creates a scheduler bound to the Tokio runtime of the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] when called outside of a Tokio runtime.
    pub fn current() -> Result<Self, SchedulerError> {
        Ok(TokioScheduler::new(Handle::try_current()?))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: OnceTask) -> TimerHandle {
        let timer = TimerHandle::new();
        let timer_task = timer.clone();

        let join = self.handle.spawn(async move {
            time::sleep(delay).await;
            if timer_task.fire() {
                task();
            }
        });
        timer.set_abort(join.abort_handle());
        timer
    }

    fn schedule_repeating(&self, period: Duration, mut task: RepeatingTask) -> TimerHandle {
        let period = clamp_period(period);
        let timer = TimerHandle::new();
        let timer_task = timer.clone();

        let join = self.handle.spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if !timer_task.is_active() {
                    break;
                }
                task();
            }
        });
        timer.set_abort(join.abort_handle());
        timer
    }

    fn now(&self) -> Duration {
        self.started.elapsed()
    }
}
