//! Time abstraction used by every time-aware source and operator.
//!
//! Operators never touch process-wide timers. They receive a
//! [`SharedScheduler`] and ask it to run callbacks later, which is what lets the
//! same pipeline run on a real Tokio runtime ([`TokioScheduler`]) or on a virtual
//! clock advanced by hand in tests ([`VirtualScheduler`]).

mod tokio_scheduler;
mod virtual_scheduler;

pub use tokio_scheduler::TokioScheduler;
pub use virtual_scheduler::VirtualScheduler;

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::task::AbortHandle;

use crate::{lock::lock, subscribe::Unsubscribeable};

/// Work scheduled once.
pub type OnceTask = Box<dyn FnOnce() + Send>;

/// Work scheduled periodically.
pub type RepeatingTask = Box<dyn FnMut() + Send>;

/// A scheduler shared between the operators of a pipeline.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// Smallest period accepted for repeating work; shorter periods are rounded up.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Orders delayed and periodic execution of callbacks.
///
/// Implementations must never start a callback whose [`TimerHandle`] has been
/// cancelled, even when the timer was already due.
pub trait Scheduler: Send + Sync {
    /// Runs `task` once, after `delay`.
    fn schedule_once(&self, delay: Duration, task: OnceTask) -> TimerHandle;

    /// Runs `task` every `period`, the first run happening one `period` from now.
    fn schedule_repeating(&self, period: Duration, task: RepeatingTask) -> TimerHandle;

    /// Cancels the timer behind `handle`.
    fn cancel(&self, handle: &TimerHandle) {
        handle.cancel();
    }

    /// Time elapsed on this scheduler's clock since it was created.
    fn now(&self) -> Duration;
}

struct TimerState {
    live: AtomicBool,
    abort: Mutex<Option<AbortHandle>>,
}

/// Cancelable handle to scheduled work.
///
/// Clones share the same timer. A one-shot timer becomes inactive once its
/// callback has started; a repeating one stays active until cancelled.
#[derive(Clone)]
pub struct TimerHandle {
    inner: Arc<TimerState>,
}

impl TimerHandle {
    pub(crate) fn new() -> Self {
        TimerHandle {
            inner: Arc::new(TimerState {
                live: AtomicBool::new(true),
                abort: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn set_abort(&self, abort: AbortHandle) {
        let mut slot = lock(&self.inner.abort);
        if self.is_active() {
            *slot = Some(abort);
        } else {
            abort.abort();
        }
    }

    /// Marks a one-shot timer as fired. Returns `false` if it was cancelled
    /// first, in which case the callback must not run.
    pub(crate) fn fire(&self) -> bool {
        self.inner.live.swap(false, Ordering::AcqRel)
    }

    /// Cancels the timer. The callback will not start after this returns.
    pub fn cancel(&self) {
        if self.inner.live.swap(false, Ordering::AcqRel) {
            tracing::trace!("timer cancelled");
        }
        if let Some(abort) = lock(&self.inner.abort).take() {
            abort.abort();
        }
    }

    /// Returns `true` while the callback may still run.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }
}

impl Unsubscribeable for TimerHandle {
    fn unsubscribe(&self) {
        self.cancel();
    }

    fn is_closed(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

pub(crate) fn clamp_period(period: Duration) -> Duration {
    period.max(MIN_PERIOD)
}
