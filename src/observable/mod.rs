//! The `observable` module provides the building blocks for creating and manipulating
//! observables, allowing for reactive programming in Rust.

use std::{
    collections::VecDeque,
    error::Error,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    errors::ObservableError,
    lock::lock,
    observer::Observer,
    scheduler::{SharedScheduler, TimerHandle},
    subscription::subscribe::{
        wrap_subscriber, Subscribeable, Subscriber, Subscription, TeardownKey, UnsubscribeLogic,
    },
};

mod sources;

pub use sources::*;

/// The `Observable` struct represents a cold source of values that can be observed
/// and transformed.
///
/// An `Observable` is a description of work. Nothing happens until `subscribe` is
/// called, and every subscription runs the producer function again, independently
/// of every other subscription.
///
/// # Example: basic synchronous `Observable`
///
/// This simple `Observable` emits values and completes. Because it finishes before
/// `subscribe` returns, there is nothing to tear down and it returns an empty
/// `Subscription`.
///
/// ```no_run
/// use rxhub::subscribe::{Subscriber, Subscription};
/// use rxhub::{Observable, Observer, Subscribeable};
///
/// let mut emit_10_observable = Observable::new(|mut subscriber| {
///     for i in 1..=10 {
///         // Stop early if the subscriber went away.
///         if subscriber.is_closed() {
///             break;
///         }
///         subscriber.next(i);
///     }
///     subscriber.complete();
///
///     Subscription::empty()
/// });
///
/// let observer = Subscriber::new(
///     |v| println!("Emitted {}", v),
///     |e| eprintln!("Error {}", e),
///     || println!("Completed"),
/// );
///
/// // If you comment out the line below, no emissions will occur because
/// // observables are cold.
/// emit_10_observable.subscribe(observer);
/// ```
///
/// # Example: `Observable` with teardown
///
/// Producers that keep running after `subscribe` returns hand their cleanup back
/// through the returned `Subscription`.
///
/// ```no_run
/// use std::{sync::Arc, time::Duration};
///
/// use rxhub::scheduler::{Scheduler, VirtualScheduler};
/// use rxhub::subscribe::{Subscriber, Subscription, UnsubscribeLogic};
/// use rxhub::{Observable, Observer, Subscribeable, Unsubscribeable};
///
/// let scheduler = VirtualScheduler::new();
/// let clock = scheduler.clone();
///
/// let mut ticks = Observable::new(move |mut subscriber| {
///     let handle = clock.schedule_repeating(
///         Duration::from_millis(10),
///         Box::new(move || subscriber.next("tick")),
///     );
///     Subscription::new(UnsubscribeLogic::Logic(Box::new(move || handle.cancel())))
/// });
///
/// let subscription = ticks.subscribe(Subscriber::on_next(|v| println!("{}", v)));
/// scheduler.advance_by(Duration::from_millis(30)); // Prints "tick" three times.
/// subscription.unsubscribe();
/// scheduler.advance_by(Duration::from_millis(30)); // Prints nothing.
/// ```
pub struct Observable<T> {
    subscribe_fn: Box<dyn FnMut(Subscriber<T>) -> Subscription + Send + Sync>,
}

impl<T> Observable<T> {
    /// Creates a new `Observable` with the provided subscribe function.
    ///
    /// The subscribe function (`sf`) is invoked once per subscription with a
    /// `Subscriber` it should push values into. It returns a `Subscription`
    /// owning whatever the producer needs to release when the subscriber leaves:
    /// timers, inner subscriptions, async cleanup.
    ///
    /// A panic inside `sf` is caught and delivered to the subscriber as an
    /// [`ObservableError::Panicked`] error.
    pub fn new(sf: impl FnMut(Subscriber<T>) -> Subscription + Send + Sync + 'static) -> Self {
        Observable {
            subscribe_fn: Box::new(sf),
        }
    }
}

impl<T: 'static> Subscribeable for Observable<T> {
    type ObsType = T;

    fn subscribe(&mut self, v: Subscriber<Self::ObsType>) -> Subscription {
        let subscription = Subscription::empty();
        let downstream = Arc::new(Mutex::new(v.bind(subscription.clone())));
        let sink = wrap_subscriber(Arc::clone(&downstream)).bind(subscription.clone());

        let subscribe_fn = &mut self.subscribe_fn;
        match catch_unwind(AssertUnwindSafe(|| subscribe_fn(sink))) {
            Ok(teardown) => {
                subscription.add(teardown);
            }
            Err(payload) => {
                let error = ObservableError::from_panic("producer", payload);
                tracing::debug!(%error, "producer panicked during subscribe");
                lock(&downstream).error(error.shared());
            }
        }
        subscription
    }
}

/// Runs a notification against a shared subscriber, turning a panic into an error
/// delivered to that same subscriber.
pub(crate) fn run_guarded<T>(
    o: &Mutex<Subscriber<T>>,
    operator: &'static str,
    f: impl FnOnce(&mut Subscriber<T>),
) {
    let outcome = catch_unwind(AssertUnwindSafe(|| f(&mut lock(o))));
    if let Err(payload) = outcome {
        let error = ObservableError::from_panic(operator, payload);
        tracing::warn!(%error, "scheduled delivery panicked");
        lock(o).error(error.shared());
    }
}

/// The `ObservableExt` trait provides a set of extension methods that can be applied
/// to observables to transform and manipulate their behavior.
///
/// Every operator returns a new cold `Observable`. Subscribing to it subscribes to
/// the source, and unsubscribing it releases the source subscription as well as
/// anything the operator itself holds (timers, inner subscriptions).
///
/// Closures passed to operators are cloned for every subscription of the
/// resulting `Observable`, so state captured by a closure starts fresh each time
/// and is never shared between executions. A panic inside one of them is caught
/// and delivered downstream as an error, which also unsubscribes from the source.
pub trait ObservableExt<T: 'static>: Subscribeable<ObsType = T> {
    /// Transforms the items emitted by the observable using a transformation
    /// function.
    ///
    /// The transformation function `f` is applied to each item emitted by the
    /// observable, and the resulting value is emitted by the resulting observable.
    fn map<U, F>(mut self, f: F) -> Observable<U>
    where
        Self: Sized + Send + Sync + 'static,
        F: (FnMut(T) -> U) + Clone + Send + Sync + 'static,
        U: 'static,
    {
        Observable::new(move |o| {
            let parent = o.subscription();
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);
            let mut f = f.clone();

            let u = Subscriber::new(
                move |v| match catch_unwind(AssertUnwindSafe(|| f(v))) {
                    Ok(t) => lock(&o_shared).next(t),
                    Err(payload) => lock(&o_shared).error(ObservableError::from_panic("map", payload).shared()),
                },
                move |observable_error| {
                    lock(&o_cloned_e).error(observable_error);
                },
                move || {
                    lock(&o_cloned_c).complete();
                },
            )
            .link(parent);
            self.subscribe(u)
        })
    }

    /// Like [`map`](Self::map), but the transformation may fail. An `Err` returned
    /// by `f` is emitted as the error of the resulting observable.
    fn try_map<U, E, F>(mut self, f: F) -> Observable<U>
    where
        Self: Sized + Send + Sync + 'static,
        F: (FnMut(T) -> Result<U, E>) + Clone + Send + Sync + 'static,
        E: Error + Send + Sync + 'static,
        U: 'static,
    {
        Observable::new(move |o| {
            let parent = o.subscription();
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);
            let mut f = f.clone();

            let u = Subscriber::new(
                move |v| match catch_unwind(AssertUnwindSafe(|| f(v))) {
                    Ok(Ok(t)) => lock(&o_shared).next(t),
                    Ok(Err(e)) => lock(&o_shared).error(Arc::new(e)),
                    Err(payload) => {
                        lock(&o_shared).error(ObservableError::from_panic("try_map", payload).shared())
                    }
                },
                move |observable_error| {
                    lock(&o_cloned_e).error(observable_error);
                },
                move || {
                    lock(&o_cloned_c).complete();
                },
            )
            .link(parent);
            self.subscribe(u)
        })
    }

    /// Filters the items emitted by the observable based on a predicate function.
    ///
    /// Only items for which the predicate function returns `true` will be emitted
    /// by the resulting observable.
    fn filter<P>(mut self, predicate: P) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        P: (FnMut(&T) -> bool) + Clone + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let parent = o.subscription();
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);
            let mut predicate = predicate.clone();

            let u = Subscriber::new(
                move |v| match catch_unwind(AssertUnwindSafe(|| predicate(&v))) {
                    Ok(true) => lock(&o_shared).next(v),
                    Ok(false) => {}
                    Err(payload) => {
                        lock(&o_shared).error(ObservableError::from_panic("filter", payload).shared())
                    }
                },
                move |observable_error| {
                    lock(&o_cloned_e).error(observable_error);
                },
                move || {
                    lock(&o_cloned_c).complete();
                },
            )
            .link(parent);
            self.subscribe(u)
        })
    }

    /// Calls `f` with a reference to every item and passes the item through
    /// unchanged. Useful for logging and debugging pipelines.
    fn tap<F>(mut self, f: F) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        F: (FnMut(&T)) + Clone + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let parent = o.subscription();
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);
            let mut f = f.clone();

            let u = Subscriber::new(
                move |v| match catch_unwind(AssertUnwindSafe(|| f(&v))) {
                    Ok(()) => lock(&o_shared).next(v),
                    Err(payload) => lock(&o_shared).error(ObservableError::from_panic("tap", payload).shared()),
                },
                move |observable_error| {
                    lock(&o_cloned_e).error(observable_error);
                },
                move || {
                    lock(&o_cloned_c).complete();
                },
            )
            .link(parent);
            self.subscribe(u)
        })
    }

    /// Skips the first `n` items emitted by the observable and then emits the rest.
    ///
    /// If `n` is greater than or equal to the total number of items, it behaves as
    /// if the observable is complete and emits no items.
    fn skip(mut self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let parent = o.subscription();
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let mut n = n;
            let u = Subscriber::new(
                move |v| {
                    if n > 0 {
                        n -= 1;
                        return;
                    }
                    lock(&o_shared).next(v);
                },
                move |observable_error| {
                    lock(&o_cloned_e).error(observable_error);
                },
                move || {
                    lock(&o_cloned_c).complete();
                },
            )
            .link(parent);
            self.subscribe(u)
        })
    }

    /// Emits at most the first `n` items emitted by the observable, then completes
    /// and unsubscribes from the source.
    ///
    /// `take(0)` completes immediately without subscribing to the source at all.
    fn take(mut self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |mut o| {
            if n == 0 {
                o.complete();
                return Subscription::empty();
            }

            let parent = o.subscription();
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let mut taken = 0;
            let u = Subscriber::new(
                move |v| {
                    taken += 1;
                    let mut o = lock(&o_shared);
                    o.next(v);
                    if taken == n {
                        // Completing unsubscribes the source through the shared
                        // subscription.
                        o.complete();
                    }
                },
                move |observable_error| {
                    lock(&o_cloned_e).error(observable_error);
                },
                move || {
                    lock(&o_cloned_c).complete();
                },
            )
            .link(parent);
            self.subscribe(u)
        })
    }

    /// Emits only the first item and completes. Same as `take(1)`.
    fn first(self) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        self.take(1)
    }

    /// Delays the emissions from the observable by `duration`, measured on
    /// `scheduler`.
    ///
    /// Values and the completion are shifted in time and keep their order. An error
    /// is forwarded immediately and drops everything still waiting. Unsubscribing
    /// cancels every pending delivery.
    fn delay(mut self, duration: Duration, scheduler: SharedScheduler) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send,
    {
        Observable::new(move |o| {
            let parent = o.subscription();
            let state = Arc::new(DelayState {
                downstream: Arc::new(Mutex::new(o)),
                queue: Mutex::new(VecDeque::new()),
                timers: Mutex::new(Vec::new()),
                scheduler: Arc::clone(&scheduler),
                duration,
            });
            let state_n = Arc::clone(&state);
            let state_e = Arc::clone(&state);
            let state_c = Arc::clone(&state);

            let u = Subscriber::new(
                move |v| state_n.push(Delayed::Next(v)),
                move |observable_error| {
                    state_e.cancel_all();
                    lock(&state_e.downstream).error(observable_error);
                },
                move || state_c.push(Delayed::Complete),
            )
            .link(parent);

            let upstream = self.subscribe(u);
            let teardown = Subscription::new(UnsubscribeLogic::Logic(Box::new(move || state.cancel_all())));
            teardown.add(upstream);
            teardown
        })
    }

    /// Transforms the items emitted by an observable into observables, and mirrors
    /// only the most recently projected one.
    ///
    /// When a new item arrives, the subscription to the previous inner observable is
    /// released before the new inner observable is subscribed, so at most one inner
    /// subscription is alive at any time and stale inner values never reach the
    /// output.
    ///
    /// The resulting observable completes once the source has completed and the
    /// current inner observable (if any) has completed. An error from the source or
    /// from the current inner observable terminates everything.
    ///
    /// # Parameters
    /// - `project`: A closure that maps each source item to an observable.
    ///
    /// # Returns
    /// An observable that emits the items from the most recently emitted inner
    /// observable.
    fn switch_map<R: 'static, F>(mut self, project: F) -> Observable<R>
    where
        Self: Sized + Send + Sync + 'static,
        F: (FnMut(T) -> Observable<R>) + Clone + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let parent = o.subscription();
            let state = Arc::new(SwitchState {
                downstream: Arc::new(Mutex::new(o)),
                inners: Subscription::empty(),
                slot: Mutex::new(SwitchSlot::default()),
            });
            let state_n = Arc::clone(&state);
            let state_e = Arc::clone(&state);
            let state_c = Arc::clone(&state);
            let mut project = project.clone();

            let u = Subscriber::new(
                move |v| match catch_unwind(AssertUnwindSafe(|| project(v))) {
                    Ok(inner) => state_n.switch_to(inner),
                    Err(payload) => lock(&state_n.downstream)
                        .error(ObservableError::from_panic("switch_map", payload).shared()),
                },
                move |observable_error| {
                    lock(&state_e.downstream).error(observable_error);
                },
                move || state_c.outer_completed(),
            )
            .link(parent);

            let upstream = self.subscribe(u);
            // LIFO teardown: the source goes first so it cannot start a new inner
            // while the current one is being released.
            let teardown = Subscription::new(UnsubscribeLogic::Wrapped(state.inners.clone()));
            teardown.add(upstream);
            teardown
        })
    }
}

impl<O, T: 'static> ObservableExt<T> for O where O: Subscribeable<ObsType = T> {}

enum Delayed<T> {
    Next(T),
    Complete,
}

struct DelayState<T> {
    downstream: Arc<Mutex<Subscriber<T>>>,
    queue: Mutex<VecDeque<Delayed<T>>>,
    timers: Mutex<Vec<TimerHandle>>,
    scheduler: SharedScheduler,
    duration: Duration,
}

impl<T: Send + 'static> DelayState<T> {
    fn push(self: &Arc<Self>, item: Delayed<T>) {
        lock(&self.queue).push_back(item);

        let state = Arc::clone(self);
        let handle = self
            .scheduler
            .schedule_once(self.duration, Box::new(move || state.deliver_front()));

        let mut timers = lock(&self.timers);
        timers.retain(TimerHandle::is_active);
        timers.push(handle);
    }

    // Every timer pops the oldest entry rather than a captured value, so order
    // holds even if two timers fire concurrently.
    fn deliver_front(&self) {
        run_guarded(&self.downstream, "delay", |o| {
            let item = lock(&self.queue).pop_front();
            match item {
                Some(Delayed::Next(v)) => o.next(v),
                Some(Delayed::Complete) => o.complete(),
                None => {}
            }
        });
    }

    fn cancel_all(&self) {
        let timers = std::mem::take(&mut *lock(&self.timers));
        for timer in &timers {
            timer.cancel();
        }
        lock(&self.queue).clear();
    }
}

#[derive(Default)]
struct SwitchSlot {
    next_id: u64,
    active: Option<ActiveInner>,
    outer_done: bool,
}

#[derive(Clone, Copy)]
struct ActiveInner {
    id: u64,
    key: Option<TeardownKey>,
}

struct SwitchState<R> {
    downstream: Arc<Mutex<Subscriber<R>>>,
    // Owns the current inner subscription, if any.
    inners: Subscription,
    slot: Mutex<SwitchSlot>,
}

impl<R: 'static> SwitchState<R> {
    fn is_current(&self, id: u64) -> bool {
        lock(&self.slot).active.is_some_and(|a| a.id == id)
    }

    fn switch_to(self: &Arc<Self>, mut inner: Observable<R>) {
        let (id, previous) = {
            let mut slot = lock(&self.slot);
            slot.next_id += 1;
            let id = slot.next_id;
            (id, slot.active.replace(ActiveInner { id, key: None }))
        };

        if let Some(key) = previous.and_then(|p| p.key) {
            if let Some(logic) = self.inners.remove(key) {
                tracing::trace!(id, "switch_map releasing previous inner");
                logic.unsubscribe();
            }
        }

        let s_next = Arc::clone(self);
        let s_error = Arc::clone(self);
        let s_complete = Arc::clone(self);
        let inner_subscriber = Subscriber::new(
            move |v| {
                // Checked under the downstream lock so a switch cannot slip in
                // between the check and the delivery.
                let mut o = lock(&s_next.downstream);
                if s_next.is_current(id) {
                    o.next(v);
                }
            },
            move |observable_error| {
                let mut o = lock(&s_error.downstream);
                if s_error.is_current(id) {
                    o.error(observable_error);
                }
            },
            move || s_complete.inner_completed(id),
        );

        let subscription = inner.subscribe(inner_subscriber);
        if !self.is_current(id) {
            // Completed synchronously or already superseded.
            return;
        }

        let key = self.inners.add(subscription);
        let mut slot = lock(&self.slot);
        match slot.active.as_mut() {
            Some(active) if active.id == id => active.key = Some(key),
            _ => {
                drop(slot);
                if let Some(logic) = self.inners.remove(key) {
                    logic.unsubscribe();
                }
            }
        }
    }

    fn inner_completed(&self, id: u64) {
        let complete = {
            let mut slot = lock(&self.slot);
            if !slot.active.is_some_and(|a| a.id == id) {
                return;
            }
            if let Some(key) = slot.active.take().and_then(|a| a.key) {
                // The inner is finishing on its own; just stop owning it.
                self.inners.remove(key);
            }
            slot.outer_done
        };
        if complete {
            lock(&self.downstream).complete();
        }
    }

    fn outer_completed(&self) {
        let complete = {
            let mut slot = lock(&self.slot);
            slot.outer_done = true;
            slot.active.is_none()
        };
        if complete {
            lock(&self.downstream).complete();
        }
    }
}
