use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, Weak},
    thread::{self, ThreadId},
};

use crate::{
    errors::SharedError,
    lock::lock,
    observer::Observer,
    subscribe::Unsubscribeable,
    subscription::subscribe::{Subscribeable, Subscriber, Subscription, UnsubscribeLogic},
    Observable,
};

/// How much history a `Subject` keeps for subscribers that attach late.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Nothing is retained; late subscribers only see future values.
    None,

    /// The most recent value is retained and handed to every new subscriber.
    Last,

    /// Up to `n` most recent values are retained and replayed in emission order.
    Bounded(usize),
}

#[derive(Clone)]
enum SubjectStatus {
    Active,
    Completed,
    Errored(SharedError),
}

type SharedSubscriber<T> = Arc<Mutex<Subscriber<T>>>;

enum Signal<T> {
    Next(T),
    Error(SharedError),
    Complete,
}

// Signals raised by the emitting thread from inside its own delivery callbacks.
struct Reentry<T> {
    owner: Option<ThreadId>,
    pending: VecDeque<Signal<T>>,
}

// Clears the owning thread even if a subscriber callback panics.
struct EmittingThread<'a, T>(&'a Subject<T>);

impl<T> Drop for EmittingThread<'_, T> {
    fn drop(&mut self) {
        let mut reentry = lock(&self.0.reentry);
        reentry.owner = None;
        reentry.pending.clear();
    }
}

struct SubjectState<T> {
    status: SubjectStatus,
    observers: Vec<(u64, SharedSubscriber<T>)>,
    buffer: VecDeque<T>,
    next_key: u64,
}

/// A `Subject` represents a unique variant of an `Observable` that enables
/// multicasting values to multiple `Observers`.
///
/// Unlike regular `Observables`, which are unicast (each subscribed `Observer` has
/// its independent execution of the `Observable`), `Subjects` are multicast: a
/// single `next` call reaches every subscriber attached at that moment, in the
/// order they subscribed.
///
/// One type covers the three classic flavours; the difference is only the
/// [`BufferPolicy`]:
///
/// - [`Subject::emitter_receiver`]: no buffer.
/// - [`BehaviorSubject::emitter_receiver`]: keeps the latest value.
/// - [`ReplaySubject::emitter_receiver`]: keeps the last `n` values.
///
/// After `complete` or `error` the `Subject` is stopped for good. Later `next`
/// calls are dropped, and late subscribers receive the buffered values followed
/// by the stored terminal notification.
///
/// Delivery is synchronous: `next` returns once every subscriber has handled the
/// value. There is no backpressure; a slow subscriber blocks the emitting caller.
/// Concurrent emitters are serialized. A subscriber may emit into the same
/// `Subject` from inside its own callback: the nested signal is queued and
/// delivered once the current one has reached every subscriber.
///
/// [`BehaviorSubject::emitter_receiver`]: super::BehaviorSubject::emitter_receiver
/// [`ReplaySubject::emitter_receiver`]: super::ReplaySubject::emitter_receiver
///
/// # Examples
///
///```no_run
/// use rxhub::{subjects::Subject, subscribe::Subscriber};
/// use rxhub::{ObservableExt, Observer, Subscribeable};
///
/// let (mut emitter, mut receiver) = Subject::emitter_receiver();
///
/// emitter.next(100); // No subscribers yet, nothing is retained.
///
/// receiver.subscribe(Subscriber::on_next(|v| println!("Subscriber #1: {}", v)));
///
/// receiver
///     .clone() // Shallow clone: clones only the pointer to the `Subject`.
///     .map(|v| format!("mapped {}", v))
///     .subscribe(Subscriber::on_next(|v| println!("Subscriber #2: {}", v)));
///
/// emitter.next(101); // Reaches both subscribers.
/// emitter.complete();
/// emitter.next(102); // Called post-completion, does not emit.
///```
pub struct Subject<T> {
    policy: BufferPolicy,
    state: Mutex<SubjectState<T>>,
    emit_lock: Mutex<()>,
    reentry: Mutex<Reentry<T>>,
}

impl<T: Clone + Send + 'static> Subject<T> {
    /// Creates a new pair of `SubjectEmitter` for emitting values and
    /// `SubjectReceiver` for subscribing to values, with no replay buffer.
    pub fn emitter_receiver() -> (SubjectEmitter<T>, SubjectReceiver<T>) {
        Subject::with_policy(BufferPolicy::None)
    }

    /// Creates an emitter/receiver pair for a `Subject` using `policy`.
    pub fn with_policy(policy: BufferPolicy) -> (SubjectEmitter<T>, SubjectReceiver<T>) {
        Subject::with_buffer(policy, VecDeque::new())
    }

    pub(super) fn with_buffer(
        policy: BufferPolicy,
        buffer: VecDeque<T>,
    ) -> (SubjectEmitter<T>, SubjectReceiver<T>) {
        let s = Arc::new(Subject {
            policy,
            state: Mutex::new(SubjectState {
                status: SubjectStatus::Active,
                observers: Vec::with_capacity(16),
                buffer,
                next_key: 0,
            }),
            emit_lock: Mutex::new(()),
            reentry: Mutex::new(Reentry {
                owner: None,
                pending: VecDeque::new(),
            }),
        });

        (
            SubjectEmitter(Arc::clone(&s)),
            SubjectReceiver(Arc::clone(&s)),
        )
    }
}

impl<T> Subject<T> {
    fn record(&self, buffer: &mut VecDeque<T>, v: T) {
        match self.policy {
            BufferPolicy::None => {}
            BufferPolicy::Last => {
                buffer.clear();
                buffer.push_back(v);
            }
            BufferPolicy::Bounded(capacity) => {
                if capacity == 0 {
                    return;
                }
                while buffer.len() >= capacity {
                    buffer.pop_front();
                }
                buffer.push_back(v);
            }
        }
    }

    fn len(&self) -> usize {
        lock(&self.state).observers.len()
    }

    fn is_stopped(&self) -> bool {
        !matches!(lock(&self.state).status, SubjectStatus::Active)
    }

    fn terminate(&self, status: SubjectStatus) {
        let observers = {
            let mut state = lock(&self.state);
            if !matches!(state.status, SubjectStatus::Active) {
                return;
            }
            state.status = status.clone();
            std::mem::take(&mut state.observers)
        };

        match status {
            SubjectStatus::Errored(e) => {
                tracing::debug!(subscribers = observers.len(), error = %e, "subject errored");
                for (_, o) in observers {
                    lock(&o).error(Arc::clone(&e));
                }
            }
            SubjectStatus::Completed => {
                tracing::debug!(subscribers = observers.len(), "subject completed");
                for (_, o) in observers {
                    lock(&o).complete();
                }
            }
            SubjectStatus::Active => {}
        }
    }
}

impl<T: Clone> Subject<T> {
    fn buffered(&self) -> Vec<T> {
        lock(&self.state).buffer.iter().cloned().collect()
    }

    fn latest(&self) -> Option<T> {
        lock(&self.state).buffer.back().cloned()
    }

    /// Serializes emitters on different threads. A signal raised by the thread
    /// that is already emitting is queued instead of waiting on itself.
    fn dispatch(&self, signal: Signal<T>) {
        let current = thread::current().id();
        {
            let mut reentry = lock(&self.reentry);
            if reentry.owner == Some(current) {
                tracing::trace!(queued = reentry.pending.len() + 1, "re-entrant subject signal queued");
                reentry.pending.push_back(signal);
                return;
            }
        }

        let _emitting = lock(&self.emit_lock);
        lock(&self.reentry).owner = Some(current);
        let _owner = EmittingThread(self);

        let mut next = Some(signal);
        while let Some(signal) = next {
            match signal {
                Signal::Next(v) => self.emit(v),
                Signal::Error(e) => self.terminate(SubjectStatus::Errored(e)),
                Signal::Complete => self.terminate(SubjectStatus::Completed),
            }
            next = lock(&self.reentry).pending.pop_front();
        }
    }

    fn emit(&self, v: T) {
        let observers: Vec<SharedSubscriber<T>> = {
            let mut state = lock(&self.state);
            if !matches!(state.status, SubjectStatus::Active) {
                return;
            }
            if self.policy != BufferPolicy::None {
                let SubjectState { buffer, .. } = &mut *state;
                self.record(buffer, v.clone());
            }
            // Snapshot: subscribers may detach themselves while we deliver.
            state.observers.iter().map(|(_, o)| Arc::clone(o)).collect()
        };

        for o in observers {
            lock(&o).next(v.clone());
        }
    }
}

/// Subscription handler for `Subject`.
///
/// `SubjectReceiver` acts as an `Observable`, allowing you to utilize its
/// `subscribe` method for receiving emissions from the `Subject`'s multicasting,
/// and every `ObservableExt` operator.
#[derive(Clone)]
pub struct SubjectReceiver<T>(Arc<Subject<T>>);

/// Multicasting emitter for `Subject`.
///
/// `SubjectEmitter` acts as an `Observer`, allowing you to utilize its `next`,
/// `error`, and `complete` methods for multicasting emissions to all registered
/// observers within the `Subject`.
#[derive(Clone)]
pub struct SubjectEmitter<T>(Arc<Subject<T>>);

impl<T> SubjectReceiver<T> {
    /// Returns the number of registered observers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no observers are registered, `false` otherwise.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the `Subject` has completed or errored.
    pub fn is_stopped(&self) -> bool {
        self.0.is_stopped()
    }
}

impl<T: Clone> SubjectReceiver<T> {
    /// Values a new subscriber would be replayed right now, oldest first.
    pub fn buffered(&self) -> Vec<T> {
        self.0.buffered()
    }

    /// The most recently retained value, if the buffer policy keeps any.
    pub fn value(&self) -> Option<T> {
        self.0.latest()
    }
}

impl<T: Clone + Send + Sync + 'static> SubjectReceiver<T> {
    /// Hides the `Subject` behind a plain `Observable`.
    pub fn as_observable(&self) -> Observable<T> {
        self.clone().into()
    }
}

impl<T> SubjectEmitter<T> {
    /// Returns `true` once the `Subject` has completed or errored.
    pub fn is_stopped(&self) -> bool {
        self.0.is_stopped()
    }
}

impl<T: Clone> SubjectEmitter<T> {
    /// The most recently retained value, if the buffer policy keeps any.
    pub fn value(&self) -> Option<T> {
        self.0.latest()
    }
}

impl<T: Clone + Send + 'static> Subscribeable for SubjectReceiver<T> {
    type ObsType = T;

    fn subscribe(&mut self, v: Subscriber<Self::ObsType>) -> Subscription {
        let subscription = Subscription::empty();
        let subscriber = Arc::new(Mutex::new(v.bind(subscription.clone())));

        // Hold the subscriber while attaching it so the replay below is delivered
        // before any live value emitted concurrently.
        let mut guard = lock(&subscriber);
        let (replay, status, key) = {
            let mut state = lock(&self.0.state);
            let replay: Vec<T> = state.buffer.iter().cloned().collect();
            let key = if matches!(state.status, SubjectStatus::Active) {
                let key = state.next_key;
                state.next_key += 1;
                state.observers.push((key, Arc::clone(&subscriber)));
                Some(key)
            } else {
                None
            };
            (replay, state.status.clone(), key)
        };
        tracing::trace!(key, replayed = replay.len(), "subject subscribe");

        for value in replay {
            guard.next(value);
        }
        match status {
            SubjectStatus::Active => {}
            SubjectStatus::Completed => guard.complete(),
            SubjectStatus::Errored(e) => guard.error(e),
        }
        drop(guard);

        if let Some(key) = key {
            let source: Weak<Subject<T>> = Arc::downgrade(&self.0);
            subscription.add(UnsubscribeLogic::Logic(Box::new(move || {
                if let Some(source) = source.upgrade() {
                    lock(&source.state).observers.retain(|(k, _)| *k != key);
                }
            })));
        } else {
            subscription.unsubscribe();
        }
        subscription
    }
}

impl<T: Clone> Observer for SubjectEmitter<T> {
    type NextFnType = T;

    fn next(&mut self, v: Self::NextFnType) {
        self.0.dispatch(Signal::Next(v));
    }

    fn error(&mut self, e: SharedError) {
        self.0.dispatch(Signal::Error(e));
    }

    fn complete(&mut self) {
        self.0.dispatch(Signal::Complete);
    }
}

impl<T: Clone + Send + 'static> From<SubjectEmitter<T>> for Subscriber<T> {
    fn from(value: SubjectEmitter<T>) -> Self {
        let mut vn = value.clone();
        let mut ve = value.clone();
        let mut vc = value;
        Subscriber::new(
            move |v| {
                vn.next(v);
            },
            move |e| ve.error(e),
            move || vc.complete(),
        )
    }
}

impl<T: Clone + Send + Sync + 'static> From<SubjectReceiver<T>> for Observable<T> {
    fn from(mut value: SubjectReceiver<T>) -> Self {
        Observable::new(move |subscriber| value.subscribe(subscriber))
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use crate::{
        errors::ObservableError,
        observer::Observer,
        subjects::Subject,
        subscribe::{Subscriber, Subscription, Unsubscribeable},
        Subscribeable,
    };

    fn recording_subscriber(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Subscriber<i32> {
        let log_n = Arc::clone(log);
        let log_e = Arc::clone(log);
        let log_c = Arc::clone(log);
        Subscriber::new(
            move |v| log_n.lock().unwrap().push(format!("{tag}:{v}")),
            move |e| log_e.lock().unwrap().push(format!("{tag}:error {e}")),
            move || log_c.lock().unwrap().push(format!("{tag}:complete")),
        )
    }

    #[test]
    fn delivers_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut stx, mut srx) = Subject::emitter_receiver();

        srx.subscribe(recording_subscriber(&log, "a"));
        srx.subscribe(recording_subscriber(&log, "b"));
        stx.next(1);
        stx.complete();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:1", "b:1", "a:complete", "b:complete"]
        );
    }

    #[test]
    fn unsubscribed_observer_is_detached() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut stx, mut srx) = Subject::emitter_receiver();

        let s = srx.subscribe(recording_subscriber(&log, "a"));
        stx.next(1);
        s.unsubscribe();
        assert_eq!(srx.len(), 0);
        stx.next(2);

        assert_eq!(*log.lock().unwrap(), vec!["a:1"]);
    }

    // Self-unsubscribe during delivery is a design decision, not inherited
    // behaviour: delivery iterates a snapshot taken when `next` started.
    #[test]
    fn subscriber_may_unsubscribe_itself_during_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut stx, mut srx) = Subject::emitter_receiver();

        let own: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let own_c = Arc::clone(&own);
        let log_c = Arc::clone(&log);
        let s = srx.subscribe(Subscriber::on_next(move |v: i32| {
            log_c.lock().unwrap().push(format!("self:{v}"));
            if let Some(s) = own_c.lock().unwrap().as_ref() {
                s.unsubscribe();
            }
        }));
        *own.lock().unwrap() = Some(s);
        srx.subscribe(recording_subscriber(&log, "other"));

        stx.next(1);
        stx.next(2);

        assert_eq!(srx.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["self:1", "other:1", "other:2"]);
    }

    #[test]
    fn emission_from_own_callback_is_queued_behind_current_value() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut stx, mut srx) = Subject::emitter_receiver();

        let mut inner = stx.clone();
        let log_c = Arc::clone(&log);
        srx.subscribe(Subscriber::on_next(move |v: i32| {
            log_c.lock().unwrap().push(format!("a:{v}"));
            match v {
                1 => inner.next(10),
                2 => inner.complete(),
                _ => {}
            }
        }));
        srx.subscribe(recording_subscriber(&log, "b"));

        stx.next(1);
        stx.next(2);
        stx.next(3);

        assert!(srx.is_stopped());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:1", "b:1", "a:10", "b:10", "a:2", "b:2", "b:complete"]
        );
    }

    #[test]
    fn error_is_replayed_to_late_subscribers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut stx, mut srx) = Subject::emitter_receiver();

        stx.error(ObservableError::Message("boom".into()).shared());
        stx.complete();
        stx.next(1);
        let s = srx.subscribe(recording_subscriber(&log, "late"));

        assert!(s.is_closed());
        assert!(srx.is_stopped());
        assert_eq!(*log.lock().unwrap(), vec!["late:error boom"]);
    }

    #[test]
    fn emitter_can_subscribe_to_an_observable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (stx, mut srx) = Subject::emitter_receiver();
        srx.subscribe(recording_subscriber(&log, "a"));

        crate::observable::from_iter(vec![1, 2]).subscribe(stx.into());

        assert_eq!(*log.lock().unwrap(), vec!["a:1", "a:2", "a:complete"]);
    }

    #[test]
    fn concurrent_emitters_are_serialized() {
        let (stx, mut srx) = Subject::emitter_receiver();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = Arc::clone(&seen);
        srx.subscribe(Subscriber::on_next(move |v: i32| seen_c.lock().unwrap().push(v)));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let mut stx = stx.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        stx.next(t * 1000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 400);
        for t in 0..4 {
            let per_thread: Vec<_> = seen.iter().filter(|v| **v / 1000 == t).collect();
            assert!(per_thread.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
