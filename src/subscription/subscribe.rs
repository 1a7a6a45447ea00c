use std::{
    fmt,
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use tokio::runtime;

use crate::{errors::SharedError, lock::lock, observer::Observer};

/// A trait for types that can be subscribed to, allowing consumers to receive
/// values emitted by an observable stream.
pub trait Subscribeable {
    /// The type of items emitted by the observable stream.
    type ObsType;

    /// Subscribes to the observable stream and specifies how to handle emitted values.
    ///
    /// The `Subscriber` parameter defines the behavior for processing values emitted
    /// by the observable stream. The returned `Subscription` is already bound to the
    /// subscriber: unsubscribing it stops deliveries and releases every resource
    /// the stream acquired for this subscriber.
    fn subscribe(&mut self, s: Subscriber<Self::ObsType>) -> Subscription;
}

/// A trait for types that can be unsubscribed, allowing the clean release of resources
/// associated with a subscription.
pub trait Unsubscribeable {
    /// Releases the resources held by the subscription.
    ///
    /// Calling it more than once is a no-op: teardown logic runs exactly once.
    fn unsubscribe(&self);

    /// Returns `true` once `unsubscribe` has run, either explicitly or because the
    /// stream reached a terminal notification.
    fn is_closed(&self) -> bool;
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type ErrorFn = Box<dyn FnMut(SharedError) + Send>;
type CompleteFn = Box<dyn FnMut() + Send>;

/// A type that acts as an observer, allowing users to handle emitted values, errors,
/// and completion when subscribing to an `Observable` or `Subject`.
///
/// A `Subscriber` enforces the terminal invariant on its own: once `error` or
/// `complete` has been delivered, every later notification is dropped. It is also
/// bound to the `Subscription` created for it, so nothing is delivered after that
/// subscription has been unsubscribed.
pub struct Subscriber<NextFnType> {
    next_fn: NextFn<NextFnType>,
    error_fn: Option<ErrorFn>,
    complete_fn: Option<CompleteFn>,
    stopped: bool,
    subscription: Option<Subscription>,
}

impl<NextFnType> Subscriber<NextFnType> {
    /// Creates a new `Subscriber` instance with custom handling functions for emitted
    /// values, errors, and completion.
    pub fn new(
        next_fn: impl FnMut(NextFnType) + Send + 'static,
        error_fn: impl FnMut(SharedError) + Send + 'static,
        complete_fn: impl FnMut() + Send + 'static,
    ) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            error_fn: Some(Box::new(error_fn)),
            complete_fn: Some(Box::new(complete_fn)),
            stopped: false,
            subscription: None,
        }
    }

    /// Create a new Subscriber with the provided `next` function.
    ///
    /// Errors and completion are ignored unless handlers are attached with
    /// [`on_error`](Self::on_error) and [`on_complete`](Self::on_complete).
    pub fn on_next(next_fn: impl FnMut(NextFnType) + Send + 'static) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            error_fn: None,
            complete_fn: None,
            stopped: false,
            subscription: None,
        }
    }

    /// Set the completion function for the Subscriber.
    pub fn on_complete(&mut self, complete_fn: impl FnMut() + Send + 'static) {
        self.complete_fn = Some(Box::new(complete_fn));
    }

    /// Set the error-handling function for the Subscriber.
    pub fn on_error(&mut self, error_fn: impl FnMut(SharedError) + Send + 'static) {
        self.error_fn = Some(Box::new(error_fn));
    }

    /// Returns `true` if this subscriber will drop every further notification,
    /// either because it received a terminal notification or because its
    /// subscription was unsubscribed.
    ///
    /// Long running producers should poll this to stop emitting early.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stopped || self.subscription.as_ref().is_some_and(Subscription::is_closed)
    }

    /// Binds the subscriber to `subscription`. A subscriber that was already bound
    /// hands the new subscription to the previous one, so closing the outer level
    /// also closes everything subscribed on its behalf.
    pub(crate) fn bind(mut self, subscription: Subscription) -> Self {
        if let Some(parent) = self.subscription.take() {
            if !parent.same_as(&subscription) {
                parent.add(subscription.clone());
            }
        }
        self.subscription = Some(subscription);
        self
    }

    pub(crate) fn subscription(&self) -> Option<Subscription> {
        self.subscription.clone()
    }

    /// Binds an operator's upstream subscriber to its downstream's subscription.
    pub(crate) fn link(self, parent: Option<Subscription>) -> Self {
        match parent {
            Some(subscription) => self.bind(subscription),
            None => self,
        }
    }
}

impl<T> Observer for Subscriber<T> {
    type NextFnType = T;

    fn next(&mut self, v: Self::NextFnType) {
        if self.is_closed() {
            return;
        }
        (self.next_fn)(v);
    }

    fn error(&mut self, observable_error: SharedError) {
        if self.is_closed() {
            return;
        }
        self.stopped = true;
        match &mut self.error_fn {
            Some(efn) => efn(observable_error),
            None => tracing::debug!(error = %observable_error, "error reached a subscriber without an error handler"),
        }
        if let Some(subscription) = &self.subscription {
            subscription.unsubscribe();
        }
    }

    fn complete(&mut self) {
        if self.is_closed() {
            return;
        }
        self.stopped = true;
        if let Some(cfn) = &mut self.complete_fn {
            cfn();
        }
        if let Some(subscription) = &self.subscription {
            subscription.unsubscribe();
        }
    }
}

/// Builds a `Subscriber` that forwards every notification to a shared downstream
/// subscriber.
///
/// Operators hold their downstream behind `Arc<Mutex<_>>` because the `next`,
/// `error` and `complete` closures of the upstream subscriber all need it.
pub(crate) fn wrap_subscriber<T: 'static>(s: Arc<Mutex<Subscriber<T>>>) -> Subscriber<T> {
    let s_error = Arc::clone(&s);
    let s_complete = Arc::clone(&s);

    Subscriber::new(
        move |v| lock(&s).next(v),
        move |e| lock(&s_error).error(e),
        move || lock(&s_complete).complete(),
    )
}

/// Enumerates various unsubscribe logic options for a subscription.
pub enum UnsubscribeLogic {
    /// No specific unsubscribe logic.
    Nil,

    /// If one subscription depends on another. Wrapped subscription's unsubscribe
    /// will be called upon unsubscribing.
    Wrapped(Subscription),

    /// Unsubscribe logic defined by a function.
    Logic(Box<dyn FnOnce() + Send>),

    /// Asynchronous unsubscribe logic represented by a future. It is spawned on the
    /// Tokio runtime that was current when the owning `Subscription` was created,
    /// or on the runtime current at unsubscribe time.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

impl UnsubscribeLogic {
    /// Runs the logic now. Used by whoever took ownership of it through
    /// [`Subscription::remove`].
    pub fn unsubscribe(self) {
        self.run_on(None);
    }

    fn run_on(self, runtime_handle: Option<&runtime::Handle>) {
        match self {
            UnsubscribeLogic::Nil => (),
            UnsubscribeLogic::Logic(fnc) => fnc(),
            UnsubscribeLogic::Wrapped(subscription) => subscription.unsubscribe(),
            UnsubscribeLogic::Future(future) => {
                let handle = runtime_handle
                    .cloned()
                    .or_else(|| runtime::Handle::try_current().ok());
                match handle {
                    Some(handle) => {
                        handle.spawn(future);
                    }
                    None => {
                        tracing::warn!("async teardown dropped: no Tokio runtime available");
                    }
                }
            }
        }
    }
}

impl From<Subscription> for UnsubscribeLogic {
    fn from(subscription: Subscription) -> Self {
        UnsubscribeLogic::Wrapped(subscription)
    }
}

impl fmt::Debug for UnsubscribeLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsubscribeLogic::Nil => f.write_str("Nil"),
            UnsubscribeLogic::Wrapped(s) => f.debug_tuple("Wrapped").field(s).finish(),
            UnsubscribeLogic::Logic(_) => f.write_str("Logic(..)"),
            UnsubscribeLogic::Future(_) => f.write_str("Future(..)"),
        }
    }
}

/// Identifies a teardown registered with [`Subscription::add`], so it can later be
/// detached with [`Subscription::remove`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TeardownKey(u64);

struct SubscriptionInner {
    closed: AtomicBool,
    next_key: AtomicU64,
    teardowns: Mutex<Vec<(TeardownKey, UnsubscribeLogic)>>,
    runtime_handle: Option<runtime::Handle>,
}

/// Represents a subscription to an observable or a subject, allowing control over
/// the subscription.
///
/// A `Subscription` owns teardown logic: plain closures, async cleanup futures and
/// child subscriptions. Cloning is shallow; every clone controls the same
/// subscription. Unsubscribing runs each teardown exactly once, last added first,
/// no matter how many times or from how many threads `unsubscribe` is called.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// Creates an open subscription owning `unsubscribe_logic`.
    #[must_use]
    pub fn new(unsubscribe_logic: UnsubscribeLogic) -> Self {
        let s = Subscription::empty();
        if !matches!(unsubscribe_logic, UnsubscribeLogic::Nil) {
            s.add(unsubscribe_logic);
        }
        s
    }

    /// Creates an open subscription without any teardown logic.
    #[must_use]
    pub fn empty() -> Self {
        Subscription {
            inner: Arc::new(SubscriptionInner {
                closed: AtomicBool::new(false),
                next_key: AtomicU64::new(0),
                teardowns: Mutex::new(Vec::new()),
                runtime_handle: runtime::Handle::try_current().ok(),
            }),
        }
    }

    /// Attaches additional teardown logic.
    ///
    /// If this subscription is already closed, nothing can stay owned by it, so the
    /// teardown runs immediately.
    pub fn add(&self, teardown: impl Into<UnsubscribeLogic>) -> TeardownKey {
        let teardown = teardown.into();
        let key = TeardownKey(self.inner.next_key.fetch_add(1, Ordering::Relaxed));
        {
            let mut teardowns = lock(&self.inner.teardowns);
            if !self.inner.closed.load(Ordering::Acquire) {
                teardowns.push((key, teardown));
                return key;
            }
        }
        self.run_teardown(teardown);
        key
    }

    /// Detaches a teardown without running it and hands it back to the caller.
    ///
    /// Returns `None` if the key is unknown or the subscription has already been
    /// unsubscribed.
    pub fn remove(&self, key: TeardownKey) -> Option<UnsubscribeLogic> {
        let mut teardowns = lock(&self.inner.teardowns);
        let position = teardowns.iter().position(|(k, _)| *k == key)?;
        Some(teardowns.remove(position).1)
    }

    /// Returns `true` if both handles control the same subscription.
    #[must_use]
    pub fn same_as(&self, other: &Subscription) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn run_teardown(&self, teardown: UnsubscribeLogic) {
        let runtime_handle = self.inner.runtime_handle.as_ref();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| teardown.run_on(runtime_handle))) {
            let message = crate::errors::ObservableError::from_panic("teardown", payload);
            tracing::error!(error = %message, "teardown panicked; remaining teardowns still run");
        }
    }
}

impl Unsubscribeable for Subscription {
    fn unsubscribe(&self) {
        let teardowns = {
            let mut teardowns = lock(&self.inner.teardowns);
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *teardowns)
        };
        tracing::trace!(teardowns = teardowns.len(), "unsubscribing");
        for (_, teardown) in teardowns.into_iter().rev() {
            self.run_teardown(teardown);
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Subscription::empty()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .field("teardowns", &lock(&self.inner.teardowns).len())
            .finish()
    }
}
