//! `rxhub` is a push-based reactive stream engine: cold `Observable`s built from
//! producer closures, hot multicast `Subject`s with configurable replay, a small set
//! of composable operators, and an injectable `Scheduler` for everything that
//! depends on time.
//!
//! # Overview
//!
//! - [`Observable`]: a lazy description of a stream. Each `subscribe` runs its
//!   producer again, independently of other subscriptions.
//! - [`subjects`]: `Subject`, `BehaviorSubject` and `ReplaySubject`, split into an
//!   emitter half (an [`Observer`]) and a receiver half (a [`Subscribeable`]).
//! - [`ObservableExt`]: `map`, `filter`, `try_map`, `tap`, `take`, `first`, `skip`,
//!   `delay` and `switch_map`.
//! - [`observable`] sources: `interval`, `timer`, `of`, `from_iter`, `empty` and
//!   `throw_error`.
//! - [`scheduler`]: `TokioScheduler` for real time and `VirtualScheduler` for
//!   deterministic tests.
//! - [`subscribe::Subscription`]: a disposable handle owning teardown logic. It is
//!   the only way to stop a stream early, and disposing it is idempotent.
//!
//! Delivery is synchronous: a notification has reached every subscriber when
//! `next`, `error` or `complete` returns. A panic inside a producer, an operator
//! closure or a scheduled callback is caught and delivered as an
//! [`ObservableError`] through the `error` path.
//!
//! # Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use rxhub::observable::interval;
//! use rxhub::scheduler::VirtualScheduler;
//! use rxhub::subjects::BehaviorSubject;
//! use rxhub::subscribe::Subscriber;
//! use rxhub::{ObservableExt, Observer, Subscribeable, Unsubscribeable};
//!
//! let clock = VirtualScheduler::new();
//!
//! let (mut user, mut user_rx) = BehaviorSubject::emitter_receiver(Some("ada".to_string()));
//!
//! let subscription = user_rx
//!     .clone()
//!     .map(|name| name.to_uppercase())
//!     .subscribe(Subscriber::on_next(|name| println!("user: {}", name)));
//!
//! user.next("grace".to_string());
//! subscription.unsubscribe();
//!
//! let scheduler = Arc::new(clock.clone());
//! interval(Duration::from_secs(1), scheduler)
//!     .take(3)
//!     .subscribe(Subscriber::on_next(|n| println!("tick {}", n)));
//! clock.advance_by(Duration::from_secs(5));
//! ```

mod lock;

pub mod errors;
pub mod observable;
pub mod observer;
pub mod scheduler;
pub mod subjects;
pub mod subscription;

pub use errors::*;
pub use observable::{Observable, ObservableExt};
pub use observer::Observer;
pub use subscription::subscribe;
pub use subscription::subscribe::{Subscribeable, Unsubscribeable};
