//! The `subjects` module provides hot, multicast streams. Subjects serve both as
//! observers and observables, allowing multiple observers to subscribe to a single
//! source and receive the same values.
//!
//! Subjects are split into emitter and receiver using the `emitter_receiver`
//! function.
//!
//! The `Subject` emitter behaves as an `Observer`, enabling `next()`, `error()` and
//! `complete()` calls. This also allows the `Subject` emitter to be passed as a
//! parameter to the `subscribe` method of another `Observable`.
//!
//! The `Subject` receiver functions as an `Observable`, enabling you to use
//! `subscribe` and every operator on it.
//!
//! A single `Subject` type implements every flavour; its [`BufferPolicy`] decides
//! what late subscribers get. `BehaviorSubject` and `ReplaySubject` are shorthands
//! for constructing a `Subject` with the matching policy.

mod behavior_subject;
mod replay_subject;
mod subject;

pub use behavior_subject::*;
pub use replay_subject::*;
pub use subject::*;
