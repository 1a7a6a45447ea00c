//! Provides structures and traits related to subscription management.
//!
//! This module includes `Subscriber`, the sink that receives values, errors and
//! completion while enforcing the terminal invariant, and `Subscription`, the
//! disposable handle that owns teardown logic and child subscriptions.
pub mod subscribe;
