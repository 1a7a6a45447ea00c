//! Error types delivered through the `error` channel of a stream, and errors
//! returned by the scheduler constructors.

mod observable_errors;

pub use observable_errors::*;
