use thiserror::Error;

/// Error raised by user closures in tests, to check that foreign error types
/// travel through the `error` channel untouched.
#[derive(Debug, Error)]
#[error("Custom error occurred")]
pub struct CustomError;
