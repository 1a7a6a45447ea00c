use crate::errors::SharedError;

/// The consuming side of a stream: anything that can be told about the next
/// value, an error, or completion.
///
/// Implemented by [`Subscriber`] and by the emitting half of every `Subject`,
/// which is what lets a `Subject` be fed from another `Observable`.
///
/// [`Subscriber`]: crate::subscribe::Subscriber
pub trait Observer {
    type NextFnType;

    fn next(&mut self, _: Self::NextFnType);
    fn error(&mut self, _: SharedError);
    fn complete(&mut self);
}
