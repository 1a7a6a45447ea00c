use super::{BufferPolicy, Subject, SubjectEmitter, SubjectReceiver};

/// A `Subject` that replays up to `capacity` of the most recent values to every
/// new subscriber, in their original order, before delivering live values.
///
/// A capacity of zero retains nothing and behaves like a plain `Subject`.
///
/// # Examples
///
///```no_run
/// use rxhub::{subjects::ReplaySubject, subscribe::Subscriber};
/// use rxhub::{Observer, Subscribeable};
///
/// let (mut emitter, mut receiver) = ReplaySubject::emitter_receiver(2);
///
/// emitter.next(1);
/// emitter.next(2);
/// emitter.next(3);
///
/// // Prints 2, 3 and then 4.
/// receiver.subscribe(Subscriber::on_next(|v| println!("replayed: {}", v)));
/// emitter.next(4);
///```
pub struct ReplaySubject;

impl ReplaySubject {
    /// Creates a new pair of `SubjectEmitter` and `SubjectReceiver` keeping the last
    /// `capacity` values.
    pub fn emitter_receiver<T: Clone + Send + 'static>(
        capacity: usize,
    ) -> (SubjectEmitter<T>, SubjectReceiver<T>) {
        Subject::with_policy(BufferPolicy::Bounded(capacity))
    }
}
