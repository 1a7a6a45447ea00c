use std::collections::VecDeque;

use super::{BufferPolicy, Subject, SubjectEmitter, SubjectReceiver};

/// A `Subject` that remembers the latest value.
///
/// Every new subscriber immediately receives the current value (if there is one)
/// and then every value emitted after it subscribed. Both halves expose the
/// current value through `value()`.
///
/// # Examples
///
///```no_run
/// use rxhub::{subjects::BehaviorSubject, subscribe::Subscriber};
/// use rxhub::{Observer, Subscribeable};
///
/// let (mut emitter, mut receiver) = BehaviorSubject::emitter_receiver(Some(0));
///
/// emitter.next(1);
///
/// // Prints 1, then 2.
/// receiver.subscribe(Subscriber::on_next(|v| println!("current: {}", v)));
/// emitter.next(2);
///
/// assert_eq!(receiver.value(), Some(2));
///```
pub struct BehaviorSubject;

impl BehaviorSubject {
    /// Creates a new pair of `SubjectEmitter` and `SubjectReceiver` seeded with
    /// `initial`. Without a seed, subscribers attaching before the first `next`
    /// receive nothing until a value is emitted.
    pub fn emitter_receiver<T: Clone + Send + 'static>(
        initial: Option<T>,
    ) -> (SubjectEmitter<T>, SubjectReceiver<T>) {
        Subject::with_buffer(BufferPolicy::Last, initial.into_iter().collect::<VecDeque<T>>())
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use crate::{
        errors::ObservableError, observer::Observer, subjects::BehaviorSubject, subscribe::Subscriber,
        Subscribeable,
    };

    fn collect(into: &Arc<Mutex<Vec<i32>>>) -> Subscriber<i32> {
        let into = Arc::clone(into);
        Subscriber::on_next(move |v| into.lock().unwrap().push(v))
    }

    #[test]
    fn new_subscriber_gets_current_value_first() {
        let (mut stx, mut srx) = BehaviorSubject::emitter_receiver(Some(10));
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        srx.subscribe(collect(&first));
        stx.next(11);
        stx.next(12);
        srx.subscribe(collect(&second));
        stx.next(13);

        assert_eq!(*first.lock().unwrap(), vec![10, 11, 12, 13]);
        assert_eq!(*second.lock().unwrap(), vec![12, 13]);
        assert_eq!(stx.value(), Some(13));
    }

    #[test]
    fn without_seed_nothing_is_replayed() {
        let (mut stx, mut srx) = BehaviorSubject::emitter_receiver(None);
        let seen = Arc::new(Mutex::new(Vec::new()));

        srx.subscribe(collect(&seen));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(srx.value(), None);

        stx.next(1);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn late_subscriber_after_error_gets_value_then_error() {
        let (mut stx, mut srx) = BehaviorSubject::emitter_receiver(Some(1));
        stx.next(2);
        stx.error(ObservableError::Message("offline".into()).shared());

        let log = Arc::new(Mutex::new(Vec::new()));
        let log_n = Arc::clone(&log);
        let log_e = Arc::clone(&log);
        srx.subscribe(Subscriber::new(
            move |v: i32| log_n.lock().unwrap().push(v.to_string()),
            move |e| log_e.lock().unwrap().push(e.to_string()),
            || {},
        ));

        assert_eq!(*log.lock().unwrap(), vec!["2", "offline"]);
    }
}
