use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    errors::SharedError,
    observer::Observer,
    scheduler::SharedScheduler,
    subscription::subscribe::{Subscription, UnsubscribeLogic},
};

use super::{run_guarded, Observable};

/// Emits `1, 2, 3, ...` every `period`, starting one `period` after subscribing.
///
/// Each subscription gets its own counter and its own timer; unsubscribing
/// cancels the timer. The stream never completes on its own. A zero `period` is
/// treated as one millisecond.
///
/// # Examples
///
///```no_run
/// use std::{sync::Arc, time::Duration};
///
/// use rxhub::observable::interval;
/// use rxhub::scheduler::VirtualScheduler;
/// use rxhub::{subscribe::Subscriber, Subscribeable};
///
/// let clock = VirtualScheduler::new();
/// let mut ticks = interval(Duration::from_secs(1), Arc::new(clock.clone()));
///
/// ticks.subscribe(Subscriber::on_next(|n| println!("tick {}", n)));
/// clock.advance_by(Duration::from_millis(3500)); // tick 1, tick 2, tick 3
///```
pub fn interval(period: Duration, scheduler: SharedScheduler) -> Observable<u64> {
    Observable::new(move |o| {
        let o_shared = Arc::new(Mutex::new(o));
        let mut count = 0_u64;

        let handle = scheduler.schedule_repeating(
            period,
            Box::new(move || {
                count += 1;
                let tick = count;
                run_guarded(&o_shared, "interval", |o| o.next(tick));
            }),
        );
        Subscription::new(UnsubscribeLogic::Logic(Box::new(move || handle.cancel())))
    })
}

/// Emits a single `()` after `delay` and completes.
pub fn timer(delay: Duration, scheduler: SharedScheduler) -> Observable<()> {
    Observable::new(move |o| {
        let o_shared = Arc::new(Mutex::new(o));

        let handle = scheduler.schedule_once(
            delay,
            Box::new(move || {
                run_guarded(&o_shared, "timer", |o| {
                    o.next(());
                    o.complete();
                });
            }),
        );
        Subscription::new(UnsubscribeLogic::Logic(Box::new(move || handle.cancel())))
    })
}

/// Emits `value` once and completes, synchronously.
pub fn of<T>(value: T) -> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    Observable::new(move |mut o| {
        o.next(value.clone());
        o.complete();
        Subscription::empty()
    })
}

/// Emits every item of `iter` in order and completes, synchronously.
///
/// The iterable is cloned for each subscription, so every subscriber sees every
/// item. Emission stops early once the subscriber is closed, for example after a
/// downstream `take`.
pub fn from_iter<I>(iter: I) -> Observable<I::Item>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::Item: 'static,
{
    Observable::new(move |mut o| {
        for v in iter.clone() {
            if o.is_closed() {
                break;
            }
            o.next(v);
        }
        o.complete();
        Subscription::empty()
    })
}

/// Completes immediately without emitting anything.
pub fn empty<T: 'static>() -> Observable<T> {
    Observable::new(|mut o| {
        o.complete();
        Subscription::empty()
    })
}

/// Errors immediately with `error`.
pub fn throw_error<T: 'static>(error: SharedError) -> Observable<T> {
    Observable::new(move |mut o| {
        o.error(Arc::clone(&error));
        Subscription::empty()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::{
        errors::ObservableError,
        scheduler::VirtualScheduler,
        subscribe::{Subscriber, Unsubscribeable},
        ObservableExt, Subscribeable,
    };

    fn record<T: std::fmt::Debug + Send + 'static>(log: &Arc<Mutex<Vec<String>>>) -> Subscriber<T> {
        let log_n = Arc::clone(log);
        let log_e = Arc::clone(log);
        let log_c = Arc::clone(log);
        Subscriber::new(
            move |v| log_n.lock().unwrap().push(format!("{v:?}")),
            move |e| log_e.lock().unwrap().push(format!("error: {e}")),
            move || log_c.lock().unwrap().push("complete".to_string()),
        )
    }

    #[test]
    fn interval_counts_from_one_per_subscription() {
        let clock = VirtualScheduler::new();
        let mut ticks = interval(Duration::from_millis(100), Arc::new(clock.clone()));
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let s1 = ticks.subscribe(record(&first));
        clock.advance_by(Duration::from_millis(200));
        ticks.subscribe(record(&second));
        clock.advance_by(Duration::from_millis(100));
        s1.unsubscribe();
        clock.advance_by(Duration::from_millis(100));

        assert_eq!(*first.lock().unwrap(), vec!["1", "2", "3"]);
        assert_eq!(*second.lock().unwrap(), vec!["1", "2"]);
        assert_eq!(clock.pending_count(), 1);
    }

    #[test]
    fn timer_emits_once_then_completes() {
        let clock = VirtualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        timer(Duration::from_secs(1), Arc::new(clock.clone())).subscribe(record(&log));

        clock.advance_by(Duration::from_millis(999));
        assert!(log.lock().unwrap().is_empty());
        clock.advance_by(Duration::from_millis(1));
        assert_eq!(*log.lock().unwrap(), vec!["()", "complete"]);
    }

    #[test]
    fn synchronous_sources() {
        let log = Arc::new(Mutex::new(Vec::new()));
        of(7).subscribe(record(&log));
        empty::<i32>().subscribe(record(&log));
        throw_error::<i32>(ObservableError::Message("nope".into()).shared()).subscribe(record(&log));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["7", "complete", "complete", "error: nope"]
        );
    }

    #[test]
    fn from_iter_stops_when_downstream_is_done() {
        let pulled = Arc::new(Mutex::new(0));
        let pulled_c = Arc::clone(&pulled);
        let log = Arc::new(Mutex::new(Vec::new()));

        from_iter(1..=1000)
            .tap(move |_| *pulled_c.lock().unwrap() += 1)
            .take(3)
            .subscribe(record(&log));

        assert_eq!(*log.lock().unwrap(), vec!["1", "2", "3", "complete"]);
        assert_eq!(*pulled.lock().unwrap(), 3);
    }
}
