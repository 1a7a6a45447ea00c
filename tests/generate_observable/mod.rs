use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rxhub::{
    scheduler::SharedScheduler,
    subscribe::{Subscriber, Subscription, UnsubscribeLogic},
    Observable, Observer,
};

/// Emits `0..=end` from a separate OS thread, one value per millisecond, and
/// reports the last emitted value to `last_emit_assert` once it stops. The
/// producer stops early as soon as its subscriber is closed.
#[allow(dead_code)]
pub fn generate_u32_observable(
    end: u32,
    last_emit_assert: impl FnMut(u32) + Send + 'static,
) -> Observable<u32> {
    let last_emit_assert = Arc::new(Mutex::new(last_emit_assert));

    Observable::new(move |mut o: Subscriber<_>| {
        let last_emit_assert = Arc::clone(&last_emit_assert);
        std::thread::spawn(move || {
            let mut last_emit = 0;

            for i in 0..=end {
                if o.is_closed() {
                    break;
                }
                last_emit = i;
                o.next(i);
                std::thread::sleep(Duration::from_millis(1));
            }
            o.complete();
            last_emit_assert.lock().unwrap()(last_emit);
        });

        Subscription::empty()
    })
}

/// Counts `1..=end` on `scheduler`, one value every `period`, then completes.
/// Pushes `subscribe <label>` and `teardown <label>` into `events` as the
/// subscription starts and ends.
#[allow(dead_code)]
pub fn generate_ticking_observable(
    label: &'static str,
    end: u32,
    period: Duration,
    scheduler: SharedScheduler,
    events: Arc<Mutex<Vec<String>>>,
) -> Observable<u32> {
    Observable::new(move |o: Subscriber<u32>| {
        events.lock().unwrap().push(format!("subscribe {label}"));

        let o = Arc::new(Mutex::new(o));
        let mut count = 0;
        let handle = scheduler.schedule_repeating(
            period,
            Box::new(move || {
                count += 1;
                let mut o = o.lock().unwrap();
                o.next(count);
                if count == end {
                    o.complete();
                }
            }),
        );

        let events = Arc::clone(&events);
        Subscription::new(UnsubscribeLogic::Logic(Box::new(move || {
            handle.cancel();
            events.lock().unwrap().push(format!("teardown {label}"));
        })))
    })
}
