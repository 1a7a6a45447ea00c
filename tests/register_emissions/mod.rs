use std::sync::{Arc, Mutex};

use rxhub::subscribe::Subscriber;
use tracing_subscriber::EnvFilter;

type Recorded<T> = Arc<Mutex<Vec<T>>>;

/// Routes the crate's `tracing` output through the test harness, so
/// `RUST_LOG=rxhub=trace cargo test` shows subscription lifecycles of a failing
/// test. Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")))
        .with_test_writer()
        .try_init();
}

/// Hands out up to ten subscribers that all record into the same logs: values
/// into `nexts`, one entry per completion into `completes`, and the message of
/// every error into `errors`.
pub fn register_emissions_subscriber() -> (
    Vec<impl FnOnce() -> Subscriber<i32>>,
    Recorded<i32>,
    Recorded<()>,
    Recorded<String>,
) {
    init_test_tracing();

    let nexts = Arc::new(Mutex::new(Vec::new()));
    let completes = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));

    let nexts_c = Arc::clone(&nexts);
    let completes_c = Arc::clone(&completes);
    let errors_c = Arc::clone(&errors);

    let make_subscriber = vec![
        move || {
            Subscriber::new(
                move |n| nexts_c.lock().unwrap().push(n),
                move |e| errors_c.lock().unwrap().push(e.to_string()),
                move || completes_c.lock().unwrap().push(()),
            )
        };
        10
    ];
    (make_subscriber, nexts, completes, errors)
}
