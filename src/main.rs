//! Walks through the stream types against a small in-memory data service: a
//! message bus, a "current user" slot, a notification feed with replay, a cold
//! counter and a switching posts stream, all on real time.
//!
//! Run with `cargo run --features demo`; set `RUST_LOG=rxhub=trace` to watch
//! subscriptions come and go.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rxhub::{
    observable::{from_iter, interval},
    scheduler::{SharedScheduler, TokioScheduler},
    subjects::{BehaviorSubject, ReplaySubject, Subject, SubjectEmitter, SubjectReceiver},
    subscribe::{Subscriber, Subscription, UnsubscribeLogic},
    Observable, ObservableExt, Observer, Subscribeable, Unsubscribeable,
};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct User {
    id: u32,
    name: &'static str,
}

#[derive(Clone, Debug)]
struct Post {
    id: u64,
    title: String,
}

const USERS: [User; 3] = [
    User { id: 1, name: "Leanne" },
    User { id: 2, name: "Ervin" },
    User { id: 3, name: "Clementine" },
];

struct DataService {
    scheduler: SharedScheduler,
    messages: SubjectEmitter<String>,
    messages_rx: SubjectReceiver<String>,
    user: SubjectEmitter<Option<User>>,
    user_rx: SubjectReceiver<Option<User>>,
    notifications: SubjectEmitter<String>,
    notifications_rx: SubjectReceiver<String>,
}

impl DataService {
    fn new(scheduler: SharedScheduler) -> Self {
        let (messages, messages_rx) = Subject::emitter_receiver();
        let (user, user_rx) = BehaviorSubject::emitter_receiver(Some(None));
        let (mut notifications, notifications_rx) = ReplaySubject::emitter_receiver(3);

        notifications.next("Welcome to the stream demo".to_string());
        notifications.next("Late subscribers get the last three notifications".to_string());

        DataService {
            scheduler,
            messages,
            messages_rx,
            user,
            user_rx,
            notifications,
            notifications_rx,
        }
    }

    fn send_message(&mut self, message: &str) {
        self.messages.next(message.to_string());
    }

    fn set_current_user(&mut self, user: User) {
        self.user.next(Some(user));
    }

    fn current_user(&self) -> Option<User> {
        self.user.value().flatten()
    }

    fn add_notification(&mut self, notification: &str) {
        self.notifications.next(notification.to_string());
    }

    // Stand-in for a network call: answers after a short latency.
    fn fetch_post(&self, id: u64) -> Observable<Post> {
        from_iter(vec![Post {
            id,
            title: format!("post #{id}"),
        }])
        .delay(Duration::from_millis(150), Arc::clone(&self.scheduler))
    }

    fn fetch_user(&self, index: usize) -> Observable<User> {
        from_iter(vec![USERS[index % USERS.len()].clone()])
            .delay(Duration::from_millis(50), Arc::clone(&self.scheduler))
    }

    // A new post is requested every 100ms; a slow response is dropped as soon
    // as the next request starts.
    fn posts_stream(&self) -> Observable<Post> {
        let scheduler = Arc::clone(&self.scheduler);
        interval(Duration::from_millis(100), Arc::clone(&self.scheduler)).switch_map(move |tick| {
            let latency = if tick % 2 == 0 { 50 } else { 150 };
            from_iter(vec![Post {
                id: tick,
                title: format!("streamed post #{tick}"),
            }])
            .delay(Duration::from_millis(latency), Arc::clone(&scheduler))
        })
    }

    fn cold_counter(&self) -> Observable<u64> {
        let scheduler = Arc::clone(&self.scheduler);
        Observable::new(move |o| {
            tracing::info!("cold counter: new subscription started");
            let o = Arc::new(Mutex::new(o));
            let mut count = 0;
            let handle = scheduler.schedule_repeating(
                Duration::from_millis(100),
                Box::new(move || {
                    count += 1;
                    let mut o = o.lock().unwrap_or_else(|e| e.into_inner());
                    o.next(count);
                    if count == 5 {
                        o.complete();
                    }
                }),
            );
            Subscription::new(UnsubscribeLogic::Logic(Box::new(move || {
                tracing::info!("cold counter: subscription cleaned up");
                handle.cancel();
            })))
        })
    }
}

fn log_values<T: std::fmt::Debug + 'static>(label: &'static str) -> Subscriber<T> {
    Subscriber::new(
        move |v| println!("{label}: {v:?}"),
        move |e| eprintln!("{label} failed: {e}"),
        move || println!("{label}: completed"),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let scheduler: SharedScheduler = Arc::new(TokioScheduler::current()?);
    let mut service = DataService::new(Arc::clone(&scheduler));

    let page = Subscription::empty();
    page.add(service.messages_rx.subscribe(log_values("message")));
    page.add(service.user_rx.subscribe(log_values("user")));
    page.add(service.notifications_rx.subscribe(log_values("notification")));

    service.send_message("hello");
    service.add_notification("third notification");
    service.add_notification("fourth notification");

    println!("--- late subscription to notifications ---");
    service
        .notifications_rx
        .clone()
        .subscribe(log_values("late notification"));

    let (mut fetched_user, mut fetched_user_rx) = Subject::emitter_receiver();
    fetched_user_rx.subscribe(Subscriber::on_next(|user: User| {
        tracing::debug!(user_id = user.id, name = user.name, "user fetched");
    }));
    service.fetch_user(1).subscribe(Subscriber::on_next(move |user| fetched_user.next(user)));
    sleep(Duration::from_millis(60)).await;
    service.set_current_user(USERS[1].clone());
    if let Some(user) = service.current_user() {
        println!("current user: {} (#{})", user.name, user.id);
    }

    service.fetch_post(42).subscribe(log_values("post"));

    println!("--- cold counter, two independent subscribers ---");
    service.cold_counter().subscribe(log_values("cold 1"));
    sleep(Duration::from_millis(200)).await;
    service.cold_counter().subscribe(log_values("cold 2"));
    sleep(Duration::from_millis(600)).await;

    println!("--- posts stream for one second ---");
    let posts = service
        .posts_stream()
        .map(|post| format!("{} ({})", post.title, post.id))
        .subscribe(log_values("stream"));
    sleep(Duration::from_secs(1)).await;
    posts.unsubscribe();

    page.unsubscribe();
    service.send_message("nobody is listening");
    println!("subjects still attached: {}", service.messages_rx.len());

    Ok(())
}
