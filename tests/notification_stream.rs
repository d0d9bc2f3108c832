//! Teardown and backpressure behavior of watch streams.

use async_trait::async_trait;
use confwatch::api::{ConfigApi, EventSink, Notification};
use confwatch::error::{Result, WatchError};
use confwatch::kv::InMemoryStore;
use confwatch::pubsub::{
    Event, EventKind, InMemoryBus, OverflowPolicy, Subscription, SubscriptionId, TopicBus,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Bus that counts unsubscribe calls.
struct CountingBus {
    inner: InMemoryBus,
    unsubscribes: AtomicUsize,
}

impl CountingBus {
    fn new(capacity: usize, policy: OverflowPolicy) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryBus::new(capacity, policy),
            unsubscribes: AtomicUsize::new(0),
        })
    }

    fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

impl TopicBus for CountingBus {
    fn create_topic(&self, path: &str) -> bool {
        self.inner.create_topic(path)
    }

    fn delete_topic(&self, path: &str) -> bool {
        self.inner.delete_topic(path)
    }

    fn topic_exists(&self, path: &str) -> bool {
        self.inner.topic_exists(path)
    }

    fn subscribe(&self, path: &str) -> Result<Subscription> {
        self.inner.subscribe(path)
    }

    fn unsubscribe(&self, path: &str, id: &SubscriptionId) -> Result<()> {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.inner.unsubscribe(path, id)
    }

    fn publish(&self, path: &str, event: &Event) -> usize {
        self.inner.publish(path, event)
    }

    fn subscription_count(&self, path: &str) -> usize {
        self.inner.subscription_count(path)
    }

    fn topic_count(&self) -> usize {
        self.inner.topic_count()
    }
}

/// Sink that accepts a fixed number of notifications, then fails.
struct FlakySink {
    remaining: usize,
    received: Vec<Notification>,
}

#[async_trait]
impl EventSink for FlakySink {
    async fn send(&mut self, notification: Notification) -> Result<()> {
        if self.remaining == 0 {
            return Err(WatchError::Delivery("connection reset".to_string()));
        }
        self.remaining -= 1;
        self.received.push(notification);
        Ok(())
    }
}

/// Sink that never completes a send.
struct StalledSink;

#[async_trait]
impl EventSink for StalledSink {
    async fn send(&mut self, _notification: Notification) -> Result<()> {
        std::future::pending().await
    }
}

fn api(bus: &Arc<CountingBus>) -> ConfigApi {
    ConfigApi::new(Arc::new(InMemoryStore::new()), Arc::clone(bus) as Arc<dyn TopicBus>)
}

fn event(kind: EventKind) -> Event {
    Event::new(kind, "a.yaml")
}

#[tokio::test]
async fn test_unsubscribes_once_on_cancel() {
    let bus = CountingBus::new(8, OverflowPolicy::DropOldest);
    let stream = api(&bus).watch_config("a.yaml").unwrap();
    let (mut tx, _rx) = mpsc::channel::<Notification>(4);
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { stream.run(&mut tx, cancel).await }
    });
    cancel.cancel();
    timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(bus.unsubscribes(), 1);
    assert_eq!(bus.subscription_count("a.yaml"), 0);
}

#[tokio::test]
async fn test_unsubscribes_once_on_delivery_failure() {
    let bus = CountingBus::new(8, OverflowPolicy::DropOldest);
    let stream = api(&bus).watch_config("a.yaml").unwrap();
    bus.publish("a.yaml", &event(EventKind::Created));
    bus.publish("a.yaml", &event(EventKind::Updated));

    let mut sink = FlakySink {
        remaining: 1,
        received: Vec::new(),
    };
    let err = stream
        .run(&mut sink, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, WatchError::Delivery(_)));
    assert_eq!(sink.received.len(), 1);
    assert!(sink.received[0].event.contains("CONFIG_CREATED"));
    assert_eq!(bus.unsubscribes(), 1);
}

#[tokio::test]
async fn test_unsubscribes_once_when_dropped() {
    let bus = CountingBus::new(8, OverflowPolicy::DropOldest);
    let stream = api(&bus).watch_config("a.yaml").unwrap();
    drop(stream);
    assert_eq!(bus.unsubscribes(), 1);
}

#[tokio::test]
async fn test_cancel_interrupts_stalled_sink() {
    let bus = CountingBus::new(8, OverflowPolicy::DropOldest);
    let stream = api(&bus).watch_config("a.yaml").unwrap();
    bus.publish("a.yaml", &event(EventKind::Created));
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { stream.run(&mut StalledSink, cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(bus.unsubscribes(), 1);
}

#[tokio::test]
async fn test_slow_watcher_does_not_block_publisher() {
    let bus = CountingBus::new(2, OverflowPolicy::DropOldest);
    let api = api(&bus);
    let stalled = api.watch_config("a.yaml").unwrap();
    let healthy = api.watch_config("a.yaml").unwrap();
    let (mut tx, mut rx) = mpsc::channel::<Notification>(64);
    let cancel = CancellationToken::new();

    let stalled_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { stalled.run(&mut StalledSink, cancel).await }
    });
    let healthy_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { healthy.run(&mut tx, cancel).await }
    });

    for _ in 0..20 {
        bus.publish("a.yaml", &event(EventKind::Updated));
        tokio::task::yield_now().await;
        let notification = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(notification.event.contains("CONFIG_UPDATED"));
    }
    assert_eq!(bus.subscription_count("a.yaml"), 2);

    cancel.cancel();
    stalled_task.await.unwrap().unwrap();
    healthy_task.await.unwrap().unwrap();
    assert_eq!(bus.unsubscribes(), 2);
}

#[tokio::test]
async fn test_disconnect_policy_ends_slow_stream() {
    let bus = CountingBus::new(2, OverflowPolicy::Disconnect);
    let stream = api(&bus).watch_config("a.yaml").unwrap();

    for _ in 0..3 {
        bus.publish("a.yaml", &event(EventKind::Updated));
    }
    assert_eq!(bus.subscription_count("a.yaml"), 0);

    // The queued events are still delivered before the stream ends.
    let (mut tx, mut rx) = mpsc::channel::<Notification>(8);
    timeout(
        Duration::from_secs(1),
        stream.run(&mut tx, CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    let mut delivered = 0;
    while rx.try_recv().is_ok() {
        delivered += 1;
    }
    assert_eq!(delivered, 2);
    assert_eq!(bus.unsubscribes(), 1);
}
