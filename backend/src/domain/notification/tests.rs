//! Behaviour of the retry loop and both dispatchers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rstest::{fixture, rstest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use super::retry::{Deliver, deliver_with_retry};
use super::*;
use crate::domain::form::{
    BrokerTarget, FieldMap, FieldValue, FormParts, RetryPolicy, WebhookTarget,
};
use crate::domain::ports::{
    BrokerChannel, BrokerConnector, BrokerError, BrokerMessage, FixtureTemplateRenderer,
    WebhookDeliveryError, WebhookRequest, WebhookTransport,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct RecordingSleeper {
    naps: StdMutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn naps(&self) -> Vec<Duration> {
        self.naps.lock().expect("naps lock").clone()
    }
}

#[async_trait]
impl RetrySleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.naps.lock().expect("naps lock").push(duration);
    }
}

struct ScriptedDelivery {
    outcomes: VecDeque<Result<(), String>>,
    attempts: u32,
    resets: u32,
}

impl ScriptedDelivery {
    fn new(outcomes: impl IntoIterator<Item = Result<(), String>>) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
            attempts: 0,
            resets: 0,
        }
    }
}

#[async_trait]
impl Deliver for ScriptedDelivery {
    type Error = String;

    async fn attempt(&mut self) -> Result<(), Self::Error> {
        self.attempts += 1;
        self.outcomes.pop_front().unwrap_or(Ok(()))
    }

    async fn after_failure(&mut self) {
        self.resets += 1;
    }
}

struct StalledDelivery;

#[async_trait]
impl Deliver for StalledDelivery {
    type Error = String;

    async fn attempt(&mut self) -> Result<(), Self::Error> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn policy(retry: u32, interval: Duration) -> RetryPolicy {
    RetryPolicy {
        retry,
        timeout: Duration::from_secs(1),
        interval,
    }
}

fn failures(count: usize) -> Vec<Result<(), String>> {
    (0..count).map(|n| Err(format!("failure {n}"))).collect()
}

#[fixture]
fn sleeper() -> Arc<RecordingSleeper> {
    Arc::new(RecordingSleeper::default())
}

#[rstest]
#[tokio::test]
async fn retries_are_bounded_and_spaced_by_interval(sleeper: Arc<RecordingSleeper>) {
    let mut delivery = ScriptedDelivery::new(failures(10));
    let shared: Arc<dyn RetrySleeper> = sleeper.clone();
    let outcome = deliver_with_retry(
        &mut delivery,
        &policy(2, Duration::from_secs(15)),
        &shared,
        &CancellationToken::new(),
        "test",
    )
    .await;

    assert_eq!(outcome, DeliveryOutcome::Exhausted { attempts: 3 });
    assert_eq!(delivery.attempts, 3);
    assert_eq!(delivery.resets, 3);
    assert_eq!(sleeper.naps(), vec![Duration::from_secs(15); 2]);
}

#[rstest]
#[tokio::test]
async fn transient_failures_recover(sleeper: Arc<RecordingSleeper>) {
    let mut delivery = ScriptedDelivery::new(failures(2));
    let shared: Arc<dyn RetrySleeper> = sleeper.clone();
    let outcome = deliver_with_retry(
        &mut delivery,
        &policy(3, Duration::from_secs(1)),
        &shared,
        &CancellationToken::new(),
        "test",
    )
    .await;

    assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
    assert_eq!(sleeper.naps().len(), 2);
}

#[rstest]
#[tokio::test]
async fn zero_retries_allow_a_single_attempt(sleeper: Arc<RecordingSleeper>) {
    let mut delivery = ScriptedDelivery::new(failures(1));
    let shared: Arc<dyn RetrySleeper> = sleeper.clone();
    let outcome = deliver_with_retry(
        &mut delivery,
        &policy(0, Duration::from_secs(1)),
        &shared,
        &CancellationToken::new(),
        "test",
    )
    .await;

    assert_eq!(outcome, DeliveryOutcome::Exhausted { attempts: 1 });
    assert!(sleeper.naps().is_empty());
}

#[rstest]
#[tokio::test]
async fn shutdown_interrupts_the_wait(sleeper: Arc<RecordingSleeper>) {
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let mut delivery = ScriptedDelivery::new(failures(5));
    let shared: Arc<dyn RetrySleeper> = sleeper.clone();
    let outcome = deliver_with_retry(
        &mut delivery,
        &policy(4, Duration::from_secs(60)),
        &shared,
        &shutdown,
        "test",
    )
    .await;

    assert_eq!(outcome, DeliveryOutcome::Interrupted { attempts: 1 });
    assert!(sleeper.naps().is_empty());
}

#[rstest]
#[tokio::test]
async fn stalled_attempt_counts_as_failure(sleeper: Arc<RecordingSleeper>) {
    let shared: Arc<dyn RetrySleeper> = sleeper.clone();
    let outcome = deliver_with_retry(
        &mut StalledDelivery,
        &RetryPolicy {
            retry: 0,
            timeout: Duration::from_millis(20),
            interval: Duration::from_secs(1),
        },
        &shared,
        &CancellationToken::new(),
        "test",
    )
    .await;

    assert_eq!(outcome, DeliveryOutcome::Exhausted { attempts: 1 });
}

/// Webhook transport that reports every request and replays scripted
/// results, succeeding once the script runs out.
struct ChannelTransport {
    script: StdMutex<VecDeque<Result<(), WebhookDeliveryError>>>,
    sent: mpsc::UnboundedSender<WebhookRequest>,
}

impl ChannelTransport {
    fn new(
        script: impl IntoIterator<Item = Result<(), WebhookDeliveryError>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<WebhookRequest>) {
        let (sent, received) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            script: StdMutex::new(script.into_iter().collect()),
            sent,
        });
        (transport, received)
    }
}

#[async_trait]
impl WebhookTransport for ChannelTransport {
    async fn send(&self, request: &WebhookRequest) -> Result<(), WebhookDeliveryError> {
        let _ = self.sent.send(request.clone());
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

fn event(name: &str) -> NotificationEvent {
    let form = Form::try_new(FormParts::new("signup")).expect("valid form");
    let fields: FieldMap = [
        ("name".to_owned(), FieldValue::from(name)),
        ("year".to_owned(), FieldValue::Integer(2024)),
    ]
    .into_iter()
    .collect();
    NotificationEvent::new(
        Arc::new(form),
        StoredRecord {
            id: Some(format!("rec-{name}")),
            fields,
        },
    )
}

fn hook(retry: u32) -> WebhookTarget {
    let mut target = WebhookTarget::new(Url::parse("http://hooks.test/submissions").expect("url"));
    target.retry = policy(retry, Duration::from_secs(2));
    target
}

fn spawn_webhooks(
    dispatcher: &Arc<WebhookDispatcher>,
    shutdown: &CancellationToken,
) -> JoinHandle<()> {
    let dispatcher = Arc::clone(dispatcher);
    let shutdown = shutdown.clone();
    tokio::spawn(async move { dispatcher.run(shutdown).await })
}

async fn next<T>(receiver: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, receiver.recv())
        .await
        .expect("delivery within timeout")
        .expect("channel open")
}

#[rstest]
#[tokio::test]
async fn webhook_posts_record_as_json(sleeper: Arc<RecordingSleeper>) {
    let (transport, mut sent) = ChannelTransport::new([]);
    let dispatcher = Arc::new(
        WebhookDispatcher::new(4, transport, Arc::new(FixtureTemplateRenderer))
            .with_sleeper(sleeper),
    );
    let shutdown = CancellationToken::new();
    let worker = spawn_webhooks(&dispatcher, &shutdown);
    let event = event("Ann");

    dispatcher
        .create(hook(0))
        .dispatch(&CancellationToken::new(), &event)
        .await
        .expect("queued");
    let request = next(&mut sent).await;

    assert_eq!(request.method, "POST");
    assert_eq!(
        request.headers.get("Content-Type").map(String::as_str),
        Some("application/json")
    );
    let body: serde_json::Value = serde_json::from_slice(&request.body).expect("json body");
    assert_eq!(body, serde_json::json!({"ID": "rec-Ann", "name": "Ann", "year": 2024}));

    shutdown.cancel();
    worker.await.expect("worker joins");
}

#[rstest]
#[tokio::test]
async fn webhook_retries_failed_statuses(sleeper: Arc<RecordingSleeper>) {
    let (transport, mut sent) = ChannelTransport::new([
        Err(WebhookDeliveryError::status(502_u16)),
        Err(WebhookDeliveryError::transport("connection reset")),
    ]);
    let dispatcher = Arc::new(
        WebhookDispatcher::new(4, transport, Arc::new(FixtureTemplateRenderer))
            .with_sleeper(sleeper.clone()),
    );
    let shutdown = CancellationToken::new();
    let worker = spawn_webhooks(&dispatcher, &shutdown);

    dispatcher
        .create(hook(3))
        .dispatch(&CancellationToken::new(), &event("Ann"))
        .await
        .expect("queued");
    for _ in 0..3 {
        next(&mut sent).await;
    }

    assert_eq!(sleeper.naps(), vec![Duration::from_secs(2); 2]);
    shutdown.cancel();
    worker.await.expect("worker joins");
}

#[rstest]
#[tokio::test]
async fn webhook_payload_template_is_rendered_at_enqueue(sleeper: Arc<RecordingSleeper>) {
    let (transport, mut sent) = ChannelTransport::new([]);
    let dispatcher = Arc::new(
        WebhookDispatcher::new(4, transport, Arc::new(FixtureTemplateRenderer))
            .with_sleeper(sleeper),
    );
    let mut target = hook(0);
    target.method = "PUT".to_owned();
    target.payload = Some("{{ form.name }}:{{ result.name }}:{{ result.ID }}".to_owned());
    let shutdown = CancellationToken::new();
    let worker = spawn_webhooks(&dispatcher, &shutdown);

    dispatcher
        .create(target)
        .dispatch(&CancellationToken::new(), &event("Ann"))
        .await
        .expect("queued");
    let request = next(&mut sent).await;

    assert_eq!(request.method, "PUT");
    assert_eq!(request.body, b"signup:Ann:rec-Ann");
    assert!(request.headers.is_empty());
    shutdown.cancel();
    worker.await.expect("worker joins");
}

#[tokio::test]
async fn broken_payload_fails_only_that_dispatch() {
    let (transport, _sent) = ChannelTransport::new([]);
    let dispatcher = Arc::new(WebhookDispatcher::new(
        1,
        transport,
        Arc::new(FixtureTemplateRenderer),
    ));
    let mut target = hook(0);
    target.payload = Some("{{ missing.value }}".to_owned());

    let error = dispatcher
        .create(target)
        .dispatch(&CancellationToken::new(), &event("Ann"))
        .await
        .expect_err("render failure");

    assert!(matches!(error, DispatchError::Render(_)));
    assert!(error.affects_only_this_target());
}

#[tokio::test]
async fn full_queue_honours_caller_cancellation() {
    let (transport, _sent) = ChannelTransport::new([]);
    let dispatcher = Arc::new(WebhookDispatcher::new(
        1,
        transport,
        Arc::new(FixtureTemplateRenderer),
    ));
    let notification = dispatcher.create(hook(0));
    notification
        .dispatch(&CancellationToken::new(), &event("Ann"))
        .await
        .expect("first task fits");

    let cancel = CancellationToken::new();
    let blocked = {
        let cancel = cancel.clone();
        let notification = Arc::clone(&notification);
        tokio::spawn(async move { notification.dispatch(&cancel, &event("Bob")).await })
    };
    cancel.cancel();

    let result = tokio::time::timeout(WAIT, blocked)
        .await
        .expect("enqueue returns")
        .expect("task joins");
    assert_eq!(result, Err(DispatchError::Cancelled));
}

#[rstest]
#[tokio::test]
async fn stopped_dispatcher_refuses_new_tasks(sleeper: Arc<RecordingSleeper>) {
    let (transport, _sent) = ChannelTransport::new([]);
    let dispatcher = Arc::new(
        WebhookDispatcher::new(4, transport, Arc::new(FixtureTemplateRenderer))
            .with_sleeper(sleeper),
    );
    let shutdown = CancellationToken::new();
    let worker = spawn_webhooks(&dispatcher, &shutdown);
    shutdown.cancel();
    worker.await.expect("worker joins");

    let result = dispatcher
        .create(hook(0))
        .dispatch(&CancellationToken::new(), &event("Ann"))
        .await;
    assert_eq!(result, Err(DispatchError::Closed));
}

/// Broker double counting connections and closes; every publish attempt is
/// reported before the scripted result is returned.
struct FakeConnector {
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    script: Arc<StdMutex<VecDeque<Result<(), BrokerError>>>>,
    published: mpsc::UnboundedSender<BrokerMessage>,
}

struct FakeChannel {
    closes: Arc<AtomicUsize>,
    script: Arc<StdMutex<VecDeque<Result<(), BrokerError>>>>,
    published: mpsc::UnboundedSender<BrokerMessage>,
}

impl FakeConnector {
    fn new(
        script: impl IntoIterator<Item = Result<(), BrokerError>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<BrokerMessage>) {
        let (published, received) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(StdMutex::new(script.into_iter().collect())),
            published,
        });
        (connector, received)
    }
}

#[async_trait]
impl BrokerConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeChannel {
            closes: Arc::clone(&self.closes),
            script: Arc::clone(&self.script),
            published: self.published.clone(),
        }))
    }
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    async fn publish(&mut self, message: &BrokerMessage) -> Result<(), BrokerError> {
        let _ = self.published.send(message.clone());
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn queue_target() -> BrokerTarget {
    BrokerTarget {
        exchange: "forms".to_owned(),
        routing_key: "forms.{{ form.name }}".to_owned(),
        message_id: Some("{{ result.ID }}".to_owned()),
        headers: BTreeMap::from([("source".to_owned(), "web-form".to_owned())]),
        retry: policy(2, Duration::from_secs(1)),
        ..BrokerTarget::default()
    }
}

fn spawn_broker(dispatcher: &Arc<BrokerDispatcher>, shutdown: &CancellationToken) -> JoinHandle<()> {
    let dispatcher = Arc::clone(dispatcher);
    let shutdown = shutdown.clone();
    tokio::spawn(async move { dispatcher.run(shutdown).await })
}

#[rstest]
#[tokio::test]
async fn broker_reconnects_after_publish_failure(sleeper: Arc<RecordingSleeper>) {
    let (connector, mut published) =
        FakeConnector::new([Err(BrokerError::publish("channel closed by peer"))]);
    let dispatcher = Arc::new(
        BrokerDispatcher::new(4, connector.clone(), Arc::new(FixtureTemplateRenderer))
            .with_sleeper(sleeper.clone()),
    );
    let shutdown = CancellationToken::new();
    let worker = spawn_broker(&dispatcher, &shutdown);

    dispatcher
        .create(queue_target())
        .dispatch(&CancellationToken::new(), &event("Ann"))
        .await
        .expect("queued");
    let first = next(&mut published).await;
    let second = next(&mut published).await;

    assert_eq!(first, second);
    assert_eq!(second.routing_key, "forms.signup");
    assert_eq!(second.message_id.as_deref(), Some("rec-Ann"));
    assert_eq!(second.content_type, "application/json");
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    assert_eq!(sleeper.naps(), vec![Duration::from_secs(1)]);

    shutdown.cancel();
    worker.await.expect("worker joins");
    assert_eq!(connector.closes.load(Ordering::SeqCst), 2);
}

#[rstest]
#[tokio::test]
async fn broker_preserves_enqueue_order(sleeper: Arc<RecordingSleeper>) {
    let (connector, mut published) = FakeConnector::new([]);
    let dispatcher = Arc::new(
        BrokerDispatcher::new(8, connector.clone(), Arc::new(FixtureTemplateRenderer))
            .with_sleeper(sleeper),
    );
    let notification = dispatcher.create(queue_target());
    let cancel = CancellationToken::new();
    for name in ["Ann", "Bob", "Cy"] {
        notification
            .dispatch(&cancel, &event(name))
            .await
            .expect("queued");
    }

    let shutdown = CancellationToken::new();
    let worker = spawn_broker(&dispatcher, &shutdown);
    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(next(&mut published).await.message_id);
    }

    assert_eq!(
        order,
        vec![
            Some("rec-Ann".to_owned()),
            Some("rec-Bob".to_owned()),
            Some("rec-Cy".to_owned()),
        ]
    );
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    shutdown.cancel();
    worker.await.expect("worker joins");
}
