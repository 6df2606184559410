pub mod client;

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    DeliveryError, Error,
    audit::{AuditLog, AuditRecord},
    config::AndroidConfig,
    notification::PushNotification,
    providers::{BatchResponse, FcmClient, MulticastMessage, build_multicast},
    status::MetricsSink,
    validate::Validator,
};

pub use client::{ClientFactory, ClientProvider};

const PLATFORM: &str = "android";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PushStatus {
    #[serde(rename = "succeeded-push")]
    Succeeded,
    #[serde(rename = "failed-push")]
    Failed,
}

impl PushStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PushStatus::Succeeded => "succeeded-push",
            PushStatus::Failed => "failed-push",
        }
    }
}

/// Delivery outcome for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub token: String,
    pub status: PushStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DeliveryError>,
}

impl LogEntry {
    fn succeeded(token: String) -> Self {
        Self {
            token,
            status: PushStatus::Succeeded,
            error: None,
        }
    }

    fn failed(token: String, error: DeliveryError) -> Self {
        Self {
            token,
            status: PushStatus::Failed,
            error: Some(error),
        }
    }
}

/// Per-recipient log of one dispatch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub logs: Vec<LogEntry>,
}

impl DispatchResult {
    pub fn succeeded(&self) -> usize {
        self.count(PushStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(PushStatus::Failed)
    }

    fn count(&self, status: PushStatus) -> usize {
        self.logs.iter().filter(|entry| entry.status == status).count()
    }
}

/// A dispatch that ended with an error. `result` is empty unless the send
/// itself failed, in which case every recipient is marked failed.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DispatchFailure {
    pub error: Error,
    pub result: DispatchResult,
}

impl DispatchFailure {
    fn before_send(error: Error) -> Self {
        Self {
            error,
            result: DispatchResult::default(),
        }
    }
}

/// Bounds the network send of a dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl DispatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Validates, builds, sends and reconciles Android push requests.
pub struct Dispatcher {
    validator: Arc<dyn Validator>,
    clients: Arc<ClientProvider>,
    metrics: Arc<dyn MetricsSink>,
    audit: Arc<dyn AuditLog>,
}

impl Dispatcher {
    pub fn new(
        validator: Arc<dyn Validator>,
        clients: Arc<ClientProvider>,
        metrics: Arc<dyn MetricsSink>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            validator,
            clients,
            metrics,
            audit,
        }
    }

    #[tracing::instrument(
        name = "dispatcher.dispatch",
        skip_all,
        fields(
            platform = PLATFORM,
            tokens = req.recipients().len(),
            dispatch_id = tracing::field::Empty,
        )
    )]
    pub async fn dispatch(
        &self,
        ctx: &DispatchContext,
        req: &PushNotification,
        config: &AndroidConfig,
    ) -> Result<DispatchResult, DispatchFailure> {
        tracing::debug!("start push notification for android");

        if let Err(err) = self.validator.validate(req) {
            tracing::error!(error = %err, "request error");
            return Err(DispatchFailure::before_send(err));
        }

        let message = match build_multicast(req) {
            Ok(message) => Arc::new(message),
            Err(err) => {
                tracing::error!(error = %err, "FCM payload error");
                return Err(DispatchFailure::before_send(err.into()));
            }
        };

        let client = match self.clients.get(config).await {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "FCM client error");
                return Err(DispatchFailure::before_send(err));
            }
        };

        let dispatch_id = Uuid::new_v4();
        tracing::Span::current().record("dispatch_id", tracing::field::display(dispatch_id));
        let tokens = message.tokens().to_vec();

        let response = match send(ctx, client.as_ref(), message).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "FCM server send message error");
                let result = self.fail_all(dispatch_id, req, tokens, &err);
                return Err(DispatchFailure {
                    error: Error::Transport(err),
                    result,
                });
            }
        };

        self.metrics.add_success(response.success_count as u64);
        self.metrics.add_error(response.failure_count as u64);
        tracing::debug!(
            success = response.success_count,
            failure = response.failure_count,
            "FCM multicast sent"
        );

        Ok(self.reconcile(dispatch_id, req, response))
    }

    fn fail_all(
        &self,
        dispatch_id: Uuid,
        req: &PushNotification,
        tokens: Vec<String>,
        err: &DeliveryError,
    ) -> DispatchResult {
        self.metrics.add_error(tokens.len() as u64);
        let logs = tokens
            .into_iter()
            .map(|token| LogEntry::failed(token, err.clone()))
            .collect();
        self.record(dispatch_id, req, logs)
    }

    fn reconcile(
        &self,
        dispatch_id: Uuid,
        req: &PushNotification,
        response: BatchResponse,
    ) -> DispatchResult {
        let logs = response
            .responses
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| {
                let token = req.tokens.get(index).unwrap_or(&req.to).clone();
                match outcome.error {
                    Some(err) => LogEntry::failed(token, err),
                    None => LogEntry::succeeded(token),
                }
            })
            .collect();
        self.record(dispatch_id, req, logs)
    }

    fn record(
        &self,
        dispatch_id: Uuid,
        req: &PushNotification,
        logs: Vec<LogEntry>,
    ) -> DispatchResult {
        let records = logs
            .iter()
            .map(|entry| AuditRecord {
                dispatch_id,
                platform: PLATFORM,
                status: entry.status,
                token: entry.token.clone(),
                message: req.message.clone(),
                error: entry.error.clone(),
            })
            .collect();
        self.audit.append_batch(records);
        DispatchResult { logs }
    }
}

async fn send(
    ctx: &DispatchContext,
    client: &dyn FcmClient,
    message: Arc<MulticastMessage>,
) -> Result<BatchResponse, DeliveryError> {
    let send = async {
        match ctx.timeout {
            Some(limit) => tokio::time::timeout(limit, client.send_each_for_multicast(message))
                .await
                .map_err(|_| DeliveryError::new("context deadline exceeded"))?,
            None => client.send_each_for_multicast(message).await,
        }
    };

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(DeliveryError::new("context canceled")),
        result = send => result,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use tokio_util::sync::CancellationToken;
    use tracing::{
        Subscriber,
        field::{Field, Visit},
        span::{Attributes, Id, Record},
    };
    use tracing_subscriber::{
        layer::{Context, Layer, SubscriberExt},
        util::SubscriberInitExt,
    };

    use super::{ClientFactory, ClientProvider, DispatchContext, Dispatcher, PushStatus};
    use crate::{
        DeliveryError, Error,
        audit::MemoryAuditLog,
        config::AndroidConfig,
        notification::{DataValue, PushNotification},
        providers::{BatchResponse, BoxFuture, FcmClient, MulticastMessage, SendResponse},
        status::{StatSnapshot, StatStorage},
        validate::RequestValidator,
    };

    /// Fails the tokens listed in `failures`, or the whole call when
    /// `transport` is set.
    #[derive(Default)]
    struct FakeClient {
        failures: HashMap<String, String>,
        transport: Option<String>,
        delay: Option<Duration>,
        sent: parking_lot::Mutex<Vec<Arc<MulticastMessage>>>,
    }

    impl FcmClient for FakeClient {
        fn send_each_for_multicast<'a>(
            &'a self,
            message: Arc<MulticastMessage>,
        ) -> BoxFuture<'a, Result<BatchResponse, DeliveryError>> {
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.sent.lock().push(Arc::clone(&message));
                if let Some(err) = &self.transport {
                    return Err(DeliveryError::new(err.clone()));
                }
                let responses = message
                    .tokens()
                    .iter()
                    .map(|token| match self.failures.get(token) {
                        Some(err) => SendResponse::failure(DeliveryError::new(err.clone())),
                        None => SendResponse::success(format!("projects/demo/messages/{token}")),
                    })
                    .collect();
                Ok(BatchResponse::from_responses(responses))
            })
        }
    }

    struct CountingFactory {
        client: Arc<FakeClient>,
        calls: AtomicUsize,
    }

    impl ClientFactory for CountingFactory {
        fn create<'a>(
            &'a self,
            _config: &'a AndroidConfig,
        ) -> BoxFuture<'a, Result<Arc<dyn FcmClient>, Error>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::clone(&self.client) as Arc<dyn FcmClient>)
            })
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        factory: Arc<CountingFactory>,
        client: Arc<FakeClient>,
        stats: Arc<StatStorage>,
        audit: Arc<MemoryAuditLog>,
    }

    fn harness(client: FakeClient) -> Harness {
        let client = Arc::new(client);
        let factory = Arc::new(CountingFactory {
            client: Arc::clone(&client),
            calls: AtomicUsize::new(0),
        });
        let stats = Arc::new(StatStorage::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let dispatcher = Dispatcher::new(
            Arc::new(RequestValidator),
            Arc::new(ClientProvider::new(factory.clone())),
            stats.clone(),
            audit.clone(),
        );
        Harness {
            dispatcher,
            factory,
            client,
            stats,
            audit,
        }
    }

    fn config() -> AndroidConfig {
        AndroidConfig {
            project_id: "demo".to_string(),
            service_account_key: "key.json".into(),
            send_timeout_secs: 30,
        }
    }

    fn request(tokens: &[&str]) -> PushNotification {
        PushNotification {
            tokens: tokens.iter().map(|token| token.to_string()).collect(),
            title: "Hi".to_string(),
            message: "hello".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn partial_failure_is_not_an_error() {
        let h = harness(FakeClient {
            failures: HashMap::from([
                ("B".to_string(), "unregistered".to_string()),
                ("D".to_string(), "invalid argument".to_string()),
            ]),
            ..Default::default()
        });

        let result = h
            .dispatcher
            .dispatch(&DispatchContext::new(), &request(&["A", "B", "C", "D"]), &config())
            .await
            .expect("partial failure is reported as success");

        let tokens: Vec<_> = result.logs.iter().map(|entry| entry.token.as_str()).collect();
        assert_eq!(tokens, ["A", "B", "C", "D"]);
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed(), 2);
        assert_eq!(result.logs[1].status, PushStatus::Failed);
        assert_eq!(
            result.logs[1].error.as_ref().map(|err| err.message.as_str()),
            Some("unregistered")
        );
        assert_eq!(result.logs[0].error, None);

        assert_eq!(
            h.stats.snapshot(),
            StatSnapshot {
                push_success: 2,
                push_error: 2,
            }
        );
        let records = h.audit.records();
        assert_eq!(records.len(), 4);
        assert_eq!(records[3].token, "D");
        assert_eq!(records[3].message, "hello");
    }

    #[tokio::test]
    async fn transport_failure_marks_every_token_failed() {
        let h = harness(FakeClient {
            transport: Some("connection reset".to_string()),
            ..Default::default()
        });

        let failure = h
            .dispatcher
            .dispatch(&DispatchContext::new(), &request(&["A", "B", "C"]), &config())
            .await
            .unwrap_err();

        assert!(matches!(&failure.error, Error::Transport(err) if err.message == "connection reset"));
        assert_eq!(failure.result.logs.len(), 3);
        for entry in &failure.result.logs {
            assert_eq!(entry.status, PushStatus::Failed);
            assert_eq!(
                entry.error.as_ref().map(|err| err.message.as_str()),
                Some("connection reset")
            );
        }
        assert_eq!(
            h.stats.snapshot(),
            StatSnapshot {
                push_success: 0,
                push_error: 3,
            }
        );
        assert_eq!(h.audit.len(), 3);
        assert_eq!(h.client.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn invalid_sound_fails_before_client_creation() {
        let h = harness(FakeClient::default());
        let mut req = request(&["A"]);
        req.sound = Some(DataValue::Bool(true));

        let failure = h
            .dispatcher
            .dispatch(&DispatchContext::new(), &req, &config())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, Error::Payload(_)));
        assert!(failure.result.logs.is_empty());
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 0);
        assert!(h.client.sent.lock().is_empty());
        assert_eq!(h.stats.snapshot(), StatSnapshot::default());
        assert!(h.audit.is_empty());
    }

    #[tokio::test]
    async fn validation_failure_touches_nothing() {
        let h = harness(FakeClient::default());

        let failure = h
            .dispatcher
            .dispatch(&DispatchContext::new(), &PushNotification::default(), &config())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, Error::Validation(_)));
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.stats.snapshot(), StatSnapshot::default());
        assert!(h.audit.is_empty());
    }

    #[tokio::test]
    async fn legacy_recipient_is_paired_with_first_outcome() {
        let h = harness(FakeClient::default());
        let req = PushNotification {
            to: "legacy".to_string(),
            ..Default::default()
        };

        let result = h
            .dispatcher
            .dispatch(&DispatchContext::new(), &req, &config())
            .await
            .expect("legacy dispatch succeeds");

        assert_eq!(result.logs.len(), 1);
        assert_eq!(result.logs[0].token, "legacy");
        assert_eq!(result.logs[0].status, PushStatus::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn send_deadline_becomes_transport_error() {
        let h = harness(FakeClient {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let ctx = DispatchContext::new().with_timeout(Some(Duration::from_secs(1)));

        let failure = h
            .dispatcher
            .dispatch(&ctx, &request(&["A", "B"]), &config())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, Error::Transport(_)));
        assert_eq!(failure.result.failed(), 2);
        assert_eq!(h.stats.snapshot().push_error, 2);
    }

    #[tokio::test]
    async fn cancelled_context_aborts_send() {
        let h = harness(FakeClient::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = DispatchContext::new().with_cancellation(cancel);

        let failure = h
            .dispatcher
            .dispatch(&ctx, &request(&["A"]), &config())
            .await
            .unwrap_err();

        assert!(matches!(&failure.error, Error::Transport(err) if err.message == "context canceled"));
        assert!(h.client.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn client_is_created_once_across_dispatches() {
        let h = harness(FakeClient::default());
        for _ in 0..3 {
            h.dispatcher
                .dispatch(&DispatchContext::new(), &request(&["A"]), &config())
                .await
                .expect("dispatch succeeds");
        }
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.stats.snapshot().push_success, 3);
    }

    /// Collects every field recorded on any span.
    #[derive(Clone, Default)]
    struct SpanFields(Arc<parking_lot::Mutex<Vec<(String, String)>>>);

    impl Visit for SpanFields {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            self.0
                .lock()
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }

    impl<S: Subscriber> Layer<S> for SpanFields {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            attrs.record(&mut self.clone());
        }

        fn on_record(&self, _id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
            values.record(&mut self.clone());
        }
    }

    #[tokio::test]
    async fn dispatch_span_carries_id_and_recipient_count() {
        let fields = SpanFields::default();
        let _guard = tracing_subscriber::registry()
            .with(fields.clone())
            .set_default();

        let h = harness(FakeClient::default());
        let req = PushNotification {
            to: "legacy".to_string(),
            title: "Hi".to_string(),
            ..Default::default()
        };
        h.dispatcher
            .dispatch(&DispatchContext::new(), &req, &config())
            .await
            .expect("dispatch succeeds");

        let recorded = fields.0.lock().clone();
        let value = |name: &str| {
            recorded
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value.clone())
        };
        assert_eq!(value("tokens").as_deref(), Some("1"));
        assert_eq!(value("platform").as_deref(), Some("\"android\""));

        let dispatch_id = value("dispatch_id").expect("dispatch id recorded");
        assert_eq!(
            h.audit.records()[0].dispatch_id.to_string(),
            dispatch_id
        );
    }
}
