use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::{
    Error,
    config::AndroidConfig,
    providers::{BoxFuture, FcmClient},
};

/// Builds a delivery client bound to one service account.
pub trait ClientFactory: Send + Sync {
    fn create<'a>(
        &'a self,
        config: &'a AndroidConfig,
    ) -> BoxFuture<'a, Result<Arc<dyn FcmClient>, Error>>;
}

/// Creates the delivery client once and hands out the cached instance.
///
/// Concurrent first calls share a single initialization. A failed creation
/// leaves the cell empty so the next call tries again. Later calls ignore
/// their config argument.
pub struct ClientProvider {
    factory: Option<Arc<dyn ClientFactory>>,
    client: OnceCell<Arc<dyn FcmClient>>,
}

impl ClientProvider {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory: Some(factory),
            client: OnceCell::new(),
        }
    }

    /// A provider that always returns `client`.
    pub fn with_client(client: Arc<dyn FcmClient>) -> Self {
        Self {
            factory: None,
            client: OnceCell::from(client),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }

    pub async fn get(&self, config: &AndroidConfig) -> Result<Arc<dyn FcmClient>, Error> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let factory = self
                    .factory
                    .as_ref()
                    .ok_or_else(|| Error::ClientInit("no client factory configured".to_string()))?;

                tracing::info!(project_id = %config.project_id, "creating FCM client");
                factory.create(config).await.map_err(|err| match err {
                    Error::ClientInit(_) => err,
                    other => Error::ClientInit(other.to_string()),
                })
            })
            .await?;
        Ok(Arc::clone(client))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::{ClientFactory, ClientProvider};
    use crate::{
        DeliveryError, Error,
        config::AndroidConfig,
        providers::{BatchResponse, BoxFuture, FcmClient, MulticastMessage},
    };

    struct NoopClient;

    impl FcmClient for NoopClient {
        fn send_each_for_multicast<'a>(
            &'a self,
            _message: Arc<MulticastMessage>,
        ) -> BoxFuture<'a, Result<BatchResponse, DeliveryError>> {
            Box::pin(async { Ok(BatchResponse::default()) })
        }
    }

    struct CountingFactory {
        calls: AtomicUsize,
        fail_first: bool,
    }

    impl ClientFactory for CountingFactory {
        fn create<'a>(
            &'a self,
            _config: &'a AndroidConfig,
        ) -> BoxFuture<'a, Result<Arc<dyn FcmClient>, Error>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                if self.fail_first && call == 0 {
                    return Err(Error::Internal("credential file missing".to_string()));
                }
                Ok(Arc::new(NoopClient) as Arc<dyn FcmClient>)
            })
        }
    }

    fn config(project_id: &str) -> AndroidConfig {
        AndroidConfig {
            project_id: project_id.to_string(),
            service_account_key: "key.json".into(),
            send_timeout_secs: 30,
        }
    }

    #[tokio::test]
    async fn caches_first_client_regardless_of_config() {
        let factory = Arc::new(CountingFactory {
            calls: AtomicUsize::new(0),
            fail_first: false,
        });
        let provider = ClientProvider::new(factory.clone());

        let first = provider.get(&config("one")).await.expect("client");
        let second = provider.get(&config("two")).await.expect("client");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_creation_is_not_cached() {
        let factory = Arc::new(CountingFactory {
            calls: AtomicUsize::new(0),
            fail_first: true,
        });
        let provider = ClientProvider::new(factory.clone());

        let err = provider.get(&config("one")).await.err().expect("first call fails");
        assert!(matches!(err, Error::ClientInit(_)));
        assert!(!provider.is_initialized());

        provider.get(&config("one")).await.expect("second call succeeds");
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_initializes_once() {
        let factory = Arc::new(CountingFactory {
            calls: AtomicUsize::new(0),
            fail_first: false,
        });
        let provider = Arc::new(ClientProvider::new(factory.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.get(&config("one")).await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.expect("task").expect("client");
        }

        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preset_client_needs_no_factory() {
        let provider = ClientProvider::with_client(Arc::new(NoopClient));
        assert!(provider.is_initialized());
        provider.get(&config("any")).await.expect("preset client");
    }
}
