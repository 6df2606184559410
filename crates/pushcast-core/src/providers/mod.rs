use std::{future::Future, pin::Pin, sync::Arc};

use crate::{DeliveryError, Error};

pub mod fcm;
pub mod fcm_client;

pub use fcm::{MulticastMessage, PayloadError, build_multicast};
pub use fcm_client::FcmService;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub token: Arc<str>,
}

#[derive(Debug, Clone)]
pub struct FcmAccess {
    pub token: TokenInfo,
    pub project_id: Arc<str>,
}

/// Outcome of a single recipient within a multicast send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    pub message_id: Option<String>,
    pub error: Option<DeliveryError>,
}

impl SendResponse {
    pub fn success(message_id: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failure(error: DeliveryError) -> Self {
        Self {
            message_id: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of a multicast send, one response per submitted token in
/// submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub success_count: usize,
    pub failure_count: usize,
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn from_responses(responses: Vec<SendResponse>) -> Self {
        let success_count = responses.iter().filter(|resp| resp.is_success()).count();
        Self {
            success_count,
            failure_count: responses.len() - success_count,
            responses,
        }
    }
}

pub trait FcmTokenProvider: Send + Sync {
    fn token_info<'a>(&'a self) -> BoxFuture<'a, Result<FcmAccess, Error>>;
}

pub trait FcmClient: Send + Sync {
    /// Send one message to every token it addresses. An `Err` means the call
    /// as a whole did not complete.
    fn send_each_for_multicast<'a>(
        &'a self,
        message: Arc<MulticastMessage>,
    ) -> BoxFuture<'a, Result<BatchResponse, DeliveryError>>;
}
