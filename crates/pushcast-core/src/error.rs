use serde::Serialize;
use thiserror::Error;

use crate::providers::fcm::PayloadError;

#[derive(Debug, Error)]
pub enum Error {
    /// Request validation error.
    #[error("validation failed: {0}")]
    Validation(&'static str),

    /// The request could not be translated into a platform payload.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The delivery client could not be created.
    #[error("unable to create FCM client: {0}")]
    ClientInit(String),

    /// The multicast send did not complete.
    #[error("FCM send failed: {0}")]
    Transport(DeliveryError),

    /// Upstream credential or push provider failure.
    #[error("upstream {provider} error (HTTP {status}): {message}")]
    Upstream {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Authentication failed or not authorized.
    #[error("invalid credentials or unauthorized")]
    Unauthorized,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure reported by the delivery service, either for one recipient or for
/// a whole multicast call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct DeliveryError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn upstream(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code,
            message: message.into(),
        }
    }
}
