use std::{collections::HashMap, sync::Arc, time::Duration};

use futures_util::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    DeliveryError, Error,
    providers::{
        BatchResponse, BoxFuture, FcmAccess, FcmClient, FcmTokenProvider, SendResponse,
        fcm::{AndroidConfig, AndroidNotification, MulticastMessage, Notification},
    },
};

const FCM_TIMEOUT: Duration = Duration::from_secs(60);
const FCM_MAX_MULTICAST_TOKENS: usize = 500;

pub struct FcmService {
    client: Client,
    token_provider: Arc<dyn FcmTokenProvider>,
}

impl FcmService {
    pub fn new(token_provider: Arc<dyn FcmTokenProvider>) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent("pushcast/0.1.0")
            .timeout(FCM_TIMEOUT)
            .build()
            .map_err(|err| Error::Internal(err.to_string()))?;

        Ok(Self {
            client,
            token_provider,
        })
    }

    pub async fn send_each_for_multicast(
        &self,
        message: &MulticastMessage,
    ) -> Result<BatchResponse, DeliveryError> {
        let tokens = message.tokens();
        if tokens.is_empty() {
            return Err(DeliveryError::new("tokens must be a non-empty array"));
        }
        if tokens.len() > FCM_MAX_MULTICAST_TOKENS {
            return Err(DeliveryError::new(format!(
                "tokens must not contain more than {FCM_MAX_MULTICAST_TOKENS} elements"
            )));
        }

        let android = WireAndroidConfig::from_config(message.android())?;
        let notification = WireNotification::from_notification(message.notification());

        let access = self.token_provider.token_info().await.map_err(|err| {
            DeliveryError::new(format!("unable to obtain FCM access token: {err}"))
        })?;
        let endpoint = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            access.project_id
        );

        let sends = tokens.iter().map(|token| {
            let request = FcmRequest {
                message: FcmMessage {
                    token,
                    data: message.data(),
                    notification: notification.as_ref(),
                    android: &android,
                },
            };
            self.send_one(&endpoint, &access, request)
        });
        let responses = join_all(sends).await;

        Ok(BatchResponse::from_responses(responses))
    }

    async fn send_one(
        &self,
        endpoint: &str,
        access: &FcmAccess,
        request: FcmRequest<'_>,
    ) -> SendResponse {
        let body = match serde_json::to_vec(&request) {
            Ok(body) => body,
            Err(err) => return SendResponse::failure(DeliveryError::new(err.to_string())),
        };

        let response = match self
            .client
            .post(endpoint)
            .bearer_auth(access.token.token.as_ref())
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => return SendResponse::failure(DeliveryError::new(err.to_string())),
        };

        let status = response.status();
        let status_code = status.as_u16();
        let body_text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return SendResponse::failure(parse_fcm_error(status_code, &body_text));
        }

        let message_id = serde_json::from_str::<FcmSendResponse>(&body_text)
            .ok()
            .and_then(|resp| resp.name)
            .unwrap_or_default();
        SendResponse::success(message_id)
    }
}

impl FcmClient for FcmService {
    fn send_each_for_multicast<'a>(
        &'a self,
        message: Arc<MulticastMessage>,
    ) -> BoxFuture<'a, Result<BatchResponse, DeliveryError>> {
        Box::pin(async move { self.send_each_for_multicast(&message).await })
    }
}

/// Map an FCM v1 error body onto a [`DeliveryError`], keeping the most
/// specific error code the body carries.
fn parse_fcm_error(status_code: u16, body_text: &str) -> DeliveryError {
    let fallback_message = if body_text.is_empty() {
        format!("FCM error, status {status_code}")
    } else {
        body_text.to_string()
    };

    let value: serde_json::Value = match serde_json::from_str(body_text) {
        Ok(value) => value,
        Err(_) => {
            let code = looks_unregistered(body_text).then(|| "UNREGISTERED".to_string());
            return DeliveryError::upstream(status_code, code, fallback_message);
        }
    };
    let Some(error) = value.get("error") else {
        return DeliveryError::upstream(status_code, None, fallback_message);
    };

    let detail_code = error
        .get("details")
        .and_then(|details| details.as_array())
        .and_then(|details| {
            details
                .iter()
                .find_map(|detail| detail.get("errorCode").and_then(|code| code.as_str()))
        });
    let status_code_name = error.get("status").and_then(|status| status.as_str());
    let message = error.get("message").and_then(|msg| msg.as_str());

    let code = match (detail_code, status_code_name, message) {
        (Some(code), _, _) => Some(code.to_string()),
        (None, _, Some(message)) if looks_unregistered(message) => {
            Some("UNREGISTERED".to_string())
        }
        (None, Some(status), _) => Some(status.to_string()),
        (None, None, _) => None,
    };

    DeliveryError::upstream(
        status_code,
        code,
        message.map(str::to_string).unwrap_or(fallback_message),
    )
}

fn looks_unregistered(text: &str) -> bool {
    let haystack = text.to_ascii_lowercase();
    haystack.contains("unregistered")
        || haystack.contains("not registered")
        || haystack.contains("invalid registration token")
        || (haystack.contains("registration token") && haystack.contains("invalid"))
}

fn format_ttl(ttl: Duration) -> String {
    if ttl.subsec_nanos() == 0 {
        format!("{}s", ttl.as_secs())
    } else {
        format!("{}.{:09}s", ttl.as_secs(), ttl.subsec_nanos())
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

#[derive(Deserialize)]
struct FcmSendResponse {
    name: Option<String>,
}

#[derive(Serialize)]
struct FcmRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    data: &'a HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<&'a WireNotification<'a>>,
    android: &'a WireAndroidConfig<'a>,
}

#[derive(Serialize)]
struct WireNotification<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

impl<'a> WireNotification<'a> {
    fn from_notification(notification: &'a Notification) -> Option<Self> {
        let wire = Self {
            title: non_empty(&notification.title),
            body: non_empty(&notification.body),
            image: non_empty(&notification.image),
        };
        if wire.title.is_none() && wire.body.is_none() && wire.image.is_none() {
            None
        } else {
            Some(wire)
        }
    }
}

#[derive(Serialize)]
struct WireAndroidConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    collapse_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    data: &'a HashMap<String, String>,
    notification: WireAndroidNotification<'a>,
}

impl<'a> WireAndroidConfig<'a> {
    fn from_config(config: &'a AndroidConfig) -> Result<Self, DeliveryError> {
        let priority = match config.priority.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "high" => Some("HIGH"),
            "normal" => Some("NORMAL"),
            _ => {
                return Err(DeliveryError::new(
                    "priority must be 'high' or 'normal'",
                ));
            }
        };

        Ok(Self {
            collapse_key: non_empty(&config.collapse_key),
            priority,
            ttl: config.ttl.map(format_ttl),
            data: &config.data,
            notification: WireAndroidNotification::from_notification(&config.notification),
        })
    }
}

#[derive(Serialize)]
struct WireAndroidNotification<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    click_action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_loc_key: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    body_loc_args: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    title_loc_key: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    title_loc_args: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_count: Option<i32>,
}

impl<'a> WireAndroidNotification<'a> {
    fn from_notification(notification: &'a AndroidNotification) -> Self {
        Self {
            title: non_empty(&notification.title),
            body: non_empty(&notification.body),
            icon: non_empty(&notification.icon),
            color: non_empty(&notification.color),
            sound: non_empty(&notification.sound),
            tag: non_empty(&notification.tag),
            click_action: non_empty(&notification.click_action),
            body_loc_key: non_empty(&notification.body_loc_key),
            body_loc_args: &notification.body_loc_args,
            title_loc_key: non_empty(&notification.title_loc_key),
            title_loc_args: &notification.title_loc_args,
            channel_id: non_empty(&notification.channel_id),
            image: non_empty(&notification.image),
            notification_count: notification.notification_count,
        }
    }
}
