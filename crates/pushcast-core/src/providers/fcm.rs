use std::{collections::HashMap, time::Duration};

use thiserror::Error;

use crate::notification::{DataValue, PushNotification};

/// Reasons a request cannot become a platform payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("invalid badge format")]
    InvalidBadgeFormat,

    #[error("invalid sound format")]
    InvalidSoundFormat,

    #[error("invalid data format for key {key}")]
    InvalidDataFormat { key: String },
}

/// Android-specific notification block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AndroidNotification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub image: String,
    pub channel_id: String,
    pub sound: String,
    pub notification_count: Option<i32>,
    pub tag: String,
    pub color: String,
    pub click_action: String,
    pub body_loc_key: String,
    pub body_loc_args: Vec<String>,
    pub title_loc_key: String,
    pub title_loc_args: Vec<String>,
}

/// Android delivery options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AndroidConfig {
    pub collapse_key: String,
    pub priority: String,
    pub ttl: Option<Duration>,
    pub data: HashMap<String, String>,
    pub notification: AndroidNotification,
}

/// Cross-platform notification shown by the system tray.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub image: String,
}

/// One message addressed to many device tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastMessage {
    data: HashMap<String, String>,
    notification: Notification,
    android: AndroidConfig,
    tokens: Vec<String>,
}

impl MulticastMessage {
    pub fn data(&self) -> &HashMap<String, String> {
        &self.data
    }

    pub fn notification(&self) -> &Notification {
        &self.notification
    }

    pub fn android(&self) -> &AndroidConfig {
        &self.android
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Translate a generic request into an FCM multicast message.
///
/// The Android notification honours the nested block and falls back to the
/// request's top-level fields; the top-level notification always uses the
/// request's own title, message and image.
pub fn build_multicast(req: &PushNotification) -> Result<MulticastMessage, PayloadError> {
    let mut notification = AndroidNotification::default();
    if let Some(nested) = &req.notification {
        let notification_count = nested.notification_count().map_err(|badge| {
            tracing::error!(badge = ?badge, "FCM unsupported badge value");
            PayloadError::InvalidBadgeFormat
        })?;

        notification = AndroidNotification {
            title: nested.title.clone(),
            body: nested.body.clone(),
            icon: nested.icon.clone(),
            image: nested.image.clone(),
            channel_id: nested.channel_id.clone(),
            sound: nested.sound.clone(),
            notification_count,
            tag: nested.tag.clone(),
            color: nested.color.clone(),
            click_action: nested.click_action.clone(),
            body_loc_key: nested.body_loc_key.clone(),
            body_loc_args: nested.body_loc_args.clone(),
            title_loc_key: nested.title_loc_key.clone(),
            title_loc_args: nested.title_loc_args.clone(),
        };
    }

    if notification.title.is_empty() {
        notification.title = req.title.clone();
    }
    if notification.body.is_empty() {
        notification.body = req.message.clone();
    }
    if notification.image.is_empty() {
        notification.image = req.image.clone();
    }

    if notification.sound.is_empty() {
        match &req.sound {
            None | Some(DataValue::Null) => {}
            Some(DataValue::String(sound)) => notification.sound = sound.clone(),
            Some(other) => {
                tracing::error!(kind = other.kind(), "FCM unsupported sound value");
                return Err(PayloadError::InvalidSoundFormat);
            }
        }
    }

    let data = convert_data(&req.data)?;

    let android = AndroidConfig {
        collapse_key: req.collapse_key.clone(),
        priority: req.priority.clone(),
        ttl: req
            .time_to_live
            .map(|seconds| Duration::from_secs(u64::from(seconds))),
        data: data.clone(),
        notification,
    };

    Ok(MulticastMessage {
        data,
        notification: Notification {
            title: req.title.clone(),
            body: req.message.clone(),
            image: req.image.clone(),
        },
        android,
        tokens: req.recipients(),
    })
}

/// Convert the dynamic data map into FCM's string map. Null entries are
/// skipped; any nested value rejects the whole map.
pub fn convert_data(
    data: &HashMap<String, DataValue>,
) -> Result<HashMap<String, String>, PayloadError> {
    let mut out = HashMap::with_capacity(data.len());
    for (key, value) in data {
        let converted = match value {
            DataValue::Null => {
                tracing::debug!(key = %key, "skip null payload field");
                continue;
            }
            DataValue::Bool(v) => v.to_string(),
            DataValue::Int(v) => v.to_string(),
            DataValue::Uint(v) => v.to_string(),
            DataValue::F32(v) => f64::from(*v).to_string(),
            DataValue::F64(v) => v.to_string(),
            DataValue::String(v) => v.clone(),
            DataValue::Nested(_) => {
                tracing::error!(
                    key = %key,
                    kind = value.kind(),
                    "FCM unsupported data value"
                );
                return Err(PayloadError::InvalidDataFormat { key: key.clone() });
            }
        };
        out.insert(key.clone(), converted);
    }
    Ok(out)
}
