use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::{
    api::{Error, HttpResult},
    app::AppState,
    dispatch::{DispatchContext, LogEntry},
    notification::PushNotification,
};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct PushRequest {
    pub notifications: Vec<PushNotification>,
}

impl PushRequest {
    pub fn validate_payload(&self, max_notifications: usize) -> Result<(), Error> {
        if self.notifications.is_empty() {
            return Err(Error::Validation("notifications must not be empty"));
        }
        if max_notifications > 0 && self.notifications.len() > max_notifications {
            return Err(Error::Validation("too many notifications in one request"));
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub(crate) struct NotificationError {
    index: usize,
    error: String,
}

#[derive(Serialize)]
pub(crate) struct PushSummary {
    counts: usize,
    succeeded: usize,
    failed: usize,
    logs: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<NotificationError>,
}

pub(crate) async fn push_notifications(
    State(state): State<AppState>,
    Json(payload): Json<PushRequest>,
) -> HttpResult {
    payload.validate_payload(state.max_notifications)?;

    let mut summary = PushSummary {
        counts: 0,
        succeeded: 0,
        failed: 0,
        logs: Vec::new(),
        errors: Vec::new(),
    };

    for (index, notification) in payload.notifications.iter().enumerate() {
        summary.counts += notification.recipients().len();
        let ctx = DispatchContext::new().with_timeout(state.android.send_timeout());
        let result = match state
            .dispatcher
            .dispatch(&ctx, notification, &state.android)
            .await
        {
            Ok(result) => result,
            Err(failure) => {
                summary.errors.push(NotificationError {
                    index,
                    error: failure.error.to_string(),
                });
                failure.result
            }
        };
        summary.succeeded += result.succeeded();
        summary.failed += result.failed();
        summary.logs.extend(result.logs);
    }

    Ok(crate::api::ok(summary))
}
