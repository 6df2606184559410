mod handlers;
pub mod router;

use std::borrow::Cow;

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::Error;

pub(crate) fn json_response<T: Serialize>(status: axum::http::StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

pub(crate) fn ok<T: Serialize>(data: T) -> Response {
    json_response(axum::http::StatusCode::OK, StatusResponse::ok_with(data))
}

pub(crate) fn err(status: axum::http::StatusCode, msg: impl Into<Cow<'static, str>>) -> Response {
    json_response(status, StatusResponse::err(msg))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        use axum::http::StatusCode;

        match self {
            Error::Validation(msg) => err(StatusCode::BAD_REQUEST, msg),

            Error::Payload(payload) => err(StatusCode::BAD_REQUEST, payload.to_string()),

            Error::Unauthorized => err(StatusCode::UNAUTHORIZED, "authentication failed"),

            Error::ClientInit(_) => err(
                StatusCode::SERVICE_UNAVAILABLE,
                "push provider is not available",
            ),

            Error::Transport(delivery) => err(StatusCode::BAD_GATEWAY, delivery.message),

            Error::Upstream { message, .. } => err(StatusCode::BAD_GATEWAY, message),

            Error::Internal(msg) => err(StatusCode::INTERNAL_SERVER_ERROR, msg),
        }
    }
}

pub type HttpResult = Result<Response, Error>;

#[derive(Serialize)]
pub(super) struct StatusResponse<T = ()> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Cow<'static, str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> StatusResponse<T> {
    #[inline]
    pub fn ok_with(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }
}

impl StatusResponse {
    #[inline]
    pub fn err(msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
            data: None,
        }
    }
}
