use std::time::Instant;

use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    middleware::{Next, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post},
};
use subtle::ConstantTimeEq;

use crate::{
    api::handlers::{push::push_notifications, stat::android_stat},
    api::{Error, HttpResult},
    app::{AppState, AuthMode},
};

const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/push", post(push_notifications))
        .route("/api/stat/android", get(android_stat))
        .layer(from_fn_with_state(state.clone(), middleware))
        .route("/healthz", get(async || "ok"))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
        .fallback(async || (StatusCode::NOT_FOUND, "404 Not Found").into_response())
}

fn extract_bearer_token(req: &Request) -> Result<&str, Error> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(Error::Unauthorized)?;

    let raw = header.to_str().map_err(|_| Error::Unauthorized)?;
    let mut it = raw.split_whitespace();

    let scheme = it.next().unwrap_or("");
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(Error::Unauthorized);
    }

    let token = it.next().ok_or(Error::Unauthorized)?;

    // Reject extra segments after the token.
    if it.next().is_some() {
        return Err(Error::Unauthorized);
    }

    const MAX_TOKEN_LEN: usize = 4096;
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(Error::Unauthorized);
    }

    Ok(token)
}

fn constant_time_equals(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

async fn middleware(State(state): State<AppState>, req: Request, next: Next) -> HttpResult {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    if let AuthMode::SharedToken(token) = &state.auth {
        let authorized = extract_bearer_token(&req)
            .map(|req_token| constant_time_equals(req_token, token))
            .unwrap_or(false);
        if !authorized {
            let resp = Error::Unauthorized.into_response();
            log_response(&method, &uri, resp.status(), start);
            return Ok(resp);
        }
    }

    let resp = next.run(req).await;
    log_response(&method, &uri, resp.status(), start);
    Ok(resp)
}

fn log_response(
    method: &axum::http::Method,
    uri: &axum::http::Uri,
    status: StatusCode,
    start: Instant,
) {
    let duration_ms = start.elapsed().as_millis() as u64;
    if status.is_server_error() {
        tracing::warn!(%method, %uri, status = status.as_u16(), duration_ms, "request failed");
    } else {
        tracing::info!(%method, %uri, status = status.as_u16(), duration_ms, "request handled");
    }
}
