use axum::extract::State;

use crate::{api::HttpResult, app::AppState};

pub(crate) async fn android_stat(State(state): State<AppState>) -> HttpResult {
    Ok(crate::api::ok(state.stats.snapshot()))
}
