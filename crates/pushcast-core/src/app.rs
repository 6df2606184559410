use std::sync::Arc;

use axum::Router;

use crate::{
    api::router::build_router, config::AndroidConfig, config::CoreArgs, dispatch::Dispatcher,
    status::StatStorage,
};

#[derive(Clone)]
pub(crate) enum AuthMode {
    Disabled,
    SharedToken(Arc<str>),
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub stats: Arc<StatStorage>,
    pub android: Arc<AndroidConfig>,
    pub auth: AuthMode,
    pub max_notifications: usize,
}

pub fn build_app(
    args: &CoreArgs,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<StatStorage>,
    android: AndroidConfig,
) -> Router {
    let auth = match args.token.as_deref().map(str::trim) {
        None | Some("") => AuthMode::Disabled,
        Some(token) => AuthMode::SharedToken(Arc::from(token)),
    };

    let state = AppState {
        dispatcher,
        stats,
        android: Arc::new(android),
        auth,
        max_notifications: args.max_notifications,
    };

    build_router(state)
}
