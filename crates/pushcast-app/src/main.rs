use std::{error::Error, net::SocketAddr, sync::Arc};

use axum::Router;
use clap::Parser;
use tokio::{net::TcpListener, signal};

use pushcast_core::{
    app::build_app,
    audit::TracingAuditLog,
    config::CoreArgs,
    dispatch::{ClientProvider, Dispatcher},
    status::StatStorage,
    validate::RequestValidator,
};

use crate::config::AppConfig;
use crate::providers::fcm::ServiceAccountFactory;

mod config;
mod providers;
mod telemetry;

#[derive(Parser, Debug, Clone)]
#[command(name = "pushcast", version, about = "Android push dispatch service")]
struct Args {
    #[command(flatten)]
    core: CoreArgs,

    /// Path to the config file with FCM credentials.
    #[arg(
        env = "PUSHCAST_CONFIG",
        long = "config",
        default_value = "./pushcast.config.toml"
    )]
    config_path: String,
}

impl Args {
    fn load_config(&self) -> Result<AppConfig, Box<dyn Error>> {
        let raw = std::fs::read_to_string(&self.config_path).map_err(|err| {
            std::io::Error::new(
                err.kind(),
                format!("failed to read config file {}: {err}", self.config_path),
            )
        })?;
        let config: AppConfig = toml::from_str(&raw).map_err(|err| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("failed to parse config file {}: {err}", self.config_path),
            )
        })?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = args.load_config()?;
    telemetry::init_tracing(&config.log);

    let clients = Arc::new(ClientProvider::new(Arc::new(ServiceAccountFactory)));
    // Create the client up front so credential problems stop startup.
    clients.get(&config.android).await?;

    let stats = Arc::new(StatStorage::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(RequestValidator),
        clients,
        stats.clone(),
        Arc::new(TracingAuditLog::new()),
    ));

    let app: Router = build_app(&args.core, dispatcher, stats, config.android);
    let addr: SocketAddr = args.core.http_addr.parse()?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "pushcast listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
