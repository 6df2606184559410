use std::{path::PathBuf, time::Duration};

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug, Clone)]
#[command(name = "pushcast", version, about = "Android push dispatch service")]
pub struct CoreArgs {
    /// HTTP bind address.
    #[arg(
        env = "PUSHCAST_HTTP_ADDR",
        short = 'a',
        long = "http-addr",
        default_value = "127.0.0.1:8088"
    )]
    pub http_addr: String,

    /// Optional Token for API authentication.
    #[arg(env = "PUSHCAST_TOKEN", short = 't', long = "token")]
    pub token: Option<String>,

    /// Max notifications accepted in one push request.
    #[arg(env = "PUSHCAST_MAX_NOTIFICATIONS", long = "max-notifications", default_value = "100")]
    pub max_notifications: usize,
}

/// Delivery-service account settings for the Android platform.
#[derive(Debug, Clone, Deserialize)]
pub struct AndroidConfig {
    /// Firebase project identifier. Falls back to the key file's project.
    #[serde(default)]
    pub project_id: String,
    /// Path to the service-account JSON key, read at first client creation.
    pub service_account_key: PathBuf,
    /// Upper bound for a single multicast send, in seconds. `0` disables it.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl AndroidConfig {
    pub fn send_timeout(&self) -> Option<Duration> {
        if self.send_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.send_timeout_secs))
        }
    }
}

fn default_send_timeout_secs() -> u64 {
    30
}
