use pushcast_core::config::AndroidConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub android: AndroidConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, LogFormat};

    #[test]
    fn parses_minimal_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [android]
            project_id = "demo-project"
            service_account_key = "/etc/pushcast/key.json"
            "#,
        )
        .expect("config parses");

        assert_eq!(config.android.project_id, "demo-project");
        assert_eq!(config.android.send_timeout_secs, 30);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn parses_log_section() {
        let config: AppConfig = toml::from_str(
            r#"
            [android]
            service_account_key = "key.json"
            send_timeout_secs = 0

            [log]
            level = "debug,pushcast::audit=warn"
            format = "json"
            "#,
        )
        .expect("config parses");

        assert_eq!(config.android.project_id, "");
        assert_eq!(config.android.send_timeout(), None);
        assert_eq!(config.log.format, LogFormat::Json);
    }
}
