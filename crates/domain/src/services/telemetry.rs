use std::{env, net::SocketAddr};

use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_INSTALLED: OnceCell<()> = OnceCell::new();

/// Shared observability options for binaries.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<String>,
}

impl TelemetryConfig {
    /// Loads telemetry knobs from optional environment variables prefixed with
    /// `<PREFIX>_`, e.g. `MONITOR_LOG_FILTER`. Missing entries fall back to
    /// defaults so the binary does not require extra configuration to boot.
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let upper = prefix.trim().to_ascii_uppercase();
        let log_key = format!("{}_LOG_FILTER", upper);
        let metrics_key = format!("{}_METRICS_ADDRESS", upper);

        let log_filter = env::var(log_key).unwrap_or_else(|_| "info".to_string());
        let metrics_address = env::var(metrics_key).ok().and_then(|value| {
            if value.trim().is_empty() {
                None
            } else {
                Some(value)
            }
        });

        Self {
            log_filter,
            metrics_address,
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<&str> {
        self.metrics_address.as_deref()
    }
}

/// Centralized helper to wire up tracing + metrics exporters once per process.
/// Metrics are only served when a listener address is configured.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    install_tracing(config)?;
    install_metrics(config)
}

fn install_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
    }

    Ok(())
}

/// With a listener address the exporter serves `/metrics` itself, which
/// needs a running tokio runtime; without one the recorder is only installed.
fn install_metrics(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    METRICS_INSTALLED
        .get_or_try_init(|| {
            let builder = PrometheusBuilder::new();
            let installed = match config.metrics_address() {
                Some(addr) => {
                    let socket: SocketAddr =
                        addr.parse().map_err(|err: std::net::AddrParseError| {
                            TelemetryError::InvalidMetricsAddress(addr.to_string(), err.to_string())
                        })?;
                    builder.with_http_listener(socket).install()
                }
                None => builder.install_recorder().map(|_| ()),
            };
            installed.map_err(|err| TelemetryError::Metrics(err.to_string()))
        })
        .map(|_| ())
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn telemetry_config_uses_defaults() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("WALLET_LEDGER_SKIP_DOTENV", "1");
        env::remove_var("MONITOR_TEST_LOG_FILTER");
        env::remove_var("MONITOR_TEST_METRICS_ADDRESS");

        let cfg = TelemetryConfig::from_env("monitor_test");
        assert_eq!(cfg.log_filter(), "info");
        assert_eq!(cfg.metrics_address(), None);
    }

    #[test]
    fn telemetry_config_reads_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("WALLET_LEDGER_SKIP_DOTENV", "1");
        env::set_var("MONITOR_TEST_LOG_FILTER", "debug");
        env::set_var("MONITOR_TEST_METRICS_ADDRESS", "127.0.0.1:9898");
        let cfg = TelemetryConfig::from_env("MONITOR_TEST");
        assert_eq!(cfg.log_filter(), "debug");
        assert_eq!(cfg.metrics_address(), Some("127.0.0.1:9898"));
        env::remove_var("MONITOR_TEST_LOG_FILTER");
        env::remove_var("MONITOR_TEST_METRICS_ADDRESS");
    }

    #[test]
    fn empty_metrics_address_is_treated_as_none() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("WALLET_LEDGER_SKIP_DOTENV", "1");
        env::set_var("MONITOR_TEST_METRICS_ADDRESS", "  ");
        let cfg = TelemetryConfig::from_env("MONITOR_TEST");
        assert_eq!(cfg.metrics_address(), None);
        env::remove_var("MONITOR_TEST_METRICS_ADDRESS");
    }

    #[test]
    fn init_telemetry_is_idempotent() {
        let cfg = TelemetryConfig {
            log_filter: "warn".to_string(),
            metrics_address: None,
        };
        init_telemetry(&cfg).unwrap();
        init_telemetry(&cfg).unwrap();
        assert!(METRICS_INSTALLED.get().is_some());
    }
}
