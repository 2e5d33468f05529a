use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

pub const ENV_PREFIX: &str = "BMCFLEET";

/// Engine tuning knobs.
///
/// Loaded from an optional `bmcfleet` config file, overridden by `BMCFLEET_*`
/// environment variables; the CLI layers its flags on top of the result.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum attempts per target, including the first one.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,
    /// TCP/TLS connect deadline for one endpoint request.
    pub connect_timeout_secs: u64,
    /// Deadline for one HTTP request/response exchange.
    pub request_timeout_secs: u64,
    /// Overall deadline for one target, spanning all attempts and backoffs.
    pub target_timeout_secs: u64,
    /// Concurrency ceiling for in-flight target actions.
    pub max_concurrency: usize,
    pub monitor_interval_secs: u64,
    /// Accept self-signed BMC certificates.
    pub tls_insecure_skip_verify: bool,
    /// Talk plain HTTP to endpoints instead of HTTPS (lab/mock use only).
    pub allow_insecure_http: bool,
    pub serve_metrics: bool,
    pub metrics_host: String,
    pub metrics_port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            target_timeout_secs: default_target_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            monitor_interval_secs: default_monitor_interval_secs(),
            tls_insecure_skip_verify: false,
            allow_insecure_http: false,
            serve_metrics: false,
            metrics_host: "127.0.0.1".into(),
            metrics_port: 9294,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_retry_backoff_max_ms() -> u64 {
    10_000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_target_timeout_secs() -> u64 {
    60
}

fn default_max_concurrency() -> usize {
    10
}

fn default_monitor_interval_secs() -> u64 {
    900
}

// (ENV_NAME, config_key)
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("BMCFLEET_MAX_ATTEMPTS", "max_attempts"),
    ("BMCFLEET_RETRY_BACKOFF_MS", "retry_backoff_ms"),
    ("BMCFLEET_RETRY_BACKOFF_MAX_MS", "retry_backoff_max_ms"),
    ("BMCFLEET_CONNECT_TIMEOUT_SECS", "connect_timeout_secs"),
    ("BMCFLEET_REQUEST_TIMEOUT_SECS", "request_timeout_secs"),
    ("BMCFLEET_TARGET_TIMEOUT_SECS", "target_timeout_secs"),
    ("BMCFLEET_MAX_CONCURRENCY", "max_concurrency"),
    ("BMCFLEET_MONITOR_INTERVAL_SECS", "monitor_interval_secs"),
    (
        "BMCFLEET_TLS_INSECURE_SKIP_VERIFY",
        "tls_insecure_skip_verify",
    ),
    ("BMCFLEET_ALLOW_INSECURE_HTTP", "allow_insecure_http"),
    ("BMCFLEET_SERVE_METRICS", "serve_metrics"),
    ("BMCFLEET_METRICS_HOST", "metrics_host"),
    ("BMCFLEET_METRICS_PORT", "metrics_port"),
];

pub fn load() -> anyhow::Result<EngineConfig> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("bmcfleet").required(false))
        .set_default("max_attempts", default_max_attempts())?
        .set_default("retry_backoff_ms", default_retry_backoff_ms())?
        .set_default("retry_backoff_max_ms", default_retry_backoff_max_ms())?
        .set_default("connect_timeout_secs", default_connect_timeout_secs())?
        .set_default("request_timeout_secs", default_request_timeout_secs())?
        .set_default("target_timeout_secs", default_target_timeout_secs())?
        .set_default("max_concurrency", default_max_concurrency() as u64)?
        .set_default("monitor_interval_secs", default_monitor_interval_secs())?
        .set_default("tls_insecure_skip_verify", false)?
        .set_default("allow_insecure_http", false)?
        .set_default("serve_metrics", false)?
        .set_default("metrics_host", "127.0.0.1")?
        .set_default("metrics_port", 9294)?;

    for (env_key, cfg_key) in ENV_OVERRIDES {
        if let Ok(value) = env::var(env_key) {
            builder = builder.set_override(*cfg_key, value)?;
        }
    }

    let cfg: EngineConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

impl EngineConfig {
    /// Reject engine-level misconfiguration before any dispatch begins.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be > 0");
        }
        if self.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be > 0");
        }
        if self.retry_backoff_ms == 0 {
            anyhow::bail!("retry_backoff_ms must be > 0");
        }
        if self.retry_backoff_max_ms < self.retry_backoff_ms {
            anyhow::bail!("retry_backoff_max_ms must be >= retry_backoff_ms");
        }
        if self.target_timeout_secs == 0 {
            anyhow::bail!("target_timeout_secs must be > 0");
        }
        if self.monitor_interval_secs == 0 {
            anyhow::bail!("monitor_interval_secs must be > 0");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.retry_backoff_ms),
            backoff_max: Duration::from_millis(self.retry_backoff_max_ms.max(self.retry_backoff_ms)),
        }
    }

    pub fn target_timeout(&self) -> Duration {
        Duration::from_secs(self.target_timeout_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}
