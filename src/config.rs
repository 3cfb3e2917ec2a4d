//! Configuration loading.
//!
//! Settings are read from an optional `config/<file>.toml`, then overridden by
//! environment variables prefixed `COSMOS_EXTRACTOR` (double underscore as
//! the separator between prefix and key, e.g.
//! `COSMOS_EXTRACTOR__CALL_TIMEOUT_MS=15000`). Later sources win. This
//! mirrors the env-prefix-overrides-file layering `hyperlane-base::settings`
//! uses, simplified for a single-chain core with no per-agent partials.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Failure handling for heights that exhaust their retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    Strict,
    Skip,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Strict
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Pretty
    }
}

/// All-`Option` mirror of [`Settings`], deserialized directly from the
/// layered `config::Config` before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RawConfig {
    pub grpc_endpoint: Option<String>,
    pub sink_dsn: Option<String>,
    pub start_height: Option<u64>,
    pub stop_height: Option<u64>,
    pub concurrency: Option<u32>,
    pub insecure: Option<bool>,
    pub live: Option<bool>,
    pub max_retries: Option<u32>,
    pub call_timeout_ms: Option<u64>,
    pub failure_policy: Option<FailurePolicy>,
    pub log_format: Option<LogFormat>,
    pub poll_interval_ms_initial: Option<u64>,
    pub cancellation_grace_ms: Option<u64>,
}

/// Validated, strongly typed settings the rest of the core is built on.
#[derive(Debug, Clone)]
pub struct Settings {
    pub grpc_endpoint: String,
    pub sink_dsn: String,
    pub start_height: Option<u64>,
    pub stop_height: Option<u64>,
    pub concurrency: u32,
    pub insecure: bool,
    pub live: bool,
    pub max_retries: u32,
    pub call_timeout: Duration,
    pub failure_policy: FailurePolicy,
    pub log_format: LogFormat,
    pub poll_interval_initial: Duration,
    pub cancellation_grace: Duration,
}

impl RawConfig {
    /// Load from `config/<name>.toml` (if present) layered under environment
    /// variables. `name` defaults to `extractor` when unset.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        } else {
            builder = builder.add_source(
                config::File::with_name("config/extractor").required(false),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("COSMOS_EXTRACTOR")
                .separator("__")
                .try_parsing(true),
        );
        let raw: RawConfig = builder.build()?.try_deserialize()?;
        Ok(raw)
    }

    /// Validates every field independently and accumulates every failure
    /// found, rather than stopping at the first, so a misconfigured
    /// deployment learns everything wrong with it in one run instead of
    /// fixing one key at a time across repeated restarts.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let mut errors: Vec<ConfigError> = Vec::new();

        let grpc_endpoint = self.grpc_endpoint.or_else(|| {
            errors.push(ConfigError::Missing("grpc_endpoint"));
            None
        });
        let sink_dsn = self.sink_dsn.or_else(|| {
            errors.push(ConfigError::Missing("sink_dsn"));
            None
        });

        let concurrency = self.concurrency.unwrap_or(5);
        if !(1..=256).contains(&concurrency) {
            errors.push(ConfigError::Invalid {
                key: "concurrency",
                reason: format!("{concurrency} is outside 1..=256"),
            });
        }

        if !errors.is_empty() {
            let count = errors.len();
            let detail = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            return Err(ConfigError::Multiple { count, detail });
        }

        let grpc_endpoint = grpc_endpoint.expect("checked above");
        let sink_dsn = sink_dsn.expect("checked above");
        let max_retries = self.max_retries.unwrap_or(3);
        let call_timeout_ms = self.call_timeout_ms.unwrap_or(30_000);

        Ok(Settings {
            grpc_endpoint,
            sink_dsn,
            start_height: self.start_height,
            stop_height: self.stop_height,
            concurrency,
            insecure: self.insecure.unwrap_or(false),
            live: self.live.unwrap_or(false),
            max_retries,
            call_timeout: Duration::from_millis(call_timeout_ms),
            failure_policy: self.failure_policy.unwrap_or_default(),
            log_format: self.log_format.unwrap_or_default(),
            poll_interval_initial: Duration::from_millis(
                self.poll_interval_ms_initial.unwrap_or(2000),
            ),
            cancellation_grace: Duration::from_millis(
                self.cancellation_grace_ms.unwrap_or(30_000),
            ),
        })
    }
}

impl Settings {
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        RawConfig::load(config_file)?.validate()
    }
}
