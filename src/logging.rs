//! Subscriber setup, in the manner of `hyperlane-base`'s trace init: an
//! `EnvFilter` defaulting to `info`, with JSON or ANSI-pretty formatting
//! selected by configuration.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogFormat;

pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            fmt().with_env_filter(filter).json().init();
        }
        LogFormat::Pretty => {
            fmt().with_env_filter(filter).init();
        }
    }
}
