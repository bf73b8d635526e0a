//! Tracing initialization and the `logger` service.

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LogSettings};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `settings.level`. Safe to call more than once; later
/// calls are no-ops.
pub fn init(settings: &LogSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = match settings.format {
        LogFormat::Pretty  => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json    => builder.json().with_target(false).try_init(),
    };
}

/// Application logger handed out by the service container.
///
/// Tags every event with the service name so logs from several mesh
/// applications can share one sink.
#[derive(Clone, Debug)]
pub struct Logger {
    service: String,
}

impl Logger {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn info(&self, message: &str) {
        info!(service = %self.service, "{message}");
    }

    pub fn warn(&self, message: &str) {
        warn!(service = %self.service, "{message}");
    }

    pub fn error(&self, message: &str) {
        error!(service = %self.service, "{message}");
    }
}
