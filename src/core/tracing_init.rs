use crate::core::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Store events go to stderr so a host's stdout stays its own
fn fmt_layer(config: &LoggingConfig) -> BoxedLayer {
    if config.console || config.format == "console" {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .boxed()
    }
}

/// Installs the global subscriber for a host application.
/// `RUST_LOG` wins over the configured level. Fails if a subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(fmt_layer(config))
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(())
}
