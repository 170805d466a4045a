use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const APP_NAME: &str = "clip-harvest";

/// Installs the global subscriber: `RUST_LOG` filtering (default `info`),
/// bunyan JSON on stderr and sentry breadcrumbs/events.
pub fn init_tracing_subscriber() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let formatting_layer = BunyanFormattingLayer::new(APP_NAME.into(), std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
        .with(sentry_tracing::layer())
        .try_init()?;

    Ok(())
}
