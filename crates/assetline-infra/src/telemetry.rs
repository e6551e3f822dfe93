//! Tracing initialization

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,assetline_api=debug,assetline_worker=debug,tower_http=debug";

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `log_format = "json"` switches to JSON lines.
pub fn init_telemetry(log_format: &str, environment: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
    }

    tracing::info!(log_format = %log_format, environment = %environment, "Tracing initialized");
    Ok(())
}
