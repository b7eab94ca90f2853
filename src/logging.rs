//! Logging setup for the review pipeline

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the console subscriber.
///
/// `RUST_LOG` wins over the configured level when it is set. Calling this
/// twice is harmless; the second call is ignored.
pub fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},review_insights={}", level, level)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}

/// Span handed to a component at construction; its events are emitted inside it.
pub fn component_span(component: &'static str) -> Span {
    tracing::info_span!("component", name = component)
}
