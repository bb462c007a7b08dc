use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Initialize structured logging.
///
/// JSON output with span context so referral operations can be correlated
/// across the coordinator and its collaborators.
pub fn init_telemetry() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Clearwater Loop telemetry initialized with structured logging");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create a span with common referral coordination attributes
pub fn create_referral_span(
    operation: &str,
    referral_id: Option<&str>,
    correlation_id: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "referral_coordination",
        operation = operation,
        referral.id = referral_id,
        correlation.id = correlation_id,
    )
}
