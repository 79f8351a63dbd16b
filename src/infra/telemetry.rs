use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Crates whose routine output drowns out sync progress; `RUST_LOG` can still
/// raise them.
const QUIET_TARGETS: [&str; 3] = ["sqlx::query=warn", "hyper_util=warn", "libsql=warn"];

/// Install the global subscriber. Logs go to stderr so command reports printed
/// on stdout stay machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(build_filter(logging, std::env::var("RUST_LOG").ok().as_deref())?)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber: {err}")))
}

/// Configured level, the quiet defaults, then any `RUST_LOG` directives on top.
fn build_filter(logging: &LoggingSettings, env: Option<&str>) -> Result<EnvFilter, InfraError> {
    let mut filter = EnvFilter::default().add_directive(logging.level.into());
    let overrides = env.unwrap_or_default();

    for directive in QUIET_TARGETS.into_iter().chain(overrides.split(',')) {
        let directive = directive.trim();
        if directive.is_empty() {
            continue;
        }
        let parsed = directive.parse().map_err(|err| {
            InfraError::telemetry(format!("invalid log directive `{directive}`: {err}"))
        })?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "inkbridge_sync_processed_total",
            Unit::Count,
            "Files imported or queued changes pushed, by direction."
        );
        describe_counter!(
            "inkbridge_sync_errors_total",
            Unit::Count,
            "Failed imports and pushes, by direction."
        );
        describe_counter!(
            "inkbridge_sync_failed_permanently_total",
            Unit::Count,
            "Queued changes that exhausted their retries."
        );
        describe_counter!(
            "inkbridge_dedupe_removed_total",
            Unit::Count,
            "Posts removed by duplicate merges."
        );
    });
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    fn settings() -> LoggingSettings {
        LoggingSettings {
            level: LevelFilter::DEBUG,
            format: LogFormat::Compact,
        }
    }

    #[test]
    fn filter_quiets_query_logs_unless_overridden() {
        let filter = build_filter(&settings(), None).expect("filter").to_string();
        assert!(filter.contains("sqlx::query=warn"));
        assert!(filter.contains("debug"));

        let filter = build_filter(&settings(), Some("sqlx::query=trace, inkbridge::sync=info"))
            .expect("filter")
            .to_string();
        assert!(filter.contains("sqlx::query=trace"));
        assert!(filter.contains("inkbridge::sync=info"));
    }

    #[test]
    fn filter_rejects_malformed_directives() {
        let err = build_filter(&settings(), Some("inkbridge=loud")).expect_err("bad level");
        assert!(err.to_string().contains("inkbridge=loud"));
    }
}
