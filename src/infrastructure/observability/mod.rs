use crate::config::Config;
use metrics::Unit;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Used when `RUST_LOG` is unset. Statement logs from sqlx stay at warn.
pub const DEFAULT_LOG_FILTER: &str = "livedesk=debug,tower_http=debug,sqlx=warn";

const SWEEP_SECONDS: &str = "livedesk_escalation_sweep_seconds";

/// A sweep is bounded by the per-org budget, so the top bucket sits just
/// above a typical budget.
const SWEEP_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0];

/// Flushes pending spans when dropped at the end of `main`.
pub struct ObservabilityGuard;

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        global::shutdown_tracer_provider();
    }
}

pub fn init(config: &Config) -> Result<ObservabilityGuard, Box<dyn std::error::Error>> {
    init_tracing(config)?;
    init_metrics(config)?;
    Ok(ObservabilityGuard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_target(true);

    // OTLP export only when an endpoint is configured
    if let Some(endpoint) = &config.otel_exporter_endpoint {
        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint);

        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", config.service_name.clone()),
            ])))
            .install_batch(runtime::Tokio)?;

        Registry::default()
            .with(env_filter())
            .with(fmt_layer)
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
        tracing::info!("Exporting spans to {}", endpoint);
    } else {
        Registry::default().with(env_filter()).with(fmt_layer).init();
    }

    Ok(())
}

/// Exporter for the routing and escalation metrics. The sweep duration is a
/// histogram; everything else is a counter.
fn prometheus_builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(SWEEP_SECONDS.to_string()), SWEEP_BUCKETS)
}

/// HELP text for every metric the services emit.
fn describe_metrics() {
    metrics::describe_counter!(
        "livedesk_assignments_total",
        Unit::Count,
        "Conversations assigned to an agent by routing"
    );
    metrics::describe_counter!(
        "livedesk_assignment_lost_races_total",
        Unit::Count,
        "Conditional assignments that lost to a concurrent writer"
    );
    metrics::describe_counter!(
        "livedesk_conversations_queued_total",
        Unit::Count,
        "Conversations queued because no agent could take them"
    );
    metrics::describe_counter!(
        "livedesk_presence_transitions_total",
        Unit::Count,
        "Agent online status changes"
    );
    metrics::describe_counter!(
        "livedesk_escalations_fired_total",
        Unit::Count,
        "Escalation actions that took effect"
    );
    metrics::describe_counter!(
        "livedesk_escalations_skipped_total",
        Unit::Count,
        "Escalation matches skipped because the pair was already marked"
    );
    metrics::describe_histogram!(
        SWEEP_SECONDS,
        Unit::Seconds,
        "Wall time of one escalation sweep over all orgs"
    );
}

fn init_metrics(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    prometheus_builder()?
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()?;
    describe_metrics();

    tracing::info!(
        "Metrics exporter (Prometheus) started on port {}",
        config.metrics_port
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_duration_renders_as_histogram() {
        let recorder = prometheus_builder().unwrap().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            metrics::histogram!(SWEEP_SECONDS).record(0.3);
            metrics::counter!("livedesk_escalations_fired_total").increment(2);
        });

        let rendered = handle.render();
        assert!(rendered.contains("livedesk_escalation_sweep_seconds_bucket{le=\"0.5\"} 1"));
        assert!(rendered.contains("livedesk_escalation_sweep_seconds_bucket{le=\"0.1\"} 0"));
        assert!(rendered.contains("# HELP livedesk_escalations_fired_total"));
        assert!(rendered.contains("livedesk_escalations_fired_total 2"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(DEFAULT_LOG_FILTER.parse::<EnvFilter>().is_ok());
    }
}
