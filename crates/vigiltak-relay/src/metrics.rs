//! Prometheus metrics export.
//!
//! Counters are recorded with the `metrics` macros at the call sites;
//! this module wires up the exporter and registers descriptions so the
//! scrape endpoint is self-documenting.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing::info;
use vigiltak_core::MetricsConfig;

/// Installs the Prometheus recorder with its scrape listener.
pub fn install(config: &MetricsConfig) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(config.bind_address)
        .install()?;
    describe();
    info!(bind_address = %config.bind_address, "metrics exporter listening");
    Ok(())
}

fn describe() {
    describe_counter!(
        "vigiltak_events_received_total",
        "Inbound events decoded and stored as tracks"
    );
    describe_counter!(
        "vigiltak_events_sent_total",
        "Events sent out over any link"
    );
    describe_counter!(
        "vigiltak_decode_failures_total",
        "Inbound buffers that failed to decode in any wire format"
    );
    describe_counter!(
        "vigiltak_invalid_events_total",
        "Decoded events dropped by semantic validation"
    );
    describe_counter!(
        "vigiltak_sentinel_replies_total",
        "Canned replies produced for self-test probes"
    );
    describe_counter!("vigiltak_probes_sent_total", "Beacon probes enqueued");
    describe_counter!(
        "vigiltak_send_errors_total",
        "Send attempts that failed or timed out"
    );
    describe_counter!(
        "vigiltak_transcode_fallbacks_total",
        "Events sent as XML because binary encoding failed"
    );
    describe_counter!(
        "vigiltak_assessments_total",
        "Imagery assessments turned into reports"
    );
    describe_counter!(
        "vigiltak_assessment_failures_total",
        "Imagery files that produced no report"
    );
    describe_gauge!("vigiltak_tracks", "Live tracks in the store");
}
