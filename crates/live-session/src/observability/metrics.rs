//! Metric recording helpers.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ls_` prefix for the live session coordinator
//! - `_total` suffix for counters

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used to render
/// the exposition text.
///
/// Must be called before any metrics are recorded. Join latency buckets
/// cover a relay round trip up to the default connect deadline.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("ls_join".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set join duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Peer Link Metrics
// ============================================================================

/// Record a peer link entering the roster.
///
/// Metric: `ls_peer_links_created_total`
/// Labels: `role` (initiator, responder)
pub fn record_link_created(role: &'static str) {
    counter!("ls_peer_links_created_total", "role" => role).increment(1);
}

/// Record a peer link leaving the roster.
///
/// Metric: `ls_peer_links_removed_total`
/// Labels: `reason` (left, negotiation_timeout, transport_failed, session_closed)
pub fn record_link_removed(reason: &'static str) {
    counter!("ls_peer_links_removed_total", "reason" => reason).increment(1);
}

/// Set the number of links currently held in the roster.
///
/// Metric: `ls_peer_links_active`
pub fn set_links_active(count: usize) {
    // usize to f64 conversion is safe for realistic roster sizes
    #[allow(clippy::cast_precision_loss)]
    gauge!("ls_peer_links_active").set(count as f64);
}

/// Record a link that failed to construct or negotiate.
///
/// Metric: `ls_negotiation_failures_total`
/// Labels: `reason` (construction, rejected, transport, timeout)
pub fn record_negotiation_failure(reason: &'static str) {
    counter!("ls_negotiation_failures_total", "reason" => reason).increment(1);
}

// ============================================================================
// Negotiation Payload Metrics
// ============================================================================

/// Record a payload held back because its link does not exist yet.
///
/// Metric: `ls_payloads_buffered_total`
pub fn record_payload_buffered() {
    counter!("ls_payloads_buffered_total").increment(1);
}

/// Record a payload that was discarded.
///
/// Metric: `ls_payloads_dropped_total`
/// Labels: `reason` (departed, closed_link, buffer_full, expired)
pub fn record_payload_dropped(reason: &'static str) {
    counter!("ls_payloads_dropped_total", "reason" => reason).increment(1);
}

// ============================================================================
// Session & Relay Metrics
// ============================================================================

/// Record how long a join took, from lookup to relay-assigned id.
///
/// Metric: `ls_join_duration_seconds`
/// Labels: `status` (success, error)
pub fn record_join(status: &'static str, duration: Duration) {
    histogram!("ls_join_duration_seconds", "status" => status).record(duration.as_secs_f64());
}

/// Record a session teardown.
///
/// Metric: `ls_sessions_ended_total`
/// Labels: `reason` (left, terminated, relay_lost)
pub fn record_session_ended(reason: &'static str) {
    counter!("ls_sessions_ended_total", "reason" => reason).increment(1);
}

/// Record the local stream being released.
///
/// Metric: `ls_media_releases_total`
pub fn record_media_released() {
    counter!("ls_media_releases_total").increment(1);
}

/// Record a relay connection closed because its frame queue was full.
///
/// Metric: `ls_relay_lagging_evictions_total`
pub fn record_relay_lagging_eviction() {
    counter!("ls_relay_lagging_evictions_total").increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(
        snapshot: &[(
            metrics_util::CompositeKey,
            Option<metrics::Unit>,
            Option<metrics::SharedString>,
            DebugValue,
        )],
        name: &str,
    ) -> u64 {
        snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(v) => *v,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_link_counters_are_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_link_created("initiator");
            record_link_created("initiator");
            record_link_created("responder");
            record_link_removed("left");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(counter_value(&snapshot, "ls_peer_links_created_total"), 3);
        assert_eq!(counter_value(&snapshot, "ls_peer_links_removed_total"), 1);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // The global no-op recorder is used when none is installed
        set_links_active(0);
        set_links_active(12);
        record_negotiation_failure("timeout");
        record_payload_buffered();
        record_payload_dropped("departed");
        record_session_ended("left");
        record_relay_lagging_eviction();
        record_join("success", Duration::from_millis(40));
    }

    #[test]
    fn test_join_histogram_is_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_join("success", Duration::from_millis(120));
            record_join("error", Duration::from_millis(5));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let samples: usize = snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == "ls_join_duration_seconds")
            .map(|(_, _, _, value)| match value {
                DebugValue::Histogram(v) => v.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(samples, 2);
    }
}
