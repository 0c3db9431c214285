use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref ALERTS_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "remediator_alerts_received_total",
        "Total number of alerts parsed from webhook payloads.",
        &["status"]
    )
    .unwrap();
    pub static ref MALFORMED_PAYLOADS_TOTAL: IntCounter = register_int_counter!(
        "remediator_malformed_payloads_total",
        "Total number of webhook payloads rejected as malformed."
    )
    .unwrap();
    pub static ref DISPATCH_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "remediator_dispatch_decisions_total",
        "Dispatcher decisions by outcome (accepted, cooldown, in-flight, unmapped).",
        &["decision"]
    )
    .unwrap();
    pub static ref REMEDIATIONS_COMPLETED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "remediator_remediations_completed_total",
        "Completed remediation tasks by outcome (succeeded, executor, timeout).",
        &["outcome"]
    )
    .unwrap();
    pub static ref REMEDIATIONS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "remediator_remediations_in_flight",
        "Remediation tasks currently running."
    )
    .unwrap();
    pub static ref REMEDIATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "remediator_remediation_duration_seconds",
        "Wall-clock time spent waiting on the executor.",
        &["action"],
        vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    )
    .unwrap();
    pub static ref RESOLUTIONS_CONFIRMED_TOTAL: IntCounter = register_int_counter!(
        "remediator_resolutions_confirmed_total",
        "Resolved notifications that followed a successful remediation."
    )
    .unwrap();
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathered_metrics_include_registered_collectors() {
        ALERTS_RECEIVED_TOTAL.with_label_values(&["firing"]).inc();
        let text = gather_metrics();
        assert!(text.contains("remediator_alerts_received_total"));
    }
}
