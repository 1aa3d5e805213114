use metrics::{Unit, counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Route segment the Prometheus scrape endpoint is mounted under.
pub const METRICS_ROUTE: &str = "metrics";

pub const EDGESUB_SUBPROCESS_LAUNCHES_TOTAL: &str = "edgesub_subprocess_launches_total";
pub const EDGESUB_DISCOVERY_ATTEMPTS_TOTAL: &str = "edgesub_discovery_attempts_total";
pub const EDGESUB_SUBSCRIPTION_READY: &str = "edgesub_subscription_ready";
pub const EDGESUB_PUBLISH_TOTAL: &str = "edgesub_publish_total";
pub const EDGESUB_SUBSCRIPTION_REQUESTS_TOTAL: &str = "edgesub_subscription_requests_total";

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder once and return its render handle.
pub fn install_recorder() -> Result<PrometheusHandle, String> {
    PROMETHEUS_HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))?;
            describe_metrics();
            Ok(handle)
        })
        .cloned()
}

fn describe_metrics() {
    describe_counter!(
        EDGESUB_SUBPROCESS_LAUNCHES_TOTAL,
        Unit::Count,
        "Subprocess launch attempts by process and outcome."
    );
    describe_counter!(
        EDGESUB_DISCOVERY_ATTEMPTS_TOTAL,
        Unit::Count,
        "Tunnel hostname discovery polls by outcome."
    );
    describe_gauge!(
        EDGESUB_SUBSCRIPTION_READY,
        "1 once the subscription blob has been generated, 0 before."
    );
    describe_counter!(
        EDGESUB_PUBLISH_TOTAL,
        Unit::Count,
        "Best-effort outbound notifications by target and outcome."
    );
    describe_counter!(
        EDGESUB_SUBSCRIPTION_REQUESTS_TOTAL,
        Unit::Count,
        "Requests to the subscription route by response status."
    );
}

fn outcome_label(ok: bool) -> &'static str {
    if ok { "success" } else { "failure" }
}

pub fn increment_launch_total(process: &str, started: bool) {
    counter!(
        EDGESUB_SUBPROCESS_LAUNCHES_TOTAL,
        "process" => process.to_string(),
        "outcome" => outcome_label(started)
    )
    .increment(1);
}

pub fn increment_discovery_attempt(outcome: &'static str) {
    counter!(EDGESUB_DISCOVERY_ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn set_subscription_ready(ready: bool) {
    gauge!(EDGESUB_SUBSCRIPTION_READY).set(if ready { 1.0 } else { 0.0 });
}

pub fn increment_publish_total(target: &'static str, ok: bool) {
    counter!(
        EDGESUB_PUBLISH_TOTAL,
        "target" => target,
        "outcome" => outcome_label(ok)
    )
    .increment(1);
}

pub fn increment_subscription_requests(status: u16) {
    counter!(
        EDGESUB_SUBSCRIPTION_REQUESTS_TOTAL,
        "status" => status.to_string()
    )
    .increment(1);
}
