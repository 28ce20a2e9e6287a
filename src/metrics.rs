use tracing::trace;

// Each helper emits a trace event and records into the global `metrics`
// recorder; `/metrics` renders whatever the installed Prometheus recorder
// holds.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "enrich.metrics",
        route = route,
        "requests_total_inc"
    );
    ::metrics::counter!("enrich_requests_total", "route" => route).increment(1);
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "enrich.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
    ::metrics::histogram!("enrich_stage_elapsed_ms", "stage" => stage).record(elapsed_ms as f64);
}

pub fn stage_degraded(stage: &'static str, cause: &str) {
    trace!(
        target = "enrich.metrics",
        stage = stage,
        cause = cause,
        "stage_degraded_inc"
    );
    ::metrics::counter!(
        "enrich_stage_degraded_total",
        "stage" => stage,
        "cause" => cause.to_string()
    )
    .increment(1);
}
