use tracing::trace;

// Trace-level counters; the Prometheus recorder only renders what is installed.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "shelfshot.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "shelfshot.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn candidates_returned(count: usize) {
    trace!(
        target = "shelfshot.metrics",
        count = count as u64,
        "image_candidates_returned"
    );
}
