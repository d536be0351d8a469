// Metrics module for observability
// Counters for admission decisions, cache effectiveness and event fan-out

use metrics::{counter, describe_counter};

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    describe_counter!(
        "admission_decisions_total",
        "Admission pipeline decisions by outcome"
    );

    describe_counter!("cache_hits_total", "Total number of cache hits");
    describe_counter!("cache_misses_total", "Total number of cache misses");

    describe_counter!(
        "events_published_total",
        "Total number of events published to the store"
    );
    describe_counter!(
        "events_delivered_total",
        "Total number of events delivered to live subscribers"
    );

    tracing::debug!("Metrics descriptions registered");
}

/// Record an admission decision
/// Outcomes: admitted, unauthorized, rate_limited, quota_exceeded,
/// store_unavailable, internal
pub fn record_admission(outcome: &str) {
    counter!("admission_decisions_total", "outcome" => outcome.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_recordable_without_a_recorder() {
        // With no global recorder installed these are no-ops; they must
        // not panic.
        init_metrics();
        record_admission("admitted");
        record_admission("rate_limited");
    }
}
