use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static UPSTREAM_CALLS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static UPSTREAM_CALL_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static TOLERATED_FAILURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static AGGREGATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("ebevis_http_requests_total", "Adapter HTTP request count."),
                &["route", "method", "status"],
            )
            .expect("create ebevis_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "ebevis_http_request_duration_seconds",
                    "Adapter HTTP request duration in seconds.",
                )
                .buckets(DURATION_BUCKETS.to_vec()),
                &["route", "method", "outcome"],
            )
            .expect("create ebevis_http_request_duration_seconds"),
        )
    })
}

fn upstream_calls_total() -> &'static IntCounterVec {
    UPSTREAM_CALLS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "ebevis_upstream_calls_total",
                    "Calls made to evidence sources.",
                ),
                &["source", "outcome"],
            )
            .expect("create ebevis_upstream_calls_total"),
        )
    })
}

fn upstream_call_duration_seconds() -> &'static HistogramVec {
    UPSTREAM_CALL_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "ebevis_upstream_call_duration_seconds",
                    "Evidence source call duration in seconds.",
                )
                .buckets(DURATION_BUCKETS.to_vec()),
                &["source"],
            )
            .expect("create ebevis_upstream_call_duration_seconds"),
        )
    })
}

fn tolerated_failures_total() -> &'static IntCounterVec {
    TOLERATED_FAILURES_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "ebevis_tolerated_branch_failures_total",
                    "Failed branches replaced by an empty result.",
                ),
                &["source"],
            )
            .expect("create ebevis_tolerated_branch_failures_total"),
        )
    })
}

fn aggregations_total() -> &'static IntCounterVec {
    AGGREGATIONS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "ebevis_aggregations_total",
                    "Criterion aggregations by outcome.",
                ),
                &["criterion", "outcome"],
            )
            .expect("create ebevis_aggregations_total"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_upstream_call(source: &str, outcome: &str, duration: Duration) {
    upstream_calls_total()
        .with_label_values(&[source, outcome])
        .inc();
    upstream_call_duration_seconds()
        .with_label_values(&[source])
        .observe(duration.as_secs_f64());
}

pub fn inc_tolerated_failure(source: &str) {
    tolerated_failures_total().with_label_values(&[source]).inc();
}

pub fn observe_aggregation(criterion: &str, outcome: &str) {
    aggregations_total()
        .with_label_values(&[criterion, outcome])
        .inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_recorded_series() {
        observe_upstream_call("es_svv", "ok", Duration::from_millis(12));
        inc_tolerated_failure("es_arbt");
        observe_aggregation("BilpleieregisteretEbevis", "ok");

        let (body, content_type) = render().expect("render should succeed");
        let text = String::from_utf8(body).expect("metrics should be utf-8");

        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("ebevis_upstream_calls_total{outcome=\"ok\",source=\"es_svv\"}"));
        assert!(text.contains("ebevis_tolerated_branch_failures_total{source=\"es_arbt\"}"));
        assert!(text.contains("ebevis_aggregations_total"));
    }
}
