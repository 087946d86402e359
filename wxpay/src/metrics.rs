//! Gateway metrics

use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static::lazy_static! {
    /// Round trips by operation and outcome
    pub static ref GATEWAY_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "wxpay_requests_total",
        "Total gateway round trips",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Transport time by operation
    pub static ref GATEWAY_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "wxpay_request_duration_seconds",
        "Gateway round trip duration",
        &["operation"]
    )
    .unwrap();

    /// Callbacks by reply outcome
    pub static ref NOTIFICATIONS_TOTAL: CounterVec = register_counter_vec!(
        "wxpay_notifications_total",
        "Payment notifications handled",
        &["outcome"]
    )
    .unwrap();
}
