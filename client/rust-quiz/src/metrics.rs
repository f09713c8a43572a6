use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

use crate::error::QuizError;

lazy_static! {
    // Upstream API Metrics
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_api_requests_total",
        "Total number of requests sent to the quiz API",
        &["endpoint", "status"]
    )
    .unwrap();

    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "quiz_api_request_duration_seconds",
        "Quiz API request duration in seconds",
        &["endpoint"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Session Metrics
    pub static ref SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_sessions_total",
        "Quiz session lifecycle events",
        &["outcome"]
    )
    .unwrap();

    pub static ref ANSWERS_RECORDED_TOTAL: IntCounter = register_int_counter!(
        "quiz_answers_recorded_total",
        "Total number of answers confirmed by the user"
    )
    .unwrap();

    // Local persistence
    pub static ref PROGRESS_WRITES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_progress_writes_total",
        "Snapshot writes to the progress store",
        &["status"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track an upstream API call with metrics
pub async fn track_api_request<F, T>(endpoint: &str, future: F) -> crate::error::Result<T>
where
    F: std::future::Future<Output = crate::error::Result<T>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = match &result {
        Ok(_) => "success".to_string(),
        Err(QuizError::Api { status, .. }) | Err(QuizError::Unauthorized { status }) => {
            status.to_string()
        }
        Err(QuizError::RateLimited { .. }) => "rate_limited".to_string(),
        Err(_) => "error".to_string(),
    };

    API_REQUESTS_TOTAL
        .with_label_values(&[endpoint, status.as_str()])
        .inc();

    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint])
        .observe(duration);

    result
}

/// Record a session lifecycle event (fresh, resumed, cancelled, completed, paused)
pub fn record_session_event(outcome: &str) {
    SESSIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a snapshot write
pub fn record_progress_write(success: bool) {
    let status = if success { "success" } else { "error" };
    PROGRESS_WRITES_TOTAL.with_label_values(&[status]).inc();
}
