use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::AnalysisError;

#[derive(Default)]
pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,
    model_calls: AtomicUsize,

    // Failures by kind
    validation_errors: AtomicUsize,
    not_found_errors: AtomicUsize,
    upstream_errors: AtomicUsize,
    invalid_replies: AtomicUsize,

    // Timing (in microseconds)
    total_analyze_time_us: AtomicU64,
    total_model_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, duration: Duration, outcome: Result<(), &AnalysisError>) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_analyze_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        let counter = match outcome {
            Ok(()) => &self.successful_requests,
            Err(e) => {
                self.failed_requests.fetch_add(1, Ordering::Relaxed);
                match e {
                    AnalysisError::Validation(_) => &self.validation_errors,
                    AnalysisError::NotFound(_) => &self.not_found_errors,
                    AnalysisError::UpstreamUnavailable(_) => &self.upstream_errors,
                    AnalysisError::InvalidReply(_) => &self.invalid_replies,
                }
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// One logical model call, including any retries.
    pub fn record_model_call(&self, duration: Duration) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        self.total_model_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            model_calls: self.model_calls.load(Ordering::Relaxed),
            errors: ErrorCounts {
                validation_error: self.validation_errors.load(Ordering::Relaxed),
                not_found: self.not_found_errors.load(Ordering::Relaxed),
                upstream_unavailable: self.upstream_errors.load(Ordering::Relaxed),
                invalid_reply: self.invalid_replies.load(Ordering::Relaxed),
            },
            avg_analyze_time_ms: avg_time_ms(&self.total_analyze_time_us, &self.total_requests),
            avg_model_time_ms: avg_time_ms(&self.total_model_time_us, &self.model_calls),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub model_calls: usize,
    pub errors: ErrorCounts,
    pub avg_analyze_time_ms: f64,
    pub avg_model_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct ErrorCounts {
    pub validation_error: usize,
    pub not_found: usize,
    pub upstream_unavailable: usize,
    pub invalid_reply: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
