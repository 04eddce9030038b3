use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide request counters, injected through `AppState` so handlers and
/// the generation client share one instance. Counters only ever move forward;
/// relaxed ordering is enough since no counter gates any other memory access.
#[derive(Debug, Default)]
pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
    generation_calls: AtomicU64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    // Wire key kept for dashboard compatibility.
    #[serde(rename = "total_openai_calls")]
    pub total_generation_calls: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generation_call(&self) {
        self.generation_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.requests.load(Ordering::Relaxed),
            total_errors: self.errors.load(Ordering::Relaxed),
            total_generation_calls: self.generation_calls.load(Ordering::Relaxed),
        }
    }
}
