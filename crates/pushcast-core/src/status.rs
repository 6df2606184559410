use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Receives aggregate delivery counters for the Android platform.
pub trait MetricsSink: Send + Sync {
    fn add_success(&self, count: u64);
    fn add_error(&self, count: u64);
}

/// In-process Android push counters.
#[derive(Debug, Default)]
pub struct StatStorage {
    android_success: AtomicU64,
    android_error: AtomicU64,
}

impl StatStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            push_success: self.android_success.load(Ordering::Relaxed),
            push_error: self.android_error.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for StatStorage {
    fn add_success(&self, count: u64) {
        self.android_success.fetch_add(count, Ordering::Relaxed);
    }

    fn add_error(&self, count: u64) {
        self.android_error.fetch_add(count, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatSnapshot {
    pub push_success: u64,
    pub push_error: u64,
}
