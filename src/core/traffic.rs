//! Host-wide traffic accounting.
//!
//! Both directions live behind one mutex so `drain` reads and resets them as
//! a single atomic step. The capture pipelines call `record` after each
//! forwarded packet; the presentation layer calls `drain` once per second.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::core::state::Direction;

/// Running byte counters.
#[derive(Debug, Default)]
struct TrafficCounters {
    download_bytes: u64,
    upload_bytes: u64,
    total_download: u64,
    total_upload: u64,
}

/// Bytes forwarded since the previous drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficSample {
    pub download_bytes: u64,
    pub upload_bytes: u64,
}

/// Cumulative bytes since the engine started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficTotals {
    pub download_bytes: u64,
    pub upload_bytes: u64,
}

/// Thread-safe traffic tracker shared by both pipelines.
#[derive(Debug, Default)]
pub struct TrafficTracker {
    counters: Mutex<TrafficCounters>,
}

impl TrafficTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a forwarded packet. Called from the capture pipelines.
    pub fn record(&self, direction: Direction, size: u64) {
        let mut c = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        match direction {
            Direction::Inbound => {
                c.download_bytes = c.download_bytes.saturating_add(size);
                c.total_download = c.total_download.saturating_add(size);
            }
            Direction::Outbound => {
                c.upload_bytes = c.upload_bytes.saturating_add(size);
                c.total_upload = c.total_upload.saturating_add(size);
            }
        }
    }

    /// Return the bytes recorded since the last drain and reset them to zero.
    pub fn drain(&self) -> TrafficSample {
        let mut c = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let sample = TrafficSample {
            download_bytes: c.download_bytes,
            upload_bytes: c.upload_bytes,
        };
        c.download_bytes = 0;
        c.upload_bytes = 0;
        sample
    }

    pub fn totals(&self) -> TrafficTotals {
        let c = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        TrafficTotals {
            download_bytes: c.total_download,
            upload_bytes: c.total_upload,
        }
    }
}
