//! Background services for the console front-end.
//!
//! `StatsReporter` drains the engine's traffic counters once per second and
//! reports them, either as a log line or as one JSON object per line on stdout.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::commands::{self, EngineContext};
use crate::config;
use crate::core::state::EnginePhase;
use crate::core::traffic::TrafficSample;

/// How each per-second sample is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Log,
    Json,
}

/// One reported sample.
#[derive(Debug, Clone, Serialize)]
pub struct StatsLine {
    pub download_bytes: u64,
    pub upload_bytes: u64,
    pub phase: EnginePhase,
    pub limiting_active: bool,
}

pub struct StatsReporter;

impl StatsReporter {
    /// Spawn the reporter on the current tokio runtime.
    pub fn start(ctx: Arc<EngineContext>, format: ReportFormat) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(config::STATS_INTERVAL_SECS));
            // First tick completes immediately; skip it so the first sample spans a full interval.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let sample = commands::traffic::drain_stats(&ctx);
                let line = StatsLine {
                    download_bytes: sample.download_bytes,
                    upload_bytes: sample.upload_bytes,
                    phase: ctx.state.phase(),
                    limiting_active: ctx.state.limiting_active(),
                };
                match format {
                    ReportFormat::Json => match serde_json::to_string(&line) {
                        Ok(json) => println!("{json}"),
                        Err(e) => tracing::warn!("Failed to serialize stats: {e}"),
                    },
                    ReportFormat::Log => {
                        tracing::info!("{}", describe_sample(&sample, line.phase));
                    }
                }
            }
        })
    }
}

/// Log form of one per-second sample.
pub fn describe_sample(sample: &TrafficSample, phase: EnginePhase) -> String {
    let interval = config::STATS_INTERVAL_SECS.max(1) as f64;
    format!(
        "Download: {}  Upload: {}  [{phase:?}]",
        format_speed_compact(sample.download_bytes as f64 / interval),
        format_speed_compact(sample.upload_bytes as f64 / interval),
    )
}

/// Format a speed value in a compact human-readable form.
pub fn format_speed_compact(bps: f64) -> String {
    if bps < 1024.0 {
        format!("{:.0} B/s", bps)
    } else if bps < 1024.0 * 1024.0 {
        format!("{:.1} KB/s", bps / 1024.0)
    } else {
        format!("{:.2} MB/s", bps / (1024.0 * 1024.0))
    }
}
