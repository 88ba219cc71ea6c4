//! Traffic statistics for the presentation layer.

use crate::core::traffic::{TrafficSample, TrafficTotals};

use super::state::EngineContext;

/// Bytes forwarded per direction since the previous call, then reset.
/// Intended to be polled once per second.
pub fn drain_stats(ctx: &EngineContext) -> TrafficSample {
    ctx.traffic.drain()
}

pub fn traffic_totals(ctx: &EngineContext) -> TrafficTotals {
    ctx.traffic.totals()
}
