//! Interception flags and engine status.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::core::state::EnginePhase;
use crate::core::traffic::TrafficTotals;
use crate::core::vpn::VpnTracking;

use super::state::EngineContext;

/// Snapshot of everything the front-end shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub phase: EnginePhase,
    pub interception_enabled: bool,
    pub auto_disable_on_vpn: bool,
    pub limiting_active: bool,
    pub download_limit_kib: u64,
    pub upload_limit_kib: u64,
    pub vpn_tracking: VpnTracking,
    pub vpn_addresses: BTreeSet<Ipv4Addr>,
    pub totals: TrafficTotals,
}

pub fn set_interception_enabled(ctx: &EngineContext, enabled: bool) {
    ctx.state.set_interception_enabled(enabled);
    tracing::info!(
        "Interception {}",
        if enabled { "enabled" } else { "disabled" }
    );
    ctx.signal.notify();
}

pub fn set_auto_disable_on_vpn(ctx: &EngineContext, enabled: bool) {
    ctx.state.set_auto_disable_on_vpn(enabled);
    tracing::info!("Auto-disable on VPN set to {enabled}");
    ctx.signal.notify();
}

/// Whether interception is enabled (the setpoint, not whether a handle is open).
pub fn is_intercept_enabled(ctx: &EngineContext) -> bool {
    ctx.state.interception_enabled()
}

/// Whether capture handles are currently open and forwarding.
pub fn is_intercept_active(ctx: &EngineContext) -> bool {
    ctx.state.phase() == EnginePhase::Active
}

pub fn is_limiting_active(ctx: &EngineContext) -> bool {
    ctx.state.limiting_active()
}

pub fn engine_status(ctx: &EngineContext) -> EngineStatus {
    EngineStatus {
        phase: ctx.state.phase(),
        interception_enabled: ctx.state.interception_enabled(),
        auto_disable_on_vpn: ctx.state.auto_disable_on_vpn(),
        limiting_active: ctx.state.limiting_active(),
        download_limit_kib: ctx.state.download_limit(),
        upload_limit_kib: ctx.state.upload_limit(),
        vpn_tracking: ctx.config.vpn_tracking,
        vpn_addresses: ctx.vpn_addresses(),
        totals: ctx.traffic.totals(),
    }
}
