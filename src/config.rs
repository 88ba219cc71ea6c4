//! Centralized runtime constants for netshaper.
//!
//! All tunable intervals, thresholds, and counts are collected here so they can
//! be found and adjusted in a single place rather than scattered across modules.
//! [`EngineConfig`] bundles the subset the engine reads at start-up.

use crate::core::vpn::VpnTracking;

/// Bytes per KiB. Limits and burst sizes are configured in KiB.
pub const BYTES_PER_KIB: u64 = 1024;

/// Token bucket capacity shared by both directions (KiB).
pub const MAX_BURST_KIB: u64 = 1000;

/// Largest accepted limit setpoint (KiB/s), roughly 10 GB/s.
pub const MAX_LIMIT_KIB_PER_SEC: u64 = 10_000_000;

/// How long the supervisor waits between reconciliation cycles while interception is off (milliseconds).
pub const DISABLED_POLL_INTERVAL_MS: u64 = 500;

/// How often the supervisor re-runs VPN detection while pipelines are running (milliseconds).
pub const VPN_REFRESH_INTERVAL_MS: u64 = 2000;

/// First delay after a capture open or I/O failure (milliseconds).
pub const OPEN_RETRY_BASE_MS: u64 = 250;

/// Upper bound for the capture retry delay (milliseconds).
pub const OPEN_RETRY_MAX_MS: u64 = 10_000;

/// Poll step used while waiting for retired pipelines to release their handles (milliseconds).
pub const PIPELINE_DRAIN_POLL_MS: u64 = 50;

/// How long the supervisor waits for retired pipelines before detaching them
/// (milliseconds). A detached pipeline still closes its handle once its
/// pending receive returns.
pub const PIPELINE_RETIRE_GRACE_MS: u64 = 1000;

/// WinDivert priority for the intercept handles. WinDivert 2.x hands packets to
/// higher values first, so a negative value sits behind default-priority drivers.
pub const CAPTURE_PRIORITY: i16 = -1000;

/// Receive buffer per pipeline (bytes). Large enough for any IP packet.
pub const CAPTURE_BUFFER_SIZE: usize = 65535;

/// Interval at which the stats reporter drains counters (seconds).
pub const STATS_INTERVAL_SECS: u64 = 1;

/// Adapter name fragments that mark an ordinary physical NIC.
pub const PHYSICAL_ADAPTER_MARKERS: &[&str] = &[
    "ethernet adapter",
    "wireless lan adapter",
    "wi-fi",
    "local area connection",
];

/// Adapter name/description fragments that mark a VPN or virtual adapter.
pub const VPN_ADAPTER_MARKERS: &[&str] = &[
    "tap",
    "tun",
    "vpn",
    "virtual",
    "surfshark",
    "wan miniport",
    "wireguard",
    "wintun",
    "openvpn",
    "nordlynx",
    "tailscale",
    "zerotier",
];

/// Engine start-up configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Bucket capacity in bytes.
    pub max_burst_bytes: u64,
    /// Initial download limit (KiB/s, 0 = unlimited).
    pub download_limit_kib: u64,
    /// Initial upload limit (KiB/s, 0 = unlimited).
    pub upload_limit_kib: u64,
    pub interception_enabled: bool,
    pub auto_disable_on_vpn: bool,
    pub vpn_tracking: VpnTracking,
    pub capture_priority: i16,
    pub disabled_poll_interval_ms: u64,
    pub vpn_refresh_interval_ms: u64,
    pub open_retry_base_ms: u64,
    pub open_retry_max_ms: u64,
    pub retire_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_burst_bytes: MAX_BURST_KIB * BYTES_PER_KIB,
            download_limit_kib: 0,
            upload_limit_kib: 0,
            interception_enabled: true,
            auto_disable_on_vpn: true,
            vpn_tracking: VpnTracking::Accumulate,
            capture_priority: CAPTURE_PRIORITY,
            disabled_poll_interval_ms: DISABLED_POLL_INTERVAL_MS,
            vpn_refresh_interval_ms: VPN_REFRESH_INTERVAL_MS,
            open_retry_base_ms: OPEN_RETRY_BASE_MS,
            open_retry_max_ms: OPEN_RETRY_MAX_MS,
            retire_grace_ms: PIPELINE_RETIRE_GRACE_MS,
        }
    }
}
