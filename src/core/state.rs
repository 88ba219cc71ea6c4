//! Engine setpoints and flags.
//!
//! Every field is a single atomic word: the presentation layer writes with
//! last-write-wins semantics and the engine threads read on every tick.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use serde::Serialize;

use crate::config::{EngineConfig, BYTES_PER_KIB};

/// Packet direction relative to this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Download.
    Inbound,
    /// Upload.
    Outbound,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Inbound, Direction::Outbound];

    /// Stable array index for per-direction storage.
    pub fn index(self) -> usize {
        match self {
            Direction::Inbound => 0,
            Direction::Outbound => 1,
        }
    }

    pub fn from_outbound(outbound: bool) -> Self {
        if outbound {
            Direction::Outbound
        } else {
            Direction::Inbound
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Inbound => "download",
            Direction::Outbound => "upload",
        }
    }
}

/// Where the interceptor currently is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePhase {
    Stopped,
    Disabled,
    Active,
}

impl EnginePhase {
    fn to_u8(self) -> u8 {
        match self {
            EnginePhase::Stopped => 0,
            EnginePhase::Disabled => 1,
            EnginePhase::Active => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => EnginePhase::Disabled,
            2 => EnginePhase::Active,
            _ => EnginePhase::Stopped,
        }
    }
}

/// Shared setpoints. Limits are in KiB/s; 0 means unlimited.
#[derive(Debug)]
pub struct EngineState {
    download_limit: AtomicU64,
    upload_limit: AtomicU64,
    limiting_active: AtomicBool,
    interception_enabled: AtomicBool,
    auto_disable_on_vpn: AtomicBool,
    phase: AtomicU8,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            download_limit: AtomicU64::new(config.download_limit_kib),
            upload_limit: AtomicU64::new(config.upload_limit_kib),
            limiting_active: AtomicBool::new(
                config.download_limit_kib > 0 || config.upload_limit_kib > 0,
            ),
            interception_enabled: AtomicBool::new(config.interception_enabled),
            auto_disable_on_vpn: AtomicBool::new(config.auto_disable_on_vpn),
            phase: AtomicU8::new(EnginePhase::Stopped.to_u8()),
        }
    }

    pub fn limit(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Inbound => self.download_limit.load(Ordering::Relaxed),
            Direction::Outbound => self.upload_limit.load(Ordering::Relaxed),
        }
    }

    /// Store a new limit and return the previous one.
    pub fn set_limit(&self, direction: Direction, kib_per_sec: u64) -> u64 {
        match direction {
            Direction::Inbound => self.download_limit.swap(kib_per_sec, Ordering::Relaxed),
            Direction::Outbound => self.upload_limit.swap(kib_per_sec, Ordering::Relaxed),
        }
    }

    /// Limit for `direction` converted to bytes/s.
    pub fn limit_bytes_per_sec(&self, direction: Direction) -> u64 {
        self.limit(direction).saturating_mul(BYTES_PER_KIB)
    }

    pub fn download_limit(&self) -> u64 {
        self.limit(Direction::Inbound)
    }

    pub fn upload_limit(&self) -> u64 {
        self.limit(Direction::Outbound)
    }

    pub fn limiting_active(&self) -> bool {
        self.limiting_active.load(Ordering::Relaxed)
    }

    pub(crate) fn set_limiting_active(&self, active: bool) {
        self.limiting_active.store(active, Ordering::Relaxed);
    }

    pub fn interception_enabled(&self) -> bool {
        self.interception_enabled.load(Ordering::Relaxed)
    }

    pub fn set_interception_enabled(&self, enabled: bool) {
        self.interception_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_disable_on_vpn(&self) -> bool {
        self.auto_disable_on_vpn.load(Ordering::Relaxed)
    }

    pub fn set_auto_disable_on_vpn(&self, enabled: bool) {
        self.auto_disable_on_vpn.store(enabled, Ordering::Relaxed);
    }

    pub fn phase(&self) -> EnginePhase {
        EnginePhase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    pub(crate) fn set_phase(&self, phase: EnginePhase) {
        self.phase.store(phase.to_u8(), Ordering::Relaxed);
    }
}
