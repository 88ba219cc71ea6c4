//! Shared engine context, owned by the process entry point and passed by
//! reference to the capture threads and the presentation layer.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};

use crate::config::EngineConfig;
use crate::core::rate_limiter::RateLimiter;
use crate::core::signal::EngineSignal;
use crate::core::state::EngineState;
use crate::core::traffic::TrafficTracker;

pub struct EngineContext {
    pub config: EngineConfig,
    pub state: EngineState,
    pub rate_limiter: RateLimiter,
    pub traffic: TrafficTracker,
    /// Stop flag plus the wake-up condition for the supervisor and any
    /// suspended pipeline.
    pub signal: EngineSignal,
    /// Last VPN address set published by the supervisor.
    vpn_addresses: Mutex<BTreeSet<Ipv4Addr>>,
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: EngineState::new(&config),
            rate_limiter: RateLimiter::new(config.max_burst_bytes),
            traffic: TrafficTracker::new(),
            signal: EngineSignal::new(),
            vpn_addresses: Mutex::new(BTreeSet::new()),
            config,
        }
    }

    pub fn vpn_addresses(&self) -> BTreeSet<Ipv4Addr> {
        self.vpn_addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn publish_vpn_addresses(&self, addresses: &BTreeSet<Ipv4Addr>) {
        *self
            .vpn_addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = addresses.clone();
    }
}
