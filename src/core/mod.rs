//! Core logic: setpoints, rate limiting, traffic accounting, VPN detection.
//!
//! - [`EngineState`] / [`Direction`] / [`EnginePhase`]: atomic setpoints shared with the front-end
//! - [`RateLimiter`] / [`TokenBucket`]: per-direction token buckets
//! - [`TrafficTracker`]: lock-guarded byte counters drained once per second
//! - [`VpnDetector`]: adapter enumeration and VPN classification
//! - [`VpnAddressSet`]: addresses kept out of interception
//! - [`EngineSignal`]: stop/wake condition shared by all engine threads

pub mod adapters;
pub mod rate_limiter;
pub mod signal;
pub mod state;
pub mod traffic;
pub mod vpn;

pub use adapters::{Adapter, AdapterClassifier, AdapterSource, KeywordClassifier, VpnDetector};
pub use rate_limiter::{RateLimiter, TokenBucket};
pub use signal::EngineSignal;
pub use state::{Direction, EnginePhase, EngineState};
pub use traffic::{TrafficSample, TrafficTotals, TrafficTracker};
pub use vpn::{VpnAddressSet, VpnTracking};
