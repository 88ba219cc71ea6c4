//! Packet interception.
//!
//! A supervisor thread runs the reconciliation loop: it refreshes the VPN
//! address set, applies the auto-disable policy and, while interception is
//! enabled, keeps one forwarding pipeline per direction running with a
//! filter built from the current VPN set.
//!
//! Platform backends implement the capture boundary:
//! - Windows: WinDivert 2.x (`windivert_backend`)
//! - elsewhere: [`UnsupportedBackend`], which never opens

pub mod filter;
mod pipeline;

#[cfg(target_os = "windows")]
pub mod windivert_backend;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::commands::EngineContext;
use crate::core::adapters::VpnDetector;
use crate::core::state::{Direction, EnginePhase};
use crate::core::vpn::VpnAddressSet;
use crate::error::EngineError;

use filter::{build_filter, CaptureFilter};
use pipeline::PipelineSet;

/// A packet held by a capture handle between receive and re-inject.
pub trait CapturedPacket {
    fn direction(&self) -> Direction;
    /// Size in bytes as it travels on the wire.
    fn size(&self) -> usize;
}

/// An open capture handle. Closed exactly once by the pipeline that owns it.
pub trait CaptureHandle {
    type Packet: CapturedPacket;

    /// Next diverted packet. `Ok(None)` means the backend timed out without
    /// one and the caller should re-check its stop conditions.
    fn recv(&mut self) -> Result<Option<Self::Packet>, EngineError>;

    /// Re-inject a packet unmodified.
    fn send(&mut self, packet: &Self::Packet) -> Result<(), EngineError>;

    fn close(&mut self) -> Result<(), EngineError>;
}

/// Opens capture handles. Shared by both pipelines; each pipeline opens its
/// own handle on its own thread.
pub trait CaptureBackend: Send + Sync + 'static {
    type Handle: CaptureHandle;

    fn open(&self, filter: &str, priority: i16) -> Result<Self::Handle, EngineError>;
}

/// Backend for platforms without a packet diversion driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedBackend;

/// Uninhabited handle/packet type for [`UnsupportedBackend`].
pub enum Unsupported {}

impl CapturedPacket for Unsupported {
    fn direction(&self) -> Direction {
        match *self {}
    }

    fn size(&self) -> usize {
        match *self {}
    }
}

impl CaptureHandle for Unsupported {
    type Packet = Unsupported;

    fn recv(&mut self) -> Result<Option<Unsupported>, EngineError> {
        match *self {}
    }

    fn send(&mut self, _packet: &Unsupported) -> Result<(), EngineError> {
        match *self {}
    }

    fn close(&mut self) -> Result<(), EngineError> {
        match *self {}
    }
}

impl CaptureBackend for UnsupportedBackend {
    type Handle = Unsupported;

    fn open(&self, _filter: &str, _priority: i16) -> Result<Unsupported, EngineError> {
        Err(EngineError::CaptureOpen(
            "packet interception requires the WinDivert driver (Windows only)".into(),
        ))
    }
}

#[cfg(target_os = "windows")]
pub type PlatformBackend = windivert_backend::WinDivertBackend;

#[cfg(not(target_os = "windows"))]
pub type PlatformBackend = UnsupportedBackend;

pub fn platform_backend() -> PlatformBackend {
    PlatformBackend::default()
}

/// Exponential retry delay for capture failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: None,
        }
    }

    /// Delay before the next attempt: `base`, then doubling up to `max`.
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.base,
            Some(d) => d.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Why the supervisor left the `Active` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveExit {
    Stopped,
    Disabled,
    FilterChanged,
    Failed,
}

/// Handle to the running interceptor. Dropping it requests shutdown.
pub struct CaptureEngine {
    ctx: Arc<EngineContext>,
    supervisor: Option<std::thread::JoinHandle<()>>,
}

impl CaptureEngine {
    /// Spawn the supervisor thread. The first reconciliation cycle decides
    /// whether the engine starts out `Disabled` or `Active`.
    pub fn start<B: CaptureBackend>(
        ctx: Arc<EngineContext>,
        backend: B,
        detector: VpnDetector,
    ) -> anyhow::Result<Self> {
        let supervisor = Supervisor::new(Arc::clone(&ctx), backend, detector);
        let thread = std::thread::Builder::new()
            .name("netshaper-supervisor".into())
            .spawn(move || supervisor.run())
            .context("failed to spawn capture supervisor thread")?;

        tracing::info!("CaptureEngine started");
        Ok(Self {
            ctx,
            supervisor: Some(thread),
        })
    }

    /// Request shutdown without waiting.
    pub fn stop(&self) {
        self.ctx.signal.stop();
    }

    /// Request shutdown and wait for the supervisor to exit. Pipelines blocked
    /// in a receive release their handle after their next packet.
    pub fn shutdown(mut self) {
        self.stop();
        if let Some(thread) = self.supervisor.take() {
            if thread.join().is_err() {
                tracing::error!("Capture supervisor panicked");
            }
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if self.supervisor.is_some() {
            tracing::info!("CaptureEngine dropped, releasing capture resources");
        }
        self.ctx.signal.stop();
    }
}

struct Supervisor<B: CaptureBackend> {
    ctx: Arc<EngineContext>,
    backend: Arc<B>,
    detector: VpnDetector,
    vpn: VpnAddressSet,
    backoff: Backoff,
}

impl<B: CaptureBackend> Supervisor<B> {
    fn new(ctx: Arc<EngineContext>, backend: B, detector: VpnDetector) -> Self {
        let vpn = VpnAddressSet::new(ctx.config.vpn_tracking);
        let backoff = Backoff::new(
            Duration::from_millis(ctx.config.open_retry_base_ms),
            Duration::from_millis(ctx.config.open_retry_max_ms),
        );
        Self {
            ctx,
            backend: Arc::new(backend),
            detector,
            vpn,
            backoff,
        }
    }

    fn run(mut self) {
        let disabled_poll = Duration::from_millis(self.ctx.config.disabled_poll_interval_ms);

        while !self.ctx.signal.is_stopped() {
            self.reconcile();

            if !self.ctx.state.interception_enabled() {
                self.enter_phase(EnginePhase::Disabled);
                self.ctx.signal.wait_timeout(disabled_poll);
                continue;
            }

            let filter = build_filter(self.vpn.addresses());
            let pipelines =
                match PipelineSet::open(&self.ctx, &self.backend, &filter) {
                    Ok(pipelines) => pipelines,
                    Err(e) => {
                        self.enter_phase(EnginePhase::Disabled);
                        let delay = self.backoff.next_delay();
                        tracing::warn!("Capture unavailable: {e}. Retrying in {delay:?}");
                        self.ctx.signal.wait_timeout(delay);
                        continue;
                    }
                };

            self.backoff.reset();
            self.enter_phase(EnginePhase::Active);
            tracing::info!("Interception active with filter: {filter}");

            let exit = self.supervise(&filter, &pipelines);
            pipelines.retire(&self.ctx);
            tracing::info!("Interception left active state: {exit:?}");

            if exit == ActiveExit::Failed {
                self.enter_phase(EnginePhase::Disabled);
                let delay = self.backoff.next_delay();
                tracing::warn!("Capture pipeline failed, reopening in {delay:?}");
                self.ctx.signal.wait_timeout(delay);
            }
        }

        self.enter_phase(EnginePhase::Stopped);
        tracing::info!("Capture supervisor stopped");
    }

    /// Watch the running pipelines until something requires leaving `Active`.
    fn supervise(&mut self, filter: &CaptureFilter, pipelines: &PipelineSet) -> ActiveExit {
        let refresh = Duration::from_millis(self.ctx.config.vpn_refresh_interval_ms);
        let mut last_detect = Instant::now();
        loop {
            self.ctx
                .signal
                .wait_timeout(refresh.saturating_sub(last_detect.elapsed()));
            if self.ctx.signal.is_stopped() {
                return ActiveExit::Stopped;
            }
            if pipelines.any_failed() {
                return ActiveExit::Failed;
            }

            // Wake-ups only re-apply the policy; detection keeps its own cadence.
            if last_detect.elapsed() >= refresh {
                self.reconcile();
                last_detect = Instant::now();
            } else {
                self.apply_vpn_policy();
            }

            if !self.ctx.state.interception_enabled() {
                return ActiveExit::Disabled;
            }
            if build_filter(self.vpn.addresses()) != *filter {
                return ActiveExit::FilterChanged;
            }
        }
    }

    /// One reconciliation cycle: refresh the VPN set, then apply the policy.
    fn reconcile(&mut self) {
        let detected = self.detector.detect_vpn_addresses();
        if self.vpn.update(detected) {
            tracing::info!(
                "VPN addresses excluded from interception: {:?}",
                self.vpn.addresses()
            );
            self.ctx.publish_vpn_addresses(self.vpn.addresses());
        }
        self.apply_vpn_policy();
    }

    /// With auto-disable on, interception follows the VPN set: off while any
    /// VPN address is known, on otherwise.
    fn apply_vpn_policy(&self) {
        let state = &self.ctx.state;
        if !state.auto_disable_on_vpn() {
            return;
        }
        let enable = self.vpn.is_empty();
        if state.interception_enabled() != enable {
            if enable {
                tracing::info!("No VPN adapter detected, enabling interception");
            } else {
                tracing::info!("VPN adapter detected, disabling interception");
            }
            state.set_interception_enabled(enable);
        }
    }

    fn enter_phase(&self, phase: EnginePhase) {
        if self.ctx.state.phase() != phase {
            tracing::debug!("Engine phase: {phase:?}");
            self.ctx.state.set_phase(phase);
        }
    }
}
