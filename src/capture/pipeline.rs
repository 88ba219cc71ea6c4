//! Per-direction forwarding pipelines.
//!
//! Each pipeline owns one capture handle, opened on its own thread, and loops
//! receive -> throttle -> re-inject -> count until told to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::filter::CaptureFilter;
use super::{CaptureBackend, CaptureHandle, CapturedPacket};
use crate::commands::EngineContext;
use crate::config::PIPELINE_DRAIN_POLL_MS;
use crate::core::state::Direction;
use crate::error::EngineError;

/// Closes the wrapped handle exactly once, on every exit path.
struct HandleGuard<H: CaptureHandle> {
    handle: H,
    direction: Direction,
}

impl<H: CaptureHandle> Drop for HandleGuard<H> {
    fn drop(&mut self) {
        if let Err(e) = self.handle.close() {
            tracing::debug!("{} handle close failed (ignored): {e}", self.direction.label());
        }
    }
}

struct Pipeline {
    direction: Direction,
    stop: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// The two pipelines of one `Active` period.
pub(super) struct PipelineSet {
    pipelines: Vec<Pipeline>,
}

impl PipelineSet {
    /// Start both pipelines and wait until each reports whether its handle
    /// opened. Any failure retires whatever did open.
    pub(super) fn open<B: CaptureBackend>(
        ctx: &Arc<EngineContext>,
        backend: &Arc<B>,
        filter: &CaptureFilter,
    ) -> Result<Self, EngineError> {
        let (report_tx, report_rx) = mpsc::channel();
        let mut set = Self {
            pipelines: Vec::with_capacity(Direction::ALL.len()),
        };

        for direction in Direction::ALL {
            match spawn(ctx, backend, direction, filter, report_tx.clone()) {
                Ok(pipeline) => set.pipelines.push(pipeline),
                Err(e) => {
                    set.retire(ctx);
                    return Err(e);
                }
            }
        }
        drop(report_tx);

        let mut first_error = None;
        for _ in 0..set.pipelines.len() {
            match report_rx.recv() {
                Ok(Ok(direction)) => {
                    tracing::debug!("{} capture handle opened", direction.label());
                }
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    first_error.get_or_insert(EngineError::CaptureOpen(
                        "pipeline exited before reporting".into(),
                    ));
                    break;
                }
            }
        }

        match first_error {
            None => Ok(set),
            Some(e) => {
                set.retire(ctx);
                Err(e)
            }
        }
    }

    /// True once any pipeline has exited on a capture error.
    pub(super) fn any_failed(&self) -> bool {
        self.pipelines
            .iter()
            .any(|p| p.failed.load(Ordering::SeqCst))
    }

    /// Ask every pipeline to stop and wait for them to release their handles.
    /// A pipeline blocked in receive exits after its next packet, so the wait
    /// is bounded: pipelines still running after `retire_grace_ms`, or once the
    /// engine itself is stopped, are detached and close their handle on their
    /// own when the receive returns.
    pub(super) fn retire(self, ctx: &EngineContext) {
        for pipeline in &self.pipelines {
            pipeline.stop.store(true, Ordering::SeqCst);
        }

        let poll = Duration::from_millis(PIPELINE_DRAIN_POLL_MS);
        let deadline = Instant::now() + Duration::from_millis(ctx.config.retire_grace_ms);
        while !self.pipelines.iter().all(|p| p.thread.is_finished()) {
            if ctx.signal.is_stopped() {
                tracing::debug!("Engine stopping, detaching capture pipelines");
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            ctx.signal.wait_timeout(poll.min(deadline - now));
        }

        for pipeline in self.pipelines {
            if !pipeline.thread.is_finished() {
                tracing::debug!(
                    "{} pipeline still waiting for a packet, detaching it",
                    pipeline.direction.label()
                );
                continue;
            }
            if pipeline.thread.join().is_err() {
                tracing::error!("{} pipeline panicked", pipeline.direction.label());
            }
        }
    }
}

fn spawn<B: CaptureBackend>(
    ctx: &Arc<EngineContext>,
    backend: &Arc<B>,
    direction: Direction,
    filter: &CaptureFilter,
    report: mpsc::Sender<Result<Direction, EngineError>>,
) -> Result<Pipeline, EngineError> {
    let stop = Arc::new(AtomicBool::new(false));
    let failed = Arc::new(AtomicBool::new(false));
    let filter = filter.for_direction(direction);

    let thread = {
        let ctx = Arc::clone(ctx);
        let backend = Arc::clone(backend);
        let stop = Arc::clone(&stop);
        let failed = Arc::clone(&failed);
        std::thread::Builder::new()
            .name(format!("netshaper-{}", direction.label()))
            .spawn(move || {
                let handle = match backend.open(&filter, ctx.config.capture_priority) {
                    Ok(handle) => handle,
                    Err(e) => {
                        let _ = report.send(Err(e));
                        return;
                    }
                };
                let _ = report.send(Ok(direction));
                drop(report);

                match forward(&ctx, direction, handle, &stop) {
                    Ok(packets) => {
                        tracing::debug!(
                            "{} pipeline stopped after {packets} packets",
                            direction.label()
                        );
                    }
                    Err(e) => {
                        tracing::warn!("{} pipeline failed: {e}", direction.label());
                        failed.store(true, Ordering::SeqCst);
                    }
                }
                ctx.signal.notify();
            })?
    };

    Ok(Pipeline {
        direction,
        stop,
        failed,
        thread,
    })
}

/// The forwarding loop. Returns the number of packets re-injected.
fn forward<H: CaptureHandle>(
    ctx: &EngineContext,
    direction: Direction,
    handle: H,
    stop: &AtomicBool,
) -> Result<u64, EngineError> {
    let mut guard = HandleGuard { handle, direction };
    let mut forwarded = 0u64;

    while !stop.load(Ordering::SeqCst)
        && !ctx.signal.is_stopped()
        && ctx.state.interception_enabled()
    {
        let Some(packet) = guard.handle.recv()? else {
            continue;
        };
        let size = packet.size();
        let packet_direction = packet.direction();

        if ctx.state.limiting_active() {
            ctx.rate_limiter
                .throttle(&ctx.state, packet_direction, size, &ctx.signal);
        }

        guard.handle.send(&packet)?;
        ctx.traffic.record(packet_direction, size as u64);
        forwarded += 1;
    }

    Ok(forwarded)
}
