//! Download/upload limit setpoints.

use serde::Serialize;

use crate::core::state::Direction;
use crate::error::EngineError;

use super::logic::{crosses_zero, describe_limit, validate_limit};
use super::state::EngineContext;

/// Current limits in KiB/s (0 = unlimited).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub download_kib: u64,
    pub upload_kib: u64,
}

pub fn set_download_limit(ctx: &EngineContext, kib_per_sec: u64) -> Result<(), EngineError> {
    set_limit(ctx, Direction::Inbound, kib_per_sec)
}

pub fn set_upload_limit(ctx: &EngineContext, kib_per_sec: u64) -> Result<(), EngineError> {
    set_limit(ctx, Direction::Outbound, kib_per_sec)
}

pub fn get_limits(ctx: &EngineContext) -> Limits {
    Limits {
        download_kib: ctx.state.download_limit(),
        upload_kib: ctx.state.upload_limit(),
    }
}

fn set_limit(
    ctx: &EngineContext,
    direction: Direction,
    kib_per_sec: u64,
) -> Result<(), EngineError> {
    validate_limit(kib_per_sec)?;
    let previous = ctx.state.set_limit(direction, kib_per_sec);
    if crosses_zero(previous, kib_per_sec) {
        ctx.rate_limiter.update_limiting_state(&ctx.state);
    }
    tracing::info!(
        "{} limit set to {}",
        direction.label(),
        describe_limit(kib_per_sec)
    );
    // Suspended packets re-measure against the new rate.
    ctx.signal.notify();
    Ok(())
}
