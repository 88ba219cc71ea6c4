//! Operations exposed to the presentation layer, organized by functional domain.
//!
//! - `limits`: download/upload setpoints
//! - `system`: interception flags and engine status
//! - `traffic`: per-second stats drain
//! - `logic`: Pure validation helpers (unit-testable)
//! - `state`: Shared `EngineContext` definition

pub mod limits;
mod logic;
mod state;
pub mod system;
pub mod traffic;

pub use state::EngineContext;
pub use system::EngineStatus;
