//! Unified error type for the shaping engine.
//!
//! `EngineError` is returned by every fallible engine operation and by the
//! presentation-facing commands. It serializes as `{ "kind": "...", "message": "..." }`
//! so a front-end can programmatically distinguish error categories.

use serde::ser::SerializeStruct;

/// Engine-level error.
///
/// Each variant maps to a distinct failure domain. None of them is fatal:
/// the supervisor contains capture failures and retries, and adapter query
/// failures degrade to "no VPN detected".
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Network adapters could not be enumerated.
    #[error("{0}")]
    AdapterQuery(String),

    /// The capture handle could not be opened (driver missing, not elevated, bad filter).
    #[error("{0}")]
    CaptureOpen(String),

    /// Receive or re-inject failed on an open capture handle.
    #[error("{0}")]
    CaptureIo(String),

    /// Invalid setpoint from the presentation layer.
    #[error("{0}")]
    InvalidInput(String),

    /// Other OS-level errors (thread spawning, process execution).
    #[error("{0}")]
    Io(String),
}

impl EngineError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::AdapterQuery(_) => "AdapterQuery",
            EngineError::CaptureOpen(_) => "CaptureOpen",
            EngineError::CaptureIo(_) => "CaptureIo",
            EngineError::InvalidInput(_) => "InvalidInput",
            EngineError::Io(_) => "Io",
        }
    }
}

/// Custom Serialize: produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for EngineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("EngineError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}
