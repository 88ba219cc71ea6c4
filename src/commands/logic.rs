//! Pure business logic extracted from the command handlers.
//!
//! These functions take plain parameters (no `EngineContext`) and can be
//! unit-tested in isolation.

use crate::config::MAX_LIMIT_KIB_PER_SEC;
use crate::error::EngineError;

/// Reject limits above the supported maximum. 0 (unlimited) is always valid.
pub fn validate_limit(kib_per_sec: u64) -> Result<(), EngineError> {
    if kib_per_sec > MAX_LIMIT_KIB_PER_SEC {
        return Err(EngineError::InvalidInput(format!(
            "limit {kib_per_sec} KiB/s exceeds maximum of {MAX_LIMIT_KIB_PER_SEC} KiB/s"
        )));
    }
    Ok(())
}

/// True when a limit change switches a direction between unlimited and limited.
pub fn crosses_zero(previous: u64, next: u64) -> bool {
    (previous == 0) != (next == 0)
}

/// Human-readable limit for log lines.
pub fn describe_limit(kib_per_sec: u64) -> String {
    if kib_per_sec == 0 {
        "unlimited".to_string()
    } else {
        format!("{kib_per_sec} KiB/s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_limit_bounds() {
        assert!(validate_limit(0).is_ok());
        assert!(validate_limit(MAX_LIMIT_KIB_PER_SEC).is_ok());
        let err = validate_limit(MAX_LIMIT_KIB_PER_SEC + 1).unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn test_crosses_zero() {
        assert!(crosses_zero(0, 100));
        assert!(crosses_zero(100, 0));
        assert!(!crosses_zero(100, 200));
        assert!(!crosses_zero(0, 0));
    }

    #[test]
    fn test_describe_limit() {
        assert_eq!(describe_limit(0), "unlimited");
        assert_eq!(describe_limit(512), "512 KiB/s");
    }
}
