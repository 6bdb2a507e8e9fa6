//! Breakpoints registered against a source path and line.

use serde::{Deserialize, Serialize};

/// A (path, line) pair at which navigation must stop
///
/// Breakpoints are not deduplicated: several may be registered for the same
/// location, each with its own id. The client is expected to resend the full
/// desired set for a path rather than editing individual entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Session-unique, monotonically assigned id
    pub id: u64,
    /// Source path the breakpoint is set in
    pub path: String,
    /// Line the breakpoint is set at (1-based)
    pub line: u32,
    /// Whether the breakpoint has been confirmed
    pub verified: bool,
}

impl Breakpoint {
    /// Create an unverified breakpoint
    #[must_use]
    pub fn new(id: u64, path: impl Into<String>, line: u32) -> Self {
        Self { id, path: path.into(), line, verified: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_new() {
        let bp = Breakpoint::new(1, "model.pml", 12);
        assert_eq!(bp.id, 1);
        assert_eq!(bp.path, "model.pml");
        assert_eq!(bp.line, 12);
        assert!(!bp.verified);
    }

    #[test]
    fn test_breakpoint_equality() {
        let bp1 = Breakpoint::new(1, "model.pml", 12);
        let bp2 = Breakpoint::new(1, "model.pml", 12);
        let bp3 = Breakpoint::new(2, "model.pml", 12);
        assert_eq!(bp1, bp2);
        assert_ne!(bp1, bp3);
    }
}
