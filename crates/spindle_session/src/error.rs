//! Session-level errors.
//!
//! These are the recoverable failures of the system: a simulator that
//! cannot be launched, and a syntax check that could not run. Both are
//! surfaced to the user before any trace data exists; nothing downstream
//! of a successful launch produces errors.

/// Errors launching the simulator for a debug session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Simulator executable missing from the configured path
    #[error("simulator executable not found: {path}")]
    SimulatorNotFound {
        /// Configured executable path
        path: String,
    },

    /// Simulator present but failed to spawn
    #[error("failed to launch simulator {path}: {reason}")]
    LaunchFailed {
        /// Configured executable path
        path: String,
        /// Underlying I/O failure
        reason: String,
    },
}

/// Errors running the syntax checker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    /// Simulator executable missing from the configured path
    #[error("simulator executable not found: {path}")]
    SimulatorNotFound {
        /// Configured executable path
        path: String,
    },

    /// Simulator ran but reported a configuration problem on stderr
    #[error("simulator exited with status {status}: {stderr}")]
    SimulatorFailed {
        /// Process exit code
        status: i32,
        /// Captured stderr text
        stderr: String,
    },

    /// Simulator could not be executed
    #[error("failed to run simulator {path}: {reason}")]
    Io {
        /// Configured executable path
        path: String,
        /// Underlying I/O failure
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::SimulatorNotFound { path: "spin".to_string() };
        assert_eq!(err.to_string(), "simulator executable not found: spin");

        let err = CheckError::SimulatorFailed { status: 2, stderr: "bad flag".to_string() };
        assert_eq!(err.to_string(), "simulator exited with status 2: bad flag");
    }
}
