//! Events emitted by the replay runtime toward its session gateway.

use crate::thread::ThreadId;
use serde::{Deserialize, Serialize};

/// Reason a navigation came to a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopReason {
    /// Stopped on entry, or clamped at the first recorded step
    Entry,
    /// Stopped after a single step
    Step,
    /// Stopped at a breakpoint
    Breakpoint,
    /// Stopped at the trace's terminal error step
    Exception,
}

/// Event emitted by the runtime
///
/// Events are delivered over an outbound channel in FIFO order, never
/// synchronously inside the navigation call that triggered them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeEvent {
    /// Navigation stopped
    Stopped {
        /// Why navigation stopped
        reason: StopReason,
        /// Thread the stop is attributed to
        thread_id: ThreadId,
    },
    /// A breakpoint's properties changed
    BreakpointChanged {
        /// Breakpoint id
        id: u64,
        /// Current verification state
        verified: bool,
    },
    /// Simulator output attached to a source location
    Output {
        /// Output text
        text: String,
        /// Program file the output refers to
        program: String,
        /// Line the output refers to
        line: u32,
        /// Column the output refers to
        column: u32,
    },
    /// The session reached the end of a completed trace
    Ended,
}

impl RuntimeEvent {
    /// Whether this event terminates the session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}
