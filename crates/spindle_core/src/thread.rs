//! Threads discovered while replaying a trace.

use serde::{Deserialize, Serialize};

/// Identifier of a thread as reported to the client
///
/// Process threads use the simulator's PID; the synthetic main thread uses
/// `-1`, which also acts as the "all threads" selector in stack queries.
pub type ThreadId = i64;

/// Id of the synthetic main thread that always exists
pub const MAIN_THREAD: ThreadId = -1;

/// A thread visible to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Thread id
    pub id: ThreadId,
    /// Display name
    pub name: String,
}

impl Thread {
    /// Create a thread
    #[must_use]
    pub fn new(id: ThreadId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    /// The synthetic main thread
    #[must_use]
    pub fn main() -> Self {
        Self::new(MAIN_THREAD, "Main")
    }

    /// Thread for a process first seen in a step
    #[must_use]
    pub fn for_proc(proc: ThreadId, proc_name: &str) -> Self {
        Self::new(proc, format!("{}({})", proc_name, proc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_thread() {
        let main = Thread::main();
        assert_eq!(main.id, MAIN_THREAD);
        assert_eq!(main.name, "Main");
    }

    #[test]
    fn test_for_proc() {
        let thread = Thread::for_proc(2, "client");
        assert_eq!(thread.id, 2);
        assert_eq!(thread.name, "client(2)");
    }
}
