//! Spindle Replay Runtime
//!
//! Deterministic, time-reversible traversal of a recorded trace. The
//! runtime accumulates parsed steps in an append-only history, derives
//! per-step variable snapshots lazily on first visit, and answers
//! navigation and inspection queries — including stepping backward through
//! already-seen history.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod history;
pub mod runtime;
pub mod scope;

pub use history::StepHistory;
pub use runtime::{ReplayRuntime, RunState, StackFrame, StackTrace};
pub use scope::{ScopeSet, ScopeTable, VarScopeHandle};
