//! Spindle Core Types
//!
//! This crate contains pure types shared across the workspace, with no I/O.
//! Step records, breakpoints, threads and runtime events are all defined
//! here so the parser, the replay runtime and the session layer agree on
//! one data model.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod breakpoint;
pub mod event;
pub mod step;
pub mod thread;

// Re-exports
pub use breakpoint::Breakpoint;
pub use event::{RuntimeEvent, StopReason};
pub use step::{ErrorStep, Step, StepUpdates, TraceItem, VarValue, Variable};
pub use thread::{MAIN_THREAD, Thread, ThreadId};
