//! Step records produced by the trace parser.
//!
//! A trace is a finite sequence of `TraceItem`s: executed steps, optionally
//! terminated by a single error step. Items are immutable once parsed.

use crate::thread::ThreadId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A variable value captured at a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    /// Scalar value, kept exactly as the simulator printed it
    Scalar(String),
    /// Ordered message-queue contents
    List(Vec<String>),
}

impl VarValue {
    /// Create a scalar value
    #[must_use]
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// Create a list value
    #[must_use]
    pub fn list(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{}", value),
            Self::List(items) => write!(f, "{}", items.join(",")),
        }
    }
}

/// Variable updates carried by a single step
///
/// Local and global updates are keyed by variable name; queue updates are
/// keyed by the queue number's decimal string. Insertion order is the order
/// the simulator printed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpdates {
    /// Updates to the executing process's local variables
    pub local: IndexMap<String, VarValue>,
    /// Updates to global variables
    pub global: IndexMap<String, VarValue>,
    /// Updates to message queues, keyed by queue number
    pub queues: IndexMap<String, VarValue>,
}

impl StepUpdates {
    /// Create an empty update set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no scope has any update
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.global.is_empty() && self.queues.is_empty()
    }
}

/// One executed transition of a process within the modeled system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Sequence number of this step (monotonic, gap-free)
    pub seq: u64,
    /// PID of the process executed at this step
    pub proc: ThreadId,
    /// Name of the process executed at this step
    pub proc_name: String,
    /// ID of the process executed at this step
    pub proc_id: u64,
    /// Program file executed at this step
    pub program: String,
    /// Line executed at this step
    pub line: u32,
    /// State this step jumps to
    pub state: u32,
    /// Variables updated at this step
    pub updates: StepUpdates,
    /// Raw simulator output related to this step
    pub raw_output: String,
}

/// Terminal error record of a failed trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStep {
    /// Program file executed when the error was reported
    pub program: String,
    /// Line executed when the error was reported
    pub line: u32,
    /// Raw simulator output related to the error
    pub raw_output: String,
}

/// An item of a parsed trace: a step, or the terminal error step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceItem {
    /// A well-formed executed step
    Step(Step),
    /// The terminal error step
    Error(ErrorStep),
}

impl TraceItem {
    /// Whether this item is the terminal error step
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// PID of the executing process, `None` for error steps
    #[must_use]
    pub fn proc(&self) -> Option<ThreadId> {
        match self {
            Self::Step(step) => Some(step.proc),
            Self::Error(_) => None,
        }
    }

    /// Program file this item refers to
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::Step(step) => &step.program,
            Self::Error(err) => &err.program,
        }
    }

    /// Line this item refers to
    #[must_use]
    pub fn line(&self) -> u32 {
        match self {
            Self::Step(step) => step.line,
            Self::Error(err) => err.line,
        }
    }

    /// Raw simulator output for this item
    #[must_use]
    pub fn raw_output(&self) -> &str {
        match self {
            Self::Step(step) => &step.raw_output,
            Self::Error(err) => &err.raw_output,
        }
    }
}

/// A materialized scope entry, as reported to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name
    pub name: String,
    /// Rendered value
    pub value: String,
}

impl Variable {
    /// Create a variable
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_value_display() {
        assert_eq!(VarValue::scalar("1").to_string(), "1");
        let list = VarValue::list(vec!["1".to_string(), "2".to_string()]);
        assert_eq!(list.to_string(), "1,2");
        assert_eq!(VarValue::list(Vec::new()).to_string(), "");
    }

    #[test]
    fn test_step_updates_empty() {
        let mut updates = StepUpdates::new();
        assert!(updates.is_empty());
        updates.global.insert("flag".to_string(), VarValue::scalar("1"));
        assert!(!updates.is_empty());
    }

    #[test]
    fn test_trace_item_accessors() {
        let step = Step {
            seq: 1,
            proc: 0,
            proc_name: "test".to_string(),
            proc_id: 1,
            program: "model.pml".to_string(),
            line: 5,
            state: 1,
            updates: StepUpdates::new(),
            raw_output: "raw".to_string(),
        };
        let item = TraceItem::Step(step);
        assert!(!item.is_error());
        assert_eq!(item.proc(), Some(0));
        assert_eq!(item.program(), "model.pml");
        assert_eq!(item.line(), 5);

        let err = TraceItem::Error(ErrorStep {
            program: "model.pml".to_string(),
            line: 18,
            raw_output: "spin: ...".to_string(),
        });
        assert!(err.is_error());
        assert_eq!(err.proc(), None);
        assert_eq!(err.line(), 18);
    }

    #[test]
    fn test_step_json_round_trip() {
        let mut updates = StepUpdates::new();
        updates.global.insert("flag".to_string(), VarValue::scalar("1"));
        updates.queues.insert(
            "1".to_string(),
            VarValue::list(vec!["msg".to_string()]),
        );
        let step = Step {
            seq: 3,
            proc: 1,
            proc_name: "worker".to_string(),
            proc_id: 2,
            program: "model.pml".to_string(),
            line: 12,
            state: 4,
            updates,
            raw_output: String::new(),
        };
        let json = serde_json::to_string(&step).unwrap();
        let restored: Step = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, step);
    }
}
