//! The replay state machine: navigation, breakpoints, threads, snapshots.

use crate::history::StepHistory;
use crate::scope::{ScopeSet, ScopeTable, VarScopeHandle};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spindle_core::{
    Breakpoint, MAIN_THREAD, RuntimeEvent, StopReason, Thread, ThreadId, TraceItem, Variable,
};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

/// Lifecycle state of a replay session
///
/// `Idle → Running → {Stopped ⇄ Running} → Ended`; `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Constructed, `start` not yet called
    Idle,
    /// A navigation is scanning or parked awaiting more input
    Running,
    /// Stopped at a step; inspection queries refer to the current position
    Stopped,
    /// The end of a completed trace was reached; terminal
    Ended,
}

/// One synthetic frame of a stack query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Step index this frame refers to (usable as a scopes frame id)
    pub id: i64,
    /// Frame label: `state <n>`, or `state error` for the error step
    pub label: String,
    /// Program file of the step
    pub program: String,
    /// Line of the step
    pub line: u32,
}

/// Result of a stack query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTrace {
    /// Collected frames, newest first
    pub frames: Vec<StackFrame>,
    /// Total number of frames considered
    pub total: usize,
}

/// A navigation parked while the trace is still being produced
#[derive(Debug, Clone, Copy)]
struct PendingRun {
    reverse: bool,
    stop_event: Option<StopReason>,
}

/// Replay runtime for one debug session
///
/// Owns the step history, the lazily derived scope snapshots, the
/// breakpoint table and the thread registry. All mutation happens from one
/// serialized control flow (the session task); navigation completion is
/// signaled through the outbound event channel, never through a return
/// value, and a caller must not assume ordering between a navigation call
/// returning and its stop event arriving.
pub struct ReplayRuntime {
    history: StepHistory,
    scopes: ScopeTable,
    scope_refs: HashMap<i64, ScopeSet>,
    threads: IndexMap<ThreadId, Thread>,
    breakpoints: HashMap<String, Vec<Breakpoint>>,
    next_breakpoint_id: u64,
    current: i64,
    state: RunState,
    trace_complete: bool,
    pending: Option<PendingRun>,
    verbose: bool,
    events: UnboundedSender<RuntimeEvent>,
}

impl ReplayRuntime {
    /// Create a runtime that reports through `events`
    #[must_use]
    pub fn new(events: UnboundedSender<RuntimeEvent>) -> Self {
        let mut threads = IndexMap::new();
        threads.insert(MAIN_THREAD, Thread::main());
        Self {
            history: StepHistory::new(),
            scopes: ScopeTable::new(),
            scope_refs: HashMap::new(),
            threads,
            breakpoints: HashMap::new(),
            next_breakpoint_id: 1,
            current: -1,
            state: RunState::Idle,
            trace_complete: false,
            pending: None,
            verbose: false,
            events,
        }
    }

    /// Begin replaying
    ///
    /// Seeds the root scope snapshot, then either stops at the first step
    /// (`stop_on_entry`) or continues until a breakpoint, an error or the
    /// end of the trace. Steps are handed in afterwards via
    /// [`accept`](Self::accept); a navigation that outruns the history
    /// parks until they arrive.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn start(&mut self, stop_on_entry: bool, verbose: bool) {
        assert!(
            self.state == RunState::Idle,
            "replay runtime started twice"
        );
        self.verbose = verbose;
        let root = self.scopes.allocate_empty_set();
        self.scope_refs.insert(-1, root);
        self.state = RunState::Running;
        if stop_on_entry {
            self.navigate(false, Some(StopReason::Entry));
        } else {
            self.continue_run(false);
        }
    }

    /// Append a newly parsed trace item, resuming a parked navigation
    pub fn accept(&mut self, item: TraceItem) {
        self.history.push(item);
        self.resume_pending();
    }

    /// Record that the trace has ended, resuming a parked navigation
    pub fn finish_trace(&mut self) {
        self.trace_complete = true;
        self.resume_pending();
    }

    /// Continue until a breakpoint, an error, or the end of history
    pub fn continue_run(&mut self, reverse: bool) {
        self.navigate(reverse, None);
    }

    /// Stop at the very next processed step
    pub fn step(&mut self, reverse: bool) {
        self.navigate(reverse, Some(StopReason::Step));
    }

    /// Register a breakpoint; returns it verified
    ///
    /// Verification is optimistic: the line is not checked against the
    /// trace. Multiple breakpoints may share a location; each gets its own
    /// id and a breakpoint-changed notification.
    pub fn set_breakpoint(&mut self, path: &str, line: u32) -> Breakpoint {
        let mut bp = Breakpoint::new(self.next_breakpoint_id, path, line);
        self.next_breakpoint_id += 1;
        bp.verified = true;
        self.breakpoints
            .entry(path.to_string())
            .or_default()
            .push(bp.clone());
        self.emit(RuntimeEvent::BreakpointChanged { id: bp.id, verified: true });
        bp
    }

    /// Remove every breakpoint registered for `path`
    pub fn clear_breakpoints(&mut self, path: &str) {
        self.breakpoints.remove(path);
    }

    /// Threads discovered so far, the synthetic main thread first
    #[must_use]
    pub fn threads(&self) -> Vec<Thread> {
        self.threads.values().cloned().collect()
    }

    /// Walk backward from the current position collecting synthetic frames
    ///
    /// Only steps whose process matches `thread_id` are counted; the main
    /// thread id selects all steps, and the error step always counts.
    /// Frames with ordinals in `[start_frame, end_frame)` are returned.
    #[must_use]
    pub fn stack_trace(&self, start_frame: usize, end_frame: usize, thread_id: ThreadId) -> StackTrace {
        let mut frames = Vec::new();
        let mut level = 0usize;
        let mut st = self.current;
        while st >= 0 && level < end_frame {
            let Some(item) = self.history.get(st as usize) else {
                break;
            };
            let counted =
                item.is_error() || thread_id == MAIN_THREAD || item.proc() == Some(thread_id);
            if counted {
                level += 1;
                if level > start_frame {
                    let label = match item {
                        TraceItem::Step(step) => format!("state {}", step.state),
                        TraceItem::Error(_) => "state error".to_string(),
                    };
                    frames.push(StackFrame {
                        id: st,
                        label,
                        program: item.program().to_string(),
                        line: item.line(),
                    });
                }
            }
            st -= 1;
        }
        StackTrace { total: frames.len(), frames }
    }

    /// The three scope handles recorded for the step at `frame_id`
    ///
    /// # Panics
    ///
    /// Panics if no snapshot was ever derived for that index; frame ids
    /// only come from stack queries, so an unknown one is gateway misuse.
    #[must_use]
    pub fn scopes(&self, frame_id: i64) -> ScopeSet {
        *self
            .scope_refs
            .get(&frame_id)
            .unwrap_or_else(|| panic!("no scope snapshot recorded for frame {}", frame_id))
    }

    /// Materialize the scope behind `handle`
    ///
    /// # Panics
    ///
    /// Panics if the handle was never allocated.
    #[must_use]
    pub fn variables(&self, handle: VarScopeHandle) -> Vec<Variable> {
        self.scopes.variables(handle)
    }

    /// Current position in the history (`-1` before the first stop)
    #[must_use]
    pub fn position(&self) -> i64 {
        self.current
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    // --- navigation ---

    /// Central navigation algorithm
    ///
    /// Scans strictly beyond the current position, deriving snapshots and
    /// registering threads on first forward visit, until the stop predicate
    /// holds. A forward scan that exhausts an incomplete trace parks and is
    /// resumed transparently when input arrives; a reverse scan that
    /// reaches the beginning clamps to index 0.
    fn navigate(&mut self, reverse: bool, stop_event: Option<StopReason>) {
        match self.state {
            RunState::Idle => panic!("navigation requested before start"),
            RunState::Ended => {
                tracing::debug!("navigation ignored: session already ended");
                return;
            }
            RunState::Running | RunState::Stopped => {}
        }
        self.state = RunState::Running;
        if reverse {
            self.run_reverse(stop_event);
        } else {
            self.run_forward(stop_event);
        }
    }

    fn run_forward(&mut self, stop_event: Option<StopReason>) {
        let mut sp = self.current + 1;
        while let Some(item) = self.history.get(sp as usize).cloned() {
            if let TraceItem::Step(step) = &item {
                if !self.threads.contains_key(&step.proc) {
                    self.threads
                        .insert(step.proc, Thread::for_proc(step.proc, &step.proc_name));
                }
            }
            if !self.scope_refs.contains_key(&sp) {
                self.derive_snapshot(sp, &item);
            }
            if self.check_stop(&item, stop_event, false) {
                self.current = sp;
                self.state = RunState::Stopped;
                return;
            }
            sp += 1;
        }

        if self.trace_complete {
            self.emit(RuntimeEvent::Ended);
            self.state = RunState::Ended;
            return;
        }

        // trace still being produced: park and resume on arrival
        if self
            .pending
            .replace(PendingRun { reverse: false, stop_event })
            .is_some()
        {
            tracing::debug!("parked navigation overwritten by a newer request");
        }
    }

    fn run_reverse(&mut self, stop_event: Option<StopReason>) {
        let mut sp = self.current - 1;
        while sp >= 0 {
            let Some(item) = self.history.get(sp as usize).cloned() else {
                break;
            };
            if self.check_stop(&item, stop_event, true) {
                self.current = sp;
                self.state = RunState::Stopped;
                return;
            }
            sp -= 1;
        }

        // cannot precede the first recorded step
        self.current = if self.history.is_empty() { -1 } else { 0 };
        self.state = RunState::Stopped;
        self.emit(RuntimeEvent::Stopped { reason: StopReason::Entry, thread_id: MAIN_THREAD });
    }

    fn resume_pending(&mut self) {
        if let Some(run) = self.pending.take() {
            self.navigate(run.reverse, run.stop_event);
        }
    }

    /// Derive the scope snapshot for the step at `sp`
    ///
    /// Global and queue maps are cloned from the immediately preceding
    /// snapshot; the local map comes from the nearest earlier step of the
    /// same process, since interleaved processes have disjoint local state.
    /// Error steps apply no updates and carry their predecessor's maps
    /// forward untouched.
    fn derive_snapshot(&mut self, sp: i64, item: &TraceItem) {
        let prev = self.scope_refs[&(sp - 1)];

        let local_source = match item {
            TraceItem::Step(step) => {
                let mut last = sp - 1;
                while last >= 0
                    && self
                        .history
                        .get(last as usize)
                        .and_then(TraceItem::proc)
                        != Some(step.proc)
                {
                    last -= 1;
                }
                self.scope_refs[&last].local
            }
            TraceItem::Error(_) => prev.local,
        };

        let mut local = self.scopes.vars(local_source).clone();
        let mut global = self.scopes.vars(prev.global).clone();
        let mut queues = self.scopes.vars(prev.queues).clone();

        if let TraceItem::Step(step) = item {
            for (name, value) in &step.updates.local {
                local.insert(name.clone(), value.to_string());
            }
            for (name, value) in &step.updates.global {
                global.insert(name.clone(), value.to_string());
            }
            for (name, value) in &step.updates.queues {
                queues.insert(name.clone(), value.to_string());
            }
        }

        let set = ScopeSet {
            local: self.scopes.allocate(local),
            global: self.scopes.allocate(global),
            queues: self.scopes.allocate(queues),
        };
        self.scope_refs.insert(sp, set);
    }

    /// Evaluate the stop predicate for one scanned item, emitting events
    ///
    /// Returns true if navigation must stop here. The error case is skipped
    /// on reverse scans: an error step is always the final item of a
    /// finished trace and never appears mid-history.
    fn check_stop(&mut self, item: &TraceItem, stop_event: Option<StopReason>, reverse: bool) -> bool {
        if self.verbose || item.is_error() {
            self.emit(RuntimeEvent::Output {
                text: item.raw_output().to_string(),
                program: item.program().to_string(),
                line: item.line(),
                column: 0,
            });
        }

        let step = match item {
            TraceItem::Error(_) => {
                if reverse {
                    return false;
                }
                self.emit(RuntimeEvent::Stopped {
                    reason: StopReason::Exception,
                    thread_id: MAIN_THREAD,
                });
                return true;
            }
            TraceItem::Step(step) => step,
        };

        let mut hit = None;
        if let Some(bps) = self.breakpoints.get_mut(&step.program) {
            if let Some(bp) = bps.iter_mut().find(|bp| bp.line == step.line) {
                hit = Some((bp.id, bp.verified));
                bp.verified = true;
            }
        }
        if let Some((id, was_verified)) = hit {
            self.emit(RuntimeEvent::Stopped {
                reason: StopReason::Breakpoint,
                thread_id: step.proc,
            });
            if !was_verified {
                self.emit(RuntimeEvent::BreakpointChanged { id, verified: true });
            }
            return true;
        }

        if let Some(reason) = stop_event {
            self.emit(RuntimeEvent::Stopped { reason, thread_id: step.proc });
            return true;
        }

        false
    }

    fn emit(&self, event: RuntimeEvent) {
        // receiver gone means the session is tearing down
        let _ = self.events.send(event);
    }
}
