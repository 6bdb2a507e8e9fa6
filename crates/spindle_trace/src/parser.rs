//! Incremental parser turning raw simulator bytes into trace items.

use bytes::BytesMut;
use once_cell::sync::Lazy;
use regex::Regex;
use spindle_core::{ErrorStep, Step, StepUpdates, TraceItem, VarValue};

/// Step header: `<seq>: proc <pid> (<name>:<id>) <program>:<line> (state <n>)`
static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]+):\s+proc\s+([0-9]+)\s+\((.*):([0-9]+)\)\s+(.*):([0-9]+)\s+\(state\s+([0-9]+)\)")
        .expect("header pattern compiles")
});

/// Queue update: `queue <n> (<name>): [<items>]...`
static QUEUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"queue\s+([0-9]+)\s+\((.*)\):\s+((\[.*?\])*)").expect("queue pattern compiles")
});

/// Assignment update: `<name> = <value>`
static ASSIGN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(.*)\s+=\s+(.*)").expect("assignment pattern compiles"));

/// Local-variable naming convention: `<proc>(<id>):<name>`
static LOCAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*.*\([0-9]+\):(.*)").expect("local pattern compiles"));

/// Error location: `spin: <program>:<line>`
static ERROR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"spin:\s+(.*):([0-9]+)").expect("error pattern compiles"));

/// Marker line that ends a well-formed trace
const END_MARKER: &str = "-------------";

/// Incremental, line-oriented trace parser
///
/// Bytes go in through [`feed`](Self::feed) in arbitrarily sized chunks;
/// completed [`TraceItem`]s come back out. A trailing partial line is
/// buffered until its `\n` arrives, so output is independent of chunk
/// boundaries. The parser closes itself on the end-of-trace marker or when
/// a reported error ends the trace, and ignores all input afterwards. One
/// parser instance consumes exactly one trace; it is not restartable.
#[derive(Debug, Default)]
pub struct TraceParser {
    buf: BytesMut,
    open: Option<TraceItem>,
    closed: bool,
}

impl TraceParser {
    /// Create a parser for a fresh trace
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the parser has seen the end of its trace
    ///
    /// Set by the end-of-trace marker, by an error step emitted through the
    /// early-close path, or by [`finish`](Self::finish).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Consume a chunk of simulator output, returning items it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<TraceItem> {
        let mut out = Vec::new();
        if self.closed {
            return out;
        }
        self.buf.extend_from_slice(chunk);
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes = self.buf.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).into_owned();
            self.process_line(&line, true, &mut out);
            if self.closed {
                break;
            }
        }
        out
    }

    /// Signal end of input: complete the buffered tail and flush
    ///
    /// Stream closure terminates the final line, so the buffered tail is
    /// processed as a line of its own; an open step that never saw its
    /// blank-line terminator is flushed as the last item. Idempotent.
    pub fn finish(&mut self) -> Vec<TraceItem> {
        let mut out = Vec::new();
        if self.closed {
            return out;
        }
        if !self.buf.is_empty() {
            let tail = self.buf.split();
            let line = String::from_utf8_lossy(&tail).into_owned();
            self.process_line(&line, false, &mut out);
        }
        if let Some(item) = self.open.take() {
            out.push(item);
        }
        self.closed = true;
        out
    }

    fn process_line(&mut self, line: &str, terminated: bool, out: &mut Vec<TraceItem>) {
        match self.open.take() {
            Some(mut item) => {
                if line.trim().is_empty() {
                    // blank line terminates the open item
                    out.push(item);
                } else if line.trim_start().starts_with("spin:") {
                    // diagnostic continuation: raw output only
                    append_raw(&mut item, line, terminated);
                    self.open = Some(item);
                } else if let TraceItem::Error(err) = item {
                    // an error ends the trace on the next unrelated line
                    out.push(TraceItem::Error(err));
                    self.closed = true;
                } else {
                    let TraceItem::Step(ref mut step) = item else { unreachable!() };
                    step.raw_output.push_str(line);
                    if terminated {
                        step.raw_output.push('\n');
                    }
                    apply_update_line(&mut step.updates, line);
                    self.open = Some(item);
                }
            }
            None => {
                let trimmed = line.trim();
                if trimmed == END_MARKER {
                    self.closed = true;
                } else if trimmed.starts_with("spin:") {
                    if line.to_lowercase().contains("error") {
                        if let Some(err) = parse_error_marker(line, terminated) {
                            self.open = Some(TraceItem::Error(err));
                        }
                    }
                } else if let Some(step) = parse_header(line, terminated) {
                    self.open = Some(TraceItem::Step(step));
                } else if !trimmed.is_empty() {
                    tracing::debug!("dropping unmatched trace line: {}", line);
                }
            }
        }
    }
}

fn append_raw(item: &mut TraceItem, line: &str, terminated: bool) {
    let raw = match item {
        TraceItem::Step(step) => &mut step.raw_output,
        TraceItem::Error(err) => &mut err.raw_output,
    };
    raw.push_str(line);
    if terminated {
        raw.push('\n');
    }
}

fn parse_header(line: &str, terminated: bool) -> Option<Step> {
    let caps = HEADER_RE.captures(line)?;
    let mut raw_output = line.to_string();
    if terminated {
        raw_output.push('\n');
    }
    Some(Step {
        seq: caps[1].parse().ok()?,
        proc: caps[2].parse().ok()?,
        proc_name: caps[3].to_string(),
        proc_id: caps[4].parse().ok()?,
        program: caps[5].to_string(),
        line: caps[6].parse().ok()?,
        state: caps[7].parse().ok()?,
        updates: StepUpdates::new(),
        raw_output,
    })
}

fn parse_error_marker(line: &str, terminated: bool) -> Option<ErrorStep> {
    let caps = ERROR_RE.captures(line)?;
    let mut raw_output = line.to_string();
    if terminated {
        raw_output.push('\n');
    }
    Some(ErrorStep {
        program: caps[1].trim().to_string(),
        line: caps[2].parse().ok()?,
        raw_output,
    })
}

/// Record the structured updates carried by one detail line
fn apply_update_line(updates: &mut StepUpdates, line: &str) {
    if let Some(caps) = QUEUE_RE.captures(line) {
        let values = split_queue_values(&caps[3]);
        updates
            .queues
            .insert(caps[1].to_string(), VarValue::List(values.clone()));
        store_named(updates, &caps[2], VarValue::List(values));
    }

    if let Some(caps) = ASSIGN_RE.captures(line) {
        let value = VarValue::Scalar(caps[2].to_string());
        store_named(updates, &caps[1], value);
    }
}

/// File a value under local or global depending on the naming convention
///
/// Names of the form `<proc>(<id>):<var>` are process-local; the stored key
/// is the segment after the first `:`. Everything else is global.
fn store_named(updates: &mut StepUpdates, name: &str, value: VarValue) {
    if LOCAL_RE.is_match(name) {
        let key = name.split(':').nth(1).unwrap_or("").trim().to_string();
        updates.local.insert(key, value);
    } else {
        updates.global.insert(name.trim().to_string(), value);
    }
}

/// Split `[a][b][c]` into `["a", "b", "c"]`
fn split_queue_values(data: &str) -> Vec<String> {
    data.split(']')
        .filter(|part| !part.is_empty())
        .map(|part| part.strip_prefix('[').unwrap_or(part).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "  1:\tproc  0 (test:1) src/tests/data/test.pml:5 (state 1)\t[flag = (1-flag)]
\t\tflag = 1

  2:\tproc  0 (test:1) src/tests/data/test.pml:6 (state 2)\t[x = (x+1)]
\t\ttest(1):x = 1

  3:\tproc  1 (test:2) src/tests/data/test.pml:5 (state 1)\t[flag = (1-flag)]
\t\tflag = 0

  4:\tproc  1 (test:2) src/tests/data/test.pml:9 (state 3)\t[ch!1]
\t\tqueue 1 (ch): [1]

  5:\tproc  0 (test:1) src/tests/data/test.pml:10 (state 4)\t[ch!2]
\t\tqueue 1 (ch): [1][2]

  6:\tproc  1 (test:2) src/tests/data/test.pml:6 (state 2)\t[x = (x+1)]
\t\ttest(2):x = 1

  7:\tproc  0 (test:1) src/tests/data/test.pml:11 (state 5)\t[box!2]
\t\tqueue 2 (test(1):box): [2]

  8:\tproc  0 (test:1) src/tests/data/test.pml:6 (state 2)\t[x = (x+1)]
\t\ttest(1):x = 2

  9:\tproc  1 (test:2) src/tests/data/test.pml:7 (state 6)\t[flag = 0]
\t\tflag = 0

 10:\tproc  0 (test:1) src/tests/data/test.pml:12 (state 7)\t[done = 1]
\t\tdone = 1

-------------
final state:
#processes: 2
";

    const SAMPLE_WITH_ERROR: &str = "\
  1:\tproc  0 (test:1) tests/data/test.pml:5 (state 1)\t[flag = (1-flag)]
\t\tflag = 1

  2:\tproc  0 (test:1) tests/data/test.pml:17 (state 2)\t[ncrit = 1]
\t\tncrit = 1

spin: tests/data/test.pml:18, Error: assertion violated
spin: text of failed assertion: assert((ncrit==0))
#processes: 2
";

    fn parse_all(input: &str) -> Vec<TraceItem> {
        let mut parser = TraceParser::new();
        let mut items = parser.feed(input.as_bytes());
        items.extend(parser.finish());
        items
    }

    #[test]
    fn test_parse_first_step() {
        let items = parse_all(SAMPLE);
        let TraceItem::Step(first) = &items[0] else {
            panic!("first item should be a step");
        };
        assert_eq!(first.seq, 1);
        assert_eq!(first.proc, 0);
        assert_eq!(first.proc_name, "test");
        assert_eq!(first.proc_id, 1);
        assert_eq!(first.program, "src/tests/data/test.pml");
        assert_eq!(first.line, 5);
        assert_eq!(first.state, 1);
        assert_eq!(
            first.updates.global.get("flag"),
            Some(&VarValue::scalar("1"))
        );
        assert!(first.updates.local.is_empty());
        assert!(first.updates.queues.is_empty());
        assert_eq!(
            first.raw_output,
            "  1:\tproc  0 (test:1) src/tests/data/test.pml:5 (state 1)\t[flag = (1-flag)]\n\t\tflag = 1\n"
        );
    }

    #[test]
    fn test_parse_all_steps() {
        let items = parse_all(SAMPLE);
        assert_eq!(items.len(), 10);
        assert!(items.iter().all(|item| !item.is_error()));
    }

    #[test]
    fn test_local_and_global_classification() {
        let items = parse_all(SAMPLE);
        let TraceItem::Step(second) = &items[1] else {
            panic!("second item should be a step");
        };
        // `test(1):x` follows the local naming convention
        assert_eq!(second.updates.local.get("x"), Some(&VarValue::scalar("1")));
        assert!(second.updates.global.is_empty());
    }

    #[test]
    fn test_queue_updates() {
        let items = parse_all(SAMPLE);

        // global queue: recorded under the queue number and the global name
        let TraceItem::Step(fourth) = &items[3] else {
            panic!("fourth item should be a step");
        };
        let expected = VarValue::list(vec!["1".to_string()]);
        assert_eq!(fourth.updates.queues.get("1"), Some(&expected));
        assert_eq!(fourth.updates.global.get("ch"), Some(&expected));

        // multi-element queue contents split on the bracket groups
        let TraceItem::Step(fifth) = &items[4] else {
            panic!("fifth item should be a step");
        };
        let two = VarValue::list(vec!["1".to_string(), "2".to_string()]);
        assert_eq!(fifth.updates.queues.get("1"), Some(&two));
        assert_eq!(fifth.updates.global.get("ch"), Some(&two));

        // local queue: `test(1):box` resolves to local key `box`
        let TraceItem::Step(seventh) = &items[6] else {
            panic!("seventh item should be a step");
        };
        let boxed = VarValue::list(vec!["2".to_string()]);
        assert_eq!(seventh.updates.queues.get("2"), Some(&boxed));
        assert_eq!(seventh.updates.local.get("box"), Some(&boxed));
    }

    #[test]
    fn test_emptied_queue_line() {
        let mut parser = TraceParser::new();
        let input = "  1:\tproc  0 (test:1) model.pml:5 (state 1)\t[ch?v]\n\t\tqueue 1 (ch): \n\n";
        let items = parser.feed(input.as_bytes());
        assert_eq!(items.len(), 1);
        let TraceItem::Step(step) = &items[0] else {
            panic!("expected a step");
        };
        assert_eq!(
            step.updates.queues.get("1"),
            Some(&VarValue::list(Vec::new()))
        );
    }

    #[test]
    fn test_error_trace_last_item() {
        let items = parse_all(SAMPLE_WITH_ERROR);
        assert_eq!(items.len(), 3);
        let TraceItem::Error(err) = &items[2] else {
            panic!("last item should be the error step");
        };
        assert_eq!(err.program, "tests/data/test.pml");
        assert_eq!(err.line, 18);
        assert_eq!(
            err.raw_output,
            "spin: tests/data/test.pml:18, Error: assertion violated\nspin: text of failed assertion: assert((ncrit==0))\n"
        );
    }

    #[test]
    fn test_error_closes_stream() {
        let mut parser = TraceParser::new();
        let mut items = parser.feed(SAMPLE_WITH_ERROR.as_bytes());
        assert!(parser.is_closed());
        // input after the close point is ignored
        items.extend(parser.feed(b"  3:\tproc  0 (test:1) tests/data/test.pml:5 (state 1)\tx\n"));
        items.extend(parser.finish());
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_terminal_marker_closes() {
        let mut parser = TraceParser::new();
        let items = parser.feed(SAMPLE.as_bytes());
        assert_eq!(items.len(), 10);
        assert!(parser.is_closed());
    }

    #[test]
    fn test_unflushed_step_emitted_on_finish() {
        let mut parser = TraceParser::new();
        let header = "  1:\tproc  0 (test:1) model.pml:5 (state 1)\t[flag = (1-flag)]\n";
        let items = parser.feed(header.as_bytes());
        assert!(items.is_empty());
        let items = parser.finish();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].line(), 5);
        assert!(parser.is_closed());
    }

    #[test]
    fn test_finish_completes_partial_tail() {
        let mut parser = TraceParser::new();
        let mut items = parser.feed(b"  1:\tproc  0 (test:1) model.pml:5 (state 1)\t[s]\n");
        // detail line with no trailing newline, completed by stream closure
        items.extend(parser.feed(b"\t\tflag = 1"));
        items.extend(parser.finish());
        assert_eq!(items.len(), 1);
        let TraceItem::Step(step) = &items[0] else {
            panic!("expected a step");
        };
        assert_eq!(step.updates.global.get("flag"), Some(&VarValue::scalar("1")));
        assert!(step.raw_output.ends_with("\t\tflag = 1"));
    }

    #[test]
    fn test_finish_idempotent() {
        let mut parser = TraceParser::new();
        parser.feed(b"  1:\tproc  0 (test:1) model.pml:5 (state 1)\t[s]\n");
        assert_eq!(parser.finish().len(), 1);
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_junk_lines_dropped() {
        let mut parser = TraceParser::new();
        let mut items = parser.feed(b"starting simulation\nno header here\n");
        items.extend(parser.feed(SAMPLE.as_bytes()));
        items.extend(parser.finish());
        assert_eq!(items.len(), 10);
    }

    #[test]
    fn test_spin_continuation_raw_only() {
        let mut parser = TraceParser::new();
        let input = "  1:\tproc  0 (test:1) model.pml:5 (state 1)\t[s]\nspin: reached step limit\n\n";
        let items = parser.feed(input.as_bytes());
        assert_eq!(items.len(), 1);
        let TraceItem::Step(step) = &items[0] else {
            panic!("expected a step");
        };
        assert!(step.updates.is_empty());
        assert!(step.raw_output.contains("spin: reached step limit\n"));
    }

    #[test]
    fn test_error_step_closed_by_blank_line() {
        let mut parser = TraceParser::new();
        let input = "spin: model.pml:9, Error: assertion violated\n\n";
        let items = parser.feed(input.as_bytes());
        assert_eq!(items.len(), 1);
        assert!(items[0].is_error());
        // a blank terminator does not close the stream
        assert!(!parser.is_closed());
    }

    #[test]
    fn test_chunk_boundary_independence_bytewise() {
        let whole = parse_all(SAMPLE);

        let mut parser = TraceParser::new();
        let mut items = Vec::new();
        for byte in SAMPLE.as_bytes() {
            items.extend(parser.feed(std::slice::from_ref(byte)));
        }
        items.extend(parser.finish());

        assert_eq!(items, whole);
    }

    proptest::proptest! {
        #[test]
        fn prop_chunk_independence(splits in proptest::collection::vec(0..SAMPLE_WITH_ERROR.len(), 0..8)) {
            let whole = parse_all(SAMPLE_WITH_ERROR);

            let mut cuts = splits;
            cuts.push(0);
            cuts.push(SAMPLE_WITH_ERROR.len());
            cuts.sort_unstable();

            let bytes = SAMPLE_WITH_ERROR.as_bytes();
            let mut parser = TraceParser::new();
            let mut items = Vec::new();
            for window in cuts.windows(2) {
                items.extend(parser.feed(&bytes[window[0]..window[1]]));
            }
            items.extend(parser.finish());

            prop_assert_eq!(items, whole);
        }
    }
}
