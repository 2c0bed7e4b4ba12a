//! Plain-text rendering of traces and run summaries.

use lts_explore::{FindingKind, Summary, Termination, Trace, TraceWriter};
use std::fmt::{self, Write as _};
use std::fs;
use std::io::{self, Write as _};
use std::path::PathBuf;

/// One line per state: the initial state, then `n: action -> state`.
pub fn render_trace<S: fmt::Debug, A: fmt::Display>(trace: &Trace<S, A>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "initial: {:?}", trace.initial());
    for (i, step) in trace.steps().iter().enumerate() {
        let _ = writeln!(out, "{}: {} -> {:?}", i + 1, step.action, step.state);
    }
    out
}

/// Writes each trace to its own file in a directory.
pub struct TextTraceWriter {
    dir: PathBuf,
}

impl TextTraceWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl<S: fmt::Debug, A: fmt::Display> TraceWriter<S, A> for TextTraceWriter {
    fn write(&mut self, trace: &Trace<S, A>, name: &str) -> io::Result<()> {
        let mut file = fs::File::create(self.dir.join(name))?;
        file.write_all(render_trace(trace).as_bytes())?;
        file.flush()
    }
}

pub fn result_label(summary: &Summary) -> &'static str {
    if summary.deadlocks().next().is_some() {
        return "DEADLOCK";
    }
    if !summary.findings.is_empty() {
        return "FINDINGS";
    }
    match summary.termination {
        Termination::Completed => "OK",
        Termination::Deadlock => "STOPPED AT DEADLOCK",
        Termination::StateLimit => "STATE LIMIT REACHED",
        Termination::TraceLimit => "TRACE LIMIT REACHED",
        Termination::FrontierLimit => "FRONTIER LIMIT REACHED",
        Termination::MemoryLimit => "MEMORY LIMIT REACHED",
        Termination::Cancelled => "CANCELLED",
    }
}

pub fn render_summary(summary: &Summary, seconds: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Result: {}", result_label(summary));
    let _ = writeln!(out, "  States: {}", summary.states);
    let _ = writeln!(out, "  Transitions: {}", summary.transitions);
    if summary.levels > 0 {
        let _ = writeln!(out, "  Levels: {}", summary.levels);
    }
    let _ = writeln!(out, "  Explored: {}", summary.explored);
    let _ = writeln!(out, "  Time: {:.2}s", seconds);

    for finding in &summary.findings {
        let what = match &finding.kind {
            FindingKind::Deadlock => "deadlock".to_string(),
            FindingKind::Divergence => "divergence".to_string(),
            FindingKind::Action(name) => format!("action {name}"),
        };
        match &finding.trace {
            Some(file) => {
                let _ = writeln!(out, "  Found {} at state {} (trace {})", what, finding.state, file);
            }
            None => {
                let _ = writeln!(out, "  Found {} at state {}", what, finding.state);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lts_explore::{Finding, Label, StateIndex};

    #[test]
    fn test_render_trace() {
        let mut trace = Trace::new(0u32);
        trace.push(Label::new("a"), 1);
        trace.push(Label::new("draw").with_priority(2), 2);
        assert_eq!(render_trace(&trace), "initial: 0\n1: a -> 1\n2: draw(2) -> 2\n");
    }

    #[test]
    fn test_summary_label() {
        let mut summary = Summary {
            states: 2,
            transitions: 1,
            levels: 1,
            explored: 2,
            termination: Termination::Completed,
            findings: Vec::new(),
            traces: Vec::new(),
        };
        assert_eq!(result_label(&summary), "OK");

        summary.termination = Termination::Deadlock;
        assert_eq!(result_label(&summary), "STOPPED AT DEADLOCK");
        summary.termination = Termination::Completed;

        summary.findings.push(Finding {
            kind: FindingKind::Deadlock,
            state: StateIndex::new(1),
            trace: Some("dlk_0.trc".to_string()),
        });
        assert_eq!(result_label(&summary), "DEADLOCK");
        assert!(render_summary(&summary, 0.0).contains("Found deadlock at state 1 (trace dlk_0.trc)"));
    }

    #[test]
    fn test_text_writer_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = TextTraceWriter::new(dir.path());
        let trace: Trace<u32, Label> = Trace::new(7);
        writer.write(&trace, "x.trc").unwrap();
        let text = fs::read_to_string(dir.path().join("x.trc")).unwrap();
        assert_eq!(text, "initial: 7\n");
    }
}
