use std::io::{self, Write};

use parley_llm::StreamTarget;
use parley_session::{OutcomeKind, Role, Turn, ViewState};

/// Writes streamed answers incrementally and finishes them once their outcome is published.
///
/// View updates are coalesced, so the printer only ever writes the suffix it has not shown
/// yet, and takes the tail of a committed answer from history.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    target: Option<StreamTarget>,
    printed: usize,
}

impl TranscriptPrinter {
    pub fn is_streaming(&self) -> bool {
        self.target.is_some()
    }

    /// Starts tracking a new stream, closing off any answer still open.
    pub fn begin(&mut self, target: StreamTarget, out: &mut impl Write) -> io::Result<()> {
        if self.target.is_some() && self.printed > 0 {
            writeln!(out)?;
        }
        self.target = Some(target);
        self.printed = 0;
        write!(out, "assistant> ")?;
        out.flush()
    }

    pub fn render(&mut self, view: &ViewState, out: &mut impl Write) -> io::Result<()> {
        let Some(target) = self.target else {
            return Ok(());
        };

        if let Some(outcome) = view
            .last_outcome
            .as_ref()
            .filter(|outcome| outcome.target == target)
        {
            match &outcome.kind {
                OutcomeKind::Completed { committed: true } => {
                    if let Some(turn) = view.history.last() {
                        write!(out, "{}", turn.text().get(self.printed..).unwrap_or_default())?;
                    }
                    writeln!(out)?;
                }
                OutcomeKind::Completed { committed: false } => writeln!(out, "(no answer)")?,
                OutcomeKind::Cancelled { .. } => writeln!(out, "\n(cancelled)")?,
                OutcomeKind::Failed { message } => writeln!(out, "\nerror: {message}")?,
            }
            self.target = None;
            self.printed = 0;
            return out.flush();
        }

        if let Some(live) = &view.live_answer
            && let Some(fresh) = live.get(self.printed..)
            && !fresh.is_empty()
        {
            write!(out, "{fresh}")?;
            self.printed = live.len();
            out.flush()?;
        }
        Ok(())
    }
}

pub fn write_history(turns: &[Turn], out: &mut impl Write) -> io::Result<()> {
    if turns.is_empty() {
        return writeln!(out, "(empty conversation)");
    }

    for turn in turns {
        let speaker = match turn.role() {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        writeln!(out, "{speaker}> {}", turn.text())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use parley_llm::{SessionId, StreamGeneration};
    use parley_session::{BufferStatus, History, StreamOutcome};

    use super::*;

    fn target() -> StreamTarget {
        StreamTarget::new(SessionId::new_v4(), StreamGeneration::new(1))
    }

    fn streaming(history: &History, live: &str) -> ViewState {
        ViewState {
            history: history.snapshot(),
            live_answer: Some(live.to_string()),
            status: BufferStatus::Streaming,
            last_outcome: None,
        }
    }

    fn output(buffer: Vec<u8>) -> String {
        String::from_utf8(buffer).expect("utf8 output")
    }

    #[test]
    fn prints_only_new_suffix_and_committed_tail() {
        let target = target();
        let mut history = History::new();
        history.append(Turn::user("Hi"));
        let mut printer = TranscriptPrinter::default();
        let mut out = Vec::new();

        printer.begin(target, &mut out).expect("begin");
        printer.render(&streaming(&history, "He"), &mut out).expect("render");
        printer.render(&streaming(&history, "He"), &mut out).expect("render");

        history.append(Turn::assistant("Hello"));
        let committed = ViewState {
            history: history.snapshot(),
            live_answer: None,
            status: BufferStatus::Idle,
            last_outcome: Some(StreamOutcome {
                target,
                kind: OutcomeKind::Completed { committed: true },
            }),
        };
        printer.render(&committed, &mut out).expect("render");

        assert_eq!(output(out), "assistant> Hello\n");
        assert!(!printer.is_streaming());
    }

    #[test]
    fn failure_is_reported_distinctly() {
        let target = target();
        let history = History::new();
        let mut printer = TranscriptPrinter::default();
        let mut out = Vec::new();

        printer.begin(target, &mut out).expect("begin");
        printer.render(&streaming(&history, "par"), &mut out).expect("render");
        let failed = ViewState {
            history: history.snapshot(),
            live_answer: None,
            status: BufferStatus::Idle,
            last_outcome: Some(StreamOutcome {
                target,
                kind: OutcomeKind::Failed {
                    message: "socket closed".to_string(),
                },
            }),
        };
        printer.render(&failed, &mut out).expect("render");

        assert_eq!(output(out), "assistant> par\nerror: socket closed\n");
    }

    #[test]
    fn outcomes_for_other_streams_are_ignored() {
        let mut printer = TranscriptPrinter::default();
        let mut out = Vec::new();
        printer.begin(target(), &mut out).expect("begin");

        let unrelated = ViewState {
            last_outcome: Some(StreamOutcome {
                target: target(),
                kind: OutcomeKind::Cancelled { superseded: true },
            }),
            ..ViewState::default()
        };
        printer.render(&unrelated, &mut out).expect("render");

        assert!(printer.is_streaming());
        assert_eq!(output(out), "assistant> ");
    }

    #[test]
    fn history_listing_labels_speakers() {
        let mut out = Vec::new();
        write_history(&[Turn::user("q"), Turn::assistant("a")], &mut out).expect("write");
        assert_eq!(output(out), "you> q\nassistant> a\n");

        let mut out = Vec::new();
        write_history(&[], &mut out).expect("write");
        assert_eq!(output(out), "(empty conversation)\n");
    }
}
