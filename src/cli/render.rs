//! Terminal rendering of turn events
//!
//! Answer tokens go to stdout as they arrive; status lines, citations and
//! errors go to stderr so the answer can be piped on its own.

use colored::Colorize;
use std::io::Write;

use crate::cli::Verbosity;
use crate::types::{Event, SourceRef};

pub struct EventPrinter {
    verbosity: Verbosity,
    /// Answer text started on the current line
    mid_answer: bool,
}

impl EventPrinter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            mid_answer: false,
        }
    }

    /// Status line for a stage event, if this verbosity shows it
    pub fn status_line(&self, event: &Event) -> Option<String> {
        let Event::Status { stage, detail } = event else {
            return None;
        };
        if !self.verbosity.show_progress() {
            return None;
        }
        match (detail, self.verbosity.show_events()) {
            (Some(detail), true) => Some(format!("[{}] {}", stage.display_name(), detail)),
            _ => Some(format!("[{}]", stage.display_name())),
        }
    }

    pub fn citation_lines(citations: &[SourceRef]) -> Vec<String> {
        citations
            .iter()
            .enumerate()
            .map(|(i, source)| format!("[{}] {} ({})", i + 1, source.label, source.document_id))
            .collect()
    }

    pub fn print(&mut self, event: &Event) {
        match event {
            Event::Status { .. } => {
                if let Some(line) = self.status_line(event) {
                    eprintln!("{}", line.dimmed());
                }
            }
            Event::Token { text } => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
                self.mid_answer = true;
            }
            Event::Done { citations, .. } => {
                self.end_answer();
                if !citations.is_empty() && self.verbosity.show_progress() {
                    eprintln!();
                    eprintln!("{}", "來源：".cyan().bold());
                    for line in Self::citation_lines(citations) {
                        eprintln!("  {}", line.cyan());
                    }
                }
            }
            Event::Error { message, code } => {
                self.end_answer();
                eprintln!("{} {} ({})", "Error:".red().bold(), message, code.yellow());
            }
        }
    }

    fn end_answer(&mut self) {
        if self.mid_answer {
            println!();
            self.mid_answer = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stage;

    #[test]
    fn test_status_detail_only_when_verbose() {
        let event = Event::Status {
            stage: Stage::ToolExecution,
            detail: Some("search_documents".to_string()),
        };
        assert_eq!(
            EventPrinter::new(Verbosity::Normal).status_line(&event).unwrap(),
            "[Searching]"
        );
        assert_eq!(
            EventPrinter::new(Verbosity::Verbose).status_line(&event).unwrap(),
            "[Searching] search_documents"
        );
        assert!(EventPrinter::new(Verbosity::Quiet).status_line(&event).is_none());
    }

    #[test]
    fn test_citation_lines_are_numbered() {
        let lines = EventPrinter::citation_lines(&[
            SourceRef {
                document_id: "D-1".to_string(),
                label: "道路養護".to_string(),
            },
            SourceRef {
                document_id: "D-2".to_string(),
                label: "橋梁檢測".to_string(),
            },
        ]);
        assert_eq!(lines, vec!["[1] 道路養護 (D-1)", "[2] 橋梁檢測 (D-2)"]);
    }
}
