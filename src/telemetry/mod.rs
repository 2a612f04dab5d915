//! Telemetry for docseeker
//!
//! Tracing subscriber setup plus a per-turn collector that tallies the
//! event stream for the terminal summary.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

use crate::cli::Verbosity;
use crate::types::{Event, Stage};

/// Filter directive for a verbosity level
pub fn filter_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "warn",
        Verbosity::Verbose => "docseeker=info,warn",
        Verbosity::VeryVerbose => "docseeker=debug,info",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the verbosity flags.
/// Logs go to stderr so streamed answers on stdout stay clean.
pub fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Counters over one turn's events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnStats {
    pub tokens: usize,
    pub answer_chars: usize,
    pub stages: BTreeMap<String, usize>,
    pub tool_calls: usize,
    pub citations: usize,
    pub latency_ms: Option<u64>,
    pub error_code: Option<String>,
}

impl TurnStats {
    pub fn succeeded(&self) -> bool {
        self.latency_ms.is_some() && self.error_code.is_none()
    }

    pub fn replanned(&self) -> bool {
        self.stages.contains_key(stage_key(Stage::Replanning))
    }
}

fn stage_key(stage: Stage) -> &'static str {
    stage.display_name()
}

/// Event collector shared between the stream consumer and the display
#[derive(Clone)]
pub struct TelemetryCollector {
    stats: Arc<Mutex<TurnStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Mutex::new(TurnStats::default())),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, event: &Event) {
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        match event {
            Event::Status { stage, .. } => {
                *stats.stages.entry(stage_key(*stage).to_string()).or_insert(0) += 1;
            }
            Event::Token { text } => {
                stats.tokens += 1;
                stats.answer_chars += text.chars().count();
            }
            Event::Done {
                citations,
                latency_ms,
                tool_calls,
            } => {
                stats.citations = citations.len();
                stats.latency_ms = Some(*latency_ms);
                stats.tool_calls = *tool_calls;
            }
            Event::Error { code, .. } => {
                stats.error_code = Some(code.clone());
            }
        }
    }

    pub fn stats(&self) -> TurnStats {
        self.stats.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal summary after a turn
pub struct TelemetryDisplay {
    collector: TelemetryCollector,
    verbosity: Verbosity,
}

impl TelemetryDisplay {
    pub fn new(collector: TelemetryCollector, verbosity: Verbosity) -> Self {
        Self { collector, verbosity }
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let stats = self.collector.stats();
        let mut lines = vec![
            format!("Latency:     {} ms", stats.latency_ms.unwrap_or_else(|| self.collector.elapsed().as_millis() as u64)),
            format!("Tool calls:  {}", stats.tool_calls),
            format!("Citations:   {}", stats.citations),
            format!("Tokens:      {}", stats.tokens),
        ];
        if stats.replanned() {
            lines.push("Replanned:   yes".to_string());
        }
        if let Some(code) = &stats.error_code {
            lines.push(format!("Error code:  {}", code));
        }
        lines
    }

    pub fn display_summary(&self) {
        if !self.should_show_details() {
            return;
        }
        eprintln!();
        for line in self.summary_lines() {
            eprintln!("{}", line);
        }
    }

    pub fn should_show_details(&self) -> bool {
        self.verbosity.show_events()
    }

    pub fn should_show_status(&self) -> bool {
        self.verbosity.show_progress()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceRef;

    fn status(stage: Stage) -> Event {
        Event::status(stage)
    }

    #[test]
    fn test_collector_tallies_turn() {
        let collector = TelemetryCollector::new();
        for event in [
            status(Stage::Planning),
            status(Stage::ToolExecution),
            status(Stage::Replanning),
            status(Stage::ToolExecution),
            Event::Token { text: "共有".to_string() },
            Event::Token { text: "兩筆".to_string() },
            Event::Done {
                citations: vec![SourceRef {
                    document_id: "d1".to_string(),
                    label: "x".to_string(),
                }],
                latency_ms: 42,
                tool_calls: 3,
            },
        ] {
            collector.record(&event);
        }

        let stats = collector.stats();
        assert_eq!(stats.tokens, 2);
        assert_eq!(stats.answer_chars, 4);
        assert_eq!(stats.stages.get("Searching"), Some(&2));
        assert!(stats.replanned());
        assert!(stats.succeeded());
        assert_eq!(stats.citations, 1);
        assert_eq!(stats.tool_calls, 3);
    }

    #[test]
    fn test_error_turn() {
        let collector = TelemetryCollector::new();
        collector.record(&Event::Error {
            message: "x".to_string(),
            code: "rate_limited".to_string(),
        });
        let stats = collector.stats();
        assert!(!stats.succeeded());

        let display = TelemetryDisplay::new(collector, Verbosity::Verbose);
        assert!(display
            .summary_lines()
            .iter()
            .any(|l| l.contains("rate_limited")));
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(Verbosity::Quiet), "error");
        assert!(filter_directive(Verbosity::VeryVerbose).contains("debug"));
    }
}
