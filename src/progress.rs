//! Ingestion progress reporting.
//!
//! Renders [`PipelineEvent`]s emitted by the core orchestrator during
//! `lexgraph ingest`, `bulk`, and `revise`. Progress goes to **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;

use lexgraph_core::progress::{NoProgress, PipelineEvent, ProgressReporter};

/// Human-friendly progress on stderr: "ingest austin-str.json  graph  70%".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: PipelineEvent) {
        let line = match &event {
            PipelineEvent::StageStarted { unit, stage } => {
                format!("ingest {}  {}  started\n", unit, stage)
            }
            PipelineEvent::StageProgress {
                unit,
                stage,
                percent,
            } => format!("ingest {}  {}  {}%\n", unit, stage, percent),
            PipelineEvent::StageCompleted { unit, stage, count } => format!(
                "ingest {}  {}  done  {} records\n",
                unit,
                stage,
                format_number(*count as u64)
            ),
            PipelineEvent::StageFailed { unit, stage, error } => {
                format!("ingest {}  {}  FAILED  {}\n", unit, stage, error)
            }
            PipelineEvent::Skipped { unit, reason } => {
                format!("ingest {}  skipped  {}\n", unit, reason)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: PipelineEvent) {
        let obj = match &event {
            PipelineEvent::StageStarted { unit, stage } => serde_json::json!({
                "event": "started",
                "unit": unit,
                "stage": stage
            }),
            PipelineEvent::StageProgress {
                unit,
                stage,
                percent,
            } => serde_json::json!({
                "event": "progress",
                "unit": unit,
                "stage": stage,
                "percent": percent
            }),
            PipelineEvent::StageCompleted { unit, stage, count } => serde_json::json!({
                "event": "completed",
                "unit": unit,
                "stage": stage,
                "count": count
            }),
            PipelineEvent::StageFailed { unit, stage, error } => serde_json::json!({
                "event": "failed",
                "unit": unit,
                "stage": stage,
                "error": error
            }),
            PipelineEvent::Skipped { unit, reason } => serde_json::json!({
                "event": "skipped",
                "unit": unit,
                "reason": reason
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
