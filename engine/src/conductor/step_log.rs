//! Agent step log
//!
//! Every agent call leaves one record: who answered, for which run, at which
//! iteration, and what came back. This transcript is separate from the
//! diagnostic `tracing` output and is written as JSON lines, one file per run.
//!
//! Recording never blocks and never fails the run. [`JsonlStepLog`] hands
//! records to a background task over an unbounded channel; write errors are
//! reported through `tracing` and otherwise ignored.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

/// One agent call as seen by the step log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// RFC 3339 time the record was created
    pub timestamp: String,
    pub run_id: String,
    /// `generator_1`..`generator_3`, `critic`, `editor` or `prompter`
    pub agent: String,
    pub topic: String,
    pub iteration: u32,
    pub response: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl StepRecord {
    pub fn new(
        run_id: impl Into<String>,
        agent: impl ToString,
        topic: impl Into<String>,
        iteration: u32,
        response: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            run_id: run_id.into(),
            agent: agent.to_string(),
            topic: topic.into(),
            iteration,
            response: response.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Append-only sink for step records
pub trait StepLog: Send + Sync {
    /// Record one step. Must return promptly and never fail the caller.
    fn record(&self, record: StepRecord);
}

/// Discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStepLog;

impl StepLog for NullStepLog {
    fn record(&self, _record: StepRecord) {}
}

/// Keeps records in memory, for tests and inspection
#[derive(Debug, Default)]
pub struct MemoryStepLog {
    records: Mutex<Vec<StepRecord>>,
}

impl MemoryStepLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in arrival order
    pub fn records(&self) -> Vec<StepRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records of one agent, in arrival order
    pub fn records_for(&self, agent: &str) -> Vec<StepRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.agent == agent)
            .collect()
    }
}

impl StepLog for MemoryStepLog {
    fn record(&self, record: StepRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

enum Command {
    Write(StepRecord),
    Flush(oneshot::Sender<()>),
}

/// Writes `<dir>/<run_id>.jsonl` from a background task
#[derive(Debug)]
pub struct JsonlStepLog {
    dir: PathBuf,
    sender: mpsc::UnboundedSender<Command>,
}

impl JsonlStepLog {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(dir.clone(), receiver));
        Self { dir, sender }
    }

    /// Directory the log files are written to
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Path of the log file for a run
    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", run_id))
    }

    /// Wait until every record sent so far has been written
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Command::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

impl StepLog for JsonlStepLog {
    fn record(&self, record: StepRecord) {
        if self.sender.send(Command::Write(record)).is_err() {
            tracing::warn!("Step log writer has stopped; record dropped");
        }
    }
}

async fn write_loop(dir: PathBuf, mut receiver: mpsc::UnboundedReceiver<Command>) {
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        tracing::warn!("Failed to create step log directory {:?}: {}", dir, e);
    }

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Write(record) => {
                if let Err(e) = append(&dir, &record).await {
                    tracing::warn!("Failed to write step log for run {}: {}", record.run_id, e);
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn append(dir: &std::path::Path, record: &StepRecord) -> std::io::Result<()> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let path = dir.join(format!("{}.jsonl", record.run_id));
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_log_keeps_order() {
        let log = MemoryStepLog::new();
        log.record(StepRecord::new("run", "generator_1", "t", 1, "one"));
        log.record(StepRecord::new("run", "critic", "t", 1, "two"));

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].response, "one");
        assert_eq!(log.records_for("critic").len(), 1);
    }

    #[test]
    fn test_record_serializes_expected_fields() {
        let record = StepRecord::new("run-1", "editor", "Rust", 2, "final")
            .with_metadata(serde_json::json!({"drafts": 3}));
        let json = serde_json::to_value(&record).unwrap();

        for field in [
            "timestamp",
            "run_id",
            "agent",
            "topic",
            "iteration",
            "response",
            "metadata",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["metadata"]["drafts"], 3);
    }

    #[tokio::test]
    async fn test_jsonl_log_appends_per_run() {
        let dir = TempDir::new().unwrap();
        let log = JsonlStepLog::spawn(dir.path().join("logs"));

        log.record(StepRecord::new("run-a", "generator_1", "t", 1, "draft"));
        log.record(StepRecord::new("run-a", "critic", "t", 1, "{}"));
        log.record(StepRecord::new("run-b", "editor", "t", 1, "doc"));
        log.flush().await;

        let contents = std::fs::read_to_string(log.path_for("run-a")).unwrap();
        let lines: Vec<StepRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].agent, "generator_1");
        assert_eq!(lines[1].agent, "critic");

        assert!(log.path_for("run-b").exists());
    }
}
