//! Sweep summary persisted next to the run logs as `summary.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::experiment::Experiment;
use crate::harness::RunResult;

/// Classified outcome of a single run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    TimedOut,
    SpawnError,
}

impl RunStatus {
    pub fn classify(result: &RunResult) -> Self {
        if result.spawn_error.is_some() {
            RunStatus::SpawnError
        } else if result.timed_out {
            RunStatus::TimedOut
        } else if result.success {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }
}

/// One iteration of a sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub iteration: u32,
    pub log: PathBuf,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_error: Option<String>,
    pub started_at: String,
    pub duration_secs: f64,
}

impl RunRecord {
    pub fn new(iteration: u32, log: PathBuf, started_at: DateTime<Utc>, result: &RunResult) -> Self {
        Self {
            iteration,
            log,
            status: RunStatus::classify(result),
            exit_code: result.exit_code,
            spawn_error: result.spawn_error.clone(),
            started_at: started_at.to_rfc3339(),
            duration_secs: result.duration.as_millis() as f64 / 1000.0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Metadata for a whole sweep, persisted to `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepSummary {
    pub experiment_id: String,
    /// SHA-256 of the resolved experiment, for telling apart sweeps of edited definitions.
    pub experiment_hash: String,
    pub command: Vec<String>,
    pub iterations: u32,
    pub start_time: String,
    pub end_time: String,
    pub runs: Vec<RunRecord>,
}

impl SweepSummary {
    pub fn failed_runs(&self) -> usize {
        self.runs.iter().filter(|run| !run.succeeded()).count()
    }

    pub fn count(&self, status: RunStatus) -> usize {
        self.runs.iter().filter(|run| run.status == status).count()
    }
}

pub fn experiment_hash(experiment: &Experiment) -> Result<String> {
    let bytes = serde_json::to_vec(experiment).context("serialize experiment")?;
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn write_summary(path: &Path, summary: &SweepSummary) -> Result<()> {
    let contents = serde_json::to_string_pretty(summary).context("serialize summary")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write summary {}", path.display()))?;
    Ok(())
}

pub fn read_summary(path: &Path) -> Result<SweepSummary> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;
    use tempfile::tempdir;

    fn result(success: bool, exit_code: Option<i32>) -> RunResult {
        RunResult {
            exit_code,
            success,
            timed_out: false,
            spawn_error: None,
            duration: Duration::from_millis(1500),
        }
    }

    fn experiment(command: &[&str]) -> Experiment {
        Experiment {
            id: "baseline".to_string(),
            command: command.iter().map(|arg| arg.to_string()).collect(),
            log_dir: PathBuf::from("logs/baseline"),
            iterations: 10,
            timeout_secs: None,
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn classifies_results() {
        assert_eq!(RunStatus::classify(&result(true, Some(0))), RunStatus::Success);
        assert_eq!(RunStatus::classify(&result(false, Some(1))), RunStatus::Failed);

        let mut timed_out = result(false, None);
        timed_out.timed_out = true;
        assert_eq!(RunStatus::classify(&timed_out), RunStatus::TimedOut);

        let mut spawn = result(false, None);
        spawn.spawn_error = Some("not found".to_string());
        assert_eq!(RunStatus::classify(&spawn), RunStatus::SpawnError);
    }

    #[test]
    fn record_converts_duration_to_seconds() {
        let record = RunRecord::new(
            2,
            PathBuf::from("logs/baseline/run_2.log"),
            Utc::now(),
            &result(true, Some(0)),
        );
        assert_eq!(record.duration_secs, 1.5);
        assert!(record.succeeded());
    }

    #[test]
    fn hash_changes_with_command() {
        let a = experiment_hash(&experiment(&["python", "src/baseline.py"])).expect("hash a");
        let b = experiment_hash(&experiment(&["python3", "src/baseline.py"])).expect("hash b");
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn summary_is_readable_after_write() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("summary.json");
        let summary = SweepSummary {
            experiment_id: "baseline".to_string(),
            experiment_hash: "hash".to_string(),
            command: vec!["python".to_string(), "src/baseline.py".to_string()],
            iterations: 2,
            start_time: "start".to_string(),
            end_time: "end".to_string(),
            runs: vec![
                RunRecord::new(1, temp.path().join("run_1.log"), Utc::now(), &result(true, Some(0))),
                RunRecord::new(2, temp.path().join("run_2.log"), Utc::now(), &result(false, Some(1))),
            ],
        };
        write_summary(&path, &summary).expect("write");
        let loaded = read_summary(&path).expect("read");
        assert_eq!(loaded.failed_runs(), 1);
        assert_eq!(loaded.count(RunStatus::Success), 1);
        assert_eq!(loaded, summary);
    }
}
