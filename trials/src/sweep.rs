//! Sequential sweep: run one experiment `iterations` times, one log file per run.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::experiment::Experiment;
use crate::harness::{render_command, run_to_log};
use crate::logdir::{ensure_dir, log_path, summary_path};
use crate::summary::{RunRecord, SweepSummary, experiment_hash, write_summary};

pub const COMPLETION_LINE: &str = "All iterations completed.";

/// Progress notifications emitted while a sweep runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepEvent {
    /// About to start `iteration` of `total`.
    Starting { iteration: u32, total: u32 },
    /// A run finished (whatever its status).
    Finished(RunRecord),
    /// Every iteration has been attempted.
    Completed,
}

impl SweepEvent {
    /// Human-readable line for events that have one.
    pub fn line(&self) -> Option<String> {
        match self {
            SweepEvent::Starting { iteration, total } => {
                Some(format!("Running iteration {iteration}/{total}..."))
            }
            SweepEvent::Finished(_) => None,
            SweepEvent::Completed => Some(COMPLETION_LINE.to_string()),
        }
    }
}

/// Run every iteration in order, blocking on each child before starting the next.
///
/// Run failures never stop the sweep; they are recorded in the returned summary. Only
/// harness problems (unwritable log dir, bad argument templates) are errors, and those are
/// detected before the first run starts where possible. Once every run has finished the
/// sweep completes even if `summary.json` cannot be written.
#[instrument(skip_all, fields(experiment = %experiment.id, iterations = experiment.iterations))]
pub fn run_sweep<F: FnMut(&SweepEvent)>(
    experiment: &Experiment,
    mut on_event: F,
) -> Result<SweepSummary> {
    let total = experiment.iterations;
    let commands = (1..=total)
        .map(|iteration| render_command(experiment, iteration))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("render command for {}", experiment.id))?;

    ensure_dir(&experiment.log_dir)?;
    let start_time = Utc::now();
    info!(log_dir = %experiment.log_dir.display(), "sweep started");

    let mut runs = Vec::with_capacity(total as usize);
    for (iteration, argv) in (1..=total).zip(&commands) {
        on_event(&SweepEvent::Starting { iteration, total });
        let log = log_path(&experiment.log_dir, iteration);
        let started_at = Utc::now();
        let result = run_to_log(experiment, argv, iteration, &log)
            .with_context(|| format!("run iteration {iteration}"))?;
        let record = RunRecord::new(iteration, log, started_at, &result);
        if !record.succeeded() {
            warn!(
                iteration,
                status = ?record.status,
                exit_code = ?record.exit_code,
                "run did not succeed"
            );
        }
        on_event(&SweepEvent::Finished(record.clone()));
        runs.push(record);
    }

    let experiment_hash = match experiment_hash(experiment) {
        Ok(hash) => hash,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "experiment hash unavailable");
            String::new()
        }
    };
    let summary = SweepSummary {
        experiment_id: experiment.id.clone(),
        experiment_hash,
        command: experiment.command.clone(),
        iterations: total,
        start_time: start_time.to_rfc3339(),
        end_time: Utc::now().to_rfc3339(),
        runs,
    };
    let summary_file = summary_path(&experiment.log_dir);
    if let Err(err) = write_summary(&summary_file, &summary) {
        warn!(err = %format!("{err:#}"), path = %summary_file.display(), "summary not written");
    }
    info!(failed = summary.failed_runs(), "sweep finished");

    on_event(&SweepEvent::Completed);
    Ok(summary)
}
