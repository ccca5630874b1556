//! CLI command implementations.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::{RunOverrides, TrialsConfig, apply_overrides, write_config};
use crate::exit_codes;
use crate::experiment::{Experiment, all_experiments, find_experiment};
use crate::logdir::clear_run_logs;
use crate::report::{ReportSummary, Stats, aggregate, compare};
use crate::sweep::{SweepEvent, run_sweep};

/// Write the default config to `path` unless it already exists (or `force` is set).
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("init: config={} exists", path.display());
        return Ok(());
    }
    write_config(path, &TrialsConfig::default())
        .with_context(|| format!("write config {}", path.display()))?;
    println!("init: config={}", path.display());
    Ok(())
}

/// List all known experiments (files and presets).
pub fn list_experiments(cfg: &TrialsConfig) -> Result<()> {
    for file in all_experiments(cfg)? {
        let experiment = file.resolve(cfg);
        println!(
            "{}\t{}\t{}",
            experiment.id,
            experiment.log_dir.display(),
            experiment.command.join(" ")
        );
    }
    Ok(())
}

/// Run an experiment's sweep and return the process exit code.
///
/// Failed runs do not change the exit code unless `strict` is set.
pub fn run_experiment(
    cfg: &TrialsConfig,
    id: &str,
    overrides: &RunOverrides,
    strict: bool,
) -> Result<i32> {
    let experiment = resolve(cfg, id)?;
    let experiment = apply_overrides(experiment, overrides)?;
    debug!(?experiment, "experiment resolved");

    let summary = run_sweep(&experiment, |event| {
        if let Some(line) = event.line() {
            println!("{line}");
        }
        if let SweepEvent::Finished(record) = event {
            debug!(iteration = record.iteration, status = ?record.status, "run recorded");
        }
    })
    .with_context(|| format!("sweep {id}"))?;

    let failed = summary.failed_runs();
    info!(experiment = id, failed, "sweep complete");
    if strict && failed > 0 {
        eprintln!(
            "run: experiment={} failed={}/{}",
            id,
            failed,
            summary.runs.len()
        );
        return Ok(exit_codes::RUNS_FAILED);
    }
    Ok(exit_codes::OK)
}

/// Show aggregated metrics for an experiment's logs.
pub fn report_experiment(cfg: &TrialsConfig, id: &str) -> Result<()> {
    let experiment = resolve(cfg, id)?;
    let (summary, warnings) = aggregate(&experiment.log_dir)?;
    print_report(id, &experiment.log_dir, &summary);
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Compare two experiments' metrics side by side.
pub fn compare_experiments(cfg: &TrialsConfig, left_id: &str, right_id: &str) -> Result<()> {
    let left = resolve(cfg, left_id)?;
    let right = resolve(cfg, right_id)?;
    let (left_summary, left_warnings) = aggregate(&left.log_dir)?;
    let (right_summary, right_warnings) = aggregate(&right.log_dir)?;

    println!(
        "compare: {}(logs={}) vs {}(logs={})",
        left_id, left_summary.logs, right_id, right_summary.logs
    );
    for row in compare(&left_summary, &right_summary) {
        let delta = row
            .mean_delta()
            .map(|delta| format!("{delta:+.4}"))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "compare: {} {}={} {}={} delta={}",
            row.metric.label(),
            left_id,
            format_stats(row.left.as_ref()),
            right_id,
            format_stats(row.right.as_ref()),
            delta
        );
    }
    for warning in left_warnings {
        eprintln!("warning: {}: {}", left_id, warning);
    }
    for warning in right_warnings {
        eprintln!("warning: {}: {}", right_id, warning);
    }
    Ok(())
}

/// Remove run logs and the summary for an experiment.
pub fn clean_experiment(cfg: &TrialsConfig, id: &str) -> Result<()> {
    let experiment = resolve(cfg, id)?;
    let removed = clear_run_logs(&experiment.log_dir)?;
    println!(
        "clean: experiment={} log_dir={} removed={}",
        id,
        experiment.log_dir.display(),
        removed
    );
    Ok(())
}

fn resolve(cfg: &TrialsConfig, id: &str) -> Result<Experiment> {
    Ok(find_experiment(cfg, id)?.resolve(cfg))
}

fn print_report(id: &str, log_dir: &Path, summary: &ReportSummary) {
    println!(
        "report: experiment={} log_dir={} logs={} without_metrics={}",
        id,
        log_dir.display(),
        summary.logs,
        summary.logs_without_metrics
    );
    if let Some(statuses) = &summary.statuses {
        println!(
            "report: success={} failed={} timed_out={} spawn_error={}",
            statuses.success, statuses.failed, statuses.timed_out, statuses.spawn_error
        );
    }
    for (metric, stats) in &summary.metrics {
        println!(
            "report: {} {}",
            metric.label(),
            format_stats(Some(stats))
        );
    }
}

fn format_stats(stats: Option<&Stats>) -> String {
    match stats {
        None => "n/a".to_string(),
        Some(stats) => {
            let std_dev = stats
                .std_dev
                .map(|value| format!("{value:.4}"))
                .unwrap_or_else(|| "n/a".to_string());
            format!(
                "n={} mean={:.4} std={} min={:.4} max={:.4}",
                stats.count, stats.mean, std_dev, stats.min, stats.max
            )
        }
    }
}
