//! Metric extraction from run logs and cross-run aggregation.
//!
//! The training entry points end each run by printing lines such as
//! `Test Accuracy: 97.41%`, `Test Loss: 0.083112` and
//! `Total execution time: 812.33 seconds`. The last occurrence in a log wins.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::logdir::{list_run_logs, summary_path};
use crate::summary::{RunStatus, read_summary};

/// A metric the training scripts report at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Percent, 0-100.
    TestAccuracy,
    TestLoss,
    ExecutionTimeSecs,
}

impl Metric {
    pub const ALL: [Metric; 3] = [
        Metric::TestAccuracy,
        Metric::TestLoss,
        Metric::ExecutionTimeSecs,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::TestAccuracy => "test_accuracy_pct",
            Metric::TestLoss => "test_loss",
            Metric::ExecutionTimeSecs => "execution_time_secs",
        }
    }

    fn pattern(self) -> &'static Regex {
        static ACCURACY_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"Test Accuracy:\s*([0-9]+(?:\.[0-9]+)?)\s*%")
                .expect("accuracy regex should be valid")
        });
        static LOSS_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"Test Loss:\s*([0-9]+(?:\.[0-9]+)?(?:[eE][-+]?[0-9]+)?)")
                .expect("loss regex should be valid")
        });
        static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"Total execution time:\s*([0-9]+(?:\.[0-9]+)?)\s*seconds")
                .expect("time regex should be valid")
        });
        match self {
            Metric::TestAccuracy => &*ACCURACY_RE,
            Metric::TestLoss => &*LOSS_RE,
            Metric::ExecutionTimeSecs => &*TIME_RE,
        }
    }
}

/// Pull every known metric out of one log's text.
pub fn extract_metrics(log: &str) -> BTreeMap<Metric, f64> {
    let mut found = BTreeMap::new();
    for metric in Metric::ALL {
        let last = metric
            .pattern()
            .captures_iter(log)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
            .last();
        if let Some(value) = last {
            found.insert(metric, value);
        }
    }
    found
}

/// Descriptive statistics over one metric across runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` with fewer than two values.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub max: f64,
}

impl Stats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std_dev = (count > 1).then(|| {
            let variance = values
                .iter()
                .map(|value| (value - mean).powi(2))
                .sum::<f64>()
                / (count as f64 - 1.0);
            variance.sqrt()
        });
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count,
            mean,
            std_dev,
            min,
            max,
        })
    }
}

/// Status counts taken from `summary.json`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub success: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub spawn_error: usize,
}

#[derive(Debug, Default)]
pub struct ReportSummary {
    pub logs: usize,
    /// Logs that contained none of the known metrics.
    pub logs_without_metrics: usize,
    pub statuses: Option<StatusCounts>,
    pub metrics: BTreeMap<Metric, Stats>,
}

/// Aggregate the run logs in `log_dir`.
///
/// When a valid `summary.json` is present only the iterations of that latest sweep are
/// counted; leftover logs from an earlier, longer sweep are skipped with a warning.
/// Returns non-fatal warnings alongside the summary (unreadable logs, missing summary).
pub fn aggregate(log_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();
    let mut values: BTreeMap<Metric, Vec<f64>> = BTreeMap::new();

    let mut latest: Option<BTreeSet<u32>> = None;
    let summary_file = summary_path(log_dir);
    if summary_file.exists() {
        match read_summary(&summary_file) {
            Ok(sweep) => {
                summary.statuses = Some(StatusCounts {
                    success: sweep.count(RunStatus::Success),
                    failed: sweep.count(RunStatus::Failed),
                    timed_out: sweep.count(RunStatus::TimedOut),
                    spawn_error: sweep.count(RunStatus::SpawnError),
                });
                latest = Some(sweep.runs.iter().map(|run| run.iteration).collect());
            }
            Err(err) => warnings.push(format!("summary.json invalid ({err:#})")),
        }
    } else {
        warnings.push(format!("no summary at {}", summary_file.display()));
    }

    for (iteration, path) in list_run_logs(log_dir)? {
        if let Some(iterations) = &latest
            && !iterations.contains(&iteration)
        {
            warnings.push(format!("skip run {iteration}: not in latest sweep"));
            continue;
        }
        let bytes = match fs::read(&path).with_context(|| format!("read {}", path.display())) {
            Ok(bytes) => bytes,
            Err(err) => {
                warnings.push(format!("skip run {iteration}: {err:#}"));
                continue;
            }
        };
        summary.logs += 1;
        let metrics = extract_metrics(&String::from_utf8_lossy(&bytes));
        if metrics.is_empty() {
            summary.logs_without_metrics += 1;
        }
        debug!(iteration, found = metrics.len(), "metrics extracted");
        for (metric, value) in metrics {
            values.entry(metric).or_default().push(value);
        }
    }

    for (metric, series) in values {
        if let Some(stats) = Stats::from_values(&series) {
            summary.metrics.insert(metric, stats);
        }
    }

    Ok((summary, warnings))
}

/// One metric compared across two experiments.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub metric: Metric,
    pub left: Option<Stats>,
    pub right: Option<Stats>,
}

impl Comparison {
    /// `right.mean - left.mean` when both sides have the metric.
    pub fn mean_delta(&self) -> Option<f64> {
        Some(self.right?.mean - self.left?.mean)
    }
}

/// Compare metrics present on either side, in `Metric` order.
pub fn compare(left: &ReportSummary, right: &ReportSummary) -> Vec<Comparison> {
    Metric::ALL
        .into_iter()
        .filter(|metric| left.metrics.contains_key(metric) || right.metrics.contains_key(metric))
        .map(|metric| Comparison {
            metric,
            left: left.metrics.get(&metric).copied(),
            right: right.metrics.get(&metric).copied(),
        })
        .collect()
}
