//! Experiment definitions: built-in presets and TOML files.
//!
//! An experiment names one external training entry point and where its run logs go.
//! See `experiments/` for examples.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::config::TrialsConfig;

/// A parsed experiment file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentFile {
    pub experiment: ExperimentMeta,
    /// Extra environment variables for every run.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Experiment metadata and command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Program followed by its arguments. Arguments may use `{{ iteration }}`.
    pub command: Vec<String>,
    /// Log directory (default: `<logs_root>/<id>`).
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub iterations: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Working directory for the child process (default: current directory).
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

/// An experiment with every default applied, ready to sweep.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Experiment {
    pub id: String,
    pub command: Vec<String>,
    pub log_dir: PathBuf,
    pub iterations: u32,
    pub timeout_secs: Option<u64>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl ExperimentFile {
    /// Load and validate an experiment file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read experiment {}", path.display()))?;
        Self::parse_str(&contents).with_context(|| format!("load experiment {}", path.display()))
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let file: ExperimentFile = toml::from_str(contents).context("parse experiment")?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        validate_experiment_id(&self.experiment.id)?;
        let command = &self.experiment.command;
        if command.is_empty() || command[0].trim().is_empty() {
            bail!("experiment.command must be a non-empty array");
        }
        if self.experiment.iterations == Some(0) {
            bail!("experiment.iterations must be > 0");
        }
        if self.experiment.timeout_secs == Some(0) {
            bail!("experiment.timeout_secs must be > 0");
        }
        if let Some(log_dir) = &self.experiment.log_dir
            && log_dir.as_os_str().is_empty()
        {
            bail!("experiment.log_dir must be non-empty");
        }
        for key in self.env.keys() {
            if key.trim().is_empty() {
                bail!("env key must be non-empty");
            }
        }
        Ok(())
    }

    /// Apply config defaults. The experiment's own values win over the config.
    pub fn resolve(&self, cfg: &TrialsConfig) -> Experiment {
        let meta = &self.experiment;
        Experiment {
            id: meta.id.clone(),
            command: meta.command.clone(),
            log_dir: meta
                .log_dir
                .clone()
                .unwrap_or_else(|| cfg.logs_root.join(&meta.id)),
            iterations: meta.iterations.unwrap_or(cfg.iterations),
            timeout_secs: meta.timeout_secs.or(cfg.timeout_secs),
            cwd: meta.cwd.clone(),
            env: self.env.clone(),
        }
    }
}

/// The two wrappers the project shipped with: centralized baseline and federated training.
pub fn presets(cfg: &TrialsConfig) -> Vec<ExperimentFile> {
    [
        ("baseline", "src/baseline.py", "Centralized training baseline"),
        ("federated", "src/federated.py", "Federated training"),
    ]
    .into_iter()
    .map(|(id, script, description)| ExperimentFile {
        experiment: ExperimentMeta {
            id: id.to_string(),
            description: Some(description.to_string()),
            command: vec![cfg.python.clone(), script.to_string()],
            log_dir: Some(cfg.logs_root.join(id)),
            iterations: None,
            timeout_secs: None,
            cwd: None,
        },
        env: BTreeMap::new(),
    })
    .collect()
}

/// Discover and load all experiment files from a directory.
///
/// Returns experiments sorted by id. Errors if duplicate ids are found.
pub fn discover_experiments(dir: &Path) -> Result<Vec<ExperimentFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut experiments = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("read experiments dir {}", dir.display()))?
    {
        let entry = entry.context("read experiment entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        experiments.push(ExperimentFile::load(&path)?);
    }
    experiments.sort_by(|left, right| left.experiment.id.cmp(&right.experiment.id));
    for pair in experiments.windows(2) {
        if pair[0].experiment.id == pair[1].experiment.id {
            return Err(anyhow!("duplicate experiment.id {}", pair[0].experiment.id));
        }
    }
    Ok(experiments)
}

/// All known experiments: files from `experiments_dir`, then presets not shadowed by a file.
pub fn all_experiments(cfg: &TrialsConfig) -> Result<Vec<ExperimentFile>> {
    let mut experiments = discover_experiments(&cfg.experiments_dir)?;
    for preset in presets(cfg) {
        if !experiments
            .iter()
            .any(|file| file.experiment.id == preset.experiment.id)
        {
            experiments.push(preset);
        }
    }
    experiments.sort_by(|left, right| left.experiment.id.cmp(&right.experiment.id));
    Ok(experiments)
}

/// Look up an experiment by id.
pub fn find_experiment(cfg: &TrialsConfig, id: &str) -> Result<ExperimentFile> {
    all_experiments(cfg)?
        .into_iter()
        .find(|file| file.experiment.id == id)
        .ok_or_else(|| {
            anyhow!(
                "experiment {} not found (looked in {} and built-in presets)",
                id,
                cfg.experiments_dir.display()
            )
        })
}

fn validate_experiment_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("experiment.id must be non-empty");
    }
    if id.contains('/') || id.contains('\\') {
        bail!("experiment.id must not contain path separators");
    }
    if id.contains("..") {
        bail!("experiment.id must not contain '..'");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("experiment.id must use [a-z0-9_-] only");
    }
    Ok(())
}
