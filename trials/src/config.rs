//! Harness configuration stored in `trials.toml` at the project root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::experiment::Experiment;

/// Default number of iterations per sweep.
pub const DEFAULT_ITERATIONS: u32 = 10;

/// Harness configuration (TOML).
///
/// Every field is optional in the file; missing fields fall back to the values the
/// original wrapper scripts hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrialsConfig {
    /// Iterations per sweep when neither the experiment nor the CLI sets one.
    pub iterations: u32,

    /// Parent directory for experiment logs (`<logs_root>/<experiment id>`).
    pub logs_root: PathBuf,

    /// Directory scanned for `*.toml` experiment definitions.
    pub experiments_dir: PathBuf,

    /// Interpreter used by the built-in `baseline` and `federated` presets.
    pub python: String,

    /// Per-run wall-clock limit. Unset means runs may take as long as they need.
    pub timeout_secs: Option<u64>,
}

impl Default for TrialsConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            logs_root: PathBuf::from("logs"),
            experiments_dir: PathBuf::from("experiments"),
            python: "python".to_string(),
            timeout_secs: None,
        }
    }
}

impl TrialsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(anyhow!("iterations must be > 0"));
        }
        if self.logs_root.as_os_str().is_empty() {
            return Err(anyhow!("logs_root must be non-empty"));
        }
        if self.python.trim().is_empty() {
            return Err(anyhow!("python must be non-empty"));
        }
        if self.timeout_secs == Some(0) {
            return Err(anyhow!("timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Command-line overrides for a single `trials run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    pub iterations: Option<u32>,
    pub log_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Apply command-line overrides on top of a resolved experiment.
pub fn apply_overrides(mut experiment: Experiment, overrides: &RunOverrides) -> Result<Experiment> {
    if let Some(iterations) = overrides.iterations {
        if iterations == 0 {
            bail!("--iterations must be > 0");
        }
        experiment.iterations = iterations;
    }
    if let Some(log_dir) = &overrides.log_dir {
        experiment.log_dir = log_dir.clone();
    }
    if let Some(timeout_secs) = overrides.timeout_secs {
        if timeout_secs == 0 {
            bail!("--timeout-secs must be > 0");
        }
        experiment.timeout_secs = Some(timeout_secs);
    }
    Ok(experiment)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TrialsConfig::default()`.
pub fn load_config(path: &Path) -> Result<TrialsConfig> {
    if !path.exists() {
        let cfg = TrialsConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TrialsConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TrialsConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, TrialsConfig::default());
        assert_eq!(cfg.iterations, 10);
        assert_eq!(cfg.logs_root, PathBuf::from("logs"));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("trials.toml");
        let cfg = TrialsConfig {
            iterations: 3,
            timeout_secs: Some(600),
            ..TrialsConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("trials.toml");
        fs::write(&path, "python = \"python3\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.python, "python3");
        assert_eq!(cfg.iterations, DEFAULT_ITERATIONS);
    }

    #[test]
    fn overrides_win_over_experiment() {
        let cfg = TrialsConfig::default();
        let experiment = crate::experiment::presets(&cfg)[0].resolve(&cfg);
        let overrides = RunOverrides {
            iterations: Some(2),
            log_dir: Some(PathBuf::from("/tmp/baseline")),
            timeout_secs: None,
        };
        let merged = apply_overrides(experiment, &overrides).expect("merge");
        assert_eq!(merged.iterations, 2);
        assert_eq!(merged.log_dir, PathBuf::from("/tmp/baseline"));
        assert_eq!(merged.timeout_secs, None);
    }

    #[test]
    fn preserves_experiment_without_overrides() {
        let cfg = TrialsConfig::default();
        let experiment = crate::experiment::presets(&cfg)[1].resolve(&cfg);
        let merged =
            apply_overrides(experiment.clone(), &RunOverrides::default()).expect("merge");
        assert_eq!(merged, experiment);
    }

    #[test]
    fn rejects_zero_iteration_override() {
        let cfg = TrialsConfig::default();
        let experiment = crate::experiment::presets(&cfg)[0].resolve(&cfg);
        let overrides = RunOverrides {
            iterations: Some(0),
            ..RunOverrides::default()
        };
        let err = apply_overrides(experiment, &overrides).expect_err("zero");
        assert!(err.to_string().contains("--iterations"));
    }

    #[test]
    fn rejects_zero_iterations() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("trials.toml");
        fs::write(&path, "iterations = 0\n").expect("write");
        let err = load_config(&path).expect_err("zero iterations");
        assert!(format!("{err:#}").contains("iterations must be > 0"));
    }
}
