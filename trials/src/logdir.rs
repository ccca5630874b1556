//! Log directory layout: `<dir>/run_<i>.log` plus `<dir>/summary.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

pub const SUMMARY_FILE: &str = "summary.json";

/// Create the directory and its parents. Succeeds if it already exists.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))
}

pub fn log_path(dir: &Path, iteration: u32) -> PathBuf {
    dir.join(format!("run_{iteration}.log"))
}

pub fn summary_path(dir: &Path) -> PathBuf {
    dir.join(SUMMARY_FILE)
}

/// Parse the iteration number out of a `run_<i>.log` file name.
pub fn parse_iteration(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("run_")?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

/// Existing run logs in `dir`, sorted by iteration number (not lexically).
pub fn list_run_logs(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut logs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(iteration) = parse_iteration(&name.to_string_lossy()) {
            logs.push((iteration, path));
        }
    }
    logs.sort_by_key(|(iteration, _)| *iteration);
    Ok(logs)
}

/// Remove run logs and the summary from `dir`. Other files are left alone.
///
/// Returns the number of files removed.
pub fn clear_run_logs(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for (_, path) in list_run_logs(dir)? {
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        removed += 1;
    }
    let summary = summary_path(dir);
    if summary.exists() {
        fs::remove_file(&summary).with_context(|| format!("remove {}", summary.display()))?;
        removed += 1;
    }
    debug!(dir = %dir.display(), removed, "cleared run logs");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_paths_are_numbered_from_one() {
        let dir = Path::new("logs/baseline");
        assert_eq!(log_path(dir, 1), PathBuf::from("logs/baseline/run_1.log"));
        assert_eq!(log_path(dir, 10), PathBuf::from("logs/baseline/run_10.log"));
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("logs").join("federated");
        ensure_dir(&dir).expect("first");
        ensure_dir(&dir).expect("second");
        assert!(dir.is_dir());
    }

    #[test]
    fn parses_only_run_log_names() {
        assert_eq!(parse_iteration("run_7.log"), Some(7));
        assert_eq!(parse_iteration("run_.log"), None);
        assert_eq!(parse_iteration("run_7.txt"), None);
        assert_eq!(parse_iteration("summary.json"), None);
    }

    #[test]
    fn lists_logs_in_numeric_order() {
        let temp = tempdir().expect("tempdir");
        for name in ["run_10.log", "run_2.log", "run_1.log", "notes.txt"] {
            fs::write(temp.path().join(name), "x").expect("write");
        }
        let iterations: Vec<u32> = list_run_logs(temp.path())
            .expect("list")
            .into_iter()
            .map(|(iteration, _)| iteration)
            .collect();
        assert_eq!(iterations, vec![1, 2, 10]);
    }

    #[test]
    fn clear_keeps_unrelated_files() {
        let temp = tempdir().expect("tempdir");
        for name in ["run_1.log", "run_2.log", "summary.json", "notes.txt"] {
            fs::write(temp.path().join(name), "x").expect("write");
        }
        let removed = clear_run_logs(temp.path()).expect("clear");
        assert_eq!(removed, 3);
        assert!(temp.path().join("notes.txt").exists());
        assert!(list_run_logs(temp.path()).expect("list").is_empty());
    }
}
