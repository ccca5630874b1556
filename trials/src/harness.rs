//! Running one external training invocation into its log file.

use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::experiment::Experiment;

/// Environment variable carrying the 1-based iteration number into each run.
pub const ITERATION_ENV: &str = "TRIALS_ITERATION";
/// Environment variable carrying the experiment id into each run.
pub const EXPERIMENT_ENV: &str = "TRIALS_EXPERIMENT";

/// What happened to a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Exit code, `None` when killed by a signal or never spawned.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    /// Set when the program could not be started at all.
    pub spawn_error: Option<String>,
    pub duration: Duration,
}

/// Render the experiment command for one iteration.
///
/// Each argument is a minijinja template with `iteration` and `experiment` in scope.
/// The program itself is used verbatim.
pub fn render_command(experiment: &Experiment, iteration: u32) -> Result<Vec<String>> {
    let env = Environment::new();
    let mut rendered = Vec::with_capacity(experiment.command.len());
    for (index, arg) in experiment.command.iter().enumerate() {
        if index == 0 || !(arg.contains("{{") || arg.contains("{%")) {
            rendered.push(arg.clone());
            continue;
        }
        let value = env
            .render_str(
                arg,
                context! { iteration => iteration, experiment => experiment.id.as_str() },
            )
            .with_context(|| format!("render argument {arg:?}"))?;
        rendered.push(value);
    }
    Ok(rendered)
}

/// Run `argv` once, blocking until it exits, with stdout and stderr merged into `log_path`.
///
/// Both streams share one file handle, so the log keeps the order in which the child
/// wrote them. A program that cannot be spawned is not an error here: the spawn error is
/// written into the log and reported through [`RunResult::spawn_error`].
#[instrument(skip_all, fields(experiment = %experiment.id, iteration = iteration, log = %log_path.display()))]
pub fn run_to_log(
    experiment: &Experiment,
    argv: &[String],
    iteration: u32,
    log_path: &Path,
) -> Result<RunResult> {
    let (program, args) = argv
        .split_first()
        .context("command must include a program")?;

    let stdout =
        File::create(log_path).with_context(|| format!("create log {}", log_path.display()))?;
    let stderr = stdout
        .try_clone()
        .with_context(|| format!("share log handle {}", log_path.display()))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .env(ITERATION_ENV, iteration.to_string())
        .env(EXPERIMENT_ENV, &experiment.id);
    for (key, value) in &experiment.env {
        command.env(key, value);
    }
    if let Some(cwd) = &experiment.cwd {
        command.current_dir(cwd);
    }

    let started = Instant::now();
    debug!(program = %program, "spawning child process");
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(err = %err, program = %program, "failed to spawn command");
            let message = format!("trials: failed to spawn {program}: {err}\n");
            drop(command);
            fs::write(log_path, &message)
                .with_context(|| format!("write log {}", log_path.display()))?;
            return Ok(RunResult {
                exit_code: None,
                success: false,
                timed_out: false,
                spawn_error: Some(err.to_string()),
                duration: started.elapsed(),
            });
        }
    };
    drop(command);

    let (status, timed_out) = match experiment.timeout_secs {
        Some(secs) => wait_with_timeout(&mut child, Duration::from_secs(secs))?,
        None => (child.wait().context("wait for command")?, false),
    };
    let duration = started.elapsed();

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(RunResult {
        exit_code: status.code(),
        success: status.success() && !timed_out,
        timed_out,
        spawn_error: None,
        duration,
    })
}

/// Wait up to `timeout`, then kill the direct child.
///
/// Only the direct child is killed. Processes it started (a `sh -c` script's
/// commands, DataLoader workers) are not signalled and may outlive the run.
fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> Result<(ExitStatus, bool)> {
    match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => Ok((status, false)),
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            child.kill().context("kill command")?;
            let status = child.wait().context("wait command after kill")?;
            Ok((status, true))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use tempfile::tempdir;

    fn shell_experiment(script: &str) -> Experiment {
        Experiment {
            id: "shell".to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            log_dir: PathBuf::from("unused"),
            iterations: 1,
            timeout_secs: None,
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn merges_stdout_and_stderr_in_order() {
        let temp = tempdir().expect("tempdir");
        let log = temp.path().join("run_1.log");
        let experiment = shell_experiment("echo out-1; echo err-1 >&2; echo out-2");
        let result = run_to_log(&experiment, &experiment.command, 1, &log).expect("run");
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        let contents = fs::read_to_string(&log).expect("read log");
        assert_eq!(contents, "out-1\nerr-1\nout-2\n");
    }

    #[test]
    fn non_zero_exit_is_recorded_not_raised() {
        let temp = tempdir().expect("tempdir");
        let log = temp.path().join("run_1.log");
        let experiment = shell_experiment("echo boom >&2; exit 3");
        let result = run_to_log(&experiment, &experiment.command, 1, &log).expect("run");
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(fs::read_to_string(&log).expect("read"), "boom\n");
    }

    #[test]
    fn spawn_failure_lands_in_log() {
        let temp = tempdir().expect("tempdir");
        let log = temp.path().join("run_1.log");
        let mut experiment = shell_experiment("");
        experiment.command = vec!["definitely-not-a-real-program-xyz".to_string()];
        let result = run_to_log(&experiment, &experiment.command, 1, &log).expect("run");
        assert!(!result.success);
        assert!(result.spawn_error.is_some());
        let contents = fs::read_to_string(&log).expect("read");
        assert!(contents.contains("failed to spawn definitely-not-a-real-program-xyz"));
    }

    #[test]
    fn timeout_kills_child() {
        let temp = tempdir().expect("tempdir");
        let log = temp.path().join("run_1.log");
        let mut experiment = shell_experiment("sleep 5");
        experiment.timeout_secs = Some(1);
        let result = run_to_log(&experiment, &experiment.command, 1, &log).expect("run");
        assert!(result.timed_out);
        assert!(!result.success);
    }

    #[test]
    fn timeout_returns_while_grandchild_still_runs() {
        let temp = tempdir().expect("tempdir");
        let log = temp.path().join("run_1.log");
        let mut experiment = shell_experiment("sleep 30 & sleep 30");
        experiment.timeout_secs = Some(1);
        let result = run_to_log(&experiment, &experiment.command, 1, &log).expect("run");
        assert!(result.timed_out);
        assert!(result.duration < Duration::from_secs(10));
    }

    #[test]
    fn exposes_iteration_and_env_to_child() {
        let temp = tempdir().expect("tempdir");
        let log = temp.path().join("run_4.log");
        let mut experiment =
            shell_experiment("echo \"$TRIALS_EXPERIMENT $TRIALS_ITERATION $DATASET\"");
        experiment
            .env
            .insert("DATASET".to_string(), "mnist".to_string());
        run_to_log(&experiment, &experiment.command, 4, &log).expect("run");
        assert_eq!(fs::read_to_string(&log).expect("read"), "shell 4 mnist\n");
    }

    #[test]
    fn renders_templated_arguments() {
        let mut experiment = shell_experiment("");
        experiment.command = vec![
            "python".to_string(),
            "src/federated.py".to_string(),
            "--seed={{ 41 + iteration }}".to_string(),
            "--tag={{ experiment }}-{{ iteration }}".to_string(),
        ];
        let argv = render_command(&experiment, 3).expect("render");
        assert_eq!(
            argv,
            vec!["python", "src/federated.py", "--seed=44", "--tag=shell-3"]
        );
    }

    #[test]
    fn rejects_broken_template() {
        let mut experiment = shell_experiment("");
        experiment.command = vec!["python".to_string(), "--seed={{ iteration".to_string()];
        let err = render_command(&experiment, 1).expect_err("broken template");
        assert!(err.to_string().contains("render argument"));
    }
}
