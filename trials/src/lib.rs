//! Repeated experiment runner for training scripts.
//!
//! Runs an external training entry point a fixed number of times in sequence and
//! keeps each invocation's merged stdout/stderr in its own numbered log file
//! (`<log_dir>/run_<i>.log`). Failed runs never stop a sweep.
//!
//! - **[`sweep`]**: the iteration loop.
//! - **[`harness`]**: spawning one child with its output redirected to a log.
//! - **[`experiment`]** / **[`config`]**: what to run and the defaults around it.
//! - **[`report`]**: metrics pulled back out of the logs for comparison.

pub mod cli;
pub mod config;
pub mod exit_codes;
pub mod experiment;
pub mod harness;
pub mod logdir;
pub mod logging;
pub mod report;
pub mod summary;
pub mod sweep;
