//! Stable exit codes for `trials` CLI commands.

/// Command succeeded. `trials run` returns this even when runs failed, unless `--strict`.
pub const OK: i32 = 0;
/// Invalid config, experiment definition, or other harness errors.
pub const INVALID: i32 = 1;
/// `trials run --strict` saw at least one failed, timed out, or unspawnable run.
pub const RUNS_FAILED: i32 = 2;
