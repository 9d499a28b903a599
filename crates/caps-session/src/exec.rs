//! Blocking launch of external analysis codes.

use std::path::Path;
use std::process::Command;

use caps_types::status::{CAPS_DIRERR, CAPS_EXECERR};
use caps_types::CapsError;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// What a finished external run left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutcome {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args` in `dir` and wait for it to exit.
///
/// A process that cannot be started, or that exits unsuccessfully, is
/// `CAPS_EXECERR`; the latter carries its stderr lines as details.
#[instrument(skip(dir, args), fields(dir = %dir.display()))]
pub fn run_in_dir(dir: &Path, program: &str, args: &[&str]) -> Result<ExecOutcome, CapsError> {
    if !dir.is_dir() {
        return Err(CapsError::new(CAPS_DIRERR).with_message(format!("{} is not a directory", dir.display())));
    }
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| CapsError::new(CAPS_EXECERR).with_message(format!("cannot start {program}: {e}")))?;

    let outcome = ExecOutcome {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(code = ?outcome.code, "external process exited");
    if !output.status.success() {
        let status = match outcome.code {
            Some(code) => format!("exit code {code}"),
            None => "a signal".to_string(),
        };
        return Err(CapsError::new(CAPS_EXECERR)
            .with_message(format!("{program} terminated with {status}"))
            .with_details(outcome.stderr.lines()));
    }
    Ok(outcome)
}
