//! `-B`: run the same command detached, with output sent to `wget-log`.

use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Set in the environment of the detached child.
pub const BACKGROUND_ENV: &str = "SITE_FETCH_BACKGROUND";

pub const LOG_FILE: &str = "wget-log";

/// True inside the detached child process.
pub fn is_background_child() -> bool {
    std::env::var_os(BACKGROUND_ENV).is_some()
}

/// Re-runs the current executable with `args`, detached from the terminal,
/// with stdout and stderr written to a truncated `log_file`.
pub fn detach<I, S>(args: I, log_file: &Path) -> Result<u32>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let executable = std::env::current_exe().context("cannot locate current executable")?;
    let log = File::create(log_file)
        .with_context(|| format!("cannot create log file {}", log_file.display()))?;
    let log_err = log
        .try_clone()
        .with_context(|| format!("cannot share log file {}", log_file.display()))?;

    let child = Command::new(executable)
        .args(args)
        .env(BACKGROUND_ENV, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()
        .context("failed to start background process")?;

    Ok(child.id())
}
