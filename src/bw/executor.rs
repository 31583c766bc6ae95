use std::{
    io,
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use crate::error::{BackupError, Result};

const EXEC_BUSY_RETRY_ATTEMPTS: usize = 20;
const EXEC_BUSY_RETRY_DELAY: Duration = Duration::from_millis(10);
/// Environment key the vault tool reads its session token from.
pub const SESSION_ENV_VAR: &str = "BW_SESSION";
/// Environment key used as the master password default.
pub const PASSWORD_ENV_VAR: &str = "BW_PASSWORD";
/// Environment key used as the user id default.
pub const USER_ID_ENV_VAR: &str = "BW_USERID";
/// Default vault tool binary name.
pub const DEFAULT_BW_BINARY: &str = "bw";

/// Result of one vault tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BwOutput {
    /// Exit status code (`-1` when terminated by a signal).
    pub status_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl BwOutput {
    /// Returns true for a zero exit status.
    pub fn success(&self) -> bool {
        self.status_code == 0
    }
}

/// Executor abstraction for vault tool commands.
///
/// `environment` is the complete set of variables the call needs beyond
/// the inherited environment; session and password values are never placed
/// in the parent process environment.
pub trait BwExecutor: Send + Sync {
    /// Runs the vault tool with an argument vector and extra environment.
    fn exec(&self, args: &[&str], environment: &[(&str, &str)]) -> Result<BwOutput>;
}

/// Real executor that calls the system `bw` binary.
#[derive(Debug, Clone)]
pub struct SystemBwExecutor {
    binary: String,
}

impl SystemBwExecutor {
    /// Creates a system executor using the `bw` binary.
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_BW_BINARY.to_owned(),
        }
    }

    /// Creates a system executor with a custom binary path.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for SystemBwExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BwExecutor for SystemBwExecutor {
    fn exec(&self, args: &[&str], environment: &[(&str, &str)]) -> Result<BwOutput> {
        let output = retry_exec_busy(|| {
            let mut command = Command::new(&self.binary);
            command
                .args(args)
                .env_remove(SESSION_ENV_VAR)
                .env_remove(PASSWORD_ENV_VAR)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            for (key, value) in environment {
                command.env(key, value);
            }
            command.output()
        })
        .map_err(|error| map_command_execution_error(&self.binary, error))?;

        Ok(BwOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8(output.stdout)?,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn map_command_execution_error(binary: &str, error: io::Error) -> BackupError {
    if error.kind() == io::ErrorKind::NotFound {
        return BackupError::MissingBinary(binary.to_owned());
    }
    BackupError::Io(error)
}

fn retry_exec_busy<T, F>(mut operation: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let mut last_error = None;
    for attempt in 0..EXEC_BUSY_RETRY_ATTEMPTS {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) if is_exec_busy_error(&error) && attempt + 1 < EXEC_BUSY_RETRY_ATTEMPTS => {
                last_error = Some(error);
                thread::sleep(EXEC_BUSY_RETRY_DELAY);
            }
            Err(error) => return Err(error),
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::other("command execution failed")))
}

fn is_exec_busy_error(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::ExecutableFileBusy || error.raw_os_error() == Some(26)
}
