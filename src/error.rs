use std::io;

use thiserror::Error;

use crate::backup::ExportStage;

/// Top-level backup errors.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Input was syntactically valid but semantically unsupported.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The external vault tool could not be started.
    #[error("required binary not found: {0}")]
    MissingBinary(String),
    /// `bw login` returned a non-zero status or no session token.
    #[error("login failed:\n{stdout}\n{stderr}")]
    LoginFailed {
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// An external command exited with a non-zero status.
    #[error("command execution failed: `{command}` exited with {status_code}:\n{stdout}\n{stderr}")]
    CommandFailed {
        /// Argument vector joined for display.
        command: String,
        /// Exit status code.
        status_code: i32,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Vault JSON did not match the expected record shape.
    #[error("unexpected shape in {artifact}: {detail}")]
    UnexpectedShape {
        /// Artifact being parsed (for example `items.json`).
        artifact: String,
        /// Parser detail.
        detail: String,
    },
    /// An item referenced an organization that is not in the organizations list.
    #[error("item references unknown organization `{0}`")]
    UnknownOrganization(String),
    /// A step of the export sequence failed.
    #[error("{stage} stage failed: {source}")]
    Stage {
        /// Stage that failed.
        stage: ExportStage,
        /// Underlying failure.
        #[source]
        source: Box<BackupError>,
    },
    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// JSON serialization error.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// UTF-8 conversion error.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl BackupError {
    /// Wraps an error with the export stage it happened in.
    pub fn in_stage(self, stage: ExportStage) -> Self {
        BackupError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Returns the innermost non-stage error.
    pub fn root_cause(&self) -> &BackupError {
        match self {
            BackupError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// A typed result used across the crate.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Generic invalid-input error.
pub const ERROR_CODE_INVALID_INPUT: &str = "E100";
/// Missing runtime dependency or binary.
pub const ERROR_CODE_MISSING_RUNTIME: &str = "E103";
/// Vault login was rejected.
pub const ERROR_CODE_LOGIN_FAILED: &str = "E201";
/// External command returned a failure status.
pub const ERROR_CODE_COMMAND_FAILED: &str = "E400";
/// Exported data had an unexpected shape.
pub const ERROR_CODE_UNEXPECTED_SHAPE: &str = "E500";
/// Filesystem or stream I/O failed.
pub const ERROR_CODE_IO: &str = "E900";
/// Internal serialization/encoding failure.
pub const ERROR_CODE_INTERNAL: &str = "E999";

/// Returns the stable error code for a runtime error.
pub fn classify_error_code(error: &BackupError) -> &'static str {
    match error.root_cause() {
        BackupError::InvalidInput(_) => ERROR_CODE_INVALID_INPUT,
        BackupError::MissingBinary(_) => ERROR_CODE_MISSING_RUNTIME,
        BackupError::LoginFailed { .. } => ERROR_CODE_LOGIN_FAILED,
        BackupError::CommandFailed { .. } => ERROR_CODE_COMMAND_FAILED,
        BackupError::UnexpectedShape { .. } | BackupError::UnknownOrganization(_) => {
            ERROR_CODE_UNEXPECTED_SHAPE
        }
        BackupError::Io(_) => ERROR_CODE_IO,
        BackupError::Serde(_) | BackupError::Utf8(_) | BackupError::Stage { .. } => {
            ERROR_CODE_INTERNAL
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::{
        classify_error_code, BackupError, ERROR_CODE_COMMAND_FAILED, ERROR_CODE_LOGIN_FAILED,
        ERROR_CODE_MISSING_RUNTIME, ERROR_CODE_UNEXPECTED_SHAPE,
    };
    use crate::backup::ExportStage;

    #[test]
    fn classify_missing_binary() {
        let error = BackupError::MissingBinary("bw".to_owned());
        assert_eq!(classify_error_code(&error), ERROR_CODE_MISSING_RUNTIME);
    }

    #[test]
    fn classify_login_failure() {
        let error = BackupError::LoginFailed {
            stdout: String::new(),
            stderr: "Username or password is incorrect.".to_owned(),
        };
        assert_eq!(classify_error_code(&error), ERROR_CODE_LOGIN_FAILED);
    }

    #[test]
    fn classify_looks_through_stage_wrappers() {
        let error = BackupError::UnknownOrganization("org-1".to_owned())
            .in_stage(ExportStage::Organizations);
        assert_eq!(classify_error_code(&error), ERROR_CODE_UNEXPECTED_SHAPE);

        let error = BackupError::CommandFailed {
            command: "bw sync".to_owned(),
            status_code: 1,
            stdout: String::new(),
            stderr: "boom".to_owned(),
        }
        .in_stage(ExportStage::Sync);
        assert_eq!(classify_error_code(&error), ERROR_CODE_COMMAND_FAILED);
    }

    #[test]
    fn command_failure_message_keeps_captured_output() {
        let error = BackupError::CommandFailed {
            command: "bw sync".to_owned(),
            status_code: 2,
            stdout: "partial".to_owned(),
            stderr: "You are not logged in.".to_owned(),
        }
        .in_stage(ExportStage::Sync);
        let message = error.to_string();
        assert!(message.starts_with("sync stage failed"));
        assert!(message.contains("`bw sync` exited with 2"));
        assert!(message.contains("partial"));
        assert!(message.contains("You are not logged in."));
    }
}
