use std::path::PathBuf;

use thiserror::Error;

use crate::step::Step;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("container {container} is not running")]
    ContainerMissing { container: String },

    #[error("{kind} directory does not exist: {}", .path.display())]
    PathMissing { kind: &'static str, path: PathBuf },

    #[error("no screen session named {session} found in the container")]
    SessionMissing { session: String },

    #[error("screen session {session} is busy, multi-user mode could not be enabled: {detail}")]
    SessionBusy { session: String, detail: String },

    #[error("server did not exit after the stop command; session {session} is still alive")]
    UncleanShutdown { session: String },

    #[error("`{command}` failed (status={status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("a previous run stopped after step `{step}`; rerun with --resume once the container state has been checked")]
    Interrupted { step: Step },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BackupError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Completed,
    /// The copy finished but restoring session access did not.
    CompletedWithWarnings(Vec<String>),
}

impl BackupOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            BackupOutcome::Completed => 0,
            BackupOutcome::CompletedWithWarnings(_) => 2,
        }
    }
}

/// Process exit code for any fatal error.
pub const EXIT_FATAL: u8 = 1;

pub fn exit_code(result: &Result<BackupOutcome, BackupError>) -> u8 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(_) => EXIT_FATAL,
    }
}
