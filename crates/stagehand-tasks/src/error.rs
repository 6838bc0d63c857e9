//! Errors raised while resolving and running tasks

use std::time::Duration;

use thiserror::Error;

/// Result type alias using TaskError
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors produced by the task engine
#[derive(Debug, Error)]
pub enum TaskError {
    /// A composite referenced a name the registry does not know
    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    /// A task depends on itself, directly or transitively
    #[error("Task cycle detected: {0}")]
    Cycle(String),

    /// A watch glob could not be compiled
    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// A leaf task failed; wraps the error reported by its body.
    ///
    /// The body error is part of the message rather than an error source.
    #[error("Task '{task}' failed: {error}")]
    Failed { task: String, error: Box<TaskError> },

    /// A shell command exited unsuccessfully
    #[error("`{command}` exited with code {code}")]
    Command {
        command: String,
        code: i32,
        stderr: String,
    },

    /// A test target did not finish in time
    #[error("{target} timed out after {}ms", .after.as_millis())]
    Timeout { target: String, after: Duration },

    /// One or more test targets reported failing assertions
    #[error("{failed}/{total} tests failed")]
    TestsFailed { failed: usize, total: usize },

    /// A shared resource (server, watcher) could not be acquired
    #[error("Failed to start {resource}: {reason}")]
    Resource { resource: String, reason: String },

    /// A task body panicked
    #[error("Task '{task}' panicked: {message}")]
    Panicked { task: String, message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] stagehand_core::StagehandError),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Wrap a body error with the name of the task that produced it
    pub fn failed(task: impl Into<String>, source: TaskError) -> Self {
        Self::Failed {
            task: task.into(),
            error: Box::new(source),
        }
    }

    /// The innermost error, skipping `Failed` wrappers
    pub fn root_cause(&self) -> &TaskError {
        match self {
            Self::Failed { error, .. } => error.root_cause(),
            other => other,
        }
    }

    /// Name of the task that failed, if this is a task failure
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            Self::Failed { task, .. } | Self::Panicked { task, .. } => Some(task),
            _ => None,
        }
    }

    /// Whether this error comes from configuration rather than execution
    pub fn is_config(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::UnknownTask(_) | Self::Cycle(_) | Self::InvalidGlob { .. } | Self::Config(_)
        )
    }

    /// Whether this error is an aggregate test failure
    pub fn is_test_failure(&self) -> bool {
        matches!(self.root_cause(), Self::TestsFailed { .. })
    }
}
