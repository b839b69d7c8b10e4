//! Error taxonomy for configuring and invoking the demo adapter.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DemoError>;

/// Everything that can go wrong between setup and a returned prediction.
/// None of these are retried; the caller decides how to show them.
#[derive(Debug, Error)]
pub enum DemoError {
    /// Task name is not in the registry.
    #[error("unknown task: {name} (known tasks: {known})")]
    UnknownTask { name: String, known: String },

    /// An input arrived before `configure` completed.
    #[error("adapter is not configured: call configure() before handling input")]
    NotConfigured,

    /// Configuration values are malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Script generation failed (missing template, missing key, bad filter).
    #[error("failed to render script template: {0}")]
    TemplateRender(String),

    /// The script exited non-zero, timed out, or could not be launched.
    #[error("script execution failed ({reason})\nstdout: {stdout}\nstderr: {stderr}")]
    ExecutionFailed {
        reason: String,
        stdout: String,
        stderr: String,
    },

    /// The script ran but its result has no such field.
    #[error("script result has no `{field}` field\nstdout: {stdout}\nstderr: {stderr}")]
    MissingResultField {
        field: String,
        stdout: String,
        stderr: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DemoError {
    /// Failure with no captured output (e.g. spawn error, timeout).
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            reason: reason.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// True when the error is the caller's fault rather than the script's.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTask { .. } | Self::NotConfigured | Self::InvalidConfig(_)
        )
    }
}
