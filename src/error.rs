//! Centralized error types for the pipeline, using `thiserror`.
//!
//! Configuration and parse errors are fatal and raised before any subprocess
//! is spawned. Per-unit failures are *recorded*, not raised: they live in
//! [`UnitFailure`] values inside a stage result and only influence the
//! process exit status after the whole stage has drained.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// I/O errors (missing files, permission problems, rename failures).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or conflicting stage options. Carries the offending option name.
    #[error("invalid configuration for `{option}`: {message}")]
    Config { option: String, message: String },

    /// Malformed compound option string (crossalign specification).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Fatal stage-level abort: nothing to do, or a failure under an
    /// abort-on-first-failure policy.
    #[error("stage aborted: {message}")]
    StageAbort { message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn config(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            option: option.into(),
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self::StageAbort {
            message: message.into(),
        }
    }
}

/// One work unit's external tool exited non-zero or produced no output.
/// Recoverable at stage level; collected into the stage result.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    /// Unit identity, e.g. `sample_a/chromosome`.
    pub unit: String,
    /// Captured diagnostic text (tool stderr or wrapper error).
    pub message: String,
}
