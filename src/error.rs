//! Error types shared by the library.
//!
//! The variants follow how a failure should be handled by the caller:
//! configuration defects and external tool failures are fatal, network
//! flakiness is transient and may be retried.

use std::io;

/// Library error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Host or config file defect. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Interface down, missing tunnel parameters or failed ping.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// An external program ran but reported failure.
    #[error("{program} failed (exit code {}): {output}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    ExternalTool {
        /// Program that was invoked.
        program: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Captured stderr, or stdout when stderr was empty.
        output: String,
    },

    /// An external program could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// A file we own could not be parsed.
    #[error("failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },
}

impl Error {
    /// Whether the error should end the current `ensure` call instead of
    /// consuming one attempt.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::TransientNetwork(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
