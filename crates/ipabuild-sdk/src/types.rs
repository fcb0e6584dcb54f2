//! Core types for ipabuild-sdk.
//!
//! This module defines the types shared by every stage of a build run:
//!
//! - [`IpaError`] - Error type for option parsing, tool execution and publication
//! - [`BuildOutputs`] - What a run produced and where it was published
//! - The fixed result keys ([`IPA_OUTPUT_PATH`], [`DSYM_OUTPUT_PATH`], [`SIGH_PROFILE_PATH`])

use std::path::PathBuf;

use crate::args::BuildArg;

/// Result key for the path of the packaged `.ipa`.
///
/// Also mirrored into the environment so consumers that only read
/// environment state (upload steps, for instance) can find the bundle.
pub const IPA_OUTPUT_PATH: &str = "IPA_OUTPUT_PATH";

/// Result key for the path of the `.dSYM.zip` debug-symbol archive.
pub const DSYM_OUTPUT_PATH: &str = "DSYM_OUTPUT_PATH";

/// Result key (and environment variable) a signing step publishes the
/// provisioning profile path under. Used as the default for `embed`.
pub const SIGH_PROFILE_PATH: &str = "SIGH_PROFILE_PATH";

/// Error types for ipabuild-sdk operations.
///
/// # Example
///
/// ```
/// use ipabuild_sdk::{BuildOptions, IpaError};
///
/// let err = BuildOptions::from_value(&serde_json::json!(["-s", "App"])).unwrap_err();
/// assert!(matches!(err, IpaError::InvalidInput(_)));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum IpaError {
    /// The options value was not a mapping, or one of its values has a shape
    /// that cannot be forwarded to the build tool.
    ///
    /// Raised before any defaults are applied or any process is started.
    #[error("invalid build options: {0}")]
    InvalidInput(String),

    /// The build tool (or the formatter it is piped through) exited non-zero.
    ///
    /// Builds are not retried; the exit status is reported as-is.
    #[error("build failed: `{command}` {status}")]
    BuildFailure {
        /// The command line that was run, in display form.
        command: String,
        /// Human-readable exit status (`exited with status 65`, `terminated by signal`).
        status: String,
    },

    /// An I/O error occurred.
    ///
    /// Common causes include a missing build tool, an unreadable result store
    /// or an unwritable environment file.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// The JSON result store could not be read or written.
    #[error("serialization error: {0}. Check that the result store contains valid JSON")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error occurred, such as an invalid destination glob.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result of a completed (or dry-run) build.
///
/// Paths are exactly what was published to the result store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutputs {
    /// Arguments passed to the build tool, after default filling.
    pub args: Vec<BuildArg>,
    /// Directory the artifacts were looked up in.
    pub destination: PathBuf,
    /// Newest `.ipa` in the destination, if any.
    pub ipa_path: Option<PathBuf>,
    /// Newest `.dSYM.zip` in the destination, if any.
    pub dsym_path: Option<PathBuf>,
}
