//! Build iOS apps with `ipa build` and publish the artifacts.
//!
//! `ipabuild-sdk` turns a declarative set of build options into a single
//! `ipa build` invocation, runs it, then finds the packaged `.ipa` and its
//! `.dSYM.zip` debug symbols and hands their paths to later pipeline steps.
//!
//! # Quick Start
//!
//! ```no_run
//! use ipabuild_sdk::{BuildOptions, IpaBuild, JsonResultStore, ProcessEnv, ProcessRunner};
//!
//! let options = BuildOptions {
//!     workspace: Some("App.xcworkspace".into()),
//!     scheme: Some("App".into()),
//!     clean: Some(true),
//!     destination: Some("build".into()),
//!     ..BuildOptions::default()
//! };
//!
//! let mut results = JsonResultStore::open("target/ipabuild/results.json")?;
//! let outputs = IpaBuild::new(options).run(
//!     &ProcessRunner::new(),
//!     &mut results,
//!     &mut ProcessEnv,
//! )?;
//! println!("IPA: {:?}", outputs.ipa_path);
//! # Ok::<(), ipabuild_sdk::IpaError>(())
//! ```
//!
//! # Architecture
//!
//! - **Options** ([`BuildOptions`]): the closed set of recognized options
//! - **Arguments** ([`ArgumentBuilder`]): options → ordered [`BuildArg`]s
//! - **Artifacts** ([`ArtifactLocator`]): newest file of a suffix in a directory
//! - **Runner** ([`ProcessRunner`]): runs the tool piped through `xcpretty`
//! - **Sinks** ([`ResultStore`], [`EnvironmentSink`]): where results are published
//! - **Pipeline** ([`IpaBuild`]): ties the steps together

pub mod args;
pub mod artifacts;
pub mod destination;
pub mod options;
pub mod pipeline;
pub mod runner;
pub mod sinks;
pub mod types;

pub use args::{ArgumentBuilder, BuildArg, SigningProfileLookup, display_args, render_args};
pub use artifacts::{ArtifactKind, ArtifactLocator, newest_with_suffix};
pub use destination::resolve_destination;
pub use options::{BuildOptions, OptionKey, OptionValue};
pub use pipeline::IpaBuild;
pub use runner::{BuildRunner, DEFAULT_FORMATTER, DEFAULT_TOOL, Invocation, ProcessRunner};
pub use sinks::{
    EnvFile, EnvLines, EnvironmentSink, JsonResultStore, LaneContext, ProcessEnv,
    ResultDocument, ResultStore, StoredSigningProfile,
};
pub use types::{BuildOutputs, DSYM_OUTPUT_PATH, IPA_OUTPUT_PATH, IpaError, SIGH_PROFILE_PATH};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
