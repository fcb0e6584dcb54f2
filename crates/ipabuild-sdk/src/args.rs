//! Mapping from [`BuildOptions`] to `ipa build` arguments.
//!
//! Arguments are produced in [`OptionKey::ALL`] order regardless of how the
//! options were supplied, so the same options always yield the same command
//! line.

use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::options::{BuildOptions, OptionKey, OptionValue};
use crate::types::IpaError;

/// A single `ipa build` argument: a flag and, for most options, its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArg {
    /// The flag, e.g. `-s` or `--clean`.
    pub flag: &'static str,
    /// The value following the flag. `None` for bare flags and empty values.
    pub value: Option<String>,
}

impl BuildArg {
    /// A flag without a value.
    pub fn bare(flag: &'static str) -> Self {
        Self { flag, value: None }
    }

    /// A flag followed by `value`. An empty value yields a bare flag.
    pub fn with_value(flag: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            flag,
            value: (!value.is_empty()).then_some(value),
        }
    }

    /// The argument as discrete argv entries, ready for [`std::process::Command::args`].
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec![self.flag.to_string()];
        argv.extend(self.value.clone());
        argv
    }
}

impl fmt::Display for BuildArg {
    /// Shell-like display form (`-s "App"`). For logs only; the value is
    /// not escaped.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} \"{}\"", self.flag, value),
            None => f.write_str(self.flag),
        }
    }
}

/// Joins arguments in display form with single spaces.
pub fn display_args(args: &[BuildArg]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Source of the provisioning profile path produced by an earlier signing step.
pub trait SigningProfileLookup {
    /// Returns the profile path, if the signing step published one.
    fn signing_profile(&self) -> Option<String>;
}

impl<F> SigningProfileLookup for F
where
    F: Fn() -> Option<String>,
{
    fn signing_profile(&self) -> Option<String> {
        self()
    }
}

/// Turns [`BuildOptions`] into `ipa build` arguments.
///
/// The only default filled in is `embed`, taken from the injected
/// [`SigningProfileLookup`] when the options leave it unset.
///
/// # Example
///
/// ```
/// use ipabuild_sdk::{ArgumentBuilder, BuildOptions, display_args};
///
/// let options = BuildOptions {
///     scheme: Some("App".into()),
///     clean: Some(true),
///     ..BuildOptions::default()
/// };
/// let lookup = || Some("/tmp/App.mobileprovision".to_string());
/// let args = ArgumentBuilder::new().signing_profile(&lookup).build(&options);
/// assert_eq!(
///     display_args(&args),
///     r#"-s "App" --clean -m "/tmp/App.mobileprovision""#
/// );
/// ```
#[derive(Default)]
pub struct ArgumentBuilder<'a> {
    signing_profile: Option<&'a dyn SigningProfileLookup>,
}

impl<'a> ArgumentBuilder<'a> {
    /// Creates a builder with no signing-profile default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets where the `embed` default comes from.
    pub fn signing_profile(mut self, lookup: &'a dyn SigningProfileLookup) -> Self {
        self.signing_profile = Some(lookup);
        self
    }

    /// Returns `options` with `embed` filled from the signing step, if unset.
    ///
    /// A blank profile path counts as no profile.
    pub fn fill_in_defaults(&self, mut options: BuildOptions) -> BuildOptions {
        if options.embed.is_none()
            && let Some(lookup) = self.signing_profile
            && let Some(profile) = lookup.signing_profile().filter(|p| !p.is_empty())
        {
            debug!(profile = %profile, "embedding provisioning profile from signing step");
            options.embed = Some(profile);
        }
        options
    }

    /// Fills defaults and renders the arguments.
    pub fn build(&self, options: &BuildOptions) -> Vec<BuildArg> {
        render_args(&self.fill_in_defaults(options.clone()))
    }

    /// Parses an untyped options mapping, then behaves like [`build`](Self::build).
    ///
    /// Fails with [`IpaError::InvalidInput`] before any default lookup if
    /// `value` is not a mapping.
    pub fn build_from_value(&self, value: &Value) -> Result<Vec<BuildArg>, IpaError> {
        let options = BuildOptions::from_value(value)?;
        Ok(self.build(&options))
    }
}

/// Renders options without filling defaults.
///
/// - `clean`: `true` → `--clean`, `false` → `--no-clean`, unset → nothing
/// - `archive`: `true` → `--archive`, otherwise nothing
/// - string options: `<flag> <value>`, or the bare flag for an empty value
pub fn render_args(options: &BuildOptions) -> Vec<BuildArg> {
    OptionKey::ALL
        .into_iter()
        .filter_map(|key| render_one(key, options.get(key)))
        .collect()
}

fn render_one(key: OptionKey, value: OptionValue<'_>) -> Option<BuildArg> {
    match (key, value) {
        (_, OptionValue::Unset) => None,
        (OptionKey::Clean, OptionValue::Toggle(true)) => Some(BuildArg::bare("--clean")),
        (OptionKey::Clean, OptionValue::Toggle(false)) => Some(BuildArg::bare("--no-clean")),
        (OptionKey::Archive, OptionValue::Toggle(true)) => Some(BuildArg::bare("--archive")),
        (OptionKey::Archive, OptionValue::Toggle(false)) => None,
        (key, OptionValue::Text(text)) => Some(BuildArg::with_value(key.flag(), text)),
        (key, OptionValue::Toggle(_)) => {
            debug!(option = key.as_str(), "toggle value on a string option; skipping");
            None
        }
    }
}
