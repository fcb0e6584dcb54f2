//! Build options accepted by `ipa build`.
//!
//! The key set is closed: [`OptionKey::ALL`] lists every option in the order
//! its argument is rendered. Anything else found in an options mapping is
//! ignored.

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::IpaError;

/// A recognized build option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionKey {
    Workspace,
    Project,
    Configuration,
    Scheme,
    Clean,
    Archive,
    Destination,
    Embed,
    Identity,
    Sdk,
    Ipa,
    Xcconfig,
    Xcargs,
}

impl OptionKey {
    /// Every option, in canonical rendering order.
    pub const ALL: [OptionKey; 13] = [
        OptionKey::Workspace,
        OptionKey::Project,
        OptionKey::Configuration,
        OptionKey::Scheme,
        OptionKey::Clean,
        OptionKey::Archive,
        OptionKey::Destination,
        OptionKey::Embed,
        OptionKey::Identity,
        OptionKey::Sdk,
        OptionKey::Ipa,
        OptionKey::Xcconfig,
        OptionKey::Xcargs,
    ];

    /// Returns the option name as used in config files and JSON mappings.
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKey::Workspace => "workspace",
            OptionKey::Project => "project",
            OptionKey::Configuration => "configuration",
            OptionKey::Scheme => "scheme",
            OptionKey::Clean => "clean",
            OptionKey::Archive => "archive",
            OptionKey::Destination => "destination",
            OptionKey::Embed => "embed",
            OptionKey::Identity => "identity",
            OptionKey::Sdk => "sdk",
            OptionKey::Ipa => "ipa",
            OptionKey::Xcconfig => "xcconfig",
            OptionKey::Xcargs => "xcargs",
        }
    }

    /// Looks up an option by name. Returns `None` for unrecognized names.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    /// The `ipa build` flag for this option.
    ///
    /// For [`OptionKey::Clean`] this is the positive form; `false` renders
    /// as `--no-clean`.
    pub fn flag(&self) -> &'static str {
        match self {
            OptionKey::Workspace => "-w",
            OptionKey::Project => "-p",
            OptionKey::Configuration => "-c",
            OptionKey::Scheme => "-s",
            OptionKey::Clean => "--clean",
            OptionKey::Archive => "--archive",
            OptionKey::Destination => "-d",
            OptionKey::Embed => "-m",
            OptionKey::Identity => "-i",
            OptionKey::Sdk => "--sdk",
            OptionKey::Ipa => "--ipa",
            OptionKey::Xcconfig => "--xcconfig",
            OptionKey::Xcargs => "--xcargs",
        }
    }

    /// Environment variable the option is read from when not passed explicitly.
    pub fn env_var(&self) -> &'static str {
        match self {
            OptionKey::Workspace => "IPA_WORKSPACE",
            OptionKey::Project => "IPA_PROJECT",
            OptionKey::Configuration => "IPA_CONFIGURATION",
            OptionKey::Scheme => "IPA_SCHEME",
            OptionKey::Clean => "IPA_CLEAN",
            OptionKey::Archive => "IPA_ARCHIVE",
            OptionKey::Destination => "IPA_DESTINATION",
            OptionKey::Embed => "IPA_EMBED",
            OptionKey::Identity => "IPA_IDENTITY",
            OptionKey::Sdk => "IPA_SDK",
            OptionKey::Ipa => "IPA_IPA_FILENAME",
            OptionKey::Xcconfig => "IPA_XCCONFIG",
            OptionKey::Xcargs => "IPA_XCARGS",
        }
    }

    /// Whether the option is an on/off toggle rather than a string.
    pub fn is_toggle(&self) -> bool {
        matches!(self, OptionKey::Clean | OptionKey::Archive)
    }
}

/// The value an option holds, borrowed from [`BuildOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue<'a> {
    Unset,
    Toggle(bool),
    Text(&'a str),
}

/// Options for a single `ipa build` run.
///
/// `clean` and `archive` are tri-state: unset, `Some(true)` or `Some(false)`.
/// Every other option is an optional string forwarded verbatim.
///
/// # Example
///
/// ```
/// use ipabuild_sdk::BuildOptions;
///
/// let options = BuildOptions::from_value(&serde_json::json!({
///     "scheme": "App",
///     "clean": true,
///     "unknown": "ignored",
/// }))?;
/// assert_eq!(options.scheme.as_deref(), Some("App"));
/// assert_eq!(options.clean, Some(true));
/// # Ok::<(), ipabuild_sdk::IpaError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub workspace: Option<String>,
    pub project: Option<String>,
    pub configuration: Option<String>,
    pub scheme: Option<String>,
    pub clean: Option<bool>,
    pub archive: Option<bool>,
    /// Output directory, or a glob whose first match is used.
    pub destination: Option<String>,
    /// Provisioning profile to embed. Filled from the signing step when unset.
    pub embed: Option<String>,
    pub identity: Option<String>,
    pub sdk: Option<String>,
    /// Output `.ipa` file name.
    pub ipa: Option<String>,
    pub xcconfig: Option<String>,
    /// Raw extra arguments handed to xcodebuild.
    pub xcargs: Option<String>,
}

impl BuildOptions {
    /// Creates an empty set of options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from an untyped mapping (JSON object or converted TOML table).
    ///
    /// - Anything other than a mapping is rejected with [`IpaError::InvalidInput`].
    /// - Unrecognized keys and `null` values are skipped.
    /// - `clean`/`archive`: only a boolean `true` turns the toggle on; any other
    ///   non-null value turns it off.
    /// - String options accept strings, numbers and booleans (stringified).
    pub fn from_value(value: &Value) -> Result<Self, IpaError> {
        let Value::Object(map) = value else {
            return Err(IpaError::InvalidInput(format!(
                "expected a mapping of option names to values, got {}",
                value_kind(value)
            )));
        };

        let mut options = Self::new();
        for (name, value) in map {
            let Some(key) = OptionKey::from_name(name) else {
                debug!(option = %name, "ignoring unrecognized option");
                continue;
            };
            if value.is_null() {
                continue;
            }

            if key.is_toggle() {
                let on = match value {
                    Value::Bool(on) => *on,
                    other => {
                        warn!(
                            option = %name,
                            value = %other,
                            "non-boolean value treated as false"
                        );
                        false
                    }
                };
                options.set_toggle(key, on);
                continue;
            }

            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(IpaError::InvalidInput(format!(
                        "option `{}` must be a string, got {}",
                        name,
                        value_kind(other)
                    )));
                }
            };
            options.set_text(key, text);
        }

        Ok(options)
    }

    /// Returns the value held for `key`.
    pub fn get(&self, key: OptionKey) -> OptionValue<'_> {
        let text = match key {
            OptionKey::Clean => return self.clean.map_or(OptionValue::Unset, OptionValue::Toggle),
            OptionKey::Archive => {
                return self.archive.map_or(OptionValue::Unset, OptionValue::Toggle);
            }
            OptionKey::Workspace => &self.workspace,
            OptionKey::Project => &self.project,
            OptionKey::Configuration => &self.configuration,
            OptionKey::Scheme => &self.scheme,
            OptionKey::Destination => &self.destination,
            OptionKey::Embed => &self.embed,
            OptionKey::Identity => &self.identity,
            OptionKey::Sdk => &self.sdk,
            OptionKey::Ipa => &self.ipa,
            OptionKey::Xcconfig => &self.xcconfig,
            OptionKey::Xcargs => &self.xcargs,
        };
        text.as_deref().map_or(OptionValue::Unset, OptionValue::Text)
    }

    /// Sets a string option. Toggle keys are set to `false`, matching
    /// [`from_value`](Self::from_value) for non-boolean toggle values.
    pub fn set_text(&mut self, key: OptionKey, value: impl Into<String>) {
        let value = Some(value.into());
        match key {
            OptionKey::Clean | OptionKey::Archive => self.set_toggle(key, false),
            OptionKey::Workspace => self.workspace = value,
            OptionKey::Project => self.project = value,
            OptionKey::Configuration => self.configuration = value,
            OptionKey::Scheme => self.scheme = value,
            OptionKey::Destination => self.destination = value,
            OptionKey::Embed => self.embed = value,
            OptionKey::Identity => self.identity = value,
            OptionKey::Sdk => self.sdk = value,
            OptionKey::Ipa => self.ipa = value,
            OptionKey::Xcconfig => self.xcconfig = value,
            OptionKey::Xcargs => self.xcargs = value,
        }
    }

    /// Sets a toggle option. Ignored for string keys.
    pub fn set_toggle(&mut self, key: OptionKey, on: bool) {
        match key {
            OptionKey::Clean => self.clean = Some(on),
            OptionKey::Archive => self.archive = Some(on),
            _ => debug!(option = key.as_str(), "not a toggle; ignoring"),
        }
    }

    /// Fills every unset option from `fallback`, keeping values already set.
    pub fn or(self, fallback: BuildOptions) -> Self {
        Self {
            workspace: self.workspace.or(fallback.workspace),
            project: self.project.or(fallback.project),
            configuration: self.configuration.or(fallback.configuration),
            scheme: self.scheme.or(fallback.scheme),
            clean: self.clean.or(fallback.clean),
            archive: self.archive.or(fallback.archive),
            destination: self.destination.or(fallback.destination),
            embed: self.embed.or(fallback.embed),
            identity: self.identity.or(fallback.identity),
            sdk: self.sdk.or(fallback.sdk),
            ipa: self.ipa.or(fallback.ipa),
            xcconfig: self.xcconfig.or(fallback.xcconfig),
            xcargs: self.xcargs.or(fallback.xcargs),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
