//! Configuration file support for ipabuild.
//!
//! Settings that rarely change between runs (workspace, scheme, output
//! locations) can live in an `ipabuild.toml` instead of being passed as
//! flags every time.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. The path given with `--config`
//! 2. The current working directory (`./ipabuild.toml`)
//! 3. Parent directories (up to the repository root or filesystem root)
//!
//! ## Example Configuration
//!
//! ```toml
//! [options]
//! workspace = "App.xcworkspace"
//! scheme = "App"
//! configuration = "Release"
//! clean = true
//! destination = "build"
//!
//! [tool]
//! command = "ipa"
//! formatter = "xcpretty"
//!
//! [results]
//! path = "target/ipabuild/results.json"
//! ```
//!
//! Flags and `IPA_*` environment variables take precedence over `[options]`.
//! Relative paths in the file are taken relative to the directory holding it.

use anyhow::{Context, Result};
use ipabuild_sdk::{BuildOptions, DEFAULT_FORMATTER, DEFAULT_TOOL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "ipabuild.toml";

/// Root configuration structure for `ipabuild.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IpabuildConfig {
    /// Build options, keyed like the `ipa build` option names.
    ///
    /// Kept untyped until [`build_options`](Self::build_options) so that a
    /// non-table value is reported the same way as any other invalid options
    /// mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<toml::Value>,

    /// Build tool settings.
    pub tool: ToolConfig,

    /// Where results are published.
    pub results: ResultsConfig,
}

/// Build tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Program invoked as `<command> build ...`.
    ///
    /// Defaults to `ipa`.
    pub command: String,

    /// Formatter the tool's output is piped through.
    ///
    /// Defaults to `xcpretty`. An empty string disables formatting.
    pub formatter: Option<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_TOOL.to_string(),
            formatter: Some(DEFAULT_FORMATTER.to_string()),
        }
    }
}

/// Result publication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    /// JSON file results are written to, shared with later pipeline steps.
    ///
    /// When unset, results only live for the duration of the run.
    pub path: Option<PathBuf>,

    /// File `IPA_OUTPUT_PATH=...` is appended to (e.g. `$GITHUB_ENV`).
    ///
    /// When unset, the variable is set in ipabuild's own environment.
    pub env_file: Option<PathBuf>,
}

impl IpabuildConfig {
    /// Loads configuration from the specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: IpabuildConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Searches for `ipabuild.toml` from the current directory upward.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Searches for `ipabuild.toml` starting from `start_dir`, stopping at a
    /// directory containing `.git` or at the filesystem root.
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Parses the `[options]` section.
    ///
    /// Fails if `options` is present but not a table.
    pub fn build_options(&self) -> Result<BuildOptions> {
        let Some(options) = &self.options else {
            return Ok(BuildOptions::default());
        };
        let value = serde_json::to_value(options).context("Failed to read [options]")?;
        BuildOptions::from_value(&value).context("Invalid [options] in config file")
    }

    /// Generates a starter configuration file as a formatted TOML string.
    pub fn generate_starter_toml(scheme: &str) -> String {
        format!(
            r#"# ipabuild configuration file
# CLI flags and IPA_* environment variables override these settings.

[options]
# Workspace or project to build (set one)
# workspace = "{scheme}.xcworkspace"
project = "{scheme}.xcodeproj"

# Scheme and build configuration
scheme = "{scheme}"
configuration = "Release"

# Clean before building (true: --clean, false: --no-clean)
clean = true

# Directory (or glob) the .ipa and .dSYM.zip are written to
destination = "build"

# Provisioning profile to embed. Defaults to SIGH_PROFILE_PATH when unset.
# embed = "{scheme}.mobileprovision"

# Other options: archive, identity, sdk, ipa, xcconfig, xcargs

[tool]
# Build tool invoked as `<command> build ... --verbose`
command = "{tool}"

# Output formatter (set to "" to stream raw output)
formatter = "{formatter}"

[results]
# JSON file later steps read IPA_OUTPUT_PATH / DSYM_OUTPUT_PATH from
path = "target/ipabuild/results.json"

# File IPA_OUTPUT_PATH=... is appended to, e.g. the CI step-output file
# env_file = ".ipabuild.env"
"#,
            scheme = scheme,
            tool = DEFAULT_TOOL,
            formatter = DEFAULT_FORMATTER,
        )
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<IpabuildConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Loads `explicit` if given, otherwise discovers a config file.
    ///
    /// An explicit path that cannot be read is an error; a missing
    /// discovered file is not.
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self {
                config: Some(IpabuildConfig::load_from_file(path)?),
                config_path: Some(path.to_path_buf()),
            });
        }
        match IpabuildConfig::discover()? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    /// Merges CLI options over the config file's `[options]`.
    ///
    /// A relative `destination` from the config file is taken relative to
    /// the directory holding the file.
    pub fn options(&self, cli: BuildOptions) -> Result<BuildOptions> {
        let Some(config) = &self.config else {
            return Ok(cli);
        };
        let mut from_config = config.build_options()?;
        from_config.destination = from_config
            .destination
            .map(|destination| self.relative_to_config_str(destination));
        Ok(cli.or(from_config))
    }

    /// Returns the build tool command.
    pub fn tool(&self, cli: Option<String>) -> String {
        self.resolve(cli, |c| Some(c.tool.command.clone()), DEFAULT_TOOL.to_string())
    }

    /// Returns the formatter command, `None` when disabled.
    pub fn formatter(&self, cli: Option<String>) -> Option<String> {
        let formatter = self.resolve(
            cli,
            |c| Some(c.tool.formatter.clone().unwrap_or_default()),
            DEFAULT_FORMATTER.to_string(),
        );
        (!formatter.trim().is_empty()).then_some(formatter)
    }

    /// Returns the JSON result store path.
    pub fn results_path(&self, cli: Option<PathBuf>) -> Option<PathBuf> {
        cli.or_else(|| {
            self.config
                .as_ref()
                .and_then(|c| c.results.path.clone())
                .map(|path| self.relative_to_config(path))
        })
    }

    /// Returns the environment mirror file.
    pub fn env_file(&self, cli: Option<PathBuf>) -> Option<PathBuf> {
        cli.or_else(|| {
            self.config
                .as_ref()
                .and_then(|c| c.results.env_file.clone())
                .map(|path| self.relative_to_config(path))
        })
    }

    /// Directory holding the loaded config file.
    fn config_dir(&self) -> Option<&Path> {
        self.config_path.as_deref().and_then(Path::parent)
    }

    fn relative_to_config(&self, path: PathBuf) -> PathBuf {
        match self.config_dir() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        }
    }

    fn relative_to_config_str(&self, path: String) -> String {
        if path.is_empty() {
            return path;
        }
        self.relative_to_config(PathBuf::from(path))
            .to_string_lossy()
            .into_owned()
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// # Returns
    ///
    /// The resolved value, preferring CLI over config over default.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&IpabuildConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }
}
