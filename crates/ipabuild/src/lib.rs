//! # ipabuild
//!
//! Command-line tool that builds an iOS app with `ipa build` and publishes
//! the resulting `.ipa` and `.dSYM.zip` paths for later pipeline steps.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter config
//! ipabuild init --scheme MyApp
//!
//! # Build, piping output through xcpretty
//! ipabuild build --workspace MyApp.xcworkspace --scheme MyApp --clean
//!
//! # Preview the command line without building
//! ipabuild args --scheme MyApp --clean
//!
//! # Find the newest debug-symbol archive in a directory
//! ipabuild locate build --kind dsym
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Run `ipa build` and publish artifact paths |
//! | `args` | Print the `ipa build` command line |
//! | `locate` | Print the newest `.ipa` or `.dSYM.zip` in a directory |
//! | `init` | Write a starter `ipabuild.toml` |
//!
//! ## Options
//!
//! Every build option can be given as a flag, an `IPA_*` environment
//! variable, or in the `[options]` table of `ipabuild.toml`, in that order
//! of precedence. When `--embed` is not given, the provisioning profile
//! published by a signing step (`SIGH_PROFILE_PATH`) is used.
//!
//! ## Results
//!
//! `build` publishes `IPA_OUTPUT_PATH` and `DSYM_OUTPUT_PATH` to the result
//! store (`--results <file.json>`), and mirrors `IPA_OUTPUT_PATH` for later
//! steps. The mirror appends `IPA_OUTPUT_PATH=<path>` to `--env-file`
//! (`$GITHUB_ENV` by default, then `[results] env_file`). Without any of
//! these the line is printed on stdout:
//!
//! ```bash
//! ipabuild build --scheme MyApp | grep '^IPA_OUTPUT_PATH=' >> build.env
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `ipabuild.toml`

#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::{Context, Result, bail};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use ipabuild_sdk::{
    ArtifactKind, ArtifactLocator, BuildOptions, EnvFile, EnvLines, EnvironmentSink, IpaBuild,
    JsonResultStore, LaneContext, ProcessRunner, ResultStore,
};
use std::io;
use std::path::PathBuf;
use tracing::debug;

pub mod config;

use config::{CONFIG_FILE_NAME, ConfigResolver, IpabuildConfig};

/// Build iOS apps with `ipa build` and publish the artifacts.
#[derive(Parser, Debug)]
#[command(name = "ipabuild", author, version, about = "Build and publish iOS .ipa artifacts", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run `ipa build` and publish the .ipa and .dSYM.zip paths.
    Build {
        #[command(flatten)]
        options: OptionArgs,
        #[command(flatten)]
        tool: ToolArgs,
        #[arg(long, help = "Skip the build and publish placeholder artifact paths")]
        dry_run: bool,
        #[arg(long, help = "JSON file to publish results to")]
        results: Option<PathBuf>,
        #[arg(
            long,
            env = "GITHUB_ENV",
            help = "File to append IPA_OUTPUT_PATH=... to (default: print it on stdout)"
        )]
        env_file: Option<PathBuf>,
        #[arg(long, help = "Path to ipabuild.toml (default: discovered)")]
        config: Option<PathBuf>,
    },
    /// Print the `ipa build` command line without running it.
    Args {
        #[command(flatten)]
        options: OptionArgs,
        #[command(flatten)]
        tool: ToolArgs,
        #[arg(long, help = "Print the argv as a JSON array")]
        json: bool,
        #[arg(long, help = "JSON result store to read SIGH_PROFILE_PATH from")]
        results: Option<PathBuf>,
        #[arg(long, help = "Path to ipabuild.toml (default: discovered)")]
        config: Option<PathBuf>,
    },
    /// Print the newest artifact of a kind in a directory.
    Locate {
        #[arg(default_value = ".")]
        dir: PathBuf,
        #[arg(long, value_enum, default_value_t = KindArg::Ipa)]
        kind: KindArg,
    },
    /// Write a starter ipabuild.toml.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
        #[arg(long, default_value = "App", help = "Scheme to prefill")]
        scheme: String,
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

/// `ipa build` options. Each falls back to its `IPA_*` environment variable.
#[derive(Args, Debug, Default, Clone)]
pub struct OptionArgs {
    #[arg(long, env = "IPA_WORKSPACE", help = "Workspace (.xcworkspace) to build")]
    pub workspace: Option<String>,
    #[arg(long, env = "IPA_PROJECT", help = "Project (.xcodeproj) to build")]
    pub project: Option<String>,
    #[arg(long, env = "IPA_CONFIGURATION", help = "Build configuration, e.g. Release")]
    pub configuration: Option<String>,
    #[arg(long, env = "IPA_SCHEME", help = "Scheme to build")]
    pub scheme: Option<String>,
    #[arg(
        long,
        env = "IPA_CLEAN",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        help = "Clean before building (--clean false passes --no-clean)"
    )]
    pub clean: Option<bool>,
    #[arg(
        long,
        env = "IPA_ARCHIVE",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        help = "Archive the build"
    )]
    pub archive: Option<bool>,
    #[arg(long, env = "IPA_DESTINATION", help = "Output directory or glob")]
    pub destination: Option<String>,
    #[arg(long, env = "IPA_EMBED", help = "Provisioning profile to embed")]
    pub embed: Option<String>,
    #[arg(long, env = "IPA_IDENTITY", help = "Code signing identity")]
    pub identity: Option<String>,
    #[arg(long, env = "IPA_SDK", help = "SDK to build against")]
    pub sdk: Option<String>,
    #[arg(long, env = "IPA_IPA_FILENAME", help = "Output .ipa file name")]
    pub ipa: Option<String>,
    #[arg(long, env = "IPA_XCCONFIG", help = "xcconfig file to use")]
    pub xcconfig: Option<String>,
    #[arg(
        long,
        env = "IPA_XCARGS",
        allow_hyphen_values = true,
        help = "Extra arguments passed to xcodebuild"
    )]
    pub xcargs: Option<String>,
}

impl From<OptionArgs> for BuildOptions {
    fn from(args: OptionArgs) -> Self {
        BuildOptions {
            workspace: args.workspace,
            project: args.project,
            configuration: args.configuration,
            scheme: args.scheme,
            clean: args.clean,
            archive: args.archive,
            destination: args.destination,
            embed: args.embed,
            identity: args.identity,
            sdk: args.sdk,
            ipa: args.ipa,
            xcconfig: args.xcconfig,
            xcargs: args.xcargs,
        }
    }
}

/// Build tool overrides.
#[derive(Args, Debug, Default, Clone)]
pub struct ToolArgs {
    #[arg(long, env = "IPABUILD_TOOL", help = "Build tool program (default: ipa)")]
    pub tool: Option<String>,
    #[arg(
        long,
        env = "IPABUILD_FORMATTER",
        help = "Output formatter (default: xcpretty; \"\" disables)"
    )]
    pub formatter: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    /// Packaged app (.ipa)
    Ipa,
    /// Debug symbols (.dSYM.zip)
    Dsym,
}

impl From<KindArg> for ArtifactKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Ipa => ArtifactKind::Ipa,
            KindArg::Dsym => ArtifactKind::Dsym,
        }
    }
}

/// Runs a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build {
            options,
            tool,
            dry_run,
            results,
            env_file,
            config,
        } => cmd_build(options, tool, dry_run, results, env_file, config),
        Command::Args {
            options,
            tool,
            json,
            results,
            config,
        } => cmd_args(options, tool, json, results, config),
        Command::Locate { dir, kind } => cmd_locate(dir, kind.into()),
        Command::Init {
            output,
            scheme,
            force,
        } => cmd_init(output, &scheme, force),
    }
}

fn open_store(path: Option<PathBuf>) -> Result<Box<dyn ResultStore>> {
    match path {
        Some(path) => {
            let store = JsonResultStore::open(&path)
                .with_context(|| format!("opening result store {:?}", path))?;
            Ok(Box::new(store))
        }
        None => Ok(Box::new(LaneContext::new())),
    }
}

fn cmd_build(
    options: OptionArgs,
    tool: ToolArgs,
    dry_run: bool,
    results: Option<PathBuf>,
    env_file: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    let resolver = ConfigResolver::new(config.as_deref())?;
    if let Some(path) = &resolver.config_path {
        debug!(path = %path.display(), "loaded config");
    }

    let options = resolver.options(options.into())?;
    let program = resolver.tool(tool.tool);
    let runner = ProcessRunner::new().formatter(resolver.formatter(tool.formatter));

    let mut store = open_store(resolver.results_path(results))?;
    let env_file = env_file.filter(|path| !path.as_os_str().is_empty());
    let mut environment: Box<dyn EnvironmentSink> = match resolver.env_file(env_file) {
        Some(path) => Box::new(EnvFile::new(path)),
        None => Box::new(EnvLines::new(io::stdout())),
    };

    if dry_run {
        println!("Dry run: skipping {}", program);
    } else {
        println!("Building with {}...", program);
    }

    let outputs = IpaBuild::new(options)
        .tool(program)
        .dry_run(dry_run)
        .run(&runner, &mut *store, &mut *environment)
        .context("ipa build did not complete")?;

    match &outputs.ipa_path {
        Some(path) => println!("✓ IPA: {}", path.display()),
        None => println!(
            "Warning: no .ipa found in {}",
            outputs.destination.display()
        ),
    }
    match &outputs.dsym_path {
        Some(path) => println!("✓ dSYM: {}", path.display()),
        None => println!(
            "Warning: no .dSYM.zip found in {}",
            outputs.destination.display()
        ),
    }

    Ok(())
}

fn cmd_args(
    options: OptionArgs,
    tool: ToolArgs,
    json: bool,
    results: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    let resolver = ConfigResolver::new(config.as_deref())?;
    let options = resolver.options(options.into())?;
    let store = open_store(resolver.results_path(results))?;

    let invocation = IpaBuild::new(options)
        .tool(resolver.tool(tool.tool))
        .invocation(&*store);

    if json {
        let mut argv = vec![invocation.program.clone()];
        argv.extend(invocation.args.iter().cloned());
        println!("{}", serde_json::to_string(&argv)?);
    } else {
        println!("{}", invocation.display());
    }
    Ok(())
}

fn cmd_locate(dir: PathBuf, kind: ArtifactKind) -> Result<()> {
    let locator = ArtifactLocator::new(dir.as_path());
    match locator.newest(kind) {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => bail!("no *{} file found in {}", kind.suffix(), dir.display()),
    }
}

fn cmd_init(output: PathBuf, scheme: &str, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }
    std::fs::write(&output, IpabuildConfig::generate_starter_toml(scheme))
        .with_context(|| format!("writing {:?}", output))?;
    println!("✓ Wrote {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use ipabuild_sdk::OptionKey;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn option_flags_read_documented_env_vars() {
        let cmd = Cli::command();
        let build = cmd.find_subcommand("build").unwrap();
        for key in OptionKey::ALL {
            let arg = build
                .get_arguments()
                .find(|a| a.get_long() == Some(key.as_str()))
                .unwrap_or_else(|| panic!("no --{} flag", key.as_str()));
            assert_eq!(
                arg.get_env().and_then(|e| e.to_str()),
                Some(key.env_var()),
                "--{}",
                key.as_str()
            );
        }
    }

    #[test]
    fn parses_toggles() {
        let cli = Cli::try_parse_from([
            "ipabuild", "args", "--clean", "false", "--archive", "--scheme", "App",
        ])
        .unwrap();
        let Command::Args { options, .. } = cli.command else {
            panic!("expected args command");
        };
        let options = BuildOptions::from(options);
        assert_eq!(options.clean, Some(false));
        assert_eq!(options.archive, Some(true));
        assert_eq!(options.scheme.as_deref(), Some("App"));
    }

    #[test]
    fn parses_hyphenated_xcargs() {
        let cli = Cli::try_parse_from([
            "ipabuild",
            "build",
            "--dry-run",
            "--xcargs",
            "-allowProvisioningUpdates",
        ])
        .unwrap();
        let Command::Build {
            options, dry_run, ..
        } = cli.command
        else {
            panic!("expected build command");
        };
        assert!(dry_run);
        assert_eq!(
            options.xcargs.as_deref(),
            Some("-allowProvisioningUpdates")
        );
    }
}
