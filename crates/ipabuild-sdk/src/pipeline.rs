//! End-to-end `ipa build` run.
//!
//! A run goes through these steps:
//!
//! 1. **Destination** - resolve the output directory once
//! 2. **Arguments** - fill defaults and render [`BuildArg`]s
//! 3. **Build** - run the tool through a [`BuildRunner`] (skipped on dry runs)
//! 4. **Discovery** - find the newest `.ipa` and `.dSYM.zip` in the destination
//! 5. **Publication** - write both paths to the [`ResultStore`] and mirror the
//!    `.ipa` path into the [`EnvironmentSink`]

use std::env;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, warn};

use crate::args::{ArgumentBuilder, BuildArg};
use crate::artifacts::{ArtifactKind, ArtifactLocator};
use crate::destination::resolve_destination;
use crate::options::BuildOptions;
use crate::runner::{BuildRunner, DEFAULT_TOOL, Invocation};
use crate::sinks::{EnvironmentSink, ResultStore, StoredSigningProfile};
use crate::types::{BuildOutputs, IPA_OUTPUT_PATH, IpaError};

/// A configured build run.
///
/// # Example
///
/// ```
/// use ipabuild_sdk::{BuildOptions, IpaBuild, LaneContext, ProcessRunner, ResultStore};
///
/// struct NoEnv;
/// impl ipabuild_sdk::EnvironmentSink for NoEnv {
///     fn mirror(&mut self, _: &str, _: Option<&std::path::Path>) -> Result<(), ipabuild_sdk::IpaError> {
///         Ok(())
///     }
/// }
///
/// let dir = std::env::temp_dir();
/// let options = BuildOptions {
///     scheme: Some("App".into()),
///     ..BuildOptions::default()
/// };
/// let mut lane = LaneContext::new();
/// let outputs = IpaBuild::new(options)
///     .working_dir(&dir)
///     .dry_run(true)
///     .run(&ProcessRunner::new(), &mut lane, &mut NoEnv)?;
///
/// assert!(lane.lookup("IPA_OUTPUT_PATH").unwrap().ends_with("test.ipa"));
/// assert_eq!(outputs.destination, dir);
/// # Ok::<(), ipabuild_sdk::IpaError>(())
/// ```
#[derive(Debug, Clone)]
pub struct IpaBuild {
    options: BuildOptions,
    tool: String,
    dry_run: bool,
    working_dir: Option<PathBuf>,
}

impl IpaBuild {
    /// Creates a run for `options` using the default `ipa` tool.
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            tool: DEFAULT_TOOL.to_string(),
            dry_run: false,
            working_dir: None,
        }
    }

    /// Creates a run from an untyped options mapping.
    ///
    /// Fails with [`IpaError::InvalidInput`] if `value` is not a mapping.
    pub fn from_value(value: &Value) -> Result<Self, IpaError> {
        Ok(Self::new(BuildOptions::from_value(value)?))
    }

    /// Sets the build tool program.
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Skips the build and publishes placeholder artifact paths instead.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Directory relative destinations are resolved against, and the
    /// fallback destination. Defaults to the process working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The options this run was created with (before default filling).
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Renders the arguments the build tool would receive, filling `embed`
    /// from `store` or the environment.
    pub fn args(&self, store: &dyn ResultStore) -> Vec<BuildArg> {
        let lookup = StoredSigningProfile::new(store);
        ArgumentBuilder::new()
            .signing_profile(&lookup)
            .build(&self.options)
    }

    /// The full tool invocation for this run.
    pub fn invocation(&self, store: &dyn ResultStore) -> Invocation {
        Invocation::ipa_build(&self.tool, &self.args(store))
    }

    /// Runs the build and publishes its artifacts.
    ///
    /// # Errors
    ///
    /// - [`IpaError::BuildFailure`] if the tool exits non-zero; nothing is published
    /// - [`IpaError::Config`] for an invalid destination glob
    /// - I/O or serialization errors from the sinks
    ///
    /// A missing artifact is not an error: it is published as `None`.
    pub fn run(
        &self,
        runner: &dyn BuildRunner,
        store: &mut dyn ResultStore,
        environment: &mut dyn EnvironmentSink,
    ) -> Result<BuildOutputs, IpaError> {
        let cwd = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => env::current_dir()?,
        };
        let destination = resolve_destination(self.options.destination.as_deref(), &cwd)?;
        let args = self.args(&*store);
        let invocation = Invocation::ipa_build(&self.tool, &args);

        if self.dry_run {
            info!(
                command = invocation.display(),
                destination = %destination.display(),
                "dry run; skipping build"
            );
            let ipa_path = destination.join(ArtifactKind::Ipa.placeholder_name());
            let dsym_path = destination.join(ArtifactKind::Dsym.placeholder_name());
            store.publish(ArtifactKind::Ipa.result_key(), Some(ipa_path.as_path()))?;
            store.publish(ArtifactKind::Dsym.result_key(), Some(dsym_path.as_path()))?;
            return Ok(BuildOutputs {
                args,
                destination,
                ipa_path: Some(ipa_path),
                dsym_path: Some(dsym_path),
            });
        }

        runner.run(&invocation)?;

        let locator = ArtifactLocator::new(&destination);
        let ipa_path = locator.newest(ArtifactKind::Ipa);
        let dsym_path = locator.newest(ArtifactKind::Dsym);
        for (kind, path) in [(ArtifactKind::Ipa, &ipa_path), (ArtifactKind::Dsym, &dsym_path)] {
            match path {
                Some(path) => info!(kind = kind.as_str(), path = %path.display(), "found artifact"),
                None => warn!(
                    kind = kind.as_str(),
                    dir = %destination.display(),
                    "no {} file found after build",
                    kind.suffix()
                ),
            }
            store.publish(kind.result_key(), path.as_deref())?;
        }
        environment.mirror(IPA_OUTPUT_PATH, ipa_path.as_deref())?;

        Ok(BuildOutputs {
            args,
            destination,
            ipa_path,
            dsym_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::LaneContext;
    use crate::types::{DSYM_OUTPUT_PATH, SIGH_PROFILE_PATH};
    use filetime::{FileTime, set_file_mtime};
    use serde_json::json;
    use serial_test::serial;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Records invocations and drops the given files into a directory, the
    /// way a real build leaves artifacts behind.
    #[derive(Default)]
    struct FakeRunner {
        calls: RefCell<Vec<Invocation>>,
        produce: Vec<(PathBuf, i64)>,
        fail: bool,
    }

    impl BuildRunner for FakeRunner {
        fn run(&self, invocation: &Invocation) -> Result<(), IpaError> {
            self.calls.borrow_mut().push(invocation.clone());
            if self.fail {
                return Err(IpaError::BuildFailure {
                    command: invocation.display().to_string(),
                    status: "exited with status 65".into(),
                });
            }
            for (path, mtime) in &self.produce {
                fs::write(path, "artifact").unwrap();
                set_file_mtime(path, FileTime::from_unix_time(*mtime, 0)).unwrap();
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryEnv(BTreeMap<String, Option<String>>);

    impl EnvironmentSink for MemoryEnv {
        fn mirror(&mut self, key: &str, value: Option<&Path>) -> Result<(), IpaError> {
            self.0.insert(
                key.to_string(),
                value.map(|v| v.to_string_lossy().into_owned()),
            );
            Ok(())
        }
    }

    fn canonical(dir: &TempDir) -> PathBuf {
        dunce::canonicalize(dir.path()).unwrap()
    }

    #[test]
    #[serial]
    fn test_dry_run_publishes_placeholders_without_running() {
        let temp = TempDir::new().unwrap();
        let dest = canonical(&temp);
        let runner = FakeRunner::default();
        let mut lane = LaneContext::new();
        let mut env = MemoryEnv::default();

        let outputs = IpaBuild::from_value(&json!({
            "scheme": "App",
            "destination": dest.to_str().unwrap(),
        }))
        .unwrap()
        .dry_run(true)
        .run(&runner, &mut lane, &mut env)
        .unwrap();

        assert!(runner.calls.borrow().is_empty());
        assert_eq!(
            lane.lookup(IPA_OUTPUT_PATH),
            Some(dest.join("test.ipa").to_string_lossy().into_owned())
        );
        assert_eq!(
            lane.lookup(DSYM_OUTPUT_PATH),
            Some(dest.join("test.app.dSYM.zip").to_string_lossy().into_owned())
        );
        assert_eq!(outputs.ipa_path, Some(dest.join("test.ipa")));
        assert!(env.0.is_empty());
    }

    #[test]
    #[serial]
    fn test_build_publishes_newest_artifacts() {
        let temp = TempDir::new().unwrap();
        let dest = canonical(&temp);
        let runner = FakeRunner {
            produce: vec![
                (dest.join("old.ipa"), 1_600_000_000),
                (dest.join("App.ipa"), 1_700_000_000),
                (dest.join("App.app.dSYM.zip"), 1_700_000_000),
            ],
            ..FakeRunner::default()
        };
        let mut lane = LaneContext::new();
        let mut env = MemoryEnv::default();

        let options = BuildOptions {
            scheme: Some("App".into()),
            clean: Some(true),
            destination: Some(dest.to_string_lossy().into_owned()),
            ..BuildOptions::default()
        };
        let outputs = IpaBuild::new(options)
            .tool("shenzhen-ipa")
            .run(&runner, &mut lane, &mut env)
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "shenzhen-ipa");
        assert_eq!(
            calls[0].args,
            vec![
                "build".to_string(),
                "-s".into(),
                "App".into(),
                "--clean".into(),
                "-d".into(),
                dest.to_string_lossy().into_owned(),
                "--verbose".into(),
            ]
        );

        let ipa = dest.join("App.ipa");
        assert_eq!(outputs.ipa_path.as_deref(), Some(ipa.as_path()));
        assert_eq!(
            lane.lookup(IPA_OUTPUT_PATH),
            Some(ipa.to_string_lossy().into_owned())
        );
        assert_eq!(
            lane.lookup(DSYM_OUTPUT_PATH),
            Some(dest.join("App.app.dSYM.zip").to_string_lossy().into_owned())
        );
        assert_eq!(
            env.0.get(IPA_OUTPUT_PATH),
            Some(&Some(ipa.to_string_lossy().into_owned()))
        );
        assert!(!env.0.contains_key(DSYM_OUTPUT_PATH));
    }

    #[test]
    #[serial]
    fn test_missing_dsym_published_as_none() {
        let temp = TempDir::new().unwrap();
        let dest = canonical(&temp);
        let runner = FakeRunner {
            produce: vec![(dest.join("App.ipa"), 1_700_000_000)],
            ..FakeRunner::default()
        };
        let mut lane = LaneContext::new();
        let mut env = MemoryEnv::default();

        let outputs = IpaBuild::new(BuildOptions::new())
            .working_dir(&dest)
            .run(&runner, &mut lane, &mut env)
            .unwrap();

        assert_eq!(outputs.dsym_path, None);
        assert!(lane.is_published(DSYM_OUTPUT_PATH));
        assert_eq!(lane.lookup(DSYM_OUTPUT_PATH), None);
        assert!(lane.lookup(IPA_OUTPUT_PATH).is_some());
    }

    #[test]
    #[serial]
    fn test_build_failure_publishes_nothing() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner {
            fail: true,
            ..FakeRunner::default()
        };
        let mut lane = LaneContext::new();
        let mut env = MemoryEnv::default();

        let err = IpaBuild::new(BuildOptions::new())
            .working_dir(temp.path())
            .run(&runner, &mut lane, &mut env)
            .unwrap_err();

        assert!(matches!(err, IpaError::BuildFailure { .. }));
        assert_eq!(runner.calls.borrow().len(), 1);
        assert_eq!(lane.entries().count(), 0);
        assert!(env.0.is_empty());
    }

    #[test]
    fn test_invalid_input_before_anything_runs() {
        let err = IpaBuild::from_value(&json!(["scheme", "App"])).unwrap_err();
        assert!(matches!(err, IpaError::InvalidInput(_)));
    }

    #[test]
    #[serial]
    fn test_embed_defaulted_from_lane_context() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::default();
        let mut lane = LaneContext::new();
        lane.insert(SIGH_PROFILE_PATH, "/profiles/App.mobileprovision");
        let mut env = MemoryEnv::default();

        let outputs = IpaBuild::new(BuildOptions::new())
            .working_dir(temp.path())
            .run(&runner, &mut lane, &mut env)
            .unwrap();

        assert_eq!(
            outputs.args,
            vec![BuildArg::with_value("-m", "/profiles/App.mobileprovision")]
        );
        assert!(
            runner.calls.borrow()[0]
                .args
                .contains(&"/profiles/App.mobileprovision".to_string())
        );
    }

    #[test]
    #[serial]
    fn test_no_destination_uses_working_dir() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::default();
        let mut lane = LaneContext::new();
        let mut env = MemoryEnv::default();

        let outputs = IpaBuild::new(BuildOptions::new())
            .working_dir(temp.path())
            .dry_run(true)
            .run(&runner, &mut lane, &mut env)
            .unwrap();

        assert_eq!(outputs.destination, temp.path());
    }
}
