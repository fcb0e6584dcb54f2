//! Where build results go.
//!
//! A run writes to two independent sinks:
//!
//! - a [`ResultStore`] holding structured results for later steps in the same
//!   pipeline ([`LaneContext`] in memory, [`JsonResultStore`] on disk)
//! - an [`EnvironmentSink`] mirroring the `.ipa` path for consumers that only
//!   read environment state ([`ProcessEnv`], [`EnvFile`], [`EnvLines`])

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use crate::args::SigningProfileLookup;
use crate::types::{IpaError, SIGH_PROFILE_PATH};

/// Key-value store shared between pipeline steps.
pub trait ResultStore {
    /// Records `value` under `key`. `None` is recorded too: "no artifact" is a
    /// result, distinct from "never published".
    fn publish(&mut self, key: &str, value: Option<&Path>) -> Result<(), IpaError>;

    /// Returns the value under `key`, or `None` if unset or published as `None`.
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Environment variables read by later, independent consumers.
pub trait EnvironmentSink {
    /// Sets `key` to `value`, or clears it when `value` is `None`.
    fn mirror(&mut self, key: &str, value: Option<&Path>) -> Result<(), IpaError>;
}

/// In-memory result store for a single pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneContext {
    values: BTreeMap<String, Option<String>>,
}

impl LaneContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` was published, including as `None`.
    pub fn is_published(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Sets a plain string value, e.g. a result from a step outside this crate.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), Some(value.into()));
    }

    /// All published entries, sorted by key.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_deref()))
    }
}

impl ResultStore for LaneContext {
    fn publish(&mut self, key: &str, value: Option<&Path>) -> Result<(), IpaError> {
        self.values
            .insert(key.to_string(), value.map(path_string));
        Ok(())
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned().flatten()
    }
}

/// On-disk layout of a [`JsonResultStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultDocument {
    /// Published values; `null` means published with no value.
    #[serde(default)]
    pub values: BTreeMap<String, Option<String>>,
    /// RFC 3339 time of the last write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Result store persisted as JSON, so steps running as separate processes
/// can share results.
///
/// Every [`publish`](ResultStore::publish) rewrites the file.
///
/// ```json
/// {
///   "values": {
///     "DSYM_OUTPUT_PATH": null,
///     "IPA_OUTPUT_PATH": "/work/build/App.ipa"
///   },
///   "updated_at": "2026-10-17T09:30:00Z"
/// }
/// ```
#[derive(Debug)]
pub struct JsonResultStore {
    path: PathBuf,
    document: ResultDocument,
}

impl JsonResultStore {
    /// Opens the store at `path`, loading existing values if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IpaError> {
        let path = path.into();
        let document = if path.is_file() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            ResultDocument::default()
        };
        debug!(path = %path.display(), entries = document.values.len(), "opened result store");
        Ok(Self { path, document })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current contents.
    pub fn document(&self) -> &ResultDocument {
        &self.document
    }

    fn save(&mut self) -> Result<(), IpaError> {
        self.document.updated_at = Some(
            OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .map_err(|e| IpaError::Config(format!("failed to format timestamp: {}", e)))?,
        );
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.document)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl ResultStore for JsonResultStore {
    fn publish(&mut self, key: &str, value: Option<&Path>) -> Result<(), IpaError> {
        self.document
            .values
            .insert(key.to_string(), value.map(path_string));
        self.save()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.document.values.get(key).cloned().flatten()
    }
}

/// Mirrors values into this process's environment.
///
/// Child processes spawned afterwards inherit the values. Only use this while
/// no other thread reads or writes the environment.
#[derive(Debug, Default)]
pub struct ProcessEnv;

impl EnvironmentSink for ProcessEnv {
    fn mirror(&mut self, key: &str, value: Option<&Path>) -> Result<(), IpaError> {
        // SAFETY: callers must not mirror while other threads read or write the
        // environment.
        unsafe {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
        Ok(())
    }
}

/// Appends `KEY=value` lines to a file, the format CI systems read step
/// outputs from. A `None` value is written as `KEY=`.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EnvironmentSink for EnvFile {
    fn mirror(&mut self, key: &str, value: Option<&Path>) -> Result<(), IpaError> {
        let value = value.map(path_string).unwrap_or_default();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}={}", key, value)?;
        info!(path = %self.path.display(), key, "wrote environment mirror");
        Ok(())
    }
}

/// Writes `KEY=value` lines to any writer, typically stdout, for a caller
/// that captures the output (`eval`, `>> "$GITHUB_ENV"`).
#[derive(Debug)]
pub struct EnvLines<W> {
    writer: W,
}

impl<W: Write> EnvLines<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EnvironmentSink for EnvLines<W> {
    fn mirror(&mut self, key: &str, value: Option<&Path>) -> Result<(), IpaError> {
        let value = value.map(path_string).unwrap_or_default();
        writeln!(self.writer, "{}={}", key, value)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Provisioning profile published by a signing step: the result store's
/// `SIGH_PROFILE_PATH` first, then the `SIGH_PROFILE_PATH` environment variable.
pub struct StoredSigningProfile<'a> {
    store: &'a dyn ResultStore,
}

impl<'a> StoredSigningProfile<'a> {
    pub fn new(store: &'a dyn ResultStore) -> Self {
        Self { store }
    }
}

impl SigningProfileLookup for StoredSigningProfile<'_> {
    fn signing_profile(&self) -> Option<String> {
        let not_blank = |profile: &String| !profile.trim().is_empty();
        self.store
            .lookup(SIGH_PROFILE_PATH)
            .filter(not_blank)
            .or_else(|| env::var(SIGH_PROFILE_PATH).ok().filter(not_blank))
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_lane_context_records_none() {
        let mut lane = LaneContext::new();
        lane.publish("DSYM_OUTPUT_PATH", None).unwrap();

        assert!(lane.is_published("DSYM_OUTPUT_PATH"));
        assert_eq!(lane.lookup("DSYM_OUTPUT_PATH"), None);
        assert!(!lane.is_published("IPA_OUTPUT_PATH"));
    }

    #[test]
    fn test_json_store_persists_and_reloads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/results.json");

        let mut store = JsonResultStore::open(&path).unwrap();
        store
            .publish("IPA_OUTPUT_PATH", Some(Path::new("/work/App.ipa")))
            .unwrap();
        store.publish("DSYM_OUTPUT_PATH", None).unwrap();

        let reloaded = JsonResultStore::open(&path).unwrap();
        assert_eq!(
            reloaded.lookup("IPA_OUTPUT_PATH").as_deref(),
            Some("/work/App.ipa")
        );
        assert_eq!(
            reloaded.document().values.get("DSYM_OUTPUT_PATH"),
            Some(&None)
        );
        assert!(reloaded.document().updated_at.is_some());
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("results.json");
        fs::write(&path, "not json").unwrap();

        let err = JsonResultStore::open(&path).unwrap_err();
        assert!(matches!(err, IpaError::Serialization(_)));
    }

    #[test]
    fn test_env_file_appends_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("env");
        fs::write(&path, "EXISTING=1\n").unwrap();

        let mut sink = EnvFile::new(&path);
        sink.mirror("IPA_OUTPUT_PATH", Some(Path::new("/work/App.ipa")))
            .unwrap();
        sink.mirror("IPA_OUTPUT_PATH", None).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "EXISTING=1\nIPA_OUTPUT_PATH=/work/App.ipa\nIPA_OUTPUT_PATH=\n"
        );
    }

    #[test]
    fn test_env_lines_written_to_writer() {
        let mut sink = EnvLines::new(Vec::new());
        sink.mirror("IPA_OUTPUT_PATH", Some(Path::new("/work/App.ipa")))
            .unwrap();
        sink.mirror("IPA_OUTPUT_PATH", None).unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(written, "IPA_OUTPUT_PATH=/work/App.ipa\nIPA_OUTPUT_PATH=\n");
    }

    #[test]
    #[serial]
    fn test_process_env_sets_and_clears() {
        let key = "IPABUILD_TEST_MIRROR";
        let mut sink = ProcessEnv;

        sink.mirror(key, Some(Path::new("/work/App.ipa"))).unwrap();
        assert_eq!(env::var(key).as_deref(), Ok("/work/App.ipa"));

        sink.mirror(key, None).unwrap();
        assert!(env::var(key).is_err());
    }

    #[test]
    #[serial]
    fn test_signing_profile_prefers_store() {
        let mut lane = LaneContext::new();
        lane.insert(SIGH_PROFILE_PATH, "/store/App.mobileprovision");

        temp_env::with_var(SIGH_PROFILE_PATH, Some("/env/App.mobileprovision"), || {
            let lookup = StoredSigningProfile::new(&lane);
            assert_eq!(
                lookup.signing_profile().as_deref(),
                Some("/store/App.mobileprovision")
            );
        });
    }

    #[test]
    #[serial]
    fn test_signing_profile_falls_back_to_env() {
        let lane = LaneContext::new();

        temp_env::with_var(SIGH_PROFILE_PATH, Some("/env/App.mobileprovision"), || {
            let lookup = StoredSigningProfile::new(&lane);
            assert_eq!(
                lookup.signing_profile().as_deref(),
                Some("/env/App.mobileprovision")
            );
        });

        let mut blank = LaneContext::new();
        blank.insert(SIGH_PROFILE_PATH, "");
        temp_env::with_var(SIGH_PROFILE_PATH, Some("/env/App.mobileprovision"), || {
            assert_eq!(
                StoredSigningProfile::new(&blank).signing_profile().as_deref(),
                Some("/env/App.mobileprovision")
            );
        });

        temp_env::with_var_unset(SIGH_PROFILE_PATH, || {
            assert_eq!(StoredSigningProfile::new(&lane).signing_profile(), None);
        });
    }
}
