//! Post-build artifact discovery.
//!
//! Looks for the most recently modified file with a given suffix directly
//! inside a directory. Only direct children are considered.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::types::{DSYM_OUTPUT_PATH, IPA_OUTPUT_PATH};

/// The artifacts a build publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The packaged, installable `.ipa`.
    Ipa,
    /// The `.dSYM.zip` debug-symbol archive.
    Dsym,
}

impl ArtifactKind {
    /// Both kinds, in publication order.
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Ipa, ArtifactKind::Dsym];

    /// File name suffix the artifact is matched by.
    pub fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Ipa => ".ipa",
            ArtifactKind::Dsym => ".dSYM.zip",
        }
    }

    /// Result store key the artifact path is published under.
    pub fn result_key(&self) -> &'static str {
        match self {
            ArtifactKind::Ipa => IPA_OUTPUT_PATH,
            ArtifactKind::Dsym => DSYM_OUTPUT_PATH,
        }
    }

    /// File name published for dry runs.
    pub fn placeholder_name(&self) -> &'static str {
        match self {
            ArtifactKind::Ipa => "test.ipa",
            ArtifactKind::Dsym => "test.app.dSYM.zip",
        }
    }

    /// Returns the lowercase name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Ipa => "ipa",
            ArtifactKind::Dsym => "dsym",
        }
    }
}

/// Finds build artifacts in a destination directory.
///
/// # Example
///
/// ```no_run
/// use ipabuild_sdk::{ArtifactKind, ArtifactLocator};
///
/// let locator = ArtifactLocator::new("build");
/// if let Some(ipa) = locator.newest(ArtifactKind::Ipa) {
///     println!("IPA: {}", ipa.display());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    dir: PathBuf,
}

impl ArtifactLocator {
    /// Creates a locator for `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory being searched.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Newest artifact of `kind`, or `None` if there is none.
    pub fn newest(&self, kind: ArtifactKind) -> Option<PathBuf> {
        newest_with_suffix(&self.dir, kind.suffix())
    }
}

/// Returns the absolute path of the newest regular file in `dir` whose name
/// ends with `suffix`.
///
/// A missing or unreadable directory yields `None`, as does a directory with
/// no match. Hidden files are skipped. When several files share the newest
/// modification time the one listed first by the filesystem wins.
pub fn newest_with_suffix(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "artifact directory not readable");
            return None;
        }
    };

    let mut candidates: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            if name.starts_with('.') || !name.ends_with(suffix) {
                return None;
            }
            // Follows symlinks, so a link to an artifact counts as that artifact.
            let metadata = fs::metadata(&path).ok()?;
            if !metadata.is_file() {
                return None;
            }
            Some((metadata.modified().ok()?, path))
        })
        .collect();

    // Stable: ties keep directory listing order.
    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    let (_, newest) = candidates.into_iter().next()?;
    debug!(suffix, path = %newest.display(), "found artifact");
    Some(std::path::absolute(&newest).unwrap_or(newest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{FileTime, set_file_mtime};
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, mtime_secs: i64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
        path
    }

    #[test]
    fn test_newest_ipa_wins() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.ipa", 1_600_000_000);
        let b = touch(temp.path(), "b.ipa", 1_700_000_000);

        let found = ArtifactLocator::new(temp.path()).newest(ArtifactKind::Ipa);
        assert_eq!(found, Some(b));
    }

    #[test]
    fn test_newest_regardless_of_name_order() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "a.ipa", 1_700_000_000);
        touch(temp.path(), "z.ipa", 1_600_000_000);

        assert_eq!(newest_with_suffix(temp.path(), ".ipa"), Some(a));
    }

    #[test]
    fn test_no_dsym_is_none() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "App.ipa", 1_700_000_000);
        touch(temp.path(), "App.dSYM", 1_700_000_000);

        assert_eq!(
            ArtifactLocator::new(temp.path()).newest(ArtifactKind::Dsym),
            None
        );
    }

    #[test]
    fn test_dsym_suffix_matched() {
        let temp = TempDir::new().unwrap();
        let dsym = touch(temp.path(), "App.app.dSYM.zip", 1_700_000_000);
        touch(temp.path(), "App.zip", 1_800_000_000);

        assert_eq!(
            ArtifactLocator::new(temp.path()).newest(ArtifactKind::Dsym),
            Some(dsym)
        );
    }

    #[test]
    fn test_missing_directory_is_none() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("does-not-exist");
        assert_eq!(newest_with_suffix(&missing, ".ipa"), None);
    }

    #[test]
    fn test_subdirectories_not_searched() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("nested");
        fs::create_dir(&nested).unwrap();
        touch(&nested, "deep.ipa", 1_700_000_000);
        fs::create_dir(temp.path().join("Folder.ipa")).unwrap();

        assert_eq!(newest_with_suffix(temp.path(), ".ipa"), None);
    }

    #[test]
    fn test_hidden_files_skipped() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), ".partial.ipa", 1_800_000_000);
        let visible = touch(temp.path(), "App.ipa", 1_700_000_000);

        assert_eq!(newest_with_suffix(temp.path(), ".ipa"), Some(visible));
    }

    #[test]
    fn test_result_is_absolute() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "App.ipa", 1_700_000_000);

        let found = newest_with_suffix(temp.path(), ".ipa").unwrap();
        assert!(found.is_absolute());
    }

    #[test]
    fn test_kind_metadata() {
        assert_eq!(ArtifactKind::Ipa.result_key(), "IPA_OUTPUT_PATH");
        assert_eq!(ArtifactKind::Dsym.result_key(), "DSYM_OUTPUT_PATH");
        assert_eq!(ArtifactKind::Dsym.placeholder_name(), "test.app.dSYM.zip");
    }
}
