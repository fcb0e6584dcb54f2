//! Destination directory resolution.
//!
//! `destination` may be a plain path or a glob. The directory is resolved
//! once per run and reused for both the build and artifact discovery.

use std::path::{Component, Path, PathBuf};

use globset::GlobBuilder;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::types::IpaError;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Resolves the directory artifacts are expected in.
///
/// - unset or empty: `cwd`
/// - a plain path: canonicalized if it exists, otherwise made absolute
///   against `cwd` (the build tool creates it)
/// - a glob: the first match in lexical order, canonicalized; `cwd` when
///   nothing matches
///
/// Relative paths and patterns are taken relative to `cwd`.
pub fn resolve_destination(destination: Option<&str>, cwd: &Path) -> Result<PathBuf, IpaError> {
    let Some(destination) = destination.filter(|d| !d.is_empty()) else {
        return Ok(cwd.to_path_buf());
    };

    let resolved = if destination.contains(GLOB_META) {
        match first_glob_match(destination, cwd)? {
            Some(path) => canonical(&path),
            None => {
                warn!(
                    pattern = destination,
                    fallback = %cwd.display(),
                    "destination glob matched nothing; using working directory"
                );
                cwd.to_path_buf()
            }
        }
    } else {
        let path = cwd.join(destination);
        if path.exists() {
            canonical(&path)
        } else {
            std::path::absolute(&path)?
        }
    };

    debug!(destination, resolved = %resolved.display(), "resolved destination");
    Ok(resolved)
}

fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Walks from the pattern's literal prefix and returns the first path the
/// rest of the pattern matches.
fn first_glob_match(pattern: &str, cwd: &Path) -> Result<Option<PathBuf>, IpaError> {
    let pattern_path = Path::new(pattern);
    let mut root = if pattern_path.is_absolute() {
        PathBuf::new()
    } else {
        cwd.to_path_buf()
    };
    let mut rest: Vec<String> = Vec::new();

    for component in pattern_path.components() {
        let part = component.as_os_str().to_string_lossy();
        if rest.is_empty() && !part.contains(GLOB_META) {
            root.push(component);
            continue;
        }
        match component {
            Component::Normal(_) => rest.push(part.into_owned()),
            _ => {
                return Err(IpaError::Config(format!(
                    "unsupported component `{}` after a wildcard in destination `{}`",
                    part, pattern
                )));
            }
        }
    }

    let matcher = GlobBuilder::new(&rest.join("/"))
        .literal_separator(true)
        .build()
        .map_err(|e| IpaError::Config(format!("invalid destination glob `{}`: {}", pattern, e)))?
        .compile_matcher();

    let recursive = rest.iter().any(|part| part.contains("**"));
    let mut walker = WalkDir::new(&root).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(rest.len());
    }

    let found = walker
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_name().to_string_lossy().starts_with('.')
                || names_hidden(&rest, entry.depth())
        })
        .flatten()
        .find(|entry| {
            entry
                .path()
                .strip_prefix(&root)
                .is_ok_and(|relative| matcher.is_match(relative))
        })
        .map(|entry| entry.into_path());

    Ok(found)
}

/// Whether the pattern component matched at `depth` asks for a dot-entry.
fn names_hidden(rest: &[String], depth: usize) -> bool {
    rest.get(depth - 1).is_some_and(|part| part.starts_with('.'))
}
