//! Writing rendered artifacts into the publish directory.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::error::BuildError;

/// Writes artifacts and remembers what was written during a build.
#[derive(Debug)]
pub struct Publisher {
    root: PathBuf,
    written: Mutex<BTreeSet<String>>,
}

impl Publisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` to `target_file`, relative to the publish root.
    pub fn publish(&self, target_file: &str, bytes: &[u8]) -> Result<(), BuildError> {
        let rel = target_file.trim_start_matches('/');
        let path = self.root.join(rel);
        if !is_contained(rel) {
            return Err(BuildError::Write {
                path,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "target leaves the publish directory",
                ),
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| BuildError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, bytes).map_err(|source| BuildError::Write {
            path: path.clone(),
            source,
        })?;

        tracing::trace!("Wrote {}", path.display());
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(rel.to_string());
        Ok(())
    }

    /// Every target written so far.
    pub fn written(&self) -> BTreeSet<String> {
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Whether `rel` stays below the directory it is joined to.
fn is_contained(rel: &str) -> bool {
    Path::new(rel)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Remove previously published files that this build did not write again, then prune
/// directories left empty. Returns the number of files removed.
pub fn collect_garbage(
    root: &Path,
    previous: &BTreeSet<String>,
    current: &BTreeSet<String>,
) -> Result<u64, BuildError> {
    let mut removed = 0;

    for stale in previous.difference(current) {
        if !is_contained(stale) {
            tracing::warn!("Not removing {}: outside the publish directory", stale);
            continue;
        }
        let path = root.join(stale);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Removed stale {}", path.display());
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(BuildError::Write { path, source }),
        }
    }

    if root.exists() {
        crate::static_sync::prune_empty_dirs(root).map_err(|source| BuildError::Write {
            path: root.to_path_buf(),
            source,
        })?;
    }

    Ok(removed)
}
