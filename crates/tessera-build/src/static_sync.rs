//! Copying static files into the publish directory.
//!
//! Static roots are overlaid in order: a file in a later root replaces the same
//! relative path from an earlier one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::changes::ChangeEvent;

/// Errors that can occur while syncing static files.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SyncError + '_ {
    move |source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Static file sync collaborator.
pub trait StaticSync: Send + Sync {
    /// Copy every file of `source_dirs` into `dest`.
    ///
    /// With `delete_unmatched`, files in `dest` that no source provides are removed.
    /// Hidden directories in `dest` are left alone. Returns the number of files copied.
    fn sync(
        &self,
        source_dirs: &[PathBuf],
        dest: &Path,
        delete_unmatched: bool,
    ) -> Result<u64, SyncError>;

    /// Apply individual changes under `source_dirs` to `dest`.
    fn sync_events(
        &self,
        source_dirs: &[PathBuf],
        dest: &Path,
        events: &[ChangeEvent],
    ) -> Result<u64, SyncError>;
}

/// Filesystem implementation. Unchanged files (same size, destination not older) are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSync;

impl FsSync {
    /// Relative path → source file, later roots winning.
    fn collect(source_dirs: &[PathBuf]) -> Result<BTreeMap<PathBuf, PathBuf>, SyncError> {
        let mut files = BTreeMap::new();

        for dir in source_dirs {
            if !dir.exists() {
                tracing::debug!("Static dir {} does not exist, skipping", dir.display());
                continue;
            }

            for entry in WalkDir::new(dir).follow_links(true) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) if e.depth() > 0 => {
                        tracing::warn!("Skipping static entry: {}", e);
                        continue;
                    }
                    Err(e) => {
                        return Err(SyncError::Walk {
                            path: dir.clone(),
                            message: e.to_string(),
                        })
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(dir) {
                    files.insert(rel.to_path_buf(), entry.path().to_path_buf());
                }
            }
        }

        Ok(files)
    }

    fn copy_file(src: &Path, dest: &Path) -> Result<bool, SyncError> {
        if is_up_to_date(src, dest) {
            return Ok(false);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        fs::copy(src, dest).map_err(io_error(src))?;
        Ok(true)
    }

    fn delete_unmatched(
        dest: &Path,
        keep: &BTreeMap<PathBuf, PathBuf>,
    ) -> Result<u64, SyncError> {
        let mut removed = 0;

        let walker = WalkDir::new(dest)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && is_hidden(e.path())));

        for entry in walker {
            let entry = entry.map_err(|e| SyncError::Walk {
                path: dest.to_path_buf(),
                message: e.to_string(),
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(dest) else {
                continue;
            };
            if !keep.contains_key(rel) {
                fs::remove_file(entry.path()).map_err(io_error(entry.path()))?;
                removed += 1;
            }
        }

        prune_empty_dirs(dest).map_err(io_error(dest))?;
        Ok(removed)
    }
}

impl StaticSync for FsSync {
    fn sync(
        &self,
        source_dirs: &[PathBuf],
        dest: &Path,
        delete_unmatched: bool,
    ) -> Result<u64, SyncError> {
        fs::create_dir_all(dest).map_err(io_error(dest))?;

        let files = Self::collect(source_dirs)?;
        let mut copied = 0;
        for (rel, src) in &files {
            if Self::copy_file(src, &dest.join(rel))? {
                copied += 1;
            }
        }

        if delete_unmatched {
            let removed = Self::delete_unmatched(dest, &files)?;
            tracing::debug!("Removed {} unmatched files from {}", removed, dest.display());
        }

        tracing::debug!("Synced {} of {} static files", copied, files.len());
        Ok(copied)
    }

    fn sync_events(
        &self,
        source_dirs: &[PathBuf],
        dest: &Path,
        events: &[ChangeEvent],
    ) -> Result<u64, SyncError> {
        let mut synced = 0;

        for event in events {
            let Some(rel) = make_static_path_relative(source_dirs, &event.path) else {
                tracing::debug!("{} is not under a static dir", event.path.display());
                continue;
            };
            let target = dest.join(&rel);

            // The last root that still has the file wins
            let provider = source_dirs
                .iter()
                .rev()
                .map(|dir| dir.join(&rel))
                .find(|candidate| candidate.exists());

            match provider {
                Some(src) if src.is_dir() => {
                    let nested = Self::collect(std::slice::from_ref(&src))?;
                    for (sub, file) in &nested {
                        if Self::copy_file(file, &target.join(sub))? {
                            synced += 1;
                        }
                    }
                }
                Some(src) => {
                    if Self::copy_file(&src, &target)? {
                        synced += 1;
                    }
                }
                None => {
                    if target.is_dir() {
                        fs::remove_dir_all(&target).map_err(io_error(&target))?;
                    } else if target.exists() {
                        fs::remove_file(&target).map_err(io_error(&target))?;
                    } else {
                        continue;
                    }
                    tracing::debug!("Removed {}", target.display());
                    synced += 1;
                }
            }
        }

        Ok(synced)
    }
}

/// Path of `path` relative to the static root that contains it.
pub fn make_static_path_relative(source_dirs: &[PathBuf], path: &Path) -> Option<PathBuf> {
    source_dirs
        .iter()
        .find_map(|dir| path.strip_prefix(dir).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// Remove empty directories below `root`, deepest first. `root` itself is kept.
pub fn prune_empty_dirs(root: &Path) -> std::io::Result<u64> {
    let mut pruned = 0;

    let dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();

    for dir in dirs {
        if fs::read_dir(&dir)?.next().is_none() {
            fs::remove_dir(&dir)?;
            pruned += 1;
        }
    }

    Ok(pruned)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn is_up_to_date(src: &Path, dest: &Path) -> bool {
    let (Ok(src_meta), Ok(dest_meta)) = (fs::metadata(src), fs::metadata(dest)) else {
        return false;
    };
    if src_meta.len() != dest_meta.len() {
        return false;
    }
    match (src_meta.modified(), dest_meta.modified()) {
        (Ok(src_time), Ok(dest_time)) => dest_time >= src_time,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::Op;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn later_roots_override_earlier() {
        let temp = tempdir().unwrap();
        let theme = temp.path().join("theme");
        let site = temp.path().join("static");
        let dest = temp.path().join("public");
        write(&theme.join("css/site.css"), "theme");
        write(&theme.join("logo.svg"), "<svg/>");
        write(&site.join("css/site.css"), "site");

        let copied = FsSync.sync(&[theme, site], &dest, false).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read_to_string(dest.join("css/site.css")).unwrap(), "site");
        assert!(dest.join("logo.svg").exists());
    }

    #[cfg(unix)]
    #[test]
    fn broken_links_do_not_stop_the_sync() {
        let temp = tempdir().unwrap();
        let site = temp.path().join("static");
        let dest = temp.path().join("public");
        write(&site.join("css/site.css"), "site");
        std::os::unix::fs::symlink(temp.path().join("gone.png"), site.join("logo.png")).unwrap();
        std::os::unix::fs::symlink(&site, site.join("css/loop")).unwrap();

        let copied = FsSync.sync(&[site], &dest, false).unwrap();

        assert_eq!(copied, 1);
        assert!(dest.join("css/site.css").exists());
        assert!(!dest.join("logo.png").exists());
    }

    #[test]
    fn second_sync_skips_unchanged() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("static");
        let dest = temp.path().join("public");
        write(&src.join("a.txt"), "a");

        FsSync.sync(std::slice::from_ref(&src), &dest, false).unwrap();
        let copied = FsSync.sync(&[src], &dest, false).unwrap();

        assert_eq!(copied, 0);
    }

    #[test]
    fn delete_unmatched_keeps_hidden_dirs() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("static");
        let dest = temp.path().join("public");
        write(&src.join("keep.txt"), "k");
        write(&dest.join("stale/old.html"), "old");
        write(&dest.join(".git/HEAD"), "ref");

        FsSync.sync(&[src], &dest, true).unwrap();

        assert!(dest.join("keep.txt").exists());
        assert!(!dest.join("stale").exists());
        assert!(dest.join(".git/HEAD").exists());
    }

    #[test]
    fn events_copy_and_remove() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("static");
        let dest = temp.path().join("public");
        write(&src.join("a.txt"), "a");
        write(&dest.join("gone.txt"), "x");

        let events = vec![
            ChangeEvent::new(src.join("a.txt"), Op::WRITE),
            ChangeEvent::new(src.join("gone.txt"), Op::REMOVE),
        ];
        let synced = FsSync.sync_events(&[src], &dest, &events).unwrap();

        assert_eq!(synced, 2);
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "a");
        assert!(!dest.join("gone.txt").exists());
    }

    #[test]
    fn relative_to_static_root() {
        let dirs = vec![PathBuf::from("/site/static"), PathBuf::from("/site/assets")];

        assert_eq!(
            make_static_path_relative(&dirs, Path::new("/site/assets/css/a.css")),
            Some(PathBuf::from("css/a.css"))
        );
        assert_eq!(make_static_path_relative(&dirs, Path::new("/site/static")), None);
        assert_eq!(make_static_path_relative(&dirs, Path::new("/elsewhere/a")), None);
    }

    #[test]
    fn prunes_nested_empty_dirs() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("a/b/c")).unwrap();
        write(&temp.path().join("d/file"), "x");

        let pruned = prune_empty_dirs(temp.path()).unwrap();

        assert_eq!(pruned, 3);
        assert!(temp.path().join("d/file").exists());
    }
}
