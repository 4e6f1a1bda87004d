//! Finding the directories to watch.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tessera_build::SiteConfig;
use walkdir::WalkDir;

use crate::classify::SKIPPED_DIRS;
use crate::symlinks::SymlinkRegistry;

/// Directories to watch and the symlinks found on the way.
#[derive(Debug, Default)]
pub struct WatchDirs {
    /// Canonical, sorted, without duplicates
    pub dirs: Vec<PathBuf>,
    pub symlinks: SymlinkRegistry,
}

/// Every source tree of the site that exists on disk.
pub fn watch_roots(config: &SiteConfig) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = config
        .languages()
        .into_iter()
        .map(|l| l.content_dir)
        .collect();
    roots.push(config.abs_layout_dir());
    roots.push(config.abs_data_dir());
    roots.push(config.abs_i18n_dir());
    roots.extend(config.abs_static_dirs());

    roots.sort();
    roots.dedup();
    roots.retain(|root| root.is_dir());
    roots
}

fn is_skipped(name: &std::ffi::OsStr) -> bool {
    SKIPPED_DIRS.iter().any(|skip| name == *skip)
}

/// Walk `roots`, following directory symlinks.
///
/// Each symlinked directory is registered against its canonical target and the
/// target is queued as a new root. A directory reached twice is walked once.
pub fn discover(roots: &[PathBuf]) -> WatchDirs {
    let mut found = WatchDirs::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut worklist: Vec<PathBuf> = roots.to_vec();

    while let Some(root) = worklist.pop() {
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Cannot read {}: {}", root.display(), e);
                    continue;
                }
            };
            let path = entry.path();

            if entry.path_is_symlink() {
                follow_symlink(path, &mut found, &mut seen, &mut worklist);
                continue;
            }
            if !entry.file_type().is_dir() {
                continue;
            }

            match fs::canonicalize(path) {
                Ok(canonical) => {
                    if seen.insert(canonical.clone()) {
                        found.dirs.push(canonical);
                    }
                }
                Err(e) => tracing::warn!("Cannot resolve {}: {}", path.display(), e),
            }
        }
    }

    found.dirs.sort();
    found.dirs.dedup();
    found
}

fn follow_symlink(
    link: &Path,
    found: &mut WatchDirs,
    seen: &mut HashSet<PathBuf>,
    worklist: &mut Vec<PathBuf>,
) {
    let target = match fs::canonicalize(link) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!("Cannot read symbolic link {}: {}", link.display(), e);
            return;
        }
    };
    let metadata = match fs::metadata(&target) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!("Cannot stat {}: {}", target.display(), e);
            return;
        }
    };

    if metadata.is_dir() {
        found.symlinks.register(&target, link);
        if !seen.contains(&target) {
            worklist.push(target);
        }
    } else if !metadata.is_file() {
        tracing::warn!("Skipping {}: not a file or directory", link.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn collects_directories_and_skips_vcs() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("content");
        fs::create_dir_all(root.join("posts/2024")).unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("posts/a.md"), "a").unwrap();

        let found = discover(&[root.clone()]);

        let canonical = fs::canonicalize(&root).unwrap();
        assert_eq!(
            found.dirs,
            vec![
                canonical.clone(),
                canonical.join("posts"),
                canonical.join("posts/2024"),
            ]
        );
        assert!(found.symlinks.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn follows_directory_symlinks_once() {
        let temp = tempdir().unwrap();
        let shared = temp.path().join("shared");
        let content = temp.path().join("content");
        fs::create_dir_all(shared.join("nested")).unwrap();
        fs::create_dir_all(&content).unwrap();
        std::os::unix::fs::symlink(&shared, content.join("linked")).unwrap();
        std::os::unix::fs::symlink(&shared, content.join("again")).unwrap();

        let found = discover(&[content.clone()]);

        let shared = fs::canonicalize(&shared).unwrap();
        assert!(found.dirs.contains(&shared));
        assert!(found.dirs.contains(&shared.join("nested")));
        assert_eq!(found.dirs.iter().filter(|d| **d == shared).count(), 1);
        assert_eq!(found.symlinks.len(), 2);
        assert_eq!(
            found.symlinks.resolve(&shared.join("post.md")).len(),
            2
        );
    }

    #[test]
    fn roots_are_existing_source_dirs() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("content")).unwrap();
        fs::create_dir_all(temp.path().join("static")).unwrap();
        let config = SiteConfig {
            source_dir: temp.path().to_path_buf(),
            ..Default::default()
        };

        let roots = watch_roots(&config);

        assert_eq!(
            roots,
            vec![temp.path().join("content"), temp.path().join("static")]
        );
    }
}
