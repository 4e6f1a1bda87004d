//! Mapping of symlinked directories back to the paths the site sees.
//!
//! The OS reports changes under the real (canonical) directory. Content that
//! reaches that directory through a symlink has to be rebuilt under the link path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tessera_build::ChangeEvent;

/// Canonical directory targets and the links that point at them.
#[derive(Debug, Clone, Default)]
pub struct SymlinkRegistry {
    links: HashMap<PathBuf, Vec<PathBuf>>,
}

impl SymlinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `link` points at the canonical directory `target`.
    pub fn register(&mut self, target: impl Into<PathBuf>, link: impl Into<PathBuf>) {
        let link = link.into();
        let links = self.links.entry(target.into()).or_default();
        if !links.contains(&link) {
            links.push(link);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }

    /// Paths `path` should be reported as. Empty when it is not behind a link.
    pub fn resolve(&self, path: &Path) -> Vec<PathBuf> {
        if let Some(links) = self.links.get(path) {
            return links.clone();
        }

        match (path.parent(), path.file_name()) {
            (Some(dir), Some(name)) => self
                .links
                .get(dir)
                .map(|links| links.iter().map(|link| link.join(name)).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Rewrite one raw event into the events the build should see.
    pub fn rewrite(&self, event: &ChangeEvent) -> Vec<ChangeEvent> {
        let resolved = self.resolve(&event.path);
        if resolved.is_empty() {
            return vec![event.clone()];
        }
        resolved.into_iter().map(|path| event.with_path(path)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tessera_build::Op;

    #[test]
    fn unknown_paths_pass_through() {
        let registry = SymlinkRegistry::new();
        let event = ChangeEvent::new("/site/content/a.md", Op::WRITE);

        assert!(registry.resolve(&event.path).is_empty());
        assert_eq!(registry.rewrite(&event), vec![event]);
    }

    #[test]
    fn files_in_a_linked_dir_map_to_every_link() {
        let mut registry = SymlinkRegistry::new();
        registry.register("/shared/posts", "/site/content/posts");
        registry.register("/shared/posts", "/site/content/blog");
        registry.register("/shared/posts", "/site/content/blog");

        let rewritten = registry.rewrite(&ChangeEvent::new("/shared/posts/a.md", Op::CREATE));

        let paths: Vec<_> = rewritten.iter().map(|e| e.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/site/content/posts/a.md"),
                PathBuf::from("/site/content/blog/a.md"),
            ]
        );
        assert!(rewritten.iter().all(|e| e.op == Op::CREATE));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn exact_match_wins_over_parent() {
        let mut registry = SymlinkRegistry::new();
        registry.register("/shared", "/site/content/shared");

        assert_eq!(
            registry.resolve(Path::new("/shared")),
            vec![PathBuf::from("/site/content/shared")]
        );
        assert_eq!(
            registry.resolve(Path::new("/shared/x.md")),
            vec![PathBuf::from("/site/content/shared/x.md")]
        );
        assert!(registry.resolve(Path::new("/shared/deep/x.md")).is_empty());
    }
}
