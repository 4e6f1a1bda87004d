//! Build errors.

use std::fmt;
use std::path::PathBuf;

use crate::config::ConfigError;
use crate::layout::LayoutError;
use crate::static_sync::SyncError;
use crate::target::TargetPathError;

/// A document/format pair that could not be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub document: String,
    pub format: String,
    pub message: String,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.document, self.format, self.message)
    }
}

/// Errors that can occur during a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Static sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Content { path: PathBuf, message: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Target(#[from] TargetPathError),

    #[error("Failed to render {what}: {source}")]
    Layout {
        what: String,
        source: LayoutError,
    },

    #[error("Failed to start render pool: {0}")]
    Pool(String),

    #[error("{} page(s) failed to render:\n{}", failures.len(), join_failures(failures))]
    Partial { failures: Vec<ItemFailure> },
}

fn join_failures(failures: &[ItemFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl BuildError {
    /// Per-item failures, if this is an aggregate.
    pub fn failures(&self) -> &[ItemFailure] {
        match self {
            BuildError::Partial { failures } => failures,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_lists_every_failure() {
        let err = BuildError::Partial {
            failures: vec![
                ItemFailure {
                    document: "posts/a.md".into(),
                    format: "HTML".into(),
                    message: "boom".into(),
                },
                ItemFailure {
                    document: "posts/b.md".into(),
                    format: "RSS".into(),
                    message: "bang".into(),
                },
            ],
        };

        let text = err.to_string();

        assert!(text.starts_with("2 page(s) failed"));
        assert!(text.contains("posts/a.md [HTML]: boom"));
        assert!(text.contains("posts/b.md [RSS]: bang"));
        assert_eq!(err.failures().len(), 2);
    }
}
