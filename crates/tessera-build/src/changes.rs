//! File change events as seen by the build.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Set of file operations carried by one event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Op(u8);

impl Op {
    pub const CREATE: Op = Op(1);
    pub const WRITE: Op = Op(1 << 1);
    pub const REMOVE: Op = Op(1 << 2);
    pub const RENAME: Op = Op(1 << 3);
    pub const CHMOD: Op = Op(1 << 4);

    pub const fn empty() -> Op {
        Op(0)
    }

    pub const fn contains(self, other: Op) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Op) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Only a permission change, nothing that touches content.
    pub const fn is_chmod_only(self) -> bool {
        self.contains(Op::CHMOD) && !self.intersects(Op(Op::WRITE.0 | Op::CREATE.0))
    }
}

impl BitOr for Op {
    type Output = Op;

    fn bitor(self, rhs: Op) -> Op {
        Op(self.0 | rhs.0)
    }
}

impl BitOrAssign for Op {
    fn bitor_assign(&mut self, rhs: Op) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Op, &str); 5] = [
            (Op::CREATE, "CREATE"),
            (Op::WRITE, "WRITE"),
            (Op::REMOVE, "REMOVE"),
            (Op::RENAME, "RENAME"),
            (Op::CHMOD, "CHMOD"),
        ];

        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(op, _)| self.contains(*op))
            .map(|(_, name)| *name)
            .collect();

        if names.is_empty() {
            f.write_str("Op()")
        } else {
            write!(f, "Op({})", names.join("|"))
        }
    }
}

/// A filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub op: Op,
    pub timestamp: SystemTime,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, op: Op) -> Self {
        Self {
            path: path.into(),
            op,
            timestamp: SystemTime::now(),
        }
    }

    /// Same event for another path.
    pub fn with_path(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            op: self.op,
            timestamp: self.timestamp,
        }
    }

    pub fn is_write_or_create(&self) -> bool {
        self.op.intersects(Op::WRITE | Op::CREATE)
    }

    /// The file is gone from its old path.
    pub fn is_removal(&self) -> bool {
        self.op.intersects(Op::REMOVE | Op::RENAME)
    }
}

/// One batch of events, partitioned by what they affect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub config: Vec<ChangeEvent>,
    pub static_changes: Vec<ChangeEvent>,
    pub dynamic_changes: Vec<ChangeEvent>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.config.is_empty() && self.static_changes.is_empty() && self.dynamic_changes.is_empty()
    }
}

/// Longest written or created path; ties go to the lexicographically smallest.
pub fn pick_changed_path(events: &[ChangeEvent]) -> Option<&Path> {
    events
        .iter()
        .filter(|e| e.is_write_or_create())
        .map(|e| e.path.as_path())
        .min_by(|a, b| {
            let (la, lb) = (a.as_os_str().len(), b.as_os_str().len());
            lb.cmp(&la).then_with(|| a.cmp(b))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_set_semantics() {
        let op = Op::WRITE | Op::CHMOD;

        assert!(op.contains(Op::WRITE));
        assert!(!op.contains(Op::CREATE));
        assert!(!op.is_chmod_only());
        assert!(Op::CHMOD.is_chmod_only());
        assert!((Op::CHMOD | Op::REMOVE).is_chmod_only());
        assert!(!Op::empty().contains(Op::empty()));
        assert_eq!(format!("{:?}", Op::CREATE | Op::RENAME), "Op(CREATE|RENAME)");
    }

    #[test]
    fn picks_longest_written_path() {
        let events = vec![
            ChangeEvent::new("/site/content/a.md", Op::WRITE),
            ChangeEvent::new("/site/content/posts/long.md", Op::REMOVE),
            ChangeEvent::new("/site/content/post/b.md", Op::CREATE),
        ];

        assert_eq!(
            pick_changed_path(&events),
            Some(Path::new("/site/content/post/b.md"))
        );
    }

    #[test]
    fn tie_goes_to_smallest() {
        let events = vec![
            ChangeEvent::new("/c/b.md", Op::WRITE),
            ChangeEvent::new("/c/a.md", Op::WRITE),
        ];

        assert_eq!(pick_changed_path(&events), Some(Path::new("/c/a.md")));
    }

    #[test]
    fn nothing_written() {
        let events = vec![ChangeEvent::new("/c/a.md", Op::REMOVE)];

        assert_eq!(pick_changed_path(&events), None);
    }
}
