//! Sorting raw change events into config, static and content changes.

use std::path::{Path, PathBuf};

use tessera_build::{ChangeEvent, ChangeSet, SiteConfig};

/// Directory names that are never watched.
pub const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "bower_components"];

/// What kind of work an event calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Ignored entirely
    Noise,
    /// Configuration changed; everything is rebuilt
    Config,
    /// File under a static directory
    Static,
    /// Content, layouts, data and anything else
    Dynamic,
}

/// Paths the classifier needs to know about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registrations {
    pub config_files: Vec<PathBuf>,
    pub static_dirs: Vec<PathBuf>,
    /// Output trees the build itself writes to
    pub ignored: Vec<PathBuf>,
}

impl Registrations {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            config_files: config.config_files(),
            static_dirs: config.abs_static_dirs(),
            ignored: vec![config.abs_publish_dir()],
        }
    }

    pub fn is_static(&self, path: &Path) -> bool {
        self.static_dirs.iter().any(|dir| path.starts_with(dir))
    }

    fn is_config(&self, path: &Path) -> bool {
        self.config_files.iter().any(|file| path.starts_with(file))
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignored.iter().any(|dir| path.starts_with(dir))
    }
}

/// Editor swap files, backups and other temporaries.
pub fn is_noise_path(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return true;
    }
    if path
        .components()
        .any(|c| SKIPPED_DIRS.iter().any(|skip| c.as_os_str() == *skip))
    {
        return true;
    }

    let base = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let ext = base.rfind('.').map(|i| &base[i..]).unwrap_or("");

    ext.ends_with('~')
        || matches!(ext, ".swp" | ".swx" | ".tmp" | ".DS_Store")
        || base == "4913"
        || ext.starts_with(".goutputstream")
        || ext.ends_with("jb_old___")
        || ext.ends_with("jb_tmp___")
        || ext.ends_with("jb_bak___")
        || ext.starts_with(".sb-")
        || base.starts_with(".#")
        || base.starts_with('#')
}

pub fn classify(event: &ChangeEvent, registrations: &Registrations) -> Classification {
    // Writes are often followed by a bare CHMOD
    if event.op.is_chmod_only() {
        return Classification::Noise;
    }
    if registrations.is_config(&event.path) {
        return Classification::Config;
    }
    if is_noise_path(&event.path) || registrations.is_ignored(&event.path) {
        return Classification::Noise;
    }
    if registrations.is_static(&event.path) {
        Classification::Static
    } else {
        Classification::Dynamic
    }
}

/// Split `events` into a [`ChangeSet`], dropping noise.
pub fn partition(events: &[ChangeEvent], registrations: &Registrations) -> ChangeSet {
    let mut set = ChangeSet::default();
    for event in events {
        match classify(event, registrations) {
            Classification::Noise => {}
            Classification::Config => set.config.push(event.clone()),
            Classification::Static => set.static_changes.push(event.clone()),
            Classification::Dynamic => set.dynamic_changes.push(event.clone()),
        }
    }
    set
}
