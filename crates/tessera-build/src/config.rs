//! Site configuration (`site.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default configuration file name, looked up in the source directory.
pub const CONFIG_FILE_NAME: &str = "site.toml";

/// Configuration for building a site.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    /// Base URL for the site
    pub base_url: String,

    /// Site title
    pub title: String,

    /// Language code reported in feeds
    pub language_code: String,

    /// Content directory, relative to the source directory
    pub content_dir: PathBuf,

    /// Layout directory
    pub layout_dir: PathBuf,

    /// Static directories, synced in order (later ones win)
    pub static_dirs: Vec<PathBuf>,

    /// Data directory
    pub data_dir: PathBuf,

    /// Translation directory
    pub i18n_dir: PathBuf,

    /// Output directory
    pub publish_dir: PathBuf,

    /// Remove files from the publish dir that do not exist in the static dirs
    pub clean_destination_dir: bool,

    /// Include drafts
    pub build_drafts: bool,

    /// Render `/name.html` instead of `/name/`
    pub ugly_urls: bool,

    /// Items per pager; 0 disables pagination
    pub paginate: usize,

    /// Path segment for pagers (`/page/2/`)
    pub paginate_path: String,

    /// Maximum items in a feed; negative means unlimited
    pub rss_limit: i64,

    pub disable_rss: bool,
    pub disable_sitemap: bool,

    /// Kinds that are not rendered (`RSS`, `sitemap`, `404`, `taxonomy`, ...)
    pub disable_kinds: Vec<String>,

    pub enable_robots_txt: bool,

    /// Resync the whole static tree on any static change
    pub force_sync_static: bool,

    /// Remove stale artifacts after a build
    pub gc: bool,

    /// Permalink patterns keyed by section
    pub permalinks: BTreeMap<String, String>,

    /// Output format names keyed by page kind
    pub outputs: BTreeMap<String, Vec<String>>,

    pub sitemap: SitemapConfig,

    pub default_content_language: String,
    pub default_content_language_in_subdir: bool,

    /// Languages keyed by code
    pub languages: BTreeMap<String, LanguageConfig>,

    pub server: ServerConfig,

    /// Project root every relative path resolves against
    #[serde(skip)]
    pub source_dir: PathBuf,

    /// File this configuration was loaded from
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "/".to_string(),
            title: "My Site".to_string(),
            language_code: "en-us".to_string(),
            content_dir: PathBuf::from("content"),
            layout_dir: PathBuf::from("layouts"),
            static_dirs: vec![PathBuf::from("static")],
            data_dir: PathBuf::from("data"),
            i18n_dir: PathBuf::from("i18n"),
            publish_dir: PathBuf::from("public"),
            clean_destination_dir: false,
            build_drafts: false,
            ugly_urls: false,
            paginate: 10,
            paginate_path: "page".to_string(),
            rss_limit: -1,
            disable_rss: false,
            disable_sitemap: false,
            disable_kinds: vec![],
            enable_robots_txt: false,
            force_sync_static: false,
            gc: false,
            permalinks: BTreeMap::new(),
            outputs: BTreeMap::new(),
            sitemap: SitemapConfig::default(),
            default_content_language: "en".to_string(),
            default_content_language_in_subdir: false,
            languages: BTreeMap::new(),
            server: ServerConfig::default(),
            source_dir: PathBuf::from("."),
            config_file: None,
        }
    }
}

/// Sitemap defaults.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SitemapConfig {
    pub changefreq: String,
    pub priority: f64,
    pub filename: String,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            changefreq: String::new(),
            priority: -1.0,
            filename: "sitemap.xml".to_string(),
        }
    }
}

/// Per-language settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LanguageConfig {
    pub title: Option<String>,
    pub weight: i32,
    pub content_dir: Option<PathBuf>,
    pub language_code: Option<String>,
}

/// Development server settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub navigate_to_changed: bool,
    pub disable_live_reload: bool,
    pub disable_fast_render: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 1313,
            navigate_to_changed: false,
            disable_live_reload: false,
            disable_fast_render: false,
        }
    }
}

/// Command-line settings layered over the loaded file. Re-applied after every reload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub publish_dir: Option<PathBuf>,
    pub build_drafts: bool,
    pub clean_destination_dir: bool,
    pub gc: bool,
    pub force_sync_static: bool,
    pub port: Option<u16>,
    pub navigate_to_changed: bool,
    pub disable_live_reload: bool,
    pub disable_fast_render: bool,
}

impl ConfigOverrides {
    /// Flags only ever switch features on; they never turn off what the file enables.
    pub fn apply(&self, config: &mut SiteConfig) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(dir) = &self.publish_dir {
            config.publish_dir = dir.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }

        config.build_drafts |= self.build_drafts;
        config.clean_destination_dir |= self.clean_destination_dir;
        config.gc |= self.gc;
        config.force_sync_static |= self.force_sync_static;
        config.server.navigate_to_changed |= self.navigate_to_changed;
        config.server.disable_live_reload |= self.disable_live_reload;
        config.server.disable_fast_render |= self.disable_fast_render;
    }
}

/// A resolved language of the site.
#[derive(Debug, Clone, PartialEq)]
pub struct Language {
    pub code: String,
    pub title: String,
    pub weight: i32,
    pub language_code: String,
    /// Absolute content directory
    pub content_dir: PathBuf,
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl SiteConfig {
    /// Load configuration for the project in `source_dir`.
    ///
    /// An explicit `config_file` must exist. Without one, `site.toml` in the source
    /// directory is used when present and defaults otherwise.
    pub fn load(source_dir: &Path, config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match config_file {
            Some(p) if p.is_absolute() => Some(p.to_path_buf()),
            Some(p) => Some(source_dir.join(p)),
            None => {
                let default = source_dir.join(CONFIG_FILE_NAME);
                default.exists().then_some(default)
            }
        };

        let mut config = match &path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                let config: SiteConfig =
                    toml::from_str(&content).map_err(|e| ConfigError::Parse {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            None => {
                tracing::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                SiteConfig::default()
            }
        };

        config.source_dir = source_dir.to_path_buf();
        config.config_file = path;
        config.validate()?;

        Ok(config)
    }

    /// Load the same project again, then layer `overrides` on top.
    pub fn reload(&self, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = Self::load(&self.source_dir, self.config_file.as_deref())?;
        overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail deep inside a build.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paginate_path.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid("paginate_path must not be empty".into()));
        }

        if !self.languages.is_empty() && !self.languages.contains_key(&self.default_content_language)
        {
            return Err(ConfigError::Invalid(format!(
                "default_content_language {:?} is not listed in [languages]",
                self.default_content_language
            )));
        }

        Ok(())
    }

    /// Resolve a configured path against the source directory.
    pub fn abs_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.source_dir.join(path)
        }
    }

    pub fn abs_publish_dir(&self) -> PathBuf {
        self.abs_path(&self.publish_dir)
    }

    pub fn abs_layout_dir(&self) -> PathBuf {
        self.abs_path(&self.layout_dir)
    }

    pub fn abs_data_dir(&self) -> PathBuf {
        self.abs_path(&self.data_dir)
    }

    pub fn abs_i18n_dir(&self) -> PathBuf {
        self.abs_path(&self.i18n_dir)
    }

    pub fn abs_static_dirs(&self) -> Vec<PathBuf> {
        self.static_dirs.iter().map(|d| self.abs_path(d)).collect()
    }

    /// Files whose change requires a full rebuild.
    pub fn config_files(&self) -> Vec<PathBuf> {
        self.config_file.iter().cloned().collect()
    }

    /// Languages ordered by weight, then code.
    pub fn languages(&self) -> Vec<Language> {
        if self.languages.is_empty() {
            return vec![Language {
                code: self.default_content_language.clone(),
                title: self.title.clone(),
                weight: 0,
                language_code: self.language_code.clone(),
                content_dir: self.abs_path(&self.content_dir),
            }];
        }

        let mut languages: Vec<Language> = self
            .languages
            .iter()
            .map(|(code, lang)| Language {
                code: code.clone(),
                title: lang.title.clone().unwrap_or_else(|| self.title.clone()),
                weight: lang.weight,
                language_code: lang
                    .language_code
                    .clone()
                    .unwrap_or_else(|| self.language_code.clone()),
                content_dir: self.abs_path(lang.content_dir.as_deref().unwrap_or(&self.content_dir)),
            })
            .collect();

        languages.sort_by(|a, b| a.weight.cmp(&b.weight).then_with(|| a.code.cmp(&b.code)));
        languages
    }

    pub fn is_multilingual(&self) -> bool {
        self.languages.len() > 1
    }

    /// URL prefix for a language, if its pages live in a subdirectory.
    pub fn lang_prefix<'a>(&self, code: &'a str) -> Option<&'a str> {
        if !self.is_multilingual() {
            return None;
        }
        if code != self.default_content_language || self.default_content_language_in_subdir {
            Some(code)
        } else {
            None
        }
    }

    /// Whether a page or output kind has not been disabled.
    pub fn is_kind_enabled(&self, kind: &str) -> bool {
        !self
            .disable_kinds
            .iter()
            .any(|k| k.eq_ignore_ascii_case(kind))
    }

    pub fn rss_enabled(&self) -> bool {
        !self.disable_rss && self.is_kind_enabled("RSS")
    }

    pub fn sitemap_enabled(&self) -> bool {
        !self.disable_sitemap && self.is_kind_enabled("sitemap")
    }

    /// Base URL with a single trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    /// Path component of the base URL (`/` or `/docs/`).
    pub fn base_path(&self) -> String {
        let without_scheme = match self.base_url.split_once("://") {
            Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or("/"),
            None => self.base_url.as_str(),
        };
        let trimmed = without_scheme.trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{trimmed}/")
        }
    }
}
