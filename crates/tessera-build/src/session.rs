//! Build session state shared across builds of one process.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{ConfigOverrides, SiteConfig};
use crate::layout::TemplateEngine;
use crate::site::SiteGraph;

/// Counters for one language, updated concurrently by the render pool.
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub lang: String,
    pages: AtomicU64,
    paginator_pages: AtomicU64,
    aliases: AtomicU64,
    static_files: AtomicU64,
    cleaned: AtomicU64,
}

/// Point-in-time copy of [`ProcessingStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lang: String,
    pub pages: u64,
    pub paginator_pages: u64,
    pub aliases: u64,
    pub static_files: u64,
    pub cleaned: u64,
}

impl ProcessingStats {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            ..Default::default()
        }
    }

    pub fn add_pages(&self, n: u64) {
        self.pages.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_paginator_pages(&self, n: u64) {
        self.paginator_pages.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_aliases(&self, n: u64) {
        self.aliases.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_static(&self, n: u64) {
        self.static_files.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_cleaned(&self, n: u64) {
        self.cleaned.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lang: self.lang.clone(),
            pages: self.pages.load(Ordering::Relaxed),
            paginator_pages: self.paginator_pages.load(Ordering::Relaxed),
            aliases: self.aliases.load(Ordering::Relaxed),
            static_files: self.static_files.load(Ordering::Relaxed),
            cleaned: self.cleaned.load(Ordering::Relaxed),
        }
    }
}

/// Render the per-language statistics as a text table.
pub fn stats_table(stats: &[StatsSnapshot]) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:<18}", "");
    for s in stats {
        let _ = write!(out, "| {:>6} ", s.lang.to_uppercase());
    }
    out.push('\n');

    let rows: [(&str, fn(&StatsSnapshot) -> u64); 5] = [
        ("Pages", |s| s.pages),
        ("Paginator pages", |s| s.paginator_pages),
        ("Static files", |s| s.static_files),
        ("Aliases", |s| s.aliases),
        ("Cleaned", |s| s.cleaned),
    ];
    for (label, value) in rows {
        let _ = write!(out, "{label:<18}");
        for s in stats {
            let _ = write!(out, "| {:>6} ", value(s));
        }
        out.push('\n');
    }

    out
}

/// URLs recently requested from the dev server.
#[derive(Debug, Clone, Default)]
pub struct VisitedUrls {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl VisitedUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into());
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(url)
    }

    pub fn snapshot(&self) -> HashSet<String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

/// Settings in effect when building for the dev server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMode {
    pub port: u16,
    pub live_reload: bool,
    pub fast_render: bool,
    pub navigate_to_changed: bool,
}

impl ServerMode {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            port: config.server.port,
            live_reload: !config.server.disable_live_reload,
            fast_render: !config.server.disable_fast_render,
            navigate_to_changed: config.server.navigate_to_changed,
        }
    }
}

/// Everything a build needs that outlives a single build.
pub struct BuildSession {
    pub config: SiteConfig,
    /// Re-applied whenever the configuration is reloaded
    pub overrides: ConfigOverrides,
    pub server: Option<ServerMode>,
    pub(crate) graph: Option<SiteGraph>,
    pub(crate) layouts: TemplateEngine,
    stats: BTreeMap<String, Arc<ProcessingStats>>,
    visited: VisitedUrls,
    /// Targets written by the previous build
    pub(crate) published: BTreeSet<String>,
}

impl BuildSession {
    pub fn new(config: SiteConfig) -> Self {
        let layouts = TemplateEngine::new(vec![config.abs_layout_dir()]);
        let stats = Self::fresh_stats(&config);
        Self {
            config,
            overrides: ConfigOverrides::default(),
            server: None,
            graph: None,
            layouts,
            stats,
            visited: VisitedUrls::new(),
            published: BTreeSet::new(),
        }
    }

    /// Start over with `config`, keeping overrides and server state.
    pub fn reset(&mut self, config: SiteConfig) {
        let overrides = std::mem::take(&mut self.overrides);
        let server = self.server.take();
        let visited = self.visited.clone();
        let published = std::mem::take(&mut self.published);

        *self = Self::new(config);
        self.overrides = overrides;
        self.server = server;
        self.visited = visited;
        self.published = published;

        if let Some(mode) = &self.server {
            let port = mode.port;
            self.apply_server_base_url(port);
        }
    }

    /// Switch to dev-server builds.
    pub fn enable_server(&mut self, mode: ServerMode) {
        self.apply_server_base_url(mode.port);
        self.server = Some(mode);
    }

    fn apply_server_base_url(&mut self, port: u16) {
        let base_path = self.config.base_path();
        self.config.base_url = format!("http://localhost:{port}{base_path}");
    }

    pub fn graph(&self) -> Option<&SiteGraph> {
        self.graph.as_ref()
    }

    /// Handle for recording requested URLs.
    pub fn visited(&self) -> VisitedUrls {
        self.visited.clone()
    }

    pub fn live_reload_port(&self) -> Option<u16> {
        self.server
            .as_ref()
            .filter(|m| m.live_reload)
            .map(|m| m.port)
    }

    /// Counters for `lang`, falling back to the default language.
    pub fn stats_for(&self, lang: &str) -> Arc<ProcessingStats> {
        self.stats
            .get(lang)
            .or_else(|| self.stats.get(&self.config.default_content_language))
            .or_else(|| self.stats.values().next())
            .cloned()
            .unwrap_or_else(|| Arc::new(ProcessingStats::new(lang)))
    }

    pub(crate) fn stats_map(&self) -> &BTreeMap<String, Arc<ProcessingStats>> {
        &self.stats
    }

    pub(crate) fn reset_stats(&mut self) {
        self.stats = Self::fresh_stats(&self.config);
    }

    /// Current statistics in language order.
    pub fn stats(&self) -> Vec<StatsSnapshot> {
        self.config
            .languages()
            .iter()
            .filter_map(|l| self.stats.get(&l.code))
            .map(|s| s.snapshot())
            .collect()
    }

    fn fresh_stats(config: &SiteConfig) -> BTreeMap<String, Arc<ProcessingStats>> {
        config
            .languages()
            .into_iter()
            .map(|l| (l.code.clone(), Arc::new(ProcessingStats::new(l.code))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn server_mode_rewrites_base_url() {
        let mut session = BuildSession::new(SiteConfig {
            base_url: "https://example.org/docs/".into(),
            ..Default::default()
        });

        session.enable_server(ServerMode::from_config(&session.config.clone()));

        assert_eq!(session.config.base_url, "http://localhost:1313/docs/");
        assert_eq!(session.live_reload_port(), Some(1313));
    }

    #[test]
    fn reset_keeps_server_mode_and_visited() {
        let mut session = BuildSession::new(SiteConfig::default());
        session.enable_server(ServerMode::from_config(&SiteConfig::default()));
        session.visited().insert("/posts/");

        session.reset(SiteConfig {
            base_url: "https://example.org/".into(),
            ..Default::default()
        });

        assert!(session.server.is_some());
        assert_eq!(session.config.base_url, "http://localhost:1313/");
        assert!(session.visited().contains("/posts/"));
        assert!(session.graph().is_none());
    }

    #[test]
    fn stats_are_per_language() {
        let config: SiteConfig =
            toml::from_str("default_content_language = \"en\"\n[languages.en]\n[languages.de]\n")
                .unwrap();
        let session = BuildSession::new(config);

        session.stats_for("de").add_pages(3);
        session.stats_for("en").add_pages(1);
        session.stats_for("xx").add_static(2);

        let stats = session.stats();
        assert_eq!(stats.len(), 2);
        let de = stats.iter().find(|s| s.lang == "de").unwrap();
        let en = stats.iter().find(|s| s.lang == "en").unwrap();
        assert_eq!(de.pages, 3);
        assert_eq!(en.pages, 1);
        assert_eq!(en.static_files, 2);
    }

    #[test]
    fn table_has_a_column_per_language() {
        let table = stats_table(&[
            StatsSnapshot {
                lang: "en".into(),
                pages: 12,
                ..Default::default()
            },
            StatsSnapshot {
                lang: "fr".into(),
                pages: 4,
                ..Default::default()
            },
        ]);

        let first = table.lines().next().unwrap();
        assert!(first.contains("EN") && first.contains("FR"));
        assert!(table.lines().nth(1).unwrap().starts_with("Pages"));
    }
}
