//! Concurrent multi-format page rendering.
//!
//! Every document is rendered once per output format on a dedicated rayon pool. The
//! first format of a document computes its main output, which is memoized for the
//! rest of the build. Per-item failures are collected and reported together.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tessera_content::TocEntry;

use crate::config::SiteConfig;
use crate::error::{BuildError, ItemFailure};
use crate::layout::{LayoutDescriptor, LayoutError, LayoutLookup};
use crate::output::{FormatKind, OutputFormat};
use crate::page::{Document, PageKind, PageOutput};
use crate::paginator::{pager_addend, pager_permalink, Paginator};
use crate::publish::Publisher;
use crate::reload;
use crate::session::ProcessingStats;
use crate::site::SiteGraph;
use crate::target::{TargetPathError, TargetPathResolver, TargetPaths};

/// Render workers per available core.
const WORKERS_PER_CORE: usize = 4;

/// Default size of the render pool.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * WORKERS_PER_CORE
}

#[derive(Debug, Clone, Serialize)]
struct LanguageLink {
    code: String,
    title: String,
    home: String,
}

#[derive(Debug, Serialize)]
struct SiteView<'a> {
    title: String,
    base_url: String,
    lang: String,
    language_code: String,
    home: String,
    is_multilingual: bool,
    languages: Vec<LanguageLink>,
    data: &'a Value,
    i18n: Option<&'a BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct AltLink {
    name: &'static str,
    media_type: &'static str,
    permalink: String,
}

#[derive(Debug, Serialize)]
struct PageView<'d> {
    id: &'d str,
    kind: PageKind,
    lang: &'d str,
    title: &'d str,
    description: Option<&'d str>,
    section: &'d str,
    permalink: String,
    abs_permalink: String,
    date: Option<String>,
    date_rfc822: Option<String>,
    date_display: Option<String>,
    lastmod: Option<String>,
    summary: &'d str,
    content: &'d str,
    plain: &'d str,
    toc: &'d [TocEntry],
    word_count: usize,
    tags: &'d [String],
    weight: i32,
    alternates: Vec<AltLink>,
}

#[derive(Debug, Serialize)]
struct PagerView<'v, 'd> {
    number: usize,
    total_pages: usize,
    items: &'v [PageView<'d>],
    first: String,
    last: String,
    prev: Option<String>,
    next: Option<String>,
}

#[derive(Serialize)]
struct LayoutContext<'v, 'd> {
    site: &'v SiteView<'v>,
    page: &'v PageView<'d>,
    pages: &'v [PageView<'d>],
    paginator: Option<PagerView<'v, 'd>>,
    format: &'static str,
    feed_permalink: Option<String>,
}

#[derive(Debug, Serialize)]
struct SitemapEntry {
    loc: String,
    lastmod: Option<String>,
    changefreq: Option<String>,
    priority: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Dates {
    date: Option<DateTime<Utc>>,
    lastmod: Option<DateTime<Utc>>,
}

impl Dates {
    fn of(doc: &Document) -> Self {
        let date = doc.effective_date();
        Self {
            date,
            lastmod: doc.lastmod.or(date),
        }
    }
}

/// Everything a render pass reads.
pub struct RenderContext<'a> {
    config: &'a SiteConfig,
    graph: &'a SiteGraph,
    layouts: &'a dyn LayoutLookup,
    publisher: &'a Publisher,
    stats: &'a BTreeMap<String, Arc<ProcessingStats>>,
    resolver: TargetPathResolver,
    live_reload_tag: Option<String>,
    sites: Vec<SiteView<'a>>,
    main_outputs: AtomicUsize,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        config: &'a SiteConfig,
        graph: &'a SiteGraph,
        layouts: &'a dyn LayoutLookup,
        publisher: &'a Publisher,
        stats: &'a BTreeMap<String, Arc<ProcessingStats>>,
        live_reload_port: Option<u16>,
    ) -> Self {
        let resolver = TargetPathResolver::new(config);
        let languages = config.languages();

        let links: Vec<LanguageLink> = languages
            .iter()
            .map(|l| LanguageLink {
                code: l.code.clone(),
                title: l.title.clone(),
                home: home_permalink(&resolver, &l.code),
            })
            .collect();

        let sites = languages
            .iter()
            .map(|l| SiteView {
                title: l.title.clone(),
                base_url: config.base_url(),
                lang: l.code.clone(),
                language_code: l.language_code.clone(),
                home: home_permalink(&resolver, &l.code),
                is_multilingual: config.is_multilingual(),
                languages: links.clone(),
                data: graph.data(),
                i18n: graph.translations(&l.code),
            })
            .collect();

        Self {
            config,
            graph,
            layouts,
            publisher,
            stats,
            resolver,
            live_reload_tag: live_reload_port.map(reload::script_tag),
            sites,
            main_outputs: AtomicUsize::new(0),
        }
    }

    pub fn resolver(&self) -> &TargetPathResolver {
        &self.resolver
    }

    fn site(&self, lang: &str) -> &SiteView<'a> {
        self.sites
            .iter()
            .find(|s| s.lang == lang)
            .unwrap_or(&self.sites[0])
    }

    fn count(&self, lang: &str, f: impl Fn(&ProcessingStats)) {
        if let Some(stats) = self
            .stats
            .get(lang)
            .or_else(|| self.stats.get(&self.config.default_content_language))
        {
            f(stats);
        }
    }

    /// Main output of `doc`, computed at most once per build.
    pub fn main_output(&self, doc: &Document) -> Result<Arc<PageOutput>, TargetPathError> {
        doc.main_output_or_init(|| {
            self.main_outputs.fetch_add(1, Ordering::Relaxed);
            let format = doc
                .main_format()
                .ok_or_else(|| TargetPathError::Empty(doc.id.clone()))?;
            self.compute_output(doc, format)
        })
    }

    /// How many main outputs this context has computed.
    pub fn main_outputs_computed(&self) -> usize {
        self.main_outputs.load(Ordering::Relaxed)
    }

    fn compute_output(
        &self,
        doc: &Document,
        format: &OutputFormat,
    ) -> Result<PageOutput, TargetPathError> {
        let paths = self.resolver.target_path(doc, format, None)?;
        let paginator = if doc.kind.is_list() && format.kind == FormatKind::Html {
            Paginator::new(doc.pages.len(), self.config.paginate)
        } else {
            None
        };

        Ok(PageOutput {
            format: format.clone(),
            paths,
            paginator,
        })
    }

    /// Whether `doc` is part of a fast render limited to `visited`.
    fn is_visited(&self, doc: &Document, visited: &HashSet<String>) -> bool {
        if doc.kind == PageKind::Home {
            return true;
        }
        match self.main_output(doc) {
            Ok(output) => visited.contains(&output.paths.permalink),
            Err(_) => false,
        }
    }

    fn resolve_layout(&self, doc: &Document, format: &OutputFormat) -> Result<String, LayoutError> {
        if let Some(layout) = doc.layout.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            let id = if layout.contains('.') {
                layout.to_string()
            } else {
                format!("{layout}.{}", format.extension)
            };
            return if self.layouts.exists(&id) {
                Ok(id)
            } else {
                Err(LayoutError::NotFound(vec![id]))
            };
        }

        self.layouts
            .resolve(&LayoutDescriptor::for_document(doc), format)
    }

    fn site_layout(&self, name: &str) -> Result<String, BuildError> {
        let candidates = vec![
            name.to_string(),
            format!("_default/{name}"),
            format!("_internal/_default/{name}"),
        ];
        match candidates.iter().find(|c| self.layouts.exists(c)) {
            Some(found) => Ok(found.clone()),
            None => Err(BuildError::Layout {
                what: name.to_string(),
                source: LayoutError::NotFound(candidates),
            }),
        }
    }

    fn render_layout<S: Serialize>(
        &self,
        layout: &str,
        context: &S,
        inject_reload: bool,
    ) -> Result<Vec<u8>, BuildError> {
        let value = minijinja::Value::from_serialize(context);
        let mut out = Vec::new();
        self.layouts
            .render(layout, &value, &mut out)
            .map_err(|source| BuildError::Layout {
                what: layout.to_string(),
                source,
            })?;

        match (&self.live_reload_tag, inject_reload) {
            (Some(tag), true) => match String::from_utf8(out) {
                Ok(html) => Ok(reload::inject_script(&html, tag).into_bytes()),
                Err(e) => Ok(e.into_bytes()),
            },
            _ => Ok(out),
        }
    }

    fn page_view<'d>(&self, doc: &'d Document, paths: &TargetPaths, dates: Dates) -> PageView<'d> {
        PageView {
            id: &doc.id,
            kind: doc.kind,
            lang: &doc.lang,
            title: &doc.title,
            description: doc.description.as_deref(),
            section: &doc.section,
            permalink: paths.permalink.clone(),
            abs_permalink: self.resolver.absolute(&paths.permalink),
            date: dates.date.map(rfc3339),
            date_rfc822: dates.date.map(|d| d.to_rfc2822()),
            date_display: dates.date.map(|d| d.format("%B %-d, %Y").to_string()),
            lastmod: dates.lastmod.map(rfc3339),
            summary: &doc.summary,
            content: &doc.content,
            plain: &doc.plain,
            toc: &doc.toc,
            word_count: doc.word_count,
            tags: &doc.tags,
            weight: doc.weight,
            alternates: Vec::new(),
        }
    }

    /// View of a sub-page in a list.
    fn item_view<'d>(&self, doc: &'d Document) -> PageView<'d> {
        let paths = match self.main_output(doc) {
            Ok(output) => output.paths.clone(),
            Err(e) => {
                tracing::debug!("No permalink for list item {}: {}", doc.id, e);
                TargetPaths {
                    target_file: String::new(),
                    permalink: String::new(),
                }
            }
        };
        self.page_view(doc, &paths, Dates::of(doc))
    }

    fn alternates(&self, doc: &Document, current: &OutputFormat) -> Vec<AltLink> {
        doc.formats
            .iter()
            .filter(|f| *f != current && f.kind != FormatKind::Sitemap)
            .filter(|f| f.kind != FormatKind::Feed || (self.config.rss_enabled() && doc.kind.has_feed()))
            .filter_map(|f| {
                let paths = self.resolver.target_path(doc, f, None).ok()?;
                Some(AltLink {
                    name: f.name,
                    media_type: f.media_type,
                    permalink: paths.permalink,
                })
            })
            .collect()
    }

    fn publish_alias(&self, target_file: &str, permalink: &str) -> Result<(), BuildError> {
        let layout = self.site_layout("alias.html")?;
        let context = minijinja::context! { permalink => permalink };
        let mut out = Vec::new();
        self.layouts
            .render(&layout, &context, &mut out)
            .map_err(|source| BuildError::Layout {
                what: layout.clone(),
                source,
            })?;
        self.publisher.publish(target_file, &out)
    }

    /// Render one document in every applicable format.
    fn render_document(&self, doc: &Document) -> Vec<ItemFailure> {
        let mut failures = Vec::new();

        for (index, format) in doc.formats.iter().enumerate() {
            match format.kind {
                FormatKind::Sitemap => continue,
                FormatKind::Feed if !self.config.rss_enabled() || !doc.kind.has_feed() => continue,
                _ => {}
            }

            let mut fail = |message: String| {
                tracing::error!("{} [{}]: {}", doc.id, format.name, message);
                failures.push(ItemFailure {
                    document: doc.id.clone(),
                    format: format.name.to_string(),
                    message,
                });
            };

            let output = if index == 0 {
                self.main_output(doc)
            } else {
                self.compute_output(doc, format).map(Arc::new)
            };
            let output = match output {
                Ok(output) => output,
                Err(e) => {
                    fail(e.to_string());
                    continue;
                }
            };

            let layout = match self.resolve_layout(doc, format) {
                Ok(layout) => layout,
                Err(e) => {
                    fail(e.to_string());
                    continue;
                }
            };

            let result = match format.kind {
                FormatKind::Feed => self.render_feed(doc, &output, &layout),
                _ => self.render_page(doc, &output, &layout, index == 0),
            };
            if let Err(e) = result {
                fail(e.to_string());
            }
        }

        failures
    }

    fn render_page(
        &self,
        doc: &Document,
        output: &PageOutput,
        layout: &str,
        is_main: bool,
    ) -> Result<(), BuildError> {
        let format = &output.format;
        let site = self.site(&doc.lang);
        let inject = format.is_html();
        let items: Vec<PageView<'_>> = doc.pages.iter().map(|p| self.item_view(p)).collect();

        let mut page = self.page_view(doc, &output.paths, Dates::of(doc));
        page.alternates = self.alternates(doc, format);

        match &output.paginator {
            None => {
                let context = LayoutContext {
                    site,
                    page: &page,
                    pages: &items,
                    paginator: None,
                    format: format.name,
                    feed_permalink: None,
                };
                let bytes = self.render_layout(layout, &context, inject)?;
                self.publisher.publish(&output.paths.target_file, &bytes)?;
                self.count(&doc.lang, |s| s.add_pages(1));
            }
            Some(paginator) => {
                let base = &output.paths.permalink;
                let path = &self.config.paginate_path;
                let total = paginator.total_pages();

                for pager in paginator.pagers() {
                    let n = pager.number;
                    let pager_items = pager.items(&items);
                    let pager_view = PagerView {
                        number: n,
                        total_pages: total,
                        items: pager_items,
                        first: base.clone(),
                        last: pager_permalink(base, path, total),
                        prev: (n > 1).then(|| pager_permalink(base, path, n - 1)),
                        next: (n < total).then(|| pager_permalink(base, path, n + 1)),
                    };

                    if n == 1 {
                        let context = LayoutContext {
                            site,
                            page: &page,
                            pages: &items,
                            paginator: Some(pager_view),
                            format: format.name,
                            feed_permalink: None,
                        };
                        let bytes = self.render_layout(layout, &context, inject)?;
                        self.publisher.publish(&output.paths.target_file, &bytes)?;
                        self.count(&doc.lang, |s| s.add_pages(1));
                        continue;
                    }

                    let paths =
                        self.resolver
                            .target_path(doc, format, Some(pager_addend(path, n).as_str()))?;
                    let dates = pager
                        .items(&doc.pages)
                        .first()
                        .map(|first| Dates::of(first))
                        .unwrap_or_else(|| Dates::of(doc));
                    let mut pager_page = self.page_view(doc, &paths, dates);
                    pager_page.alternates = self.alternates(doc, format);

                    let context = LayoutContext {
                        site,
                        page: &pager_page,
                        pages: &items,
                        paginator: Some(pager_view),
                        format: format.name,
                        feed_permalink: None,
                    };
                    let bytes = self.render_layout(layout, &context, inject)?;
                    self.publisher.publish(&paths.target_file, &bytes)?;
                    self.count(&doc.lang, |s| s.add_paginator_pages(1));
                }

                let first =
                    self.resolver
                        .target_path(doc, format, Some(pager_addend(path, 1).as_str()))?;
                self.publish_alias(&first.target_file, &self.resolver.absolute(base))?;
                self.count(&doc.lang, |s| s.add_aliases(1));
            }
        }

        if is_main && format.is_html() {
            let prefix = self.config.lang_prefix(&doc.lang);
            let target = self.resolver.absolute(&output.paths.permalink);
            for alias in &doc.aliases {
                match alias_target(alias, prefix) {
                    Some(file) => {
                        self.publish_alias(&file, &target)?;
                        self.count(&doc.lang, |s| s.add_aliases(1));
                    }
                    None => tracing::warn!("Ignoring alias {:?} of {}", alias, doc.id),
                }
            }
        }

        Ok(())
    }

    fn render_feed(&self, doc: &Document, output: &PageOutput, layout: &str) -> Result<(), BuildError> {
        let mut pages: &[Arc<Document>] = &doc.pages;
        if let Ok(limit) = usize::try_from(self.config.rss_limit) {
            pages = &pages[..pages.len().min(limit)];
        }

        let items: Vec<PageView<'_>> = pages.iter().map(|p| self.item_view(p)).collect();
        let html = self.main_output(doc)?;
        let page = self.page_view(doc, &html.paths, Dates::of(doc));

        let context = LayoutContext {
            site: self.site(&doc.lang),
            page: &page,
            pages: &items,
            paginator: None,
            format: output.format.name,
            feed_permalink: Some(self.resolver.absolute(&output.paths.permalink)),
        };
        let bytes = self.render_layout(layout, &context, false)?;
        self.publisher.publish(&output.paths.target_file, &bytes)
    }

    /// Sitemaps, robots.txt, 404 pages and the language redirect.
    pub fn render_site_artifacts(&self) -> Result<(), BuildError> {
        if self.config.sitemap_enabled() {
            self.render_sitemaps()?;
        }

        if self.config.enable_robots_txt {
            let layout = self.site_layout("robots.txt")?;
            let sitemap = self
                .resolver
                .absolute(&self.resolver.permalink_for(&self.config.sitemap.filename));
            let bytes = self.render_layout(&layout, &minijinja::context! { sitemap => sitemap }, false)?;
            self.publisher.publish("robots.txt", &bytes)?;
        }

        if self.config.is_kind_enabled("404") {
            let layout = self.site_layout("404.html")?;
            for language in self.config.languages() {
                let target = match self.config.lang_prefix(&language.code) {
                    Some(prefix) => format!("{prefix}/404.html"),
                    None => "404.html".to_string(),
                };
                let doc = Document::new("404", PageKind::Page, &language.code);
                let paths = TargetPaths {
                    permalink: self.resolver.permalink_for(&target),
                    target_file: target,
                };
                let mut page = self.page_view(&doc, &paths, Dates::default());
                page.title = "404 Page not found";
                let context = LayoutContext {
                    site: self.site(&language.code),
                    page: &page,
                    pages: &[],
                    paginator: None,
                    format: OutputFormat::HTML.name,
                    feed_permalink: None,
                };
                let bytes = self.render_layout(&layout, &context, true)?;
                self.publisher.publish(&paths.target_file, &bytes)?;
            }
        }

        if self.config.is_multilingual() && self.config.default_content_language_in_subdir {
            let home = home_permalink(&self.resolver, &self.config.default_content_language);
            self.publish_alias("index.html", &self.resolver.absolute(&home))?;
        }

        Ok(())
    }

    fn render_sitemaps(&self) -> Result<(), BuildError> {
        let filename = self.config.sitemap.filename.as_str();
        let layout = self.site_layout("sitemap.xml")?;

        if !self.config.is_multilingual() {
            let bytes = self.render_sitemap(&layout, &self.config.default_content_language)?;
            return self.publisher.publish(filename, &bytes);
        }

        let mut locations = Vec::new();
        for language in self.config.languages() {
            let target = format!("{}/{filename}", language.code);
            let bytes = self.render_sitemap(&layout, &language.code)?;
            self.publisher.publish(&target, &bytes)?;
            locations.push(self.resolver.absolute(&self.resolver.permalink_for(&target)));
        }

        let index = self.site_layout("sitemapindex.xml")?;
        let bytes =
            self.render_layout(&index, &minijinja::context! { sitemaps => locations }, false)?;
        self.publisher.publish(filename, &bytes)
    }

    fn render_sitemap(&self, layout: &str, lang: &str) -> Result<Vec<u8>, BuildError> {
        let defaults = &self.config.sitemap;

        let entries: Vec<SitemapEntry> = self
            .graph
            .documents()
            .iter()
            .filter(|doc| doc.lang == lang)
            .filter(|doc| doc.main_format().is_some_and(OutputFormat::is_html))
            .filter_map(|doc| {
                let output = self.main_output(doc).ok()?;
                let dates = Dates::of(doc);
                Some(SitemapEntry {
                    loc: self.resolver.absolute(&output.paths.permalink),
                    lastmod: dates.lastmod.map(rfc3339),
                    changefreq: doc
                        .sitemap
                        .changefreq
                        .clone()
                        .or_else(|| Some(defaults.changefreq.clone()))
                        .filter(|c| !c.is_empty()),
                    priority: doc
                        .sitemap
                        .priority
                        .or(Some(defaults.priority))
                        .filter(|p| *p >= 0.0),
                })
            })
            .collect();

        self.render_layout(layout, &minijinja::context! { entries => entries }, false)
    }
}

fn home_permalink(resolver: &TargetPathResolver, lang: &str) -> String {
    let home = Document::new("home", PageKind::Home, lang);
    resolver
        .target_path(&home, &OutputFormat::HTML, None)
        .map(|p| p.permalink)
        .unwrap_or_else(|_| resolver.permalink_for(""))
}

fn rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Publish path of an alias; site-absolute aliases skip the language prefix.
fn alias_target(alias: &str, lang_prefix: Option<&str>) -> Option<String> {
    let alias = alias.trim();
    if alias.is_empty() || alias.contains("://") || alias.split('/').any(|p| p == "..") {
        return None;
    }

    let path = match (alias.starts_with('/'), lang_prefix) {
        (false, Some(prefix)) => format!("{prefix}/{alias}"),
        _ => alias.trim_start_matches('/').to_string(),
    };
    if path.trim_matches('/').is_empty() {
        return None;
    }

    let last = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    if path.ends_with('/') || !last.contains('.') {
        Some(format!("{}/index.html", path.trim_end_matches('/')))
    } else {
        Some(path)
    }
}

/// Renders documents on a dedicated worker pool.
pub struct PageRenderPipeline {
    pool: rayon::ThreadPool,
}

impl PageRenderPipeline {
    /// Pool with [`default_workers`] threads.
    pub fn new() -> Result<Self, BuildError> {
        Self::with_workers(default_workers())
    }

    pub fn with_workers(workers: usize) -> Result<Self, BuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("render-{i}"))
            .build()
            .map_err(|e| BuildError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Render `documents`, or only the home pages and documents whose permalink is
    /// in `visited` when given.
    ///
    /// All documents are attempted; their failures come back as one
    /// [`BuildError::Partial`].
    pub fn render(
        &self,
        ctx: &RenderContext<'_>,
        documents: &[Arc<Document>],
        visited: Option<&HashSet<String>>,
    ) -> Result<(), BuildError> {
        let failures: Vec<ItemFailure> = self.pool.install(|| {
            documents
                .par_iter()
                .filter(|doc| visited.map_or(true, |set| ctx.is_visited(doc, set)))
                .flat_map_iter(|doc| ctx.render_document(doc))
                .collect()
        });

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BuildError::Partial { failures })
        }
    }
}
