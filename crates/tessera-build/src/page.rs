//! Documents: the logical units that get rendered.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tessera_content::{SitemapMeta, TocEntry};

use crate::output::OutputFormat;
use crate::paginator::Paginator;
use crate::target::{TargetPathError, TargetPaths};

/// Kind of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Home,
    Section,
    Page,
    Taxonomy,
    Term,
}

impl PageKind {
    pub const ALL: [PageKind; 5] = [
        PageKind::Home,
        PageKind::Section,
        PageKind::Page,
        PageKind::Taxonomy,
        PageKind::Term,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PageKind::Home => "home",
            PageKind::Section => "section",
            PageKind::Page => "page",
            PageKind::Taxonomy => "taxonomy",
            PageKind::Term => "term",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    /// List kinds own sub-pages and may be paginated.
    pub fn is_list(self) -> bool {
        !matches!(self, PageKind::Page)
    }

    /// Kinds that can carry a feed.
    pub fn has_feed(self) -> bool {
        self.is_list()
    }
}

/// Output of one document for one format.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutput {
    pub format: OutputFormat,
    pub paths: TargetPaths,
    pub paginator: Option<Paginator>,
}

/// A logical content unit.
#[derive(Debug)]
pub struct Document {
    /// Stable identity: the source path, or a synthetic key for generated list pages
    pub id: String,

    /// Absolute source file, if any
    pub source: Option<PathBuf>,

    pub kind: PageKind,

    /// Language code
    pub lang: String,

    /// Top-level section (`posts`), empty for the home page
    pub section: String,

    /// Path components for list pages (`["tags", "rust"]`)
    pub sections: Vec<String>,

    /// Directory of the source file relative to the content dir
    pub dir: PathBuf,

    /// Source file stem (`first-post`)
    pub base_name: String,

    pub title: String,
    pub description: Option<String>,
    pub slug: Option<String>,
    pub url: Option<String>,
    pub layout: Option<String>,
    pub content_type: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub lastmod: Option<DateTime<Utc>>,
    pub weight: i32,
    pub aliases: Vec<String>,
    pub tags: Vec<String>,
    pub sitemap: SitemapMeta,

    /// Rendered HTML body
    pub content: String,
    pub summary: String,
    /// Body as plain text
    pub plain: String,
    pub toc: Vec<TocEntry>,
    pub word_count: usize,

    /// Output formats, main format first
    pub formats: Vec<OutputFormat>,

    /// Sub-pages of a list document, already sorted
    pub pages: Vec<Arc<Document>>,

    main_output: OnceLock<Result<Arc<PageOutput>, TargetPathError>>,
}

impl Document {
    /// A document with empty metadata; callers fill in the rest.
    pub fn new(id: impl Into<String>, kind: PageKind, lang: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: None,
            kind,
            lang: lang.into(),
            section: String::new(),
            sections: Vec::new(),
            dir: PathBuf::new(),
            base_name: String::new(),
            title: String::new(),
            description: None,
            slug: None,
            url: None,
            layout: None,
            content_type: None,
            date: None,
            lastmod: None,
            weight: 0,
            aliases: Vec::new(),
            tags: Vec::new(),
            sitemap: SitemapMeta::default(),
            content: String::new(),
            summary: String::new(),
            plain: String::new(),
            toc: Vec::new(),
            word_count: 0,
            formats: Vec::new(),
            pages: Vec::new(),
            main_output: OnceLock::new(),
        }
    }

    /// The main output, computing it on first access.
    ///
    /// `init` runs at most once per document, even under concurrent access.
    pub fn main_output_or_init<F>(&self, init: F) -> Result<Arc<PageOutput>, TargetPathError>
    where
        F: FnOnce() -> Result<PageOutput, TargetPathError>,
    {
        self.main_output
            .get_or_init(|| init().map(Arc::new))
            .clone()
    }

    /// The main output, if it has been computed.
    pub fn main_output(&self) -> Option<Arc<PageOutput>> {
        self.main_output.get().and_then(|r| r.as_ref().ok().cloned())
    }

    /// Main output format.
    pub fn main_format(&self) -> Option<&OutputFormat> {
        self.formats.first()
    }

    /// Content type used for layout lookup.
    pub fn layout_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(&self.section)
    }

    /// Date of the newest sub-page, or the document's own date.
    pub fn effective_date(&self) -> Option<DateTime<Utc>> {
        self.date
            .or_else(|| self.pages.iter().filter_map(|p| p.date).max())
    }
}

/// Default ordering for page lists.
///
/// Weighted pages first (ascending), then newest date, then title and identity.
pub fn compare_pages(a: &Document, b: &Document) -> Ordering {
    let weight = |d: &Document| if d.weight == 0 { i32::MAX } else { d.weight };

    weight(a)
        .cmp(&weight(b))
        .then_with(|| b.date.cmp(&a.date))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.id.cmp(&b.id))
}
