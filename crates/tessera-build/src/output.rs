//! Output formats.

use std::collections::BTreeMap;

use crate::page::PageKind;

/// How an output format is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    /// HTML page, paginated for list pages
    Html,
    /// Syndication feed over a list page's items
    Feed,
    /// Site-level URL listing
    Sitemap,
    /// Any other text format rendered through a layout
    Plain,
}

/// A named rendering target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct OutputFormat {
    /// Name used in configuration (`HTML`, `RSS`)
    pub name: &'static str,
    pub kind: FormatKind,
    /// File name used when a target path ends in a slash
    pub base_name: &'static str,
    pub extension: &'static str,
    pub media_type: &'static str,
    /// Extra path segment so formats sharing an extension do not collide
    pub path_suffix: &'static str,
    pub is_plain_text: bool,
}

impl OutputFormat {
    pub const HTML: OutputFormat = OutputFormat {
        name: "HTML",
        kind: FormatKind::Html,
        base_name: "index",
        extension: "html",
        media_type: "text/html",
        path_suffix: "",
        is_plain_text: false,
    };

    pub const RSS: OutputFormat = OutputFormat {
        name: "RSS",
        kind: FormatKind::Feed,
        base_name: "index",
        extension: "xml",
        media_type: "application/rss+xml",
        path_suffix: "",
        is_plain_text: false,
    };

    pub const SITEMAP: OutputFormat = OutputFormat {
        name: "SITEMAP",
        kind: FormatKind::Sitemap,
        base_name: "sitemap",
        extension: "xml",
        media_type: "application/xml",
        path_suffix: "",
        is_plain_text: false,
    };

    pub const PLAIN: OutputFormat = OutputFormat {
        name: "PLAIN",
        kind: FormatKind::Plain,
        base_name: "index",
        extension: "txt",
        media_type: "text/plain",
        path_suffix: "",
        is_plain_text: true,
    };

    pub fn is_html(&self) -> bool {
        self.kind == FormatKind::Html
    }

    /// File name for a directory-style target (`index.html`).
    pub fn index_file(&self) -> String {
        format!("{}.{}", self.base_name, self.extension)
    }
}

/// Registry of known output formats and the defaults per page kind.
#[derive(Debug, Clone)]
pub struct OutputFormats {
    formats: Vec<OutputFormat>,
    by_kind: BTreeMap<PageKind, Vec<OutputFormat>>,
}

impl OutputFormats {
    /// Built-in formats with configured overrides applied.
    ///
    /// Unknown format names and kinds in the overrides are skipped with a warning.
    pub fn new(overrides: &BTreeMap<String, Vec<String>>) -> Self {
        let formats = vec![
            OutputFormat::HTML,
            OutputFormat::RSS,
            OutputFormat::SITEMAP,
            OutputFormat::PLAIN,
        ];

        let mut by_kind = BTreeMap::new();
        for kind in PageKind::ALL {
            let defaults = match kind {
                PageKind::Page => vec![OutputFormat::HTML],
                PageKind::Home | PageKind::Section | PageKind::Taxonomy | PageKind::Term => {
                    vec![OutputFormat::HTML, OutputFormat::RSS]
                }
            };
            by_kind.insert(kind, defaults);
        }

        let mut registry = Self { formats, by_kind };

        for (kind_name, names) in overrides {
            let Some(kind) = PageKind::from_name(kind_name) else {
                tracing::warn!("Unknown page kind {:?} in [outputs]", kind_name);
                continue;
            };
            let resolved: Vec<OutputFormat> = names
                .iter()
                .filter_map(|name| {
                    let format = registry.get(name);
                    if format.is_none() {
                        tracing::warn!("Unknown output format {:?} for kind {}", name, kind_name);
                    }
                    format
                })
                .collect();
            if !resolved.is_empty() {
                registry.by_kind.insert(kind, resolved);
            }
        }

        registry
    }

    /// Look up a format by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<OutputFormat> {
        self.formats
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Formats for a page kind, main format first.
    pub fn for_kind(&self, kind: PageKind) -> Vec<OutputFormat> {
        self.by_kind.get(&kind).cloned().unwrap_or_default()
    }
}

impl Default for OutputFormats {
    fn default() -> Self {
        Self::new(&BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_per_kind() {
        let formats = OutputFormats::default();

        assert_eq!(formats.for_kind(PageKind::Page), vec![OutputFormat::HTML]);
        assert_eq!(
            formats.for_kind(PageKind::Section),
            vec![OutputFormat::HTML, OutputFormat::RSS]
        );
    }

    #[test]
    fn overrides_replace_defaults() {
        let overrides = BTreeMap::from([
            ("page".to_string(), vec!["html".to_string(), "plain".to_string()]),
            ("home".to_string(), vec!["bogus".to_string()]),
        ]);

        let formats = OutputFormats::new(&overrides);

        assert_eq!(
            formats.for_kind(PageKind::Page),
            vec![OutputFormat::HTML, OutputFormat::PLAIN]
        );
        // Nothing valid left, defaults stay
        assert_eq!(formats.for_kind(PageKind::Home).len(), 2);
    }

    #[test]
    fn index_file_name() {
        assert_eq!(OutputFormat::HTML.index_file(), "index.html");
        assert_eq!(OutputFormat::RSS.index_file(), "index.xml");
    }
}
