//! Target path resolution.
//!
//! Every (document, format) pair maps to a file under the publish dir and a permalink.
//! Precedence, highest first:
//!
//! 1. the `url` front matter override,
//! 2. a `[permalinks]` pattern for the document's section,
//! 3. the `slug` front matter,
//! 4. the source file name.
//!
//! A path that ends in a slash gets the format's index file (`index.html`).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::Datelike;
use regex::Regex;

use crate::config::SiteConfig;
use crate::output::OutputFormat;
use crate::page::{Document, PageKind};

/// Where an output lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPaths {
    /// File relative to the publish dir, forward slashes, no leading slash
    pub target_file: String,

    /// Site-relative URL including the base path (`/blog/posts/a/`)
    pub permalink: String,
}

/// Errors computing a target path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TargetPathError {
    #[error("unknown permalink attribute :{attr} in {pattern:?}")]
    UnknownAttribute { attr: String, pattern: String },

    #[error("permalink attribute :{attr} needs a date, but {document} has none")]
    MissingDate { attr: String, document: String },

    #[error("target path for {0} is empty")]
    Empty(String),

    #[error("target path {path:?} of {document} leaves the publish directory")]
    OutsidePublishDir { document: String, path: String },
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":([a-z]+)").expect("permalink attribute regex is valid"))
}

/// Resolves target paths for documents.
#[derive(Debug, Clone)]
pub struct TargetPathResolver {
    /// Scheme and host of the base URL, empty for path-only base URLs
    origin: String,
    base_path: String,
    ugly_urls: bool,
    permalinks: BTreeMap<String, String>,
    lang_prefixes: BTreeMap<String, String>,
}

impl TargetPathResolver {
    pub fn new(config: &SiteConfig) -> Self {
        let lang_prefixes = config
            .languages()
            .into_iter()
            .filter_map(|l| {
                config
                    .lang_prefix(&l.code)
                    .map(|p| (l.code.clone(), p.to_string()))
            })
            .collect();

        let origin = match config.base_url.split_once("://") {
            Some((scheme, rest)) => {
                let host = rest.split('/').next().unwrap_or_default();
                format!("{scheme}://{host}")
            }
            None => String::new(),
        };

        Self {
            origin,
            base_path: config.base_path(),
            ugly_urls: config.ugly_urls,
            permalinks: config.permalinks.clone(),
            lang_prefixes,
        }
    }

    /// Target for `document` in `format`, with an optional `addend` (`/page/2`)
    /// appended before the extension is resolved.
    pub fn target_path(
        &self,
        document: &Document,
        format: &OutputFormat,
        addend: Option<&str>,
    ) -> Result<TargetPaths, TargetPathError> {
        let (mut path, explicit) = self.logical_path(document)?;

        if !explicit {
            if let Some(prefix) = self.lang_prefixes.get(&document.lang) {
                path = format!("/{prefix}{path}");
            }
        }

        if let Some(addend) = addend {
            path = append_addend(&path, addend);
        }

        if path.split('/').any(|segment| segment == "..") {
            return Err(TargetPathError::OutsidePublishDir {
                document: document.id.clone(),
                path,
            });
        }

        Ok(self.finish(&path, format))
    }

    /// Site-relative URL of an arbitrary publish path (`tags/` → `/tags/`).
    pub fn permalink_for(&self, path: &str) -> String {
        format!("{}{}", self.base_path, path.trim_start_matches('/'))
    }

    /// Absolute URL of a site-relative permalink.
    pub fn absolute(&self, permalink: &str) -> String {
        if permalink.contains("://") {
            return permalink.to_string();
        }
        format!("{}{}", self.origin, permalink)
    }

    /// Path before language prefix and extension. The flag marks explicit URL overrides.
    fn logical_path(&self, document: &Document) -> Result<(String, bool), TargetPathError> {
        if let Some(url) = document.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Ok((ensure_leading_slash(url), true));
        }

        if document.kind.is_list() {
            let joined = document.sections.join("/");
            let path = if joined.is_empty() {
                "/".to_string()
            } else {
                format!("/{joined}/")
            };
            return Ok((path, false));
        }

        if let Some(pattern) = self.permalinks.get(&document.section) {
            let expanded = expand_pattern(pattern, document)?;
            let expanded = expanded.trim_matches('/');
            if expanded.is_empty() {
                return Err(TargetPathError::Empty(document.id.clone()));
            }
            return Ok((self.page_path("", expanded), false));
        }

        let dir = document.dir.to_string_lossy().replace('\\', "/");
        let name = match document.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => slug.to_string(),
            None if document.base_name == "index" || document.base_name == "_index" => {
                return Ok((format!("/{}", with_trailing_slash(&dir)), false));
            }
            None => document.base_name.clone(),
        };

        if name.is_empty() {
            return Err(TargetPathError::Empty(document.id.clone()));
        }

        Ok((self.page_path(&dir, &name), false))
    }

    /// Pretty (`/dir/name/`) or ugly (`/dir/name`) path of a regular page.
    fn page_path(&self, dir: &str, name: &str) -> String {
        let mut path = String::from("/");
        if !dir.is_empty() {
            path.push_str(dir.trim_matches('/'));
            path.push('/');
        }
        path.push_str(name);
        if !self.ugly_urls {
            path.push('/');
        }
        path
    }

    fn finish(&self, path: &str, format: &OutputFormat) -> TargetPaths {
        let path = collapse_slashes(path);

        if path.ends_with('/') {
            let mut dir = path.trim_start_matches('/').to_string();
            if !format.path_suffix.is_empty() {
                dir.push_str(format.path_suffix);
                dir.push('/');
            }
            let target_file = format!("{dir}{}", format.index_file());
            let permalink = if format.is_html() {
                self.permalink_for(&dir)
            } else {
                self.permalink_for(&target_file)
            };
            return TargetPaths {
                target_file,
                permalink,
            };
        }

        let file = path.trim_start_matches('/');
        let stem = strip_extension(file);
        let target_file = format!("{stem}.{}", format.extension);
        TargetPaths {
            permalink: self.permalink_for(&target_file),
            target_file,
        }
    }
}

/// Expand `:attribute` tokens of a permalink pattern.
fn expand_pattern(pattern: &str, document: &Document) -> Result<String, TargetPathError> {
    let mut out = String::with_capacity(pattern.len());
    let mut last = 0;

    for caps in attribute_regex().captures_iter(pattern) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let attr = &caps[1];
        out.push_str(&pattern[last..whole.start()]);
        last = whole.end();

        let needs_date = || TargetPathError::MissingDate {
            attr: attr.to_string(),
            document: document.id.clone(),
        };

        let value = match attr {
            "year" => document.date.ok_or_else(needs_date)?.year().to_string(),
            "month" => format!("{:02}", document.date.ok_or_else(needs_date)?.month()),
            "day" => format!("{:02}", document.date.ok_or_else(needs_date)?.day()),
            "section" => document.section.clone(),
            "title" => tessera_content::slugify(&document.title),
            "filename" => document.base_name.clone(),
            "slug" => match document.slug.as_deref().filter(|s| !s.trim().is_empty()) {
                Some(slug) => slug.trim().to_string(),
                None if !document.title.is_empty() => tessera_content::slugify(&document.title),
                None => document.base_name.clone(),
            },
            _ => {
                return Err(TargetPathError::UnknownAttribute {
                    attr: attr.to_string(),
                    pattern: pattern.to_string(),
                })
            }
        };
        out.push_str(&value);
    }

    out.push_str(&pattern[last..]);
    Ok(out)
}

fn append_addend(path: &str, addend: &str) -> String {
    let addend = addend.trim_matches('/');
    if path.ends_with('/') {
        format!("{}/{addend}/", path.trim_end_matches('/'))
    } else {
        format!("{}/{addend}", strip_extension(path))
    }
}

fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn with_trailing_slash(dir: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        String::new()
    } else {
        format!("{dir}/")
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Identity used for list pages in lookups and logs.
pub fn list_id(kind: PageKind, sections: &[String], lang: &str) -> String {
    format!("{}:{}:{}", lang, kind.name(), sections.join("/"))
}
