//! Layout lookup and rendering.
//!
//! Layouts are minijinja templates loaded from the site's layout directory, falling back
//! to the embedded `_internal/` set so a site without layouts still renders.

use std::io::Write;
use std::path::PathBuf;

use minijinja::{AutoEscape, Environment, ErrorKind, Output, State, Value};

use crate::output::{FormatKind, OutputFormat};
use crate::page::{Document, PageKind};

/// What the lookup needs to know about a document.
#[derive(Debug, Clone, Copy)]
pub struct LayoutDescriptor<'a> {
    pub kind: PageKind,
    /// Content type (defaults to the section)
    pub layout_type: &'a str,
    pub section: &'a str,
    /// First path component of list pages (taxonomy name for terms)
    pub list_root: &'a str,
}

impl<'a> LayoutDescriptor<'a> {
    pub fn for_document(document: &'a Document) -> Self {
        Self {
            kind: document.kind,
            layout_type: document.layout_type(),
            section: &document.section,
            list_root: document.sections.first().map(String::as_str).unwrap_or(""),
        }
    }
}

/// Errors from layout lookup and rendering.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("No layout found, tried {0:?}")]
    NotFound(Vec<String>),

    #[error("Failed to render {layout}: {message}")]
    Render { layout: String, message: String },
}

/// Layout lookup contract used by the render pipeline.
pub trait LayoutLookup: Send + Sync {
    /// Candidate layouts for a document and format, most specific first.
    fn candidates(&self, descriptor: &LayoutDescriptor<'_>, format: &OutputFormat) -> Vec<String>;

    /// Whether a layout can be loaded.
    fn exists(&self, id: &str) -> bool;

    /// Render a layout with `context` into `out`.
    fn render(&self, id: &str, context: &Value, out: &mut dyn Write) -> Result<(), LayoutError>;

    /// First existing candidate.
    fn resolve(
        &self,
        descriptor: &LayoutDescriptor<'_>,
        format: &OutputFormat,
    ) -> Result<String, LayoutError> {
        let candidates = self.candidates(descriptor, format);
        candidates
            .iter()
            .find(|c| self.exists(c))
            .cloned()
            .ok_or(LayoutError::NotFound(candidates))
    }
}

/// Template engine using minijinja.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Engine reading layouts from `layout_dirs` (first match wins), then the embedded set.
    pub fn new(layout_dirs: Vec<PathBuf>) -> Self {
        let mut env = Environment::new();
        env.set_formatter(markup_formatter);

        env.set_loader(move |name| {
            if name.split('/').any(|part| part == "..") {
                return Ok(None);
            }

            if !name.starts_with("_internal/") {
                for dir in &layout_dirs {
                    let path = dir.join(name);
                    match std::fs::read_to_string(&path) {
                        Ok(source) => return Ok(Some(source)),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                        Err(e) => {
                            return Err(minijinja::Error::new(
                                ErrorKind::InvalidOperation,
                                format!("failed to read layout {}", path.display()),
                            )
                            .with_source(e))
                        }
                    }
                }
            }

            Ok(internal_template(name).map(str::to_string))
        });

        Self { env }
    }

    /// Engine with only the embedded layouts.
    pub fn internal() -> Self {
        Self::new(Vec::new())
    }

    /// Drop every loaded template so edited layouts are read again.
    pub fn clear_cache(&mut self) {
        self.env.clear_templates();
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::internal()
    }
}

impl LayoutLookup for TemplateEngine {
    fn candidates(&self, d: &LayoutDescriptor<'_>, format: &OutputFormat) -> Vec<String> {
        let ext = format.extension;
        let mut out = Vec::new();

        if format.kind == FormatKind::Feed {
            match d.kind {
                PageKind::Home => out.push("index.rss.xml".to_string()),
                PageKind::Section => out.push(format!("section/{}.rss.xml", d.section)),
                PageKind::Taxonomy | PageKind::Term => {
                    out.push(format!("taxonomy/{}.rss.xml", d.list_root))
                }
                PageKind::Page => {}
            }
            out.push("_default/rss.xml".to_string());
            out.push("rss.xml".to_string());
            out.push("_internal/_default/rss.xml".to_string());
            return out;
        }

        match d.kind {
            PageKind::Page => {
                if !d.layout_type.is_empty() {
                    out.push(format!("{}/single.{ext}", d.layout_type));
                }
                out.push(format!("_default/single.{ext}"));
                out.push(format!("_internal/_default/single.{ext}"));
            }
            PageKind::Home => {
                out.push(format!("index.{ext}"));
                out.push(format!("_default/list.{ext}"));
                out.push(format!("_internal/_default/list.{ext}"));
            }
            PageKind::Section => {
                out.push(format!("section/{}.{ext}", d.section));
                if !d.layout_type.is_empty() {
                    out.push(format!("{}/list.{ext}", d.layout_type));
                }
                out.push(format!("_default/section.{ext}"));
                out.push(format!("_default/list.{ext}"));
                out.push(format!("_internal/_default/list.{ext}"));
            }
            PageKind::Taxonomy => {
                out.push(format!("taxonomy/{}.terms.{ext}", d.list_root));
                out.push(format!("_default/terms.{ext}"));
                out.push(format!("_default/list.{ext}"));
                out.push(format!("_internal/_default/list.{ext}"));
            }
            PageKind::Term => {
                out.push(format!("taxonomy/{}.{ext}", d.list_root));
                out.push(format!("_default/taxonomy.{ext}"));
                out.push(format!("_default/list.{ext}"));
                out.push(format!("_internal/_default/list.{ext}"));
            }
        }

        out
    }

    fn exists(&self, id: &str) -> bool {
        self.env.get_template(id).is_ok()
    }

    fn render(&self, id: &str, context: &Value, out: &mut dyn Write) -> Result<(), LayoutError> {
        let render_error = |e: minijinja::Error| LayoutError::Render {
            layout: id.to_string(),
            message: format!("{e:#}"),
        };

        let tmpl = self.env.get_template(id).map_err(render_error)?;
        tmpl.render_captured_to(context, out)
            .map(|_| ())
            .map_err(render_error)
    }
}

/// HTML/XML escaping that leaves `/` alone so URLs stay readable.
fn markup_formatter(out: &mut Output, state: &State, value: &Value) -> Result<(), minijinja::Error> {
    match (state.auto_escape(), value.as_str()) {
        (AutoEscape::Html, Some(text)) if !value.is_safe() => out
            .write_str(&escape_markup(text))
            .map_err(|_| minijinja::Error::new(ErrorKind::WriteFailure, "failed to write output")),
        _ => minijinja::escape_formatter(out, state, value),
    }
}

fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn internal_template(name: &str) -> Option<&'static str> {
    let source = match name {
        "_internal/_default/baseof.html" => BASE_TEMPLATE,
        "_internal/_default/single.html" => SINGLE_TEMPLATE,
        "_internal/_default/list.html" => LIST_TEMPLATE,
        "_internal/_default/single.txt" => SINGLE_TEXT_TEMPLATE,
        "_internal/_default/list.txt" => LIST_TEXT_TEMPLATE,
        "_internal/_default/rss.xml" => RSS_TEMPLATE,
        "_internal/_default/sitemap.xml" => SITEMAP_TEMPLATE,
        "_internal/_default/sitemapindex.xml" => SITEMAP_INDEX_TEMPLATE,
        "_internal/_default/robots.txt" => ROBOTS_TEMPLATE,
        "_internal/_default/alias.html" => ALIAS_TEMPLATE,
        "_internal/_default/404.html" => NOT_FOUND_TEMPLATE,
        _ => return None,
    };
    Some(source)
}

const BASE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="{{ site.lang }}">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{% if page.title %}{{ page.title }} - {% endif %}{{ site.title }}</title>
  {% for alt in page.alternates %}<link rel="alternate" type="{{ alt.media_type }}" href="{{ alt.permalink }}">
  {% endfor %}
</head>
<body>
  <nav class="site-nav">
    <a href="{{ site.home }}" class="site-title">{{ site.title }}</a>
  </nav>
  <main class="main">
    {% block content %}{% endblock %}
  </main>
</body>
</html>"##;

const SINGLE_TEMPLATE: &str = r##"{% extends "_internal/_default/baseof.html" %}

{% block content %}
<article class="page">
  <h1>{{ page.title }}</h1>
  {% if page.date %}<time datetime="{{ page.date }}">{{ page.date_display }}</time>{% endif %}
  <div class="content">
    {{ page.content | safe }}
  </div>
</article>
{% endblock %}"##;

const LIST_TEMPLATE: &str = r##"{% extends "_internal/_default/baseof.html" %}

{% block content %}
<section class="list">
  {% if page.title %}<h1>{{ page.title }}</h1>{% endif %}
  {{ page.content | safe }}
  <ul class="pages">
  {% for item in (paginator.items if paginator else pages) %}
    <li><a href="{{ item.permalink }}">{{ item.title }}</a>{% if item.summary %} <p>{{ item.summary }}</p>{% endif %}</li>
  {% endfor %}
  </ul>
  {% if paginator and paginator.total_pages > 1 %}
  <nav class="pagination">
    {% if paginator.prev %}<a rel="prev" href="{{ paginator.prev }}">Newer</a>{% endif %}
    <span>{{ paginator.number }} / {{ paginator.total_pages }}</span>
    {% if paginator.next %}<a rel="next" href="{{ paginator.next }}">Older</a>{% endif %}
  </nav>
  {% endif %}
</section>
{% endblock %}"##;

const SINGLE_TEXT_TEMPLATE: &str = "{{ page.title }}\n\n{{ page.plain }}\n";

const LIST_TEXT_TEMPLATE: &str =
    "{{ page.title }}\n{% for item in pages %}\n- {{ item.title }} {{ item.abs_permalink }}{% endfor %}\n";

const RSS_TEMPLATE: &str = r##"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>{% if page.title %}{{ page.title }} on {% endif %}{{ site.title }}</title>
    <link>{{ page.abs_permalink }}</link>
    <description>Recent content {% if page.title %}in {{ page.title }} {% endif %}on {{ site.title }}</description>
    <language>{{ site.language_code }}</language>{% if page.date_rfc822 %}
    <lastBuildDate>{{ page.date_rfc822 }}</lastBuildDate>{% endif %}
    <atom:link href="{{ feed_permalink }}" rel="self" type="application/rss+xml" />
    {% for item in pages %}
    <item>
      <title>{{ item.title }}</title>
      <link>{{ item.abs_permalink }}</link>{% if item.date_rfc822 %}
      <pubDate>{{ item.date_rfc822 }}</pubDate>{% endif %}
      <guid>{{ item.abs_permalink }}</guid>
      <description>{{ item.summary }}</description>
    </item>
    {% endfor %}
  </channel>
</rss>"##;

const SITEMAP_TEMPLATE: &str = r##"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
{% for entry in entries %}  <url>
    <loc>{{ entry.loc }}</loc>{% if entry.lastmod %}
    <lastmod>{{ entry.lastmod }}</lastmod>{% endif %}{% if entry.changefreq %}
    <changefreq>{{ entry.changefreq }}</changefreq>{% endif %}{% if entry.priority is not none %}
    <priority>{{ entry.priority }}</priority>{% endif %}
  </url>
{% endfor %}</urlset>"##;

const SITEMAP_INDEX_TEMPLATE: &str = r##"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
{% for loc in sitemaps %}  <sitemap>
    <loc>{{ loc }}</loc>
  </sitemap>
{% endfor %}</sitemapindex>"##;

const ROBOTS_TEMPLATE: &str = "User-agent: *\nAllow: /\nSitemap: {{ sitemap }}\n";

const ALIAS_TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head>
  <title>{{ permalink }}</title>
  <link rel="canonical" href="{{ permalink }}">
  <meta name="robots" content="noindex">
  <meta charset="utf-8">
  <meta http-equiv="refresh" content="0; url={{ permalink }}">
</head>
</html>"##;

const NOT_FOUND_TEMPLATE: &str = r##"{% extends "_internal/_default/baseof.html" %}

{% block content %}
<h1>404 Page not found</h1>
<p><a href="{{ site.home }}">Back to {{ site.title }}</a></p>
{% endblock %}"##;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn render_to_string(engine: &TemplateEngine, id: &str, ctx: Value) -> String {
        let mut out = Vec::new();
        engine.render(id, &ctx, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn renders_internal_single() {
        let engine = TemplateEngine::internal();
        let ctx = minijinja::context! {
            site => minijinja::context! { title => "My Site", lang => "en", home => "/" },
            page => minijinja::context! { title => "Hello", content => "<p>Body</p>" },
        };

        let html = render_to_string(&engine, "_internal/_default/single.html", ctx);

        assert!(html.contains("<title>Hello - My Site</title>"));
        assert!(html.contains("<p>Body</p>"));
    }

    #[test]
    fn site_layouts_override_internal() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("_default")).unwrap();
        fs::write(
            temp.path().join("_default/single.html"),
            "custom {{ page.title }}",
        )
        .unwrap();
        let engine = TemplateEngine::new(vec![temp.path().to_path_buf()]);
        let doc = Document::new("a.md", PageKind::Page, "en");

        let layout = engine
            .resolve(&LayoutDescriptor::for_document(&doc), &OutputFormat::HTML)
            .unwrap();

        assert_eq!(layout, "_default/single.html");
        let out = render_to_string(
            &engine,
            &layout,
            minijinja::context! { page => minijinja::context! { title => "T" } },
        );
        assert_eq!(out, "custom T");
    }

    #[test]
    fn candidates_are_most_specific_first() {
        let engine = TemplateEngine::internal();
        let mut doc = Document::new("section", PageKind::Section, "en");
        doc.section = "posts".to_string();

        let candidates =
            engine.candidates(&LayoutDescriptor::for_document(&doc), &OutputFormat::HTML);

        assert_eq!(candidates.first().unwrap(), "section/posts.html");
        assert_eq!(candidates.last().unwrap(), "_internal/_default/list.html");
    }

    #[test]
    fn feed_candidates_end_with_internal_rss() {
        let engine = TemplateEngine::internal();
        let doc = Document::new("home", PageKind::Home, "en");

        let layout = engine
            .resolve(&LayoutDescriptor::for_document(&doc), &OutputFormat::RSS)
            .unwrap();

        assert_eq!(layout, "_internal/_default/rss.xml");
    }

    #[test]
    fn missing_layout_lists_candidates() {
        let engine = TemplateEngine::internal();
        let doc = Document::new("a.md", PageKind::Page, "en");
        let json = OutputFormat {
            name: "JSON",
            kind: FormatKind::Plain,
            base_name: "index",
            extension: "json",
            media_type: "application/json",
            path_suffix: "",
            is_plain_text: true,
        };

        let err = engine
            .resolve(&LayoutDescriptor::for_document(&doc), &json)
            .unwrap_err();

        assert!(matches!(err, LayoutError::NotFound(c) if c.len() == 2));
    }

    #[test]
    fn escapes_markup_but_not_slashes() {
        let engine = TemplateEngine::internal();
        let ctx = minijinja::context! { permalink => "https://example.org/a?x=1&y=<2>" };

        let html = render_to_string(&engine, "_internal/_default/alias.html", ctx);

        assert!(html.contains(r#"href="https://example.org/a?x=1&amp;y=&lt;2&gt;""#));
    }

    #[test]
    fn parent_paths_are_refused() {
        let engine = TemplateEngine::internal();

        assert!(!engine.exists("../secret.html"));
    }
}
