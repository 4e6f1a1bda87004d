//! Content file parser.

use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};

use crate::frontmatter::{extract_frontmatter, Frontmatter, FrontmatterError};

/// Marker separating a hand-written summary from the rest of the body.
pub const SUMMARY_DIVIDER: &str = "<!--more-->";

/// Words kept in an automatic summary.
const SUMMARY_WORDS: usize = 70;

/// A parsed content file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedContent {
    /// Parsed front matter, defaulted when the file has none
    pub frontmatter: Frontmatter,

    /// Markdown body without the front matter block
    pub body: String,

    /// Table of contents entries
    pub toc: Vec<TocEntry>,
}

/// A table of contents entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TocEntry {
    /// Heading text
    pub title: String,
    /// Anchor ID
    pub id: String,
    /// Heading level (1-6)
    pub level: u8,
}

/// Errors that can occur when parsing content.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Content is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("Front matter error: {0}")]
    Frontmatter(#[from] FrontmatterError),
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Parse raw content bytes into front matter, body and table of contents.
pub fn parse(raw: &[u8]) -> Result<ParsedContent, ParseError> {
    let source = std::str::from_utf8(raw)?;
    let (frontmatter, body) = extract_frontmatter(source)?;

    let mut toc = Vec::new();
    let mut current_heading: Option<(u8, String)> = None;

    for event in Parser::new_ext(body, markdown_options()) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current_heading = Some((level as u8, String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, ref mut heading_text)) = current_heading {
                    heading_text.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, title)) = current_heading.take() {
                    let id = slugify(&title);
                    toc.push(TocEntry { title, id, level });
                }
            }
            _ => {}
        }
    }

    Ok(ParsedContent {
        frontmatter: frontmatter.unwrap_or_default(),
        body: body.to_string(),
        toc,
    })
}

/// Render a markdown body to HTML.
pub fn render_markdown(body: &str) -> String {
    let parser = Parser::new_ext(body, markdown_options());

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);

    html_output
}

/// Plain text of a markdown body, with markup dropped and whitespace collapsed.
pub fn plain_text(body: &str) -> String {
    let mut text = String::new();

    for event in Parser::new_ext(body, markdown_options()) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak
            | Event::HardBreak
            | Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::TableCell,
            ) => text.push(' '),
            _ => {}
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Summary of a markdown body.
///
/// Text before the summary divider wins; otherwise the first words of the plain text.
pub fn summarize(body: &str) -> String {
    if let Some((before, _)) = body.split_once(SUMMARY_DIVIDER) {
        return plain_text(before);
    }

    let plain = plain_text(body);
    let words: Vec<&str> = plain.split(' ').take(SUMMARY_WORDS + 1).collect();
    if words.len() > SUMMARY_WORDS {
        format!("{} …", words[..SUMMARY_WORDS].join(" "))
    } else {
        plain
    }
}

/// Convert text to a URL-safe slug.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else if c.is_whitespace() || c == '-' || c == '_' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_complete_file() {
        let source = br#"---
title: Intro
description: Getting started
---

# Intro

Some `inline` text.

## Install `tessera`

Run the installer.
"#;

        let doc = parse(source).unwrap();

        assert_eq!(doc.frontmatter.title, "Intro");
        assert_eq!(
            doc.toc,
            vec![
                TocEntry {
                    title: "Intro".to_string(),
                    id: "intro".to_string(),
                    level: 1,
                },
                TocEntry {
                    title: "Install tessera".to_string(),
                    id: "install-tessera".to_string(),
                    level: 2,
                },
            ]
        );
        assert!(doc.body.starts_with("# Intro"));
    }

    #[test]
    fn parses_without_frontmatter() {
        let doc = parse(b"# Just Markdown\n\nNo front matter.").unwrap();

        assert_eq!(doc.frontmatter, Frontmatter::default());
        assert_eq!(doc.toc.len(), 1);
    }

    #[test]
    fn rejects_invalid_utf8() {
        let result = parse(&[0xff, 0xfe, 0x00]);

        assert!(matches!(result, Err(ParseError::Encoding(_))));
    }

    #[test]
    fn renders_markdown() {
        let html = render_markdown("# Hello\n\nWorld");

        assert!(html.contains("<h1>Hello</h1>"));
        assert!(html.contains("<p>World</p>"));
    }

    #[test]
    fn summary_uses_divider() {
        let body = "First *part*.\n\n<!--more-->\n\nSecond part.";

        assert_eq!(summarize(body), "First part.");
    }

    #[test]
    fn summary_truncates_long_text() {
        let body = "word ".repeat(100);
        let summary = summarize(&body);

        assert!(summary.ends_with('…'));
        assert_eq!(summary.split(' ').filter(|w| *w == "word").count(), 70);
    }

    #[test]
    fn slugify_works() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("API Reference"), "api-reference");
        assert_eq!(slugify("Button (Primary)"), "button-primary");
        assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
    }
}
