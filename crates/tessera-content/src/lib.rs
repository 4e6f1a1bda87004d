//! Content parsing for tessera.
//!
//! Splits content files into front matter and a markdown body, extracts a table of
//! contents and summaries, and renders markdown to HTML.

pub mod frontmatter;
pub mod parser;

pub use frontmatter::{parse_date, Frontmatter, FrontmatterError, SitemapMeta};
pub use parser::{
    parse, plain_text, render_markdown, slugify, summarize, ParseError, ParsedContent, TocEntry,
    SUMMARY_DIVIDER,
};
