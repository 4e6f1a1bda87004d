//! Front matter extraction and parsing.
//!
//! Two fence styles are recognised: `---` for YAML and `+++` for TOML.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Parsed front matter of a content file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Frontmatter {
    /// Page title
    pub title: String,

    /// Page description for feeds and SEO
    pub description: Option<String>,

    /// Custom slug override
    pub slug: Option<String>,

    /// Absolute URL override, wins over permalinks and slugs
    pub url: Option<String>,

    /// Explicit layout; skips the layout lookup entirely
    pub layout: Option<String>,

    /// Content type, defaults to the section
    #[serde(rename = "type")]
    pub content_type: Option<String>,

    /// Render only this output format
    pub output: Option<String>,

    /// Publish date
    #[serde(deserialize_with = "deserialize_date")]
    pub date: Option<DateTime<Utc>>,

    /// Last modification date
    #[serde(deserialize_with = "deserialize_date")]
    pub lastmod: Option<DateTime<Utc>>,

    /// Drafts are skipped unless drafts are built
    pub draft: bool,

    /// Ordering weight (lower = first, 0 = unweighted)
    pub weight: i32,

    /// Extra URLs that redirect to this page
    pub aliases: Vec<String>,

    /// Terms in the `tags` taxonomy
    pub tags: Vec<String>,

    /// Per-page sitemap overrides
    pub sitemap: Option<SitemapMeta>,
}

/// Sitemap settings a page may override.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SitemapMeta {
    pub changefreq: Option<String>,
    pub priority: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Text(String),
    Toml(toml::value::Datetime),
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawDate>::deserialize(deserializer)?;
    let text = match raw {
        None => return Ok(None),
        Some(RawDate::Text(s)) => s,
        Some(RawDate::Toml(dt)) => dt.to_string(),
    };

    parse_date(&text)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {text}")))
}

/// Parse the date formats accepted in front matter.
///
/// RFC 3339, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS` and plain `YYYY-MM-DD` are
/// accepted; values without an offset are taken as UTC.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Extract front matter from content.
///
/// Returns the parsed front matter and the remaining body after the closing fence.
pub fn extract_frontmatter(source: &str) -> Result<(Option<Frontmatter>, &str), FrontmatterError> {
    let trimmed = source.trim_start();

    let (fence, format) = if trimmed.starts_with("---") {
        ("---", Format::Yaml)
    } else if trimmed.starts_with("+++") {
        ("+++", Format::Toml)
    } else {
        return Ok((None, source));
    };

    let after_open = &trimmed[3..];
    let closing = format!("\n{fence}");
    let Some(close_pos) = after_open.find(&closing) else {
        return Err(FrontmatterError::Unclosed(fence));
    };

    let raw = after_open[..close_pos].trim();
    let remaining = &after_open[close_pos + closing.len()..];

    let frontmatter = if raw.is_empty() {
        Frontmatter::default()
    } else {
        match format {
            Format::Yaml => serde_yaml::from_str(raw)
                .map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?,
            Format::Toml => {
                toml::from_str(raw).map_err(|e| FrontmatterError::InvalidToml(e.to_string()))?
            }
        }
    };

    Ok((Some(frontmatter), remaining.trim_start()))
}

enum Format {
    Yaml,
    Toml,
}

/// Errors that can occur when parsing front matter.
#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("Unclosed front matter block - missing closing {0}")]
    Unclosed(&'static str),

    #[error("Invalid YAML in front matter: {0}")]
    InvalidYaml(String),

    #[error("Invalid TOML in front matter: {0}")]
    InvalidToml(String),
}
