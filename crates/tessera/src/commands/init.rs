//! Create a new site skeleton.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Files written by `init`, relative to the project directory.
const FILES: &[(&str, &str)] = &[
    ("site.toml", DEFAULT_CONFIG),
    ("content/_index.md", DEFAULT_INDEX),
    ("content/posts/_index.md", DEFAULT_POSTS),
    ("content/posts/hello-world.md", DEFAULT_POST),
    ("layouts/_default/single.html", DEFAULT_SINGLE),
    ("static/css/site.css", DEFAULT_CSS),
];

/// Run the init command.
pub fn run(dir: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing site in {}", dir.display());

    if dir.join("site.toml").exists() && !yes {
        tracing::warn!("site.toml already exists. Use --yes to overwrite.");
        return Ok(());
    }

    for (relative, content) in FILES {
        let path = dir.join(relative);
        if path.exists() && !yes {
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {relative}"))?;
        tracing::info!("Created {}", relative);
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'tessera server' to start the development server.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Tessera configuration

base_url = "http://localhost:1313/"
title = "My New Site"
language_code = "en-us"

# Items per list page
paginate = 10

[permalinks]
posts = "/:year/:month/:slug/"

[server]
port = 1313
"#;

const DEFAULT_INDEX: &str = r#"---
title: Home
---

Welcome to your new site. Posts are listed below.
"#;

const DEFAULT_POSTS: &str = r#"---
title: Posts
---
"#;

const DEFAULT_POST: &str = r#"---
title: Hello World
date: 2024-01-01
tags: [welcome]
---

This is your first post. Edit `content/posts/hello-world.md` while
`tessera server` runs and the browser reloads on save.

<!--more-->

## Next steps

- Add pages under `content/`
- Override layouts in `layouts/`
- Put images and stylesheets in `static/`
"#;

const DEFAULT_SINGLE: &str = r#"{% extends "_internal/_default/baseof.html" %}

{% block content %}
<link rel="stylesheet" href="{{ site.home }}css/site.css">
<article class="post">
  <h1>{{ page.title }}</h1>
  {% if page.date %}<time datetime="{{ page.date }}">{{ page.date_display }}</time>{% endif %}
  {{ page.content | safe }}
</article>
{% endblock %}
"#;

const DEFAULT_CSS: &str = r#"body {
  font-family: system-ui, sans-serif;
  max-width: 42rem;
  margin: 2rem auto;
  padding: 0 1rem;
  line-height: 1.6;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn writes_the_skeleton() {
        let temp = tempdir().unwrap();

        run(temp.path(), false).unwrap();

        for (relative, _) in FILES {
            assert!(temp.path().join(relative).exists(), "missing {relative}");
        }
    }

    #[test]
    fn keeps_an_existing_site_without_yes() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("site.toml"), "title = \"Mine\"\n").unwrap();

        run(temp.path(), false).unwrap();

        let config = fs::read_to_string(temp.path().join("site.toml")).unwrap();
        assert_eq!(config, "title = \"Mine\"\n");
        assert!(!temp.path().join("content").exists());
    }

    #[test]
    fn overwrites_with_yes() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("site.toml"), "title = \"Mine\"\n").unwrap();

        run(temp.path(), true).unwrap();

        let config = fs::read_to_string(temp.path().join("site.toml")).unwrap();
        assert_eq!(config, DEFAULT_CONFIG);
    }
}
