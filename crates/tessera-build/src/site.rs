//! The site graph.
//!
//! Parsed content files stay resident between builds; documents are assembled from
//! them afresh for every build so each build memoizes its own main outputs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tessera_content::{Frontmatter, TocEntry};
use walkdir::WalkDir;

use crate::changes::ChangeEvent;
use crate::config::{Language, SiteConfig};
use crate::error::BuildError;
use crate::output::{OutputFormat, OutputFormats};
use crate::page::{compare_pages, Document, PageKind};
use crate::target::list_id;

const CONTENT_EXTENSIONS: [&str; 2] = ["md", "markdown"];

/// Base name of files holding home and section metadata.
const LIST_INDEX: &str = "_index";

/// Taxonomy built from the `tags` front matter.
const TAGS: &str = "tags";

/// A parsed content file.
#[derive(Debug, Clone)]
struct ContentFile {
    source: PathBuf,
    /// Path relative to its content dir
    rel: PathBuf,
    lang: String,
    /// File stem without a language suffix
    base_name: String,
    frontmatter: Frontmatter,
    content: String,
    summary: String,
    plain: String,
    toc: Vec<TocEntry>,
    word_count: usize,
}

impl ContentFile {
    fn read(source: &Path, rel: PathBuf, lang: String, base_name: String) -> Result<Self, BuildError> {
        let raw = fs::read(source).map_err(|e| BuildError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;
        let parsed = tessera_content::parse(&raw).map_err(|e| BuildError::Content {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;

        let plain = tessera_content::plain_text(&parsed.body);
        Ok(Self {
            source: source.to_path_buf(),
            rel,
            lang,
            base_name,
            content: tessera_content::render_markdown(&parsed.body),
            summary: tessera_content::summarize(&parsed.body),
            word_count: plain.split_whitespace().count(),
            plain,
            toc: parsed.toc,
            frontmatter: parsed.frontmatter,
        })
    }

    fn dir(&self) -> PathBuf {
        self.rel.parent().map(Path::to_path_buf).unwrap_or_default()
    }

    fn section(&self) -> String {
        self.dir()
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn is_list_index(&self) -> bool {
        self.base_name == LIST_INDEX
    }
}

/// What a batch of changes touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphChanges {
    /// Content files added, re-read or dropped
    pub content: usize,
    pub layouts: bool,
    pub data: bool,
}

/// Resident content plus the documents assembled from it.
#[derive(Debug)]
pub struct SiteGraph {
    files: BTreeMap<PathBuf, ContentFile>,
    data: Value,
    translations: BTreeMap<String, BTreeMap<String, String>>,
    formats: OutputFormats,
    documents: Vec<Arc<Document>>,
    by_source: HashMap<PathBuf, Arc<Document>>,
}

impl SiteGraph {
    /// Read every content, data and translation file of the site.
    pub fn load(config: &SiteConfig) -> Result<Self, BuildError> {
        let mut graph = Self {
            files: BTreeMap::new(),
            data: Value::Object(Map::new()),
            translations: BTreeMap::new(),
            formats: OutputFormats::new(&config.outputs),
            documents: Vec::new(),
            by_source: HashMap::new(),
        };

        graph.load_data(config)?;

        let codes = language_codes(config);
        for (root, owner) in content_roots(config) {
            if !root.exists() {
                tracing::warn!("Content dir {} does not exist", root.display());
                continue;
            }
            for file in read_tree(&root, &root, &owner, &codes)? {
                graph.files.insert(file.source.clone(), file);
            }
        }

        graph.assemble(config);
        tracing::debug!(
            "Loaded {} content files into {} documents",
            graph.files.len(),
            graph.documents.len()
        );
        Ok(graph)
    }

    /// Apply file changes to the resident content, then reassemble.
    pub fn apply_changes(
        &mut self,
        config: &SiteConfig,
        events: &[ChangeEvent],
    ) -> Result<GraphChanges, BuildError> {
        let mut changes = GraphChanges::default();
        let layout_dir = config.abs_layout_dir();
        let data_dir = config.abs_data_dir();
        let i18n_dir = config.abs_i18n_dir();
        let roots = content_roots(config);
        let codes = language_codes(config);

        for event in events {
            let path = &event.path;

            if path.starts_with(&layout_dir) {
                changes.layouts = true;
                continue;
            }
            if path.starts_with(&data_dir) || path.starts_with(&i18n_dir) {
                changes.data = true;
                continue;
            }

            let Some((root, owner)) = roots
                .iter()
                .filter(|(root, _)| path.starts_with(root))
                .max_by_key(|(root, _)| root.as_os_str().len())
            else {
                tracing::debug!("Ignoring change outside content: {}", path.display());
                continue;
            };

            if !path.exists() {
                let before = self.files.len();
                self.files.retain(|source, _| !source.starts_with(path));
                changes.content += before - self.files.len();
            } else if path.is_dir() {
                for file in read_tree(root, path, owner, &codes)? {
                    self.files.insert(file.source.clone(), file);
                    changes.content += 1;
                }
            } else if is_content_file(path) {
                let file = read_content_file(root, path, owner, &codes)?;
                self.files.insert(path.clone(), file);
                changes.content += 1;
            }
        }

        if changes.data {
            self.load_data(config)?;
        }

        self.assemble(config);
        Ok(changes)
    }

    /// Build fresh documents from the resident content.
    pub fn assemble(&mut self, config: &SiteConfig) {
        self.formats = OutputFormats::new(&config.outputs);

        let mut documents = Vec::new();
        let mut by_source = HashMap::new();
        for language in config.languages() {
            self.assemble_language(config, &language, &mut documents, &mut by_source);
        }

        self.documents = documents;
        self.by_source = by_source;
    }

    fn assemble_language(
        &self,
        config: &SiteConfig,
        language: &Language,
        documents: &mut Vec<Arc<Document>>,
        by_source: &mut HashMap<PathBuf, Arc<Document>>,
    ) {
        let mut list_meta: HashMap<String, &ContentFile> = HashMap::new();
        let mut pages: Vec<Arc<Document>> = Vec::new();

        for file in self.files.values().filter(|f| f.lang == language.code) {
            if file.frontmatter.draft && !config.build_drafts {
                tracing::debug!("Skipping draft {}", file.source.display());
                continue;
            }
            if file.is_list_index() {
                if file.dir().components().count() <= 1 {
                    list_meta.insert(file.section(), file);
                }
                continue;
            }
            if !config.is_kind_enabled(PageKind::Page.name()) {
                continue;
            }

            let mut doc = Document::new(self.document_id(config, file), PageKind::Page, &file.lang);
            doc.dir = file.dir();
            doc.section = file.section();
            doc.base_name = file.base_name.clone();
            self.apply_content(&mut doc, file);
            pages.push(Arc::new(doc));
        }
        pages.sort_by(|a, b| compare_pages(a, b));

        let lang = language.code.as_str();
        let mut lists: Vec<Arc<Document>> = Vec::new();

        if config.is_kind_enabled(PageKind::Home.name()) {
            let mut home = Document::new(list_id(PageKind::Home, &[], lang), PageKind::Home, lang);
            home.title = language.title.clone();
            home.formats = self.formats_for(PageKind::Home, None);
            if let Some(meta) = list_meta.get("") {
                self.apply_content(&mut home, meta);
            }
            home.pages = pages.clone();
            lists.push(Arc::new(home));
        }

        if config.is_kind_enabled(PageKind::Section.name()) {
            let mut names: BTreeSet<String> = pages
                .iter()
                .map(|p| p.section.clone())
                .filter(|s| !s.is_empty())
                .collect();
            names.extend(list_meta.keys().filter(|k| !k.is_empty()).cloned());

            for name in names {
                let sections = vec![name.clone()];
                let mut section =
                    Document::new(list_id(PageKind::Section, &sections, lang), PageKind::Section, lang);
                section.title = title_case(&name);
                section.section = name.clone();
                section.sections = sections;
                section.formats = self.formats_for(PageKind::Section, None);
                if let Some(meta) = list_meta.get(&name) {
                    self.apply_content(&mut section, meta);
                }
                section.pages = pages.iter().filter(|p| p.section == name).cloned().collect();
                lists.push(Arc::new(section));
            }
        }

        let mut terms: BTreeMap<String, (String, Vec<Arc<Document>>)> = BTreeMap::new();
        for page in &pages {
            for tag in &page.tags {
                let slug = tessera_content::slugify(tag);
                if slug.is_empty() {
                    continue;
                }
                terms
                    .entry(slug)
                    .or_insert_with(|| (tag.clone(), Vec::new()))
                    .1
                    .push(Arc::clone(page));
            }
        }

        let mut taxonomy_docs: Vec<Arc<Document>> = Vec::new();
        if !terms.is_empty() && config.is_kind_enabled(PageKind::Term.name()) {
            let mut term_docs: Vec<Arc<Document>> = terms
                .into_iter()
                .map(|(slug, (name, tagged))| {
                    let sections = vec![TAGS.to_string(), slug];
                    let mut term =
                        Document::new(list_id(PageKind::Term, &sections, lang), PageKind::Term, lang);
                    term.title = name;
                    term.section = TAGS.to_string();
                    term.sections = sections;
                    term.formats = self.formats_for(PageKind::Term, None);
                    term.pages = tagged;
                    Arc::new(term)
                })
                .collect();
            term_docs.sort_by(|a, b| compare_pages(a, b));

            if config.is_kind_enabled(PageKind::Taxonomy.name()) {
                let sections = vec![TAGS.to_string()];
                let mut taxonomy = Document::new(
                    list_id(PageKind::Taxonomy, &sections, lang),
                    PageKind::Taxonomy,
                    lang,
                );
                taxonomy.title = title_case(TAGS);
                taxonomy.section = TAGS.to_string();
                taxonomy.sections = sections;
                taxonomy.formats = self.formats_for(PageKind::Taxonomy, None);
                taxonomy.pages = term_docs.clone();
                taxonomy_docs.push(Arc::new(taxonomy));
            }
            taxonomy_docs.extend(term_docs);
        }

        for doc in lists.iter().chain(pages.iter()) {
            if let Some(source) = &doc.source {
                by_source.insert(source.clone(), Arc::clone(doc));
            }
        }

        documents.extend(lists);
        documents.extend(pages);
        documents.extend(taxonomy_docs);
    }

    fn apply_content(&self, doc: &mut Document, file: &ContentFile) {
        let fm = &file.frontmatter;

        doc.source = Some(file.source.clone());
        if !fm.title.is_empty() {
            doc.title = fm.title.clone();
        }
        doc.description = fm.description.clone();
        doc.slug = fm.slug.clone();
        doc.url = fm.url.clone();
        doc.layout = fm.layout.clone();
        doc.content_type = fm.content_type.clone();
        doc.date = fm.date;
        doc.lastmod = fm.lastmod.or(fm.date);
        doc.weight = fm.weight;
        doc.aliases = fm.aliases.clone();
        doc.tags = fm.tags.clone();
        doc.sitemap = fm.sitemap.clone().unwrap_or_default();
        doc.content = file.content.clone();
        doc.summary = file.summary.clone();
        doc.plain = file.plain.clone();
        doc.toc = file.toc.clone();
        doc.word_count = file.word_count;
        doc.formats = self.formats_for(doc.kind, fm.output.as_deref());
    }

    fn formats_for(&self, kind: PageKind, output: Option<&str>) -> Vec<OutputFormat> {
        if let Some(name) = output {
            match self.formats.get(name) {
                Some(format) => return vec![format],
                None => tracing::warn!("Unknown output format {:?} in front matter", name),
            }
        }
        self.formats.for_kind(kind)
    }

    fn document_id(&self, config: &SiteConfig, file: &ContentFile) -> String {
        file.source
            .strip_prefix(&config.source_dir)
            .unwrap_or(&file.source)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn load_data(&mut self, config: &SiteConfig) -> Result<(), BuildError> {
        self.data = load_data_dir(&config.abs_data_dir())?;
        self.translations = load_translations(&config.abs_i18n_dir())?;
        Ok(())
    }

    /// All documents: per language the home page, sections, pages, then the taxonomy.
    pub fn documents(&self) -> &[Arc<Document>] {
        &self.documents
    }

    /// Document rendered from `source`.
    pub fn get_by_source(&self, source: &Path) -> Option<&Arc<Document>> {
        self.by_source.get(source)
    }

    pub fn home(&self, lang: &str) -> Option<&Arc<Document>> {
        self.documents
            .iter()
            .find(|d| d.kind == PageKind::Home && d.lang == lang)
    }

    /// Contents of the data dir, nested by path.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Translation table for `lang`.
    pub fn translations(&self, lang: &str) -> Option<&BTreeMap<String, String>> {
        self.translations.get(lang)
    }

    pub fn content_file_count(&self) -> usize {
        self.files.len()
    }
}

fn language_codes(config: &SiteConfig) -> Vec<String> {
    if !config.is_multilingual() {
        return Vec::new();
    }
    config.languages().into_iter().map(|l| l.code).collect()
}

/// Distinct content dirs with the language that owns unsuffixed files in them.
///
/// The default language owns a dir it shares with other languages.
fn content_roots(config: &SiteConfig) -> Vec<(PathBuf, String)> {
    let languages = config.languages();
    let mut roots: Vec<(PathBuf, String)> = Vec::new();

    for language in &languages {
        if roots.iter().any(|(dir, _)| *dir == language.content_dir) {
            continue;
        }
        let owner = languages
            .iter()
            .filter(|l| l.content_dir == language.content_dir)
            .find(|l| l.code == config.default_content_language)
            .unwrap_or(language);
        roots.push((language.content_dir.clone(), owner.code.clone()));
    }

    roots
}

fn read_tree(root: &Path, dir: &Path, owner: &str, codes: &[String]) -> Result<Vec<ContentFile>, BuildError> {
    let mut files = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // Dangling or cyclic links below the root are skipped
            Err(e) if e.depth() > 0 => {
                tracing::warn!("Skipping content entry: {}", e);
                continue;
            }
            Err(e) => {
                return Err(BuildError::Read {
                    path: dir.to_path_buf(),
                    source: e.into(),
                })
            }
        };
        if entry.file_type().is_file() && is_content_file(entry.path()) {
            files.push(read_content_file(root, entry.path(), owner, codes)?);
        }
    }

    Ok(files)
}

fn read_content_file(
    root: &Path,
    path: &Path,
    owner: &str,
    codes: &[String],
) -> Result<ContentFile, BuildError> {
    let rel = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (lang, base_name) = match stem.rsplit_once('.') {
        Some((base, code)) if codes.iter().any(|c| c == code) => (code.to_string(), base.to_string()),
        _ => (owner.to_string(), stem),
    };

    ContentFile::read(path, rel, lang, base_name)
}

fn is_content_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CONTENT_EXTENSIONS.contains(&ext))
        && !is_hidden(path)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_data_file(path: &Path) -> Result<Option<Value>, BuildError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !matches!(ext, "toml" | "json" | "yaml" | "yml") {
        return Ok(None);
    }

    let text = fs::read_to_string(path).map_err(|source| BuildError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = match ext {
        "toml" => toml::from_str::<Value>(&text).map_err(|e| e.to_string()),
        "json" => serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()),
        _ => serde_yaml::from_str::<Value>(&text).map_err(|e| e.to_string()),
    };

    parsed.map(Some).map_err(|message| BuildError::Content {
        path: path.to_path_buf(),
        message,
    })
}

fn data_files(dir: &Path) -> Result<Vec<(PathBuf, Value)>, BuildError> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                tracing::warn!("Skipping data entry: {}", e);
                continue;
            }
            Err(e) => {
                return Err(BuildError::Read {
                    path: dir.to_path_buf(),
                    source: e.into(),
                })
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(value) = parse_data_file(entry.path())? {
            let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            out.push((rel.to_path_buf(), value));
        }
    }

    Ok(out)
}

fn load_data_dir(dir: &Path) -> Result<Value, BuildError> {
    let mut root = Map::new();

    for (rel, value) in data_files(dir)? {
        let mut keys: Vec<String> = rel
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if let Some(stem) = rel.file_stem() {
            keys.push(stem.to_string_lossy().into_owned());
        }
        insert_nested(&mut root, &keys, value);
    }

    Ok(Value::Object(root))
}

fn insert_nested(map: &mut Map<String, Value>, keys: &[String], value: Value) {
    match keys {
        [] => {}
        [last] => {
            map.insert(last.clone(), value);
        }
        [first, rest @ ..] => {
            let child = map
                .entry(first.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(nested) = child {
                insert_nested(nested, rest, value);
            } else {
                let mut nested = Map::new();
                insert_nested(&mut nested, rest, value);
                *child = Value::Object(nested);
            }
        }
    }
}

/// `i18n/<lang>.toml` tables of `id = "text"` or `[id] other = "text"`.
fn load_translations(dir: &Path) -> Result<BTreeMap<String, BTreeMap<String, String>>, BuildError> {
    let mut out = BTreeMap::new();

    for (rel, value) in data_files(dir)? {
        let Some(lang) = rel.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let Value::Object(entries) = value else {
            tracing::warn!("Ignoring translation file {}: not a table", rel.display());
            continue;
        };

        let table: BTreeMap<String, String> = entries
            .into_iter()
            .filter_map(|(id, v)| {
                let text = match v {
                    Value::String(s) => s,
                    Value::Object(mut forms) => match forms.remove("other") {
                        Some(Value::String(s)) => s,
                        _ => return None,
                    },
                    _ => return None,
                };
                Some((id, text))
            })
            .collect();
        out.insert(lang, table);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::Op;
    use pretty_assertions::assert_eq;
    use tempfile::{tempdir, TempDir};

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn site(files: &[(&str, &str)]) -> (TempDir, SiteConfig) {
        let temp = tempdir().unwrap();
        for (rel, content) in files {
            write(temp.path(), rel, content);
        }
        let config = SiteConfig::load(temp.path(), None).unwrap();
        (temp, config)
    }

    fn kinds(graph: &SiteGraph) -> Vec<(PageKind, String)> {
        graph
            .documents()
            .iter()
            .map(|d| (d.kind, d.title.clone()))
            .collect()
    }

    #[test]
    fn assembles_home_sections_pages_and_tags() {
        let (_temp, config) = site(&[
            ("content/_index.md", "---\ntitle: Welcome\n---\nHi"),
            ("content/about.md", "---\ntitle: About\n---\n"),
            (
                "content/posts/a.md",
                "---\ntitle: A\ndate: 2024-01-01\ntags: [rust]\n---\nOne",
            ),
            (
                "content/posts/b.md",
                "---\ntitle: B\ndate: 2024-02-01\ntags: [Rust, Web]\n---\nTwo",
            ),
        ]);

        let graph = SiteGraph::load(&config).unwrap();

        assert_eq!(
            kinds(&graph),
            vec![
                (PageKind::Home, "Welcome".to_string()),
                (PageKind::Section, "Posts".to_string()),
                (PageKind::Page, "B".to_string()),
                (PageKind::Page, "A".to_string()),
                (PageKind::Page, "About".to_string()),
                (PageKind::Taxonomy, "Tags".to_string()),
                (PageKind::Term, "Rust".to_string()),
                (PageKind::Term, "Web".to_string()),
            ]
        );

        let home = graph.home("en").unwrap();
        assert_eq!(home.pages.len(), 3);
        assert_eq!(home.content, "<p>Hi</p>\n");

        let rust = &graph.documents()[6];
        assert_eq!(rust.sections, vec!["tags".to_string(), "rust".to_string()]);
        assert_eq!(rust.pages.len(), 2);
    }

    #[test]
    fn drafts_are_skipped_unless_enabled() {
        let (_temp, mut config) = site(&[
            ("content/posts/a.md", "---\ntitle: A\n---\n"),
            ("content/posts/wip.md", "---\ntitle: WIP\ndraft: true\n---\n"),
        ]);

        let graph = SiteGraph::load(&config).unwrap();
        assert_eq!(graph.home("en").unwrap().pages.len(), 1);

        config.build_drafts = true;
        let graph = SiteGraph::load(&config).unwrap();
        assert_eq!(graph.home("en").unwrap().pages.len(), 2);
    }

    #[test]
    fn language_suffix_assigns_language() {
        let (_temp, config) = site(&[
            (
                "site.toml",
                "default_content_language = \"en\"\n[languages.en]\nweight = 1\n[languages.fr]\nweight = 2\n",
            ),
            ("content/posts/hello.md", "---\ntitle: Hello\n---\n"),
            ("content/posts/hello.fr.md", "---\ntitle: Bonjour\n---\n"),
        ]);

        let graph = SiteGraph::load(&config).unwrap();

        let fr = graph.home("fr").unwrap();
        assert_eq!(fr.pages.len(), 1);
        assert_eq!(fr.pages[0].title, "Bonjour");
        assert_eq!(fr.pages[0].base_name, "hello");
        assert_eq!(graph.home("en").unwrap().pages[0].title, "Hello");
    }

    #[test]
    fn output_front_matter_restricts_formats() {
        let (_temp, config) = site(&[("content/notes.md", "---\ntitle: N\noutput: plain\n---\n")]);

        let graph = SiteGraph::load(&config).unwrap();

        let page = graph
            .documents()
            .iter()
            .find(|d| d.kind == PageKind::Page)
            .unwrap();
        assert_eq!(page.formats, vec![OutputFormat::PLAIN]);
    }

    #[test]
    fn apply_changes_adds_updates_and_removes() {
        let (temp, config) = site(&[
            ("content/posts/a.md", "---\ntitle: A\n---\n"),
            ("content/posts/b.md", "---\ntitle: B\n---\n"),
        ]);
        let mut graph = SiteGraph::load(&config).unwrap();

        let a = write(temp.path(), "content/posts/a.md", "---\ntitle: A2\n---\n");
        let c = write(temp.path(), "content/posts/c.md", "---\ntitle: C\n---\n");
        let b = temp.path().join("content/posts/b.md");
        fs::remove_file(&b).unwrap();

        let changes = graph
            .apply_changes(
                &config,
                &[
                    ChangeEvent::new(&a, Op::WRITE),
                    ChangeEvent::new(&c, Op::CREATE),
                    ChangeEvent::new(&b, Op::REMOVE),
                ],
            )
            .unwrap();

        assert_eq!(changes.content, 3);
        let mut titles: Vec<_> = graph
            .home("en")
            .unwrap()
            .pages
            .iter()
            .map(|p| p.title.clone())
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["A2".to_string(), "C".to_string()]);
        assert_eq!(graph.get_by_source(&a).unwrap().title, "A2");
        assert!(graph.get_by_source(&b).is_none());
    }

    #[test]
    fn layout_and_data_changes_are_flagged() {
        let (temp, config) = site(&[("data/authors/jane.toml", "name = \"Jane\"\n")]);
        let mut graph = SiteGraph::load(&config).unwrap();
        assert_eq!(graph.data()["authors"]["jane"]["name"], "Jane");

        write(temp.path(), "data/authors/jane.toml", "name = \"Janet\"\n");
        let changes = graph
            .apply_changes(
                &config,
                &[
                    ChangeEvent::new(temp.path().join("layouts/_default/single.html"), Op::WRITE),
                    ChangeEvent::new(temp.path().join("data/authors/jane.toml"), Op::WRITE),
                ],
            )
            .unwrap();

        assert!(changes.layouts);
        assert!(changes.data);
        assert_eq!(graph.data()["authors"]["jane"]["name"], "Janet");
    }

    #[test]
    fn translations_accept_both_shapes() {
        let (_temp, config) = site(&[(
            "i18n/en.toml",
            "home = \"Home\"\n[more]\nother = \"Read more\"\n",
        )]);

        let graph = SiteGraph::load(&config).unwrap();

        let en = graph.translations("en").unwrap();
        assert_eq!(en.get("home").map(String::as_str), Some("Home"));
        assert_eq!(en.get("more").map(String::as_str), Some("Read more"));
    }

    #[test]
    fn broken_front_matter_fails_the_load() {
        let (_temp, config) = site(&[("content/bad.md", "---\ntitle: [unclosed\n---\n")]);

        let err = SiteGraph::load(&config).unwrap_err();

        assert!(matches!(err, BuildError::Content { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_and_cyclic_links_are_skipped() {
        let (temp, config) = site(&[("content/posts/a.md", "---\ntitle: A\n---\nOne")]);
        let content = temp.path().join("content");
        std::os::unix::fs::symlink(temp.path().join("missing.md"), content.join("dangling.md"))
            .unwrap();
        std::os::unix::fs::symlink(&content, content.join("posts/loop")).unwrap();

        let graph = SiteGraph::load(&config).unwrap();

        let pages: Vec<&str> = graph
            .documents()
            .iter()
            .filter(|d| d.kind == PageKind::Page)
            .map(|d| d.title.as_str())
            .collect();
        assert_eq!(pages, vec!["A"]);
    }
}
