//! Full builds, incremental rebuilds and static resyncs.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::changes::ChangeEvent;
use crate::config::SiteConfig;
use crate::error::BuildError;
use crate::layout::TemplateEngine;
use crate::publish::{collect_garbage, Publisher};
use crate::reload::{LiveReload, NoReload};
use crate::render::{PageRenderPipeline, RenderContext};
use crate::session::{stats_table, BuildSession, ProcessingStats, ServerMode, StatsSnapshot};
use crate::site::SiteGraph;
use crate::static_sync::{FsSync, StaticSync};

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Per-language counters, in language order
    pub stats: Vec<StatsSnapshot>,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

impl BuildResult {
    /// Pages rendered across all languages.
    pub fn pages(&self) -> u64 {
        self.stats.iter().map(|s| s.pages).sum()
    }
}

/// Drives builds of a [`BuildSession`].
pub struct BuildOrchestrator {
    pipeline: PageRenderPipeline,
    static_sync: Arc<dyn StaticSync>,
    reload: Arc<dyn LiveReload>,
}

impl BuildOrchestrator {
    /// Orchestrator with the default worker pool, filesystem sync and no live reload.
    pub fn new() -> Result<Self, BuildError> {
        Ok(Self::with_parts(
            PageRenderPipeline::new()?,
            Arc::new(FsSync),
            Arc::new(NoReload),
        ))
    }

    pub fn with_parts(
        pipeline: PageRenderPipeline,
        static_sync: Arc<dyn StaticSync>,
        reload: Arc<dyn LiveReload>,
    ) -> Self {
        Self {
            pipeline,
            static_sync,
            reload,
        }
    }

    /// Replace the live-reload notifier.
    pub fn with_reload(mut self, reload: Arc<dyn LiveReload>) -> Self {
        self.reload = reload;
        self
    }

    pub fn reload(&self) -> &Arc<dyn LiveReload> {
        &self.reload
    }

    /// Build the whole site from scratch.
    ///
    /// Static files and content are processed concurrently, unless the destination is
    /// cleaned first, in which case static files go first.
    pub fn full_build(&self, session: &mut BuildSession) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        session.reset_stats();

        let publisher = Publisher::new(session.config.abs_publish_dir());
        let (synced, built) = {
            let config = &session.config;
            let layouts = &session.layouts;
            let stats = session.stats_map();
            let live_reload_port = session.live_reload_port();

            let sync = || self.sync_all(config, stats, config.clean_destination_dir);
            let build = || {
                let graph = SiteGraph::load(config)?;
                let rendered =
                    self.render_graph(config, &graph, layouts, &publisher, stats, live_reload_port, None);
                Ok::<_, BuildError>((graph, rendered))
            };

            if config.clean_destination_dir {
                sync()?;
                (Ok(()), build())
            } else {
                rayon::join(sync, build)
            }
        };

        synced?;
        let (graph, rendered) = built?;
        session.graph = Some(graph);

        let written = publisher.written();
        if let Err(e) = rendered {
            session.published.extend(written);
            return Err(e);
        }

        if session.config.gc {
            let removed = collect_garbage(publisher.root(), &session.published, &written)?;
            session
                .stats_for(&session.config.default_content_language)
                .add_cleaned(removed);
        }
        session.published = written;

        let result = BuildResult {
            stats: session.stats(),
            duration_ms: start.elapsed().as_millis() as u64,
            output_dir: publisher.root().to_path_buf(),
        };
        tracing::info!("\n{}", stats_table(&result.stats));
        tracing::info!("Built in {} ms", result.duration_ms);

        Ok(result)
    }

    /// Switch the session to dev-server mode and build everything.
    pub fn server_build(
        &self,
        session: &mut BuildSession,
        mode: ServerMode,
    ) -> Result<BuildResult, BuildError> {
        session.enable_server(mode);
        self.full_build(session)
    }

    /// Apply content, layout and data changes to the resident graph and re-render.
    ///
    /// In server mode with fast render on, only the home pages and the pages visited
    /// since the server started are rendered.
    pub fn rebuild_from_changes(
        &self,
        session: &mut BuildSession,
        events: &[ChangeEvent],
    ) -> Result<(), BuildError> {
        let start = Instant::now();
        session.reset_stats();

        match session.graph.as_mut() {
            Some(graph) => {
                let changes = graph.apply_changes(&session.config, events)?;
                tracing::debug!("Applied {} event(s): {:?}", events.len(), changes);
                if changes.layouts {
                    session.layouts.clear_cache();
                }
            }
            None => session.graph = Some(SiteGraph::load(&session.config)?),
        }

        let visited = session
            .server
            .as_ref()
            .filter(|mode| mode.fast_render)
            .map(|_| session.visited().snapshot())
            .filter(|set| !set.is_empty());

        let publisher = Publisher::new(session.config.abs_publish_dir());
        let Some(graph) = session.graph.as_ref() else {
            return Ok(());
        };
        let rendered = self.render_graph(
            &session.config,
            graph,
            &session.layouts,
            &publisher,
            session.stats_map(),
            session.live_reload_port(),
            visited.as_ref(),
        );
        session.published.extend(publisher.written());

        tracing::info!("Rebuilt in {} ms", start.elapsed().as_millis());
        rendered
    }

    /// Reload the configuration, drop everything derived from it and build again.
    ///
    /// Connected browsers are told to reload once the build is done, even when some
    /// pages failed.
    pub fn full_rebuild_from_config(
        &self,
        session: &mut BuildSession,
    ) -> Result<BuildResult, BuildError> {
        let config = session.config.reload(&session.overrides)?;
        tracing::info!("Configuration changed, rebuilding everything");
        session.reset(config);

        let result = self.full_build(session);
        self.reload.force_refresh();
        result
    }

    /// Bring the publish directory in line with changed static files.
    pub fn sync_static_changes(
        &self,
        session: &BuildSession,
        events: &[ChangeEvent],
    ) -> Result<u64, BuildError> {
        let config = &session.config;
        let dirs = config.abs_static_dirs();
        let dest = config.abs_publish_dir();

        let synced = if config.force_sync_static {
            self.static_sync.sync(&dirs, &dest, false)?
        } else {
            self.static_sync.sync_events(&dirs, &dest, events)?
        };

        tracing::debug!("Synced {} static file(s)", synced);
        Ok(synced)
    }

    /// Permalink of the document built from `source`, once it has been rendered.
    pub fn permalink_for_source(&self, session: &BuildSession, source: &Path) -> Option<String> {
        let doc = session.graph()?.get_by_source(source)?;
        doc.main_output().map(|output| output.paths.permalink.clone())
    }

    fn sync_all(
        &self,
        config: &SiteConfig,
        stats: &BTreeMap<String, Arc<ProcessingStats>>,
        delete_unmatched: bool,
    ) -> Result<(), BuildError> {
        let synced = self.static_sync.sync(
            &config.abs_static_dirs(),
            &config.abs_publish_dir(),
            delete_unmatched,
        )?;
        if let Some(stats) = stats.get(&config.default_content_language) {
            stats.add_static(synced);
        }
        Ok(())
    }

    /// Render every document of `graph` (or the visited subset), then the site-wide
    /// artifacts. Page failures are reported after the artifacts are written.
    #[allow(clippy::too_many_arguments)]
    fn render_graph(
        &self,
        config: &SiteConfig,
        graph: &SiteGraph,
        layouts: &TemplateEngine,
        publisher: &Publisher,
        stats: &BTreeMap<String, Arc<ProcessingStats>>,
        live_reload_port: Option<u16>,
        visited: Option<&HashSet<String>>,
    ) -> Result<(), BuildError> {
        let ctx = RenderContext::new(config, graph, layouts, publisher, stats, live_reload_port);
        let pages = self.pipeline.render(&ctx, graph.documents(), visited);
        ctx.render_site_artifacts()?;
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::Op;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl LiveReload for Recorder {
        fn force_refresh(&self) {
            self.calls.lock().unwrap().push("refresh".into());
        }

        fn refresh_path(&self, path: &str) {
            self.calls.lock().unwrap().push(format!("path {path}"));
        }

        fn navigate_to(&self, path: &str, port: u16) {
            self.calls.lock().unwrap().push(format!("navigate {path} {port}"));
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn project(files: &[(&str, &str)]) -> (TempDir, BuildSession) {
        let temp = tempdir().unwrap();
        for (rel, content) in files {
            write(temp.path(), rel, content);
        }
        let config = SiteConfig::load(temp.path(), None).unwrap();
        (temp, BuildSession::new(config))
    }

    fn orchestrator() -> BuildOrchestrator {
        BuildOrchestrator::with_parts(
            PageRenderPipeline::with_workers(2).unwrap(),
            Arc::new(FsSync),
            Arc::new(NoReload),
        )
    }

    const POST: &str = "---\ntitle: Hello\ndate: 2024-01-02\n---\nHello *world*.\n";

    #[test]
    fn full_build_renders_content_and_copies_static() {
        let (temp, mut session) = project(&[
            ("content/posts/hello.md", POST),
            ("static/css/site.css", "body{}"),
        ]);

        let result = orchestrator().full_build(&mut session).unwrap();

        let public = temp.path().join("public");
        let page = fs::read_to_string(public.join("posts/hello/index.html")).unwrap();
        assert!(page.contains("<em>world</em>"));
        assert!(public.join("index.html").exists());
        assert!(public.join("css/site.css").exists());
        assert!(public.join("sitemap.xml").exists());
        assert_eq!(result.stats[0].static_files, 1);
        assert!(result.pages() >= 3);
        assert!(session.graph().is_some());
    }

    #[test]
    fn clean_destination_removes_unknown_files() {
        let (temp, mut session) = project(&[
            ("site.toml", "clean_destination_dir = true\n"),
            ("content/posts/hello.md", POST),
            ("static/robots.txt", "User-agent: *"),
            ("public/leftover.txt", "old"),
            ("public/.git/HEAD", "ref"),
        ]);

        orchestrator().full_build(&mut session).unwrap();

        let public = temp.path().join("public");
        assert!(!public.join("leftover.txt").exists());
        assert!(public.join(".git/HEAD").exists());
        assert!(public.join("robots.txt").exists());
        assert!(public.join("posts/hello/index.html").exists());
    }

    #[test]
    fn gc_removes_artifacts_of_deleted_content() {
        let (temp, mut session) = project(&[
            ("site.toml", "gc = true\n"),
            ("content/posts/hello.md", POST),
            ("content/posts/bye.md", "---\ntitle: Bye\n---\nBye.\n"),
        ]);
        let orchestrator = orchestrator();
        orchestrator.full_build(&mut session).unwrap();
        let bye = temp.path().join("public/posts/bye/index.html");
        assert!(bye.exists());

        fs::remove_file(temp.path().join("content/posts/bye.md")).unwrap();
        session.reset(session.config.clone());
        let result = orchestrator.full_build(&mut session).unwrap();

        assert!(!bye.exists());
        assert!(result.stats[0].cleaned >= 1);
        assert!(temp.path().join("public/posts/hello/index.html").exists());
    }

    #[test]
    fn partial_failure_keeps_the_graph() {
        let (temp, mut session) = project(&[
            ("content/posts/hello.md", POST),
            ("content/posts/broken.md", "---\ntitle: Broken\nlayout: nope\n---\nx\n"),
        ]);

        let err = orchestrator().full_build(&mut session).unwrap_err();

        assert_eq!(err.failures().len(), 1);
        assert!(err.failures()[0].document.contains("broken.md"));
        assert!(session.graph().is_some());
        assert!(temp.path().join("public/posts/hello/index.html").exists());
    }

    #[test]
    fn url_outside_publish_dir_is_a_page_failure() {
        let (temp, mut session) = project(&[
            ("content/posts/hello.md", POST),
            ("content/evil.md", "---\ntitle: Evil\nurl: /../escaped/\n---\nx\n"),
        ]);

        let err = orchestrator().full_build(&mut session).unwrap_err();

        assert!(!err.failures().is_empty());
        assert!(err.failures().iter().all(|f| f.document.contains("evil.md")));
        assert!(!temp.path().join("escaped").exists());
        assert!(temp.path().join("public/posts/hello/index.html").exists());
    }

    #[test]
    fn rebuild_applies_content_changes() {
        let (temp, mut session) = project(&[("content/posts/hello.md", POST)]);
        let orchestrator = orchestrator();
        orchestrator.full_build(&mut session).unwrap();

        let source = temp.path().join("content/posts/hello.md");
        fs::write(&source, "---\ntitle: Hello\ndate: 2024-01-02\n---\nChanged text.\n").unwrap();
        orchestrator
            .rebuild_from_changes(&mut session, &[ChangeEvent::new(&source, Op::WRITE)])
            .unwrap();

        let page = fs::read_to_string(temp.path().join("public/posts/hello/index.html")).unwrap();
        assert!(page.contains("Changed text."));
    }

    #[test]
    fn rebuild_without_graph_loads_it() {
        let (temp, mut session) = project(&[("content/about.md", "---\ntitle: About\n---\nHi.\n")]);

        orchestrator().rebuild_from_changes(&mut session, &[]).unwrap();

        assert!(session.graph().is_some());
        assert!(temp.path().join("public/about/index.html").exists());
    }

    #[test]
    fn fast_render_only_touches_visited_pages() {
        let (temp, mut session) = project(&[
            ("content/posts/hello.md", POST),
            ("content/posts/other.md", "---\ntitle: Other\n---\nOld.\n"),
        ]);
        let orchestrator = orchestrator();
        let mode = ServerMode::from_config(&session.config);
        orchestrator.server_build(&mut session, mode).unwrap();
        session.visited().insert("/posts/hello/");

        write(temp.path(), "content/posts/hello.md", "---\ntitle: Hello\n---\nNew hello.\n");
        write(temp.path(), "content/posts/other.md", "---\ntitle: Other\n---\nNew other.\n");
        let events = [
            ChangeEvent::new(temp.path().join("content/posts/hello.md"), Op::WRITE),
            ChangeEvent::new(temp.path().join("content/posts/other.md"), Op::WRITE),
        ];
        orchestrator.rebuild_from_changes(&mut session, &events).unwrap();

        let public = temp.path().join("public");
        let hello = fs::read_to_string(public.join("posts/hello/index.html")).unwrap();
        let other = fs::read_to_string(public.join("posts/other/index.html")).unwrap();
        assert!(hello.contains("New hello."));
        assert!(hello.contains("/__livereload.js?port=1313"));
        assert!(other.contains("Old."));
    }

    #[test]
    fn config_change_rebuilds_and_refreshes_browsers() {
        let (temp, mut session) = project(&[
            ("site.toml", "title = \"First\"\n"),
            ("content/_index.md", "---\ntitle: Home\n---\n"),
        ]);
        let recorder = Arc::new(Recorder::default());
        let orchestrator = orchestrator().with_reload(recorder.clone());
        orchestrator.full_build(&mut session).unwrap();

        write(temp.path(), "site.toml", "title = \"Second\"\n");
        orchestrator.full_rebuild_from_config(&mut session).unwrap();

        assert_eq!(session.config.title, "Second");
        let home = fs::read_to_string(temp.path().join("public/index.html")).unwrap();
        assert!(home.contains("Second"));
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["refresh".to_string()]);
    }

    #[test]
    fn broken_config_is_fatal() {
        let (temp, mut session) = project(&[("site.toml", "title = \"Ok\"\n")]);

        write(temp.path(), "site.toml", "title = [");
        let result = orchestrator().full_rebuild_from_config(&mut session);

        assert!(matches!(result, Err(BuildError::Config(_))));
        assert_eq!(session.config.title, "Ok");
    }

    #[test]
    fn static_changes_are_mirrored() {
        let (temp, session) = project(&[("static/app.js", "one")]);
        let orchestrator = orchestrator();

        let source = temp.path().join("static/app.js");
        fs::write(&source, "two").unwrap();
        let synced = orchestrator
            .sync_static_changes(&session, &[ChangeEvent::new(&source, Op::WRITE)])
            .unwrap();

        assert_eq!(synced, 1);
        assert_eq!(
            fs::read_to_string(temp.path().join("public/app.js")).unwrap(),
            "two"
        );
    }

    #[test]
    fn permalink_for_rendered_source() {
        let (temp, mut session) = project(&[("content/posts/hello.md", POST)]);
        let orchestrator = orchestrator();
        assert_eq!(
            orchestrator.permalink_for_source(&session, &temp.path().join("content/posts/hello.md")),
            None
        );

        orchestrator.full_build(&mut session).unwrap();

        assert_eq!(
            orchestrator
                .permalink_for_source(&session, &temp.path().join("content/posts/hello.md"))
                .as_deref(),
            Some("/posts/hello/")
        );
    }
}
