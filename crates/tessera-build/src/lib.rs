//! Site building for tessera.
//!
//! Turns a content tree into documents, resolves their target paths, renders every
//! output format on a worker pool and publishes the results. A [`BuildSession`]
//! keeps the parsed site resident so the dev server can rebuild from file changes.

pub mod changes;
pub mod config;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod output;
pub mod page;
pub mod paginator;
pub mod publish;
pub mod reload;
pub mod render;
pub mod session;
pub mod site;
pub mod static_sync;
pub mod target;

pub use changes::{pick_changed_path, ChangeEvent, ChangeSet, Op};
pub use config::{ConfigError, ConfigOverrides, SiteConfig, CONFIG_FILE_NAME};
pub use error::{BuildError, ItemFailure};
pub use layout::{LayoutLookup, TemplateEngine};
pub use orchestrator::{BuildOrchestrator, BuildResult};
pub use output::{OutputFormat, OutputFormats};
pub use page::{Document, PageKind};
pub use reload::{LiveReload, NoReload};
pub use render::PageRenderPipeline;
pub use session::{BuildSession, ServerMode, StatsSnapshot, VisitedUrls};
pub use site::SiteGraph;
pub use static_sync::{make_static_path_relative, FsSync, StaticSync};
pub use target::TargetPathResolver;
