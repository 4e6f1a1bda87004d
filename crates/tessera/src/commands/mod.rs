//! Subcommands and the plumbing they share.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use clap::Args;
use tessera_build::{BuildSession, ConfigOverrides, SiteConfig};

pub mod build;
pub mod init;
pub mod server;

/// Flags shared by `build` and `server`.
#[derive(Args, Debug, Clone, Default)]
pub struct BuildFlags {
    /// Output directory (defaults to config or "public")
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// Base URL, overriding the config
    #[arg(short, long)]
    pub base_url: Option<String>,

    /// Include content marked as draft
    #[arg(short = 'D', long)]
    pub build_drafts: bool,

    /// Remove files from the destination that are not in the static dirs
    #[arg(long)]
    pub clean_destination_dir: bool,

    /// Remove stale output after the build
    #[arg(long)]
    pub gc: bool,

    /// Copy every static file on any static change
    #[arg(long)]
    pub force_sync_static: bool,
}

impl BuildFlags {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url.clone(),
            publish_dir: self.destination.clone(),
            build_drafts: self.build_drafts,
            clean_destination_dir: self.clean_destination_dir,
            gc: self.gc,
            force_sync_static: self.force_sync_static,
            ..Default::default()
        }
    }
}

/// Load the project in `source` with `overrides` layered over its config.
pub fn load_session(
    source: &Path,
    config_file: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<BuildSession> {
    let source_dir = source
        .canonicalize()
        .with_context(|| format!("Project directory not found: {}", source.display()))?;

    let mut config = SiteConfig::load(&source_dir, config_file)?;
    overrides.apply(&mut config);
    config.validate()?;

    let mut session = BuildSession::new(config);
    session.overrides = overrides;
    Ok(session)
}

pub fn lock(session: &Mutex<BuildSession>) -> MutexGuard<'_, BuildSession> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run `f` on the blocking pool with the session locked.
pub async fn with_session<T, F>(session: &Arc<Mutex<BuildSession>>, f: F) -> Result<T>
where
    F: FnOnce(&mut BuildSession) -> T + Send + 'static,
    T: Send + 'static,
{
    let session = Arc::clone(session);
    let result = tokio::task::spawn_blocking(move || f(&mut lock(&session)))
        .await
        .context("Build task panicked")?;
    Ok(result)
}

/// Resolves on Ctrl+C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
