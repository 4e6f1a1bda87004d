//! Static site build command.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tessera_build::{BuildOrchestrator, BuildSession};
use tessera_server::{watch_roots, SessionActions, WatchOptions, Watcher};

use super::{load_session, lock, shutdown_signal, with_session, BuildFlags};

/// Run the build command.
pub async fn run(
    source: &Path,
    config_file: Option<&Path>,
    flags: BuildFlags,
    watch: bool,
) -> Result<()> {
    let session = load_session(source, config_file, flags.overrides())?;
    let orchestrator = Arc::new(BuildOrchestrator::new()?);
    let session = Arc::new(Mutex::new(session));

    tracing::info!("Building sites...");
    let built = with_session(&session, {
        let orchestrator = Arc::clone(&orchestrator);
        move |session: &mut BuildSession| orchestrator.full_build(session)
    })
    .await?;

    if !watch {
        let result = built?;
        tracing::info!(
            "Built {} pages in {}ms",
            result.pages(),
            result.duration_ms
        );
        tracing::info!("Output: {}", result.output_dir.display());
        return Ok(());
    }

    // Keep watching so the error can be fixed in place
    if let Err(e) = built {
        tracing::error!("Error building site: {}", e);
    }

    let roots = watch_roots(&lock(&session).config);
    let actions = Arc::new(SessionActions::new(Arc::clone(&session), orchestrator));
    let watcher = Watcher::start(actions, &roots, WatchOptions::default())?;
    tracing::info!("Watching for changes in {} director(ies)", roots.len());
    tracing::info!("Press Ctrl+C to stop");

    shutdown_signal().await;
    watcher.close();

    Ok(())
}
