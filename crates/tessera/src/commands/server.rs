//! Development server command.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Args;
use tessera_build::{BuildOrchestrator, BuildSession, ConfigOverrides, ServerMode};
use tessera_server::{
    watch_roots, DevServer, DevServerConfig, ReloadHub, SessionActions, WatchOptions, Watcher,
};

use super::{load_session, lock, shutdown_signal, with_session, BuildFlags};

/// Flags only the development server takes.
#[derive(Args, Debug, Clone)]
pub struct ServerFlags {
    /// Port to listen on (defaults to config or 1313)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,

    /// Open the site in a browser
    #[arg(long)]
    pub open: bool,

    /// Send browsers to the page of the last changed content file
    #[arg(short = 'N', long)]
    pub navigate_to_changed: bool,

    /// Do not inject the live reload script
    #[arg(long)]
    pub disable_live_reload: bool,

    /// Re-render every page on each change, not just the visited ones
    #[arg(long)]
    pub disable_fast_render: bool,
}

impl ServerFlags {
    fn apply(&self, overrides: &mut ConfigOverrides) {
        overrides.port = self.port;
        overrides.navigate_to_changed = self.navigate_to_changed;
        overrides.disable_live_reload = self.disable_live_reload;
        overrides.disable_fast_render = self.disable_fast_render;
    }
}

/// Run the dev server.
pub async fn run(
    source: &Path,
    config_file: Option<&Path>,
    flags: BuildFlags,
    server: ServerFlags,
) -> Result<()> {
    let mut overrides = flags.overrides();
    server.apply(&mut overrides);

    let session = load_session(source, config_file, overrides)?;
    let mode = ServerMode::from_config(&session.config);
    let visited = session.visited();

    let hub = ReloadHub::new();
    let orchestrator = Arc::new(BuildOrchestrator::new()?.with_reload(Arc::new(hub.clone())));
    let session = Arc::new(Mutex::new(session));

    tracing::info!("Building sites...");
    let built = with_session(&session, {
        let orchestrator = Arc::clone(&orchestrator);
        let mode = mode.clone();
        move |session: &mut BuildSession| orchestrator.server_build(session, mode)
    })
    .await?;
    if let Err(e) = built {
        tracing::error!("Error building site: {}", e);
    }

    let (publish_dir, base_path, roots) = {
        let session = lock(&session);
        (
            session.config.abs_publish_dir(),
            session.config.base_path(),
            watch_roots(&session.config),
        )
    };

    let actions = Arc::new(SessionActions::new(Arc::clone(&session), orchestrator));
    let watcher = Watcher::start(actions, &roots, WatchOptions::default())?;

    let config = DevServerConfig {
        publish_dir,
        port: mode.port,
        host: server.bind,
        base_path,
        open: server.open,
    };
    let served = DevServer::new(config, hub, visited)
        .run(shutdown_signal())
        .await;

    watcher.close();
    served?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn server_flags_extend_build_overrides() {
        let server = ServerFlags {
            port: Some(8080),
            bind: "0.0.0.0".to_string(),
            open: false,
            navigate_to_changed: true,
            disable_live_reload: false,
            disable_fast_render: true,
        };
        let mut overrides = BuildFlags {
            build_drafts: true,
            ..Default::default()
        }
        .overrides();

        server.apply(&mut overrides);

        assert_eq!(overrides.port, Some(8080));
        assert!(overrides.navigate_to_changed);
        assert!(overrides.disable_fast_render);
        assert!(!overrides.disable_live_reload);
        assert!(overrides.build_drafts);
    }
}
