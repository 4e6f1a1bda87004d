//! Errors of the watcher and the development server.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors that can occur while watching the source tree.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to start file watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("Failed to watch {path}: {source}")]
    Add {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("Watcher is closed")]
    Closed,
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address {0}")]
    Address(String),

    #[error("Failed to bind to {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    #[error("Server stopped: {0}")]
    Serve(std::io::Error),

    #[error(transparent)]
    Watch(#[from] WatchError),
}
