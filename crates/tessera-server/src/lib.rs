//! Development server with live reload for tessera sites.
//!
//! Watches the source tree, turns batches of file events into full rebuilds,
//! partial rebuilds or static resyncs, and tells connected browsers to reload.

pub mod batcher;
pub mod classify;
pub mod debounce;
pub mod discovery;
pub mod error;
pub mod livereload;
pub mod server;
pub mod symlinks;
pub mod watcher;

pub use classify::{classify, Classification, Registrations};
pub use debounce::Debouncer;
pub use discovery::watch_roots;
pub use error::{ServerError, WatchError};
pub use livereload::{ReloadHub, ReloadMessage};
pub use server::{DevServer, DevServerConfig};
pub use symlinks::SymlinkRegistry;
pub use watcher::{BuildActions, SessionActions, WatchOptions, Watcher};
