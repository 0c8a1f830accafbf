// src/daemon/mod.rs

//! Long-lived background process holding a hot project graph.
//!
//! - [`server`] listens on `<workspace>/.monodag/daemon/d.sock`, owns the
//!   lock file and forwards file-watcher events.
//! - [`session`] serializes requests and rebuilds through one actor.
//! - [`client`] is what the CLI uses, including auto-start.
//! - [`messages`] and [`framing`] define the wire format.
//! - [`enablement`] decides whether a run uses the daemon at all.

pub mod client;
pub mod enablement;
pub mod framing;
pub mod messages;
pub mod server;
pub mod session;

pub use client::{DaemonClient, DaemonOutputs};
pub use enablement::should_use_daemon;
pub use messages::{DaemonRequest, DaemonResponse, FileChanges};
pub use server::{DaemonPaths, serve, serve_session};
