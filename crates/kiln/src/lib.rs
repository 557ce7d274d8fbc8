//! Incremental asset import pipeline.
//!
//! Sources live under configured roots. Each recognized source file is a [`Document`]
//! that an [`Importer`] turns into a binary artifact under the artifacts directory.
//!
//! - The staleness check decides whether an artifact is older than its source,
//!   its `.meta` sidecar or the format version its importer expects.
//!   Stale documents are queued.
//!
//! - Watchers subscribe to every source root and push changed paths into an inbox.
//!   Watcher threads never touch the queues, the inbox is drained on the owner thread.
//!
//! - [`Pipeline::update`] performs one tick: drains the inbox, requeues deferred
//!   documents and imports everything queued, in order.
//!
//! - A source that is still being written by someone else is deferred to the next tick
//!   instead of being imported half-written.

pub mod artifact;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod executor;
pub mod importer;
pub mod meta;
pub mod pipeline;
pub mod readiness;
pub mod scheduler;
pub mod staleness;
pub mod watcher;

pub use self::{
    config::{Config, PassthroughConfig},
    document::{Document, DocumentId, DocumentRegistry, Documents},
    error::{ConfigError, ImportError, MetaError, WatchError},
    events::{Imported, ManifestFlag},
    executor::Outcome,
    importer::{Importer, Importers, Passthrough},
    meta::Properties,
    pipeline::Pipeline,
    readiness::Readiness,
    scheduler::{Inbox, TickStats},
    staleness::Staleness,
};
