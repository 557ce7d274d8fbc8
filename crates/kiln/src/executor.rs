//! Executes import of a single document.

use std::{
    ffi::OsString,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use crate::{
    document::Document,
    error::{Chain, ImportError},
    events::{Imported, ManifestFlag, Observers},
    importer::Importers,
    meta::Properties,
    readiness::{self, Readiness},
};

/// Result of [`Executor::execute`].
#[derive(Debug)]
pub enum Outcome {
    /// Artifact is written.
    Imported(Imported),

    /// Source disappeared since the document was queued.
    Missing,

    /// Source is still being written. Retry on next tick.
    NotReady,

    /// Import failed. Document is not retried until it changes again.
    Failed(ImportError),
}

/// Performs read-transform-write for documents popped from the queue.
pub struct Executor {
    check_readiness: bool,
    observers: Observers,
    manifest: ManifestFlag,
}

impl Default for Executor {
    fn default() -> Self {
        Executor::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Executor {
            check_readiness: false,
            observers: Observers::new(),
            manifest: ManifestFlag::new(),
        }
    }

    /// Enables readiness probe before each import.
    ///
    /// Probe is only needed while sources may change under our feet,
    /// i.e. while watchers are running.
    pub fn set_check_readiness(&mut self, check: bool) {
        self.check_readiness = check;
    }

    pub fn checks_readiness(&self) -> bool {
        self.check_readiness
    }

    pub fn subscribe(&mut self) -> flume::Receiver<Imported> {
        self.observers.subscribe()
    }

    pub fn manifest_flag(&self) -> &ManifestFlag {
        &self.manifest
    }

    /// Imports `doc` into `target`.
    pub fn execute(&mut self, doc: &Document, target: &Path, importers: &Importers) -> Outcome {
        if !doc.source.is_file() {
            tracing::debug!("Source of '{}' is gone, skipping", doc.name);
            return Outcome::Missing;
        }

        if self.check_readiness && readiness::probe(&doc.source) == Readiness::NotReady {
            tracing::debug!("'{}' is not ready, deferring", doc.name);
            return Outcome::NotReady;
        }

        match run_import(doc, target, importers) {
            Ok(()) => {
                tracing::info!("Imported '{}' as '{}'", doc.name, doc.kind);

                let event = Imported {
                    document: doc.id,
                    name: doc.name.clone(),
                    target: target.to_owned(),
                };
                self.observers.publish(&event);
                self.manifest.set();
                Outcome::Imported(event)
            }
            Err(err) => {
                tracing::error!("Failed to import '{}'. {}", doc.name, Chain(&err));
                Outcome::Failed(err)
            }
        }
    }
}

fn run_import(doc: &Document, target: &Path, importers: &Importers) -> Result<(), ImportError> {
    let importer = importers
        .for_kind(&doc.kind)
        .ok_or_else(|| ImportError::other(format!("No importer for '{}'", doc.kind)))?;

    let meta = Properties::load(&doc.source)?;

    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(|err| ImportError::io(dir, err))?;
    }

    let output = temporary_path(target);

    let result = catch_unwind(AssertUnwindSafe(|| {
        importer.import(&doc.source, &output, &meta)
    }))
    .unwrap_or_else(|payload| {
        let reason = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        Err(ImportError::Panicked { reason })
    });

    if let Err(err) = result {
        remove_temporary(&output);
        return Err(err);
    }

    if let Err(err) = std::fs::rename(&output, target) {
        remove_temporary(&output);
        return Err(ImportError::io(target, err));
    }

    Ok(())
}

/// Importer writes here, artifact is replaced only when import succeeds.
fn temporary_path(target: &Path) -> PathBuf {
    let mut path = OsString::from(target.as_os_str());
    path.push(".tmp");
    PathBuf::from(path)
}

fn remove_temporary(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!("Failed to remove '{}'. {:#}", path.display(), err);
        }
    }
}
