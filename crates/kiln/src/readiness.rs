//! Checks whether a source file is safe to read.
//!
//! Editors and copy tools write files in several steps.
//! A file that is locked by its writer, or still empty, is not ready.

use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// Result of the readiness probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Probes the file at `path`.
///
/// File must open without sharing, accept an exclusive lock and be non-empty.
pub fn probe(path: &Path) -> Readiness {
    let file = match open_exclusive(path) {
        Ok(file) => file,
        Err(err) => {
            tracing::trace!("'{}' cannot be opened. {:#}", path.display(), err);
            return Readiness::NotReady;
        }
    };

    if let Err(err) = file.try_lock() {
        tracing::trace!("'{}' is locked. {}", path.display(), err);
        return Readiness::NotReady;
    }

    let ready = match file.metadata() {
        Ok(m) => m.len() > 0,
        Err(_) => false,
    };

    // Lock is released when `file` is dropped.
    if ready {
        Readiness::Ready
    } else {
        Readiness::NotReady
    }
}

#[cfg(windows)]
fn open_exclusive(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    OpenOptions::new().read(true).share_mode(0).open(path)
}

#[cfg(not(windows))]
fn open_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}
