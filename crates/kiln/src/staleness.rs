//! Decides whether an artifact is out of date.
//!
//! Staleness is derived on demand from three timestamps and one version comparison,
//! nothing is stored between checks.

use std::{
    fmt,
    path::Path,
    time::SystemTime,
};

use crate::{document::Document, importer::Importers, meta::meta_path};

/// Result of the staleness check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Staleness {
    /// Import is requested regardless of state on disk.
    Forced,

    /// Source file does not exist. Nothing to import.
    MissingSource,

    /// Artifact does not exist yet.
    MissingTarget,

    /// Artifact carries format version other than importer expects.
    VersionMismatch { found: u32, expected: u32 },

    /// Artifact header cannot be read.
    Unreadable,

    /// Source was modified after artifact was written.
    SourceNewer,

    /// Sidecar was modified after artifact was written.
    MetaNewer,

    UpToDate,
}

impl Staleness {
    pub fn needs_import(self) -> bool {
        !matches!(self, Staleness::MissingSource | Staleness::UpToDate)
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::Forced => f.write_str("forced"),
            Staleness::MissingSource => f.write_str("source is missing"),
            Staleness::MissingTarget => f.write_str("no artifact"),
            Staleness::VersionMismatch { found, expected } => {
                write!(f, "artifact version {found}, expected {expected}")
            }
            Staleness::Unreadable => f.write_str("artifact header is unreadable"),
            Staleness::SourceNewer => f.write_str("source is newer"),
            Staleness::MetaNewer => f.write_str("sidecar is newer"),
            Staleness::UpToDate => f.write_str("up to date"),
        }
    }
}

/// Checks whether artifact at `target` must be rebuilt from `doc`.
pub fn check(doc: &Document, target: &Path, importers: &Importers, force: bool) -> Staleness {
    if !doc.source.is_file() {
        return Staleness::MissingSource;
    }

    if force {
        return Staleness::Forced;
    }

    let Some(target_modified) = modified(target) else {
        return Staleness::MissingTarget;
    };

    if let Some(expected) = importers.expected_version(&doc.kind) {
        match importers.embedded_version(&doc.kind, target) {
            Some(Ok(found)) if found != expected => {
                return Staleness::VersionMismatch { found, expected };
            }
            Some(Err(err)) => {
                tracing::debug!("Failed to read version of '{}'. {:#}", target.display(), err);
                return Staleness::Unreadable;
            }
            _ => {}
        }
    }

    // Source existence is checked above. Losing it now means it was deleted meanwhile.
    let Some(source_modified) = modified(&doc.source) else {
        return Staleness::MissingSource;
    };

    if source_modified > target_modified {
        return Staleness::SourceNewer;
    }

    // Missing sidecar never makes artifact stale.
    let meta_modified = modified(&meta_path(&doc.source)).unwrap_or(SystemTime::UNIX_EPOCH);
    if meta_modified > target_modified {
        return Staleness::MetaNewer;
    }

    Staleness::UpToDate
}

fn modified(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}
