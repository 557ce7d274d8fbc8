//! Contains error types used in the pipeline.

use std::{fmt, path::PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// Error of `Importer::import`.
///
/// Any of these fails the import of a single document.
/// Other documents in the same tick are not affected.
#[derive(Debug, Error, Diagnostic)]
pub enum ImportError {
    #[error("I/O error on '{path}'")]
    #[diagnostic(code(kiln::import::io))]
    Io {
        path: PathBuf,

        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Meta(#[from] MetaError),

    #[error("{reason}")]
    #[diagnostic(code(kiln::import::other))]
    Other { reason: String },

    #[error("Importer panicked: {reason}")]
    #[diagnostic(
        code(kiln::import::panicked),
        help("This is a bug in the importer, not in the source asset")
    )]
    Panicked { reason: String },
}

impl ImportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImportError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn other(reason: impl Into<String>) -> Self {
        ImportError::Other {
            reason: reason.into(),
        }
    }
}

/// Error reading a `.meta` sidecar.
#[derive(Debug, Error, Diagnostic)]
pub enum MetaError {
    #[error("Failed to read sidecar '{path}'")]
    #[diagnostic(
        code(kiln::meta::read),
        help("Ensure file exists and is accessible")
    )]
    Read {
        path: PathBuf,

        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse sidecar '{path}'")]
    #[diagnostic(
        code(kiln::meta::parse),
        help("Sidecar must be a flat TOML table of `key = value` pairs")
    )]
    Parse {
        path: PathBuf,

        #[source]
        source: toml::de::Error,
    },

    #[error("Sidecar '{path}' has nested table under '{key}'")]
    #[diagnostic(code(kiln::meta::nested))]
    Nested { path: PathBuf, key: String },
}

/// Error loading pipeline configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("Cannot find 'Kiln.toml' in '{path}' or any parent directory")]
    #[diagnostic(
        code(kiln::config::not_found),
        help("Create 'Kiln.toml' at the project root")
    )]
    NotFound { path: PathBuf },

    #[error("Failed to resolve path '{path}'")]
    #[diagnostic(code(kiln::config::path))]
    Path {
        path: PathBuf,

        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read manifest '{path}'")]
    #[diagnostic(code(kiln::config::read))]
    Read {
        path: PathBuf,

        #[source]
        source: std::io::Error,
    },

    #[error("Cannot deserialize manifest '{path}'")]
    #[diagnostic(code(kiln::config::parse))]
    Parse {
        path: PathBuf,

        #[source]
        source: toml::de::Error,
    },
}

/// Error starting filesystem watchers.
#[derive(Debug, Error, Diagnostic)]
#[error("Failed to create filesystem watcher for '{root}'")]
#[diagnostic(
    code(kiln::watch::create),
    help("Check the OS limit on watched directories")
)]
pub struct WatchError {
    pub root: PathBuf,

    #[source]
    pub source: notify::Error,
}

/// Displays an error followed by all of its sources, separated by `: `.
pub struct Chain<'a>(pub &'a (dyn std::error::Error + 'static));

impl fmt::Display for Chain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {}", err)?;
            source = err.source();
        }
        Ok(())
    }
}
