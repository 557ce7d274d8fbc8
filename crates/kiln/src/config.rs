//! Project configuration stored in `Kiln.toml`.

use std::path::{Path, PathBuf};

use crate::{
    error::ConfigError,
    importer::{Importers, Passthrough},
};

pub const MANIFEST_NAME: &str = "Kiln.toml";

const DEFAULT_SOURCES: &str = "assets";
const DEFAULT_ARTIFACTS: &str = "artifacts";

/// Declares a [`Passthrough`] importer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PassthroughConfig {
    pub kind: String,
    pub extensions: Vec<String>,
    #[serde(default = "default_version")]
    pub version: u32,
}

const fn default_version() -> u32 {
    1
}

#[derive(serde::Deserialize)]
struct Manifest {
    #[serde(default)]
    sources: Option<Vec<PathBuf>>,
    #[serde(default)]
    artifacts: Option<PathBuf>,
    #[serde(default)]
    watch: Option<bool>,
    #[serde(default)]
    passthrough: Vec<PassthroughConfig>,
}

/// Resolved pipeline configuration.
///
/// All paths are absolute.
#[derive(Clone, Debug)]
pub struct Config {
    /// Project root. Directory that contains the manifest.
    pub root: PathBuf,

    /// Source roots to scan and watch.
    pub sources: Vec<PathBuf>,

    /// Directory where artifacts are written.
    pub artifacts: PathBuf,

    /// Whether to start watchers after the initial pass.
    pub watch: bool,

    pub passthrough: Vec<PassthroughConfig>,
}

impl Config {
    /// Default configuration for project at `root`.
    pub fn new(root: &Path) -> Result<Self, ConfigError> {
        let root = dunce::canonicalize(root).map_err(|source| ConfigError::Path {
            path: root.to_owned(),
            source,
        })?;

        Ok(Config {
            sources: vec![root.join(DEFAULT_SOURCES)],
            artifacts: root.join(DEFAULT_ARTIFACTS),
            watch: true,
            passthrough: Vec::new(),
            root,
        })
    }

    /// Opens configuration from manifest file or directory containing one.
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let path = dunce::canonicalize(path).map_err(|source| ConfigError::Path {
            path: path.to_owned(),
            source,
        })?;

        let (manifest_path, root) = if path.is_dir() {
            (path.join(MANIFEST_NAME), path)
        } else {
            let root = match path.parent() {
                Some(root) => root.to_owned(),
                None => return Err(ConfigError::NotFound { path }),
            };
            (path, root)
        };

        let text = std::fs::read_to_string(&manifest_path).map_err(|source| ConfigError::Read {
            path: manifest_path.clone(),
            source,
        })?;

        let manifest: Manifest = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: manifest_path.clone(),
            source,
        })?;

        let mut config = Config::new(&root)?;
        if let Some(sources) = manifest.sources {
            config.sources = sources.iter().map(|p| root.join(p)).collect();
        }
        if let Some(artifacts) = manifest.artifacts {
            config.artifacts = root.join(artifacts);
        }
        if let Some(watch) = manifest.watch {
            config.watch = watch;
        }
        config.passthrough = manifest.passthrough;

        tracing::debug!("Loaded '{}'", manifest_path.display());
        Ok(config)
    }

    /// Finds manifest in `path` or any parent directory.
    pub fn find(path: &Path) -> Result<Self, ConfigError> {
        let mut candidate = dunce::canonicalize(path).map_err(|source| ConfigError::Path {
            path: path.to_owned(),
            source,
        })?;

        loop {
            candidate.push(MANIFEST_NAME);
            if candidate.is_file() {
                return Config::open(&candidate);
            }
            if !candidate.pop() || !candidate.pop() {
                break;
            }
        }

        Err(ConfigError::NotFound {
            path: path.to_owned(),
        })
    }

    /// Registers importers declared in the configuration.
    pub fn add_importers(&self, importers: &mut Importers) {
        for passthrough in &self.passthrough {
            let extensions: Vec<&str> = passthrough.extensions.iter().map(String::as_str).collect();
            importers.add_importer(
                passthrough.kind.clone(),
                Box::new(Passthrough::new(
                    passthrough.kind.clone(),
                    &extensions,
                    passthrough.version,
                )),
            );
        }
    }
}
