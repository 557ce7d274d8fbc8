use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use hashbrown::HashMap;

use crate::{artifact, error::ImportError, meta::Properties};

/// Trait for an importer.
///
/// Importer reads a source file and writes a typed binary artifact.
/// Each importer produces exactly one kind of artifact.
pub trait Importer: Send + Sync + 'static {
    /// Returns kind of artifacts this importer produces.
    fn kind(&self) -> &str;

    /// Returns list of extensions for source formats, without leading dot.
    fn extensions(&self) -> Vec<&str>;

    /// Returns format version of artifacts this importer writes.
    ///
    /// When defined, artifacts with different embedded version are reimported
    /// regardless of timestamps.
    fn format_version(&self) -> Option<u32> {
        None
    }

    /// Reads format version embedded into an existing artifact.
    fn embedded_version(&self, artifact: &Path) -> io::Result<u32> {
        artifact::read_version(artifact)
    }

    /// Reads data from `source` path and writes result at `output` path.
    ///
    /// `meta` contains properties from the source sidecar, empty if there is none.
    fn import(&self, source: &Path, output: &Path, meta: &Properties) -> Result<(), ImportError>;
}

/// Registry of importers.
pub struct Importers {
    importers: HashMap<String, Box<dyn Importer>>,
    by_kind: HashMap<String, String>,
    by_extension: HashMap<String, String>,
}

impl Default for Importers {
    fn default() -> Self {
        Importers::new()
    }
}

impl Importers {
    pub fn new() -> Self {
        Importers {
            importers: HashMap::new(),
            by_kind: HashMap::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Adds importer to the list of importers.
    ///
    /// Extensions already claimed by another importer stay with the first one.
    pub fn add_importer(&mut self, name: impl Into<String>, importer: Box<dyn Importer>) {
        let name = name.into();
        if self.importers.contains_key(&name) {
            tracing::warn!("Importer '{}' already registered", name);
            return;
        }

        let kind = importer.kind().to_owned();
        if let Some(other) = self.by_kind.get(&kind) {
            tracing::warn!(
                "Importer '{}' produces '{}' already produced by '{}'",
                name,
                kind,
                other
            );
            return;
        }

        tracing::info!(
            "Registering importer '{}'. {:?} -> '{}' v{:?}",
            name,
            importer.extensions(),
            kind,
            importer.format_version(),
        );

        for ext in importer.extensions() {
            let ext = ext.to_ascii_lowercase();
            match self.by_extension.get(&ext) {
                Some(other) => {
                    tracing::warn!(
                        "Extension '{}' is already claimed by '{}', ignored for '{}'",
                        ext,
                        other,
                        name
                    );
                }
                None => {
                    self.by_extension.insert(ext, name.clone());
                }
            }
        }

        self.by_kind.insert(kind, name.clone());
        self.importers.insert(name, importer);
    }

    pub fn with(mut self, name: impl Into<String>, importer: impl Importer) -> Self {
        self.add_importer(name, Box::new(importer));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.importers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Importer> {
        self.importers.get(name).map(|importer| &**importer)
    }

    /// Returns importer that produces artifacts of the `kind`.
    pub fn for_kind(&self, kind: &str) -> Option<&dyn Importer> {
        self.get(self.by_kind.get(kind)?)
    }

    /// Returns importer that claims the `extension`.
    pub fn for_extension(&self, extension: &str) -> Option<&dyn Importer> {
        self.get(self.by_extension.get(&extension.to_ascii_lowercase())?)
    }

    /// Returns artifact kind for source file `path`, if its extension is recognized.
    pub fn kind_for_path(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        Some(self.for_extension(ext)?.kind())
    }

    /// Expected format version for artifacts of the `kind`.
    pub fn expected_version(&self, kind: &str) -> Option<u32> {
        self.for_kind(kind)?.format_version()
    }

    /// Format version embedded into the artifact of the `kind`.
    pub fn embedded_version(&self, kind: &str, artifact: &Path) -> Option<io::Result<u32>> {
        Some(self.for_kind(kind)?.embedded_version(artifact))
    }
}

/// Importer that copies source bytes into the artifact after the header.
///
/// Sidecar key `skip = true` produces an artifact with header only.
#[derive(Clone, Debug)]
pub struct Passthrough {
    kind: String,
    extensions: Vec<String>,
    version: u32,
}

impl Passthrough {
    pub fn new(kind: impl Into<String>, extensions: &[&str], version: u32) -> Self {
        Passthrough {
            kind: kind.into(),
            extensions: extensions.iter().map(|ext| ext.to_string()).collect(),
            version,
        }
    }
}

impl Importer for Passthrough {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn extensions(&self) -> Vec<&str> {
        self.extensions.iter().map(String::as_str).collect()
    }

    fn format_version(&self) -> Option<u32> {
        Some(self.version)
    }

    fn import(&self, source: &Path, output: &Path, meta: &Properties) -> Result<(), ImportError> {
        let file = File::create(output).map_err(|err| ImportError::io(output, err))?;
        let mut writer = BufWriter::new(file);

        artifact::write_header(&mut writer, self.version)
            .map_err(|err| ImportError::io(output, err))?;

        if !meta.get_bool("skip").unwrap_or(false) {
            let mut reader = File::open(source).map_err(|err| ImportError::io(source, err))?;
            io::copy(&mut reader, &mut writer).map_err(|err| ImportError::io(source, err))?;
        }

        writer.flush().map_err(|err| ImportError::io(output, err))?;
        Ok(())
    }
}
