//! Documents and the registry that owns them.
//!
//! Pipeline never creates or destroys documents on its own.
//! It resolves paths through [`DocumentRegistry`] and reads documents by id.

use std::{
    collections::VecDeque,
    fmt,
    path::{Path, PathBuf},
};

use hashbrown::HashMap;

use crate::{importer::Importers, meta::META_EXTENSION};

/// Extension of artifact files.
pub const ARTIFACT_EXTENSION: &str = "bin";

/// Identifier of a document in its registry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DocumentId(u32);

impl DocumentId {
    pub const fn new(value: u32) -> Self {
        DocumentId(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One source asset known to the registry.
#[derive(Clone, Debug)]
pub struct Document {
    pub id: DocumentId,

    /// Logical name. Path relative to its source root without extension,
    /// with `/` separators.
    pub name: String,

    /// Kind of artifact produced from this document.
    pub kind: String,

    /// Absolute path to the source file.
    pub source: PathBuf,

    /// Set when document is removed from the registry.
    /// Disposed documents are never imported.
    pub disposed: bool,
}

/// Registry that owns documents.
pub trait DocumentRegistry {
    /// Finds document for the source `path`.
    ///
    /// Registry may create new document if the path is recognized.
    fn resolve_path(&mut self, path: &Path, importers: &Importers) -> Option<DocumentId>;

    /// Returns document by id.
    fn document(&self, id: DocumentId) -> Option<&Document>;

    /// Returns path of the artifact for the document.
    fn target_path(&self, doc: &Document) -> PathBuf;

    /// Returns all documents in registration order.
    fn documents(&self) -> Vec<DocumentId>;

    /// Returns source roots to watch.
    fn source_roots(&self) -> Vec<PathBuf>;
}

/// Registry backed by source directories on disk.
pub struct Documents {
    roots: Vec<PathBuf>,
    artifacts: PathBuf,
    documents: Vec<Document>,
    by_path: HashMap<PathBuf, DocumentId>,
    by_name: HashMap<(String, String), DocumentId>,
}

impl Documents {
    /// Creates empty registry.
    ///
    /// Roots are canonicalized when they exist, so paths reported by OS watchers
    /// match document paths.
    /// Files under `artifacts` are never registered, even when it lies inside a root.
    pub fn new(roots: impl IntoIterator<Item = PathBuf>, artifacts: impl Into<PathBuf>) -> Self {
        let roots = roots
            .into_iter()
            .map(|root| dunce::canonicalize(&root).unwrap_or(root))
            .collect();

        Documents {
            roots,
            artifacts: canonicalize_existing_prefix(artifacts.into()),
            documents: Vec::new(),
            by_path: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Creates registry and registers every recognized source under the roots.
    pub fn scan(
        roots: impl IntoIterator<Item = PathBuf>,
        artifacts: impl Into<PathBuf>,
        importers: &Importers,
    ) -> Self {
        let mut documents = Documents::new(roots, artifacts);
        documents.rescan(importers);
        documents
    }

    /// Registers every recognized source not yet known.
    ///
    /// Directories are walked breadth-first, entries in each directory are sorted by name.
    pub fn rescan(&mut self, importers: &Importers) -> usize {
        let mut found = Vec::new();
        for root in &self.roots {
            scan_root(root, &self.artifacts, &mut found);
        }

        let before = self.documents.len();
        for path in found {
            self.register(path, importers);
        }

        let added = self.documents.len() - before;
        tracing::debug!("Scan registered {} new documents", added);
        added
    }

    /// Marks document disposed and forgets its path.
    pub fn remove(&mut self, id: DocumentId) -> bool {
        let Some(doc) = self.documents.get_mut(id.0 as usize) else {
            return false;
        };

        if doc.disposed {
            return false;
        }

        doc.disposed = true;
        self.by_path.remove(&doc.source);
        self.by_name.remove(&(doc.kind.clone(), doc.name.clone()));
        tracing::debug!("Removed document '{}'", doc.name);
        true
    }

    /// Finds document by logical name.
    pub fn find(&self, name: &str) -> Option<&Document> {
        self.documents
            .iter()
            .find(|doc| !doc.disposed && doc.name == name)
    }

    pub fn artifacts(&self) -> &Path {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.documents.iter().filter(|doc| !doc.disposed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&mut self, path: PathBuf, importers: &Importers) -> Option<DocumentId> {
        if let Some(id) = self.by_path.get(&path) {
            return Some(*id);
        }

        if path.starts_with(&self.artifacts) {
            tracing::trace!("'{}' is an artifact", path.display());
            return None;
        }

        let kind = importers.kind_for_path(&path)?;
        let root = self.roots.iter().find(|root| path.starts_with(root))?;
        let name = document_name(root, &path)?;

        // Target path is derived from kind and name, two sources must not share it.
        let key = (kind.to_owned(), name);
        if let Some(other) = self
            .by_name
            .get(&key)
            .and_then(|id| self.documents.get(id.0 as usize))
        {
            tracing::warn!(
                "Ignoring '{}'. {} '{}' is already produced by '{}'",
                path.display(),
                key.0,
                key.1,
                other.source.display(),
            );
            return None;
        }
        let (kind, name) = key;

        let id = DocumentId(u32::try_from(self.documents.len()).ok()?);
        tracing::debug!("Registered '{}' as {} '{}'", path.display(), kind, name);

        self.by_name.insert((kind.clone(), name.clone()), id);
        self.documents.push(Document {
            id,
            name,
            kind,
            source: path.clone(),
            disposed: false,
        });
        self.by_path.insert(path, id);
        Some(id)
    }
}

impl DocumentRegistry for Documents {
    fn resolve_path(&mut self, path: &Path, importers: &Importers) -> Option<DocumentId> {
        if let Some(id) = self.by_path.get(path) {
            return Some(*id);
        }

        // Relative and non-canonical paths come from external callers.
        let path = match dunce::canonicalize(path) {
            Ok(path) => path,
            Err(_) => return None,
        };

        if let Some(id) = self.by_path.get(&path) {
            return Some(*id);
        }

        if !path.is_file() {
            return None;
        }

        self.register(path, importers)
    }

    fn document(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get(id.0 as usize)
    }

    fn target_path(&self, doc: &Document) -> PathBuf {
        let mut path = self.artifacts.join(&doc.kind);
        path.extend(doc.name.split('/'));
        let mut file = path.into_os_string();
        file.push(".");
        file.push(ARTIFACT_EXTENSION);
        PathBuf::from(file)
    }

    fn documents(&self) -> Vec<DocumentId> {
        self.documents
            .iter()
            .filter(|doc| !doc.disposed)
            .map(|doc| doc.id)
            .collect()
    }

    fn source_roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }
}

fn document_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;

    if parts.is_empty() {
        return None;
    }

    Some(parts.join("/"))
}

/// Canonicalizes the longest existing ancestor of `path` and appends the rest.
fn canonicalize_existing_prefix(path: PathBuf) -> PathBuf {
    let mut prefix = path.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = dunce::canonicalize(prefix) {
            return rest.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        let (Some(parent), Some(name)) = (prefix.parent(), prefix.file_name()) else {
            break;
        };
        rest.push(name.to_owned());
        prefix = parent;
    }
    path
}

fn scan_root(root: &Path, artifacts: &Path, found: &mut Vec<PathBuf>) {
    if !root.is_dir() {
        tracing::info!("Source root '{}' does not exist", root.display());
        return;
    }

    let mut queue = VecDeque::new();
    queue.push_back(root.to_owned());

    while let Some(dir_path) = queue.pop_front() {
        let dir = match std::fs::read_dir(&dir_path) {
            Err(err) => {
                tracing::error!(
                    "Failed to scan directory '{}'. {:#}",
                    dir_path.display(),
                    err
                );
                continue;
            }
            Ok(dir) => dir,
        };

        let mut entries = Vec::new();
        for e in dir {
            match e {
                Err(err) => {
                    tracing::error!(
                        "Failed to read entry in directory '{}'. {:#}",
                        dir_path.display(),
                        err,
                    );
                }
                Ok(e) => entries.push(e),
            }
        }
        entries.sort_by_key(|e| e.file_name());

        for e in entries {
            let path = dir_path.join(e.file_name());
            let ft = match e.file_type() {
                Err(err) => {
                    tracing::error!("Failed to check '{}'. {:#}", path.display(), err);
                    continue;
                }
                Ok(ft) => ft,
            };

            if ft.is_dir() {
                if path.starts_with(artifacts) {
                    continue;
                }
                queue.push_back(path);
            } else if ft.is_file() && path.extension().map_or(true, |ext| ext != META_EXTENSION) {
                found.push(path);
            }
        }
    }
}
