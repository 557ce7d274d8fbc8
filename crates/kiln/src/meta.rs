//! `.meta` sidecar files.
//!
//! Sidecar sits next to its source, `foo.png` has `foo.png.meta`.
//! It is a flat TOML table that tunes how the source is imported.
//! Sidecars are created by other tooling, pipeline only reads them.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::error::MetaError;

/// Extension of sidecar files.
pub const META_EXTENSION: &str = "meta";

/// Returns path of the sidecar for `source`.
pub fn meta_path(source: &Path) -> PathBuf {
    let mut path = OsString::from(source.as_os_str());
    path.push(".");
    path.push(META_EXTENSION);
    PathBuf::from(path)
}

/// Returns source path if `path` is a sidecar.
pub fn source_for_meta(path: &Path) -> Option<PathBuf> {
    if path.extension()? != META_EXTENSION {
        return None;
    }
    let source = path.with_extension("");
    source.file_name()?;
    Some(source)
}

/// Key-value properties read from a sidecar.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Properties {
    values: BTreeMap<String, toml::Value>,
}

impl Properties {
    pub fn new() -> Self {
        Properties::default()
    }

    /// Loads sidecar of the `source`.
    /// Missing sidecar yields empty properties.
    pub fn load(source: &Path) -> Result<Self, MetaError> {
        let path = meta_path(source);

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Properties::new()),
            Err(source) => return Err(MetaError::Read { path, source }),
        };

        Properties::parse(&text, &path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, MetaError> {
        let table: toml::Table = toml::from_str(text).map_err(|source| MetaError::Parse {
            path: path.to_owned(),
            source,
        })?;

        let mut values = BTreeMap::new();
        for (key, value) in table {
            if value.is_table() {
                return Err(MetaError::Nested {
                    path: path.to_owned(),
                    key,
                });
            }
            values.insert(key, value);
        }

        Ok(Properties { values })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key)?.as_str()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key)?.as_bool()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get(key)?.as_integer()
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            toml::Value::Float(value) => Some(*value),
            toml::Value::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<toml::Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &toml::Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }
}
