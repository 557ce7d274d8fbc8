//! Artifact header.
//!
//! Every artifact starts with the format version of the importer that produced it,
//! stored as little-endian `u32`. The rest of the file is owned by the importer.

use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
};

/// Size of the header in bytes.
pub const HEADER_LEN: usize = 4;

/// Writes format version header.
pub fn write_header(mut writer: impl Write, version: u32) -> io::Result<()> {
    writer.write_all(&version.to_le_bytes())
}

/// Reads format version from the artifact header.
///
/// Fails with `UnexpectedEof` if artifact is too short to contain the header.
pub fn read_version(path: &Path) -> io::Result<u32> {
    let mut file = File::open(path)?;
    let mut bytes = [0; HEADER_LEN];
    file.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}
