//! Low-level file access: memory-mapped input, byte parsing and byte writing.
//!
//! Module images are read through a read-only memory map and decoded with
//! [`parser::Parser`]; images are produced in memory with [`writer::Writer`] and only then
//! written to disk in one piece.

pub mod io;
pub mod parser;
pub mod writer;

use std::{fs, path::Path};

use memmap2::Mmap;

use crate::{Error, Result};

/// Memory-map `path` and hand the bytes to `f`.
///
/// # Errors
/// Returns [`Error::FileError`] if the file cannot be opened or mapped,
/// [`Error::Malformed`] for an empty file, and whatever `f` returns.
pub fn with_mapped_file<T>(path: &Path, f: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
    let file = fs::File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(malformed_error!("Empty module file - {}", path.display()));
    }

    // The map is read-only and dropped before returning.
    let mmap = unsafe { Mmap::map(&file) }.map_err(Error::FileError)?;
    f(&mmap)
}

/// Write `data` to `path` in one call, creating or truncating the file.
///
/// # Errors
/// Returns [`Error::FileError`] on I/O failure.
pub fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data)?;
    Ok(())
}
