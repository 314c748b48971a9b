use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;
use zip::result::ZipError;

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOCATION: u64 = 1 << 20;

fn map_archive(archive_path: &Path) -> Result<Mmap> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    // SAFETY: The file is opened read-only and the map never outlives the caller's use.
    unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap archive: {}", archive_path.display()))
}

/// All file entry names of a jar (or jmod), in archive order.
pub fn list_entries(archive_path: &Path) -> Result<Vec<String>> {
    let mmap = map_archive(archive_path)?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", archive_path.display()))?;

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        names.push(entry.name().to_string());
    }
    Ok(names)
}

/// Read one entry; `Ok(None)` when the archive has no such entry.
pub fn read_entry(archive_path: &Path, entry_name: &str) -> Result<Option<Vec<u8>>> {
    let mmap = map_archive(archive_path)?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", archive_path.display()))?;

    let mut entry = match archive.by_name(entry_name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("Failed to open {entry_name} in {}", archive_path.display())
            });
        }
    };
    // The declared size comes from the archive and may be corrupt.
    let mut bytes = Vec::with_capacity(entry.size().min(MAX_PREALLOCATION) as usize);
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read {entry_name} in {}", archive_path.display()))?;
    Ok(Some(bytes))
}
