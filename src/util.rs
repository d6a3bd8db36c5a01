use memmap2::Mmap;
use std::io::Read;
use std::path::Path;

use crate::error::Result;

/// Memory-map a file for read-only access.
///
/// # Safety
/// The mapping is read-only. Callers must not concurrently truncate or replace
/// the underlying file while the `Mmap` is live.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = std::fs::File::open(path)?;
    // SAFETY: We only read from this mapping; no concurrent modification of these files.
    let map = unsafe { Mmap::map(&file)? };
    Ok(map)
}

/// Stream-hash a reader using BLAKE3.
/// Uses a 256 KB buffer to reduce read overhead for large compressed entries.
pub fn hash_reader<R: Read>(reader: R) -> Result<[u8; 32]> {
    let mut reader = std::io::BufReader::with_capacity(256 * 1024, reader);
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(*hasher.finalize().as_bytes())
}

/// Directory an output file is staged in before it is moved into place.
pub fn staging_dir(dest: &Path) -> &Path {
    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_reader_matches_one_shot_hash() {
        let data = vec![0x5Au8; 300 * 1024];
        let streamed = hash_reader(&data[..]).unwrap();
        assert_eq!(streamed, *blake3::hash(&data).as_bytes());
    }

    #[test]
    fn test_staging_dir() {
        assert_eq!(staging_dir(Path::new("out.jardiff")), Path::new("."));
        assert_eq!(staging_dir(Path::new("a/b/out.zip")), Path::new("a/b"));
    }
}
