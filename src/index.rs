use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::error::Result;

/// Name and CRC lookups over one archive's entries. Built once, read-only afterwards.
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    entries: Vec<ArchiveEntry>,
    by_name: HashMap<String, usize>,
    /// CRC -> positions in `entries`, in discovery order.
    by_crc: HashMap<u32, Vec<usize>>,
}

impl ArchiveIndex {
    /// Open the archive at `path`, index it and release the file.
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = ArchiveReader::open(path)?;
        Self::build(&mut reader)
    }

    pub fn build(reader: &mut ArchiveReader) -> Result<Self> {
        debug!(archive = %reader.path().display(), "indexing");
        Ok(Self::from_entries(reader.entries()?))
    }

    pub fn from_entries(entries: Vec<ArchiveEntry>) -> Self {
        let mut by_name = HashMap::with_capacity(entries.len());
        let mut by_crc: HashMap<u32, Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            debug!(name = %entry.name, crc = entry.crc, "indexed entry");
            by_name.entry(entry.name.clone()).or_insert(idx);
            by_crc.entry(entry.crc).or_default().push(idx);
        }
        Self {
            entries,
            by_name,
            by_crc,
        }
    }

    pub fn entry_by_name(&self, name: &str) -> Option<&ArchiveEntry> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn entries_by_crc(&self, crc: u32) -> impl Iterator<Item = &ArchiveEntry> + '_ {
        self.by_crc
            .get(&crc)
            .into_iter()
            .flatten()
            .map(|&idx| &self.entries[idx])
    }

    /// All entries in archive order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::CompressionMethod;

    fn entry(name: &str, crc: u32, position: usize) -> ArchiveEntry {
        ArchiveEntry {
            name: name.to_string(),
            crc,
            size: 0,
            compressed_size: 0,
            method: CompressionMethod::Stored,
            position,
        }
    }

    #[test]
    fn test_crc_buckets_keep_discovery_order() {
        let index = ArchiveIndex::from_entries(vec![
            entry("b.txt", 7, 0),
            entry("other", 9, 1),
            entry("a.txt", 7, 2),
        ]);
        let names: Vec<&str> = index.entries_by_crc(7).map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b.txt", "a.txt"]);
        assert_eq!(index.entries_by_crc(42).count(), 0);
    }

    #[test]
    fn test_lookup_by_name() {
        let index = ArchiveIndex::from_entries(vec![entry("x", 1, 0), entry("y", 2, 1)]);
        assert_eq!(index.entry_by_name("y").map(|e| e.crc), Some(2));
        assert!(index.entry_by_name("z").is_none());
        assert_eq!(index.names().collect::<Vec<_>>(), ["x", "y"]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_open_reads_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = crate::test_support::write_zip(
            dir.path(),
            "a.zip",
            &[("a.txt", b"dup"), ("b.txt", b"dup"), ("c.txt", b"unique")],
        );
        let index = ArchiveIndex::open(&path).unwrap();
        let crc = index.entry_by_name("a.txt").unwrap().crc;
        let same: Vec<&str> = index.entries_by_crc(crc).map(|e| e.name.as_str()).collect();
        assert_eq!(same, ["a.txt", "b.txt"]);
    }

    #[test]
    fn test_empty_index() {
        let index = ArchiveIndex::default();
        assert_eq!(index.len(), 0);
        assert!(index.entry_by_name("anything").is_none());
    }
}
