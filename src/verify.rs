use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::util;

/// Differences between two archives, compared by entry name and content.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveComparison {
    pub only_in_first: Vec<String>,
    pub only_in_second: Vec<String>,
    pub differing: Vec<String>,
}

impl ArchiveComparison {
    pub fn is_identical(&self) -> bool {
        self.only_in_first.is_empty() && self.only_in_second.is_empty() && self.differing.is_empty()
    }
}

/// Compare two archives entry by entry. Entry order and compression method are ignored.
pub fn compare_archives(first: &Path, second: &Path) -> Result<ArchiveComparison> {
    let first_digests = digest_entries(first)?;
    let second_digests = digest_entries(second)?;

    let mut comparison = ArchiveComparison::default();
    for (name, digest) in &first_digests {
        match second_digests.get(name) {
            None => comparison.only_in_first.push(name.clone()),
            Some(other) if other != digest => comparison.differing.push(name.clone()),
            Some(_) => {}
        }
    }
    comparison.only_in_second = second_digests
        .keys()
        .filter(|name| !first_digests.contains_key(*name))
        .cloned()
        .collect();
    Ok(comparison)
}

/// BLAKE3 digest of every entry's decompressed content, hashed in parallel.
/// Each worker gets its own handle over the shared memory map.
fn digest_entries(path: &Path) -> Result<BTreeMap<String, [u8; 32]>> {
    let map = util::mmap_file(path).map_err(|e| match e {
        Error::Io(io) => Error::ArchiveRead {
            path: path.to_path_buf(),
            source: io.into(),
        },
        other => other,
    })?;
    let archive_error = |source: zip::result::ZipError| Error::ArchiveRead {
        path: path.to_path_buf(),
        source,
    };
    let archive = ZipArchive::new(Cursor::new(&map[..])).map_err(archive_error)?;

    (0..archive.len())
        .into_par_iter()
        .map_init(
            || archive.clone(),
            |archive, position| -> Result<(String, [u8; 32])> {
                let mut file = archive.by_index(position).map_err(archive_error)?;
                let name = file.name().to_string();
                let digest = util::hash_reader(&mut file)?;
                Ok((name, digest))
            },
        )
        .collect()
}
