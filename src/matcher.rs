use std::io::{self, Read};

use tracing::debug;

use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::error::Result;
use crate::index::ArchiveIndex;

pub const CHUNK_SIZE: usize = 8192;

/// Finds old-archive entries whose content is identical to a new-archive entry.
///
/// CRC (and declared size) only narrow the candidates; a match is always
/// confirmed by comparing the full decompressed streams.
pub struct ContentMatcher<'a> {
    old_index: &'a ArchiveIndex,
    old: &'a mut ArchiveReader,
}

impl<'a> ContentMatcher<'a> {
    pub fn new(old_index: &'a ArchiveIndex, old: &'a mut ArchiveReader) -> Self {
        Self { old_index, old }
    }

    /// Name of the old entry holding the same bytes as `entry`, preferring
    /// the entry with the same name, then the first by archive order.
    pub fn find_best_match(
        &mut self,
        new: &mut ArchiveReader,
        entry: &ArchiveEntry,
    ) -> Result<Option<String>> {
        if self.contains(new, entry)? {
            return Ok(Some(entry.name.clone()));
        }
        self.has_same_content(new, entry)
    }

    /// Same name and same content.
    fn contains(&mut self, new: &mut ArchiveReader, entry: &ArchiveEntry) -> Result<bool> {
        let old_index = self.old_index;
        let Some(old_entry) = old_index.entry_by_name(&entry.name) else {
            return Ok(false);
        };
        if !same_fingerprint(old_entry, entry) {
            return Ok(false);
        }
        Ok(!self.differs(old_entry, new, entry)?)
    }

    fn has_same_content(
        &mut self,
        new: &mut ArchiveReader,
        entry: &ArchiveEntry,
    ) -> Result<Option<String>> {
        let old_index = self.old_index;
        for candidate in old_index.entries_by_crc(entry.crc) {
            if candidate.size != entry.size {
                continue;
            }
            if !self.differs(candidate, new, entry)? {
                return Ok(Some(candidate.name.clone()));
            }
        }
        Ok(None)
    }

    fn differs(
        &mut self,
        old_entry: &ArchiveEntry,
        new: &mut ArchiveReader,
        entry: &ArchiveEntry,
    ) -> Result<bool> {
        let old_stream = self.old.open_entry(old_entry)?;
        let new_stream = new.open_entry(entry)?;
        let differs = streams_differ(old_stream, new_stream)?;
        if differs {
            debug!(old = %old_entry.name, new = %entry.name, "CRC matched but content differs");
        }
        Ok(differs)
    }
}

fn same_fingerprint(a: &ArchiveEntry, b: &ArchiveEntry) -> bool {
    a.crc == b.crc && a.size == b.size
}

/// Compare two streams chunk by chunk in lockstep.
///
/// Returns `true` as soon as a chunk length or byte disagrees, `false` only
/// when both streams end together.
pub fn streams_differ<A: Read, B: Read>(mut old: A, mut new: B) -> io::Result<bool> {
    let mut old_buf = vec![0u8; CHUNK_SIZE];
    let mut new_buf = vec![0u8; CHUNK_SIZE];
    loop {
        let new_len = read_chunk(&mut new, &mut new_buf)?;
        let old_len = read_chunk(&mut old, &mut old_buf)?;
        if new_len != old_len {
            return Ok(true);
        }
        if new_len == 0 {
            return Ok(false);
        }
        if new_buf[..new_len] != old_buf[..old_len] {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the stream allows, so short reads do not shift chunk boundaries.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
