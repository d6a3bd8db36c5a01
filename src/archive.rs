//! Thin handles over the `zip` crate: a reader that enumerates and streams
//! entries, and a writer that stages its output in a temporary file and only
//! moves it into place once the archive is complete.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::util;

/// One stored file inside an archive, as listed in its central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub crc: u32,
    pub size: u64,
    pub compressed_size: u64,
    pub method: CompressionMethod,
    /// Position in the central directory, used to reopen the entry's stream.
    pub position: usize,
}

pub struct ArchiveReader {
    path: PathBuf,
    zip: ZipArchive<BufReader<File>>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::ArchiveRead {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        let zip = ZipArchive::new(BufReader::new(file)).map_err(|source| Error::ArchiveRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            zip,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List every entry in central-directory order without decompressing anything.
    pub fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::with_capacity(self.zip.len());
        for position in 0..self.zip.len() {
            let file = self
                .zip
                .by_index_raw(position)
                .map_err(|source| Error::ArchiveRead {
                    path: self.path.clone(),
                    source,
                })?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                crc: file.crc32(),
                size: file.size(),
                compressed_size: file.compressed_size(),
                method: file.compression(),
                position,
            });
        }
        Ok(entries)
    }

    /// Open a fresh decompressing stream over the entry's content.
    pub fn open_entry(&mut self, entry: &ArchiveEntry) -> Result<impl Read + '_> {
        let path = &self.path;
        self.zip
            .by_index(entry.position)
            .map_err(|source| Error::ArchiveRead {
                path: path.clone(),
                source,
            })
    }

    /// Read at most the entry's declared size into memory. The declared size
    /// comes from the archive and is never used to pre-allocate.
    pub fn read_entry(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open_entry(entry)?.take(entry.size).read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Writes an archive to a temporary file next to its destination.
///
/// Dropping the writer without calling [`ArchiveWriter::finish`] deletes the
/// temporary file, so a failed run never leaves a truncated archive behind.
pub struct ArchiveWriter {
    zip: ZipWriter<File>,
    temp: TempPath,
    written: HashSet<String>,
}

impl ArchiveWriter {
    pub fn create(dest: &Path) -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix(".jardiff-")
            .suffix(".tmp")
            .tempfile_in(util::staging_dir(dest))?;
        let (file, temp) = temp.into_parts();
        Ok(Self {
            zip: ZipWriter::new(file),
            temp,
            written: HashSet::new(),
        })
    }

    fn claim(&mut self, name: &str) -> Result<()> {
        if !self.written.insert(name.to_string()) {
            return Err(Error::DuplicateOutputEntry(name.to_string()));
        }
        Ok(())
    }

    /// Store `data` as a new deflated entry.
    pub fn write_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.claim(name)?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(name, options)?;
        self.zip.write_all(data)?;
        Ok(())
    }

    /// Copy an entry's compressed bytes as-is under `name`, keeping its
    /// timestamp, sizes, CRC and compression method.
    pub fn copy_entry(
        &mut self,
        reader: &mut ArchiveReader,
        entry: &ArchiveEntry,
        name: &str,
    ) -> Result<()> {
        self.claim(name)?;
        let path = reader.path.clone();
        let file = reader
            .zip
            .by_index_raw(entry.position)
            .map_err(|source| Error::ArchiveRead { path, source })?;
        if name == entry.name {
            self.zip.raw_copy_file(file)?;
        } else {
            self.zip.raw_copy_file_rename(file, name)?;
        }
        Ok(())
    }

    /// Finalize the archive and atomically move it to `dest`.
    pub fn finish(self, dest: &Path) -> Result<()> {
        let file = self.zip.finish()?;
        file.sync_all()?;
        drop(file);
        self.temp.persist(dest).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}
