use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Two equal-length inputs with the same CRC-32 (0x84f8ac19) but different bytes.
pub const CRC_TWIN_A: &[u8] = &[63, 45, 213, 250, 230, 101, 190, 137];
pub const CRC_TWIN_B: &[u8] = &[101, 6, 107, 169, 89, 160, 50, 145];

/// Write a deflated ZIP with the given entries, in the given order.
pub fn write_zip(dir: &Path, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (entry_name, content) in files {
        zip.start_file(*entry_name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
    path
}

/// Read every entry of a ZIP, sorted by name.
pub fn read_zip(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = std::fs::File::open(path).unwrap();
    let mut zip = ZipArchive::new(file).unwrap();
    let mut entries = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        entries.push((entry.name().to_string(), data));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}
