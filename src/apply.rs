use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::{self, Error};
use crate::index::ArchiveIndex;
use crate::patch_format::{decode_patch, ApplySummary};

/// Receives a completion percentage in `0..=100`, never decreasing.
pub type ProgressFn = Box<dyn FnMut(u8) + Send>;

/// Apply `patch` to `old_archive`, writing the reconstructed archive to `output`.
pub async fn apply_patch(
    old_archive: &Path,
    patch: &Path,
    output: &Path,
    progress: Option<ProgressFn>,
) -> Result<ApplySummary> {
    let old_owned = old_archive.to_path_buf();
    let patch_owned = patch.to_path_buf();
    let output_owned = output.to_path_buf();

    let summary = tokio::task::spawn_blocking(move || {
        reconstruct(&old_owned, &patch_owned, &output_owned, progress)
    })
    .await?
    .with_context(|| format!("Failed to apply patch {}", patch.display()))?;

    Ok(summary)
}

struct Progress {
    callback: Option<ProgressFn>,
    total: usize,
    done: usize,
    last: Option<u8>,
}

impl Progress {
    fn new(callback: Option<ProgressFn>, total: usize) -> Self {
        let mut progress = Self {
            callback,
            total,
            done: 0,
            last: None,
        };
        progress.report(0);
        progress
    }

    fn step(&mut self) {
        self.done += 1;
        let percent = (self.done * 100 / self.total.max(1)).min(100) as u8;
        self.report(percent);
    }

    fn finish(&mut self) {
        self.report(100);
    }

    fn report(&mut self, percent: u8) {
        if self.last.is_some_and(|last| last >= percent) {
            return;
        }
        self.last = Some(percent);
        if let Some(callback) = self.callback.as_mut() {
            callback(percent);
        }
    }
}

/// Rebuild the new archive from the old archive and a patch:
/// payloads first, then moves, then every old entry nothing else accounted for.
pub fn reconstruct(
    old_archive: &Path,
    patch: &Path,
    output: &Path,
    progress: Option<ProgressFn>,
) -> error::Result<ApplySummary> {
    let mut patch_reader = ArchiveReader::open(patch)?;
    let decoded = decode_patch(&mut patch_reader)?;
    let mut old = ArchiveReader::open(old_archive)?;
    let old_index = ArchiveIndex::build(&mut old)?;

    let ignore = decoded.index.ignore_set();
    let moves = decoded.index.moves();

    // Resolve every move source before writing anything.
    let mut sources = Vec::with_capacity(moves.len());
    for command in moves {
        let entry = old_index
            .entry_by_name(&command.source)
            .ok_or_else(|| Error::MissingMoveSource {
                source_name: command.source.clone(),
                command: command.to_string(),
            })?;
        sources.push(entry);
    }

    // An old name stays implicitly unless it is removed, replaced by a payload
    // or consumed as a move source.
    let mut carried: HashSet<&str> = old_index
        .names()
        .filter(|name| !ignore.contains(name))
        .collect();
    for entry in &decoded.payloads {
        carried.remove(entry.name.as_str());
    }
    for command in moves {
        carried.remove(command.source.as_str());
    }
    let implicit: Vec<_> = old_index
        .entries()
        .iter()
        .filter(|entry| carried.contains(entry.name.as_str()))
        .collect();

    let mut progress = Progress::new(
        progress,
        decoded.payloads.len() + moves.len() + implicit.len(),
    );
    let mut writer = ArchiveWriter::create(output)?;

    for entry in &decoded.payloads {
        debug!(name = %entry.name, "payload");
        writer.copy_entry(&mut patch_reader, entry, &entry.name)?;
        progress.step();
    }

    for (command, source) in moves.iter().zip(&sources) {
        debug!(source = %command.source, target = %command.target, "move");
        writer.copy_entry(&mut old, source, &command.target)?;
        progress.step();
    }

    for entry in &implicit {
        debug!(name = %entry.name, "implicit move");
        writer.copy_entry(&mut old, entry, &entry.name)?;
        progress.step();
    }

    writer.finish(output)?;
    progress.finish();

    let summary = ApplySummary {
        entries_added: decoded.payloads.len(),
        entries_moved: moves.len(),
        entries_unchanged: implicit.len(),
        entries_removed: decoded.index.removes().len(),
    };
    info!(?summary, output = %output.display(), "archive reconstructed");
    Ok(summary)
}
