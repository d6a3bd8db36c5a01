use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error;
use crate::index::ArchiveIndex;
use crate::patch_format::{CreateSummary, INDEX_NAME};
use crate::planner::PatchPlanner;

#[derive(Debug, Clone, Copy)]
pub struct CreateOptions {
    /// Allow several moves from one source. Disable to produce patches that
    /// older consumers, which cannot apply two moves from the same source, accept.
    pub minimal: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self { minimal: true }
    }
}

/// Create a patch that turns `old_archive` into `new_archive`.
/// Both archives are indexed concurrently; matching and writing run on one blocking thread.
pub async fn create_patch(
    old_archive: &Path,
    new_archive: &Path,
    output: &Path,
    options: CreateOptions,
) -> Result<CreateSummary> {
    let old_owned = old_archive.to_path_buf();
    let new_owned = new_archive.to_path_buf();

    let (old_index, new_index) = tokio::try_join!(
        tokio::task::spawn_blocking(move || ArchiveIndex::open(&old_owned)),
        tokio::task::spawn_blocking(move || ArchiveIndex::open(&new_owned)),
    )?;
    let old_index =
        old_index.with_context(|| format!("Failed to index {}", old_archive.display()))?;
    let new_index =
        new_index.with_context(|| format!("Failed to index {}", new_archive.display()))?;
    info!(
        old_entries = old_index.len(),
        new_entries = new_index.len(),
        "indexed archives"
    );

    let old_owned = old_archive.to_path_buf();
    let new_owned = new_archive.to_path_buf();
    let output_owned = output.to_path_buf();
    let summary = tokio::task::spawn_blocking(move || {
        write_patch(
            &old_owned,
            &old_index,
            &new_owned,
            &new_index,
            &output_owned,
            options,
        )
    })
    .await?
    .with_context(|| format!("Failed to create patch {}", output.display()))?;

    Ok(summary)
}

/// Plan the patch and write it: index entry first, then every payload copied raw
/// from the new archive. Nothing appears at `output` unless every step succeeds.
pub fn write_patch(
    old_archive: &Path,
    old_index: &ArchiveIndex,
    new_archive: &Path,
    new_index: &ArchiveIndex,
    output: &Path,
    options: CreateOptions,
) -> error::Result<CreateSummary> {
    let mut old = ArchiveReader::open(old_archive)?;
    let mut new = ArchiveReader::open(new_archive)?;

    let plan = PatchPlanner::new(options.minimal).plan(old_index, &mut old, new_index, &mut new)?;
    let index_text = plan.index.encode()?;

    let mut writer = ArchiveWriter::create(output)?;
    writer.write_bytes(INDEX_NAME, index_text.as_bytes())?;
    for entry in &plan.payloads {
        writer.copy_entry(&mut new, entry, &entry.name)?;
    }
    writer.finish(output)?;

    let summary = CreateSummary {
        entries_removed: plan.index.removes().len(),
        entries_moved: plan.index.moves().len(),
        entries_added: plan.payloads.len(),
        entries_unchanged: plan.unchanged.len(),
    };
    info!(?summary, patch = %output.display(), "patch written");
    Ok(summary)
}
