use std::collections::HashSet;

use tracing::debug;

use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::error::{Error, Result};
use crate::index::ArchiveIndex;
use crate::matcher::ContentMatcher;
use crate::patch_format::{PatchIndex, INDEX_NAME};

/// Commands and literal payloads describing how to turn the old archive into the new one.
#[derive(Debug, Default)]
pub struct PatchPlan {
    pub index: PatchIndex,
    /// New or modified entries of the new archive, in new-archive order.
    pub payloads: Vec<ArchiveEntry>,
    /// Names carried over unchanged without any command.
    pub unchanged: Vec<String>,
}

pub struct PatchPlanner {
    /// When false, never emit a second move from a source that is already
    /// claimed; the entry is re-sent in full instead, so patch consumers that
    /// cannot execute two moves from one source can still apply the patch.
    minimal: bool,
}

impl PatchPlanner {
    pub fn new(minimal: bool) -> Self {
        Self { minimal }
    }

    pub fn plan(
        &self,
        old_index: &ArchiveIndex,
        old: &mut ArchiveReader,
        new_index: &ArchiveIndex,
        new: &mut ArchiveReader,
    ) -> Result<PatchPlan> {
        let mut matcher = ContentMatcher::new(old_index, old);

        let mut payloads: Vec<ArchiveEntry> = Vec::new();
        let mut new_or_modified: HashSet<&str> = HashSet::new();
        let mut implicit: HashSet<String> = HashSet::new();
        let mut used_sources: HashSet<String> = HashSet::new();
        let mut index = PatchIndex::new();

        // First pass: classify each new entry as new, unchanged or moved.
        for entry in new_index.entries() {
            if entry.name == INDEX_NAME {
                return Err(Error::ReservedEntryName(entry.name.clone()));
            }

            let Some(source) = matcher.find_best_match(new, entry)? else {
                debug!(name = %entry.name, "NEW");
                new_or_modified.insert(&entry.name);
                payloads.push(entry.clone());
                continue;
            };

            if source == entry.name && !used_sources.contains(&source) {
                debug!(name = %entry.name, "implicit move");
                implicit.insert(source);
                continue;
            }

            if !self.minimal && (implicit.contains(&source) || used_sources.contains(&source)) {
                debug!(name = %entry.name, source = %source, "NEW (source already claimed)");
                new_or_modified.insert(&entry.name);
                payloads.push(entry.clone());
                continue;
            }

            debug!(source = %source, target = %entry.name, "move");
            index.add_move(source.clone(), entry.name.clone())?;
            used_sources.insert(source.clone());

            // An explicit move from `source` disables its implicit carry-over,
            // so keep it under its own name with an identity move.
            if implicit.remove(&source) {
                debug!(name = %source, "implicit move replaced by identity move");
                index.add_move(source.clone(), source)?;
            }
        }

        // Second pass: removed = old - implicit - move sources - new or modified.
        for name in old_index.names() {
            if !implicit.contains(name)
                && !used_sources.contains(name)
                && !new_or_modified.contains(name)
            {
                debug!(name, "remove");
                index.add_remove(name);
            }
        }

        let unchanged = new_index
            .names()
            .filter(|name| implicit.contains(*name))
            .map(str::to_string)
            .collect();

        Ok(PatchPlan {
            index,
            payloads,
            unchanged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch_format::MoveCommand;
    use crate::test_support::{write_zip, CRC_TWIN_A, CRC_TWIN_B};

    fn plan(old_files: &[(&str, &[u8])], new_files: &[(&str, &[u8])], minimal: bool) -> PatchPlan {
        let dir = tempfile::tempdir().unwrap();
        let old_path = write_zip(dir.path(), "old.zip", old_files);
        let new_path = write_zip(dir.path(), "new.zip", new_files);
        let mut old = ArchiveReader::open(&old_path).unwrap();
        let mut new = ArchiveReader::open(&new_path).unwrap();
        let old_index = ArchiveIndex::build(&mut old).unwrap();
        let new_index = ArchiveIndex::build(&mut new).unwrap();
        PatchPlanner::new(minimal)
            .plan(&old_index, &mut old, &new_index, &mut new)
            .unwrap()
    }

    fn mv(source: &str, target: &str) -> MoveCommand {
        MoveCommand {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    fn payload_names(plan: &PatchPlan) -> Vec<&str> {
        plan.payloads.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_unchanged_archive_needs_no_commands() {
        let p = plan(&[("x.txt", b"hello")], &[("x.txt", b"hello")], true);
        assert!(p.index.is_empty());
        assert!(p.payloads.is_empty());
        assert_eq!(p.unchanged, ["x.txt"]);
    }

    #[test]
    fn test_rename_becomes_move() {
        let p = plan(&[("a.txt", b"hello")], &[("b.txt", b"hello")], true);
        assert!(p.index.removes().is_empty());
        assert_eq!(p.index.moves(), [mv("a.txt", "b.txt")]);
        assert!(p.payloads.is_empty());
    }

    #[test]
    fn test_modified_and_removed() {
        let p = plan(
            &[("a.txt", b"hello"), ("b.txt", b"world")],
            &[("a.txt", b"changed")],
            true,
        );
        assert_eq!(p.index.removes(), ["b.txt"]);
        assert!(p.index.moves().is_empty());
        assert_eq!(payload_names(&p), ["a.txt"]);
    }

    #[test]
    fn test_duplicate_content_uses_first_old_entry() {
        let p = plan(&[("a.txt", b"dup"), ("b.txt", b"dup")], &[("c.txt", b"dup")], true);
        assert_eq!(p.index.moves(), [mv("a.txt", "c.txt")]);
        assert_eq!(p.index.removes(), ["b.txt"]);
        assert!(p.payloads.is_empty());
    }

    #[test]
    fn test_non_minimal_resends_instead_of_second_move() {
        let p = plan(&[("a.txt", b"X")], &[("a.txt", b"X"), ("b.txt", b"X")], false);
        assert!(p.index.is_empty());
        assert_eq!(payload_names(&p), ["b.txt"]);
        assert_eq!(p.unchanged, ["a.txt"]);
    }

    #[test]
    fn test_minimal_replaces_implicit_with_identity_move() {
        let p = plan(&[("a.txt", b"X")], &[("a.txt", b"X"), ("b.txt", b"X")], true);
        assert_eq!(p.index.moves(), [mv("a.txt", "b.txt"), mv("a.txt", "a.txt")]);
        assert!(p.index.removes().is_empty());
        assert!(p.payloads.is_empty());
        assert!(p.unchanged.is_empty());
    }

    #[test]
    fn test_claimed_source_with_same_name_later() {
        // b.txt claims a.txt first, then a.txt itself shows up unchanged.
        let minimal = plan(&[("a.txt", b"X")], &[("b.txt", b"X"), ("a.txt", b"X")], true);
        assert_eq!(minimal.index.moves(), [mv("a.txt", "b.txt"), mv("a.txt", "a.txt")]);
        assert!(minimal.payloads.is_empty());

        let compat = plan(&[("a.txt", b"X")], &[("b.txt", b"X"), ("a.txt", b"X")], false);
        assert_eq!(compat.index.moves(), [mv("a.txt", "b.txt")]);
        assert_eq!(payload_names(&compat), ["a.txt"]);
        assert!(compat.index.removes().is_empty());
    }

    #[test]
    fn test_swapped_contents_are_two_moves() {
        let p = plan(
            &[("a.txt", b"first"), ("b.txt", b"second")],
            &[("a.txt", b"second"), ("b.txt", b"first")],
            true,
        );
        assert_eq!(p.index.moves(), [mv("b.txt", "a.txt"), mv("a.txt", "b.txt")]);
        assert!(p.index.removes().is_empty());
        assert!(p.payloads.is_empty());
    }

    #[test]
    fn test_reserved_index_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = write_zip(dir.path(), "old.zip", &[]);
        let new_path = write_zip(dir.path(), "new.zip", &[(INDEX_NAME, b"version 1.0\r\n")]);
        let mut old = ArchiveReader::open(&old_path).unwrap();
        let mut new = ArchiveReader::open(&new_path).unwrap();
        let old_index = ArchiveIndex::build(&mut old).unwrap();
        let new_index = ArchiveIndex::build(&mut new).unwrap();
        let err = PatchPlanner::new(true)
            .plan(&old_index, &mut old, &new_index, &mut new)
            .unwrap_err();
        assert!(matches!(err, Error::ReservedEntryName(_)));
    }

    #[test]
    fn test_planning_is_deterministic() {
        let old: &[(&str, &[u8])] = &[
            ("a", b"1"),
            ("b", b"1"),
            ("c", b"2"),
            ("d", b"3"),
            ("e", b"gone"),
        ];
        let new: &[(&str, &[u8])] = &[("z", b"1"), ("y", b"1"), ("c", b"3"), ("d", b"2"), ("n", b"new")];
        let first = plan(old, new, true);
        let second = plan(old, new, true);
        assert_eq!(first.index, second.index);
        assert_eq!(payload_names(&first), payload_names(&second));
        // "y" also matches the first duplicate, leaving "b" unreferenced.
        assert_eq!(first.index.removes(), ["b", "e"]);
        assert_eq!(first.index.moves()[1], mv("a", "y"));
    }

    #[test]
    fn test_crc_collision_is_not_a_match() {
        let p = plan(&[("a", CRC_TWIN_A), ("b", CRC_TWIN_B)], &[("a", CRC_TWIN_B)], true);
        assert_eq!(p.index.removes(), ["a"]);
        assert_eq!(p.index.moves(), [mv("b", "a")]);
        assert!(p.payloads.is_empty());

        let p = plan(&[("a", CRC_TWIN_A)], &[("a", CRC_TWIN_B)], true);
        assert_eq!(payload_names(&p), ["a"]);
        assert!(p.index.moves().is_empty());
    }
}
