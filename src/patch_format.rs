use std::collections::HashSet;
use std::fmt;

use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::error::{Error, Result};

/// Name of the command stream inside a patch archive.
pub const INDEX_NAME: &str = "META-INF/INDEX.JD";
pub const VERSION_HEADER: &str = "version 1.0";
pub const REMOVE_COMMAND: &str = "remove";
pub const MOVE_COMMAND: &str = "move";
const LINE_END: &str = "\r\n";
/// Largest index entry `decode_patch` will read into memory.
pub const MAX_INDEX_SIZE: u64 = 64 * 1024 * 1024;

/// "Entry previously named `source` is now named `target`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCommand {
    pub source: String,
    pub target: String,
}

impl fmt::Display for MoveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{MOVE_COMMAND} {} {}",
            escape_path(&self.source),
            escape_path(&self.target)
        )
    }
}

/// The remove and move commands carried by a patch's index entry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchIndex {
    removes: Vec<String>,
    moves: Vec<MoveCommand>,
    targets: HashSet<String>,
}

impl PatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn removes(&self) -> &[String] {
        &self.removes
    }

    pub fn moves(&self) -> &[MoveCommand] {
        &self.moves
    }

    pub fn is_empty(&self) -> bool {
        self.removes.is_empty() && self.moves.is_empty()
    }

    pub fn add_remove(&mut self, name: impl Into<String>) {
        self.removes.push(name.into());
    }

    /// Record a move; a target may only be produced by one move.
    pub fn add_move(&mut self, source: impl Into<String>, target: impl Into<String>) -> Result<()> {
        let target = target.into();
        if !self.targets.insert(target.clone()) {
            return Err(Error::DuplicateMoveTarget { target });
        }
        self.moves.push(MoveCommand {
            source: source.into(),
            target,
        });
        Ok(())
    }

    pub fn ignore_set(&self) -> HashSet<&str> {
        self.removes.iter().map(String::as_str).collect()
    }

    /// Render the index text: header, removes, then moves, CRLF-terminated.
    pub fn encode(&self) -> Result<String> {
        let mut out = String::new();
        out.push_str(VERSION_HEADER);
        out.push_str(LINE_END);

        for name in &self.removes {
            check_encodable(name)?;
            out.push_str(REMOVE_COMMAND);
            out.push(' ');
            out.push_str(&escape_path(name));
            out.push_str(LINE_END);
        }

        for command in &self.moves {
            check_encodable(&command.source)?;
            check_encodable(&command.target)?;
            out.push_str(&command.to_string());
            out.push_str(LINE_END);
        }

        Ok(out)
    }

    pub fn decode(text: &str) -> Result<Self> {
        let body = text
            .strip_suffix(LINE_END)
            .or_else(|| text.strip_suffix('\n'))
            .unwrap_or(text);
        let mut lines = body
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line));

        match lines.next() {
            Some(VERSION_HEADER) => {}
            Some(other) => {
                return Err(Error::BadPatchFormat(format!(
                    "expected header {VERSION_HEADER:?}, found {other:?}"
                )))
            }
            None => return Err(Error::BadPatchFormat("empty index".to_string())),
        }

        let mut index = PatchIndex::new();
        for line in lines {
            let keyword_end = line.find(char::is_whitespace).unwrap_or(line.len());
            let (keyword, rest) = line.split_at(keyword_end);
            let paths = split_paths(rest);

            match (keyword, paths.as_slice()) {
                (REMOVE_COMMAND, [name]) => index.add_remove(name.clone()),
                (MOVE_COMMAND, [source, target]) => {
                    index.add_move(source.clone(), target.clone())?
                }
                (REMOVE_COMMAND, _) | (MOVE_COMMAND, _) => {
                    return Err(Error::BadPatchFormat(format!(
                        "wrong number of paths in line {line:?}"
                    )))
                }
                _ => {
                    return Err(Error::BadPatchFormat(format!(
                        "unknown command in line {line:?}"
                    )))
                }
            }
        }

        Ok(index)
    }
}

/// Escape spaces as `\ ` so paths can be separated by whitespace.
pub fn escape_path(path: &str) -> String {
    path.replace(' ', "\\ ")
}

/// Only plain spaces have an escape; any other whitespace, an empty name or a
/// trailing backslash (which would swallow the separator) cannot round-trip.
fn check_encodable(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.ends_with('\\')
        || name.chars().any(|c| c != ' ' && c.is_whitespace());
    if bad {
        return Err(Error::UnencodableName(name.to_string()));
    }
    Ok(())
}

/// Split on unescaped whitespace, turning `\ ` back into a space.
/// A backslash not followed by a space is kept literally.
pub fn split_paths(s: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut current = String::new();
    let mut in_path = false;
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&' ') {
            chars.next();
            current.push(' ');
            in_path = true;
        } else if c.is_whitespace() {
            if in_path {
                paths.push(std::mem::take(&mut current));
                in_path = false;
            }
        } else {
            current.push(c);
            in_path = true;
        }
    }
    if in_path {
        paths.push(current);
    }
    paths
}

/// A patch archive read back: its commands plus the literal payload entries.
#[derive(Debug)]
pub struct DecodedPatch {
    pub index: PatchIndex,
    pub payloads: Vec<ArchiveEntry>,
}

/// Locate the index entry by name, parse it, and treat every other entry as a payload.
pub fn decode_patch(reader: &mut ArchiveReader) -> Result<DecodedPatch> {
    let mut index_entry = None;
    let mut payloads = Vec::new();
    for entry in reader.entries()? {
        if entry.name == INDEX_NAME {
            index_entry = Some(entry);
        } else {
            payloads.push(entry);
        }
    }

    let index_entry = index_entry.ok_or_else(|| {
        Error::BadPatchFormat(format!("patch has no {INDEX_NAME} entry"))
    })?;
    if index_entry.size > MAX_INDEX_SIZE {
        return Err(Error::BadPatchFormat(format!(
            "{INDEX_NAME} declares {} bytes, limit is {MAX_INDEX_SIZE}",
            index_entry.size
        )));
    }
    let text = String::from_utf8(reader.read_entry(&index_entry)?)
        .map_err(|_| Error::BadPatchFormat(format!("{INDEX_NAME} is not valid UTF-8")))?;

    Ok(DecodedPatch {
        index: PatchIndex::decode(&text)?,
        payloads,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSummary {
    pub entries_removed: usize,
    pub entries_moved: usize,
    pub entries_added: usize,
    pub entries_unchanged: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub entries_added: usize,
    pub entries_moved: usize,
    pub entries_unchanged: usize,
    pub entries_removed: usize,
}
