use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{GraphError, Result};
use crate::storage::ser::LEN_SIZE;

/// Every chunk file starts with a single record-count header.
pub const CHUNK_HEADER_SIZE: u64 = LEN_SIZE as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Nodes,
    Edges,
}

impl ChunkKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ChunkKind::Nodes => "nodes",
            ChunkKind::Edges => "edges",
        }
    }

    pub fn file_name(self, index: u64) -> String {
        format!("{}_{}.bin", self.prefix(), index)
    }
}

/// Extracts the chunk index from `<prefix>_<i>.bin`. Returns `None` when the
/// name does not carry this kind's prefix or the index fails to parse.
pub fn parse_chunk_index(kind: ChunkKind, file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(".bin")?;
    let index = stem.strip_prefix(kind.prefix())?.strip_prefix('_')?;
    index.parse().ok()
}

/// Highest chunk index present in `dir`, or 0 when the directory holds no
/// chunk of this kind. Chunk-shaped names with an unparseable index are
/// skipped with a warning; anything else is ignored outright.
pub fn scan_last_index(dir: &Path, kind: ChunkKind) -> Result<u64> {
    let mut last = 0u64;
    for entry in read_dir(dir)? {
        let entry = entry.map_err(|err| iteration_error(dir, &err))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(stem) = chunk_stem(kind, name) else {
            continue;
        };
        match stem.parse::<u64>() {
            Ok(index) => last = last.max(index),
            Err(_) => warn!(file = %name, "storage.chunk.bad_filename"),
        }
    }
    Ok(last)
}

/// All chunk files of `kind` in `dir`, ordered by chunk index.
pub fn sorted_chunks(dir: &Path, kind: ChunkKind) -> Result<Vec<(u64, PathBuf)>> {
    let mut chunks = Vec::new();
    for entry in read_dir(dir)? {
        let entry = entry.map_err(|err| iteration_error(dir, &err))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(stem) = chunk_stem(kind, name) else {
            continue;
        };
        match stem.parse::<u64>() {
            Ok(index) => chunks.push((index, entry.path())),
            Err(_) => warn!(file = %name, "storage.chunk.bad_filename"),
        }
    }
    chunks.sort_unstable_by_key(|(index, _)| *index);
    Ok(chunks)
}

pub fn read_record_count<F: Read + Seek>(file: &mut F) -> Result<u64> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = [0u8; LEN_SIZE];
    file.read_exact(&mut buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            GraphError::Decode("chunk header truncated".into())
        } else {
            GraphError::Io(err)
        }
    })?;
    Ok(u64::from_le_bytes(buf))
}

pub fn write_record_count<F: Write + Seek>(file: &mut F, count: u64) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&count.to_le_bytes())?;
    Ok(())
}

fn chunk_stem(kind: ChunkKind, name: &str) -> Option<&str> {
    name.strip_suffix(".bin")?
        .strip_prefix(kind.prefix())?
        .strip_prefix('_')
}

fn read_dir(dir: &Path) -> Result<fs::ReadDir> {
    fs::read_dir(dir).map_err(|err| iteration_error(dir, &err))
}

fn iteration_error(dir: &Path, err: &io::Error) -> GraphError {
    GraphError::Filesystem(format!("cannot iterate {}: {err}", dir.display()))
}
