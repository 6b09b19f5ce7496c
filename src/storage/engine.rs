use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use tracing::{debug, warn};

use crate::error::{GraphError, Result};
use crate::model::{Edge, Node};
use crate::storage::chunk::{
    self, read_record_count, write_record_count, ChunkKind, CHUNK_HEADER_SIZE,
};
use crate::storage::ser::{
    decode_edge, decode_node, encode_edge, encode_node, estimate_edge_size, estimate_node_size,
    read_len,
};

/// Budget a chunk file may grow to before the save protocol rotates to the
/// next chunk index.
pub const MAX_CHUNK_SIZE: u64 = 1024 * 1024;

const DEFAULT_NODE_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub max_chunk_size: u64,
    pub node_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_chunk_size: MAX_CHUNK_SIZE,
            node_cache_capacity: DEFAULT_NODE_CACHE_CAPACITY,
        }
    }
}

/// Where a record lives on disk: the chunk file and the byte offset of the
/// record's first length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocation {
    pub file: PathBuf,
    pub offset: u64,
}

/// The storage engine for one box directory.
///
/// Owns the chunk-index counters and the in-memory offset indices. Indices
/// are not built at open; callers invoke [`Storage::build_node_index`] and
/// [`Storage::build_edge_index`] explicitly.
pub struct Storage {
    box_path: PathBuf,
    nodes_dir: PathBuf,
    edges_dir: PathBuf,
    last_node_chunk: u64,
    last_edge_chunk: u64,
    node_index: HashMap<String, RecordLocation>,
    edge_index: HashMap<String, Vec<RecordLocation>>,
    node_cache: LruCache<String, Node>,
    config: Config,
}

impl Storage {
    pub fn open(box_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(box_path, Config::default())
    }

    pub fn open_with_config(box_path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let box_path = box_path.as_ref().to_path_buf();
        let nodes_dir = box_path.join("nodes");
        let edges_dir = box_path.join("edges");
        for dir in [&nodes_dir, &edges_dir] {
            fs::create_dir_all(dir).map_err(|err| {
                GraphError::Filesystem(format!("cannot create {}: {err}", dir.display()))
            })?;
        }

        let last_node_chunk = chunk::scan_last_index(&nodes_dir, ChunkKind::Nodes)?;
        let last_edge_chunk = chunk::scan_last_index(&edges_dir, ChunkKind::Edges)?;
        debug!(
            path = %box_path.display(),
            last_node_chunk,
            last_edge_chunk,
            "storage.open"
        );

        let cache_capacity = NonZeroUsize::new(config.node_cache_capacity)
            .unwrap_or(NonZeroUsize::new(DEFAULT_NODE_CACHE_CAPACITY).expect("nonzero default"));

        Ok(Self {
            box_path,
            nodes_dir,
            edges_dir,
            last_node_chunk,
            last_edge_chunk,
            node_index: HashMap::new(),
            edge_index: HashMap::new(),
            node_cache: LruCache::new(cache_capacity),
            config,
        })
    }

    pub fn box_path(&self) -> &Path {
        &self.box_path
    }

    pub fn last_node_chunk(&self) -> u64 {
        self.last_node_chunk
    }

    pub fn last_edge_chunk(&self) -> u64 {
        self.last_edge_chunk
    }

    /// Current index entry for a node id, if the node index has one.
    pub fn node_location(&self, id: &str) -> Option<&RecordLocation> {
        self.node_index.get(id)
    }

    pub fn indexed_node_count(&self) -> usize {
        self.node_index.len()
    }

    pub fn indexed_source_count(&self) -> usize {
        self.edge_index.len()
    }

    // -----------------------------------------------------------------------
    // Save
    // -----------------------------------------------------------------------

    /// Persists a batch of nodes. Ids already present in the node index are
    /// deleted first so no id ever has two records on disk; the node index
    /// is rebuilt after that pass so the chunk decision sees a consistent
    /// view. Callers that want to read the batch back by id must rebuild the
    /// node index afterwards.
    pub fn save_nodes(&mut self, nodes: &[Node]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }

        let duplicates: Vec<String> = nodes
            .iter()
            .filter(|node| self.node_index.contains_key(&node.id))
            .map(|node| node.id.clone())
            .collect();
        if !duplicates.is_empty() {
            debug!(count = duplicates.len(), "storage.save_nodes.dedup");
            for id in &duplicates {
                self.delete_node(id)?;
            }
            self.build_node_index()?;
        }

        let records: Vec<Vec<u8>> = nodes.iter().map(encode_node).collect();
        let needed: u64 = nodes
            .iter()
            .map(|node| estimate_node_size(node) as u64)
            .sum();
        self.write_records(ChunkKind::Nodes, &records, needed)?;
        self.node_cache.clear();
        Ok(())
    }

    /// Persists a batch of edges with the same append/rotate protocol as
    /// nodes. Edges are never deduplicated; identical `(from, to)` pairs
    /// accumulate in insertion order.
    pub fn save_edges(&mut self, edges: &[Edge]) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }
        let records: Vec<Vec<u8>> = edges.iter().map(encode_edge).collect();
        let needed: u64 = edges
            .iter()
            .map(|edge| estimate_edge_size(edge) as u64)
            .sum();
        self.write_records(ChunkKind::Edges, &records, needed)
    }

    fn write_records(&mut self, kind: ChunkKind, records: &[Vec<u8>], needed: u64) -> Result<()> {
        let (target, append) = self.select_chunk(kind, needed)?;
        if append {
            debug!(chunk = %target.display(), count = records.len(), "storage.save.append");
            append_chunk(&target, records)?;
        } else {
            debug!(chunk = %target.display(), count = records.len(), "storage.save.new_chunk");
            write_new_chunk(&target, records)?;
        }
        Ok(())
    }

    /// The append/rotate decision. Only the chunk at `last + 1` is probed:
    /// append when the estimated batch still fits under the budget; when the
    /// candidate is full, advance `last` past it and start the next chunk
    /// (which may exceed the budget on its own); when the candidate is
    /// absent, create it without advancing, so later saves keep appending.
    fn select_chunk(&mut self, kind: ChunkKind, needed: u64) -> Result<(PathBuf, bool)> {
        let (dir, last) = match kind {
            ChunkKind::Nodes => (&self.nodes_dir, &mut self.last_node_chunk),
            ChunkKind::Edges => (&self.edges_dir, &mut self.last_edge_chunk),
        };
        let candidate = dir.join(kind.file_name(*last + 1));
        if candidate.exists() {
            let current = fs::metadata(&candidate)?.len();
            if current + needed <= self.config.max_chunk_size {
                return Ok((candidate, true));
            }
            *last += 1;
        }
        Ok((dir.join(kind.file_name(*last + 1)), false))
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Removes one node record by rewriting the chunk that holds it. A miss
    /// is a no-op. Offsets of every record behind the deleted one shift, so
    /// the caller must rebuild the node index before the next load.
    pub fn delete_node(&mut self, id: &str) -> Result<()> {
        let Some(location) = self.node_index.get(id) else {
            debug!(id, "storage.delete_node.miss");
            return Ok(());
        };
        let path = location.file.clone();

        let mut reader = BufReader::new(File::open(&path)?);
        let count = read_len(&mut reader)?;
        let mut kept = Vec::with_capacity(count.saturating_sub(1));
        for _ in 0..count {
            let node = decode_node(&mut reader)?;
            if node.id != id {
                kept.push(encode_node(&node));
            }
        }

        write_new_chunk(&path, &kept)?;
        debug!(id, chunk = %path.display(), remaining = kept.len(), "storage.delete_node");
        self.node_index.remove(id);
        self.node_cache.pop(id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Load
    // -----------------------------------------------------------------------

    pub fn load_node(&mut self, id: &str) -> Result<Node> {
        if let Some(node) = self.node_cache.get(id) {
            return Ok(node.clone());
        }
        let location = self
            .node_index
            .get(id)
            .ok_or(GraphError::NotFound("node"))?;
        let mut file = File::open(&location.file)?;
        file.seek(SeekFrom::Start(location.offset))?;
        let node = decode_node(&mut BufReader::new(file))?;
        self.node_cache.put(id.to_string(), node.clone());
        Ok(node)
    }

    /// Outgoing edges of `source`, in index order. An unknown source yields
    /// an empty list; entries that fail to open or decode are skipped.
    pub fn load_edges_from(&self, source: &str) -> Result<Vec<Edge>> {
        let Some(locations) = self.edge_index.get(source) else {
            return Ok(Vec::new());
        };
        let mut edges = Vec::with_capacity(locations.len());
        for location in locations {
            let mut file = match File::open(&location.file) {
                Ok(file) => file,
                Err(err) => {
                    debug!(chunk = %location.file.display(), error = %err, "storage.load_edges.skip");
                    continue;
                }
            };
            if let Err(err) = file.seek(SeekFrom::Start(location.offset)) {
                debug!(chunk = %location.file.display(), error = %err, "storage.load_edges.skip");
                continue;
            }
            match decode_edge(&mut BufReader::new(file)) {
                Ok(edge) => edges.push(edge),
                Err(err) => {
                    debug!(chunk = %location.file.display(), error = %err, "storage.load_edges.skip");
                }
            }
        }
        Ok(edges)
    }

    // -----------------------------------------------------------------------
    // Index builds
    // -----------------------------------------------------------------------

    /// Rebuilds the node index from disk. Chunks that fail to decode are
    /// skipped whole, with a warning; the rest of the box stays readable.
    pub fn build_node_index(&mut self) -> Result<()> {
        self.node_index.clear();
        self.node_cache.clear();
        for (_, path) in chunk::sorted_chunks(&self.nodes_dir, ChunkKind::Nodes)? {
            match index_node_chunk(&path) {
                Ok(entries) => {
                    for (id, location) in entries {
                        self.node_index.insert(id, location);
                    }
                }
                Err(err) => {
                    warn!(chunk = %path.display(), error = %err, "storage.index.skip_chunk");
                }
            }
        }
        debug!(nodes = self.node_index.len(), "storage.index.nodes_built");
        Ok(())
    }

    pub fn build_edge_index(&mut self) -> Result<()> {
        self.edge_index.clear();
        for (_, path) in chunk::sorted_chunks(&self.edges_dir, ChunkKind::Edges)? {
            match index_edge_chunk(&path) {
                Ok(entries) => {
                    for (from, location) in entries {
                        self.edge_index.entry(from).or_default().push(location);
                    }
                }
                Err(err) => {
                    warn!(chunk = %path.display(), error = %err, "storage.index.skip_chunk");
                }
            }
        }
        debug!(sources = self.edge_index.len(), "storage.index.edges_built");
        Ok(())
    }
}

fn index_node_chunk(path: &Path) -> Result<Vec<(String, RecordLocation)>> {
    let mut reader = BufReader::new(File::open(path)?);
    let count = read_len(&mut reader)?;
    let mut entries = Vec::with_capacity(count);
    let mut offset = CHUNK_HEADER_SIZE;
    for _ in 0..count {
        let node = decode_node(&mut reader)?;
        entries.push((
            node.id,
            RecordLocation {
                file: path.to_path_buf(),
                offset,
            },
        ));
        offset = reader.stream_position()?;
    }
    Ok(entries)
}

fn index_edge_chunk(path: &Path) -> Result<Vec<(String, RecordLocation)>> {
    let mut reader = BufReader::new(File::open(path)?);
    let count = read_len(&mut reader)?;
    let mut entries = Vec::with_capacity(count);
    let mut offset = CHUNK_HEADER_SIZE;
    for _ in 0..count {
        let edge = decode_edge(&mut reader)?;
        entries.push((
            edge.from,
            RecordLocation {
                file: path.to_path_buf(),
                offset,
            },
        ));
        offset = reader.stream_position()?;
    }
    Ok(entries)
}

fn write_new_chunk(path: &Path, records: &[Vec<u8>]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&(records.len() as u64).to_le_bytes())?;
    for record in records {
        writer.write_all(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn append_chunk(path: &Path, records: &[Vec<u8>]) -> Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let old_count = read_record_count(&mut file)?;
    file.seek(SeekFrom::End(0))?;
    for record in records {
        file.write_all(record)?;
    }
    // Header goes last so a crash mid-append leaves the old count in place.
    write_record_count(&mut file, old_count + records.len() as u64)
}
