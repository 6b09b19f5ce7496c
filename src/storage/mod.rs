//! Chunked binary persistence for nodes and edges.
//!
//! A box directory holds `nodes/nodes_<i>.bin` and `edges/edges_<j>.bin`
//! chunk files, each a record-count header followed by concatenated records.
//! Point lookups go through in-memory offset indices rebuilt on demand.

mod chunk;
mod engine;
mod ser;


pub use chunk::{parse_chunk_index, ChunkKind, CHUNK_HEADER_SIZE};
pub use engine::{Config, RecordLocation, Storage, MAX_CHUNK_SIZE};
pub use ser::{
    decode_edge, decode_node, decode_property_value, encode_edge, encode_node,
    encode_property_value, estimate_edge_size, estimate_node_size, estimate_value_size,
};
