pub mod error;
pub mod ffi;
pub mod graph;
pub mod model;
pub mod storage;

pub use crate::error::{GraphError, Result};
pub use crate::graph::Graph;
pub use crate::model::{Edge, Node, PropertyMap, PropertyValue};
pub use crate::storage::{Config, RecordLocation, Storage, MAX_CHUNK_SIZE};
