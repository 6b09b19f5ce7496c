use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A single property value. Maps are owned by value, so arbitrarily nested
/// structures are representable but cycles are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Map(PropertyMap),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: PropertyMap::new(),
        }
    }
}

/// A directed weighted edge, identified by `(from, to)` within the outgoing
/// adjacency of `from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub weight: f64,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, weight: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            weight,
            properties: PropertyMap::new(),
        }
    }
}
