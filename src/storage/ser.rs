use std::io::{self, Read};

use crate::error::{GraphError, Result};
use crate::model::{Edge, Node, PropertyMap, PropertyValue};

const TAG_INT: u8 = 0;
const TAG_FLOAT: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_MAP: u8 = 4;

/// Width of every length/count prefix in the on-disk format.
pub const LEN_SIZE: usize = std::mem::size_of::<u64>();

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

pub fn encode_property_value(buf: &mut Vec<u8>, value: &PropertyValue) {
    match value {
        PropertyValue::Int(v) => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        PropertyValue::Float(v) => {
            buf.push(TAG_FLOAT);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        PropertyValue::Bool(v) => {
            buf.push(TAG_BOOL);
            buf.push(u8::from(*v));
        }
        PropertyValue::String(s) => {
            buf.push(TAG_STRING);
            write_str(buf, s);
        }
        PropertyValue::Map(map) => {
            buf.push(TAG_MAP);
            write_len(buf, map.len());
            for (key, value) in map {
                write_str(buf, key);
                encode_property_value(buf, value);
            }
        }
    }
}

/// Encodes a node record: id, then the property entries. The record carries
/// no terminator; decoders consume exactly the encoded length.
pub fn encode_node(node: &Node) -> Vec<u8> {
    let mut buf = Vec::with_capacity(estimate_node_size(node));
    write_str(&mut buf, &node.id);
    write_props(&mut buf, &node.properties);
    buf
}

pub fn encode_edge(edge: &Edge) -> Vec<u8> {
    let mut buf = Vec::with_capacity(estimate_edge_size(edge));
    write_str(&mut buf, &edge.from);
    write_str(&mut buf, &edge.to);
    buf.extend_from_slice(&edge.weight.to_le_bytes());
    write_props(&mut buf, &edge.properties);
    buf
}

fn write_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u64).to_le_bytes());
}

fn write_str(buf: &mut Vec<u8>, value: &str) {
    write_len(buf, value.len());
    buf.extend_from_slice(value.as_bytes());
}

fn write_props(buf: &mut Vec<u8>, props: &PropertyMap) {
    write_len(buf, props.len());
    for (key, value) in props {
        write_str(buf, key);
        encode_property_value(buf, value);
    }
}

// ---------------------------------------------------------------------------
// Size estimation
// ---------------------------------------------------------------------------

/// Upper bound on the serialized size of a value. For this codec the bound
/// is exact, which the append decision in the engine relies on being safe.
pub fn estimate_value_size(value: &PropertyValue) -> usize {
    match value {
        PropertyValue::Int(_) | PropertyValue::Float(_) => 1 + 8,
        PropertyValue::Bool(_) => 1 + 1,
        PropertyValue::String(s) => 1 + LEN_SIZE + s.len(),
        PropertyValue::Map(map) => {
            let mut total = 1 + LEN_SIZE;
            for (key, value) in map {
                total += LEN_SIZE + key.len() + estimate_value_size(value);
            }
            total
        }
    }
}

pub fn estimate_node_size(node: &Node) -> usize {
    LEN_SIZE + node.id.len() + props_size(&node.properties)
}

pub fn estimate_edge_size(edge: &Edge) -> usize {
    LEN_SIZE + edge.from.len() + LEN_SIZE + edge.to.len() + 8 + props_size(&edge.properties)
}

fn props_size(props: &PropertyMap) -> usize {
    let mut total = LEN_SIZE;
    for (key, value) in props {
        total += LEN_SIZE + key.len() + estimate_value_size(value);
    }
    total
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

pub fn decode_property_value<R: Read>(reader: &mut R) -> Result<PropertyValue> {
    let tag = read_array::<1, R>(reader)?[0];
    match tag {
        TAG_INT => Ok(PropertyValue::Int(i64::from_le_bytes(read_array(reader)?))),
        TAG_FLOAT => Ok(PropertyValue::Float(f64::from_le_bytes(read_array(
            reader,
        )?))),
        TAG_BOOL => {
            let byte = read_array::<1, R>(reader)?[0];
            Ok(PropertyValue::Bool(byte != 0))
        }
        TAG_STRING => Ok(PropertyValue::String(read_string(reader)?)),
        TAG_MAP => {
            let count = read_len(reader)?;
            let mut map = PropertyMap::new();
            for _ in 0..count {
                let key = read_string(reader)?;
                let value = decode_property_value(reader)?;
                // Last writer wins on duplicate keys.
                map.insert(key, value);
            }
            Ok(PropertyValue::Map(map))
        }
        other => Err(GraphError::Decode(format!(
            "unknown property value tag: {other}"
        ))),
    }
}

pub fn decode_node<R: Read>(reader: &mut R) -> Result<Node> {
    let id = read_string(reader)?;
    let properties = read_props(reader)?;
    Ok(Node { id, properties })
}

pub fn decode_edge<R: Read>(reader: &mut R) -> Result<Edge> {
    let from = read_string(reader)?;
    let to = read_string(reader)?;
    let weight = f64::from_le_bytes(read_array(reader)?);
    let properties = read_props(reader)?;
    Ok(Edge {
        from,
        to,
        weight,
        properties,
    })
}

fn read_props<R: Read>(reader: &mut R) -> Result<PropertyMap> {
    let count = read_len(reader)?;
    let mut props = PropertyMap::new();
    for _ in 0..count {
        let key = read_string(reader)?;
        let value = decode_property_value(reader)?;
        props.insert(key, value);
    }
    Ok(props)
}

fn read_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(map_short_read)?;
    Ok(buf)
}

pub(crate) fn read_len<R: Read>(reader: &mut R) -> Result<usize> {
    let raw = u64::from_le_bytes(read_array(reader)?);
    usize::try_from(raw).map_err(|_| GraphError::Decode(format!("length prefix {raw} overflows")))
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_len(reader)?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(map_short_read)?;
    String::from_utf8(buf).map_err(|_| GraphError::Decode("invalid UTF-8 string".into()))
}

fn map_short_read(err: io::Error) -> GraphError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        GraphError::Decode("unexpected end of record".into())
    } else {
        GraphError::Io(err)
    }
}
