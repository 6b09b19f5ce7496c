//! C ABI for embedding a graph box into host applications.
//!
//! One opaque handle wraps one [`Storage`] engine. All strings cross the
//! boundary as NUL-terminated UTF-8; nodes and edges travel as JSON arrays.
//! Failures collapse to null returns (loads) or no-ops (saves/deletes), with
//! diagnostics emitted through `tracing` - there is no error-code channel.
//!
//! Strings returned by the load calls are owned by this library and must be
//! released with [`graphdb_free_string`]; they are not `free(3)`-compatible.

use std::ffi::{c_char, CStr, CString};

use tracing::error;

use crate::error::Result;
use crate::model::{Edge, Node};
use crate::storage::Storage;

/// Opaque box handle exposed over the C ABI.
pub struct GraphDbBox {
    storage: Storage,
}

/// Opens (or creates) a box directory and builds both indices.
///
/// Returns null when the name is null, not UTF-8, or the box cannot be
/// opened. The caller owns the handle and must release it with
/// [`graphdb_close`].
///
/// # Safety
/// `box_name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn graphdb_init(box_name: *const c_char) -> *mut GraphDbBox {
    let Some(name) = (unsafe { str_arg(box_name, "box_name") }) else {
        return std::ptr::null_mut();
    };
    let handle = Storage::open(name).and_then(|mut storage| {
        storage.build_node_index()?;
        storage.build_edge_index()?;
        Ok(GraphDbBox { storage })
    });
    match handle {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(err) => {
            error!(box_name = name, error = %err, "ffi.init");
            std::ptr::null_mut()
        }
    }
}

/// Persists a JSON array of nodes and rebuilds the node index.
///
/// # Safety
/// `handle` must be null or a pointer from [`graphdb_init`]; `json_data`
/// must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn graphdb_save_nodes(handle: *mut GraphDbBox, json_data: *const c_char) {
    let Some(handle) = (unsafe { handle.as_mut() }) else {
        return;
    };
    let Some(json) = (unsafe { str_arg(json_data, "json_data") }) else {
        return;
    };
    if let Err(err) = save_nodes(&mut handle.storage, json) {
        error!(error = %err, "ffi.save_nodes");
    }
}

/// Persists a JSON array of edges. The edge index is not rebuilt; call
/// [`graphdb_build_edge_index`] before reading the batch back.
///
/// # Safety
/// Same contract as [`graphdb_save_nodes`].
#[no_mangle]
pub unsafe extern "C" fn graphdb_save_edges(handle: *mut GraphDbBox, json_data: *const c_char) {
    let Some(handle) = (unsafe { handle.as_mut() }) else {
        return;
    };
    let Some(json) = (unsafe { str_arg(json_data, "json_data") }) else {
        return;
    };
    if let Err(err) = save_edges(&mut handle.storage, json) {
        error!(error = %err, "ffi.save_edges");
    }
}

/// Deletes one node by id (a miss is a no-op) and rebuilds the node index.
///
/// # Safety
/// Same contract as [`graphdb_save_nodes`].
#[no_mangle]
pub unsafe extern "C" fn graphdb_delete_node(handle: *mut GraphDbBox, node_id: *const c_char) {
    let Some(handle) = (unsafe { handle.as_mut() }) else {
        return;
    };
    let Some(id) = (unsafe { str_arg(node_id, "node_id") }) else {
        return;
    };
    let result = handle
        .storage
        .delete_node(id)
        .and_then(|()| handle.storage.build_node_index());
    if let Err(err) = result {
        error!(id, error = %err, "ffi.delete_node");
    }
}

/// Loads one node as a JSON object string, or null when the id is unknown
/// or the load fails. Release the string with [`graphdb_free_string`].
///
/// # Safety
/// Same contract as [`graphdb_save_nodes`].
#[no_mangle]
pub unsafe extern "C" fn graphdb_load_node(
    handle: *mut GraphDbBox,
    node_id: *const c_char,
) -> *mut c_char {
    let Some(handle) = (unsafe { handle.as_mut() }) else {
        return std::ptr::null_mut();
    };
    let Some(id) = (unsafe { str_arg(node_id, "node_id") }) else {
        return std::ptr::null_mut();
    };
    match handle.storage.load_node(id) {
        Ok(node) => json_string(&node),
        Err(err) => {
            error!(id, error = %err, "ffi.load_node");
            std::ptr::null_mut()
        }
    }
}

/// Loads the outgoing edges of a node as a JSON array string. An unknown
/// source yields `[]`; null signals a failure. Release the string with
/// [`graphdb_free_string`].
///
/// # Safety
/// Same contract as [`graphdb_save_nodes`].
#[no_mangle]
pub unsafe extern "C" fn graphdb_load_edges(
    handle: *mut GraphDbBox,
    node_id: *const c_char,
) -> *mut c_char {
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return std::ptr::null_mut();
    };
    let Some(id) = (unsafe { str_arg(node_id, "node_id") }) else {
        return std::ptr::null_mut();
    };
    match handle.storage.load_edges_from(id) {
        Ok(edges) => json_string(&edges),
        Err(err) => {
            error!(id, error = %err, "ffi.load_edges");
            std::ptr::null_mut()
        }
    }
}

/// Rebuilds the node index from the chunk files.
///
/// # Safety
/// `handle` must be null or a pointer from [`graphdb_init`].
#[no_mangle]
pub unsafe extern "C" fn graphdb_build_node_index(handle: *mut GraphDbBox) {
    if let Some(handle) = unsafe { handle.as_mut() } {
        if let Err(err) = handle.storage.build_node_index() {
            error!(error = %err, "ffi.build_node_index");
        }
    }
}

/// Rebuilds the edge index from the chunk files.
///
/// # Safety
/// `handle` must be null or a pointer from [`graphdb_init`].
#[no_mangle]
pub unsafe extern "C" fn graphdb_build_edge_index(handle: *mut GraphDbBox) {
    if let Some(handle) = unsafe { handle.as_mut() } {
        if let Err(err) = handle.storage.build_edge_index() {
            error!(error = %err, "ffi.build_edge_index");
        }
    }
}

/// Releases a string returned by [`graphdb_load_node`] or
/// [`graphdb_load_edges`]. Null is accepted.
///
/// # Safety
/// `ptr` must be null or a pointer returned by one of the load calls that
/// has not already been freed.
#[no_mangle]
pub unsafe extern "C" fn graphdb_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Destroys the handle. Null is accepted.
///
/// # Safety
/// `handle` must be null or a pointer from [`graphdb_init`] that has not
/// already been closed.
#[no_mangle]
pub unsafe extern "C" fn graphdb_close(handle: *mut GraphDbBox) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle) });
    }
}

fn save_nodes(storage: &mut Storage, json: &str) -> Result<()> {
    let nodes: Vec<Node> = serde_json::from_str(json)?;
    storage.save_nodes(&nodes)?;
    storage.build_node_index()
}

fn save_edges(storage: &mut Storage, json: &str) -> Result<()> {
    let edges: Vec<Edge> = serde_json::from_str(json)?;
    storage.save_edges(&edges)
}

fn json_string<T: serde::Serialize>(value: &T) -> *mut c_char {
    let encoded = match serde_json::to_string(value) {
        Ok(encoded) => encoded,
        Err(err) => {
            error!(error = %err, "ffi.encode_json");
            return std::ptr::null_mut();
        }
    };
    match CString::new(encoded) {
        Ok(cstring) => cstring.into_raw(),
        Err(err) => {
            error!(error = %err, "ffi.encode_json");
            std::ptr::null_mut()
        }
    }
}

unsafe fn str_arg<'a>(ptr: *const c_char, name: &str) -> Option<&'a str> {
    if ptr.is_null() {
        error!(argument = name, "ffi.null_argument");
        return None;
    }
    match unsafe { CStr::from_ptr(ptr) }.to_str() {
        Ok(value) => Some(value),
        Err(_) => {
            error!(argument = name, "ffi.invalid_utf8");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::ptr;
    use tempfile::TempDir;

    unsafe fn init_box(dir: &TempDir) -> *mut GraphDbBox {
        let path = CString::new(dir.path().join("box").to_str().expect("utf8 path"))
            .expect("cstring");
        let handle = unsafe { graphdb_init(path.as_ptr()) };
        assert!(!handle.is_null());
        handle
    }

    unsafe fn take_json(ptr: *mut c_char) -> Value {
        assert!(!ptr.is_null());
        let parsed = unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .map(|raw| serde_json::from_str(raw).expect("valid JSON"))
            .expect("utf8 result");
        unsafe { graphdb_free_string(ptr) };
        parsed
    }

    #[test]
    fn node_round_trip_through_the_abi() {
        let dir = TempDir::new().expect("tempdir");
        unsafe {
            let handle = init_box(&dir);
            let nodes = CString::new(r#"[{"id":"A","properties":{"k":42}}]"#).expect("cstring");
            graphdb_save_nodes(handle, nodes.as_ptr());

            let id = CString::new("A").expect("cstring");
            let loaded = take_json(graphdb_load_node(handle, id.as_ptr()));
            assert_eq!(loaded["id"], "A");
            assert_eq!(loaded["properties"]["k"], 42);

            graphdb_close(handle);
        }
    }

    #[test]
    fn missing_node_loads_null() {
        let dir = TempDir::new().expect("tempdir");
        unsafe {
            let handle = init_box(&dir);
            let id = CString::new("missing").expect("cstring");
            assert!(graphdb_load_node(handle, id.as_ptr()).is_null());
            graphdb_close(handle);
        }
    }

    #[test]
    fn edge_fan_out_through_the_abi() {
        let dir = TempDir::new().expect("tempdir");
        unsafe {
            let handle = init_box(&dir);
            let edges = CString::new(
                r#"[{"from":"A","to":"B","weight":1.0,"properties":{}},
                    {"from":"A","to":"C","weight":2.0,"properties":{}},
                    {"from":"B","to":"C","weight":3.0,"properties":{}}]"#,
            )
            .expect("cstring");
            graphdb_save_edges(handle, edges.as_ptr());
            graphdb_build_edge_index(handle);

            let id = CString::new("A").expect("cstring");
            let from_a = take_json(graphdb_load_edges(handle, id.as_ptr()));
            let targets: Vec<&str> = from_a
                .as_array()
                .expect("array")
                .iter()
                .map(|edge| edge["to"].as_str().expect("to"))
                .collect();
            assert_eq!(targets, vec!["B", "C"]);

            let unknown = CString::new("Z").expect("cstring");
            let from_z = take_json(graphdb_load_edges(handle, unknown.as_ptr()));
            assert_eq!(from_z, Value::Array(Vec::new()));

            graphdb_close(handle);
        }
    }

    #[test]
    fn delete_removes_the_node() {
        let dir = TempDir::new().expect("tempdir");
        unsafe {
            let handle = init_box(&dir);
            let nodes = CString::new(r#"[{"id":"A","properties":{}}]"#).expect("cstring");
            graphdb_save_nodes(handle, nodes.as_ptr());

            let id = CString::new("A").expect("cstring");
            graphdb_delete_node(handle, id.as_ptr());
            assert!(graphdb_load_node(handle, id.as_ptr()).is_null());

            graphdb_close(handle);
        }
    }

    #[test]
    fn malformed_json_mutates_nothing() {
        let dir = TempDir::new().expect("tempdir");
        unsafe {
            let handle = init_box(&dir);
            let garbage = CString::new("not json at all").expect("cstring");
            graphdb_save_nodes(handle, garbage.as_ptr());

            let id = CString::new("A").expect("cstring");
            assert!(graphdb_load_node(handle, id.as_ptr()).is_null());
            graphdb_close(handle);
        }
    }

    #[test]
    fn null_arguments_are_tolerated() {
        unsafe {
            assert!(graphdb_init(ptr::null()).is_null());
            graphdb_save_nodes(ptr::null_mut(), ptr::null());
            graphdb_build_node_index(ptr::null_mut());
            assert!(graphdb_load_node(ptr::null_mut(), ptr::null()).is_null());
            graphdb_free_string(ptr::null_mut());
            graphdb_close(ptr::null_mut());
        }
    }

    #[test]
    fn saves_persist_across_handles() {
        let dir = TempDir::new().expect("tempdir");
        unsafe {
            let handle = init_box(&dir);
            let nodes =
                CString::new(r#"[{"id":"A","properties":{"k":1}}]"#).expect("cstring");
            graphdb_save_nodes(handle, nodes.as_ptr());
            graphdb_close(handle);

            let reopened = init_box(&dir);
            let id = CString::new("A").expect("cstring");
            let loaded = take_json(graphdb_load_node(reopened, id.as_ptr()));
            assert_eq!(loaded["properties"]["k"], 1);
            graphdb_close(reopened);
        }
    }
}
