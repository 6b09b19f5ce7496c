use std::collections::HashMap;

use crate::model::{Edge, Node};

/// In-memory adjacency-list view of a graph.
///
/// A convenience facade for hosts that want RAM-speed CRUD before bulk
/// persisting through [`crate::storage::Storage`]; it never touches disk.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    adjacency: HashMap<String, Vec<Edge>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node; returns false when the id is already present.
    pub fn add_node(&mut self, node: Node) -> bool {
        match self.nodes.entry(node.id.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(node);
                true
            }
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Removes a node along with its outgoing list and any edge targeting it.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let removed = self.nodes.remove(id).is_some();
        self.adjacency.remove(id);
        for edges in self.adjacency.values_mut() {
            edges.retain(|edge| edge.to != id);
        }
        removed
    }

    /// Inserts an edge; returns false unless both endpoints exist.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if !self.nodes.contains_key(&edge.from) || !self.nodes.contains_key(&edge.to) {
            return false;
        }
        self.adjacency
            .entry(edge.from.clone())
            .or_default()
            .push(edge);
        true
    }

    /// First edge from `from` to `to`, if any.
    pub fn edge(&self, from: &str, to: &str) -> Option<&Edge> {
        self.adjacency
            .get(from)?
            .iter()
            .find(|edge| edge.to == to)
    }

    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        let Some(edges) = self.adjacency.get_mut(from) else {
            return false;
        };
        let before = edges.len();
        edges.retain(|edge| edge.to != to);
        edges.len() != before
    }

    /// Outgoing edges of `id`, in insertion order.
    pub fn neighbors(&self, id: &str) -> &[Edge] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// A page of nodes by insertion-map iteration. Iteration order is
    /// unspecified, matching the underlying map.
    pub fn nodes_page(&self, start: usize, limit: usize) -> Vec<Node> {
        self.nodes.values().skip(start).take(limit).cloned().collect()
    }

    pub fn all_nodes(&self) -> Vec<Node> {
        self.nodes.values().cloned().collect()
    }

    pub fn all_edges(&self) -> Vec<Edge> {
        self.adjacency.values().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Graph {
        let mut graph = Graph::new();
        assert!(graph.add_node(Node::new("A")));
        assert!(graph.add_node(Node::new("B")));
        assert!(graph.add_node(Node::new("C")));
        assert!(graph.add_edge(Edge::new("A", "B", 1.0)));
        assert!(graph.add_edge(Edge::new("A", "C", 2.0)));
        assert!(graph.add_edge(Edge::new("B", "C", 3.0)));
        graph
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let mut graph = Graph::new();
        assert!(graph.add_node(Node::new("A")));
        assert!(!graph.add_node(Node::new("A")));
    }

    #[test]
    fn edges_require_both_endpoints() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("A"));
        assert!(!graph.add_edge(Edge::new("A", "missing", 1.0)));
        assert!(graph.neighbors("A").is_empty());
    }

    #[test]
    fn removing_a_node_drops_its_edges() {
        let mut graph = sample();
        assert!(graph.remove_node("C"));
        assert!(graph.node("C").is_none());
        let targets: Vec<&str> = graph
            .neighbors("A")
            .iter()
            .map(|edge| edge.to.as_str())
            .collect();
        assert_eq!(targets, vec!["B"]);
        assert!(graph.neighbors("B").is_empty());
    }

    #[test]
    fn edge_lookup_and_removal() {
        let mut graph = sample();
        assert_eq!(graph.edge("A", "C").expect("edge").weight, 2.0);
        assert!(graph.remove_edge("A", "C"));
        assert!(graph.edge("A", "C").is_none());
        assert!(!graph.remove_edge("A", "C"));
    }

    #[test]
    fn paging_covers_all_nodes() {
        let graph = sample();
        let mut seen: Vec<String> = graph
            .nodes_page(0, 2)
            .into_iter()
            .chain(graph.nodes_page(2, 2))
            .map(|node| node.id)
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["A", "B", "C"]);
        assert_eq!(graph.all_edges().len(), 3);
    }
}
