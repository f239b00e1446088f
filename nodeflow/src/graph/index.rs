//! Explicit adjacency index over a node/edge graph.
//!
//! Nodes are addressed by their position in the node slice; edges by their
//! declaration position. Nothing holds pointers between nodes.

use super::{Edge, Node};
use crate::errors::CompileError;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Rank given to nodes that no edge touches.
const UNCONNECTED_RANK: usize = usize::MAX;

/// Adjacency index built once per compilation.
#[derive(Debug)]
pub struct GraphIndex<'a> {
    nodes: &'a [Node],
    edges: &'a [Edge],
    positions: HashMap<&'a str, usize>,
    incoming: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    rank: Vec<usize>,
}

impl<'a> GraphIndex<'a> {
    /// Builds the index, rejecting duplicate ids, dangling edges and
    /// self-loops.
    ///
    /// # Errors
    ///
    /// Returns the first structural defect found.
    pub fn build(nodes: &'a [Node], edges: &'a [Edge]) -> Result<Self, CompileError> {
        let mut positions = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if positions.insert(node.id.as_str(), position).is_some() {
                return Err(CompileError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
            }
        }

        let mut incoming = vec![Vec::new(); nodes.len()];
        let mut dependents = vec![Vec::new(); nodes.len()];
        let mut rank = vec![UNCONNECTED_RANK; nodes.len()];

        for (edge_index, edge) in edges.iter().enumerate() {
            let source = lookup(&positions, &edge.source, edge_index)?;
            let target = lookup(&positions, &edge.target, edge_index)?;
            if source == target {
                return Err(CompileError::CycleDetected {
                    nodes: vec![edge.source.clone()],
                });
            }
            incoming[target].push(edge_index);
            dependents[source].push(target);
            rank[source] = rank[source].min(edge_index);
            rank[target] = rank[target].min(edge_index);
        }

        Ok(Self {
            nodes,
            edges,
            positions,
            incoming,
            dependents,
            rank,
        })
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node at `position`.
    #[must_use]
    pub fn node(&self, position: usize) -> &'a Node {
        &self.nodes[position]
    }

    /// Looks a node up by id.
    #[must_use]
    pub fn node_by_id(&self, id: &str) -> Option<&'a Node> {
        self.positions.get(id).map(|&p| &self.nodes[p])
    }

    /// Returns the edges entering `position` with their declaration
    /// index, in declaration order.
    pub fn incoming(&self, position: usize) -> impl Iterator<Item = (usize, &'a Edge)> + '_ {
        self.incoming[position].iter().map(|&e| (e, &self.edges[e]))
    }

    /// Orders nodes so every node follows all of its dependencies.
    ///
    /// Kahn's algorithm. Among ready nodes the one touched by the earliest
    /// declared edge goes first, then the smallest id, so the order depends
    /// only on the edges and ids and never on the node slice order. This
    /// gives up keeping unrelated nodes close to their input order: a node
    /// listed first can still run late when its edges are declared late.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` listing the nodes that could not be ordered.
    pub fn topological_order(&self) -> Result<Vec<usize>, CompileError> {
        let mut in_degree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<(usize, &str, usize)>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(position, _)| self.ready_entry(position))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, _, position))) = ready.pop() {
            order.push(position);
            for &dependent in &self.dependents[position] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(self.ready_entry(dependent));
                }
            }
        }

        if order.len() < self.nodes.len() {
            let nodes = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &degree)| degree > 0)
                .map(|(position, _)| self.nodes[position].id.clone())
                .collect();
            return Err(CompileError::CycleDetected { nodes });
        }

        Ok(order)
    }

    fn ready_entry(&self, position: usize) -> Reverse<(usize, &'a str, usize)> {
        Reverse((self.rank[position], self.nodes[position].id.as_str(), position))
    }
}

fn lookup(
    positions: &HashMap<&str, usize>,
    id: &str,
    edge_index: usize,
) -> Result<usize, CompileError> {
    positions
        .get(id)
        .copied()
        .ok_or_else(|| CompileError::UnknownNodeReference {
            node_id: id.to_string(),
            edge_index,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn ids(index: &GraphIndex<'_>, order: &[usize]) -> Vec<String> {
        order.iter().map(|&p| index.node(p).id.clone()).collect()
    }

    fn chain_nodes() -> Vec<Node> {
        vec![
            Node::new("save", NodeKind::Save),
            Node::new("blur", NodeKind::Transform),
            Node::new("gen", NodeKind::Generator),
        ]
    }

    fn chain_edges() -> Vec<Edge> {
        vec![Edge::new("gen", "blur"), Edge::new("blur", "save")]
    }

    #[test]
    fn test_topological_order_follows_edges() {
        let nodes = chain_nodes();
        let edges = chain_edges();
        let index = GraphIndex::build(&nodes, &edges).unwrap();
        let order = index.topological_order().unwrap();

        assert_eq!(ids(&index, &order), vec!["gen", "blur", "save"]);
    }

    #[test]
    fn test_order_ignores_node_slice_order() {
        let edges = vec![
            Edge::new("a", "join"),
            Edge::new("b", "join"),
            Edge::new("c", "join"),
        ];
        let forward = vec![
            Node::new("a", NodeKind::Generator),
            Node::new("b", NodeKind::Generator),
            Node::new("c", NodeKind::Generator),
            Node::new("join", NodeKind::Collect),
        ];
        let mut shuffled = forward.clone();
        shuffled.reverse();

        let first = GraphIndex::build(&forward, &edges).unwrap();
        let second = GraphIndex::build(&shuffled, &edges).unwrap();
        let a = ids(&first, &first.topological_order().unwrap());
        let b = ids(&second, &second.topological_order().unwrap());

        assert_eq!(a, vec!["a", "b", "c", "join"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cycle_detected() {
        let nodes = vec![
            Node::new("a", NodeKind::Transform),
            Node::new("b", NodeKind::Transform),
            Node::new("root", NodeKind::Input),
        ];
        let edges = vec![
            Edge::new("root", "a"),
            Edge::new("a", "b"),
            Edge::new("b", "a"),
        ];
        let index = GraphIndex::build(&nodes, &edges).unwrap();
        let err = index.topological_order().unwrap_err();

        assert_eq!(
            err,
            CompileError::CycleDetected {
                nodes: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let nodes = vec![Node::new("a", NodeKind::Transform)];
        let edges = vec![Edge::new("a", "a")];
        let err = GraphIndex::build(&nodes, &edges).unwrap_err();
        assert_eq!(err.code(), "CYCLE_DETECTED");
    }

    #[test]
    fn test_duplicate_and_unknown_ids() {
        let nodes = vec![
            Node::new("a", NodeKind::Generator),
            Node::new("a", NodeKind::Generator),
        ];
        let err = GraphIndex::build(&nodes, &[]).unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_NODE_ID");

        let nodes = vec![Node::new("a", NodeKind::Generator)];
        let edges = vec![Edge::new("a", "ghost")];
        let err = GraphIndex::build(&nodes, &edges).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownNodeReference {
                node_id: "ghost".to_string(),
                edge_index: 0
            }
        );
    }

    #[test]
    fn test_incoming_in_declaration_order() {
        let nodes = vec![
            Node::new("x", NodeKind::Generator),
            Node::new("y", NodeKind::Generator),
            Node::new("join", NodeKind::Collect),
        ];
        let edges = vec![Edge::new("y", "join"), Edge::new("x", "join")];
        let index = GraphIndex::build(&nodes, &edges).unwrap();
        let sources: Vec<&str> = index.incoming(2).map(|(_, e)| e.source.as_str()).collect();

        assert_eq!(sources, vec!["y", "x"]);
        assert!(index.node_by_id("join").is_some());
        assert_eq!(index.len(), 3);
    }
}
