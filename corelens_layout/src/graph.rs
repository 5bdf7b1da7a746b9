//! Reachability and dependency ordering over type description graphs.

use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

use crate::{ConvertError, NodeKind, TypeNodeSource};

/// The set of nodes reachable from a root, with strong dependency edges.
///
/// An edge `x -> y` means the layout of `x` cannot be computed until the
/// layout of `y` is known: an aggregate depends on its members, a
/// typedef/qualifier on its underlying type, an array on its element type.
/// A pointer's target is reachable but deliberately not a dependency, so
/// self-referential and mutually-recursive pointer-linked structures do not
/// form cycles.
#[derive(Debug, Clone)]
pub struct ReferenceGraph<N> {
    /// Every node discovered from the root.
    pub nodes: IndexSet<N>,
    /// Strong dependency edges, keyed by the dependent node.
    pub refs: IndexMap<N, IndexSet<N>>,
}

impl<N: Copy + Eq + Hash> ReferenceGraph<N> {
    /// An empty graph.
    pub fn new() -> Self {
        Self {
            nodes: IndexSet::new(),
            refs: IndexMap::new(),
        }
    }

    fn add_edge(&mut self, from: N, to: N) {
        self.refs.entry(from).or_default().insert(to);
    }
}

impl<N: Copy + Eq + Hash> Default for ReferenceGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Discover every node reachable from `root` and record strong edges.
///
/// Each node is visited at most once, keyed by node identity. Declared-only
/// nodes are resolved across compilation units when possible; a failed
/// resolution is not an error here, since it only matters if a conversion
/// path later needs the full definition.
pub fn build_reference_graph<S: TypeNodeSource>(
    source: &S,
    root: S::Node,
) -> Result<ReferenceGraph<S::Node>, ConvertError> {
    let mut graph = ReferenceGraph::new();
    let mut worklist = vec![root];

    while let Some(node) = worklist.pop() {
        if !graph.nodes.insert(node) {
            continue;
        }
        let kind = match source.kind(node) {
            Some(kind) => kind,
            None => {
                return Err(ConvertError::UnsupportedKind {
                    label: source.node_label(node),
                })
            }
        };
        match kind {
            NodeKind::Structure | NodeKind::Union => {
                for child in source.children(node) {
                    graph.add_edge(node, child);
                    worklist.push(child);
                }
            }
            NodeKind::Typedef | NodeKind::Const | NodeKind::Volatile | NodeKind::Member => {
                if let Some(target) = source.referenced_type(node) {
                    graph.add_edge(node, target);
                    worklist.push(target);
                }
            }
            _ if source.is_declaration(node) => {
                // Resolution failures are deferred; they surface during
                // conversion if the definition is actually needed.
                if let Some(name) = source.name(node) {
                    if let Some(definition) = source.find_definition(&name, kind) {
                        graph.add_edge(node, definition);
                        worklist.push(definition);
                    }
                }
            }
            NodeKind::Base | NodeKind::Enumeration | NodeKind::Subroutine => {}
            NodeKind::Pointer => {
                // Reachable for discovery, but no edge: this is what keeps
                // recursive pointer-linked structures orderable.
                if let Some(target) = source.referenced_type(node) {
                    worklist.push(target);
                }
            }
            NodeKind::Array => {
                let element = source.referenced_type(node).ok_or_else(|| {
                    ConvertError::MissingAttribute {
                        label: source.node_label(node),
                        attribute: "referenced type",
                    }
                })?;
                graph.add_edge(node, element);
                worklist.push(element);
            }
            NodeKind::Subrange => {
                return Err(ConvertError::UnsupportedKind {
                    label: source.node_label(node),
                })
            }
        }
    }

    Ok(graph)
}

/// Order the graph so every node follows everything it strongly depends on.
///
/// Iterative depth-first search; a node is appended once all of its
/// dependencies are finished, so the finishing order is the wanted total
/// order. An edge back to a node that is discovered but not finished is a
/// strong cycle, returned as the offending node. Pointer edges are absent
/// from the graph by construction, so recursive-by-pointer structures never
/// trip this.
pub fn topological_order<N: Copy + Eq + Hash>(graph: &ReferenceGraph<N>) -> Result<Vec<N>, N> {
    let mut discovered: IndexSet<N> = IndexSet::new();
    let mut finished: IndexSet<N> = IndexSet::new();
    let mut order: Vec<N> = Vec::new();

    for &root in &graph.nodes {
        if discovered.contains(&root) {
            continue;
        }
        discovered.insert(root);
        let mut stack: Vec<(N, usize)> = vec![(root, 0)];

        while let Some(&(node, index)) = stack.last() {
            let next = graph
                .refs
                .get(&node)
                .and_then(|deps| deps.get_index(index))
                .copied();
            match next {
                Some(dep) => {
                    stack.last_mut().unwrap().1 += 1;
                    if finished.contains(&dep) {
                        continue;
                    }
                    if discovered.contains(&dep) {
                        return Err(dep);
                    }
                    discovered.insert(dep);
                    stack.push((dep, 0));
                }
                None => {
                    stack.pop();
                    finished.insert(node);
                    order.push(node);
                }
            }
        }
    }

    Ok(order)
}

#[cfg(test)]
mod test {
    use super::*;

    fn graph_of(edges: &[(&'static str, &[&'static str])]) -> ReferenceGraph<&'static str> {
        let mut graph = ReferenceGraph::new();
        for &(from, deps) in edges {
            graph.nodes.insert(from);
            for &dep in deps {
                graph.nodes.insert(dep);
                graph.add_edge(from, dep);
            }
        }
        graph
    }

    #[test]
    fn test_unique_topological_order() {
        // Fig. 5.15 in Skiena's Algorithm Design Manual; this graph has
        // exactly one topological order.
        let graph = graph_of(&[
            ("a", &["b", "c"]),
            ("b", &["c", "d"]),
            ("c", &["e", "f"]),
            ("d", &[]),
            ("e", &["d"]),
            ("f", &["e"]),
            ("g", &["a", "f"]),
        ]);
        let order = topological_order(&graph).unwrap();
        assert_eq!(order, vec!["d", "e", "f", "c", "b", "a", "g"]);
    }

    #[test]
    fn test_dependencies_come_first() {
        let graph = graph_of(&[("outer", &["inner"]), ("inner", &["leaf"])]);
        let order = topological_order(&graph).unwrap();
        let pos = |n: &str| order.iter().position(|&x| x == n).unwrap();
        assert!(pos("leaf") < pos("inner"));
        assert!(pos("inner") < pos("outer"));
    }

    #[test]
    fn test_cycle_is_detected() {
        let graph = graph_of(&[("a", &["b"]), ("b", &["a"])]);
        assert!(topological_order(&graph).is_err());
    }

    #[test]
    fn test_isolated_nodes_are_ordered() {
        let mut graph: ReferenceGraph<&'static str> = ReferenceGraph::new();
        graph.nodes.insert("lone");
        let order = topological_order(&graph).unwrap();
        assert_eq!(order, vec!["lone"]);
    }
}
