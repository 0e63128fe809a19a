//! role inclusion graph
//!
//! A role includes another role via `meta` dependencies or from one of its tasks
//! (`include_role`/`import_role`). Several inclusions between the same two roles share one graph
//! edge; the edge weight keeps the project edges it stands for.
use crate::model::{EdgeKind, EdgeSet, EdgeStatus};
use crate::node_id::{NodeId, NodeKind};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef, IntoNeighbors, Reversed, Visitable};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct RoleGraph {
    graph: DiGraph<String, Vec<(NodeId, NodeId)>>,
    node_map: HashMap<String, NodeIndex>,
}

/// Depth first search state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// not visited yet
    White,
    /// on the current chain
    Gray,
    /// fully expanded
    Black,
}

impl RoleGraph {
    /// Build from resolved role inclusions
    pub fn new<'r>(roles: impl IntoIterator<Item = &'r str>, edges: &EdgeSet) -> Self {
        let mut role_graph = Self::default();
        for role in roles {
            role_graph.ensure_node(role);
        }

        for edge in edges.iter() {
            let role_include = edge.kind == EdgeKind::Includes
                && edge.target.kind == NodeKind::Role
                && edge.status != EdgeStatus::Unresolved;
            if !role_include {
                continue;
            }

            let including = match edge.source.kind {
                NodeKind::Role => Some(edge.source.name.as_str()),
                NodeKind::Task => edge.source.name.split_once('/').map(|(role, _)| role),
                _ => None,
            };
            let Some(including) = including else {
                continue;
            };

            let from = role_graph.ensure_node(including);
            let to = role_graph.ensure_node(&edge.target.name);
            let inclusion = (edge.source.clone(), edge.target.clone());
            match role_graph.graph.find_edge(from, to) {
                Some(index) => role_graph.graph[index].push(inclusion),
                None => {
                    role_graph.graph.add_edge(from, to, vec![inclusion]);
                }
            }
        }

        role_graph
    }

    fn ensure_node(&mut self, role: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(role) {
            return index;
        }
        let index = self.graph.add_node(role.to_string());
        self.node_map.insert(role.to_string(), index);
        index
    }

    /// Inclusions closing a cycle
    ///
    /// Roles are walked depth first in `seeds` order; an inclusion re-entering the current chain
    /// is a back edge. Unknown seeds are ignored.
    pub fn back_edges<'s>(
        &self,
        seeds: impl IntoIterator<Item = &'s str>,
    ) -> Vec<(NodeId, NodeId)> {
        let mut colors: HashMap<NodeIndex, Color> = HashMap::new();
        let mut back_edges: Vec<EdgeIndex> = vec![];

        for seed in seeds {
            let Some(&start) = self.node_map.get(seed) else {
                continue;
            };
            if colors.get(&start).copied().unwrap_or(Color::White) == Color::White {
                self.visit(start, &mut colors, &mut back_edges);
            }
        }

        back_edges
            .into_iter()
            .flat_map(|index| self.graph[index].iter().cloned())
            .collect()
    }

    fn visit(
        &self,
        start: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        back_edges: &mut Vec<EdgeIndex>,
    ) {
        colors.insert(start, Color::Gray);
        let mut stack = vec![(start, self.outgoing(start))];

        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            match pending.pop() {
                Some((edge, target)) => {
                    match colors.get(&target).copied().unwrap_or(Color::White) {
                        Color::Gray => back_edges.push(edge),
                        Color::White => {
                            colors.insert(target, Color::Gray);
                            stack.push((target, self.outgoing(target)));
                        }
                        Color::Black => {}
                    }
                }
                None => {
                    colors.insert(node, Color::Black);
                    stack.pop();
                }
            }
        }
    }

    /// Outgoing edges, the first added last so `pop` visits in insertion order
    fn outgoing(&self, node: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
        self.graph
            .edges(node)
            .map(|edge| (edge.id(), edge.target()))
            .collect()
    }

    /// Roles included by `role`, transitively
    ///
    /// `role` itself is part of the result only if it is on a cycle.
    pub fn descendants(&self, role: &str) -> BTreeSet<String> {
        match self.node_map.get(role) {
            Some(&start) => self.names(reachable(&self.graph, start)),
            None => BTreeSet::new(),
        }
    }

    /// Roles including `role`, transitively
    pub fn ancestors(&self, role: &str) -> BTreeSet<String> {
        match self.node_map.get(role) {
            Some(&start) => self.names(reachable(Reversed(&self.graph), start)),
            None => BTreeSet::new(),
        }
    }

    fn names(&self, indices: Vec<NodeIndex>) -> BTreeSet<String> {
        indices
            .into_iter()
            .map(|index| self.graph[index].clone())
            .collect()
    }
}

/// Nodes reachable over at least one edge
fn reachable<G>(graph: G, start: NodeIndex) -> Vec<NodeIndex>
where
    G: IntoNeighbors<NodeId = NodeIndex> + Visitable<NodeId = NodeIndex>,
{
    let mut dfs = Dfs::empty(graph);
    dfs.stack.extend(graph.neighbors(start));

    let mut reached = vec![];
    while let Some(node) = dfs.next(graph) {
        reached.push(node);
    }
    reached
}
