//! renderer independent directed graph
use crate::model::{EdgeKind, EdgeStatus};
use crate::node_id::{NodeId, NodeKind};
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct Graph {
    /// Layout hints, not interpreted
    pub attrs: IndexMap<String, String>,
    pub nodes: IndexMap<NodeId, Node>,
    pub edges: Vec<Edge>,
    /// Role name → member nodes
    pub clusters: IndexMap<String, Vec<NodeId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub status: NodeStatus,
    /// Role the node is grouped under
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Normal,
    /// Referenced but not part of the project
    Unresolved,
    Undefined,
    Ambiguous,
    Unused,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub status: EdgeStatus,
    pub multiplicity: usize,
    /// A definition that no usage binds to because a higher tier wins
    pub overridden: bool,
}

impl Edge {
    /// `<source> -> <target>`, what `--exclude-edges` is matched against
    pub fn description(&self) -> String {
        format!("{} -> {}", self.source, self.target)
    }
}

impl Graph {
    pub fn add_node(&mut self, node: Node) {
        self.nodes.entry(node.id.clone()).or_insert(node);
    }

    /// Adds an edge if both endpoints exist
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        let connected =
            self.nodes.contains_key(&edge.source) && self.nodes.contains_key(&edge.target);
        if connected {
            self.edges.push(edge);
        }
        connected
    }

    /// Keep matching nodes; edges touching a removed node are removed as well
    pub fn retain_nodes(&mut self, mut keep: impl FnMut(&Node) -> bool) {
        self.nodes.retain(|_, node| keep(node));

        let nodes = &self.nodes;
        self.edges
            .retain(|edge| nodes.contains_key(&edge.source) && nodes.contains_key(&edge.target));
        for members in self.clusters.values_mut() {
            members.retain(|id| nodes.contains_key(id));
        }
        self.clusters.retain(|_, members| !members.is_empty());
    }

    pub fn retain_edges(&mut self, keep: impl FnMut(&Edge) -> bool) {
        self.edges.retain(keep);
    }

    /// Group nodes by their `cluster`
    pub fn build_clusters(&mut self) {
        self.clusters.clear();
        for node in self.nodes.values() {
            if let Some(cluster) = &node.cluster {
                self.clusters
                    .entry(cluster.clone())
                    .or_default()
                    .push(node.id.clone());
            }
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.values().find(|node| node.id.to_string() == id)
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|edge| edge.source.to_string() == source && edge.target.to_string() == target)
    }
}
