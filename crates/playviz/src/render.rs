//! Graphviz output
//!
//! [dot] writes the digraph itself. [html] embeds it in a standalone page which lays it out in
//! the browser.
use crate::graph::{Edge, Graph, Node, NodeStatus};
use crate::model::{EdgeKind, EdgeStatus};
use crate::node_id::NodeKind;
use std::fmt::{Display, Formatter};

const PAGE_TEMPLATE: &str = include_str!("templates/diagram.html");

/// Render as a Graphviz digraph
pub fn dot(graph: &Graph) -> String {
    Dot(graph).to_string()
}

/// Heading of an html page
#[derive(Debug, derive_new::new)]
pub struct Page<'a> {
    pub title: &'a str,
    /// Generation time as displayed
    pub generated: &'a str,
}

/// Render as an html page showing the digraph
pub fn html(graph: &Graph, page: &Page) -> Result<String, RenderError> {
    let mut context = tera::Context::new();
    context.insert("title", page.title);
    context.insert("generated", page.generated);
    context.insert("dot", &dot(graph));

    Ok(tera::Tera::one_off(PAGE_TEMPLATE, &context, true)?)
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Unable to render html page")]
    Template(#[from] tera::Error),
}

struct Dot<'g>(&'g Graph);

impl Display for Dot<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let graph = self.0;

        writeln!(f, "digraph playviz {{")?;
        for (key, value) in &graph.attrs {
            writeln!(f, "  {key}={};", quoted(value))?;
        }
        writeln!(
            f,
            "  node [style=filled, fontname=\"Helvetica\", fontsize=10];"
        )?;
        writeln!(f, "  edge [fontname=\"Helvetica\", fontsize=8];")?;

        for (name, members) in &graph.clusters {
            writeln!(f)?;
            writeln!(f, "  subgraph {} {{", quoted(&format!("cluster_{name}")))?;
            writeln!(f, "    label={};", quoted(name))?;
            writeln!(f, "    style=rounded;")?;
            for id in members {
                if let Some(node) = graph.nodes.get(id) {
                    write_node(f, "    ", node)?;
                }
            }
            writeln!(f, "  }}")?;
        }

        writeln!(f)?;
        for node in graph.nodes.values().filter(|node| node.cluster.is_none()) {
            write_node(f, "  ", node)?;
        }

        writeln!(f)?;
        for edge in &graph.edges {
            write_edge(f, edge)?;
        }

        writeln!(f, "}}")
    }
}

fn write_node(f: &mut Formatter<'_>, indent: &str, node: &Node) -> std::fmt::Result {
    let (shape, color) = match node.kind {
        NodeKind::Playbook => ("folder", "#e0e0e0"),
        NodeKind::Role => ("house", "#a6cee3"),
        NodeKind::Task => ("octagon", "#b2df8a"),
        NodeKind::VarFile => ("note", "#fdbf6f"),
        NodeKind::VarDefaults => ("note", "#ffff99"),
        NodeKind::Template => ("component", "#cab2d6"),
        NodeKind::Var => ("ellipse", "#ffffff"),
    };

    let mut attrs = vec![
        format!("label={}", quoted(&node.label)),
        format!("shape={shape}"),
    ];
    match node.status {
        NodeStatus::Normal => attrs.push(format!("fillcolor={}", quoted(color))),
        NodeStatus::Unresolved | NodeStatus::Undefined => {
            attrs.push("style=\"filled,dashed\"".to_string());
            attrs.push("color=red".to_string());
            attrs.push("fillcolor=\"#fbb4ae\"".to_string());
        }
        NodeStatus::Ambiguous => {
            attrs.push("color=orange".to_string());
            attrs.push("fillcolor=\"#fed9a6\"".to_string());
        }
        NodeStatus::Unused => {
            attrs.push("fontcolor=gray".to_string());
            attrs.push("fillcolor=\"#f0f0f0\"".to_string());
        }
    }

    writeln!(
        f,
        "{indent}{} [{}];",
        quoted(&node.id.to_string()),
        attrs.join(", ")
    )
}

fn write_edge(f: &mut Formatter<'_>, edge: &Edge) -> std::fmt::Result {
    let mut attrs = vec![];
    match edge.kind {
        EdgeKind::Includes | EdgeKind::Contains => {}
        EdgeKind::Renders => attrs.push("color=\"#6a3d9a\"".to_string()),
        EdgeKind::Uses => attrs.push("color=gray".to_string()),
        EdgeKind::Defines => attrs.push("color=\"#33a02c\"".to_string()),
    }
    match edge.status {
        EdgeStatus::Resolved => {}
        EdgeStatus::Unresolved => {
            attrs.push("style=dashed".to_string());
            attrs.push("color=red".to_string());
        }
        EdgeStatus::BackEdge => {
            attrs.push("style=dotted".to_string());
            attrs.push("constraint=false".to_string());
        }
    }
    if edge.overridden {
        attrs.push("style=dashed".to_string());
    }
    if edge.multiplicity > 1 {
        attrs.push(format!("label={}", quoted(&edge.multiplicity.to_string())));
    }

    write!(
        f,
        "  {} -> {}",
        quoted(&edge.source.to_string()),
        quoted(&edge.target.to_string())
    )?;
    if !attrs.is_empty() {
        write!(f, " [{}]", attrs.join(", "))?;
    }
    writeln!(f, ";")
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node_id::NodeId;
    use pretty_assertions::assert_eq;

    fn node(kind: NodeKind, name: &str, status: NodeStatus, cluster: Option<&str>) -> Node {
        Node {
            id: NodeId::new(kind, name.to_string()),
            kind,
            label: name.rsplit('/').next().unwrap_or(name).to_string(),
            status,
            cluster: cluster.map(str::to_string),
        }
    }

    #[test]
    fn renders_clusters_and_edges() {
        let mut graph = Graph::default();
        graph.attrs.insert("rankdir".into(), "LR".into());
        graph.add_node(node(NodeKind::Playbook, "site", NodeStatus::Normal, None));
        graph.add_node(node(NodeKind::Role, "web", NodeStatus::Normal, Some("web")));
        graph.add_node(node(NodeKind::Task, "web/main", NodeStatus::Normal, Some("web")));
        graph.add_node(node(NodeKind::Role, "ghost", NodeStatus::Unresolved, None));
        graph.build_clusters();

        graph.add_edge(Edge {
            source: NodeId::playbook("site"),
            target: NodeId::role("web"),
            kind: EdgeKind::Includes,
            status: EdgeStatus::Resolved,
            multiplicity: 1,
            overridden: false,
        });
        graph.add_edge(Edge {
            source: NodeId::new(NodeKind::Task, "web/main".into()),
            target: NodeId::role("ghost"),
            kind: EdgeKind::Includes,
            status: EdgeStatus::Unresolved,
            multiplicity: 2,
            overridden: false,
        });

        let expected = r##"digraph playviz {
  rankdir="LR";
  node [style=filled, fontname="Helvetica", fontsize=10];
  edge [fontname="Helvetica", fontsize=8];

  subgraph "cluster_web" {
    label="web";
    style=rounded;
    "role:web" [label="web", shape=house, fillcolor="#a6cee3"];
    "task:web/main" [label="main", shape=octagon, fillcolor="#b2df8a"];
  }

  "playbook:site" [label="site", shape=folder, fillcolor="#e0e0e0"];
  "role:ghost" [label="ghost", shape=house, style="filled,dashed", color=red, fillcolor="#fbb4ae"];

  "playbook:site" -> "role:web";
  "task:web/main" -> "role:ghost" [style=dashed, color=red, label="2"];
}
"##;
        assert_eq!(dot(&graph), expected);
    }

    #[test]
    fn html_page_embeds_the_digraph() {
        let mut graph = Graph::default();
        graph.add_node(node(NodeKind::Role, "web", NodeStatus::Normal, None));
        graph.add_node(node(NodeKind::Role, "<db>", NodeStatus::Normal, None));
        graph.add_edge(Edge {
            source: NodeId::role("web"),
            target: NodeId::role("<db>"),
            kind: EdgeKind::Includes,
            status: EdgeStatus::Resolved,
            multiplicity: 1,
            overridden: false,
        });

        let page = Page::new("Ansible dependencies", "2024.01.02 03:04:05");
        let html = html(&graph, &page).unwrap();

        assert!(html.contains("<title>Ansible dependencies</title>"));
        assert!(html.contains("Generated 2024.01.02 03:04:05"));
        assert!(html.contains("<pre id=\"dot\">digraph playviz {\n"));
        assert!(html.contains("&quot;role:web&quot; -&gt; &quot;role:&lt;db&gt;&quot;;"));
        assert!(!html.contains("role:<db>"));
    }

    #[test]
    fn escapes_quotes() {
        assert_eq!(quoted(r#"say "hi"\"#), r#""say \"hi\"\\""#);
    }
}
