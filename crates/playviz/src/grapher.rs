//! project → [Graph] projection
//!
//! Nodes are added per category toggle, edges only when both endpoints made it into the graph.
//! Exclusion expressions are applied last so node removal also removes every touching edge.
use crate::graph::{Edge, Graph, Node, NodeStatus};
use crate::model::{EdgeKind, EdgeStatus, Project, VarState};
use crate::node_id::{NodeId, NodeKind, Owner};
use crate::options::Options;
use crate::util::basename;
use std::collections::HashSet;

#[derive(derive_new::new)]
pub struct GraphBuilder<'o> {
    options: &'o Options,
}

impl GraphBuilder<'_> {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn build(&self, project: &Project) -> Graph {
        let mut graph = Graph::default();
        let layout = &self.options.layout;
        graph.attrs.insert("rankdir".to_string(), layout.rankdir.clone());
        graph.attrs.insert("ranksep".to_string(), layout.ranksep.clone());

        self.add_nodes(project, &mut graph);
        self.add_edges(project, &mut graph);
        graph.build_clusters();

        if let Some(exclude) = &self.options.exclude_nodes {
            graph.retain_nodes(|node| !exclude.is_match(&node.id.to_string()));
        }
        if let Some(exclude) = &self.options.exclude_edges {
            graph.retain_edges(|edge| !exclude.is_match(&edge.description()));
        }

        tracing::info!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            clusters = graph.clusters.len(),
            "graph built"
        );
        graph
    }

    fn add_nodes(&self, project: &Project, graph: &mut Graph) {
        for playbook in project.playbooks.values() {
            graph.add_node(entity(playbook.id(), &playbook.name, &Owner::Main));
        }

        for role in project.all_roles() {
            if let (Some(id), Some(name)) = (role.id(), role.owner.role()) {
                graph.add_node(entity(id, name, &role.owner));
            }

            for task in role.tasks.values() {
                let id = task.id();
                if self.shows(&id) {
                    graph.add_node(entity(id, &task.name, &task.owner));
                }
            }
            for varfile in role.varfiles.values() {
                let id = varfile.id();
                if self.shows(&id) {
                    graph.add_node(entity(id, &varfile.name, &varfile.owner));
                }
            }
            for template in role.templates.values() {
                let id = template.id();
                if self.shows(&id) {
                    graph.add_node(entity(id, &template.name, &template.owner));
                }
            }
        }

        if self.options.show_vars {
            for variable in project.variables.values() {
                let status = match variable.state {
                    Some(VarState::Undefined) => NodeStatus::Undefined,
                    Some(VarState::Ambiguous) => NodeStatus::Ambiguous,
                    Some(VarState::Unused) => NodeStatus::Unused,
                    Some(VarState::Resolved) | None => NodeStatus::Normal,
                };
                graph.add_node(Node {
                    id: NodeId::var(&variable.name),
                    kind: NodeKind::Var,
                    label: variable.name.clone(),
                    status,
                    cluster: None,
                });
            }
        }

        for edge in project.edges.iter() {
            if edge.status == EdgeStatus::Unresolved && self.shows(&edge.target) {
                graph.add_node(Node {
                    id: edge.target.clone(),
                    kind: edge.target.kind,
                    label: edge.target.name.clone(),
                    status: NodeStatus::Unresolved,
                    cluster: None,
                });
            }
        }
    }

    fn add_edges(&self, project: &Project, graph: &mut Graph) {
        let effective = effective_definitions(project);

        for edge in project.edges.iter() {
            if edge.kind == EdgeKind::Uses && !self.options.show_usage {
                continue;
            }

            let overridden = edge.kind == EdgeKind::Defines
                && !effective.contains(&(&edge.source, edge.target.name.as_str()))
                && project
                    .variable(&edge.target.name)
                    .map_or(false, |variable| !variable.usages.is_empty());

            let added = graph.add_edge(Edge {
                source: edge.source.clone(),
                target: edge.target.clone(),
                kind: edge.kind,
                status: edge.status,
                multiplicity: edge.multiplicity,
                overridden,
            });
            if !added {
                tracing::trace!(source = %edge.source, target = %edge.target, "edge hidden");
            }
        }
    }

    /// Category toggles
    fn shows(&self, id: &NodeId) -> bool {
        let options = self.options;
        match id.kind {
            NodeKind::Playbook | NodeKind::Role => true,
            NodeKind::Task => options.show_tasks,
            NodeKind::VarFile => options.show_varfiles,
            NodeKind::VarDefaults => {
                options.show_vardefaults
                    && (options.show_main_defaults || basename(&id.name) != "main")
            }
            NodeKind::Template => options.show_templates,
            NodeKind::Var => options.show_vars,
        }
    }
}

fn entity(id: NodeId, label: &str, owner: &Owner) -> Node {
    let cluster = match id.kind {
        NodeKind::Playbook | NodeKind::Var => None,
        _ => owner.role().map(str::to_string),
    };
    Node {
        kind: id.kind,
        id,
        label: label.to_string(),
        status: NodeStatus::Normal,
        cluster,
    }
}

/// (source, variable) pairs some usage binds to
fn effective_definitions(project: &Project) -> HashSet<(&NodeId, &str)> {
    project
        .variables
        .values()
        .flat_map(|variable| &variable.definitions)
        .filter(|definition| definition.effective)
        .map(|definition| (&definition.source, definition.name.as_str()))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{pipeline, project};
    use pretty_assertions::assert_eq;

    fn built(mut project: Project, options: &Options) -> Graph {
        pipeline::analyze(&mut project);
        GraphBuilder::new(options).build(&project)
    }

    fn ids(graph: &Graph) -> Vec<String> {
        graph.nodes.keys().map(ToString::to_string).collect()
    }

    fn assert_no_dangling_edges(graph: &Graph) {
        for edge in &graph.edges {
            assert!(graph.nodes.contains_key(&edge.source), "{}", edge.description());
            assert!(graph.nodes.contains_key(&edge.target), "{}", edge.description());
        }
    }

    fn web_db() -> Project {
        project! {
            "site.yml" => "- hosts: all\n  roles: [web, db]",
            "roles/web/tasks/main.yml" => "- template: src=app.conf.j2 dest=/etc/app.conf\n- debug: msg={{ db_host }}",
            "roles/web/templates/app.conf.j2" => "host={{ db_host }}",
            "roles/web/defaults/main.yml" => "db_host: localhost",
            "roles/db/tasks/main.yml" => "- include_tasks: setup.yml",
            "roles/db/tasks/setup.yml" => "- apt: name=postgresql",
            "roles/db/defaults/tuning.yml" => "shared_buffers: 128MB",
        }
    }

    #[test]
    fn defaults() {
        let graph = built(web_db(), &Options::default());

        assert_eq!(
            ids(&graph),
            vec![
                "playbook:site",
                "role:web",
                "task:web/main",
                "template:web/app.conf.j2",
                "role:db",
                "task:db/main",
                "task:db/setup",
                "vardefaults:db/tuning",
            ]
        );
        assert_eq!(graph.attrs["rankdir"], "LR");
        assert_eq!(graph.attrs["ranksep"], "2");
        assert_eq!(
            graph.clusters["web"],
            vec![
                NodeId::role("web"),
                NodeId::new(NodeKind::Task, "web/main".to_string()),
                NodeId::new(NodeKind::Template, "web/app.conf.j2".to_string()),
            ]
        );
        assert!(graph.node("playbook:site").unwrap().cluster.is_none());
        assert!(graph.edge("task:web/main", "template:web/app.conf.j2").is_some());
        assert!(graph.edge("task:db/main", "task:db/setup").is_some());
        assert_no_dangling_edges(&graph);
    }

    #[test]
    fn variables() {
        let options = Options {
            show_vars: true,
            show_main_defaults: true,
            ..Options::default()
        };
        let graph = built(web_db(), &options);

        assert_eq!(graph.node("var:db_host").unwrap().status, NodeStatus::Normal);
        assert_eq!(
            graph.node("var:shared_buffers").unwrap().status,
            NodeStatus::Unused
        );
        assert!(graph.edge("vardefaults:web/main", "var:db_host").is_some());
        assert!(graph.edge("template:web/app.conf.j2", "var:db_host").is_some());
        assert_no_dangling_edges(&graph);

        let graph = built(
            web_db(),
            &Options {
                show_usage: false,
                ..options
            },
        );
        assert!(graph.edges.iter().all(|edge| edge.kind != EdgeKind::Uses));
        assert!(graph.edge("vardefaults:web/main", "var:db_host").is_some());
    }

    #[test]
    fn defaults_toggles() {
        let options = Options {
            show_main_defaults: true,
            ..Options::default()
        };
        let graph = built(web_db(), &options);
        assert!(graph.node("vardefaults:web/main").is_some());
        assert!(graph.node("vardefaults:db/tuning").is_some());

        let options = Options {
            show_vardefaults: false,
            show_main_defaults: true,
            ..Options::default()
        };
        let graph = built(web_db(), &options);
        assert!(graph.node("vardefaults:web/main").is_none());
        assert!(graph.node("vardefaults:db/tuning").is_none());

        let options = Options {
            show_tasks: false,
            show_templates: false,
            ..Options::default()
        };
        let graph = built(web_db(), &options);
        assert!(graph
            .nodes
            .values()
            .all(|node| !matches!(node.kind, NodeKind::Task | NodeKind::Template)));
        assert_no_dangling_edges(&graph);
    }

    #[test]
    fn excluded_role() {
        let options = Options {
            show_vars: true,
            ..Options::default()
        }
        .with_exclusions(Some("role:db.*"), None)
        .unwrap();

        let full = built(
            web_db(),
            &Options {
                show_vars: true,
                ..Options::default()
            },
        );
        let graph = built(web_db(), &options);

        assert!(graph.node("role:db").is_none());
        assert!(graph
            .edges
            .iter()
            .all(|edge| edge.source != NodeId::role("db") && edge.target != NodeId::role("db")));
        assert_eq!(graph.nodes.len(), full.nodes.len() - 1);
        assert_eq!(
            graph.edges.len(),
            full.edges
                .iter()
                .filter(|edge| !edge.description().contains("role:db"))
                .count()
        );
        assert_no_dangling_edges(&graph);
    }

    #[test]
    fn filtering_is_idempotent() {
        let options = Options::default()
            .with_exclusions(Some("^task:"), None)
            .unwrap();
        let mut graph = built(web_db(), &options);
        let once = (ids(&graph), graph.edges.clone(), graph.clusters.clone());

        let exclude = options.exclude_nodes.as_ref().unwrap();
        graph.retain_nodes(|node| !exclude.is_match(&node.id.to_string()));
        assert_eq!((ids(&graph), graph.edges.clone(), graph.clusters.clone()), once);
    }

    #[test]
    fn excluded_edges() {
        let options = Options::default()
            .with_exclusions(None, Some("^role:db -> "))
            .unwrap();
        let graph = built(web_db(), &options);

        assert!(graph.node("role:db").is_some());
        assert!(graph.edge("role:db", "task:db/main").is_none());
        assert!(graph.edge("playbook:site", "role:db").is_some());
    }

    #[test]
    fn ghost_role() {
        let project = project! {
            "site.yml" => "- hosts: all\n  roles: [web]",
            "roles/web/tasks/main.yml" => "- include_role:\n    name: ghost",
        };
        let graph = built(project, &Options::default());

        let ghost = graph.node("role:ghost").expect("unresolved role is shown");
        assert_eq!(ghost.status, NodeStatus::Unresolved);
        assert_eq!(ghost.cluster, None);
        assert_eq!(
            graph.edge("task:web/main", "role:ghost").unwrap().status,
            EdgeStatus::Unresolved
        );

        let options = Options::default()
            .with_exclusions(Some("ghost"), None)
            .unwrap();
        let project = project! {
            "site.yml" => "- hosts: all\n  roles: [web]",
            "roles/web/tasks/main.yml" => "- include_role:\n    name: ghost",
        };
        let graph = built(project, &options);
        assert!(graph.node("role:ghost").is_none());
        assert_no_dangling_edges(&graph);
    }

    #[test]
    fn overridden_definitions() {
        let project = project! {
            "site.yml" => "- hosts: all\n  roles: [web]",
            "roles/web/defaults/extra.yml" => "port: 80",
            "roles/web/vars/main.yml" => "port: 8080",
            "roles/web/tasks/main.yml" => "- debug: msg={{ port }}",
        };
        let options = Options {
            show_vars: true,
            ..Options::default()
        };
        let graph = built(project, &options);

        assert!(graph.edge("vardefaults:web/extra", "var:port").unwrap().overridden);
        assert!(!graph.edge("varfile:web/main", "var:port").unwrap().overridden);
    }
}
