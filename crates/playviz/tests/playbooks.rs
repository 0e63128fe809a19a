//! End to end tests
//!
//! Loads the playbook directories in /tests/fixtures/ from disk and checks the resulting graph.

use playviz::graph::{Graph, NodeStatus};
use playviz::loader::LoadError;
use playviz::model::{EdgeStatus, Project};
use playviz::node_id::NodeKind;
use playviz::options::Options;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn load(name: &str) -> Project {
    Project::load_dir(&fixture(name)).expect("fixture must load")
}

fn graph(options: &Options) -> Graph {
    playviz::pipeline::run(&mut load("web_db"), options)
}

fn assert_no_dangling_edges(graph: &Graph) {
    for edge in &graph.edges {
        assert!(
            graph.nodes.contains_key(&edge.source) && graph.nodes.contains_key(&edge.target),
            "dangling edge {}",
            edge.description()
        );
    }
}

#[test]
fn variable_states() {
    let mut project = load("web_db");
    playviz::pipeline::analyze(&mut project);

    let summary = project
        .variables
        .values()
        .map(|variable| {
            let state = variable.state.map(|state| state.to_string()).unwrap_or_default();
            format!("{}: {state}", variable.name)
        })
        .collect::<Vec<_>>()
        .join("\n");

    insta::assert_snapshot!(summary, @r###"
    app_users: resolved
    create_users_flag: undefined
    db_host: resolved
    db_port: resolved
    unused_setting: unused
    "###);
}

#[test]
fn unresolved_role_is_reported() {
    let mut project = load("web_db");
    playviz::pipeline::analyze(&mut project);

    assert_eq!(project.unresolved.len(), 1);
    let unresolved = &project.unresolved[0];
    assert_eq!(unresolved.source.to_string(), "task:web/main");
    assert_eq!(unresolved.kind, NodeKind::Role);
    assert_eq!(unresolved.reference, "ghost");
}

#[test]
fn default_graph() {
    let graph = graph(&Options::default());

    assert_eq!(
        graph.node("role:ghost").map(|node| node.status),
        Some(NodeStatus::Unresolved)
    );
    assert_eq!(
        graph.edge("task:web/main", "role:ghost").map(|edge| edge.status),
        Some(EdgeStatus::Unresolved)
    );
    assert!(graph.edge("task:web/main", "task:web/users").is_some());
    assert!(graph.edge("task:web/main", "template:web/app.conf.j2").is_some());
    assert!(graph.edge("playbook:site", "role:db").is_some());

    // main defaults and variables are hidden by default
    assert!(graph.node("vardefaults:web/main").is_none());
    assert!(graph.nodes.values().all(|node| node.kind != NodeKind::Var));

    assert_eq!(graph.clusters.keys().collect::<Vec<_>>(), vec!["db", "web"]);
    assert_no_dangling_edges(&graph);

    let dot = playviz::render::dot(&graph);
    assert!(dot.starts_with("digraph playviz {\n"));
    assert!(dot.contains("  rankdir=\"LR\";\n"));
    assert!(dot.contains("subgraph \"cluster_web\""));
    assert!(dot.contains("\"task:web/main\" -> \"role:ghost\" [style=dashed, color=red];"));
}

#[test]
fn all_variables() {
    let options = Options {
        show_vars: true,
        show_main_defaults: true,
        ..Options::default()
    };
    let graph = graph(&options);

    let status = |id: &str| graph.node(id).map(|node| node.status);
    assert_eq!(status("var:db_host"), Some(NodeStatus::Normal));
    assert_eq!(status("var:create_users_flag"), Some(NodeStatus::Undefined));
    assert_eq!(status("var:unused_setting"), Some(NodeStatus::Unused));
    assert!(graph.edge("vardefaults:db/main", "var:db_port").is_some());
    assert!(graph.edge("template:web/app.conf.j2", "var:db_port").is_some());
    assert!(graph.edge("varfile:group_vars/all", "var:unused_setting").is_some());
    assert_no_dangling_edges(&graph);

    let json = serde_json::to_value(&graph).expect("graph serializes");
    assert_eq!(json["attrs"]["ranksep"], "2");
    assert_eq!(json["nodes"]["var:db_host"]["status"], "normal");
}

#[test]
fn excluded_db_role() {
    let options = Options {
        show_vars: true,
        ..Options::default()
    };
    let full = graph(&options);
    let graph = graph(&options.with_exclusions(Some("role:db.*"), None).unwrap());

    assert!(graph.node("role:db").is_none());
    assert!(graph
        .edges
        .iter()
        .all(|edge| !edge.description().contains("role:db")));
    assert_eq!(graph.nodes.len(), full.nodes.len() - 1);
    assert_no_dangling_edges(&graph);
}

#[test]
fn binary_and_foreign_files_are_skipped() {
    let mut project = load("mixed_files");
    playviz::pipeline::analyze(&mut project);

    let web = &project.roles["web"];
    assert_eq!(web.tasks.keys().collect::<Vec<_>>(), vec!["main"]);
    assert_eq!(web.templates.keys().collect::<Vec<_>>(), vec!["app.conf.j2"]);
    assert!(project.unresolved.is_empty());
    assert_eq!(
        project.variable("listen_port").and_then(|variable| variable.state),
        Some(playviz::model::VarState::Undefined)
    );
}

#[test]
fn missing_playbooks() {
    let err = Project::load_dir(&fixture("no_playbooks")).expect_err("nothing to load");
    assert!(matches!(err, LoadError::NoFilesFound));

    let err = Project::load_dir(&fixture("does_not_exist")).expect_err("missing directory");
    assert!(matches!(err, LoadError::IoError(_)));
}
