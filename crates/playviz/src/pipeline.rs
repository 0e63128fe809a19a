//! stage orchestration
use crate::graph::Graph;
use crate::grapher::GraphBuilder;
use crate::model::Project;
use crate::options::Options;
use crate::{resolver, scoper, varfinder};

/// Annotate a loaded project: references, variables and their scopes
pub fn analyze(project: &mut Project) {
    resolver::resolve(project);
    varfinder::find_variables(project);
    scoper::scope(project);
}

/// Analyze and project into a graph
pub fn run(project: &mut Project, options: &Options) -> Graph {
    analyze(project);
    GraphBuilder::new(options).build(project)
}
