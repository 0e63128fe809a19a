//! resolve role, task, template and vars file references
//!
//! Every reference becomes an [Edge](crate::model::Edge). References that point at nothing
//! become edges with [EdgeStatus::Unresolved] targeting the node the reference *would* name,
//! and are listed in [Project::unresolved].
//!
//! Roles may include each other in a loop (`a` depends on `b` which includes `a`). The role
//! inclusion graph is walked depth first and every inclusion re-entering the current chain is
//! marked as [EdgeStatus::BackEdge].
use crate::model::{
    role_reference, EdgeKind, EdgeSet, EdgeStatus, Playbook, Project, ScopeKind, Step,
    UnresolvedRef,
};
use crate::node_id::{NodeId, NodeKind, Owner};
use crate::role_graph::RoleGraph;
use crate::util::{basename, file_arg, module_arg, strip_yaml_extension};

const ROLE_INCLUDES: [&str; 2] = ["include_role", "import_role"];
const TASK_INCLUDES: [&str; 3] = ["include_tasks", "import_tasks", "include"];
const TEMPLATE_MODULES: [&str; 2] = ["template", "win_template"];

#[tracing::instrument(level = "debug", skip_all)]
pub fn resolve(project: &mut Project) {
    let mut resolver = Resolver::new(project);
    resolver.resolve_playbooks();
    resolver.resolve_roles();
    let role_graph = resolver.mark_back_edges();

    let Resolver {
        edges, unresolved, ..
    } = resolver;

    tracing::info!(
        edges = edges.len(),
        unresolved = unresolved.len(),
        "references resolved"
    );
    project.edges = edges;
    project.unresolved = unresolved;
    project.role_graph = role_graph;
}

#[derive(derive_new::new)]
struct Resolver<'p> {
    project: &'p Project,
    #[new(default)]
    edges: EdgeSet,
    #[new(default)]
    unresolved: Vec<UnresolvedRef>,
}

impl<'p> Resolver<'p> {
    fn resolve_playbooks(&mut self) {
        let project = self.project;
        for playbook in project.playbooks.values() {
            let source = playbook.id();

            for reference in &playbook.roles {
                let target = self.resolve_role(reference, Some(playbook));
                self.link(&source, target, EdgeKind::Includes, reference);
            }

            for reference in &playbook.imports {
                let name = basename(strip_yaml_extension(reference));
                let target = match project.playbooks.contains_key(name) {
                    true => Ok(NodeId::playbook(name)),
                    false => Err(NodeId::playbook(name)),
                };
                self.link(&source, target, EdgeKind::Includes, reference);
            }

            for reference in &playbook.vars_files {
                let target = self.resolve_varfile(reference, &Owner::Main);
                self.link(&source, target, EdgeKind::Includes, reference);
            }

            for step in &playbook.steps {
                self.resolve_step(&source, &Owner::Main, Some(playbook), step);
            }
        }
    }

    fn resolve_roles(&mut self) {
        let project = self.project;
        for role in project.all_roles() {
            if let Some(role_id) = role.id() {
                for task in role.tasks.values() {
                    self.add(&role_id, task.id(), EdgeKind::Contains);
                }
                for varfile_id in role.varfiles.keys() {
                    self.add(&role_id, varfile_id.clone(), EdgeKind::Contains);
                }
                for template in role.templates.values() {
                    self.add(&role_id, template.id(), EdgeKind::Contains);
                }
                for reference in &role.dependencies {
                    let target = self.resolve_role(reference, None);
                    self.link(&role_id, target, EdgeKind::Includes, reference);
                }
            }

            for task in role.tasks.values() {
                let source = task.id();
                for step in &task.steps {
                    self.resolve_step(&source, &task.owner, None, step);
                }
            }
        }
    }

    fn resolve_step(
        &mut self,
        source: &NodeId,
        owner: &Owner,
        playbook: Option<&Playbook>,
        step: &Step,
    ) {
        for key in ROLE_INCLUDES {
            if let Some(reference) = step.get(key).and_then(role_reference) {
                let target = self.resolve_role(&reference, playbook);
                self.link(source, target, EdgeKind::Includes, &reference);
            }
        }

        for key in TASK_INCLUDES {
            if let Some(reference) = step.get(key).and_then(file_arg) {
                let target = self.resolve_task(&reference, owner);
                self.link(source, target, EdgeKind::Includes, &reference);
            }
        }

        for key in TEMPLATE_MODULES {
            if let Some(reference) = step.get(key).and_then(|arg| module_arg(arg, "src")) {
                let target = self.resolve_template(&reference, owner);
                self.link(source, target, EdgeKind::Renders, &reference);
            }
        }

        if let Some(reference) = step.get("include_vars").and_then(file_arg) {
            let target = self.resolve_varfile(&reference, owner);
            self.link(source, target, EdgeKind::Includes, &reference);
        }

        for nested in step.nested() {
            self.resolve_step(source, owner, playbook, &nested);
        }
    }

    /// Role lookup: the playbook's own role list, then global by exact name, then by basename
    fn resolve_role(&self, reference: &str, playbook: Option<&Playbook>) -> Result<NodeId, NodeId> {
        let declared = playbook
            .into_iter()
            .flat_map(|playbook| &playbook.roles)
            .find(|declared| declared.as_str() == reference)
            .map(|declared| basename(declared))
            .filter(|name| self.project.roles.contains_key(*name));

        let found = declared
            .or_else(|| {
                self.project
                    .roles
                    .contains_key(reference)
                    .then_some(reference)
            })
            .or_else(|| {
                let name = basename(reference);
                self.project.roles.contains_key(name).then_some(name)
            });

        match found {
            Some(name) => Ok(NodeId::role(name)),
            None => Err(NodeId::role(basename(reference))),
        }
    }

    /// Task lookup: the including role first, then global by `<role>/<task>`
    ///
    /// Accepts `setup.yml`, `tasks/setup.yml`, `other/setup` and `roles/other/tasks/setup.yml`.
    fn resolve_task(&self, reference: &str, owner: &Owner) -> Result<NodeId, NodeId> {
        let file = strip_yaml_extension(reference);
        let (role_hint, task) = match file.rsplit_once("tasks/") {
            Some((prefix, task)) => {
                let role = basename(prefix);
                (Some(role).filter(|role| !role.is_empty() && *role != ".."), task)
            }
            None => match file.split_once('/') {
                Some((role, task)) => (Some(role), task),
                None => (None, file),
            },
        };

        if let Some(role) = self.project.role(owner) {
            if role.tasks.contains_key(task) || role.tasks.contains_key(file) {
                let name = if role.tasks.contains_key(file) { file } else { task };
                return Ok(NodeId::owned(NodeKind::Task, owner, name));
            }
        }

        if let Some(role_name) = role_hint {
            let other = Owner::Role(role_name.to_string());
            if let Some(role) = self.project.role(&other) {
                if role.tasks.contains_key(task) {
                    return Ok(NodeId::owned(NodeKind::Task, &other, task));
                }
            }
        }

        Err(NodeId::owned(NodeKind::Task, owner, file))
    }

    /// Template lookup: the rendering role first, then global by `<role>/<template>`
    fn resolve_template(&self, reference: &str, owner: &Owner) -> Result<NodeId, NodeId> {
        let name = reference.strip_prefix("templates/").unwrap_or(reference);

        if let Some(role) = self.project.role(owner) {
            if role.templates.contains_key(name) {
                return Ok(NodeId::owned(NodeKind::Template, owner, name));
            }
        }

        if let Some((role_name, template)) = name.split_once('/') {
            let other = Owner::Role(role_name.to_string());
            let template = template.strip_prefix("templates/").unwrap_or(template);
            if let Some(role) = self.project.role(&other) {
                if role.templates.contains_key(template) {
                    return Ok(NodeId::owned(NodeKind::Template, &other, template));
                }
            }
        }

        Err(NodeId::owned(NodeKind::Template, owner, name))
    }

    /// Vars file lookup: the including role's `vars/`, then vars files of main
    fn resolve_varfile(&self, reference: &str, owner: &Owner) -> Result<NodeId, NodeId> {
        let file = strip_yaml_extension(reference);
        let name = file.strip_prefix("vars/").unwrap_or(file);

        let own = self.project.role(owner).into_iter().flat_map(|role| {
            role.varfiles.values().filter(|varfile| {
                varfile.scope != ScopeKind::Defaults
                    && (varfile.name == file || varfile.name == name)
            })
        });
        let main = self
            .project
            .main
            .varfiles
            .values()
            .filter(|varfile| varfile.name == file || basename(&varfile.name) == basename(file));

        match own.chain(main).next() {
            Some(varfile) => Ok(varfile.id()),
            None => Err(NodeId::owned(NodeKind::VarFile, owner, file)),
        }
    }

    fn add(&mut self, source: &NodeId, target: NodeId, kind: EdgeKind) {
        self.edges
            .add(source.clone(), target, kind, EdgeStatus::Resolved);
    }

    /// Record a resolved (`Ok`) or unresolved (`Err`) reference
    fn link(
        &mut self,
        source: &NodeId,
        target: Result<NodeId, NodeId>,
        kind: EdgeKind,
        reference: &str,
    ) {
        match target {
            Ok(target) => {
                tracing::debug!(%source, %target, "resolved");
                self.add(source, target, kind);
            }
            Err(target) => {
                tracing::debug!(%source, %target, reference, "unresolved reference");
                self.unresolved.push(UnresolvedRef {
                    source: source.clone(),
                    kind: target.kind,
                    reference: reference.to_string(),
                });
                self.edges
                    .add(source.clone(), target, kind, EdgeStatus::Unresolved);
            }
        }
    }

    /// Mark role inclusions closing a cycle
    fn mark_back_edges(&mut self) -> RoleGraph {
        let roles = self.project.roles.keys().map(String::as_str);
        let role_graph = RoleGraph::new(roles, &self.edges);

        // playbook roles first so cycles are broken where a reader enters them
        let seeds: Vec<&str> = self
            .edges
            .iter()
            .filter(|edge| {
                edge.source.kind == NodeKind::Playbook && edge.target.kind == NodeKind::Role
            })
            .map(|edge| edge.target.name.as_str())
            .chain(self.project.roles.keys().map(String::as_str))
            .collect();

        let back_edges = role_graph.back_edges(seeds);
        for (source, target) in back_edges {
            tracing::debug!(%source, %target, "inclusion cycle");
            self.edges
                .mark(&source, &target, EdgeKind::Includes, EdgeStatus::BackEdge);
        }
        role_graph
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::project;
    use pretty_assertions::assert_eq;

    fn edge_status(project: &Project, source: &str, target: &str) -> Option<EdgeStatus> {
        project
            .edges
            .iter()
            .find(|edge| edge.source.to_string() == source && edge.target.to_string() == target)
            .map(|edge| edge.status)
    }

    #[test]
    fn playbook_roles_and_containment() {
        let mut project = project! {
            "site.yml" => "- hosts: all\n  roles: [roles/web]",
            "roles/web/tasks/main.yml" => "- include_tasks: setup.yml",
            "roles/web/tasks/setup.yml" => "- template: src=site.conf.j2 dest=/etc/site.conf",
            "roles/web/templates/site.conf.j2" => "",
            "roles/web/defaults/main.yml" => "port: 80"
        };
        resolve(&mut project);

        let resolved = EdgeStatus::Resolved;
        assert_eq!(edge_status(&project, "playbook:site", "role:web"), Some(resolved));
        assert_eq!(edge_status(&project, "role:web", "task:web/main"), Some(resolved));
        assert_eq!(edge_status(&project, "role:web", "vardefaults:web/main"), Some(resolved));
        assert_eq!(edge_status(&project, "task:web/main", "task:web/setup"), Some(resolved));
        assert_eq!(
            edge_status(&project, "task:web/setup", "template:web/site.conf.j2"),
            Some(resolved)
        );
        assert!(project.unresolved.is_empty());
    }

    #[test]
    fn unresolved_role() {
        let mut project = project! {
            "roles/web/tasks/main.yml" => "- include_role:\n    name: ghost"
        };
        resolve(&mut project);

        assert_eq!(
            edge_status(&project, "task:web/main", "role:ghost"),
            Some(EdgeStatus::Unresolved)
        );
        assert_eq!(
            project.unresolved,
            vec![UnresolvedRef {
                source: NodeId::new(NodeKind::Task, "web/main".to_string()),
                kind: NodeKind::Role,
                reference: "ghost".to_string(),
            }]
        );
    }

    #[test]
    fn tasks_resolve_globally() {
        let mut project = project! {
            "roles/web/tasks/main.yml" => "- import_tasks: roles/common/tasks/users.yml\n- include_tasks: missing.yml",
            "roles/common/tasks/users.yml" => ""
        };
        resolve(&mut project);

        assert_eq!(
            edge_status(&project, "task:web/main", "task:common/users"),
            Some(EdgeStatus::Resolved)
        );
        assert_eq!(
            edge_status(&project, "task:web/main", "task:web/missing"),
            Some(EdgeStatus::Unresolved)
        );
    }

    #[test]
    fn inclusion_cycles_terminate() {
        let mut project = project! {
            "site.yml" => "- hosts: all\n  roles: [a]",
            "roles/a/meta/main.yml" => "dependencies: [b]",
            "roles/b/tasks/main.yml" => "- import_role:\n    name: a"
        };
        resolve(&mut project);

        assert_eq!(edge_status(&project, "role:a", "role:b"), Some(EdgeStatus::Resolved));
        assert_eq!(
            edge_status(&project, "task:b/main", "role:a"),
            Some(EdgeStatus::BackEdge)
        );

        let ancestors: Vec<String> = project.role_graph.ancestors("a").into_iter().collect();
        assert_eq!(ancestors, vec!["a", "b"]);
    }

    #[test]
    fn self_inclusion_is_a_back_edge() {
        let mut project = project! {
            "roles/a/meta/main.yml" => "dependencies: [a]"
        };
        resolve(&mut project);

        assert_eq!(edge_status(&project, "role:a", "role:a"), Some(EdgeStatus::BackEdge));
    }

    #[test]
    fn deterministic() {
        let build = || {
            let mut project = project! {
                "site.yml" => "- hosts: all\n  roles: [a, b, ghost]",
                "roles/a/meta/main.yml" => "dependencies: [b]",
                "roles/b/meta/main.yml" => "dependencies: [a]"
            };
            resolve(&mut project);
            project.edges.iter().cloned().collect::<Vec<_>>()
        };

        assert_eq!(build(), build());
    }
}
