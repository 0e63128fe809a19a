//! decide which definition a variable usage binds to
//!
//! For every usage the visible definitions are ranked by [PRECEDENCE]. The highest tier with
//! at least one visible definition wins; two or more distinct sources in that tier make the
//! usage ambiguous.
//!
//! Visibility is a static over-approximation. Conditional inclusion (`when` on an
//! `include_vars`, roles included only on some hosts, ...) is never evaluated: a definition
//! is visible to a usage if it is declared in any scope that *could* apply.
//!
//! - step `vars` are visible to the task file declaring them and the templates it renders
//! - other task definitions (`set_fact`, `register`) and inventory definitions are visible
//!   everywhere
//! - play definitions are visible to the playbook and every role it reaches
//! - role vars and defaults are visible to the role itself, the roles it includes, the roles
//!   including it, and every role sharing a playbook with it
//!
//! A role that no playbook reaches could be included by any of them, so play definitions are
//! visible to it as well.
use crate::model::{
    Definition, EdgeKind, EdgeStatus, Project, Resolution, ScopeKind, Usage, VarState, Variable,
};
use crate::node_id::{NodeId, NodeKind, Owner};
use std::collections::{BTreeMap, BTreeSet};

/// Variable precedence, highest first
pub const PRECEDENCE: [ScopeKind; 5] = [
    ScopeKind::Task,
    ScopeKind::Play,
    ScopeKind::RoleVars,
    ScopeKind::Inventory,
    ScopeKind::Defaults,
];

#[tracing::instrument(level = "debug", skip_all)]
pub fn scope(project: &mut Project) {
    let visibility = Visibility::new(project);

    for variable in project.variables.values_mut() {
        let Variable {
            definitions,
            usages,
            ..
        } = &mut *variable;

        for usage in usages.iter_mut() {
            let resolution = visibility.resolve(usage, &definitions[..]);
            tracing::trace!(node = %usage.node, name = %usage.name, ?resolution, "scoped");

            let effective: Vec<&NodeId> = match &resolution {
                Resolution::Resolved(source) => vec![source],
                Resolution::Ambiguous(sources) => sources.iter().collect(),
                Resolution::Undefined => vec![],
            };
            for definition in definitions.iter_mut() {
                if effective.contains(&&definition.source) {
                    definition.effective = true;
                }
            }

            usage.resolution = Some(resolution);
        }

        let state = classify(variable);
        tracing::debug!(name = %variable.name, %state, "classified");
        variable.state = Some(state);
    }
}

fn classify(variable: &Variable) -> VarState {
    let resolutions = || variable.usages.iter().filter_map(|u| u.resolution.as_ref());

    if variable.usages.is_empty() {
        VarState::Unused
    } else if resolutions().any(|r| *r == Resolution::Undefined) {
        VarState::Undefined
    } else if resolutions().any(|r| matches!(r, Resolution::Ambiguous(_))) {
        VarState::Ambiguous
    } else {
        VarState::Resolved
    }
}

/// Which roles and playbooks can see each other
struct Visibility {
    /// Roles included by a role, transitively (excluding itself)
    descendants: BTreeMap<String, BTreeSet<String>>,
    /// Roles including a role, transitively (excluding itself)
    ancestors: BTreeMap<String, BTreeSet<String>>,
    /// Roles a playbook reaches, transitively
    playbook_roles: BTreeMap<String, BTreeSet<String>>,
    /// Playbooks including a main vars file
    varfile_playbooks: BTreeMap<NodeId, BTreeSet<String>>,
    /// Templates rendered by a task file
    renders: BTreeMap<NodeId, BTreeSet<NodeId>>,
    all_roles: BTreeSet<String>,
    all_playbooks: BTreeSet<String>,
}

impl Visibility {
    fn new(project: &Project) -> Self {
        let mut playbook_includes: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut varfile_playbooks: BTreeMap<NodeId, BTreeSet<String>> = BTreeMap::new();
        let mut renders: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();

        for edge in project.edges.iter() {
            if edge.status == EdgeStatus::Unresolved {
                continue;
            }
            if edge.kind == EdgeKind::Renders {
                renders
                    .entry(edge.source.clone())
                    .or_default()
                    .insert(edge.target.clone());
            }
            if edge.kind != EdgeKind::Includes {
                continue;
            }

            match (edge.source.kind, edge.target.kind) {
                (NodeKind::Playbook, NodeKind::Role) => {
                    playbook_includes
                        .entry(edge.source.name.clone())
                        .or_default()
                        .insert(edge.target.name.clone());
                }
                (NodeKind::Playbook, NodeKind::VarFile) => {
                    varfile_playbooks
                        .entry(edge.target.clone())
                        .or_default()
                        .insert(edge.source.name.clone());
                }
                _ => {}
            }
        }

        let role_graph = &project.role_graph;
        let all_roles: BTreeSet<String> = project.roles.keys().cloned().collect();
        let descendants = all_roles
            .iter()
            .map(|role| (role.clone(), role_graph.descendants(role)))
            .collect();
        let ancestors = all_roles
            .iter()
            .map(|role| (role.clone(), role_graph.ancestors(role)))
            .collect();

        let playbook_roles = playbook_includes
            .into_iter()
            .map(|(playbook, roles)| {
                let mut reached = roles.clone();
                for role in &roles {
                    reached.extend(role_graph.descendants(role));
                }
                (playbook, reached)
            })
            .collect();

        Self {
            descendants,
            ancestors,
            playbook_roles,
            varfile_playbooks,
            renders,
            all_roles,
            all_playbooks: project.playbooks.keys().cloned().collect(),
        }
    }

    fn resolve(&self, usage: &Usage, definitions: &[Definition]) -> Resolution {
        let visible: Vec<&Definition> = definitions
            .iter()
            .filter(|definition| self.is_visible(definition, usage))
            .collect();

        for tier in PRECEDENCE {
            let mut candidates: Vec<&Definition> = visible
                .iter()
                .copied()
                .filter(|definition| definition.scope == tier)
                .collect();

            // the task's own vars shadow facts set elsewhere
            if tier == ScopeKind::Task && candidates.iter().any(|d| d.source == usage.node) {
                candidates.retain(|d| d.source == usage.node);
            }

            let mut sources: Vec<NodeId> = vec![];
            for candidate in candidates {
                if !sources.contains(&candidate.source) {
                    sources.push(candidate.source.clone());
                }
            }

            match sources.len() {
                0 => continue,
                1 => return Resolution::Resolved(sources.remove(0)),
                _ => return Resolution::Ambiguous(sources),
            }
        }

        Resolution::Undefined
    }

    fn is_visible(&self, definition: &Definition, usage: &Usage) -> bool {
        match definition.scope {
            ScopeKind::Task if definition.local => {
                definition.source == usage.node
                    || self
                        .renders
                        .get(&definition.source)
                        .is_some_and(|templates| templates.contains(&usage.node))
            }
            ScopeKind::Task | ScopeKind::Inventory => true,
            ScopeKind::Play => {
                let defining = match definition.source.kind {
                    NodeKind::Playbook => BTreeSet::from([definition.source.name.clone()]),
                    _ => match self.varfile_playbooks.get(&definition.source) {
                        Some(playbooks) => playbooks.clone(),
                        None => return true,
                    },
                };
                self.playbooks_of(usage)
                    .iter()
                    .any(|playbook| defining.contains(playbook))
            }
            ScopeKind::RoleVars | ScopeKind::Defaults => match &definition.owner {
                Owner::Main => true,
                Owner::Role(role) => self.roles_of(usage).contains(role),
            },
        }
    }

    /// Playbooks a usage may run in
    fn playbooks_of(&self, usage: &Usage) -> BTreeSet<String> {
        match &usage.owner {
            Owner::Main if usage.node.kind == NodeKind::Playbook => {
                BTreeSet::from([usage.node.name.clone()])
            }
            Owner::Main => self.all_playbooks.clone(),
            Owner::Role(role) => {
                let reaching = self.reaching(role);
                match reaching.is_empty() {
                    true => self.all_playbooks.clone(),
                    false => reaching,
                }
            }
        }
    }

    /// Roles whose vars and defaults a usage can see
    fn roles_of(&self, usage: &Usage) -> BTreeSet<String> {
        match &usage.owner {
            Owner::Main if usage.node.kind == NodeKind::Playbook => self
                .playbook_roles
                .get(&usage.node.name)
                .cloned()
                .unwrap_or_default(),
            Owner::Main => self.all_roles.clone(),
            Owner::Role(role) => {
                let mut roles = BTreeSet::from([role.clone()]);
                roles.extend(self.descendants.get(role).into_iter().flatten().cloned());
                roles.extend(self.ancestors.get(role).into_iter().flatten().cloned());
                for playbook in self.reaching(role) {
                    roles.extend(self.playbook_roles[&playbook].iter().cloned());
                }
                roles
            }
        }
    }

    /// Playbooks reaching a role
    fn reaching(&self, role: &str) -> BTreeSet<String> {
        self.playbook_roles
            .iter()
            .filter(|(_, roles)| roles.contains(role))
            .map(|(playbook, _)| playbook.clone())
            .collect()
    }
}
