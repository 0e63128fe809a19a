//! in-memory project model
//!
//! A [Project] is created once by the loader, then annotated by the pipeline stages
//! ([crate::resolver], [crate::varfinder], [crate::scoper]). Entities are never removed; the
//! graph builder decides what ends up in the diagram.
use crate::node_id::{NodeId, NodeKind, Owner};
use crate::role_graph::RoleGraph;
use indexmap::IndexMap;
use serde::Serialize;
use serde_yaml::{Mapping, Value};

#[derive(Debug, Default)]
pub struct Project {
    /// Top-level pseudo-role holding inventory and play vars files
    pub main: Role,
    pub roles: IndexMap<String, Role>,
    pub playbooks: IndexMap<String, Playbook>,

    // annotations
    pub edges: EdgeSet,
    pub unresolved: Vec<UnresolvedRef>,
    pub variables: IndexMap<String, Variable>,
    pub role_graph: RoleGraph,
}

impl Project {
    pub fn role(&self, owner: &Owner) -> Option<&Role> {
        match owner {
            Owner::Main => Some(&self.main),
            Owner::Role(name) => self.roles.get(name),
        }
    }

    pub fn role_mut(&mut self, owner: &Owner) -> &mut Role {
        match owner {
            Owner::Main => &mut self.main,
            Owner::Role(name) => self
                .roles
                .entry(name.clone())
                .or_insert_with(|| Role::new(owner.clone())),
        }
    }

    /// All roles including the main pseudo-role (first)
    pub fn all_roles(&self) -> impl Iterator<Item = &Role> {
        std::iter::once(&self.main).chain(self.roles.values())
    }

    pub fn varfiles(&self) -> impl Iterator<Item = &VarFile> {
        self.all_roles().flat_map(|role| role.varfiles.values())
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }
}

#[derive(Debug, Default)]
pub struct Role {
    pub owner: Owner,
    pub tasks: IndexMap<String, Task>,
    pub varfiles: IndexMap<NodeId, VarFile>,
    pub templates: IndexMap<String, Template>,
    /// Literal role references from `meta/main.yml`
    pub dependencies: Vec<String>,
}

impl Role {
    pub fn new(owner: Owner) -> Self {
        Self {
            owner,
            ..Default::default()
        }
    }

    pub fn id(&self) -> Option<NodeId> {
        self.owner.role().map(NodeId::role)
    }
}

/// A task file: an ordered list of steps
#[derive(Debug, derive_new::new)]
pub struct Task {
    pub name: String,
    pub owner: Owner,
    pub steps: Vec<Step>,
}

impl Task {
    pub fn id(&self) -> NodeId {
        NodeId::owned(NodeKind::Task, &self.owner, &self.name)
    }
}

/// One declaration body inside a task list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step(pub Mapping);

impl Step {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().filter_map(|(k, v)| k.as_str().map(|k| (k, v)))
    }

    /// Steps nested in `block`/`rescue`/`always` sections
    pub fn nested(&self) -> impl Iterator<Item = Step> + '_ {
        ["block", "rescue", "always"]
            .into_iter()
            .filter_map(|key| self.get(key).and_then(Value::as_sequence))
            .flatten()
            .filter_map(|value| value.as_mapping().cloned().map(Step))
    }
}

/// Role name of a `roles:`/`dependencies:` entry or an `include_role` argument
///
/// Accepts `web`, `{role: web}` and `{name: web}`.
pub fn role_reference(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Mapping(mapping) => ["role", "name"]
            .iter()
            .find_map(|key| mapping.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// Precedence tier of a variable definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Step `vars`, `set_fact` and `register`
    Task,
    /// Play `vars` and `vars_files`
    Play,
    /// `roles/<r>/vars`
    RoleVars,
    /// `group_vars` and `host_vars`
    Inventory,
    /// `roles/<r>/defaults`
    Defaults,
}

#[derive(Debug, derive_new::new)]
pub struct VarFile {
    pub name: String,
    pub owner: Owner,
    pub scope: ScopeKind,
    pub vars: IndexMap<String, Value>,
}

impl VarFile {
    pub fn id(&self) -> NodeId {
        let kind = match self.scope {
            ScopeKind::Defaults => NodeKind::VarDefaults,
            _ => NodeKind::VarFile,
        };
        NodeId::owned(kind, &self.owner, &self.name)
    }
}

#[derive(Debug, derive_new::new)]
pub struct Template {
    pub name: String,
    pub owner: Owner,
    pub body: String,
}

impl Template {
    pub fn id(&self) -> NodeId {
        NodeId::owned(NodeKind::Template, &self.owner, &self.name)
    }
}

/// A playbook file; multiple plays are merged
#[derive(Debug, Default)]
pub struct Playbook {
    pub name: String,
    /// Literal role references
    pub roles: Vec<String>,
    pub vars: IndexMap<String, Value>,
    pub vars_files: Vec<String>,
    /// Literal `import_playbook` references
    pub imports: Vec<String>,
    pub steps: Vec<Step>,
}

impl Playbook {
    pub fn id(&self) -> NodeId {
        NodeId::playbook(&self.name)
    }
}

/// A logical variable: every place it is defined and used
#[derive(Debug, Clone, Serialize, derive_new::new)]
pub struct Variable {
    pub name: String,
    #[new(default)]
    pub definitions: Vec<Definition>,
    #[new(default)]
    pub usages: Vec<Usage>,
    #[new(default)]
    pub state: Option<VarState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Definition {
    pub source: NodeId,
    pub owner: Owner,
    pub scope: ScopeKind,
    pub name: String,
    /// Variables interpolated in the defined value
    pub references: Vec<String>,
    /// Only visible to the declaring task file and the templates it renders
    pub local: bool,
    /// At least one usage binds to this definition
    pub effective: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Usage {
    /// Node containing the interpolation
    pub node: NodeId,
    pub owner: Owner,
    /// Full accessor, e.g. `db.hosts[0]`
    pub accessor: String,
    /// Base variable name, e.g. `db`
    pub name: String,
    /// Set when the usage is part of another variable's value
    pub via: Option<String>,
    pub resolution: Option<Resolution>,
}

/// Which definition(s) a single usage binds to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Resolved(NodeId),
    Ambiguous(Vec<NodeId>),
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VarState {
    Resolved,
    Undefined,
    Ambiguous,
    Unused,
}

impl std::fmt::Display for VarState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarState::Resolved => f.write_str("resolved"),
            VarState::Undefined => f.write_str("undefined"),
            VarState::Ambiguous => f.write_str("ambiguous"),
            VarState::Unused => f.write_str("unused"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Includes,
    Contains,
    Renders,
    Uses,
    Defines,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    Resolved,
    /// Target does not exist in the project
    Unresolved,
    /// Closes an inclusion cycle
    BackEdge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub status: EdgeStatus,
    pub multiplicity: usize,
}

/// Insertion ordered edge collection
///
/// Adding an edge a second time increases its multiplicity.
#[derive(Debug, Default)]
pub struct EdgeSet {
    edges: IndexMap<(NodeId, NodeId, EdgeKind), Edge>,
}

impl EdgeSet {
    pub fn add(&mut self, source: NodeId, target: NodeId, kind: EdgeKind, status: EdgeStatus) {
        self.edges
            .entry((source.clone(), target.clone(), kind))
            .and_modify(|edge| edge.multiplicity += 1)
            .or_insert(Edge {
                source,
                target,
                kind,
                status,
                multiplicity: 1,
            });
    }

    pub fn get(&self, source: &NodeId, target: &NodeId, kind: EdgeKind) -> Option<&Edge> {
        self.edges.get(&(source.clone(), target.clone(), kind))
    }

    pub fn mark(&mut self, source: &NodeId, target: &NodeId, kind: EdgeKind, status: EdgeStatus) {
        if let Some(edge) = self.edges.get_mut(&(source.clone(), target.clone(), kind)) {
            edge.status = status;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// A reference that names nothing in the project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedRef {
    pub source: NodeId,
    pub kind: NodeKind,
    pub reference: String,
}
