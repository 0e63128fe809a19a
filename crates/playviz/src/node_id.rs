//! canonical node identities
//!
//! Every entity of a [crate::model::Project] is addressed by a [NodeId]. The rendered form
//! (`role:web`, `task:web/main`, `var:db_host`) is used as graph node id and is what the
//! `--exclude-nodes` expression is matched against.
use serde::Serialize;
use std::fmt::Formatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Playbook,
    Role,
    Task,
    VarFile,
    VarDefaults,
    Template,
    Var,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Playbook => f.write_str("playbook"),
            NodeKind::Role => f.write_str("role"),
            NodeKind::Task => f.write_str("task"),
            NodeKind::VarFile => f.write_str("varfile"),
            NodeKind::VarDefaults => f.write_str("vardefaults"),
            NodeKind::Template => f.write_str("template"),
            NodeKind::Var => f.write_str("var"),
        }
    }
}

/// The role an entity belongs to
///
/// Files outside of `roles/` (playbooks, inventory vars, ...) belong to the top-level
/// pseudo-role [Owner::Main].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Owner {
    #[default]
    Main,
    Role(String),
}

impl Owner {
    pub fn role(&self) -> Option<&str> {
        match self {
            Owner::Main => None,
            Owner::Role(name) => Some(name),
        }
    }

    /// Qualify an entity name (`web` + `main` → `web/main`)
    pub fn qualify(&self, name: &str) -> String {
        match self {
            Owner::Main => name.to_string(),
            Owner::Role(role) => format!("{role}/{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_new::new)]
pub struct NodeId {
    pub kind: NodeKind,
    pub name: String,
}

impl NodeId {
    pub fn playbook(name: &str) -> Self {
        Self::new(NodeKind::Playbook, name.to_string())
    }

    pub fn role(name: &str) -> Self {
        Self::new(NodeKind::Role, name.to_string())
    }

    pub fn var(name: &str) -> Self {
        Self::new(NodeKind::Var, name.to_string())
    }

    /// Id of an entity owned by a role (or main)
    pub fn owned(kind: NodeKind, owner: &Owner, name: &str) -> Self {
        Self::new(kind, owner.qualify(name))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

impl Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
