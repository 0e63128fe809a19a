//! find variable definitions and usages
//!
//! Usages are found by pattern matching, not by parsing the template language:
//!
//! - `{{ expression }}` and `{% statement %}` sites in step values and template bodies
//! - bare expressions in `when`, `failed_when`, `changed_when`, `until` and `with_*`
//!
//! Inside an expression every identifier chain (`db.hosts[0].name`) is an accessor whose first
//! segment is the variable name. Filter names, attribute segments, function calls, keyword
//! arguments, keywords, tests (`x is defined`) and names bound by `for`/`set`/`macro` are skipped.
//! A method call (`users.keys()`) is a usage of the object it is called on. Unbalanced markers
//! never match and are ignored.
//!
//! The `var` argument of `debug` is a bare expression as well.
//!
//! Definitions come from vars files, play `vars`, step `vars`, `set_fact` and `register`. Step
//! `vars` are local to the task file declaring them.
use crate::model::{
    Definition, EdgeKind, EdgeStatus, Project, ScopeKind, Step, Usage, Variable,
};
use crate::node_id::{NodeId, Owner};
use crate::util::module_arg;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;
use std::collections::HashSet;

static INTERPOLATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}|\{%(.*?)%\}").expect("valid regex"));

static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'[^']*'|"[^"]*""#).expect("valid regex"));

static ACCESSOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<prefix>[|.]\s*)?\b(?P<accessor>[A-Za-z_]\w*(?:\s*\.\s*[A-Za-z_]\w*|\s*\[[^\[\]]*\])*)(?P<call>\s*\()?(?P<assign>\s*==?)?",
    )
    .expect("valid regex")
});

static INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("valid regex"));

const KEYWORDS: &[&str] = &[
    "and", "as", "block", "call", "elif", "else", "endblock", "endcall", "endfilter", "endfor",
    "endif", "endmacro", "endraw", "endset", "endwith", "extends", "false", "False", "filter",
    "from", "if", "import", "in", "include", "is", "none", "None", "not", "or", "raw", "recursive",
    "true", "True", "with",
];

/// Variables provided by the automation tool itself
const MAGIC_VARIABLES: &[&str] = &[
    "environment",
    "group_names",
    "groups",
    "hostvars",
    "inventory_dir",
    "inventory_file",
    "inventory_hostname",
    "inventory_hostname_short",
    "item",
    "loop",
    "omit",
    "play_hosts",
    "playbook_dir",
    "role_name",
    "role_path",
    "vars",
];

/// Step keys holding an expression without `{{ }}`
const BARE_EXPRESSION_KEYS: &[&str] = &["when", "failed_when", "changed_when", "until"];

/// Step keys that are scanned as definitions or nested steps instead of usages
const NON_USAGE_KEYS: &[&str] = &["vars", "set_fact", "register", "block", "rescue", "always"];

/// A variable access found in some text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    /// The accessor without whitespace, e.g. `db.hosts[0]`
    pub expression: String,
    /// First path segment, e.g. `db`
    pub name: String,
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn find_variables(project: &mut Project) {
    let mut finder = VarFinder::default();
    finder.scan(project);

    let VarFinder {
        mut variables,
        edges,
    } = finder;
    variables.sort_keys();

    tracing::info!(
        variables = variables.len(),
        definitions = variables.values().map(|v| v.definitions.len()).sum::<usize>(),
        usages = variables.values().map(|v| v.usages.len()).sum::<usize>(),
        "variables found"
    );

    for (source, target, kind) in edges {
        project.edges.add(source, target, kind, EdgeStatus::Resolved);
    }
    project.variables = variables;
}

#[derive(Default)]
struct VarFinder {
    variables: IndexMap<String, Variable>,
    edges: Vec<(NodeId, NodeId, EdgeKind)>,
}

impl VarFinder {
    fn scan(&mut self, project: &Project) {
        for varfile in project.varfiles() {
            let source = varfile.id();
            for (name, value) in &varfile.vars {
                self.define(&source, &varfile.owner, varfile.scope, name, value);
            }
        }

        for playbook in project.playbooks.values() {
            let source = playbook.id();
            for (name, value) in &playbook.vars {
                self.define(&source, &Owner::Main, ScopeKind::Play, name, value);
            }
            for step in &playbook.steps {
                self.scan_step(&source, &Owner::Main, step);
            }
        }

        for role in project.all_roles() {
            for task in role.tasks.values() {
                let source = task.id();
                for step in &task.steps {
                    self.scan_step(&source, &task.owner, step);
                }
            }

            for template in role.templates.values() {
                let source = template.id();
                for accessor in find_usages(&template.body) {
                    self.use_variable(&source, &template.owner, accessor, None);
                }
            }
        }
    }

    fn scan_step(&mut self, source: &NodeId, owner: &Owner, step: &Step) {
        if let Some(Value::Mapping(vars)) = step.get("vars") {
            for (name, value) in vars.iter().filter_map(|(k, v)| k.as_str().map(|k| (k, v))) {
                self.define(source, owner, ScopeKind::Task, name, value);
                self.mark_local(name);
            }
        }

        if let Some(Value::Mapping(facts)) = step.get("set_fact") {
            for (name, value) in facts.iter().filter_map(|(k, v)| k.as_str().map(|k| (k, v))) {
                if name != "cacheable" {
                    self.define(source, owner, ScopeKind::Task, name, value);
                }
            }
        }

        if let Some(name) = step.get_str("register") {
            self.define(source, owner, ScopeKind::Task, name, &Value::Null);
        }

        for (key, value) in step.entries() {
            if NON_USAGE_KEYS.contains(&key) {
                continue;
            }

            let bare = BARE_EXPRESSION_KEYS.contains(&key) || key.starts_with("with_");
            let mut accessors = value_usages(value, bare);
            if key == "debug" {
                if let Some(var) = module_arg(value, "var").filter(|var| !var.contains("{{")) {
                    scan_expression(&var, &mut HashSet::new(), &mut accessors);
                }
            }
            for accessor in accessors {
                self.use_variable(source, owner, accessor, None);
            }
        }

        for nested in step.nested() {
            self.scan_step(source, owner, &nested);
        }
    }

    fn define(&mut self, source: &NodeId, owner: &Owner, scope: ScopeKind, name: &str, value: &Value) {
        let accessors = value_usages(value, false);
        let mut references: Vec<String> = vec![];
        for accessor in &accessors {
            if !references.contains(&accessor.name) {
                references.push(accessor.name.clone());
            }
        }

        tracing::trace!(%source, name, ?scope, "definition");
        self.variable(name).definitions.push(Definition {
            source: source.clone(),
            owner: owner.clone(),
            scope,
            name: name.to_string(),
            references,
            local: false,
            effective: false,
        });
        self.edges
            .push((source.clone(), NodeId::var(name), EdgeKind::Defines));

        for accessor in accessors {
            self.use_variable(source, owner, accessor, Some(name));
        }
    }

    /// Restrict the latest definition of `name` to the node declaring it
    fn mark_local(&mut self, name: &str) {
        if let Some(definition) = self.variable(name).definitions.last_mut() {
            definition.local = true;
        }
    }

    fn use_variable(&mut self, node: &NodeId, owner: &Owner, accessor: Accessor, via: Option<&str>) {
        tracing::trace!(%node, accessor = %accessor.expression, "usage");

        let from = match via {
            Some(defined) => NodeId::var(defined),
            None => node.clone(),
        };
        self.edges
            .push((from, NodeId::var(&accessor.name), EdgeKind::Uses));

        self.variable(&accessor.name).usages.push(Usage {
            node: node.clone(),
            owner: owner.clone(),
            accessor: accessor.expression,
            name: accessor.name,
            via: via.map(str::to_string),
            resolution: None,
        });
    }

    fn variable(&mut self, name: &str) -> &mut Variable {
        self.variables
            .entry(name.to_string())
            .or_insert_with(|| Variable::new(name.to_string()))
    }
}

/// Usages in a yaml value, recursing into sequences and mappings
fn value_usages(value: &Value, bare: bool) -> Vec<Accessor> {
    let mut found = vec![];
    collect_value_usages(value, bare, &mut found);
    found
}

fn collect_value_usages(value: &Value, bare: bool, found: &mut Vec<Accessor>) {
    match value {
        Value::String(text) if bare && !text.contains("{{") => {
            scan_expression(text, &mut HashSet::new(), found)
        }
        Value::String(text) => found.extend(find_usages(text)),
        Value::Sequence(sequence) => {
            for element in sequence {
                collect_value_usages(element, bare, found);
            }
        }
        Value::Mapping(mapping) => {
            for element in mapping.values() {
                collect_value_usages(element, false, found);
            }
        }
        Value::Tagged(tagged) => collect_value_usages(&tagged.value, bare, found),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// All variable accesses inside `{{ }}` and `{% %}` markers of a text
///
/// Names bound by `{% for %}`, `{% set %}` and `{% macro %}` are local to the text and skipped
/// from the point they are bound.
pub fn find_usages(text: &str) -> Vec<Accessor> {
    let mut locals = HashSet::new();
    let mut found = vec![];

    for captures in INTERPOLATION.captures_iter(text) {
        let Some(inner) = captures.get(1).or_else(|| captures.get(2)) else {
            continue;
        };
        let expression = inner.as_str().trim_matches(|c| c == '-' || c == '+');
        scan_expression(expression, &mut locals, &mut found);
    }

    found
}

#[derive(Clone, Copy, PartialEq)]
enum Binding {
    None,
    /// after `set`/`macro`: bind the next name
    Next,
    /// after `for`: bind names until `in`
    UntilIn,
}

fn scan_expression(expression: &str, locals: &mut HashSet<String>, found: &mut Vec<Accessor>) {
    // literals keep their length so match offsets are valid in the original expression
    let masked = STRING_LITERAL.replace_all(expression, |captures: &regex::Captures| {
        let literal = &captures[0];
        let quote = &literal[..1];
        format!("{quote}{}{quote}", "#".repeat(literal.len() - 2))
    });
    let mut binding = Binding::None;
    let mut after_is = false;

    for captures in ACCESSOR.captures_iter(&masked) {
        let Some(matched) = captures.name("accessor") else {
            continue;
        };
        let mut accessor = compact(&expression[matched.range()]);

        for index in INDEX.captures_iter(matched.as_str()) {
            scan_expression(&index[1], locals, found);
        }

        // filters and methods of a previous value
        if captures.name("prefix").is_some() {
            continue;
        }
        if captures.name("call").is_some() {
            // a call on a bare name is a global function
            let Some(receiver) = method_receiver(&accessor).map(str::to_string) else {
                continue;
            };
            accessor = receiver;
        }
        let name = base_name(&accessor);

        match (name, binding) {
            ("in", _) => {
                binding = Binding::None;
                continue;
            }
            ("for", _) => {
                binding = Binding::UntilIn;
                continue;
            }
            ("set" | "macro", _) => {
                binding = Binding::Next;
                continue;
            }
            (_, Binding::Next) => {
                locals.insert(name.to_string());
                binding = Binding::None;
                continue;
            }
            (_, Binding::UntilIn) => {
                locals.insert(name.to_string());
                continue;
            }
            _ => {}
        }

        // keyword argument
        let assign = captures.name("assign").map(|assign| assign.as_str().trim());
        if assign == Some("=") {
            continue;
        }

        if name == "is" {
            after_is = true;
            continue;
        }
        if after_is {
            // `is not defined`
            after_is = name == "not";
            continue;
        }

        let skip = KEYWORDS.contains(&name)
            || MAGIC_VARIABLES.contains(&name)
            || name.starts_with("ansible_")
            || locals.contains(name);
        if skip {
            continue;
        }

        found.push(Accessor {
            name: name.to_string(),
            expression: accessor.clone(),
        });
    }
}

/// Remove whitespace outside of string literals
fn compact(accessor: &str) -> String {
    let mut quote = None;
    accessor
        .chars()
        .filter(|c| {
            match quote {
                Some(q) if *c == q => quote = None,
                Some(_) => {}
                None if *c == '\'' || *c == '"' => quote = Some(*c),
                None => {}
            }
            quote.is_some() || !c.is_whitespace()
        })
        .collect()
}

/// `users.keys` → `users`; a single segment is a function, not a method
fn method_receiver(accessor: &str) -> Option<&str> {
    let (receiver, method) = accessor.rsplit_once('.')?;
    let is_identifier = method.chars().all(|c| c.is_alphanumeric() || c == '_');
    is_identifier.then_some(receiver)
}

fn base_name(accessor: &str) -> &str {
    accessor
        .split(|c| c == '.' || c == '[')
        .next()
        .unwrap_or(accessor)
}
