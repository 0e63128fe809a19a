//! # playviz - playbook dependency diagrams
//!
//! Statically analyzes a directory of Ansible playbooks and roles and draws what depends on what.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `playviz` works internally.
//!
//! ### Terms
//!
//! - a `playbook` is a top-level `*.yml` file containing plays (`hosts`, `roles`, `tasks`, ...)
//! - a `role` is a directory under `roles/`:
//!   - `tasks/*.yml`: a `task` is one task *file*, a list of steps
//!   - `vars/*.yml` and `defaults/*.yml`: variable files
//!   - `templates/**`: jinja templates
//!   - `meta/main.yml`: role dependencies
//! - files outside of `roles/` (`group_vars/`, `host_vars/`, `vars/`, playbooks) belong to a
//!   pseudo-role called `main`
//!
//! Every entity is addressed by a [node_id::NodeId], rendered as `<kind>:<name>`:
//!
//! | **file**                         | **node id**              |
//! |----------------------------------|--------------------------|
//! | `site.yml`                       | `playbook:site`          |
//! | `roles/web/`                     | `role:web`               |
//! | `roles/web/tasks/main.yml`       | `task:web/main`          |
//! | `roles/web/vars/main.yml`        | `varfile:web/main`       |
//! | `roles/web/defaults/main.yml`    | `vardefaults:web/main`   |
//! | `roles/web/templates/app.j2`     | `template:web/app.j2`    |
//! | `group_vars/all.yml`             | `varfile:group_vars/all` |
//! | `{{ db_host }}`                  | `var:db_host`            |
//!
//! ### Loading files
//!
//! see [model::Project::load_dir]
//!
//! Files are classified by their path before they are read, then parsed with [serde_yaml]. Files
//! outside the layout are never opened, a template that is not utf-8 is skipped. A file
//! with the wrong shape (e.g. a vars file that is not a mapping) aborts loading. Tests build projects
//! from in-memory files via the [project!] macro.
//!
//! ### Stages
//!
//! The loaded [model::Project] is annotated in place by three stages (see [pipeline::analyze]):
//!
//! 1. [resolver]: role, task, template and vars file references become edges. References that name
//!    nothing are recorded, never fatal. Role inclusions form a [role_graph::RoleGraph]; cycles in it
//!    are detected and the closing edge is marked.
//! 2. [varfinder]: `{{ }}` and `{% %}` expressions are scanned for variable accessors; vars files,
//!    play/step `vars`, `set_fact` and `register` are collected as definitions.
//! 3. [scoper]: every usage is bound to the definitions visible from where it occurs, using the
//!    precedence ladder Task > Play > RoleVars > Inventory > Defaults.
//!
//! Visibility is static: a conditional include counts as always taken.
//!
//! ### Output
//!
//! [grapher::GraphBuilder] projects the project into a [graph::Graph] according to
//! [options::Options]. The graph is serialized via [serde] or rendered with [render::dot] or
//! [render::html].
//!
pub mod graph;
pub mod grapher;
pub mod loader;
pub mod model;
pub mod node_id;
pub mod options;
pub mod pipeline;
pub mod render;
pub mod resolver;
pub mod role_graph;
pub mod scoper;
mod util;
pub mod varfinder;
