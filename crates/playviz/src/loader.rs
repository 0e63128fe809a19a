//! load a playbook directory into a [Project]
//!
//! Files are classified by their path relative to the playbook directory:
//!
//! | path                              | becomes                          |
//! |-----------------------------------|----------------------------------|
//! | `*.yml`                           | [Playbook] (if it contains plays)|
//! | `vars/<name>.yml`                 | play scoped [VarFile] of main    |
//! | `group_vars/**`, `host_vars/**`   | inventory [VarFile] of main      |
//! | `roles/<r>/tasks/<name>.yml`      | [Task]                           |
//! | `roles/<r>/vars/<name>.yml`       | role [VarFile]                   |
//! | `roles/<r>/defaults/<name>.yml`   | defaults [VarFile]               |
//! | `roles/<r>/meta/main.yml`         | role dependencies                |
//! | `roles/<r>/templates/**`          | [Template]                       |
//!
//! Everything else is ignored and never read.
use crate::model::{role_reference, Playbook, Project, ScopeKind, Step, Task, Template, VarFile};
use crate::node_id::Owner;
use crate::util::strip_yaml_extension;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

impl Project {
    pub fn load_dir(dir_path: &Path) -> Result<Self, LoadError> {
        let dir_path = dir_path.canonicalize()?;
        tracing::info!(path=%dir_path.display(), "loading playbook directory");

        let mut project = Project::default();
        let mut any_files_loaded = false;

        let walker = walkdir::WalkDir::new(&dir_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !entry.file_name().to_string_lossy().starts_with('.'));

        for dir_entry in walker {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = dir_entry.path().strip_prefix(&dir_path) else {
                continue;
            };
            let Some(layout) = classify(relative) else {
                tracing::trace!(path=%relative.display(), "ignored");
                continue;
            };

            let file_contents = match layout {
                // templates may be any file, including binary ones
                Layout::Template { .. } => {
                    match String::from_utf8(std::fs::read(dir_entry.path())?) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::warn!(path=%relative.display(), "template is not utf-8, skipping");
                            continue;
                        }
                    }
                }
                _ => std::fs::read_to_string(dir_entry.path())?,
            };

            if project.insert(relative, layout, &file_contents)? {
                any_files_loaded = true;
            }
        }

        if !any_files_loaded {
            return Err(LoadError::NoFilesFound);
        }

        Ok(project)
    }

    /// Classify and insert a single file
    ///
    /// Returns `false` when the path is not part of the playbook layout.
    pub fn insert_file(
        &mut self,
        relative_path: impl AsRef<Path>,
        contents: &str,
    ) -> Result<bool, LoadError> {
        let path = relative_path.as_ref();
        match classify(path) {
            Some(layout) => self.insert(path, layout, contents),
            None => Ok(false),
        }
    }

    fn insert(&mut self, path: &Path, layout: Layout, contents: &str) -> Result<bool, LoadError> {
        match layout {
            Layout::Template { owner, name } => {
                tracing::trace!(%name, ?owner, "template");
                self.role_mut(&owner)
                    .templates
                    .insert(name.clone(), Template::new(name, owner, contents.to_string()));
            }
            Layout::Tasks { owner, name } => {
                let steps = steps(path, parse(path, contents)?)?;
                self.role_mut(&owner)
                    .tasks
                    .insert(name.clone(), Task::new(name, owner, steps));
            }
            Layout::VarFile { owner, name, scope } => {
                let vars = vars(path, parse(path, contents)?)?;
                let varfile = VarFile::new(name, owner.clone(), scope, vars);
                self.role_mut(&owner).varfiles.insert(varfile.id(), varfile);
            }
            Layout::Meta { owner } => {
                let document = parse(path, contents)?;
                let dependencies = document
                    .get("dependencies")
                    .and_then(Value::as_sequence)
                    .into_iter()
                    .flatten()
                    .filter_map(role_reference);
                self.role_mut(&owner).dependencies.extend(dependencies);
            }
            Layout::Playbook { name } => {
                let Some(playbook) = playbook(&name, parse(path, contents)?) else {
                    tracing::debug!(path=%path.display(), "not a playbook, skipping");
                    return Ok(false);
                };
                self.playbooks.insert(name, playbook);
            }
        }

        tracing::debug!(path=%path.display(), "loaded");
        Ok(true)
    }
}

/// Place of a file in the playbook layout
#[derive(Debug, Clone, PartialEq)]
enum Layout {
    Template { owner: Owner, name: String },
    Tasks { owner: Owner, name: String },
    VarFile { owner: Owner, name: String, scope: ScopeKind },
    Meta { owner: Owner },
    Playbook { name: String },
}

/// Decide from the path alone whether and how a file is loaded
fn classify(path: &Path) -> Option<Layout> {
    let components: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let components: Vec<&str> = components.iter().map(String::as_str).collect();

    match components.as_slice() {
        ["roles", role, "templates", rest @ ..] if !rest.is_empty() => Some(Layout::Template {
            owner: Owner::Role(role.to_string()),
            name: rest.join("/"),
        }),
        ["roles", role, section, rest @ ..] if !rest.is_empty() && is_yaml(path) => {
            let owner = Owner::Role(role.to_string());
            let name = strip_yaml_extension(&rest.join("/")).to_string();
            match *section {
                "tasks" => Some(Layout::Tasks { owner, name }),
                "vars" => Some(Layout::VarFile {
                    owner,
                    name,
                    scope: ScopeKind::RoleVars,
                }),
                "defaults" => Some(Layout::VarFile {
                    owner,
                    name,
                    scope: ScopeKind::Defaults,
                }),
                "meta" if name == "main" => Some(Layout::Meta { owner }),
                _ => None,
            }
        }
        [section @ ("group_vars" | "host_vars" | "vars"), rest @ ..]
            if !rest.is_empty() && (is_yaml(path) || *section != "vars") =>
        {
            let scope = if *section == "vars" {
                ScopeKind::Play
            } else {
                ScopeKind::Inventory
            };
            Some(Layout::VarFile {
                owner: Owner::Main,
                name: strip_yaml_extension(&components.join("/")).to_string(),
                scope,
            })
        }
        [file] if is_yaml(path) => Some(Layout::Playbook {
            name: strip_yaml_extension(file).to_string(),
        }),
        _ => None,
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yml" | "yaml")
    )
}

fn parse(path: &Path, contents: &str) -> Result<Value, LoadError> {
    let is_empty = contents.lines().map(str::trim).all(|line| {
        line.is_empty() || line == "---" || line.starts_with('#')
    });
    if is_empty {
        return Ok(Value::Null);
    }

    serde_yaml::from_str(contents).map_err(|source| LoadError::YamlParseFailed {
        path: path.to_owned(),
        source,
    })
}

fn steps(path: &Path, document: Value) -> Result<Vec<Step>, LoadError> {
    match document {
        Value::Null => Ok(vec![]),
        Value::Sequence(sequence) => Ok(sequence
            .into_iter()
            .filter_map(|value| match value {
                Value::Mapping(mapping) => Some(Step(mapping)),
                _ => None,
            })
            .collect()),
        _ => Err(LoadError::UnexpectedShape {
            path: path.to_owned(),
            expected: "a list of tasks",
        }),
    }
}

fn vars(path: &Path, document: Value) -> Result<indexmap::IndexMap<String, Value>, LoadError> {
    match document {
        Value::Null => Ok(Default::default()),
        Value::Mapping(mapping) => Ok(mapping
            .into_iter()
            .filter_map(|(key, value)| key.as_str().map(|key| (key.to_string(), value)))
            .collect()),
        _ => Err(LoadError::UnexpectedShape {
            path: path.to_owned(),
            expected: "a mapping of variables",
        }),
    }
}

/// Merge all plays of a playbook file
///
/// Returns `None` if the document does not look like a list of plays.
fn playbook(name: &str, document: Value) -> Option<Playbook> {
    let Value::Sequence(plays) = document else {
        return None;
    };

    let plays: Vec<_> = plays
        .iter()
        .filter_map(Value::as_mapping)
        .filter(|play| {
            ["hosts", "roles", "tasks", "import_playbook"]
                .iter()
                .any(|key| play.contains_key(*key))
        })
        .collect();
    if plays.is_empty() {
        return None;
    }

    let mut playbook = Playbook {
        name: name.to_string(),
        ..Default::default()
    };

    for play in plays {
        let sequence = |key: &str| {
            play.get(key)
                .and_then(Value::as_sequence)
                .into_iter()
                .flatten()
        };

        playbook
            .roles
            .extend(sequence("roles").filter_map(role_reference));
        playbook.vars_files.extend(
            sequence("vars_files")
                .filter_map(Value::as_str)
                .map(str::to_string),
        );
        if let Some(Value::Mapping(vars)) = play.get("vars") {
            playbook.vars.extend(
                vars.iter()
                    .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), v.clone()))),
            );
        }
        if let Some(imported) = play.get("import_playbook").and_then(Value::as_str) {
            playbook.imports.push(imported.to_string());
        }
        for key in ["pre_tasks", "tasks", "post_tasks", "handlers"] {
            playbook.steps.extend(
                sequence(key)
                    .filter_map(Value::as_mapping)
                    .cloned()
                    .map(Step),
            );
        }
    }

    Some(playbook)
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No playbook files found in directory")]
    NoFilesFound,
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to walk directory")]
    WalkFailed(#[from] walkdir::Error),
    #[error("Unable to parse yaml file {path}")]
    YamlParseFailed {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("{path} must contain {expected}")]
    UnexpectedShape {
        path: PathBuf,
        expected: &'static str,
    },
}

/// Utility macro to create a [Project] from in-memory files
///
/// ```
/// # use playviz::project;
/// let project = project! {
///   "site.yml" => "- hosts: all\n  roles: [web]",
///   "roles/web/tasks/main.yml" => "- debug: msg='{{ greeting }}'"
/// };
/// assert_eq!(project.roles.len(), 1);
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use playviz::project;
/// project! { "roles/web/tasks/main.yml" => "key: [unclosed" };
/// ```
#[macro_export]
macro_rules! project {
    { $($path:expr => $contents:expr),+ $(,)? } => {{
        let mut project = $crate::model::Project::default();
        $(
            project.insert_file($path, $contents).expect("file must load");
        )+

        project
    }};
}
