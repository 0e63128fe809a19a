//! playviz cli interface

use clap::{ArgAction, Parser, ValueEnum};
use playviz::options::{LayoutHints, Options, OptionsError};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory containing playbooks and `roles/`
    pub playbook_dir: PathBuf,

    #[clap(flatten)]
    pub output: OutputArgs,

    #[clap(flatten)]
    pub toggles: Toggles,

    /// Remove nodes whose id (`role:web`) matches
    ///
    /// Edges touching a removed node are removed as well.
    #[clap(short = 'e', long = "exclude-nodes", value_name = "REGEX")]
    pub exclude_nodes: Option<String>,

    /// Remove edges whose description (`role:web -> task:web/main`) matches
    #[clap(short = 'E', long = "exclude-edges", value_name = "REGEX")]
    pub exclude_edges: Option<String>,

    /// Graphviz rankdir
    #[arg(long, default_value = "LR")]
    pub rankdir: String,

    /// Graphviz ranksep
    #[arg(long, default_value = "2")]
    pub ranksep: String,

    /// Increase log verbosity, can be repeated
    ///
    /// Ignored when PLAYVIZ_LOG is set.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn options(&self) -> Result<Options, OptionsError> {
        let toggles = &self.toggles;
        let defaults = Options::default();
        let options = Options {
            show_tasks: toggle(toggles.tasks, toggles.no_tasks, defaults.show_tasks),
            show_varfiles: toggle(toggles.varfiles, toggles.no_varfiles, defaults.show_varfiles),
            show_templates: toggle(
                toggles.templates,
                toggles.no_templates,
                defaults.show_templates,
            ),
            show_vars: toggle(toggles.vars, toggles.no_vars, defaults.show_vars),
            show_vardefaults: toggle(
                toggles.vardefaults,
                toggles.no_vardefaults,
                defaults.show_vardefaults,
            ),
            show_main_defaults: toggle(
                toggles.main_defaults,
                toggles.no_main_defaults,
                defaults.show_main_defaults,
            ),
            show_usage: !toggles.no_usage,
            layout: LayoutHints {
                rankdir: self.rankdir.clone(),
                ranksep: self.ranksep.clone(),
            },
            ..defaults
        };

        options.with_exclusions(self.exclude_nodes.as_deref(), self.exclude_edges.as_deref())
    }
}

fn toggle(on: bool, off: bool, default: bool) -> bool {
    match (on, off) {
        (true, _) => true,
        (_, true) => false,
        _ => default,
    }
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,

    /// Write to file instead of stdout
    #[clap(short = 'o', long = "output")]
    pub file: Option<PathBuf>,

    /// Page title of the html output
    #[arg(long, default_value = "Ansible dependencies")]
    pub title: String,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Dot,
    /// Standalone page laying out the diagram in the browser
    Html,
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Dot => f.write_str("dot"),
            OutputFormat::Html => f.write_str("html"),
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

/// What to include in the diagram; the last of `--x`/`--no-x` wins
#[derive(Parser, Debug)]
pub struct Toggles {
    /// Show task files (default)
    #[arg(long, overrides_with = "no_tasks")]
    pub tasks: bool,
    #[arg(long, overrides_with = "tasks", hide = true)]
    pub no_tasks: bool,

    /// Show templates (default)
    #[arg(long, overrides_with = "no_templates")]
    pub templates: bool,
    #[arg(long, overrides_with = "templates", hide = true)]
    pub no_templates: bool,

    /// Show vars files (default)
    #[arg(long, overrides_with = "no_varfiles")]
    pub varfiles: bool,
    #[arg(long, overrides_with = "varfiles", hide = true)]
    pub no_varfiles: bool,

    /// Show defaults files (default)
    #[arg(long, overrides_with = "no_vardefaults")]
    pub vardefaults: bool,
    #[arg(long, overrides_with = "vardefaults", hide = true)]
    pub no_vardefaults: bool,

    /// Show defaults files named `main`
    #[arg(long, overrides_with = "no_main_defaults")]
    pub main_defaults: bool,
    #[arg(long, overrides_with = "main_defaults", hide = true)]
    pub no_main_defaults: bool,

    /// Show variables
    #[arg(long, overrides_with = "no_vars")]
    pub vars: bool,
    #[arg(long, overrides_with = "vars", hide = true)]
    pub no_vars: bool,

    /// Hide edges to the variables a task or template uses
    #[arg(long)]
    pub no_usage: bool,
}
