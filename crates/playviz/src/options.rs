//! what ends up in the diagram
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Options {
    pub show_tasks: bool,
    pub show_varfiles: bool,
    pub show_templates: bool,
    pub show_vars: bool,
    /// Defaults files (`roles/<r>/defaults/*`)
    pub show_vardefaults: bool,
    /// Defaults files named `main`; requires `show_vardefaults`
    pub show_main_defaults: bool,
    /// Edges from tasks and templates to the variables they use
    pub show_usage: bool,
    /// Matched against node ids (`role:web`)
    pub exclude_nodes: Option<Regex>,
    /// Matched against `<source> -> <target>`
    pub exclude_edges: Option<Regex>,
    pub layout: LayoutHints,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            show_tasks: true,
            show_varfiles: true,
            show_templates: true,
            show_vars: false,
            show_vardefaults: true,
            show_main_defaults: false,
            show_usage: true,
            exclude_nodes: None,
            exclude_edges: None,
            layout: LayoutHints::default(),
        }
    }
}

impl Options {
    /// Compile exclusion expressions
    ///
    /// An invalid expression is an error; it is never silently ignored.
    pub fn with_exclusions(
        mut self,
        exclude_nodes: Option<&str>,
        exclude_edges: Option<&str>,
    ) -> Result<Self, OptionsError> {
        self.exclude_nodes = exclude_nodes.map(|r| compile("exclude-nodes", r)).transpose()?;
        self.exclude_edges = exclude_edges.map(|r| compile("exclude-edges", r)).transpose()?;
        Ok(self)
    }
}

fn compile(option: &'static str, expression: &str) -> Result<Regex, OptionsError> {
    Regex::new(expression).map_err(|source| OptionsError::InvalidRegex { option, source })
}

/// Graph level attributes passed to the renderer as-is
#[derive(Debug, Clone, Serialize)]
pub struct LayoutHints {
    pub rankdir: String,
    pub ranksep: String,
}

impl Default for LayoutHints {
    fn default() -> Self {
        Self {
            rankdir: "LR".to_string(),
            ranksep: "2".to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum OptionsError {
    #[error("Invalid regular expression for --{option}")]
    InvalidRegex {
        option: &'static str,
        source: regex::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn invalid_regex_is_fatal() {
        let err = Options::default()
            .with_exclusions(Some("role:("), None)
            .expect_err("must error");
        assert!(matches!(
            err,
            OptionsError::InvalidRegex {
                option: "exclude-nodes",
                ..
            }
        ));
    }

    #[test]
    fn valid_regex() {
        let options = Options::default()
            .with_exclusions(Some("role:db.*"), Some("-> var:"))
            .unwrap();
        assert!(options.exclude_nodes.unwrap().is_match("role:db"));
        assert!(options.exclude_edges.unwrap().is_match("task:web/main -> var:x"));
    }
}
