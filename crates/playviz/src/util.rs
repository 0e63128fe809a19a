use serde_yaml::Value;

pub(crate) fn strip_yaml_extension(name: &str) -> &str {
    name.strip_suffix(".yml")
        .or_else(|| name.strip_suffix(".yaml"))
        .unwrap_or(name)
}

/// Last path segment (`roles/web` → `web`)
pub(crate) fn basename(reference: &str) -> &str {
    reference
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(reference)
}

/// Argument of a module that takes either free-form or mapping parameters
///
/// `template: src=a.j2 dest=/etc/a` and `template: { src: a.j2 }` both yield `a.j2` for `src`.
pub(crate) fn module_arg(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Mapping(mapping) => mapping.get(key).and_then(Value::as_str).map(str::to_string),
        Value::String(free_form) => free_form.split_whitespace().find_map(|pair| {
            pair.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|arg| arg.trim_matches(|c| c == '"' || c == '\'').to_string())
        }),
        _ => None,
    }
}

/// File argument of `include_tasks`, `include_vars` and friends
///
/// The free form is the first token (`include: other.yml foo=bar`).
pub(crate) fn file_arg(value: &Value) -> Option<String> {
    match value {
        Value::String(free_form) => free_form.split_whitespace().next().map(str::to_string),
        Value::Mapping(_) => module_arg(value, "file").or_else(|| module_arg(value, "name")),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn free_form_arguments() {
        let value = Value::String("src=nginx.conf.j2 dest='/etc/nginx.conf'".into());
        assert_eq!(module_arg(&value, "src").as_deref(), Some("nginx.conf.j2"));
        assert_eq!(module_arg(&value, "dest").as_deref(), Some("/etc/nginx.conf"));
        assert_eq!(module_arg(&value, "mode"), None);
    }

    #[test]
    fn mapping_arguments() {
        let value: Value = serde_yaml::from_str("{ src: a.j2, dest: /tmp/a }").unwrap();
        assert_eq!(module_arg(&value, "src").as_deref(), Some("a.j2"));

        let value: Value = serde_yaml::from_str("{ file: setup.yml }").unwrap();
        assert_eq!(file_arg(&value).as_deref(), Some("setup.yml"));
    }

    #[test]
    fn paths() {
        assert_eq!(basename("roles/web/"), "web");
        assert_eq!(basename("web"), "web");
        assert_eq!(strip_yaml_extension("setup.yaml"), "setup");
    }
}
