//! `${name}` interpolation of execution variables into step payloads.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}").expect("placeholder pattern is valid")
});

/// Renders a JSON value as the string used for interpolation.
///
/// Strings are inserted without quotes; `null` becomes the empty string.
#[must_use]
pub fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Replaces `${name}` placeholders with values from `variables`.
///
/// Unknown names are left untouched so that shell syntax such as `${HOME}`
/// still reaches the shell.
#[must_use]
pub fn interpolate(input: &str, variables: &HashMap<String, serde_json::Value>) -> String {
    if !input.contains("${") {
        return input.to_string();
    }
    PLACEHOLDER
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            variables
                .get(name)
                .map_or_else(|| caps[0].to_string(), value_to_string)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("branch".to_string(), json!("main"));
        map.insert("build.number".to_string(), json!(42));
        map.insert("empty".to_string(), serde_json::Value::Null);
        map
    }

    #[test]
    fn test_interpolate_known_names() {
        let out = interpolate("deploy ${branch} #${build.number}", &vars());
        assert_eq!(out, "deploy main #42");
    }

    #[test]
    fn test_interpolate_leaves_unknown_names() {
        let out = interpolate("cd ${HOME} && echo ${ branch }", &vars());
        assert_eq!(out, "cd ${HOME} && echo main");
    }

    #[test]
    fn test_interpolate_null_is_empty() {
        assert_eq!(interpolate("[${empty}]", &vars()), "[]");
    }

    #[test]
    fn test_no_placeholder_fast_path() {
        assert_eq!(interpolate("plain $HOME", &vars()), "plain $HOME");
    }
}
