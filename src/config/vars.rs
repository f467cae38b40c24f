//! Environment variable substitution for config files.
//!
//! - `$VAR` / `${VAR}` substitute the value; unset is an error
//! - `${VAR:-default}` falls back when VAR is unset or empty
//! - `${VAR-default}` falls back only when VAR is unset
//! - `$$` is a literal `$`

use regex::{Captures, Regex};
use std::sync::LazyLock;

static VAR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<escape>\$\$)
        |
        \$\{ (?P<braced>[A-Za-z_][A-Za-z0-9_]*) (?: (?P<op>:?-) (?P<default>[^}]*) )? \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("variable reference pattern is valid")
});

/// Substitute variables using `lookup` to resolve names.
///
/// All unresolved references are collected so a user sees every missing
/// variable in one pass.
pub fn interpolate_with<F>(input: &str, lookup: F) -> Result<String, Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut problems = Vec::new();

    let output = VAR_REFERENCE.replace_all(input, |caps: &Captures| {
        if caps.name("escape").is_some() {
            return "$".to_string();
        }

        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return caps[0].to_string();
        };
        let name = name.as_str();
        let op = caps.name("op").map(|m| m.as_str());
        let default = caps.name("default").map(|m| m.as_str());

        match (lookup(name), op) {
            (Some(value), _) if value.contains(['\n', '\r']) => {
                problems.push(format!("variable '{name}' contains a newline"));
                caps[0].to_string()
            }
            (Some(value), Some(":-")) if value.is_empty() => default.unwrap_or("").to_string(),
            (Some(value), _) => value,
            (None, Some(_)) => default.unwrap_or("").to_string(),
            (None, None) => {
                problems.push(format!("variable '{name}' is not set"));
                caps[0].to_string()
            }
        }
    });

    if problems.is_empty() {
        Ok(output.into_owned())
    } else {
        Err(problems)
    }
}

/// Substitute variables from the process environment.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    interpolate_with(input, |name| std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_bare_and_braced() {
        let lookup = env(&[("BUCKET", "lake"), ("REGION", "us-west-2")]);
        let out = interpolate_with("s3://$BUCKET/${REGION}/data", lookup).unwrap();
        assert_eq!(out, "s3://lake/us-west-2/data");
    }

    #[test]
    fn test_defaults() {
        let lookup = env(&[("EMPTY", "")]);
        assert_eq!(
            interpolate_with("${EMPTY:-fallback}", &lookup).unwrap(),
            "fallback"
        );
        assert_eq!(interpolate_with("${EMPTY-fallback}", &lookup).unwrap(), "");
        assert_eq!(
            interpolate_with("${UNSET-fallback}", &lookup).unwrap(),
            "fallback"
        );
    }

    #[test]
    fn test_escape() {
        let out = interpolate_with("cost: $$5", env(&[])).unwrap();
        assert_eq!(out, "cost: $5");
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        let errors = interpolate_with("$ONE and ${TWO}", env(&[])).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("ONE"));
        assert!(errors[1].contains("TWO"));
    }

    #[test]
    fn test_newline_rejected() {
        let errors = interpolate_with("$BAD", env(&[("BAD", "a\nb")])).unwrap_err();
        assert!(errors[0].contains("newline"));
    }
}
