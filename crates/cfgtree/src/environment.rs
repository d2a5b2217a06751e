//! `${NAME}` expansion
//!
//! [EnvironmentVariables] is seeded from the process environment once and may be changed
//! afterwards. Expansion substitutes repeatedly so variables may refer to other variables.
//! A variable whose definition leads back to itself fails before it is substituted. Anything
//! still looking like `${NAME}` once substitution stops is an error as well.
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

const MAX_EXPANSION_CYCLES: usize = 100;

static VARIABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^{}]*)\}").unwrap());

#[derive(Debug, Clone, Default)]
pub struct EnvironmentVariables {
    values: HashMap<String, String>,
}

impl EnvironmentVariables {
    /// Empty set of variables, nothing from the process
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the process environment
    ///
    /// Variables with names or values that are not valid unicode are skipped.
    pub fn from_process() -> Self {
        let values = std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .collect();

        Self { values }
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub fn expand_text(&self, text: &str) -> Result<String, ExpandError> {
        let mut expanded = text.to_string();

        for _ in 0..MAX_EXPANSION_CYCLES {
            if let Some(name) = VARIABLE_REGEX
                .captures_iter(&expanded)
                .map(|captures| captures.extract::<1>().1[0])
                .find(|name| self.refers_to_itself(name))
            {
                return Err(ExpandError::Loop {
                    name: name.to_string(),
                });
            }

            let mut substitutions = 0usize;
            let next = VARIABLE_REGEX
                .replace_all(&expanded, |captures: &Captures| {
                    match self.values.get(&captures[1]) {
                        Some(value) => {
                            substitutions += 1;
                            value.clone()
                        }
                        None => captures[0].to_string(),
                    }
                })
                .into_owned();
            expanded = next;

            if substitutions == 0 {
                break;
            }
        }

        let Some(captures) = VARIABLE_REGEX.captures(&expanded) else {
            return Ok(expanded);
        };

        let name = captures[1].to_string();
        if self.values.contains_key(&name) {
            Err(ExpandError::Loop { name })
        } else {
            Err(ExpandError::UnknownVariable { name })
        }
    }
}

impl EnvironmentVariables {
    /// Whether the value of `name` leads back to `name`, directly or through other variables
    fn refers_to_itself(&self, name: &str) -> bool {
        let mut pending = vec![name];
        let mut seen = HashSet::new();

        while let Some(current) = pending.pop() {
            let Some(value) = self.values.get(current) else {
                continue;
            };

            for (_, [referenced]) in VARIABLE_REGEX.captures_iter(value).map(|c| c.extract()) {
                if referenced == name {
                    return true;
                }
                if seen.insert(referenced) {
                    pending.push(referenced);
                }
            }
        }

        false
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentVariables {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExpandError {
    #[error("unknown environment variable `{name}`")]
    UnknownVariable { name: String },
    #[error("environment variable `{name}` never settles, its definition loops")]
    Loop { name: String },
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn expands_known_variable() {
        let env = EnvironmentVariables::from_iter([("A", "x")]);
        assert_eq!(env.expand_text("${A}").unwrap(), "x");
        assert_eq!(env.expand_text("pre-${A}-${A}-post").unwrap(), "pre-x-x-post");
    }

    #[test]
    fn text_without_variables_is_untouched() {
        let env = EnvironmentVariables::new();
        assert_eq!(env.expand_text("plain $A {B}").unwrap(), "plain $A {B}");
    }

    #[test]
    fn expands_nested_definitions() {
        let env = EnvironmentVariables::from_iter([("A", "${B}/a"), ("B", "${C}/b"), ("C", "c")]);
        assert_eq!(env.expand_text("${A}").unwrap(), "c/b/a");
    }

    #[test]
    fn unknown_variable_fails() {
        let env = EnvironmentVariables::new();
        assert_eq!(
            env.expand_text("${A}"),
            Err(ExpandError::UnknownVariable {
                name: "A".to_string()
            })
        );
    }

    #[test]
    fn looping_definitions_fail() {
        let env = EnvironmentVariables::from_iter([("A", "${B}"), ("B", "${A}")]);
        assert!(matches!(
            env.expand_text("${A}"),
            Err(ExpandError::Loop { .. })
        ));

        let env = EnvironmentVariables::from_iter([("A", "${A}${A}")]);
        assert_eq!(
            env.expand_text("x ${A}"),
            Err(ExpandError::Loop {
                name: "A".to_string()
            })
        );

        let env = EnvironmentVariables::from_iter([("A", "more ${A}")]);
        assert!(matches!(
            env.expand_text("${A}"),
            Err(ExpandError::Loop { .. })
        ));
    }

    #[test]
    fn set_value_overrides() {
        let mut env = EnvironmentVariables::from_iter([("A", "x")]);
        env.set_value("A", "y");
        assert_eq!(env.value("A"), Some("y"));
        assert_eq!(env.expand_text("${A}").unwrap(), "y");
    }
}
