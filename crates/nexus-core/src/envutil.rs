//! Shared `${VAR}` environment-variable expansion, used by config loading
//! wherever a layered default/file/env value needs to reference the
//! process environment.

use regex::Regex;
use std::sync::OnceLock;

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").unwrap())
}

/// Replaces every `${VAR}` occurrence in `value` with the environment
/// variable's value, leaving the placeholder untouched if the variable is
/// unset.
pub fn expand_env_vars(value: &str) -> String {
    pattern()
        .replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_var() {
        std::env::set_var("NEXUS_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("value=${NEXUS_TEST_VAR}"), "value=hello");
    }

    #[test]
    fn leaves_unknown_var_untouched() {
        std::env::remove_var("NEXUS_TEST_VAR_MISSING");
        assert_eq!(
            expand_env_vars("value=${NEXUS_TEST_VAR_MISSING}"),
            "value=${NEXUS_TEST_VAR_MISSING}"
        );
    }

    #[test]
    fn passes_through_plain_string() {
        assert_eq!(expand_env_vars("no vars here"), "no vars here");
    }
}
