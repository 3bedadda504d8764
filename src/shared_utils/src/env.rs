//! Process-environment helpers shared by the workspace binaries.

/// Reads an optional environment variable.
///
/// Unset and blank (whitespace only) values are both reported as `None`, so a
/// `FOO=` line in a `.env` file behaves like an absent variable.
pub fn get_env_var_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads a comma-separated list; entries are trimmed and blanks dropped.
///
/// Unset variables yield an empty list.
pub fn get_env_list(name: &str) -> Vec<String> {
    get_env_var_opt(name)
        .map(|raw| split_list(&raw))
        .unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_drop_blank_entries() {
        assert_eq!(
            split_list(" http://a.local:3000, ,https://b.local ,"),
            vec!["http://a.local:3000".to_string(), "https://b.local".to_string()]
        );
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn unset_vars_are_absent() {
        assert!(get_env_var_opt("SHARED_UTILS_SURELY_UNSET_VAR").is_none());
        assert!(get_env_list("SHARED_UTILS_SURELY_UNSET_VAR").is_empty());
    }
}
