//! Typed environment variable lookups
//!
//! Every config loader in the workspace reads `std::env` through these helpers so
//! that a malformed value is reported with the variable name instead of being
//! silently replaced by a default.

use crate::error::{CommonError, Result};
use std::str::FromStr;

/// Value of `var`, or `default` when unset or empty.
pub fn env_or(var: &str, default: &str) -> String {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

/// Value of `var`, or `None` when unset or empty.
pub fn env_opt(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Value of `var`; fails with [`CommonError::MissingVar`] when unset or empty.
pub fn env_required(var: &str) -> Result<String> {
    env_opt(var).ok_or_else(|| CommonError::MissingVar(var.to_string()))
}

/// Parse `var` as `T`, falling back to `default` when unset.
///
/// A value that is present but does not parse is an error.
pub fn env_parse<T>(var: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| CommonError::InvalidVar {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Comma separated list; blank entries are dropped.
pub fn env_list(var: &str) -> Vec<String> {
    env_opt(var)
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_or_falls_back_on_empty() {
        std::env::set_var("PARTLOAD_TEST_EMPTY", "  ");
        assert_eq!(env_or("PARTLOAD_TEST_EMPTY", "fallback"), "fallback");
        std::env::remove_var("PARTLOAD_TEST_EMPTY");
    }

    #[test]
    #[serial]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("PARTLOAD_TEST_NUM", "ten");
        let err = env_parse::<u64>("PARTLOAD_TEST_NUM", 1).unwrap_err();
        assert!(err.to_string().contains("PARTLOAD_TEST_NUM"));

        std::env::set_var("PARTLOAD_TEST_NUM", " 10 ");
        assert_eq!(env_parse::<u64>("PARTLOAD_TEST_NUM", 1).unwrap(), 10);

        std::env::remove_var("PARTLOAD_TEST_NUM");
        assert_eq!(env_parse::<u64>("PARTLOAD_TEST_NUM", 1).unwrap(), 1);
    }

    #[test]
    #[serial]
    fn test_env_required_and_list() {
        std::env::remove_var("PARTLOAD_TEST_REQ");
        assert!(matches!(
            env_required("PARTLOAD_TEST_REQ"),
            Err(CommonError::MissingVar(_))
        ));

        std::env::set_var("PARTLOAD_TEST_LIST", "a, b,,c ");
        assert_eq!(env_list("PARTLOAD_TEST_LIST"), vec!["a", "b", "c"]);
        std::env::remove_var("PARTLOAD_TEST_LIST");
        assert!(env_list("PARTLOAD_TEST_LIST").is_empty());
    }
}
