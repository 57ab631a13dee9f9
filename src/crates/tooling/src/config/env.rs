//! Environment variable loading utilities
//!
//! Helper functions for loading and parsing environment variables with
//! errors that name the offending variable.

use crate::{Result, ToolingError};
use std::env;
use std::str::FromStr;

/// Load an environment variable as a string
///
/// * `Ok(Some(value))` if the variable exists
/// * `Ok(None)` if it doesn't
/// * `Err` if it exists but is not valid UTF-8
pub fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ToolingError::InvalidConfig(format!(
            "Environment variable {} contains invalid UTF-8",
            key
        ))),
    }
}

/// Load and parse an environment variable
///
/// # Example
///
/// ```rust,ignore
/// let retries: Option<u32> = get_env_parse("LOOM_MAX_RETRIES")?;
/// ```
pub fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key)? {
        Some(val) => val.trim().parse::<T>().map(Some).map_err(|e| {
            ToolingError::InvalidConfig(format!(
                "Failed to parse environment variable {}: {}",
                key, e
            ))
        }),
        None => Ok(None),
    }
}

/// Load a boolean environment variable
///
/// Recognizes "true", "1", "yes", "on" and "false", "0", "no", "off"
/// (case-insensitive).
pub fn get_env_bool(key: &str) -> Result<Option<bool>> {
    let Some(val) = get_env(key)? else {
        return Ok(None);
    };

    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(ToolingError::InvalidConfig(format!(
            "Invalid boolean value for {}: {}",
            key, val
        ))),
    }
}

/// Build a prefixed environment variable name
///
/// ```rust
/// use tooling::config::build_env_key;
///
/// assert_eq!(build_env_key("LOOM_", "max_retries"), "LOOM_MAX_RETRIES");
/// ```
pub fn build_env_key(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_LOCK;
    use std::sync::PoisonError;

    #[test]
    fn test_get_env_missing() {
        let _env = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let result = get_env("TOOLING_TEST_MISSING_VAR_12345").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_get_env_parse() {
        let _env = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        env::set_var("TOOLING_TEST_NUMBER", " 42 ");
        let result: Option<i32> = get_env_parse("TOOLING_TEST_NUMBER").unwrap();
        env::remove_var("TOOLING_TEST_NUMBER");

        assert_eq!(result, Some(42));
    }

    #[test]
    fn test_get_env_parse_invalid() {
        let _env = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        env::set_var("TOOLING_TEST_INVALID_NUMBER", "not_a_number");
        let result: Result<Option<i32>> = get_env_parse("TOOLING_TEST_INVALID_NUMBER");
        env::remove_var("TOOLING_TEST_INVALID_NUMBER");

        let err = result.unwrap_err().to_string();
        assert!(err.contains("TOOLING_TEST_INVALID_NUMBER"));
    }

    #[test]
    fn test_get_env_bool() {
        let _env = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let test_cases = [
            ("true", true),
            ("TRUE", true),
            ("1", true),
            ("yes", true),
            ("on", true),
            ("false", false),
            ("0", false),
            ("no", false),
            ("Off", false),
        ];

        for (value, expected) in test_cases {
            env::set_var("TOOLING_TEST_BOOL", value);
            let result = get_env_bool("TOOLING_TEST_BOOL").unwrap();
            assert_eq!(result, Some(expected), "Failed for value: {}", value);
        }

        env::remove_var("TOOLING_TEST_BOOL");
    }

    #[test]
    fn test_get_env_bool_invalid() {
        let _env = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        env::set_var("TOOLING_TEST_BOOL_INVALID", "maybe");
        let result = get_env_bool("TOOLING_TEST_BOOL_INVALID");
        env::remove_var("TOOLING_TEST_BOOL_INVALID");

        assert!(result.is_err());
    }

    #[test]
    fn test_build_env_key() {
        assert_eq!(build_env_key("APP_", "port"), "APP_PORT");
        assert_eq!(build_env_key("", "debug"), "DEBUG");
    }
}
