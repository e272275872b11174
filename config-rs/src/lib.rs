//! config-rs/lib.rs
//! Shared configuration utilities for environment-driven settings
//! Provides typed lookups with defaults and credential list discovery

use std::env;
use std::str::FromStr;

/// Load variables from a `.env` file in the working directory or its parents.
///
/// A missing file is not an error; the process environment is used as-is.
pub fn load_dotenv() {
    match dotenv::dotenv() {
        Ok(path) => log::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => log::debug!("No .env file found, using process environment"),
        Err(e) => log::warn!("Failed to load .env file: {}", e),
    }
}

/// Get a typed value from the environment with a fallback
///
/// # Arguments
/// * `name` - The environment variable to read
/// * `default` - The value to use when the variable is unset or unparsable
///
/// # Returns
/// The parsed value, or `default`
pub fn get_env_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Invalid value for {}: {:?}, using default", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Get a string value from the environment with a fallback
///
/// # Arguments
/// * `name` - The environment variable to read
/// * `default` - The value to use when the variable is unset or blank
pub fn get_env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Collect `{prefix}_1` through `{prefix}_{max}` in index order
///
/// Unset and blank entries are skipped, so gaps in the numbering are allowed.
///
/// # Arguments
/// * `prefix` - Variable prefix, e.g. "GEMINI_API_KEY"
/// * `max` - Highest index to probe
pub fn get_numbered_env_vars(prefix: &str, max: usize) -> Vec<String> {
    (1..=max)
        .filter_map(|i| env::var(format!("{}_{}", prefix, i)).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Return the first non-blank value among `names`, in order
pub fn get_first_env_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}
