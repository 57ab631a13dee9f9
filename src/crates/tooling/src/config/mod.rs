//! Configuration management utilities
//!
//! This module provides the patterns configuration structs in the workspace
//! share:
//!
//! - `ConfigBuilder` trait: defaults, environment overrides, validation
//! - Environment variable loading with typed parsing and clear errors
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::config::{build_env_key, get_env_parse, ConfigBuilder};
//!
//! #[derive(Clone, Default)]
//! struct LimiterConfig {
//!     pub limit: usize,
//! }
//!
//! impl ConfigBuilder for LimiterConfig {
//!     fn validate(&self) -> tooling::Result<()> {
//!         if self.limit == 0 {
//!             return Err(tooling::ToolingError::InvalidConfig(
//!                 "limit must be non-zero".into(),
//!             ));
//!         }
//!         Ok(())
//!     }
//!
//!     fn apply_env(&mut self, prefix: &str) -> tooling::Result<()> {
//!         if let Some(limit) = get_env_parse(&build_env_key(prefix, "limit"))? {
//!             self.limit = limit;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let config = LimiterConfig::from_env_with_defaults("LOOM_")?;
//! ```

mod builder;
mod env;

pub use builder::ConfigBuilder;
pub use env::{build_env_key, get_env, get_env_bool, get_env_parse};

/// Held by tests that read or write process environment variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
