//! Configuration builder trait
//!
//! A common shape for configuration structs: start from defaults, layer
//! environment overrides on top, then validate the result.

use crate::Result;

/// Trait for configuration structures that support env overrides and validation
///
/// # Example
///
/// ```rust,ignore
/// use tooling::config::ConfigBuilder;
///
/// let mut config = MyConfig::from_file("loom.yaml")?;
/// config.apply_env("LOOM_")?;
/// config.validate()?;
/// ```
pub trait ConfigBuilder: Default + Clone {
    /// Validate the configuration
    ///
    /// Returns an error if a value is out of range or fields contradict
    /// each other.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Override fields from environment variables named `{PREFIX}{FIELD}`
    ///
    /// Variables that are not set leave the current value untouched.
    fn apply_env(&mut self, prefix: &str) -> Result<()>;

    /// Defaults, then environment overrides, then validation
    fn from_env_with_defaults(prefix: &str) -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(prefix)?;
        config.validate()?;
        Ok(config)
    }
}
