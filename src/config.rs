//! Data-directory configuration.

use std::env;
use std::path::PathBuf;

/// Locations of the flow, profile, template and function directories.
///
/// Defaults derive from the base data path, which itself defaults to the
/// current directory. Every location can be overridden independently,
/// either programmatically or through the `DATA_PATH`, `FLOW_PATH`,
/// `PROFILE_PATH`, `TEMPLATE_PATH` and `FUNCTION_PATH` environment
/// variables; explicit overrides win over the environment.
#[derive(Debug, Clone, Default)]
pub struct Config {
    data_path: Option<PathBuf>,
    flow_path: Option<PathBuf>,
    profile_path: Option<PathBuf>,
    template_path: Option<PathBuf>,
    function_path: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    pub fn with_flow_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.flow_path = Some(path.into());
        self
    }

    pub fn with_profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }

    pub fn with_template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    pub fn with_function_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.function_path = Some(path.into());
        self
    }

    /// The base data path. Default values for the other paths are relative
    /// to this one.
    pub fn data_path(&self) -> PathBuf {
        self.data_path
            .clone()
            .or_else(|| env::var_os("DATA_PATH").map(PathBuf::from))
            .unwrap_or_else(|| {
                env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
            })
    }

    fn derived(&self, explicit: &Option<PathBuf>, var: &str, dir: &str) -> PathBuf {
        explicit
            .clone()
            .or_else(|| env::var_os(var).map(PathBuf::from))
            .unwrap_or_else(|| self.data_path().join(dir))
    }

    /// Directory containing flow definition files.
    pub fn flow_path(&self) -> PathBuf {
        self.derived(&self.flow_path, "FLOW_PATH", "flows")
    }

    /// Directory containing profile YAML files.
    pub fn profile_path(&self) -> PathBuf {
        self.derived(&self.profile_path, "PROFILE_PATH", "profiles")
    }

    /// Directory containing template files.
    pub fn template_path(&self) -> PathBuf {
        self.derived(&self.template_path, "TEMPLATE_PATH", "templates")
    }

    /// Location of user-supplied template functions, for hosts that load
    /// them from disk. The engine itself takes functions by registration.
    pub fn function_path(&self) -> PathBuf {
        self.derived(&self.function_path, "FUNCTION_PATH", "functions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_derive_from_data_path() {
        let config = Config::new().with_data_path("/data");

        assert_eq!(config.flow_path(), PathBuf::from("/data/flows"));
        assert_eq!(config.profile_path(), PathBuf::from("/data/profiles"));
        assert_eq!(config.template_path(), PathBuf::from("/data/templates"));
        assert_eq!(config.function_path(), PathBuf::from("/data/functions"));
    }

    #[test]
    fn test_explicit_path_is_independent_of_data_path() {
        let config = Config::new()
            .with_data_path("/data")
            .with_flow_path("/elsewhere/defs");

        assert_eq!(config.flow_path(), PathBuf::from("/elsewhere/defs"));
        assert_eq!(config.profile_path(), PathBuf::from("/data/profiles"));
    }

    #[test]
    fn test_environment_override() {
        env::set_var("FLOW_PATH", "/from-env/flows");
        let config = Config::new().with_data_path("/data");
        let from_env = config.flow_path();
        let explicit = config.with_flow_path("/explicit").flow_path();
        env::remove_var("FLOW_PATH");

        assert_eq!(from_env, PathBuf::from("/from-env/flows"));
        assert_eq!(explicit, PathBuf::from("/explicit"));
    }
}
