// src/config.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::models::{EngineError, EngineVariant};

pub const DEFAULT_ACCEPTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "tiff", "bmp"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Listen address of the HTTP server
    pub server: ServerConfig,
    /// Directory under which per-request workspaces are created
    pub workspace_root: PathBuf,
    /// Image extensions accepted for upload, without the leading dot
    pub accepted_extensions: Vec<String>,
    /// Hard wall-clock bound for one engine run
    pub engine_timeout_secs: u64,
    /// Idle time after which the janitor deletes a workspace
    pub session_timeout_secs: u64,
    /// Pause between two janitor sweeps
    pub sweep_interval_secs: u64,
    /// Delete a workspace as soon as its result has been opened for streaming
    pub cleanup_on_success: bool,
    /// Largest accepted upload body
    pub max_upload_bytes: usize,
    /// Executable and arguments for each engine variant
    pub engines: HashMap<EngineVariant, EngineSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EngineSpec {
    /// Executable name (looked up on PATH) or path
    pub executable: String,
    /// Flags placed before the input image path
    #[serde(default)]
    pub args: Vec<String>,
    /// Extension of the notation file the engine writes
    #[serde(default = "default_primary_extension")]
    pub primary_extension: String,
    /// Extensions of rendered-page images the engine may also write
    #[serde(default)]
    pub auxiliary_extensions: Vec<String>,
}

fn default_primary_extension() -> String {
    "musicxml".to_string()
}

impl EngineSpec {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            primary_extension: default_primary_extension(),
            auxiliary_extensions: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auxiliary<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auxiliary_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            workspace_root: std::env::temp_dir().join("scoregate"),
            accepted_extensions: DEFAULT_ACCEPTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            engine_timeout_secs: 600,
            session_timeout_secs: 3600,
            sweep_interval_secs: 300,
            cleanup_on_success: false,
            max_upload_bytes: 32 * 1024 * 1024,
            engines: default_engines(),
        }
    }
}

pub fn default_engines() -> HashMap<EngineVariant, EngineSpec> {
    let mut engines = HashMap::new();
    engines.insert(
        EngineVariant::Fast,
        EngineSpec::new("oemer").with_auxiliary(["png"]),
    );
    engines.insert(
        EngineVariant::Accurate,
        EngineSpec::new("oemer").with_args(["--use-tf"]).with_auxiliary(["png"]),
    );
    engines.insert(EngineVariant::Alternate, EngineSpec::new("homr"));
    engines
}

impl GatewayConfig {
    /// Loads the config from a YAML file (or defaults when no path is given)
    /// and applies `SCOREGATE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let mut config = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|e| {
                    EngineError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_yaml(&yaml)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, EngineError> {
        // An empty document deserializes to unit, not to an empty mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| {
            EngineError::Config(format!("Failed to parse YAML: {}", e))
        })
    }

    pub fn to_yaml(&self) -> Result<String, EngineError> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn apply_env_overrides(&mut self) -> Result<(), EngineError> {
        if let Ok(host) = std::env::var("SCOREGATE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_number("SCOREGATE_PORT")? {
            self.server.port = port;
        }
        if let Ok(root) = std::env::var("SCOREGATE_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(root);
        }
        if let Some(secs) = env_number("SCOREGATE_ENGINE_TIMEOUT")? {
            self.engine_timeout_secs = secs;
        }
        if let Some(secs) = env_number("SCOREGATE_SESSION_TIMEOUT")? {
            self.session_timeout_secs = secs;
        }
        if let Some(secs) = env_number("SCOREGATE_SWEEP_INTERVAL")? {
            self.sweep_interval_secs = secs;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, secs) in [
            ("engine_timeout_secs", self.engine_timeout_secs),
            ("session_timeout_secs", self.session_timeout_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ] {
            if secs == 0 {
                return Err(EngineError::Config(format!("{} must be greater than zero", name)));
            }
        }

        // A workspace is not touched while its engine runs.
        if self.engine_timeout_secs >= self.session_timeout_secs {
            return Err(EngineError::Config(format!(
                "engine_timeout_secs ({}) must be shorter than session_timeout_secs ({})",
                self.engine_timeout_secs, self.session_timeout_secs
            )));
        }

        if self.accepted_extensions.is_empty() {
            return Err(EngineError::Config("accepted_extensions must not be empty".into()));
        }
        for ext in &self.accepted_extensions {
            validate_extension(ext)?;
        }

        for variant in EngineVariant::ALL {
            let spec = self.engines.get(&variant).ok_or_else(|| {
                EngineError::Config(format!("No engine configured for variant {}", variant))
            })?;
            if spec.executable.trim().is_empty() {
                return Err(EngineError::Config(format!("Engine {} has an empty executable", variant)));
            }
            validate_extension(&spec.primary_extension)?;
            for ext in &spec.auxiliary_extensions {
                validate_extension(ext)?;
            }
        }

        Ok(())
    }

    /// Case-insensitive suffix match of `filename` against the allowlist.
    pub fn is_accepted(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.accepted_extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{}", ext.to_lowercase())))
    }

    pub fn engine(&self, variant: EngineVariant) -> Option<&EngineSpec> {
        self.engines.get(&variant)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn validate_extension(ext: &str) -> Result<(), EngineError> {
    if ext.is_empty() || ext.contains('.') || ext.contains('/') || ext.contains('\\') {
        return Err(EngineError::Config(format!("Invalid file extension: {:?}", ext)));
    }
    Ok(())
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, EngineError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| EngineError::Config(format!("{} is not a valid number: {}", key, value))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = GatewayConfig::default();
        assert_eq!(config.engine_timeout(), Duration::from_secs(600));
        assert_eq!(config.session_timeout(), Duration::from_secs(3600));
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert!(!config.cleanup_on_success);
        assert!(config.validate().is_ok());

        let accurate = config.engine(EngineVariant::Accurate).unwrap();
        assert_eq!(accurate.executable, "oemer");
        assert_eq!(accurate.args, vec!["--use-tf".to_string()]);
        assert!(config.engine(EngineVariant::Alternate).unwrap().auxiliary_extensions.is_empty());
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
            workspace_root: /var/tmp/scores
            engine_timeout_secs: 120
            engines:
              fast:
                executable: /opt/oemer/bin/oemer
                auxiliary_extensions: [png]
              accurate:
                executable: oemer
                args: ["--use-tf"]
              alternate:
                executable: homr
        "#;

        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.workspace_root, PathBuf::from("/var/tmp/scores"));
        assert_eq!(config.engine_timeout_secs, 120);
        assert_eq!(config.session_timeout_secs, 3600);
        assert_eq!(config.engine(EngineVariant::Fast).unwrap().primary_extension, "musicxml");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(GatewayConfig::from_yaml("").unwrap(), GatewayConfig::default());
    }

    #[test]
    fn test_parse_invalid_config() {
        let yaml = r#"
            invalid: field
        "#;
        assert!(GatewayConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = GatewayConfig::default();
        config.engine_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.engine_timeout_secs = 3600;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("session_timeout_secs"));

        let mut config = GatewayConfig::default();
        config.accepted_extensions = vec![".png".to_string()];
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.engines.remove(&EngineVariant::Alternate);
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.engines.insert(EngineVariant::Fast, EngineSpec::new("  "));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_is_accepted_is_case_insensitive_suffix() {
        let config = GatewayConfig::default();
        for name in ["score.png", "SCORE.PNG", "a.b.JpEg", "page.tiff", "x.bmp", "y.jpg"] {
            assert!(config.is_accepted(name), "{} should be accepted", name);
        }
        for name in ["score.pdf", "png", "score.png.exe", "score", "scorepng", ""] {
            assert!(!config.is_accepted(name), "{} should be rejected", name);
        }
    }

    #[test]
    fn test_yaml_round_trip_keeps_engines() {
        let config = GatewayConfig::default();
        let parsed = GatewayConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
