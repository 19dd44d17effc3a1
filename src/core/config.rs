//! RG-009: Runtime configuration (`rigger.yaml`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "rigger.yaml";

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Where the directory database and run journal live
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Append run events to `<data_dir>/events.jsonl`
    #[serde(default = "default_true")]
    pub journal: bool,

    /// Provider credentials exported to the provisioner
    #[serde(default)]
    pub credentials: IndexMap<String, String>,

    #[serde(default)]
    pub provisioner: ProvisionerConfig,
}

/// How the external provisioning tool is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionerConfig {
    /// Executable name or path
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Prefix for credential environment variables
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".rigger")
}

fn default_true() -> bool {
    true
}

fn default_binary() -> String {
    "terraform".to_string()
}

fn default_env_prefix() -> String {
    "TF_VAR_".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            journal: true,
            credentials: IndexMap::new(),
            provisioner: ProvisionerConfig::default(),
        }
    }
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            env_prefix: default_env_prefix(),
        }
    }
}

impl RuntimeConfig {
    /// Parse configuration from YAML text. An empty document yields defaults.
    pub fn parse(yaml: &str) -> Result<Self, String> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
    }

    /// Load configuration from a file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    /// Directory database location.
    pub fn directory_dir(&self) -> PathBuf {
        self.data_dir.join("directory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rg009_defaults() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.data_dir, PathBuf::from(".rigger"));
        assert!(cfg.journal);
        assert!(cfg.credentials.is_empty());
        assert_eq!(cfg.provisioner.binary, "terraform");
        assert_eq!(cfg.provisioner.env_prefix, "TF_VAR_");
        assert_eq!(cfg.directory_dir(), PathBuf::from(".rigger/directory"));
    }

    #[test]
    fn test_rg009_parse_partial() {
        let yaml = r#"
data_dir: /var/lib/rigger
credentials:
  aws_access_key: AKIA
provisioner:
  binary: /opt/tf/terraform
"#;
        let cfg = RuntimeConfig::parse(yaml).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/rigger"));
        assert!(cfg.journal);
        assert_eq!(cfg.credentials["aws_access_key"], "AKIA");
        assert_eq!(cfg.provisioner.binary, "/opt/tf/terraform");
        assert_eq!(cfg.provisioner.env_prefix, "TF_VAR_");
    }

    #[test]
    fn test_rg009_unknown_field_rejected() {
        let err = RuntimeConfig::parse("bogus: 1\n").unwrap_err();
        assert!(err.contains("bogus"));
    }

    #[test]
    fn test_rg009_empty_is_default() {
        assert_eq!(RuntimeConfig::parse("").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_rg009_load_missing_file() {
        let cfg = RuntimeConfig::load(Path::new("/nonexistent/rigger.yaml")).unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn test_rg009_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "journal: false\n").unwrap();
        let cfg = RuntimeConfig::load(&path).unwrap();
        assert!(!cfg.journal);
    }
}
