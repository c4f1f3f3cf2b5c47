//! `dataguard.toml` loading.
//!
//! The file holds the storage locations plus the compliance tables
//! (`[dpia]`, `[consent]`, `[retention]`) at the top level. Every section is
//! optional, so a missing or empty file yields the built-in defaults.

use dataguard_compliance::ComplianceConfig;
use dataguard_core::{DataguardError, DataguardResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Full CLI configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataguardConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(flatten)]
    pub compliance: ComplianceConfig,
}

/// Where the store snapshot and the DPIA history live.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,
    #[serde(default = "default_dpia_history")]
    pub dpia_history: PathBuf,
}

fn default_snapshot() -> PathBuf {
    PathBuf::from("data/dataguard.json")
}

fn default_dpia_history() -> PathBuf {
    PathBuf::from("data/dpia-history.jsonl")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot(),
            dpia_history: default_dpia_history(),
        }
    }
}

impl DataguardConfig {
    /// Resolves relative storage paths against the config file's directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.storage.snapshot.is_relative() {
            self.storage.snapshot = base.join(&self.storage.snapshot);
        }
        if self.storage.dpia_history.is_relative() {
            self.storage.dpia_history = base.join(&self.storage.dpia_history);
        }
    }
}

/// Read and parse a TOML config file. A missing file yields the defaults.
pub fn parse_config(path: &Path) -> DataguardResult<DataguardConfig> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(DataguardConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        DataguardError::Config(format!("Failed to read config '{}': {e}", path.display()))
    })?;
    toml::from_str(&content).map_err(|e| {
        DataguardError::Config(format!("Failed to parse config '{}': {e}", path.display()))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dataguard_core::ConsentPurpose;
    use std::io::Write;

    #[test]
    fn test_parse_all_sections() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp.as_file_mut(),
            r#"
[storage]
snapshot = "/var/lib/dataguard/store.json"

[dpia]
adequacy_version = "eu-adequacy-2025-01"
adequate_countries = ["Japan", "CH"]

[consent]
marketing = 365

[retention]
page_size = 50
"#
        )
        .unwrap();

        let config = parse_config(tmp.path()).unwrap();
        assert_eq!(
            config.storage.snapshot,
            PathBuf::from("/var/lib/dataguard/store.json")
        );
        assert_eq!(config.storage.dpia_history, default_dpia_history());
        assert_eq!(config.compliance.dpia.adequacy_version, "eu-adequacy-2025-01");
        assert!(config.compliance.dpia.is_adequate("ch"));
        assert!(!config.compliance.dpia.is_adequate("Canada"));
        assert_eq!(
            config.compliance.consent.expiry_days(ConsentPurpose::Marketing),
            Some(365)
        );
        assert_eq!(config.compliance.retention.page_size, 50);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.storage.snapshot, default_snapshot());
        assert_eq!(config.compliance.retention.sweep_schedule, "0 0 2 * * * *");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp.as_file_mut(), "[retention\npage_size = ").unwrap();
        let err = parse_config(tmp.path()).unwrap_err();
        assert!(matches!(err, DataguardError::Config(_)));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let mut config = DataguardConfig::default();
        config.resolve_paths(Path::new("/etc/dataguard"));
        assert_eq!(
            config.storage.snapshot,
            PathBuf::from("/etc/dataguard/data/dataguard.json")
        );
    }
}
