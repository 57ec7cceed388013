use crate::error::{Result, StoreError};
use crate::schema::{AUTHORITY, DEFAULT_UNTITLED};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database location value that selects a private in-memory store.
pub const IN_MEMORY: &str = ":memory:";

/// When a mutation signals observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// After every mutation, even one that affected no rows.
    #[default]
    Always,
    /// Only when at least one row was affected.
    OnChange,
}

impl NotifyPolicy {
    pub fn should_notify(self, affected: usize) -> bool {
        match self {
            NotifyPolicy::Always => true,
            NotifyPolicy::OnChange => affected > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Capacity of the bounded pipe between writer and reader.
    pub buffer_bytes: usize,
    /// How long one write may wait on a full pipe before the writer gives up.
    pub write_timeout_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            buffer_bytes: 4096,
            write_timeout_ms: 5000,
        }
    }
}

impl ExportConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Store configuration, usually loaded from a YAML file.
///
/// ```yaml
/// database: notes.db
/// untitled_title: "(sans titre)"
/// notify_policy: on_change
/// export:
///   buffer_bytes: 1024
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: String,
    pub authority: String,
    pub untitled_title: String,
    pub notify_policy: NotifyPolicy,
    pub busy_timeout_ms: u64,
    pub export: ExportConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            database: IN_MEMORY.to_string(),
            authority: AUTHORITY.to_string(),
            untitled_title: DEFAULT_UNTITLED.to_string(),
            notify_policy: NotifyPolicy::default(),
            busy_timeout_ms: 5000,
            export: ExportConfig::default(),
        }
    }
}

impl StoreConfig {
    /// An in-memory configuration with every other field defaulted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A file-backed configuration with every other field defaulted.
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        StoreConfig {
            database: path.as_ref().to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: StoreConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(StoreError::Config("database must not be empty".into()));
        }
        if self.authority.trim().is_empty() || self.authority.contains('/') {
            return Err(StoreError::Config(format!(
                "invalid authority '{}'",
                self.authority
            )));
        }
        if self.export.buffer_bytes == 0 {
            return Err(StoreError::Config("export.buffer_bytes must be positive".into()));
        }
        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == IN_MEMORY
    }

    /// On-disk location of the database, `None` when in memory.
    pub fn database_path(&self) -> Option<PathBuf> {
        (!self.is_in_memory()).then(|| PathBuf::from(&self.database))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(config.is_in_memory());
        assert_eq!(config.database_path(), None);
        assert_eq!(config.authority, "com.google.provider.NotePad");
        assert_eq!(config.untitled_title, "<Untitled>");
        assert_eq!(config.notify_policy, NotifyPolicy::Always);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
database: /tmp/notes.db
authority: org.example.notes
untitled_title: "(sans titre)"
notify_policy: on_change
busy_timeout_ms: 250
export:
  buffer_bytes: 64
"#;
        let config = StoreConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.database_path(), Some(PathBuf::from("/tmp/notes.db")));
        assert_eq!(config.authority, "org.example.notes");
        assert_eq!(config.notify_policy, NotifyPolicy::OnChange);
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.export.buffer_bytes, 64);
        assert_eq!(config.export.write_timeout_ms, 5000);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            StoreConfig::from_yaml_str("authority: a/b"),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_yaml_str("export:\n  buffer_bytes: 0"),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_yaml_str("notify_policy: sometimes"),
            Err(StoreError::Yaml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yaml");
        std::fs::write(&path, "untitled_title: Untitled\n").unwrap();
        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.untitled_title, "Untitled");
    }

    #[test]
    fn test_notify_policy() {
        assert!(NotifyPolicy::Always.should_notify(0));
        assert!(!NotifyPolicy::OnChange.should_notify(0));
        assert!(NotifyPolicy::OnChange.should_notify(3));
    }
}
