use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountsConfig {
    /// Directory that per-user home directories are created under
    #[serde(default = "default_home_root")]
    pub home_root: String,
    #[serde(default = "default_shell")]
    pub default_shell: String,
    #[serde(default = "default_system_ids")]
    pub system_ids: IdRange,
    #[serde(default = "default_normal_ids")]
    pub normal_ids: IdRange,
}

/// Inclusive `[low, high]` identifier bound for one account class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IdRange {
    pub low: i64,
    pub high: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_user_file")]
    pub user_file: PathBuf,
    #[serde(default = "default_credential_file")]
    pub credential_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

// Default value functions
fn default_home_root() -> String {
    "/home".to_string()
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_system_ids() -> IdRange {
    IdRange::new(100, 999)
}

fn default_normal_ids() -> IdRange {
    IdRange::new(1000, 60000)
}

fn default_user_file() -> PathBuf {
    PathBuf::from("/etc/passwd")
}

fn default_credential_file() -> PathBuf {
    PathBuf::from("/etc/shadow")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

fn default_console() -> bool {
    false
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            home_root: default_home_root(),
            default_shell: default_shell(),
            system_ids: default_system_ids(),
            normal_ids: default_normal_ids(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            user_file: default_user_file(),
            credential_file: default_credential_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
        }
    }
}

impl IdRange {
    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, id: i64) -> bool {
        id >= self.low && id <= self.high
    }

    fn overlaps(&self, other: &IdRange) -> bool {
        self.low <= other.high && other.low <= self.high
    }
}

impl AccountsConfig {
    /// Range that an allocation for the given account class draws from
    pub fn range_for(&self, is_system: bool) -> IdRange {
        if is_system {
            self.system_ids
        } else {
            self.normal_ids
        }
    }

    /// Classify a stored identifier. The classification is never persisted,
    /// so rows read back from disk are classified through this.
    pub fn is_system_id(&self, uid: i64) -> bool {
        self.system_ids.contains(uid)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let accounts = &self.accounts;

        if accounts.home_root.is_empty() {
            bail!("home_root must not be empty");
        }

        if accounts.default_shell.is_empty() {
            bail!("default_shell must not be empty");
        }

        for (label, range) in [("system_ids", accounts.system_ids), ("normal_ids", accounts.normal_ids)] {
            if range.low < 0 {
                bail!("{}.low must be non-negative", label);
            }
            if range.low > range.high {
                bail!(
                    "{}.low ({}) must not be greater than {}.high ({})",
                    label,
                    range.low,
                    label,
                    range.high
                );
            }
        }

        if accounts.system_ids.overlaps(&accounts.normal_ids) {
            bail!(
                "system_ids [{}, {}] and normal_ids [{}, {}] must not overlap",
                accounts.system_ids.low,
                accounts.system_ids.high,
                accounts.normal_ids.low,
                accounts.normal_ids.high
            );
        }

        if self.files.user_file == self.files.credential_file {
            bail!("user_file and credential_file must be different files");
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.accounts.home_root, "/home");
        assert_eq!(config.accounts.default_shell, "/bin/sh");
        assert_eq!(config.accounts.system_ids, IdRange::new(100, 999));
        assert_eq!(config.accounts.normal_ids, IdRange::new(1000, 60000));
        assert_eq!(config.files.user_file, PathBuf::from("/etc/passwd"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("acctdb.toml");
        std::fs::write(
            &path,
            r#"
[accounts]
home_root = "/srv/home"
default_shell = "/bin/bash"
system_ids = { low = 10, high = 99 }
normal_ids = { low = 500, high = 600 }

[files]
user_file = "/tmp/passwd"
credential_file = "/tmp/shadow"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.accounts.home_root, "/srv/home");
        assert_eq!(config.accounts.range_for(true), IdRange::new(10, 99));
        assert_eq!(config.accounts.range_for(false), IdRange::new(500, 600));
        assert_eq!(config.files.credential_file, PathBuf::from("/tmp/shadow"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::from_file(&temp_dir.path().join("missing.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_overlapping_ranges_rejected() {
        let result = Config::parse(
            r#"
[accounts]
system_ids = { low = 100, high = 1500 }
normal_ids = { low = 1000, high = 2000 }
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let result = Config::parse(
            r#"
[accounts]
normal_ids = { low = 2000, high = 1000 }
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let result = Config::parse(
            r#"
[logging]
level = "loud"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_is_system_id() {
        let accounts = AccountsConfig::default();
        assert!(accounts.is_system_id(100));
        assert!(accounts.is_system_id(999));
        assert!(!accounts.is_system_id(1000));
        assert!(!accounts.is_system_id(0));
    }
}
