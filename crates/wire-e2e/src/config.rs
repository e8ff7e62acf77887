use crate::driver::Capabilities;
use crate::{Result, TestError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:4723/wd/hub";

pub const ENV_SERVER_URL: &str = "WIRE_E2E_SERVER_URL";
pub const ENV_DRIVER: &str = "WIRE_E2E_DRIVER";
pub const ENV_CREDENTIALS: &str = "WIRE_E2E_CREDENTIALS";
pub const ENV_ARTIFACTS: &str = "WIRE_E2E_ARTIFACTS";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriverMode {
    /// Always open a live session; failure to connect aborts the run.
    Remote,
    /// Scripted in-memory app, no server involved.
    Stub,
    /// Remote when the server answers `/status`, stub otherwise.
    Auto,
}

impl FromStr for DriverMode {
    type Err = TestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(DriverMode::Remote),
            "stub" => Ok(DriverMode::Stub),
            "auto" => Ok(DriverMode::Auto),
            other => Err(TestError::Config(format!(
                "Unknown driver mode '{}', expected remote, stub or auto",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    /// Per-locator budget for required interactions.
    pub element_ms: u64,
    /// Per-locator budget for best-effort interactions such as dialogs.
    pub optional_ms: u64,
    pub transition_ms: u64,
    pub poll_interval_ms: u64,
    pub settle_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            element_ms: 10_000,
            optional_ms: 3_000,
            transition_ms: 15_000,
            poll_interval_ms: 250,
            settle_ms: 1_500,
        }
    }
}

impl Timeouts {
    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn optional(&self) -> Duration {
        Duration::from_millis(self.optional_ms)
    }

    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    pub server_url: String,
    pub driver: DriverMode,
    pub capabilities: Capabilities,
    pub timeouts: Timeouts,
    pub credentials_path: PathBuf,
    /// Failure screenshots are written here when set.
    pub artifacts_dir: Option<PathBuf>,
    pub logout_depends_on_login: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            driver: DriverMode::Auto,
            capabilities: Capabilities::default(),
            timeouts: Timeouts::default(),
            credentials_path: PathBuf::from("resources/credentials.json"),
            artifacts_dir: None,
            logout_depends_on_login: true,
        }
    }
}

impl HarnessConfig {
    /// Reads `path` (or starts from defaults) and applies `WIRE_E2E_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TestError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| TestError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SERVER_URL) {
            self.server_url = url;
        }
        if let Some(mode) = lookup(ENV_DRIVER) {
            self.driver = mode.parse()?;
        }
        if let Some(path) = lookup(ENV_CREDENTIALS) {
            self.credentials_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(ENV_ARTIFACTS) {
            self.artifacts_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeouts.poll_interval_ms == 0 {
            return Err(TestError::Config(
                "timeouts.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.timeouts.element_ms == 0 {
            return Err(TestError::Config(
                "timeouts.element_ms must be greater than zero".to_string(),
            ));
        }
        if self.server_url.trim().is_empty() {
            return Err(TestError::Config("server_url is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.json");
        std::fs::write(
            &path,
            r#"{"driver": "stub", "timeouts": {"element_ms": 2000}}"#,
        )
        .unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.driver, DriverMode::Stub);
        assert_eq!(config.timeouts.element_ms, 2000);
        assert_eq!(config.timeouts.poll_interval_ms, 250);
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert!(config.logout_depends_on_login);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_SERVER_URL, "http://10.0.0.2:4723"),
            (ENV_DRIVER, "Remote"),
            (ENV_ARTIFACTS, "/tmp/shots"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server_url, "http://10.0.0.2:4723");
        assert_eq!(config.driver, DriverMode::Remote);
        assert_eq!(config.artifacts_dir, Some(PathBuf::from("/tmp/shots")));
        assert_eq!(
            config.credentials_path,
            PathBuf::from("resources/credentials.json")
        );
    }

    #[test]
    fn test_unknown_driver_mode_rejected() {
        let mut config = HarnessConfig::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_DRIVER).then(|| "simulator".to_string())
        });
        assert!(matches!(result, Err(TestError::Config(_))));
    }

    #[test]
    fn test_zero_poll_interval_invalid() {
        let mut config = HarnessConfig::default();
        config.timeouts.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
