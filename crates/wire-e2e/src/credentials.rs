use crate::{Result, TestError};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Deeplink that points the app at the staging backend.
pub const DEFAULT_DEEPLINK: &str =
    "wire://access/?config=https://staging-nginz-https.zinfra.io/deeplink.json";

#[derive(Deserialize)]
struct CredentialsRecord {
    username: String,
    password: String,
    #[serde(default)]
    deeplink: Option<String>,
}

/// Login material for one run. Read-only once loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
    deeplink: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        deeplink: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            deeplink: deeplink.unwrap_or_else(|| DEFAULT_DEEPLINK.to_string()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TestError::Setup(format!(
                "Failed to read credentials from {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
            .map_err(|e| TestError::Setup(format!("{} ({})", e, path.display())))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let record: CredentialsRecord = serde_json::from_str(raw)
            .map_err(|e| TestError::Setup(format!("Malformed credentials: {}", e)))?;
        if record.username.trim().is_empty() {
            return Err(TestError::Setup("Credentials username is empty".to_string()));
        }
        let deeplink = record.deeplink.filter(|link| !link.trim().is_empty());
        Ok(Self::new(record.username, record.password, deeplink))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn deeplink(&self) -> &str {
        &self.deeplink
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("deeplink", &self.deeplink)
            .finish()
    }
}
