pub mod capabilities;
pub mod remote;
pub mod stub;

pub use capabilities::Capabilities;
pub use remote::RemoteDriver;
pub use stub::{ClickEffect, DriverCall, StubDriver, StubElement};

use crate::config::{DriverMode, HarnessConfig};
use crate::locators::Locator;
use crate::{Result, TestError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("command rejected ({code}): {message}")]
    Command { code: String, message: String },

    #[error("session error: {0}")]
    Session(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl DriverError {
    pub fn is_no_such_element(&self) -> bool {
        matches!(self, DriverError::NoSuchElement(_))
    }
}

/// Opaque reference to an element resolved inside the remote session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live handle to one automated app instance.
///
/// Implementations serialize nothing themselves: callers issue one command
/// at a time per session.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    async fn open_url(&self, url: &str) -> std::result::Result<(), DriverError>;

    async fn find_element(
        &self,
        locator: &Locator,
    ) -> std::result::Result<ElementHandle, DriverError>;

    async fn click(&self, element: &ElementHandle) -> std::result::Result<(), DriverError>;

    async fn clear(&self, element: &ElementHandle) -> std::result::Result<(), DriverError>;

    async fn send_keys(
        &self,
        element: &ElementHandle,
        text: &str,
    ) -> std::result::Result<(), DriverError>;

    async fn is_displayed(&self, element: &ElementHandle) -> std::result::Result<bool, DriverError>;

    async fn is_enabled(&self, element: &ElementHandle) -> std::result::Result<bool, DriverError>;

    /// PNG bytes of the current screen.
    async fn screenshot(&self) -> std::result::Result<Vec<u8>, DriverError>;

    async fn quit(&self) -> std::result::Result<(), DriverError>;

    /// Short label for logs, e.g. `remote(4f2c…)` or `stub`.
    fn describe(&self) -> String;
}

/// Builds the driver selected by `config`.
///
/// `DriverMode::Auto` probes the server's `/status` endpoint and falls back to
/// the Wire stub fixture when nothing answers.
pub async fn connect(config: &HarnessConfig) -> Result<Arc<dyn AutomationDriver>> {
    match config.driver {
        DriverMode::Stub => {
            info!("Using stub driver");
            Ok(Arc::new(StubDriver::wire_fixture()))
        }
        DriverMode::Remote => connect_remote(config).await,
        DriverMode::Auto => {
            if RemoteDriver::is_server_reachable(&config.server_url).await {
                connect_remote(config).await
            } else {
                warn!(
                    "Automation server at {} is unreachable; falling back to stub driver",
                    config.server_url
                );
                Ok(Arc::new(StubDriver::wire_fixture()))
            }
        }
    }
}

async fn connect_remote(config: &HarnessConfig) -> Result<Arc<dyn AutomationDriver>> {
    let driver = RemoteDriver::start_session(&config.server_url, &config.capabilities)
        .await
        .map_err(|e| TestError::Setup(format!("Failed to create session: {}", e)))?;
    info!("Remote session {} created", driver.session_id());
    Ok(Arc::new(driver))
}
