pub mod config;
pub mod credentials;
pub mod driver;
pub mod interaction;
pub mod locators;
pub mod reporting;
pub mod scenario;

use driver::DriverError;
use locators::{ElementKey, Locator};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("Setup failed: {0}")]
    Setup(String),

    #[error(
        "Required element {key} missing ({reason}); attempted: {}",
        locators::describe_chain(.attempted)
    )]
    RequiredElementMissing {
        key: ElementKey,
        attempted: Vec<Locator>,
        reason: String,
    },

    #[error("Expected state not reached: {0}")]
    StateNotReached(String),

    #[error("Teardown failed: {0}")]
    Teardown(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reporting error: {0}")]
    Reporting(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TestError {
    /// Whether this error decides a verdict, as opposed to being absorbed where it occurred.
    pub fn affects_verdict(&self) -> bool {
        matches!(
            self,
            TestError::Setup(_)
                | TestError::RequiredElementMissing { .. }
                | TestError::StateNotReached(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TestError>;
