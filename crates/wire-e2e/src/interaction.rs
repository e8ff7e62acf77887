//! Resilient element interaction.
//!
//! Every lookup walks the catalog's locator chain for a key in order. Each
//! locator is polled until the element is actionable or the per-locator
//! budget runs out, so the worst case for a key is `timeout × chain length`.
//! What happens on a miss depends on the [`Mode`]: required misses become
//! [`TestError::RequiredElementMissing`], best-effort misses come back as a
//! non-fatal [`Resolution`].

use crate::driver::{AutomationDriver, DriverError, ElementHandle};
use crate::locators::{ElementKey, Locator, LocatorCatalog};
use crate::{Result, TestError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Required,
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click,
    TypeText(String),
    Clear,
}

impl Action {
    /// Click targets must also report enabled before they count as actionable.
    fn requires_enabled(&self) -> bool {
        matches!(self, Action::Click)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click => f.write_str("click"),
            // never echo typed text, it may be a password
            Action::TypeText(text) => write!(f, "type({} chars)", text.chars().count()),
            Action::Clear => f.write_str("clear"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(ElementHandle),
    /// No locator in the chain ever matched an element.
    NotFound,
    /// Some locator matched, but the element never became actionable in time.
    Timeout,
    ActionFailed(String),
}

/// What happened while polling one locator of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorAttempt {
    pub locator: Locator,
    pub polls: u32,
    pub elapsed: Duration,
    /// An element matched at least once but was hidden or disabled.
    pub matched: bool,
    pub last_error: Option<String>,
}

impl LocatorAttempt {
    fn new(locator: Locator) -> Self {
        Self {
            locator,
            polls: 0,
            elapsed: Duration::ZERO,
            matched: false,
            last_error: None,
        }
    }
}

/// Result of one locate/act request. Consumed by the caller, not shared.
#[derive(Debug)]
pub struct Resolution {
    key: ElementKey,
    outcome: Outcome,
    attempts: Vec<LocatorAttempt>,
}

impl Resolution {
    pub fn key(&self) -> ElementKey {
        self.key
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }

    pub fn attempts(&self) -> &[LocatorAttempt] {
        &self.attempts
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn handle(&self) -> Option<&ElementHandle> {
        match &self.outcome {
            Outcome::Success(handle) => Some(handle),
            _ => None,
        }
    }

    /// Locators that were polled without producing the element.
    pub fn failed_attempts(&self) -> usize {
        let failed = self.attempts.len();
        if self.is_success() { failed - 1 } else { failed }
    }

    pub fn attempted_locators(&self) -> Vec<Locator> {
        self.attempts.iter().map(|a| a.locator.clone()).collect()
    }

    fn reason(&self) -> String {
        match &self.outcome {
            Outcome::Success(_) => "found".to_string(),
            Outcome::NotFound if self.attempts.is_empty() => "no locators catalogued".to_string(),
            Outcome::NotFound => "not found".to_string(),
            Outcome::Timeout => "present but never actionable".to_string(),
            Outcome::ActionFailed(cause) => format!("action failed: {}", cause),
        }
    }
}

enum Probe {
    Ready(ElementHandle),
    NotActionable,
    Missing,
    Failed(DriverError),
    /// The driver call outlived the locator's budget.
    Expired,
}

pub struct Interactor {
    driver: Arc<dyn AutomationDriver>,
    catalog: Arc<LocatorCatalog>,
    poll_interval: Duration,
    settle_delay: Duration,
}

impl Interactor {
    pub fn new(driver: Arc<dyn AutomationDriver>, catalog: Arc<LocatorCatalog>) -> Self {
        Self {
            driver,
            catalog,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn driver(&self) -> &Arc<dyn AutomationDriver> {
        &self.driver
    }

    pub fn catalog(&self) -> &LocatorCatalog {
        &self.catalog
    }

    /// Resolves `key` to a present, displayed element.
    pub async fn locate(&self, key: ElementKey, mode: Mode, timeout: Duration) -> Result<Resolution> {
        let resolution = self.resolve(key, timeout, false).await;
        enforce(resolution, mode)
    }

    /// Locates `key`, then applies `action` exactly once.
    pub async fn act(
        &self,
        key: ElementKey,
        action: Action,
        mode: Mode,
        timeout: Duration,
    ) -> Result<Resolution> {
        let resolution = self.resolve(key, timeout, action.requires_enabled()).await;

        let resolution = match resolution.outcome {
            Outcome::Success(handle) => {
                let outcome = match self.perform(&handle, &action).await {
                    Ok(()) => {
                        info!("{} {}", action, key);
                        Outcome::Success(handle)
                    }
                    Err(e) => Outcome::ActionFailed(e.to_string()),
                };
                Resolution {
                    outcome,
                    ..resolution
                }
            }
            _ => resolution,
        };

        enforce(resolution, mode)
    }

    /// Waits until `from` is gone or `to` shows up. Advisory: never errors.
    pub async fn wait_for_transition(
        &self,
        from: ElementKey,
        to: ElementKey,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.presence_before(to, deadline).await == Some(true) {
                debug!("Transition {} -> {}: target present", from, to);
                return true;
            }
            if !self.catalog.locators(from).is_empty()
                && self.presence_before(from, deadline).await == Some(false)
            {
                debug!("Transition {} -> {}: source gone", from, to);
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!("Transition {} -> {} not observed within {:?}", from, to, timeout);
                return false;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Waits until no locator of `key` yields a displayed element.
    pub async fn wait_until_absent(&self, key: ElementKey, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.presence_before(key, deadline).await == Some(false) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// One probe per locator, no waiting.
    pub async fn is_present(&self, key: ElementKey) -> bool {
        self.presence(key).await == Some(true)
    }

    /// Like [`Self::presence`], but gives up with `None` at `deadline`.
    async fn presence_before(&self, key: ElementKey, deadline: Instant) -> Option<bool> {
        match timeout_at(deadline, self.presence(key)).await {
            Ok(answer) => answer,
            Err(_) => {
                debug!("Presence probe of {} cut off at deadline", key);
                None
            }
        }
    }

    /// `None` when a driver error left the answer unknown.
    async fn presence(&self, key: ElementKey) -> Option<bool> {
        let mut known = true;
        for locator in self.catalog.locators(key) {
            match self.probe(locator, false).await {
                Probe::Ready(_) => return Some(true),
                Probe::Failed(e) => {
                    debug!("Presence probe of {} failed: {}", locator, e);
                    known = false;
                }
                Probe::NotActionable | Probe::Missing | Probe::Expired => {}
            }
        }
        known.then_some(false)
    }

    /// The single post-navigation pause for the app to render.
    pub async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            debug!("Settling for {:?}", self.settle_delay);
            sleep(self.settle_delay).await;
        }
    }

    async fn resolve(&self, key: ElementKey, timeout: Duration, require_enabled: bool) -> Resolution {
        let mut attempts = Vec::new();

        for locator in self.catalog.locators(key) {
            let (found, attempt) = self.poll_locator(locator, timeout, require_enabled).await;
            attempts.push(attempt);
            if let Some(handle) = found {
                debug!("Resolved {} via {}", key, locator);
                return Resolution {
                    key,
                    outcome: Outcome::Success(handle),
                    attempts,
                };
            }
            debug!("{} not resolved via {} within {:?}", key, locator, timeout);
        }

        let outcome = if attempts.iter().any(|a| a.matched) {
            Outcome::Timeout
        } else {
            Outcome::NotFound
        };
        Resolution {
            key,
            outcome,
            attempts,
        }
    }

    async fn poll_locator(
        &self,
        locator: &Locator,
        timeout: Duration,
        require_enabled: bool,
    ) -> (Option<ElementHandle>, LocatorAttempt) {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempt = LocatorAttempt::new(locator.clone());

        loop {
            attempt.polls += 1;
            let probe = timeout_at(deadline, self.probe(locator, require_enabled))
                .await
                .unwrap_or(Probe::Expired);
            match probe {
                Probe::Ready(handle) => {
                    attempt.elapsed = started.elapsed();
                    return (Some(handle), attempt);
                }
                Probe::NotActionable => attempt.matched = true,
                Probe::Missing => {}
                Probe::Expired => {
                    debug!("Probe of {} still running at deadline", locator);
                    attempt.last_error = Some("driver did not answer before deadline".to_string());
                }
                Probe::Failed(e) => {
                    debug!("Probe of {} failed: {}", locator, e);
                    attempt.last_error = Some(e.to_string());
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }

        attempt.elapsed = started.elapsed();
        (None, attempt)
    }

    async fn probe(&self, locator: &Locator, require_enabled: bool) -> Probe {
        let handle = match self.driver.find_element(locator).await {
            Ok(handle) => handle,
            Err(e) if e.is_no_such_element() => return Probe::Missing,
            Err(e) => return Probe::Failed(e),
        };

        match self.driver.is_displayed(&handle).await {
            Ok(true) => {}
            Ok(false) => return Probe::NotActionable,
            Err(DriverError::StaleElement(_)) => return Probe::Missing,
            Err(e) => return Probe::Failed(e),
        }

        if require_enabled {
            match self.driver.is_enabled(&handle).await {
                Ok(true) => {}
                Ok(false) => return Probe::NotActionable,
                Err(DriverError::StaleElement(_)) => return Probe::Missing,
                Err(e) => return Probe::Failed(e),
            }
        }

        Probe::Ready(handle)
    }

    async fn perform(&self, handle: &ElementHandle, action: &Action) -> std::result::Result<(), DriverError> {
        match action {
            Action::Click => self.driver.click(handle).await,
            Action::TypeText(text) => self.driver.send_keys(handle, text).await,
            Action::Clear => self.driver.clear(handle).await,
        }
    }
}

fn enforce(resolution: Resolution, mode: Mode) -> Result<Resolution> {
    if resolution.is_success() {
        return Ok(resolution);
    }
    match mode {
        Mode::BestEffort => {
            debug!(
                "Skipping optional {} ({})",
                resolution.key,
                resolution.reason()
            );
            Ok(resolution)
        }
        Mode::Required => Err(TestError::RequiredElementMissing {
            key: resolution.key,
            attempted: resolution.attempted_locators(),
            reason: resolution.reason(),
        }),
    }
}
