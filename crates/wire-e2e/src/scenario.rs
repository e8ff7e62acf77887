//! Login and logout scenarios, and the suite that runs them inside one session.

use crate::config::{HarnessConfig, Timeouts};
use crate::credentials::Credentials;
use crate::driver::{self, AutomationDriver};
use crate::interaction::{Action, Interactor, Mode};
use crate::locators::{ElementKey, LocatorCatalog};
use crate::reporting::{ScenarioResult, StepResult, SuiteReport, TestStatus};
use crate::{Result, TestError};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const LOGIN: &str = "login";
pub const LOGOUT: &str = "logout";

/// Owns the driver for one suite run and quits it exactly once.
///
/// Prefer [`Session::close`]. A session dropped without it (a panic, an early
/// return) still schedules a quit on the current runtime so the remote side
/// is not left orphaned.
pub struct Session {
    driver: Arc<dyn AutomationDriver>,
    closed: bool,
}

impl Session {
    pub fn new(driver: Arc<dyn AutomationDriver>) -> Self {
        info!("Session opened on {}", driver.describe());
        Self {
            driver,
            closed: false,
        }
    }

    pub fn driver(&self) -> Arc<dyn AutomationDriver> {
        self.driver.clone()
    }

    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        self.driver
            .quit()
            .await
            .map_err(|e| TestError::Teardown(e.to_string()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!("Session on {} dropped without close; quitting", self.driver.describe());
        let driver = self.driver.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = driver.quit().await {
                        warn!("Quit after drop failed: {}", e);
                    }
                });
            }
            Err(_) => error!("No runtime available to quit {}", driver.describe()),
        }
    }
}

/// Step recorder for one scenario.
pub struct ScenarioRun<'a> {
    interactor: &'a Interactor,
    timeouts: &'a Timeouts,
    steps: Vec<StepResult>,
}

impl<'a> ScenarioRun<'a> {
    pub fn new(interactor: &'a Interactor, timeouts: &'a Timeouts) -> Self {
        Self {
            interactor,
            timeouts,
            steps: Vec::new(),
        }
    }

    pub fn interactor(&self) -> &'a Interactor {
        self.interactor
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<StepResult> {
        self.steps
    }

    /// Performs `action` on `key`; any miss fails the scenario.
    pub async fn required(&mut self, name: &str, key: ElementKey, action: Action) -> Result<()> {
        let started = Instant::now();
        let result = self
            .interactor
            .act(key, action, Mode::Required, self.timeouts.element())
            .await
            .map(|_| ());
        self.record(name, Some(key), Mode::Required, started, result)
    }

    /// Performs `action` on `key` if it shows up. Returns whether it did.
    pub async fn optional(&mut self, name: &str, key: ElementKey, action: Action) -> bool {
        let started = Instant::now();
        let performed = match self
            .interactor
            .act(key, action, Mode::BestEffort, self.timeouts.optional())
            .await
        {
            Ok(resolution) => resolution.is_success(),
            Err(e) => {
                warn!("Best-effort step '{}' raised: {}", name, e);
                false
            }
        };

        self.steps.push(StepResult {
            name: name.to_string(),
            key: Some(key),
            mode: Mode::BestEffort,
            status: if performed {
                TestStatus::Passed
            } else {
                TestStatus::Skipped
            },
            error: None,
            screenshot_path: None,
            duration: started.elapsed(),
        });
        performed
    }

    /// Requires `key` to be present and displayed within `timeout`.
    pub async fn expect_present(
        &mut self,
        name: &str,
        key: ElementKey,
        timeout: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        let result = self
            .interactor
            .locate(key, Mode::Required, timeout)
            .await
            .map(|_| ());
        self.record(name, Some(key), Mode::Required, started, result)
    }

    /// Requires every locator of `key` to stop matching within `timeout`.
    pub async fn expect_absent(
        &mut self,
        name: &str,
        key: ElementKey,
        timeout: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        let result = if self.interactor.wait_until_absent(key, timeout).await {
            Ok(())
        } else {
            Err(TestError::StateNotReached(format!("{} still present", key)))
        };
        self.record(name, Some(key), Mode::Required, started, result)
    }

    /// Requires the screen to move from `from` to `to`.
    pub async fn expect_transition(
        &mut self,
        name: &str,
        from: ElementKey,
        to: ElementKey,
    ) -> Result<()> {
        let started = Instant::now();
        let result = if self
            .interactor
            .wait_for_transition(from, to, self.timeouts.transition())
            .await
        {
            Ok(())
        } else {
            Err(TestError::StateNotReached(format!(
                "no transition from {} to {}",
                from, to
            )))
        };
        self.record(name, Some(to), Mode::Required, started, result)
    }

    pub async fn open_url(&mut self, name: &str, url: &str) -> Result<()> {
        let started = Instant::now();
        let result = self
            .interactor
            .driver()
            .open_url(url)
            .await
            .map_err(TestError::from);
        self.record(name, None, Mode::Required, started, result)
    }

    fn record(
        &mut self,
        name: &str,
        key: Option<ElementKey>,
        mode: Mode,
        started: Instant,
        result: Result<()>,
    ) -> Result<()> {
        let (status, error) = match &result {
            Ok(()) => (TestStatus::Passed, None),
            Err(e) => (TestStatus::Failed, Some(e.to_string())),
        };
        self.steps.push(StepResult {
            name: name.to_string(),
            key,
            mode,
            status,
            error,
            screenshot_path: None,
            duration: started.elapsed(),
        });
        result
    }

    fn last_failed_step(&mut self) -> Option<&mut StepResult> {
        self.steps
            .iter_mut()
            .rev()
            .find(|s| s.status == TestStatus::Failed)
    }
}

/// Deeplink to the configured backend, sign in, and land on the home screen.
///
/// Success means the login controls are gone and the home screen is shown.
pub async fn login(run: &mut ScenarioRun<'_>, credentials: &Credentials) -> Result<()> {
    run.open_url("open deeplink", credentials.deeplink()).await?;
    run.interactor().settle().await;

    run.optional("confirm deeplink", ElementKey::OpenButton, Action::Click)
        .await;
    run.optional("proceed to backend", ElementKey::ProceedButton, Action::Click)
        .await;
    if !run.interactor().is_present(ElementKey::EmailField).await {
        run.optional("open login form", ElementKey::LoginEntryButton, Action::Click)
            .await;
    }

    run.required("clear email", ElementKey::EmailField, Action::Clear)
        .await?;
    run.required(
        "enter email",
        ElementKey::EmailField,
        Action::TypeText(credentials.username().to_string()),
    )
    .await?;
    run.required("clear password", ElementKey::PasswordField, Action::Clear)
        .await?;
    run.required(
        "enter password",
        ElementKey::PasswordField,
        Action::TypeText(credentials.password().to_string()),
    )
    .await?;
    run.required("submit login", ElementKey::LoginButton, Action::Click)
        .await?;
    run.interactor().settle().await;

    run.expect_transition(
        "leave login screen",
        ElementKey::LoginButton,
        ElementKey::HomeScreen,
    )
    .await?;
    run.optional(
        "dismiss backup prompt",
        ElementKey::IgnoreBackupButton,
        Action::Click,
    )
    .await;

    let timeout = run.timeouts.transition();
    run.expect_present("home screen shown", ElementKey::HomeScreen, timeout)
        .await?;
    run.expect_absent("login controls gone", ElementKey::LoginButton, timeout)
        .await
}

/// Log out through settings and land back on the login screen.
pub async fn logout(run: &mut ScenarioRun<'_>) -> Result<()> {
    run.optional("open settings", ElementKey::SettingsButton, Action::Click)
        .await;
    run.optional("open account", ElementKey::AccountButton, Action::Click)
        .await;
    run.required("log out", ElementKey::LogoutButton, Action::Click)
        .await?;
    run.optional(
        "confirm log out",
        ElementKey::LogoutConfirmButton,
        Action::Click,
    )
    .await;
    run.interactor().settle().await;

    let timeout = run.timeouts.transition();
    run.expect_present("login screen shown", ElementKey::LoginScreen, timeout)
        .await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScenarioKind {
    Login,
    Logout,
}

impl ScenarioKind {
    fn name(&self) -> &'static str {
        match self {
            ScenarioKind::Login => LOGIN,
            ScenarioKind::Logout => LOGOUT,
        }
    }
}

pub struct Suite {
    catalog: Arc<LocatorCatalog>,
    timeouts: Timeouts,
    artifacts_dir: Option<PathBuf>,
    logout_depends_on_login: bool,
}

impl Suite {
    pub fn new(catalog: Arc<LocatorCatalog>, timeouts: Timeouts) -> Self {
        Self {
            catalog,
            timeouts,
            artifacts_dir: None,
            logout_depends_on_login: true,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            catalog: LocatorCatalog::wire(),
            timeouts: config.timeouts.clone(),
            artifacts_dir: config.artifacts_dir.clone(),
            logout_depends_on_login: config.logout_depends_on_login,
        }
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    pub fn with_logout_dependency(mut self, depends: bool) -> Self {
        self.logout_depends_on_login = depends;
        self
    }

    /// Loads credentials, connects the configured driver, and runs the suite.
    ///
    /// Credentials are read before any session exists, so a bad file never
    /// leaves a remote session behind.
    pub async fn execute(config: &HarnessConfig) -> Result<SuiteReport> {
        let credentials = Credentials::load(&config.credentials_path)?;
        let driver = driver::connect(config).await?;
        Ok(Self::from_config(config).run(driver, &credentials).await)
    }

    /// Runs login then logout in one session. Teardown always happens, and
    /// its failure is reported without touching any verdict.
    pub async fn run(
        &self,
        driver: Arc<dyn AutomationDriver>,
        credentials: &Credentials,
    ) -> SuiteReport {
        let started_at = Utc::now();
        let session = Session::new(driver);
        let interactor = Interactor::new(session.driver(), self.catalog.clone())
            .with_poll_interval(self.timeouts.poll_interval())
            .with_settle_delay(self.timeouts.settle());

        let mut scenarios = Vec::new();
        let login = self
            .run_scenario(ScenarioKind::Login, &interactor, credentials)
            .await;
        let login_passed = login.status == TestStatus::Passed;
        scenarios.push(login);

        if self.logout_depends_on_login && !login_passed {
            info!("Skipping {}: {} did not pass", LOGOUT, LOGIN);
            scenarios.push(ScenarioResult::skipped(
                LOGOUT,
                format!("depends on {}", LOGIN),
            ));
        } else {
            scenarios.push(
                self.run_scenario(ScenarioKind::Logout, &interactor, credentials)
                    .await,
            );
        }

        let driver_label = interactor.driver().describe();
        let teardown_error = match session.close().await {
            Ok(()) => None,
            Err(e) => {
                warn!("{}", e);
                Some(e.to_string())
            }
        };

        SuiteReport {
            run_id: Uuid::new_v4(),
            started_at,
            driver: driver_label,
            scenarios,
            teardown_error,
        }
    }

    async fn run_scenario(
        &self,
        kind: ScenarioKind,
        interactor: &Interactor,
        credentials: &Credentials,
    ) -> ScenarioResult {
        let name = kind.name();
        info!("Scenario {} started", name);
        let started = Instant::now();
        let mut run = ScenarioRun::new(interactor, &self.timeouts);

        let outcome = match kind {
            ScenarioKind::Login => login(&mut run, credentials).await,
            ScenarioKind::Logout => logout(&mut run).await,
        };

        let (status, error) = match outcome {
            Ok(()) => {
                info!("Scenario {} passed", name);
                (TestStatus::Passed, None)
            }
            Err(e) => {
                error!("Scenario {} failed: {}", name, e);
                if let Some(dir) = &self.artifacts_dir {
                    let shot = capture_screenshot(interactor.driver().as_ref(), dir, name).await;
                    if let Some(step) = run.last_failed_step() {
                        step.screenshot_path = shot;
                    }
                }
                (TestStatus::Failed, Some(e.to_string()))
            }
        };

        ScenarioResult {
            name: name.to_string(),
            status,
            duration: started.elapsed(),
            steps: run.into_steps(),
            error,
        }
    }
}

/// Saves a PNG of the current screen under `dir`. Never fails the scenario.
async fn capture_screenshot(
    driver: &dyn AutomationDriver,
    dir: &Path,
    scenario: &str,
) -> Option<String> {
    let bytes = match driver.screenshot().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Screenshot for {} failed: {}", scenario, e);
            return None;
        }
    };

    let path = dir.join(format!(
        "{}-{}.png",
        scenario,
        Utc::now().format("%Y%m%dT%H%M%S%.3f")
    ));
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!("Could not create {}: {}", dir.display(), e);
        return None;
    }
    match tokio::fs::write(&path, bytes).await {
        Ok(()) => Some(path.display().to_string()),
        Err(e) => {
            warn!("Could not write {}: {}", path.display(), e);
            None
        }
    }
}
