//! In-memory driver that plays a scripted app.
//!
//! Elements are keyed by the exact [`Locator`] that finds them. Clicking an
//! element can swap screens by hiding and revealing other elements, which is
//! enough to walk the login and logout flows without a device. Every command
//! lands in a journal that tests assert against.

use super::{AutomationDriver, DriverError, ElementHandle};
use crate::locators::Locator;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

const STUB_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, PartialEq)]
pub struct StubElement {
    pub displayed: bool,
    pub enabled: bool,
    /// Number of lookups answered with "no such element" before it appears.
    pub hidden_polls: u32,
    pub reject_actions: bool,
}

impl StubElement {
    pub fn visible() -> Self {
        Self {
            displayed: true,
            enabled: true,
            hidden_polls: 0,
            reject_actions: false,
        }
    }

    pub fn invisible() -> Self {
        Self {
            displayed: false,
            ..Self::visible()
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn appearing_after(mut self, polls: u32) -> Self {
        self.hidden_polls = polls;
        self
    }

    pub fn rejecting_actions(mut self) -> Self {
        self.reject_actions = true;
        self
    }
}

/// Screen change applied when an element is clicked.
#[derive(Debug, Clone, Default)]
pub struct ClickEffect {
    pub hide: Vec<Locator>,
    pub show: Vec<(Locator, StubElement)>,
}

impl ClickEffect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hide(mut self, locator: Locator) -> Self {
        self.hide.push(locator);
        self
    }

    pub fn show(mut self, locator: Locator, element: StubElement) -> Self {
        self.show.push((locator, element));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    OpenUrl(String),
    Find(Locator),
    Click(Locator),
    Clear(Locator),
    SendKeys(Locator, String),
    IsDisplayed(Locator),
    IsEnabled(Locator),
    Screenshot,
    Quit,
}

#[derive(Default)]
struct StubState {
    elements: HashMap<Locator, StubElement>,
    handles: HashMap<String, Locator>,
    on_click: HashMap<Locator, ClickEffect>,
    journal: Vec<DriverCall>,
    next_handle: u64,
    quit_error: Option<DriverError>,
    closed: bool,
}

impl StubState {
    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed {
            Err(DriverError::Session("session already quit".to_string()))
        } else {
            Ok(())
        }
    }

    /// Resolves a handle back to a still-present element.
    fn live_element(&self, handle: &ElementHandle) -> Result<(Locator, StubElement), DriverError> {
        let locator = self
            .handles
            .get(handle.id())
            .ok_or_else(|| DriverError::StaleElement(handle.to_string()))?;
        let element = self
            .elements
            .get(locator)
            .ok_or_else(|| DriverError::StaleElement(format!("{} ({})", handle, locator)))?;
        Ok((locator.clone(), element.clone()))
    }

    /// Journals the action against the handle's element, then applies its rejection policy.
    fn record_action(
        &mut self,
        handle: &ElementHandle,
        call: impl FnOnce(Locator) -> DriverCall,
    ) -> Result<Locator, DriverError> {
        self.ensure_open()?;
        let (locator, element) = self.live_element(handle)?;
        self.journal.push(call(locator.clone()));
        if element.reject_actions {
            return Err(DriverError::Command {
                code: "element not interactable".to_string(),
                message: locator.to_string(),
            });
        }
        Ok(locator)
    }
}

#[derive(Default)]
pub struct StubDriver {
    state: Mutex<StubState>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, locator: Locator, element: StubElement) -> Self {
        self.state.get_mut().elements.insert(locator, element);
        self
    }

    pub fn on_click(mut self, locator: Locator, effect: ClickEffect) -> Self {
        self.state.get_mut().on_click.insert(locator, effect);
        self
    }

    pub fn failing_quit(mut self, error: DriverError) -> Self {
        self.state.get_mut().quit_error = Some(error);
        self
    }

    /// A scripted Wire app: login screen first, home screen after "Log In",
    /// back to the login screen after "Log OutField".
    pub fn wire_fixture() -> Self {
        let login_screen = [
            Locator::id("loginScreen"),
            Locator::name("EmailField"),
            Locator::name("PasswordField"),
            Locator::name("Log In"),
        ];
        let home_screen = [
            Locator::id("homePage"),
            Locator::name("bottomBarSettingsButton"),
            Locator::name("Account"),
            Locator::name("Log OutField"),
        ];

        let mut to_home = ClickEffect::new();
        let mut to_login = ClickEffect::new();
        for locator in &login_screen {
            to_home = to_home.hide(locator.clone());
            to_login = to_login.show(locator.clone(), StubElement::visible());
        }
        for locator in &home_screen {
            to_home = to_home.show(locator.clone(), StubElement::visible());
            to_login = to_login.hide(locator.clone());
        }

        let mut driver = Self::new()
            .on_click(Locator::name("Log In"), to_home)
            .on_click(Locator::name("Log OutField"), to_login);
        for locator in login_screen {
            driver = driver.with_element(locator, StubElement::visible());
        }
        driver
    }

    pub async fn journal(&self) -> Vec<DriverCall> {
        self.state.lock().await.journal.clone()
    }

    /// Journal entries that are element actions or navigation, without lookups and probes.
    pub async fn actions(&self) -> Vec<DriverCall> {
        self.journal()
            .await
            .into_iter()
            .filter(|call| {
                !matches!(
                    call,
                    DriverCall::Find(_) | DriverCall::IsDisplayed(_) | DriverCall::IsEnabled(_)
                )
            })
            .collect()
    }

    pub async fn count(&self, predicate: impl Fn(&DriverCall) -> bool) -> usize {
        self.state
            .lock()
            .await
            .journal
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    pub async fn quit_count(&self) -> usize {
        self.count(|call| matches!(call, DriverCall::Quit)).await
    }

    pub async fn is_present(&self, locator: &Locator) -> bool {
        self.state.lock().await.elements.contains_key(locator)
    }
}

#[async_trait]
impl AutomationDriver for StubDriver {
    async fn open_url(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        state.journal.push(DriverCall::OpenUrl(url.to_string()));
        state.ensure_open()
    }

    async fn find_element(&self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        let mut state = self.state.lock().await;
        state.journal.push(DriverCall::Find(locator.clone()));
        state.ensure_open()?;

        let Some(element) = state.elements.get_mut(locator) else {
            return Err(DriverError::NoSuchElement(locator.to_string()));
        };
        if element.hidden_polls > 0 {
            element.hidden_polls -= 1;
            return Err(DriverError::NoSuchElement(locator.to_string()));
        }

        state.next_handle += 1;
        let handle = ElementHandle::new(format!("stub-{}", state.next_handle));
        state
            .handles
            .insert(handle.id().to_string(), locator.clone());
        Ok(handle)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        let locator = state.record_action(element, DriverCall::Click)?;

        if let Some(effect) = state.on_click.get(&locator).cloned() {
            for hidden in &effect.hide {
                state.elements.remove(hidden);
            }
            for (shown, element) in effect.show {
                state.elements.insert(shown, element);
            }
        }
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        state.record_action(element, DriverCall::Clear).map(|_| ())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        state
            .record_action(element, |locator| {
                DriverCall::SendKeys(locator, text.to_string())
            })
            .map(|_| ())
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        let (locator, current) = state.live_element(element)?;
        state.journal.push(DriverCall::IsDisplayed(locator));
        Ok(current.displayed)
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        let (locator, current) = state.live_element(element)?;
        state.journal.push(DriverCall::IsEnabled(locator));
        Ok(current.enabled)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let mut state = self.state.lock().await;
        state.journal.push(DriverCall::Screenshot);
        state.ensure_open()?;
        Ok(STUB_PNG.to_vec())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        state.journal.push(DriverCall::Quit);
        state.ensure_open()?;
        state.closed = true;
        match state.quit_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        "stub".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hidden_polls_delay_lookup() {
        let driver = StubDriver::new()
            .with_element(Locator::name("EmailField"), StubElement::visible().appearing_after(1));

        let first = driver.find_element(&Locator::name("EmailField")).await;
        assert!(first.unwrap_err().is_no_such_element());
        assert!(driver.find_element(&Locator::name("EmailField")).await.is_ok());
    }

    #[tokio::test]
    async fn test_click_swaps_screens_and_stales_old_handles() {
        let driver = StubDriver::wire_fixture();
        let login = driver.find_element(&Locator::name("Log In")).await.unwrap();
        let email = driver.find_element(&Locator::name("EmailField")).await.unwrap();

        driver.click(&login).await.unwrap();

        assert!(driver.is_present(&Locator::id("homePage")).await);
        assert!(!driver.is_present(&Locator::name("Log In")).await);
        assert!(matches!(
            driver.clear(&email).await,
            Err(DriverError::StaleElement(_))
        ));
    }

    #[tokio::test]
    async fn test_commands_after_quit_fail() {
        let driver = StubDriver::new();
        driver.quit().await.unwrap();
        assert!(matches!(
            driver.open_url("wire://x").await,
            Err(DriverError::Session(_))
        ));
        assert_eq!(driver.quit_count().await, 1);
    }

    #[tokio::test]
    async fn test_rejecting_element_fails_actions() {
        let driver = StubDriver::new()
            .with_element(Locator::name("Log In"), StubElement::visible().rejecting_actions());
        let handle = driver.find_element(&Locator::name("Log In")).await.unwrap();
        assert!(matches!(
            driver.click(&handle).await,
            Err(DriverError::Command { .. })
        ));
        assert_eq!(
            driver.actions().await,
            vec![DriverCall::Click(Locator::name("Log In"))]
        );
        assert!(driver.is_present(&Locator::name("Log In")).await);
    }
}
