//! Semantic element keys and the ordered locator chains that resolve them.
//!
//! Call sites only ever name an [`ElementKey`]. Which platform expressions
//! are tried, and in what order, is decided here, so adding a fallback for a
//! renamed accessibility identifier never touches scenario code.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Element lookup strategy understood by the XCUITest backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Name,
    AccessibilityId,
    Id,
    XPath,
}

impl Strategy {
    /// The `using` value sent on the wire.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Strategy::Name => "name",
            Strategy::AccessibilityId => "accessibility id",
            Strategy::Id => "id",
            Strategy::XPath => "xpath",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    strategy: Strategy,
    value: String,
}

impl Locator {
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::new(Strategy::Name, value)
    }

    pub fn accessibility_id(value: impl Into<String>) -> Self {
        Self::new(Strategy::AccessibilityId, value)
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(Strategy::Id, value)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, value)
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.strategy, self.value)
    }
}

/// Renders a locator chain as `[name:"a", xpath:"//b"]` for failure messages.
pub fn describe_chain(locators: &[Locator]) -> String {
    let parts: Vec<String> = locators.iter().map(|l| l.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Logical UI roles of the Wire app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementKey {
    // Deeplink confirmation dialogs
    OpenButton,
    ProceedButton,

    // Login screen
    LoginEntryButton,
    LoginButton,
    EmailField,
    PasswordField,
    LoginScreen,

    // Authenticated state
    IgnoreBackupButton,
    HomeScreen,
    SettingsButton,
    AccountButton,
    LogoutButton,
    LogoutConfirmButton,
}

impl ElementKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKey::OpenButton => "OPEN_BUTTON",
            ElementKey::ProceedButton => "PROCEED_BUTTON",
            ElementKey::LoginEntryButton => "LOGIN_ENTRY_BUTTON",
            ElementKey::LoginButton => "LOGIN_BUTTON",
            ElementKey::EmailField => "EMAIL_FIELD",
            ElementKey::PasswordField => "PASSWORD_FIELD",
            ElementKey::LoginScreen => "LOGIN_SCREEN",
            ElementKey::IgnoreBackupButton => "IGNORE_BACKUP_BUTTON",
            ElementKey::HomeScreen => "HOME_SCREEN",
            ElementKey::SettingsButton => "SETTINGS_BUTTON",
            ElementKey::AccountButton => "ACCOUNT_BUTTON",
            ElementKey::LogoutButton => "LOGOUT_BUTTON",
            ElementKey::LogoutConfirmButton => "LOGOUT_CONFIRM_BUTTON",
        }
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only key → locator chain table. Only [`CatalogBuilder`] can populate one.
#[derive(Debug, Clone)]
pub struct LocatorCatalog {
    entries: HashMap<ElementKey, Vec<Locator>>,
}

static WIRE_CATALOG: Lazy<Arc<LocatorCatalog>> = Lazy::new(|| Arc::new(build_wire_catalog()));

impl LocatorCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// The process-wide catalog for the Wire iOS app.
    pub fn wire() -> Arc<LocatorCatalog> {
        WIRE_CATALOG.clone()
    }

    /// Ordered locators for `key`; empty when the key is not catalogued.
    pub fn locators(&self, key: ElementKey) -> &[Locator] {
        self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: ElementKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = ElementKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entries: HashMap<ElementKey, Vec<Locator>>,
}

impl CatalogBuilder {
    /// Appends `locators` to the chain for `key`, after any already registered.
    pub fn entry(mut self, key: ElementKey, locators: impl IntoIterator<Item = Locator>) -> Self {
        self.entries.entry(key).or_default().extend(locators);
        self
    }

    pub fn build(self) -> LocatorCatalog {
        LocatorCatalog {
            entries: self.entries,
        }
    }
}

fn build_wire_catalog() -> LocatorCatalog {
    LocatorCatalog::builder()
        .entry(
            ElementKey::OpenButton,
            [
                Locator::xpath(r#"//XCUIElementTypeButton[@name="Open"]"#),
                Locator::accessibility_id("Open"),
            ],
        )
        .entry(
            ElementKey::ProceedButton,
            [
                Locator::xpath(r#"//XCUIElementTypeButton[@name="Proceed"]"#),
                Locator::accessibility_id("Proceed"),
            ],
        )
        .entry(
            ElementKey::LoginEntryButton,
            [Locator::xpath(
                r#"//XCUIElementTypeStaticText[@name="Log in"]"#,
            )],
        )
        .entry(
            ElementKey::LoginButton,
            [Locator::name("Log In"), Locator::accessibility_id("loginButton")],
        )
        .entry(
            ElementKey::EmailField,
            [
                Locator::name("EmailField"),
                Locator::xpath("//XCUIElementTypeTextField"),
            ],
        )
        .entry(
            ElementKey::PasswordField,
            [
                Locator::name("PasswordField"),
                Locator::xpath("//XCUIElementTypeSecureTextField"),
            ],
        )
        .entry(
            ElementKey::LoginScreen,
            [Locator::id("loginScreen"), Locator::name("EmailField")],
        )
        .entry(ElementKey::IgnoreBackupButton, [Locator::name("ignore_backup")])
        .entry(
            ElementKey::HomeScreen,
            [Locator::id("homePage"), Locator::name("bottomBarSettingsButton")],
        )
        .entry(
            ElementKey::SettingsButton,
            [Locator::name("bottomBarSettingsButton")],
        )
        .entry(ElementKey::AccountButton, [Locator::name("Account")])
        .entry(
            ElementKey::LogoutButton,
            [
                Locator::name("Log OutField"),
                Locator::id("logoutButton"),
                Locator::xpath(r#"//XCUIElementTypeButton[@name="Log Out"]"#),
            ],
        )
        .entry(
            ElementKey::LogoutConfirmButton,
            [Locator::xpath(
                r#"//XCUIElementTypeAlert//XCUIElementTypeButton[@name="Log Out"]"#,
            )],
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_wire_catalog_covers_every_key() {
        let catalog = LocatorCatalog::wire();
        let all = [
            ElementKey::OpenButton,
            ElementKey::ProceedButton,
            ElementKey::LoginEntryButton,
            ElementKey::LoginButton,
            ElementKey::EmailField,
            ElementKey::PasswordField,
            ElementKey::LoginScreen,
            ElementKey::IgnoreBackupButton,
            ElementKey::HomeScreen,
            ElementKey::SettingsButton,
            ElementKey::AccountButton,
            ElementKey::LogoutButton,
            ElementKey::LogoutConfirmButton,
        ];
        for key in all {
            assert!(
                !catalog.locators(key).is_empty(),
                "{} has no locators",
                key
            );
        }
        assert_eq!(catalog.len(), all.len());

        let registered: HashSet<ElementKey> = catalog.keys().collect();
        assert_eq!(registered, all.into_iter().collect::<HashSet<_>>());
    }

    #[test]
    fn test_chain_order_is_declaration_order() {
        let catalog = LocatorCatalog::builder()
            .entry(ElementKey::LoginButton, [Locator::name("first")])
            .entry(
                ElementKey::LoginButton,
                [Locator::xpath("//second"), Locator::id("third")],
            )
            .build();

        let chain = catalog.locators(ElementKey::LoginButton);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0], Locator::name("first"));
        assert_eq!(chain[1].strategy(), Strategy::XPath);
        assert_eq!(chain[2].value(), "third");
    }

    #[test]
    fn test_unknown_key_yields_empty_chain() {
        let catalog = LocatorCatalog::builder().build();
        assert!(catalog.locators(ElementKey::HomeScreen).is_empty());
        assert!(!catalog.contains(ElementKey::HomeScreen));
    }

    #[test]
    fn test_describe_chain() {
        let chain = [Locator::name("Log In"), Locator::accessibility_id("login")];
        assert_eq!(
            describe_chain(&chain),
            r#"[name:"Log In", accessibility id:"login"]"#
        );
    }

    #[test]
    fn test_element_key_serializes_as_screaming_snake() {
        let json = serde_json::to_string(&ElementKey::IgnoreBackupButton).unwrap();
        assert_eq!(json, "\"IGNORE_BACKUP_BUTTON\"");
        assert_eq!(ElementKey::IgnoreBackupButton.as_str(), "IGNORE_BACKUP_BUTTON");
    }
}
