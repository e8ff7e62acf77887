use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Session capabilities for the XCUITest backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Capabilities {
    pub platform_name: String,
    pub device_name: String,
    pub udid: Option<String>,
    pub platform_version: Option<String>,
    pub automation_name: String,
    /// Path to an `.ipa`/`.app` to install. Takes precedence over `bundle_id`.
    pub app: Option<String>,
    pub bundle_id: Option<String>,
    pub no_reset: bool,
    pub full_reset: bool,
    pub new_command_timeout_secs: u64,
    pub include_safari_in_webviews: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            platform_name: "iOS".to_string(),
            device_name: "iPhone 15".to_string(),
            udid: None,
            platform_version: None,
            automation_name: "XCUITest".to_string(),
            app: None,
            bundle_id: Some("com.wearezeta.zclient.ios".to_string()),
            no_reset: false,
            full_reset: false,
            new_command_timeout_secs: 300,
            include_safari_in_webviews: true,
        }
    }
}

impl Capabilities {
    /// W3C `alwaysMatch` map; vendor keys carry the `appium:` prefix.
    pub fn to_always_match(&self) -> Value {
        let mut caps = Map::new();
        caps.insert("platformName".into(), json!(self.platform_name));
        caps.insert("appium:deviceName".into(), json!(self.device_name));
        caps.insert("appium:automationName".into(), json!(self.automation_name));
        if let Some(udid) = &self.udid {
            caps.insert("appium:udid".into(), json!(udid));
        }
        if let Some(version) = &self.platform_version {
            caps.insert("appium:platformVersion".into(), json!(version));
        }
        match (&self.app, &self.bundle_id) {
            (Some(app), _) => {
                caps.insert("appium:app".into(), json!(app));
            }
            (None, Some(bundle_id)) => {
                caps.insert("appium:bundleId".into(), json!(bundle_id));
            }
            (None, None) => {}
        }
        caps.insert("appium:noReset".into(), json!(self.no_reset));
        caps.insert("appium:fullReset".into(), json!(self.full_reset));
        caps.insert(
            "appium:newCommandTimeout".into(),
            json!(self.new_command_timeout_secs),
        );
        caps.insert(
            "appium:includeSafariInWebviews".into(),
            json!(self.include_safari_in_webviews),
        );
        Value::Object(caps)
    }

    /// Body for `POST /session`.
    pub fn new_session_body(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": self.to_always_match(),
                "firstMatch": [{}]
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_path_wins_over_bundle_id() {
        let caps = Capabilities {
            app: Some("/tmp/Wire.ipa".to_string()),
            ..Default::default()
        };
        let map = caps.to_always_match();
        assert_eq!(map["appium:app"], "/tmp/Wire.ipa");
        assert!(map.get("appium:bundleId").is_none());
    }

    #[test]
    fn test_vendor_keys_are_prefixed() {
        let caps = Capabilities {
            udid: Some("D0A05791-7A28-425F-A108-433CA671C2A1".to_string()),
            platform_version: Some("18.3".to_string()),
            ..Default::default()
        };
        let body = caps.new_session_body();
        let always = &body["capabilities"]["alwaysMatch"];
        assert_eq!(always["platformName"], "iOS");
        assert_eq!(always["appium:automationName"], "XCUITest");
        assert_eq!(always["appium:platformVersion"], "18.3");
        assert_eq!(always["appium:newCommandTimeout"], 300);
        assert!(always.get("udid").is_none());
    }
}
