use super::{AutomationDriver, Capabilities, DriverError, ElementHandle};
use crate::locators::Locator;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// W3C web element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
/// Pre-W3C (JSONWP) identifier key still returned by some Appium builds.
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const STATUS_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// One W3C WebDriver session against an Appium server.
pub struct RemoteDriver {
    client: Client,
    base_url: String,
    session_id: String,
}

impl RemoteDriver {
    pub async fn start_session(
        server_url: &str,
        capabilities: &Capabilities,
    ) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(COMMAND_TIMEOUT)
            .build()
            .map_err(|e| DriverError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        let base_url = server_url.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{}/session", base_url))
            .json(&capabilities.new_session_body())
            .send()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| DriverError::Transport(format!("Invalid session response: {}", e)))?;

        let session_id = extract_session_id(status, &body)?;

        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    /// True when `GET {server_url}/status` answers at all within a second.
    pub async fn is_server_reachable(server_url: &str) -> bool {
        let Ok(client) = Client::builder().timeout(STATUS_PROBE_TIMEOUT).build() else {
            return false;
        };
        client
            .get(format!("{}/status", server_url.trim_end_matches('/')))
            .send()
            .await
            .is_ok()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| DriverError::Transport(format!("Invalid response from {}: {}", url, e)))?;

        parse_response(status, body)
    }

    async fn element_command(
        &self,
        method: Method,
        element: &ElementHandle,
        command: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        self.command(method, &format!("/element/{}/{}", element.id(), command), body)
            .await
    }
}

fn extract_session_id(status: StatusCode, body: &Value) -> Result<String, DriverError> {
    if let Some(err) = w3c_error(body) {
        return Err(err);
    }
    if !status.is_success() {
        return Err(DriverError::Session(format!(
            "Session creation returned {}: {}",
            status, body
        )));
    }
    body.pointer("/value/sessionId")
        .or_else(|| body.get("sessionId"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| DriverError::Session(format!("No sessionId in response: {}", body)))
}

fn w3c_error(body: &Value) -> Option<DriverError> {
    let value = body.get("value")?;
    let code = value.get("error")?.as_str()?;
    let message = value
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();

    Some(match code {
        "no such element" => DriverError::NoSuchElement(message),
        "stale element reference" => DriverError::StaleElement(message),
        "invalid session id" => DriverError::Session(message),
        _ => DriverError::Command {
            code: code.to_string(),
            message,
        },
    })
}

/// Unwraps the `value` member of a WebDriver response, mapping W3C error bodies.
pub(crate) fn parse_response(status: StatusCode, body: Value) -> Result<Value, DriverError> {
    if let Some(err) = w3c_error(&body) {
        return Err(err);
    }
    if !status.is_success() {
        return Err(DriverError::Command {
            code: status.as_str().to_string(),
            message: body.to_string(),
        });
    }
    Ok(body.get("value").cloned().unwrap_or(Value::Null))
}

fn element_from_value(value: &Value) -> Result<ElementHandle, DriverError> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(|v| v.as_str())
        .map(ElementHandle::new)
        .ok_or_else(|| DriverError::Command {
            code: "malformed response".to_string(),
            message: format!("No element reference in {}", value),
        })
}

fn expect_bool(value: Value) -> Result<bool, DriverError> {
    value.as_bool().ok_or_else(|| DriverError::Command {
        code: "malformed response".to_string(),
        message: format!("Expected boolean, got {}", value),
    })
}

#[async_trait]
impl AutomationDriver for RemoteDriver {
    async fn open_url(&self, url: &str) -> Result<(), DriverError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn find_element(&self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        let value = self
            .command(
                Method::POST,
                "/element",
                Some(json!({
                    "using": locator.strategy().as_wire(),
                    "value": locator.value()
                })),
            )
            .await?;
        element_from_value(&value)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.element_command(Method::POST, element, "click", Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.element_command(Method::POST, element, "clear", Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.element_command(Method::POST, element, "value", Some(json!({ "text": text })))
            .await
            .map(|_| ())
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let value = self
            .element_command(Method::GET, element, "displayed", None)
            .await?;
        expect_bool(value)
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let value = self
            .element_command(Method::GET, element, "enabled", None)
            .await?;
        expect_bool(value)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value.as_str().ok_or_else(|| DriverError::Command {
            code: "malformed response".to_string(),
            message: "Screenshot value is not a string".to_string(),
        })?;
        STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::Command {
                code: "malformed response".to_string(),
                message: format!("Screenshot is not valid base64: {}", e),
            })
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        parse_response(status, body).map(|_| ())
    }

    fn describe(&self) -> String {
        format!("remote({})", self.session_id)
    }
}
