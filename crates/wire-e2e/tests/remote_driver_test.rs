//! RemoteDriver against an in-process fake Appium server.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warp::Filter;
use warp::http::{Method, StatusCode};
use warp::hyper::body::Bytes;
use warp::path::FullPath;
use wire_e2e::TestError;
use wire_e2e::config::{DriverMode, HarnessConfig};
use wire_e2e::driver::{self, AutomationDriver, Capabilities, DriverError, RemoteDriver};
use wire_e2e::interaction::{Action, Interactor, Mode};
use wire_e2e::locators::{ElementKey, Locator, LocatorCatalog};

const SESSION: &str = "fake-session";
const W3C_ELEMENT: &str = "element-6066-11e4-a52e-4f735466cecf";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    body: Value,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

fn ok(value: Value) -> (StatusCode, Value) {
    (StatusCode::OK, json!({ "value": value }))
}

fn w3c_error(status: StatusCode, error: &str) -> (StatusCode, Value) {
    (
        status,
        json!({ "value": { "error": error, "message": format!("fake: {}", error), "stacktrace": "" } }),
    )
}

fn find(body: &Value) -> (StatusCode, Value) {
    let using = body["using"].as_str().unwrap_or_default();
    let value = body["value"].as_str().unwrap_or_default();
    match (using, value) {
        ("name", "Log In") => ok(json!({ W3C_ELEMENT: "el-login" })),
        ("accessibility id", "legacyButton") => ok(json!({ "ELEMENT": "el-legacy" })),
        ("id", "detached") => ok(json!({ W3C_ELEMENT: "el-gone" })),
        _ => w3c_error(StatusCode::NOT_FOUND, "no such element"),
    }
}

fn session_command(method: &str, command: &str, body: &Value) -> (StatusCode, Value) {
    let element = command
        .strip_prefix("/element/")
        .and_then(|rest| rest.split_once('/'));
    if let Some(("el-gone", _)) = element {
        return w3c_error(StatusCode::NOT_FOUND, "stale element reference");
    }

    match (method, command, element) {
        ("POST", "/element", _) => find(body),
        ("POST", "/url", _) => ok(Value::Null),
        ("GET", "/screenshot", _) => ok(json!(STANDARD.encode(PNG))),
        ("GET", _, Some((_, "displayed"))) => ok(json!(true)),
        ("GET", _, Some((_, "enabled"))) => ok(json!(true)),
        ("POST", _, Some((_, "click" | "clear" | "value"))) => ok(Value::Null),
        _ => w3c_error(StatusCode::NOT_FOUND, "unknown command"),
    }
}

fn respond(method: &str, path: &str, body: &Value) -> (StatusCode, Value) {
    let Some(path) = path.strip_prefix("/wd/hub") else {
        return w3c_error(StatusCode::NOT_FOUND, "unknown command");
    };
    let session_path = format!("/session/{}", SESSION);

    match (method, path) {
        ("GET", "/status") => ok(json!({ "ready": true, "message": "fake appium" })),
        ("POST", "/session") => ok(json!({
            "sessionId": SESSION,
            "capabilities": body["capabilities"]["alwaysMatch"].clone()
        })),
        ("DELETE", p) if p == session_path => ok(Value::Null),
        (_, p) => match p.strip_prefix(session_path.as_str()) {
            Some(command) => session_command(method, command, body),
            None => w3c_error(StatusCode::NOT_FOUND, "invalid session id"),
        },
    }
}

/// Starts the fake server and returns its `/wd/hub` base URL plus the request log.
async fn spawn_fake_appium() -> (String, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let recorder = log.clone();

    let routes = warp::method()
        .and(warp::path::full())
        .and(warp::body::bytes())
        .map(move |method: Method, path: FullPath, bytes: Bytes| {
            let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            recorder.lock().unwrap().push(Recorded {
                method: method.to_string(),
                path: path.as_str().to_string(),
                body: body.clone(),
            });
            let (status, reply) = respond(method.as_str(), path.as_str(), &body);
            warp::reply::with_status(warp::reply::json(&reply), status)
        });

    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (format!("http://{}/wd/hub", addr), log)
}

fn requests(log: &Log, method: &str) -> Vec<Recorded> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|r| r.method == method)
        .cloned()
        .collect()
}

async fn unused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/wd/hub", addr)
}

#[tokio::test]
async fn test_session_uses_w3c_capabilities() {
    let (url, log) = spawn_fake_appium().await;

    let driver = RemoteDriver::start_session(&url, &Capabilities::default())
        .await
        .unwrap();
    assert_eq!(driver.session_id(), SESSION);
    assert_eq!(driver.describe(), format!("remote({})", SESSION));

    let created = requests(&log, "POST")
        .into_iter()
        .find(|r| r.path == "/wd/hub/session")
        .unwrap();
    let caps = &created.body["capabilities"]["alwaysMatch"];
    assert_eq!(caps["platformName"], "iOS");
    assert_eq!(caps["appium:automationName"], "XCUITest");
    assert_eq!(caps["appium:bundleId"], "com.wearezeta.zclient.ios");
}

#[tokio::test]
async fn test_find_element_maps_strategies_and_errors() {
    let (url, log) = spawn_fake_appium().await;
    let driver = RemoteDriver::start_session(&url, &Capabilities::default())
        .await
        .unwrap();

    let login = driver.find_element(&Locator::name("Log In")).await.unwrap();
    assert_eq!(login.id(), "el-login");

    let legacy = driver
        .find_element(&Locator::accessibility_id("legacyButton"))
        .await
        .unwrap();
    assert_eq!(legacy.id(), "el-legacy");

    let missing = driver
        .find_element(&Locator::xpath("//XCUIElementTypeButton[@name=\"Nope\"]"))
        .await
        .unwrap_err();
    assert!(missing.is_no_such_element());

    let lookups: Vec<Value> = requests(&log, "POST")
        .into_iter()
        .filter(|r| r.path.ends_with("/element"))
        .map(|r| r.body)
        .collect();
    assert_eq!(lookups.len(), 3);
    assert_eq!(lookups[1]["using"], "accessibility id");
    assert_eq!(lookups[2]["using"], "xpath");
}

#[tokio::test]
async fn test_element_commands() {
    let (url, log) = spawn_fake_appium().await;
    let driver = RemoteDriver::start_session(&url, &Capabilities::default())
        .await
        .unwrap();
    let login = driver.find_element(&Locator::name("Log In")).await.unwrap();

    assert!(driver.is_displayed(&login).await.unwrap());
    assert!(driver.is_enabled(&login).await.unwrap());
    driver.clear(&login).await.unwrap();
    driver.send_keys(&login, "qa@wire.com").await.unwrap();
    driver.click(&login).await.unwrap();

    let typed = requests(&log, "POST")
        .into_iter()
        .find(|r| r.path.ends_with("/element/el-login/value"))
        .unwrap();
    assert_eq!(typed.body["text"], "qa@wire.com");

    let detached = driver.find_element(&Locator::id("detached")).await.unwrap();
    assert!(matches!(
        driver.click(&detached).await,
        Err(DriverError::StaleElement(_))
    ));
}

#[tokio::test]
async fn test_screenshot_and_quit() {
    let (url, log) = spawn_fake_appium().await;
    let driver = RemoteDriver::start_session(&url, &Capabilities::default())
        .await
        .unwrap();

    driver.open_url("wire://access/?config=test").await.unwrap();
    assert_eq!(driver.screenshot().await.unwrap(), PNG);
    driver.quit().await.unwrap();

    let deletes = requests(&log, "DELETE");
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].path, format!("/wd/hub/session/{}", SESSION));
}

#[tokio::test]
async fn test_interactor_over_remote_driver() {
    let (url, log) = spawn_fake_appium().await;
    let config = HarnessConfig {
        server_url: url,
        driver: DriverMode::Remote,
        ..HarnessConfig::default()
    };
    let driver = driver::connect(&config).await.unwrap();
    let interactor = Interactor::new(driver, LocatorCatalog::wire())
        .with_poll_interval(Duration::from_millis(20));

    interactor
        .act(
            ElementKey::LoginButton,
            Action::Click,
            Mode::Required,
            Duration::from_millis(200),
        )
        .await
        .unwrap();

    let clicks: Vec<_> = requests(&log, "POST")
        .into_iter()
        .filter(|r| r.path.ends_with("/click"))
        .collect();
    assert_eq!(clicks.len(), 1);
    assert!(clicks[0].path.ends_with("/element/el-login/click"));
}

#[tokio::test]
async fn test_server_reachability() {
    let (url, _log) = spawn_fake_appium().await;
    assert!(RemoteDriver::is_server_reachable(&url).await);
    assert!(!RemoteDriver::is_server_reachable(&unused_url().await).await);
}

#[tokio::test]
async fn test_connect_remote_without_server_is_setup_error() {
    let config = HarnessConfig {
        server_url: unused_url().await,
        driver: DriverMode::Remote,
        ..HarnessConfig::default()
    };
    let err = driver::connect(&config).await.err().unwrap();
    assert!(matches!(err, TestError::Setup(_)));
}

#[tokio::test]
async fn test_connect_auto_falls_back_to_stub() {
    let config = HarnessConfig {
        server_url: unused_url().await,
        driver: DriverMode::Auto,
        ..HarnessConfig::default()
    };
    let driver = driver::connect(&config).await.unwrap();
    assert_eq!(driver.describe(), "stub");
}
