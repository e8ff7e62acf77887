use crate::interaction::Mode;
use crate::locators::ElementKey;
use crate::{Result, TestError};
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Json,
}

impl FromStr for OutputFormat {
    type Err = TestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            other => Err(TestError::Config(format!("Unknown report format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub name: String,
    pub key: Option<ElementKey>,
    pub mode: Mode,
    pub status: TestStatus,
    pub error: Option<String>,
    pub screenshot_path: Option<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub name: String,
    pub status: TestStatus,
    pub duration: Duration,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

impl ScenarioResult {
    pub fn skipped(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: TestStatus::Skipped,
            duration: Duration::ZERO,
            steps: Vec::new(),
            error: Some(reason.into()),
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Everything one suite run produced, including teardown trouble that never
/// counts against a verdict.
#[derive(Debug, Clone)]
pub struct SuiteReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub driver: String,
    pub scenarios: Vec<ScenarioResult>,
    pub teardown_error: Option<String>,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        !self.scenarios.is_empty()
            && self
                .scenarios
                .iter()
                .all(|s| s.status == TestStatus::Passed)
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioResult> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ReportData {
    title: String,
    run_id: String,
    timestamp: String,
    driver: String,
    summary: Summary,
    scenarios: Vec<ScenarioReport>,
    teardown_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Summary {
    total_scenarios: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    duration_ms: u128,
    pass_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
struct ScenarioReport {
    name: String,
    status: TestStatus,
    duration_ms: u128,
    error: Option<String>,
    steps: Vec<StepReport>,
}

#[derive(Debug, Clone, Serialize)]
struct StepReport {
    name: String,
    key: Option<ElementKey>,
    mode: Mode,
    status: TestStatus,
    error: Option<String>,
    screenshot: Option<String>,
    duration_ms: u128,
}

const MARKDOWN_TEMPLATE: &str = include_str!("../templates/report_markdown.hbs");

pub struct Reporter {
    template_engine: Handlebars<'static>,
    output_format: OutputFormat,
}

impl Reporter {
    pub fn new(output_format: OutputFormat) -> Result<Self> {
        let mut template_engine = Handlebars::new();
        template_engine.register_escape_fn(escape_markdown);
        template_engine
            .register_template_string("markdown", MARKDOWN_TEMPLATE)
            .map_err(|e| {
                TestError::Reporting(format!("Failed to register markdown template: {}", e))
            })?;

        Ok(Self {
            template_engine,
            output_format,
        })
    }

    pub fn render(&self, report: &SuiteReport) -> Result<String> {
        let data = build_report_data(report);
        match self.output_format {
            OutputFormat::Markdown => self
                .template_engine
                .render("markdown", &data)
                .map_err(|e| TestError::Reporting(format!("Failed to render markdown: {}", e))),
            OutputFormat::Json => serde_json::to_string_pretty(&data)
                .map_err(|e| TestError::Reporting(format!("Failed to render JSON: {}", e))),
        }
    }
}

fn build_report_data(report: &SuiteReport) -> ReportData {
    let results = &report.scenarios;
    let total_scenarios = results.len();
    let passed = count_status(results, TestStatus::Passed);
    let failed = count_status(results, TestStatus::Failed);
    let skipped = count_status(results, TestStatus::Skipped);

    let duration: Duration = results.iter().map(|r| r.duration).sum();
    let pass_rate = if total_scenarios > 0 {
        (passed as f64 / total_scenarios as f64) * 100.0
    } else {
        0.0
    };

    let scenarios = results
        .iter()
        .map(|r| ScenarioReport {
            name: r.name.clone(),
            status: r.status,
            duration_ms: r.duration.as_millis(),
            error: r.error.clone(),
            steps: r
                .steps
                .iter()
                .map(|s| StepReport {
                    name: s.name.clone(),
                    key: s.key,
                    mode: s.mode,
                    status: s.status,
                    error: s.error.clone(),
                    screenshot: s.screenshot_path.clone(),
                    duration_ms: s.duration.as_millis(),
                })
                .collect(),
        })
        .collect();

    ReportData {
        title: "Wire iOS Login/Logout Report".to_string(),
        run_id: report.run_id.to_string(),
        timestamp: report
            .started_at
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
        driver: report.driver.clone(),
        summary: Summary {
            total_scenarios,
            passed,
            failed,
            skipped,
            duration_ms: duration.as_millis(),
            pass_rate,
        },
        scenarios,
        teardown_error: report.teardown_error.clone(),
    }
}

/// Keeps interpolated values on one table row: pipes escaped, line breaks as `<br>`.
fn escape_markdown(raw: &str) -> String {
    raw.replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace(['\r', '\n'], "<br>")
}

fn count_status(results: &[ScenarioResult], status: TestStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}
