//! Connectivity report for the Slack Web API.
//!
//! Each check calls the API exactly once, without the rate limit retry used
//! by backups, so a throttled token shows up as such.

use chrono::Local;
use comfy_table::{Cell, Color, Table};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Instant;

use crate::api::SlackApi;
use crate::error::ApiError;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckResult {
    pub test: String,
    pub success: bool,
    pub response_time_ms: f64,
    pub rate_limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub timeout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Ok,
    RateLimited,
    Timeout,
    Error,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Ok => write!(f, "OK"),
            OverallStatus::RateLimited => write!(f, "RATE_LIMITED"),
            OverallStatus::Timeout => write!(f, "TIMEOUT"),
            OverallStatus::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub overall_status: OverallStatus,
    pub total_checks: usize,
    pub successful: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub timed_out: usize,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub timestamp: String,
    pub timeout_setting: u64,
    pub checks: Vec<CheckResult>,
    pub summary: StatusSummary,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn count_of(field: &'static str) -> impl Fn(&Value) -> Option<String> {
    move |body| {
        body.get(field)
            .and_then(Value::as_array)
            .map(|items| format!("{} {}", items.len(), field))
    }
}

pub struct StatusChecker<'a> {
    api: &'a dyn SlackApi,
    timeout_secs: u64,
}

impl<'a> StatusChecker<'a> {
    pub fn new(api: &'a dyn SlackApi, timeout_secs: u64) -> Self {
        Self { api, timeout_secs }
    }

    async fn check(
        &self,
        method: &str,
        params: &[(&str, String)],
        detail: impl Fn(&Value) -> Option<String>,
    ) -> CheckResult {
        let start = Instant::now();
        let result = self.api.call(method, params).await;
        let elapsed = round2(start.elapsed().as_secs_f64() * 1000.0);

        let mut check = CheckResult {
            test: method.to_string(),
            response_time_ms: elapsed,
            ..Default::default()
        };

        match result {
            Ok(body) => {
                check.success = true;
                check.detail = detail(&body);
            }
            Err(ApiError::RateLimited { retry_after, .. }) => {
                let retry_after = retry_after.map(|wait| wait.as_secs()).unwrap_or(0);
                check.rate_limited = true;
                check.retry_after = Some(retry_after);
                check.error = Some(format!("Rate limited, retry after {retry_after} seconds"));
            }
            Err(ApiError::Transport { source, .. }) => {
                check.timeout = source.is_timeout();
                check.error = Some(format!("Connection error: {source}"));
            }
            Err(ApiError::Status { status, body, .. }) => {
                check.status_code = Some(status.as_u16());
                check.error = Some(body);
            }
            Err(e) => check.error = Some(e.to_string()),
        }

        check
    }

    /// Runs `auth.test`, then unless `quick` or authentication failed,
    /// `api.test`, `users.list` and `conversations.list`.
    pub async fn run_checks(&self, quick: bool) -> StatusReport {
        let mut checks = Vec::new();

        let auth = self
            .check("auth.test", &[], |body| {
                let user = body.get("user").and_then(Value::as_str)?;
                let team = body.get("team").and_then(Value::as_str)?;
                Some(format!("{user}@{team}"))
            })
            .await;
        let authenticated = auth.success;
        checks.push(auth);

        if authenticated && !quick {
            checks.push(self.check("api.test", &[], |_| None).await);
            checks.push(
                self.check("users.list", &[("limit", "1".to_string())], count_of("members"))
                    .await,
            );
            checks.push(
                self.check(
                    "conversations.list",
                    &[
                        ("limit", "1".to_string()),
                        ("types", "im,mpim,private_channel".to_string()),
                    ],
                    count_of("channels"),
                )
                .await,
            );
        }

        StatusReport {
            timestamp: Local::now().to_rfc3339(),
            timeout_setting: self.timeout_secs,
            summary: summarize(&checks),
            checks,
        }
    }
}

/// Timeouts outrank rate limiting, which outranks any other failure.
pub fn summarize(checks: &[CheckResult]) -> StatusSummary {
    let successful = checks.iter().filter(|c| c.success).count();
    let rate_limited = checks.iter().filter(|c| c.rate_limited).count();
    let timed_out = checks.iter().filter(|c| c.timeout).count();
    let failed = checks.len() - successful;

    let avg_response_time_ms = if checks.is_empty() {
        0.0
    } else {
        round2(checks.iter().map(|c| c.response_time_ms).sum::<f64>() / checks.len() as f64)
    };

    let overall_status = if timed_out > 0 {
        OverallStatus::Timeout
    } else if rate_limited > 0 {
        OverallStatus::RateLimited
    } else if failed > 0 {
        OverallStatus::Error
    } else {
        OverallStatus::Ok
    };

    StatusSummary {
        overall_status,
        total_checks: checks.len(),
        successful,
        failed,
        rate_limited,
        timed_out,
        avg_response_time_ms,
    }
}

pub fn render_table(report: &StatusReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Check", "Result", "Time (ms)", "Detail"]);

    for check in &report.checks {
        let (result, color) = if check.success {
            ("ok", Color::Green)
        } else if check.timeout {
            ("timeout", Color::Red)
        } else if check.rate_limited {
            ("rate limited", Color::Yellow)
        } else {
            ("failed", Color::Red)
        };

        let detail = check
            .detail
            .clone()
            .or_else(|| check.error.clone())
            .unwrap_or_default();

        table.add_row(vec![
            Cell::new(&check.test),
            Cell::new(result).fg(color),
            Cell::new(format!("{:.2}", check.response_time_ms)),
            Cell::new(detail),
        ]);
    }

    table
}
