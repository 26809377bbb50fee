//! # Reports
//!
//! A [`Report`] is built once, after teardown, from everything the run
//! recorded. It is never modified afterwards; [`render`] turns it into any
//! number of output formats.

mod html;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CleanupFailure;
use crate::testing::{TestResult, TestStatus};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub title: String,
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Seed the payloads were generated from; rerun with it to reproduce them.
    pub seed: u64,
    pub modules: Vec<String>,
    pub execution: String,
    pub workers: usize,
    pub generate_data: bool,
    pub authenticated: bool,
    pub auth_detail: Option<String>,
    pub schema_path: Option<String>,
    pub cancelled: bool,
    pub harness_version: String,
}

impl RunMetadata {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at)
            .to_std()
            .map(|duration| duration.as_secs_f64())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    /// Percentage of all results that passed.
    pub pass_rate: f64,
}

impl Summary {
    fn record(&mut self, status: TestStatus) {
        self.total += 1;
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Error => self.errors += 1,
            TestStatus::Skipped => self.skipped += 1,
        }
        self.pass_rate = self.passed as f64 / self.total as f64 * 100.0;
    }

    pub fn of<'a>(results: impl IntoIterator<Item = &'a TestResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.record(result.status);
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointSummary {
    #[serde(flatten)]
    pub counts: Summary,
    /// Mean latency of the requests that were actually sent.
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub schema_version: u32,
    pub metadata: RunMetadata,
    pub summary: Summary,
    pub by_module: BTreeMap<String, Summary>,
    pub by_endpoint: BTreeMap<String, EndpointSummary>,
    pub results: Vec<TestResult>,
    pub cleanup_failures: Vec<CleanupFailure>,
}

impl Report {
    pub fn build(
        metadata: RunMetadata,
        mut results: Vec<TestResult>,
        cleanup_failures: Vec<CleanupFailure>,
    ) -> Self {
        results.sort_by_key(|result| result.sequence);

        let summary = Summary::of(&results);

        let mut by_module: BTreeMap<String, Summary> = BTreeMap::new();
        for result in &results {
            by_module
                .entry(result.module.clone())
                .or_default()
                .record(result.status);
        }

        let mut by_endpoint: BTreeMap<String, EndpointSummary> = BTreeMap::new();
        let mut sent: BTreeMap<&str, usize> = BTreeMap::new();
        for result in &results {
            let entry = by_endpoint.entry(result.endpoint.clone()).or_default();
            entry.counts.record(result.status);
            if result.status != TestStatus::Skipped || result.response.is_some() {
                let count = sent.entry(result.endpoint.as_str()).or_default();
                *count += 1;
                entry.avg_latency_ms += (result.latency_ms - entry.avg_latency_ms) / *count as f64;
                entry.max_latency_ms = entry.max_latency_ms.max(result.latency_ms);
            }
        }

        Self {
            schema_version: SCHEMA_VERSION,
            metadata,
            summary,
            by_module,
            by_endpoint,
            results,
            cleanup_failures,
        }
    }

    /// Process exit code: 130 when cancelled, 1 when anything failed or
    /// errored, 0 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.metadata.cancelled {
            130
        } else if self.summary.failed + self.summary.errors > 0 {
            1
        } else {
            0
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results
            .iter()
            .filter(|result| matches!(result.status, TestStatus::Fail | TestStatus::Error))
    }
}

/// Renders a report. Rendering the same report twice gives the same text.
pub fn render(report: &Report, format: ReportFormat) -> String {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(report).unwrap_or_else(|err| {
            serde_json::json!({ "error": format!("Failed to serialize report: {err}") }).to_string()
        }),
        ReportFormat::Html => html::render(report),
    }
}
