//! Run configuration.
//!
//! Settings come from command line flags with environment variable
//! fallbacks (a `.env` file is loaded first). They are read once at startup,
//! validated into a [`RunConfig`] and passed by reference from there on.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LLM_API_BASE_URL` | http://localhost:8000 | API under test |
//! | `LLM_API_TOKEN` | - | JWT bearer token |
//! | `LLM_API_TIMEOUT` | 30 | Request timeout (seconds) |
//! | `LLM_GENERATE_DATA` | true | Provision test data before running cases |
//! | `LLM_PARALLEL_EXECUTION` | false | Run cases on a bounded worker pool |
//! | `LLM_PARALLEL_WORKERS` | 4 | Worker bound in parallel mode |
//! | `LLM_SEED` | - | Fixed seed for data generation |
//! | `LLM_SCHEMA_PATH` | openapi.json (if present) | OpenAPI document |
//! | `LLM_REPORT_FORMAT` | html | `html`, `json` or both, comma-separated |
//! | `LLM_REPORT_DIR` | reports | Output directory |
//! | `LLM_REPORT_TITLE` | LLM API Test Report | Report title |
//! | `LLM_LOG_LEVEL` | info | Log level |

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::builder::{BoolishValueParser, FalseyValueParser};
use clap::{ArgAction, Args};
use reqwest::Url;

use crate::auth::AuthToken;
use crate::error::HarnessError;
use crate::report::ReportFormat;
use crate::testing::Module;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_SCHEMA_PATH: &str = "openapi.json";
pub const DEFAULT_REPORT_TITLE: &str = "LLM API Test Report";
pub const DEFAULT_WORKERS: usize = 4;
const MAX_WORKERS: usize = 64;

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Base URL of the API under test.
    #[arg(long, env = "LLM_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// JWT bearer token attached to authenticated endpoints.
    #[arg(long, env = "LLM_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, env = "LLM_API_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Whether to provision test data.
    #[arg(
        long,
        env = "LLM_GENERATE_DATA",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub generate_data: bool,

    /// Disable test data generation (overrides `--generate-data`).
    #[arg(long)]
    pub no_generate_data: bool,

    /// Run cases on a bounded worker pool.
    #[arg(
        long,
        env = "LLM_PARALLEL_EXECUTION",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub parallel: bool,

    /// Number of workers in parallel mode.
    #[arg(long, env = "LLM_PARALLEL_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Seed for deterministic payload generation.
    #[arg(long, env = "LLM_SEED")]
    pub seed: Option<u64>,

    /// OpenAPI document used for response validation.
    #[arg(long, env = "LLM_SCHEMA_PATH")]
    pub schema_path: Option<PathBuf>,

    /// Report formats to write.
    #[arg(
        long,
        env = "LLM_REPORT_FORMAT",
        value_enum,
        value_delimiter = ',',
        default_value = "html"
    )]
    pub report_format: Vec<ReportFormat>,

    /// Directory reports and run history are written to.
    #[arg(long, env = "LLM_REPORT_DIR", default_value = "reports")]
    pub report_dir: PathBuf,

    /// Title shown in reports.
    #[arg(long, env = "LLM_REPORT_TITLE", default_value = DEFAULT_REPORT_TITLE)]
    pub report_title: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "LLM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: 30,
            generate_data: true,
            no_generate_data: false,
            parallel: false,
            workers: DEFAULT_WORKERS,
            seed: None,
            schema_path: None,
            report_format: vec![ReportFormat::Html],
            report_dir: PathBuf::from("reports"),
            report_title: DEFAULT_REPORT_TITLE.to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// How cases are dispatched once their prerequisites exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel { workers: usize },
}

impl ExecutionMode {
    pub fn worker_count(self) -> usize {
        match self {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel { workers } => workers,
        }
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: Url,
    pub token: Option<AuthToken>,
    pub timeout: Duration,
    pub generate_data: bool,
    pub execution: ExecutionMode,
    pub seed: Option<u64>,
    pub schema_path: Option<PathBuf>,
    pub report_formats: Vec<ReportFormat>,
    pub report_dir: PathBuf,
    pub report_title: String,
    pub modules: Vec<Module>,
}

impl Settings {
    /// Validates the settings and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!("Base URL scheme `{}` is not http(s)", url.scheme())),
            Err(err) => errors.push(format!("Invalid base URL `{}`: {err}", self.base_url)),
        }

        if self.timeout == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.parallel && (self.workers == 0 || self.workers > MAX_WORKERS) {
            errors.push(format!("Worker count must be between 1 and {MAX_WORKERS}"));
        }

        if self.report_format.is_empty() {
            errors.push("At least one report format is required".to_string());
        }

        if let Some(path) = &self.schema_path {
            if !path.is_file() {
                errors.push(format!("Schema file `{}` does not exist", path.display()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Builds the run configuration for the given module selection.
    pub fn resolve(&self, modules: &[Module]) -> Result<RunConfig, HarnessError> {
        self.validate()
            .map_err(|errors| HarnessError::config(errors.join("; ")))?;

        let base_url = Url::parse(&self.base_url)
            .map_err(|err| HarnessError::config(format!("Invalid base URL: {err}")))?;

        let token = self
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(AuthToken::new);

        let execution = if self.parallel {
            ExecutionMode::Parallel {
                workers: self.workers,
            }
        } else {
            ExecutionMode::Sequential
        };

        let mut report_formats = self.report_format.clone();
        report_formats.dedup();

        Ok(RunConfig {
            base_url,
            token,
            timeout: Duration::from_secs(self.timeout),
            generate_data: self.generate_data && !self.no_generate_data,
            execution,
            seed: self.seed,
            schema_path: self.effective_schema_path(),
            report_formats,
            report_dir: self.report_dir.clone(),
            report_title: self.report_title.clone(),
            modules: Module::expand(modules),
        })
    }

    /// An explicit path always wins; otherwise `openapi.json` is used when it exists.
    fn effective_schema_path(&self) -> Option<PathBuf> {
        match &self.schema_path {
            Some(path) => Some(path.clone()),
            None => {
                let fallback = Path::new(DEFAULT_SCHEMA_PATH);
                if fallback.is_file() {
                    Some(fallback.to_path_buf())
                } else {
                    tracing::warn!(
                        path = DEFAULT_SCHEMA_PATH,
                        "No OpenAPI document found, schema validation disabled"
                    );
                    None
                }
            }
        }
    }
}

/// Loads `.env` from the working directory if one exists.
pub fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("Failed to load .env: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn validate_collects_every_problem() {
        let settings = Settings {
            base_url: "ftp://example.com".into(),
            timeout: 0,
            parallel: true,
            workers: 0,
            report_format: vec![],
            ..Default::default()
        };

        let errors = settings.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn missing_explicit_schema_is_a_configuration_error() {
        let settings = Settings {
            schema_path: Some(PathBuf::from("/definitely/not/here/openapi.json")),
            ..Default::default()
        };

        let err = settings.resolve(&[Module::All]).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }

    #[test]
    fn resolve_applies_flags() {
        let settings = Settings {
            token: Some("  abc  ".into()),
            parallel: true,
            workers: 8,
            no_generate_data: true,
            ..Default::default()
        };

        let config = settings.resolve(&[Module::Datasets]).unwrap();
        assert_eq!(config.token.as_ref().map(|t| t.as_str()), Some("abc"));
        assert_eq!(config.execution, ExecutionMode::Parallel { workers: 8 });
        assert!(!config.generate_data);
        assert_eq!(config.modules, vec![Module::Datasets]);
    }

    #[test]
    fn blank_token_is_treated_as_absent() {
        let settings = Settings {
            token: Some("   ".into()),
            ..Default::default()
        };
        assert!(settings.resolve(&[]).unwrap().token.is_none());
    }

    #[test]
    fn sequential_mode_uses_one_worker() {
        assert_eq!(ExecutionMode::Sequential.worker_count(), 1);
        assert_eq!(ExecutionMode::Parallel { workers: 4 }.worker_count(), 4);
    }
}
