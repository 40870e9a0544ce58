//! Configuration management for jsprobe

use crate::error::{JsProbeError, Result};
use crate::models::{OverlapPolicy, RunConfig};
use serde::Deserialize;
use std::path::Path;

/// File-based configuration structure matching default.toml
#[derive(Debug, Deserialize)]
struct FileConfig {
    acquire: Option<AcquireSection>,
    extract: Option<ExtractSection>,
    output: Option<OutputSection>,
}

#[derive(Debug, Deserialize)]
struct AcquireSection {
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
    user_agent: Option<String>,
    follow_redirects: Option<bool>,
    accept_invalid_certs: Option<bool>,
    rate_limit: Option<u32>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ExtractSection {
    url_window: Option<usize>,
    max_param_span: Option<usize>,
    overlap_policy: Option<OverlapPolicy>,
}

#[derive(Debug, Deserialize)]
struct OutputSection {
    report_path: Option<String>,
    html_path: Option<String>,
    json_path: Option<String>,
}

/// Loads configuration from a TOML file and merges with defaults
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let content = std::fs::read_to_string(path).map_err(JsProbeError::IoError)?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<RunConfig> {
    let file_config: FileConfig = toml::from_str(content)?;
    let mut config = RunConfig::default();

    if let Some(acquire) = file_config.acquire {
        if let Some(concurrency) = acquire.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout) = acquire.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(ua) = acquire.user_agent {
            config.user_agent = ua;
        }
        if let Some(follow) = acquire.follow_redirects {
            config.follow_redirects = follow;
        }
        if let Some(insecure) = acquire.accept_invalid_certs {
            config.accept_invalid_certs = insecure;
        }
        if let Some(rate) = acquire.rate_limit {
            config.rate_limit = Some(rate);
        }
        if let Some(retries) = acquire.max_retries {
            config.max_retries = retries;
        }
    }

    if let Some(extract) = file_config.extract {
        if let Some(window) = extract.url_window {
            config.extract.url_window = window;
        }
        if let Some(span) = extract.max_param_span {
            config.extract.max_param_span = span;
        }
        if let Some(policy) = extract.overlap_policy {
            config.extract.overlap_policy = policy;
        }
    }

    if let Some(output) = file_config.output {
        if let Some(path) = output.report_path {
            config.report_path = path;
        }
        if output.html_path.is_some() {
            config.html_path = output.html_path;
        }
        if output.json_path.is_some() {
            config.json_path = output.json_path;
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &RunConfig) -> Result<()> {
    if config.concurrency == 0 {
        return Err(JsProbeError::ConfigError(
            "concurrency must be at least 1".to_string(),
        ));
    }
    if config.max_retries == 0 {
        return Err(JsProbeError::ConfigError(
            "max_retries must be at least 1".to_string(),
        ));
    }
    if config.extract.max_param_span == 0 {
        return Err(JsProbeError::ConfigError(
            "max_param_span must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Command-line overrides for a scan
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub concurrency: Option<usize>,
    pub timeout: Option<u64>,
    pub insecure: bool,
    pub overlap: Option<String>,
    pub output: Option<String>,
    pub html: Option<String>,
    pub json: Option<String>,
    pub headers: Option<Vec<String>>,
}

/// Merges CLI arguments into an existing RunConfig
pub fn merge_cli_args(config: &mut RunConfig, cli: CliOverrides) -> Result<()> {
    if let Some(c) = cli.concurrency {
        config.concurrency = c;
    }
    if let Some(t) = cli.timeout {
        config.timeout_secs = t;
    }
    if cli.insecure {
        config.accept_invalid_certs = true;
    }
    if let Some(name) = cli.overlap {
        config.extract.overlap_policy = OverlapPolicy::parse(&name).ok_or_else(|| {
            JsProbeError::ConfigError(format!(
                "unknown overlap policy '{name}' (expected longest or priority)"
            ))
        })?;
    }
    if let Some(o) = cli.output {
        config.report_path = o;
    }
    if cli.html.is_some() {
        config.html_path = cli.html;
    }
    if cli.json.is_some() {
        config.json_path = cli.json;
    }
    if let Some(h) = cli.headers {
        for header in h {
            if let Some((key, value)) = header.split_once(':') {
                config
                    .headers
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    validate(config)
}
