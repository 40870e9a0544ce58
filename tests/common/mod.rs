//! Common test utilities

use jsprobe::models::RunConfig;
use std::path::Path;

/// Creates a test RunConfig writing its text report to `report_path`
pub fn test_config(report_path: &Path) -> RunConfig {
    RunConfig {
        concurrency: 2,
        timeout_secs: 10,
        user_agent: "jsprobe-test/0.1.0".to_string(),
        max_retries: 1,
        report_path: report_path.display().to_string(),
        ..RunConfig::default()
    }
}
