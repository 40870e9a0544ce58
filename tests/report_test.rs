//! Integration tests for the JSON export and HTML report

use jsprobe::engine::Engine;
use jsprobe::error::JsProbeError;
use jsprobe::models::{AcquireWarning, RequestKind, RunStatus, ScanRun, SourceKind, SourceUnit};
use jsprobe::report;

fn sample_run() -> ScanRun {
    let engine = Engine::with_defaults().expect("engine builds");
    let units = [
        SourceUnit::new(
            "https://example.com/static/app.js",
            r#"axios.get('/api/users'); fetch('/graphql', {method: 'POST', body: JSON.stringify({query: 'query Me { me { id } }'})});"#,
            SourceKind::External,
        ),
        SourceUnit::new(
            "https://example.com/ inline script #1",
            "const socket = new WebSocket('wss://example.com/ws');",
            SourceKind::Inline,
        ),
    ];

    let mut run = ScanRun::new("page https://example.com/");
    run.result = engine.extract_all(&units);
    run.result
        .warnings
        .push(AcquireWarning::new("https://example.com/static/gone.js", "HTTP 404 Not Found"));
    run.total_requests = 4;
    run.finish(RunStatus::Completed);
    run
}

#[test]
fn test_json_export_and_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.json");
    let run = sample_run();

    report::json::export(&run, &path).expect("export");
    let loaded = report::json::load(&path).expect("load");

    assert_eq!(loaded.run_id, run.run_id);
    assert_eq!(loaded.input, run.input);
    assert_eq!(loaded.status, RunStatus::Completed);
    assert_eq!(loaded.total_requests, 4);
    assert_eq!(loaded.result, run.result);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(raw["result"]["origins"][0]["candidates"][0]["kind"], "RESTful");
}

#[test]
fn test_load_rejects_invalid_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").expect("write");
    let err = report::json::load(&path).expect_err("invalid JSON");
    assert!(matches!(err, JsProbeError::InvalidInput(_)));
    assert!(err.to_string().contains("broken.json"));

    let err = report::json::load(&dir.path().join("absent.json")).expect_err("missing file");
    assert!(err.to_string().contains("absent.json"));
}

#[test]
fn test_html_report_from_loaded_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let json_path = dir.path().join("run.json");
    let html_path = dir.path().join("report.html");

    let run = sample_run();
    assert_eq!(run.result.count_by_kind(RequestKind::GraphQl), 1);
    assert_eq!(run.result.count_by_kind(RequestKind::WebSocket), 1);

    report::json::export(&run, &json_path).expect("export");
    let loaded = report::json::load(&json_path).expect("load");
    report::html::generate(&loaded, &html_path).expect("generate");

    let html = std::fs::read_to_string(&html_path).expect("read html");
    assert!(html.contains("<!DOCTYPE html>"));
    assert!(html.contains("RESTful"));
    assert!(html.contains("GraphQL"));
    assert!(html.contains("WebSocket"));
    assert!(html.contains("HTTP 404 Not Found"));
    assert!(html.contains(&loaded.run_id));
}
