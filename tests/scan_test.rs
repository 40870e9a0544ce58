//! Integration tests for HttpClient, acquisition and the scan runner

mod common;

use jsprobe::acquire::{Fetcher, ScanInput};
use jsprobe::http::HttpClient;
use jsprobe::models::{HttpMethod, RequestKind, RunStatus, SourceKind};
use jsprobe::scan::run_scan;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(config: &jsprobe::models::RunConfig) -> Arc<dyn Fetcher> {
    Arc::new(HttpClient::from_config(config).expect("failed to create client"))
}

fn never() -> std::future::Pending<()> {
    std::future::pending()
}

// ---------------------------------------------------------------------------
// HttpClient tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_get_text_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fetch('/api/ping')"))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = common::test_config(&dir.path().join("out.txt"));
    let client = HttpClient::from_config(&config).expect("failed to create client");

    let body = client
        .get_text(&format!("{}/app.js", mock_server.uri()))
        .await
        .expect("GET request failed");
    assert_eq!(body, "fetch('/api/ping')");
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn test_get_text_non_success_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone.js"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = common::test_config(&dir.path().join("out.txt"));
    let client = HttpClient::from_config(&config).expect("failed to create client");

    let err = client
        .get_text(&format!("{}/gone.js", mock_server.uri()))
        .await
        .expect_err("404 should fail");
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_custom_headers_are_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/private.js"))
        .and(header("X-Api-Key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = common::test_config(&dir.path().join("out.txt"));
    config
        .headers
        .insert("X-Api-Key".to_string(), "secret".to_string());
    let client = HttpClient::from_config(&config).expect("failed to create client");

    let body = client
        .get_text(&format!("{}/private.js", mock_server.uri()))
        .await
        .expect("header should match");
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky.js"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = common::test_config(&dir.path().join("out.txt"));
    config.max_retries = 2;
    let client = HttpClient::from_config(&config).expect("failed to create client");

    let result = client
        .get_text(&format!("{}/flaky.js", mock_server.uri()))
        .await;
    assert!(result.is_err());
    assert_eq!(client.request_count(), 2);
}

// ---------------------------------------------------------------------------
// Scan runner tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_page_scan_writes_text_report() {
    let mock_server = MockServer::start().await;

    let page = r#"<html><head>
        <script src="/static/app.js"></script>
        <script>fetch('/api/inline', {method: 'POST'})</script>
        <script src="/static/missing.js"></script>
        </head><body></body></html>"#;

    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/static/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("axios.get('/api/users');"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/static/missing.js"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let report_path = dir.path().join("results.txt");
    let config = common::test_config(&report_path);
    let page_url = format!("{}/index.html", mock_server.uri());

    let run = run_scan(
        &config,
        ScanInput::PageUrl(page_url.clone()),
        fetcher(&config),
        never(),
    )
    .await
    .expect("scan runs");

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.finished_at.is_some());
    assert_eq!(run.total_requests, 3);

    let origins: Vec<&str> = run.result.origins.iter().map(|o| o.origin.as_str()).collect();
    let app_js = format!("{}/static/app.js", mock_server.uri());
    let inline = format!("{page_url} inline script #1");
    assert_eq!(origins, vec![app_js.as_str(), inline.as_str()]);
    assert_eq!(run.result.origins[1].kind, SourceKind::Inline);

    let users = &run.result.origins[0].candidates[0];
    assert_eq!(users.kind, RequestKind::Restful);
    assert_eq!(users.method, Some(HttpMethod::Get));
    assert_eq!(users.url, "/api/users");

    assert_eq!(run.result.warnings.len(), 1);
    assert!(run.result.warnings[0].origin.ends_with("/static/missing.js"));

    let text = std::fs::read_to_string(&report_path).expect("report written");
    assert!(text.starts_with("# JavaScript API 请求提取结果\n"));
    assert!(text.contains(&format!("--- 来源: {app_js} ---")));
    assert!(text.contains("类型: RESTful, 请求: \"GET /api/users\""));
    assert!(text.contains(&format!("--- 来源: {inline} ---")));
    assert!(text.contains("/api/inline"));
    assert!(text.contains("# 警告: "));
    assert!(!text.contains("# 操作已被用户中断"));
    assert!(!text.contains("# 处理过程中发生意外错误"));
}

#[tokio::test]
async fn test_shared_script_is_fetched_once_across_pages() {
    let mock_server = MockServer::start().await;
    let page = r#"<script src="/static/common.js"></script>"#;

    for p in ["/a.html", "/b.html"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/static/common.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fetch('/api/shared')"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let list_path = dir.path().join("pages.txt");
    std::fs::write(
        &list_path,
        format!(
            "# pages\n{uri}/a.html\n\n{uri}/b.html\n",
            uri = mock_server.uri()
        ),
    )
    .expect("write list");

    let config = common::test_config(&dir.path().join("results.txt"));
    let run = run_scan(
        &config,
        ScanInput::PageList(list_path),
        fetcher(&config),
        never(),
    )
    .await
    .expect("scan runs");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.result.origins.len(), 1);
    assert_eq!(run.result.total_candidates(), 1);
    assert!(run.result.warnings.is_empty());
}

#[tokio::test]
async fn test_local_file_scan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("bundle.js");
    std::fs::write(
        &script,
        "const ws = new WebSocket('wss://example.com/live');\n$.post('/api/save', {id: item.id});\n",
    )
    .expect("write script");

    let config = common::test_config(&dir.path().join("results.txt"));
    let run = run_scan(
        &config,
        ScanInput::LocalFile(script),
        fetcher(&config),
        never(),
    )
    .await
    .expect("scan runs");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.total_requests, 0);
    assert_eq!(run.result.origins.len(), 1);
    assert_eq!(run.result.origins[0].kind, SourceKind::Local);
    assert_eq!(run.result.count_by_kind(RequestKind::WebSocket), 1);
    assert_eq!(run.result.total_with_parameters(), 1);

    let text = std::fs::read_to_string(&config.report_path).expect("report written");
    assert!(text.contains("__JS_EXPR_0__"));
}

#[tokio::test]
async fn test_interrupted_scan_writes_trailer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("app.js");
    std::fs::write(&script, "fetch('/api/x')").expect("write script");

    let config = common::test_config(&dir.path().join("results.txt"));
    let run = run_scan(
        &config,
        ScanInput::LocalFile(script),
        fetcher(&config),
        std::future::ready(()),
    )
    .await
    .expect("scan runs");

    assert_eq!(run.status, RunStatus::Interrupted);
    let text = std::fs::read_to_string(&config.report_path).expect("report written");
    assert!(text.starts_with("# JavaScript API 请求提取结果\n"));
    assert!(text.ends_with("\n\n# 操作已被用户中断。\n"));
}

#[tokio::test]
async fn test_unreadable_input_fails_with_trailer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = common::test_config(&dir.path().join("results.txt"));

    let run = run_scan(
        &config,
        ScanInput::LocalFile(dir.path().join("missing.js")),
        fetcher(&config),
        never(),
    )
    .await
    .expect("scan runs");

    assert!(matches!(run.status, RunStatus::Failed(_)));
    assert!(run.result.origins.is_empty());
    let text = std::fs::read_to_string(&config.report_path).expect("report written");
    assert!(text.contains("# 处理过程中发生意外错误: "));
}
