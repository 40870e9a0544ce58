//! Core data models for jsprobe

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Where a script body came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    External,
    Inline,
    Local,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::External => write!(f, "external"),
            SourceKind::Inline => write!(f, "inline"),
            SourceKind::Local => write!(f, "local"),
        }
    }
}

/// One acquired script body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// URL, `"<page> inline script #n"` or file path
    pub origin: String,
    pub text: String,
    pub kind: SourceKind,
}

impl SourceUnit {
    pub fn new(origin: impl Into<String>, text: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            origin: origin.into(),
            text: text.into(),
            kind,
        }
    }
}

/// HTTP method of a call site. `Ws` marks a socket handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "PATCH")]
    Patch,
    #[serde(rename = "WS")]
    Ws,
}

impl HttpMethod {
    /// Parses a request method name, case-insensitively. `WS` is never parsed
    /// from source text.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Ws => "WS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request kind assigned by the classifier.
///
/// Variant order is classification priority: when several rules apply, the
/// smallest variant wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestKind {
    #[serde(rename = "WebSocket")]
    WebSocket,
    #[serde(rename = "GraphQL")]
    GraphQl,
    #[serde(rename = "RPC")]
    Rpc,
    #[serde(rename = "RESTful")]
    Restful,
    #[serde(rename = "GenericHTTP")]
    GenericHttp,
}

impl RequestKind {
    pub const ALL: [RequestKind; 5] = [
        RequestKind::WebSocket,
        RequestKind::GraphQl,
        RequestKind::Rpc,
        RequestKind::Restful,
        RequestKind::GenericHttp,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::WebSocket => "WebSocket",
            RequestKind::GraphQl => "GraphQL",
            RequestKind::Rpc => "RPC",
            RequestKind::Restful => "RESTful",
            RequestKind::GenericHttp => "GenericHTTP",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A non-literal expression replaced by a placeholder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExpressionSlot {
    pub id: usize,
    pub text: String,
}

/// Argument text recovered for one call site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ParameterBlock {
    /// Argument text exactly as it appeared in the source
    pub raw_text: String,
    /// Pretty-printed JSON, or `None` when the text could not be repaired
    pub repaired_text: Option<String>,
    /// Placeholder ids in left-to-right discovery order, starting at 0
    pub expressions: Vec<ExpressionSlot>,
}

impl ParameterBlock {
    /// Placeholder token for expression `id`
    pub fn placeholder(id: usize) -> String {
        format!("__EXPR_{id}__")
    }

    /// Repaired text when available, otherwise the raw text
    pub fn display_text(&self) -> &str {
        self.repaired_text.as_deref().unwrap_or(&self.raw_text)
    }

    pub fn is_repaired(&self) -> bool {
        self.repaired_text.is_some()
    }

    /// Original text behind a placeholder id
    pub fn expression(&self, id: usize) -> Option<&str> {
        self.expressions
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| slot.text.as_str())
    }
}

/// One heuristically identified API call site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RequestCandidate {
    pub origin: String,
    pub kind: RequestKind,
    pub method: Option<HttpMethod>,
    pub url: String,
    pub parameters: Option<ParameterBlock>,
}

impl RequestCandidate {
    /// Method label as rendered in reports
    pub fn method_label(&self) -> &'static str {
        self.method.map(|m| m.as_str()).unwrap_or("UNKNOWN")
    }

    pub fn has_parameters(&self) -> bool {
        self.parameters
            .as_ref()
            .is_some_and(|p| !p.raw_text.trim().is_empty())
    }
}

/// Findings for one origin, deduplicated and in discovery order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OriginReport {
    pub origin: String,
    pub kind: SourceKind,
    pub candidates: Vec<RequestCandidate>,
}

impl OriginReport {
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn with_parameters_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.has_parameters()).count()
    }
}

/// An origin that could not be acquired
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcquireWarning {
    pub origin: String,
    pub message: String,
}

impl AcquireWarning {
    pub fn new(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for AcquireWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.message)
    }
}

/// Everything the engine found during one run, ordered by origin
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionResult {
    pub origins: Vec<OriginReport>,
    pub warnings: Vec<AcquireWarning>,
}

impl ExtractionResult {
    pub fn total_candidates(&self) -> usize {
        self.origins.iter().map(OriginReport::candidate_count).sum()
    }

    pub fn total_with_parameters(&self) -> usize {
        self.origins
            .iter()
            .map(OriginReport::with_parameters_count)
            .sum()
    }

    pub fn count_by_kind(&self, kind: RequestKind) -> usize {
        self.origins
            .iter()
            .flat_map(|o| &o.candidates)
            .filter(|c| c.kind == kind)
            .count()
    }
}

/// How a run ended
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Interrupted,
    Failed(String),
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Interrupted => write!(f, "interrupted"),
            RunStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A complete run: the extraction result plus run metadata, as exported to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRun {
    /// Unique run identifier
    pub run_id: String,
    /// Human-readable description of the input
    pub input: String,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub status: RunStatus,
    /// Total HTTP requests made
    pub total_requests: u64,
    pub result: ExtractionResult,
}

impl ScanRun {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            input: input.into(),
            started_at: Local::now(),
            finished_at: None,
            status: RunStatus::Completed,
            total_requests: 0,
            result: ExtractionResult::default(),
        }
    }

    /// Marks the run as finished
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Local::now());
    }
}

/// How overlapping pattern matches are resolved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Longer matched text wins, pattern priority breaks ties
    #[default]
    Longest,
    /// Pattern priority wins, longer matched text breaks ties
    Priority,
}

impl OverlapPolicy {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "longest" => Some(OverlapPolicy::Longest),
            "priority" => Some(OverlapPolicy::Priority),
            _ => None,
        }
    }
}

/// Tuning knobs for the extraction engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Bytes searched for a URL literal after the call's opening parenthesis
    pub url_window: usize,
    /// Longest argument list the delimiter scanner will balance
    pub max_param_span: usize,
    pub overlap_policy: OverlapPolicy,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            url_window: 256,
            max_param_span: crate::engine::delimiter::DEFAULT_MAX_SPAN,
            overlap_policy: OverlapPolicy::Longest,
        }
    }
}

/// Configuration for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum concurrent fetches
    pub concurrency: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User-Agent header value
    pub user_agent: String,
    /// Whether to follow HTTP redirects
    pub follow_redirects: bool,
    /// Accept self-signed and otherwise invalid TLS certificates
    pub accept_invalid_certs: bool,
    /// Maximum requests per second
    pub rate_limit: Option<u32>,
    /// Attempts per request, including the first
    pub max_retries: u32,
    /// Extra HTTP headers sent with every request
    pub headers: HashMap<String, String>,
    pub extract: ExtractOptions,
    /// Text report path
    pub report_path: String,
    /// Optional HTML report path
    pub html_path: Option<String>,
    /// Optional JSON export path
    pub json_path: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            follow_redirects: true,
            accept_invalid_certs: false,
            rate_limit: None,
            max_retries: 2,
            headers: HashMap::new(),
            extract: ExtractOptions::default(),
            report_path: "api_extraction_results.txt".to_string(),
            html_path: None,
            json_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(HttpMethod::parse("post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse(" Delete "), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("ws"), None);
        assert_eq!(HttpMethod::parse("json"), None);
    }

    #[test]
    fn test_kind_priority_order() {
        let mut kinds = vec![
            RequestKind::GenericHttp,
            RequestKind::Restful,
            RequestKind::WebSocket,
            RequestKind::Rpc,
            RequestKind::GraphQl,
        ];
        kinds.sort();
        assert_eq!(kinds, RequestKind::ALL.to_vec());
    }

    #[test]
    fn test_kind_serializes_as_label() {
        let json = serde_json::to_string(&RequestKind::GenericHttp).expect("serialize");
        assert_eq!(json, "\"GenericHTTP\"");
        assert_eq!(RequestKind::Restful.to_string(), "RESTful");
    }

    #[test]
    fn test_method_label_unknown() {
        let candidate = RequestCandidate {
            origin: "a.js".to_string(),
            kind: RequestKind::GenericHttp,
            method: None,
            url: "/x".to_string(),
            parameters: None,
        };
        assert_eq!(candidate.method_label(), "UNKNOWN");
        assert!(!candidate.has_parameters());
    }

    #[test]
    fn test_display_text_falls_back_to_raw() {
        let block = ParameterBlock {
            raw_text: "{a: }".to_string(),
            repaired_text: None,
            expressions: Vec::new(),
        };
        assert_eq!(block.display_text(), "{a: }");
        assert!(!block.is_repaired());
    }

    #[test]
    fn test_overlap_policy_parse() {
        assert_eq!(OverlapPolicy::parse("Longest"), Some(OverlapPolicy::Longest));
        assert_eq!(OverlapPolicy::parse("priority"), Some(OverlapPolicy::Priority));
        assert_eq!(OverlapPolicy::parse("random"), None);
    }
}
