//! Call-site pattern library
//!
//! Each idiom is one [`CallPattern`] implementation that can find its next
//! occurrence at or after an offset. [`PatternSet`] runs every registered
//! pattern over a script body and resolves overlapping spans into one ordered
//! sequence of [`RawMatch`]es.

use crate::engine::delimiter::{self, NotFound};
use crate::error::Result;
use crate::models::{ExtractOptions, HttpMethod, OverlapPolicy};
use regex::Regex;
use std::collections::BTreeMap;

/// Which idiom produced a match. Declaration order is pattern priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternTag {
    /// `<client>.get|post|put|delete|patch(`
    MethodCall(HttpMethod),
    /// `axios({...})`, `$.ajax({...})`, `fetch(url, {...})` with a method field
    ConfigObject(Option<HttpMethod>),
    /// `fetch(url)`
    Fetch,
    /// `new WebSocket(url)`
    WebSocket,
    /// A GraphQL-style call carrying a `query` or `mutation` document
    GraphQl,
    /// An HTTP method keyword next to a path literal
    CatchAll(HttpMethod),
}

impl PatternTag {
    /// Lower is more specific
    pub fn priority(&self) -> u8 {
        match self {
            PatternTag::MethodCall(_) => 0,
            PatternTag::ConfigObject(_) => 1,
            PatternTag::Fetch => 2,
            PatternTag::WebSocket => 3,
            PatternTag::GraphQl => 4,
            PatternTag::CatchAll(_) => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PatternTag::MethodCall(_) => "method-call",
            PatternTag::ConfigObject(_) => "config-object",
            PatternTag::Fetch => "fetch",
            PatternTag::WebSocket => "websocket",
            PatternTag::GraphQl => "graphql",
            PatternTag::CatchAll(_) => "catch-all",
        }
    }

    /// Method spelled out at the call site, if any
    pub fn explicit_method(&self) -> Option<HttpMethod> {
        match self {
            PatternTag::MethodCall(m) | PatternTag::CatchAll(m) => Some(*m),
            PatternTag::ConfigObject(m) => *m,
            _ => None,
        }
    }

    /// Method the call will use, falling back to the idiom's default
    pub fn request_method(&self) -> Option<HttpMethod> {
        match self {
            PatternTag::Fetch => Some(HttpMethod::Get),
            PatternTag::WebSocket => Some(HttpMethod::Ws),
            PatternTag::GraphQl => Some(HttpMethod::Post),
            other => other.explicit_method(),
        }
    }

    pub fn is_socket(&self) -> bool {
        matches!(self, PatternTag::WebSocket)
    }
}

/// One pattern hit inside a script body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch<'t> {
    pub tag: PatternTag,
    pub start: usize,
    /// Exclusive
    pub end: usize,
    pub matched_text: &'t str,
    /// Offset of the call's opening parenthesis for call idioms
    pub call_open: Option<usize>,
}

impl RawMatch<'_> {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// Trait that all call-site patterns implement
pub trait CallPattern: Send + Sync {
    /// Short identifier shown by `jsprobe patterns`
    fn name(&self) -> &'static str;

    /// What the pattern recognizes
    fn description(&self) -> &'static str;

    /// Position in the fixed priority order, lower wins ties
    fn priority(&self) -> u8;

    /// Finds the first occurrence starting at or after `offset`
    fn find_at<'t>(&self, text: &'t str, offset: usize) -> Option<RawMatch<'t>>;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn preceded_by(text: &str, index: usize, predicate: impl Fn(char) -> bool) -> bool {
    text[..index].chars().next_back().is_some_and(predicate)
}

/// Builds a call match spanning the call head through its closing parenthesis,
/// or through the opening parenthesis when the argument list does not balance.
fn call_match<'t>(
    text: &'t str,
    tag: PatternTag,
    start: usize,
    open: usize,
    max_span: usize,
) -> RawMatch<'t> {
    let end = match delimiter::find_balanced_end_within(text, open, '(', ')', max_span) {
        Ok(close) => close + 1,
        Err(NotFound) => open + 1,
    };
    RawMatch {
        tag,
        start,
        end,
        matched_text: &text[start..end],
        call_open: Some(open),
    }
}

/// Argument texts of the call opened at `open`, or `None` if unbalanced
fn call_arguments(text: &str, open: usize, max_span: usize) -> Option<Vec<&str>> {
    let close = delimiter::find_balanced_end_within(text, open, '(', ')', max_span).ok()?;
    let inner = &text[open + 1..close];
    Some(
        delimiter::split_top_level(inner, b',')
            .into_iter()
            .map(|range| inner[range].trim())
            .filter(|arg| !arg.is_empty())
            .collect(),
    )
}

/// A call head followed by a block is a definition, not a call
fn is_definition(text: &str, start: usize, end: usize) -> bool {
    if text[..start].trim_end().ends_with("function") {
        return true;
    }
    text[end..].trim_start().starts_with('{')
}

/// Whether a literal body reads like a URL or path
pub fn is_path_like(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value.contains('/') && !value.contains(char::is_whitespace)
}

// ---------------------------------------------------------------------------
// Method calls
// ---------------------------------------------------------------------------

const METHOD_CALL: &str =
    r"(?:[A-Za-z_$][\w$]*\.)+(get|post|put|delete|patch|GET|POST|PUT|DELETE|PATCH)\s*\(";

/// Receiver segments that are HTTP clients in practice
const CLIENT_SEGMENTS: &[&str] = &[
    "axios", "http", "ajax", "request", "client", "service", "superagent", "fetcher", "instance",
];

fn is_http_client(receiver: &str) -> bool {
    receiver.split('.').any(|segment| {
        let segment = segment.trim_start_matches('$').to_ascii_lowercase();
        segment.is_empty()
            || segment == "jquery"
            || segment == "ky"
            || segment == "got"
            || segment.starts_with("api")
            || segment.ends_with("api")
            || CLIENT_SEGMENTS.iter().any(|c| segment.contains(c))
    })
}

/// `axios.get("/api/users")`, `this.$http.post(url, body)`
pub struct MethodCallPattern {
    head: Regex,
    max_span: usize,
}

impl MethodCallPattern {
    pub fn new(max_span: usize) -> Result<Self> {
        Ok(Self {
            head: Regex::new(METHOD_CALL)?,
            max_span,
        })
    }
}

impl CallPattern for MethodCallPattern {
    fn name(&self) -> &'static str {
        "method-call"
    }

    fn description(&self) -> &'static str {
        "REST-style client.get/post/put/delete/patch(...) calls"
    }

    fn priority(&self) -> u8 {
        0
    }

    fn find_at<'t>(&self, text: &'t str, offset: usize) -> Option<RawMatch<'t>> {
        let mut pos = offset;
        while pos <= text.len() {
            let caps = self.head.captures_at(text, pos)?;
            let whole = caps.get(0)?;
            let verb = caps.get(1)?;
            pos = whole.end();

            let Some(method) = HttpMethod::parse(verb.as_str()) else {
                continue;
            };
            let start = whole.start();
            let open = whole.end() - 1;
            let receiver = &text[start..verb.start() - 1];

            if !is_http_client(receiver) {
                let first_is_path = call_arguments(text, open, self.max_span)
                    .and_then(|args| args.first().copied())
                    .and_then(delimiter::string_literal_content)
                    .is_some_and(is_path_like);
                if !first_is_path {
                    continue;
                }
            }
            return Some(call_match(
                text,
                PatternTag::MethodCall(method),
                start,
                open,
                self.max_span,
            ));
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Configuration-object calls
// ---------------------------------------------------------------------------

const CONFIG_CALL: &str =
    r"(?:(?:\$|jQuery)\.ajax|axios\.request|axios|ajax|request|fetch|\$http|http)\s*\(";

/// Global objects that may prefix a config-object call (`window.fetch(...)`)
const GLOBAL_RECEIVERS: &[&str] = &["window.", "self.", "globalThis."];

/// Start of a global receiver ending right at `index`
fn global_receiver_start(text: &str, index: usize) -> Option<usize> {
    GLOBAL_RECEIVERS.iter().find_map(|receiver| {
        if !text[..index].ends_with(receiver) {
            return None;
        }
        let start = index - receiver.len();
        (!preceded_by(text, start, |c| is_identifier_char(c) || c == '.')).then_some(start)
    })
}

/// `axios({url, method: 'post'})`, `$.ajax({type: 'GET', url})`, `fetch(url, {method})`
pub struct ConfigObjectPattern {
    head: Regex,
    max_span: usize,
}

impl ConfigObjectPattern {
    pub fn new(max_span: usize) -> Result<Self> {
        Ok(Self {
            head: Regex::new(CONFIG_CALL)?,
            max_span,
        })
    }

    /// Reads the method field of the first object argument among the first two
    fn method_field(args: &[&str]) -> Option<Option<HttpMethod>> {
        for arg in args.iter().take(2) {
            if !arg.starts_with('{') {
                continue;
            }
            if let Some(value) = delimiter::object_property(arg, "method") {
                return Some(delimiter::string_literal_content(value).and_then(HttpMethod::parse));
            }
            if let Some(value) = delimiter::object_property(arg, "type") {
                if let Some(method) = delimiter::string_literal_content(value).and_then(HttpMethod::parse) {
                    return Some(Some(method));
                }
            }
        }
        None
    }
}

impl CallPattern for ConfigObjectPattern {
    fn name(&self) -> &'static str {
        "config-object"
    }

    fn description(&self) -> &'static str {
        "axios/$.ajax/fetch/request calls configured by an object with a method or type field"
    }

    fn priority(&self) -> u8 {
        1
    }

    fn find_at<'t>(&self, text: &'t str, offset: usize) -> Option<RawMatch<'t>> {
        let mut pos = offset;
        while pos <= text.len() {
            let head = self.head.find_at(text, pos)?;
            pos = head.end();

            let mut start = head.start();
            let open = head.end() - 1;
            if preceded_by(text, start, |c| is_identifier_char(c) || c == '.') {
                match global_receiver_start(text, start) {
                    Some(receiver) => start = receiver,
                    None => continue,
                }
            }
            let Some(args) = call_arguments(text, open, self.max_span) else {
                continue;
            };
            let Some(method) = Self::method_field(&args) else {
                continue;
            };
            let m = call_match(text, PatternTag::ConfigObject(method), start, open, self.max_span);
            if is_definition(text, start, m.end) {
                continue;
            }
            return Some(m);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

/// `fetch(url)`, `window.fetch(url, opts)`
pub struct FetchPattern {
    head: Regex,
    max_span: usize,
}

impl FetchPattern {
    pub fn new(max_span: usize) -> Result<Self> {
        Ok(Self {
            head: Regex::new(r"\bfetch\s*\(")?,
            max_span,
        })
    }
}

impl CallPattern for FetchPattern {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn description(&self) -> &'static str {
        "Generic fetch(url, ...) calls"
    }

    fn priority(&self) -> u8 {
        2
    }

    fn find_at<'t>(&self, text: &'t str, offset: usize) -> Option<RawMatch<'t>> {
        let mut pos = offset;
        while pos <= text.len() {
            let head = self.head.find_at(text, pos)?;
            pos = head.end();
            if preceded_by(text, head.start(), |c| c == '$') {
                continue;
            }
            let m = call_match(text, PatternTag::Fetch, head.start(), head.end() - 1, self.max_span);
            if is_definition(text, m.start, m.end) {
                continue;
            }
            return Some(m);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// WebSocket constructors
// ---------------------------------------------------------------------------

/// `new WebSocket(url)`, `new SockJS(url)`
pub struct WebSocketPattern {
    head: Regex,
    max_span: usize,
}

impl WebSocketPattern {
    pub fn new(max_span: usize) -> Result<Self> {
        Ok(Self {
            head: Regex::new(r"\bnew\s+(?:WebSocket|ReconnectingWebSocket|SockJS)\s*\(")?,
            max_span,
        })
    }
}

impl CallPattern for WebSocketPattern {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn description(&self) -> &'static str {
        "Real-time socket constructors (WebSocket, ReconnectingWebSocket, SockJS)"
    }

    fn priority(&self) -> u8 {
        3
    }

    fn find_at<'t>(&self, text: &'t str, offset: usize) -> Option<RawMatch<'t>> {
        let head = self.head.find_at(text, offset)?;
        Some(call_match(
            text,
            PatternTag::WebSocket,
            head.start(),
            head.end() - 1,
            self.max_span,
        ))
    }
}

// ---------------------------------------------------------------------------
// GraphQL
// ---------------------------------------------------------------------------

const GRAPHQL_CALL: &str = r"\b(?:query|mutate|request|graphql\w*|gql\w*|execute|rawRequest|useQuery|useMutation|useLazyQuery|useSubscription|post|fetch)\s*\(";

/// `client.query({query: gql`...`})`, `request(endpoint, "mutation {...}")`
pub struct GraphQlPattern {
    head: Regex,
    operation: Regex,
    max_span: usize,
}

impl GraphQlPattern {
    pub fn new(max_span: usize) -> Result<Self> {
        Ok(Self {
            head: Regex::new(GRAPHQL_CALL)?,
            operation: Regex::new(r"\b(?:query|mutation)\b")?,
            max_span,
        })
    }
}

impl CallPattern for GraphQlPattern {
    fn name(&self) -> &'static str {
        "graphql"
    }

    fn description(&self) -> &'static str {
        "GraphQL client calls whose string arguments contain a query or mutation"
    }

    fn priority(&self) -> u8 {
        4
    }

    fn find_at<'t>(&self, text: &'t str, offset: usize) -> Option<RawMatch<'t>> {
        let mut pos = offset;
        while pos <= text.len() {
            let head = self.head.find_at(text, pos)?;
            pos = head.end();

            let open = head.end() - 1;
            let Ok(close) = delimiter::find_balanced_end_within(text, open, '(', ')', self.max_span)
            else {
                continue;
            };
            if is_definition(text, head.start(), close + 1) {
                continue;
            }
            let has_operation = delimiter::string_literals(text, open + 1..close)
                .into_iter()
                .any(|(s, e)| self.operation.is_match(&text[s..e]));
            if has_operation {
                return Some(call_match(text, PatternTag::GraphQl, head.start(), open, self.max_span));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Catch-all
// ---------------------------------------------------------------------------

const METHOD_THEN_PATH: &str = r#"["'`]((?i:get|post|put|delete|patch))["'`]\s*,\s*["'`]((?:/|https?://)[^"'`\s]*)["'`]"#;
const METHOD_FIELD_THEN_URL: &str = r#"\b(?:method|type)\s*:\s*["']((?i:get|post|put|delete|patch))["']\s*,\s*url\s*:\s*["'`]([^"'`\s]+)["'`]"#;
const URL_THEN_METHOD_FIELD: &str = r#"\burl\s*:\s*["'`]([^"'`\s]+)["'`]\s*,\s*(?:method|type)\s*:\s*["']((?i:get|post|put|delete|patch))["']"#;

struct AdjacencyForm {
    regex: Regex,
    method_group: usize,
    path_group: usize,
}

/// `xhr.open("POST", "/api/x")`, `{method: "GET", url: "/api/y"}`
pub struct CatchAllPattern {
    forms: Vec<AdjacencyForm>,
}

impl CatchAllPattern {
    pub fn new() -> Result<Self> {
        Ok(Self {
            forms: vec![
                AdjacencyForm {
                    regex: Regex::new(METHOD_THEN_PATH)?,
                    method_group: 1,
                    path_group: 2,
                },
                AdjacencyForm {
                    regex: Regex::new(METHOD_FIELD_THEN_URL)?,
                    method_group: 1,
                    path_group: 2,
                },
                AdjacencyForm {
                    regex: Regex::new(URL_THEN_METHOD_FIELD)?,
                    method_group: 2,
                    path_group: 1,
                },
            ],
        })
    }

    fn find_form<'t>(&self, form: &AdjacencyForm, text: &'t str, offset: usize) -> Option<RawMatch<'t>> {
        let mut pos = offset;
        while pos <= text.len() {
            let caps = form.regex.captures_at(text, pos)?;
            let whole = caps.get(0)?;
            pos = whole.end();
            let path = caps.get(form.path_group)?.as_str();
            let Some(method) = caps.get(form.method_group).and_then(|m| HttpMethod::parse(m.as_str()))
            else {
                continue;
            };
            if !is_path_like(path) {
                continue;
            }
            return Some(RawMatch {
                tag: PatternTag::CatchAll(method),
                start: whole.start(),
                end: whole.end(),
                matched_text: whole.as_str(),
                call_open: None,
            });
        }
        None
    }
}

impl CallPattern for CatchAllPattern {
    fn name(&self) -> &'static str {
        "catch-all"
    }

    fn description(&self) -> &'static str {
        "Path literals adjacent to an HTTP method keyword (xhr.open, method/url pairs)"
    }

    fn priority(&self) -> u8 {
        5
    }

    fn find_at<'t>(&self, text: &'t str, offset: usize) -> Option<RawMatch<'t>> {
        self.forms
            .iter()
            .filter_map(|form| self.find_form(form, text, offset))
            .min_by_key(|m| m.start)
    }
}

// ---------------------------------------------------------------------------
// Pattern set
// ---------------------------------------------------------------------------

/// Ordered pattern library with overlap resolution
pub struct PatternSet {
    patterns: Vec<Box<dyn CallPattern>>,
    policy: OverlapPolicy,
}

impl PatternSet {
    /// Creates a PatternSet with no registered patterns
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            patterns: Vec::new(),
            policy,
        }
    }

    /// Creates a PatternSet with the full built-in library
    pub fn with_defaults(options: &ExtractOptions) -> Result<Self> {
        let span = options.max_param_span;
        let mut set = Self::new(options.overlap_policy);
        set.register(Box::new(MethodCallPattern::new(span)?));
        set.register(Box::new(ConfigObjectPattern::new(span)?));
        set.register(Box::new(FetchPattern::new(span)?));
        set.register(Box::new(WebSocketPattern::new(span)?));
        set.register(Box::new(GraphQlPattern::new(span)?));
        set.register(Box::new(CatchAllPattern::new()?));
        Ok(set)
    }

    /// Registers a new pattern
    pub fn register(&mut self, pattern: Box<dyn CallPattern>) {
        self.patterns.push(pattern);
    }

    /// Returns (name, description) for every pattern in priority order
    pub fn list_patterns(&self) -> Vec<(&str, &str)> {
        let mut patterns: Vec<&dyn CallPattern> = self.patterns.iter().map(|p| p.as_ref()).collect();
        patterns.sort_by_key(|p| p.priority());
        patterns
            .into_iter()
            .map(|p| (p.name(), p.description()))
            .collect()
    }

    /// Matches in `text`, overlaps resolved, by ascending start offset.
    /// Nothing is scanned until the first item is requested.
    pub fn matches<'s, 't>(&'s self, text: &'t str) -> Matches<'s, 't> {
        Matches {
            set: self,
            text,
            resolved: None,
        }
    }

    fn collect_matches<'t>(&self, text: &'t str) -> Vec<RawMatch<'t>> {
        let mut all = Vec::new();
        for pattern in &self.patterns {
            let mut pos = 0;
            while pos <= text.len() {
                let Some(m) = pattern.find_at(text, pos) else {
                    break;
                };
                // Resume inside the argument list so nested calls are still seen
                pos = m.call_open.map(|open| open + 1).unwrap_or(m.end);
                all.push(m);
            }
        }
        all
    }

    fn resolve<'t>(&self, mut all: Vec<RawMatch<'t>>) -> Vec<RawMatch<'t>> {
        match self.policy {
            OverlapPolicy::Longest => all.sort_by(|a, b| {
                b.len()
                    .cmp(&a.len())
                    .then(a.tag.priority().cmp(&b.tag.priority()))
                    .then(a.start.cmp(&b.start))
            }),
            OverlapPolicy::Priority => all.sort_by(|a, b| {
                a.tag
                    .priority()
                    .cmp(&b.tag.priority())
                    .then(b.len().cmp(&a.len()))
                    .then(a.start.cmp(&b.start))
            }),
        }

        let mut accepted: BTreeMap<usize, RawMatch<'t>> = BTreeMap::new();
        for m in all {
            let clashes = accepted
                .range(..m.end)
                .next_back()
                .is_some_and(|(_, kept)| kept.overlaps(m.start, m.end));
            if !clashes {
                accepted.insert(m.start, m);
            }
        }
        accepted.into_values().collect()
    }
}

/// Lazily resolved match sequence over one script body
pub struct Matches<'s, 't> {
    set: &'s PatternSet,
    text: &'t str,
    resolved: Option<std::vec::IntoIter<RawMatch<'t>>>,
}

impl<'t> Iterator for Matches<'_, 't> {
    type Item = RawMatch<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.resolved.is_none() {
            let all = self.set.collect_matches(self.text);
            self.resolved = Some(self.set.resolve(all).into_iter());
        }
        self.resolved.as_mut()?.next()
    }
}
