//! URL and argument recovery around a pattern match

use crate::engine::delimiter;
use crate::engine::patterns::{PatternTag, RawMatch};
use crate::models::{ExtractOptions, HttpMethod};
use std::ops::Range;

/// Extensions that mark a literal as a static asset rather than an endpoint
const STATIC_EXTENSIONS: &[&str] = &[
    ".js", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".html", ".htm", ".woff",
    ".woff2", ".ttf", ".eot", ".map", ".json", ".xml", ".txt", ".ico", ".wasm",
];

const SKIPPED_SCHEMES: &[&str] = &["data:", "javascript:", "mailto:", "tel:"];

/// Bytes searched before a call for the assignment of a bare-identifier argument
const ASSIGNMENT_WINDOW: usize = 500;

/// What the extractor recovered for one match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub url: String,
    /// False when no literal was found and `url` is the matched text
    pub url_is_literal: bool,
    /// Argument text with the URL argument removed
    pub arguments: Option<String>,
}

/// Pulls the URL literal and parameter text for a match
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    url_window: usize,
    max_param_span: usize,
}

impl ContextExtractor {
    pub fn new(options: &ExtractOptions) -> Self {
        Self {
            url_window: options.url_window,
            max_param_span: options.max_param_span,
        }
    }

    pub fn extract(&self, text: &str, m: &RawMatch<'_>) -> CallContext {
        let args = m.call_open.and_then(|open| {
            delimiter::find_balanced_end_within(text, open, '(', ')', self.max_param_span)
                .ok()
                .map(|close| argument_ranges(text, open + 1..close))
        });

        let url = self.find_url(text, m, args.as_deref());
        let arguments = args
            .and_then(|ranges| parameter_text(text, m.tag, &ranges))
            .map(|arguments| {
                if !is_bare_identifier(&arguments) {
                    return arguments;
                }
                match self.traced_assignment(text, &arguments, m.start) {
                    Some(value) => value.to_string(),
                    None => arguments,
                }
            });

        match url {
            Some(url) => CallContext {
                url,
                url_is_literal: true,
                arguments,
            },
            None => CallContext {
                url: m.matched_text.to_string(),
                url_is_literal: false,
                arguments,
            },
        }
    }

    /// Value most recently assigned to `name` within the window before
    /// `call_start`: an object, array, string or simple literal.
    fn traced_assignment<'t>(&self, text: &'t str, name: &str, call_start: usize) -> Option<&'t str> {
        let window_start =
            delimiter::floor_char_boundary(text, call_start.saturating_sub(ASSIGNMENT_WINDOW));
        let window = &text[window_start..call_start];

        let mut latest = None;
        for (i, _) in window.match_indices(name) {
            let at = window_start + i;
            let after = at + name.len();
            let before_ok = !text[..at]
                .chars()
                .next_back()
                .is_some_and(|c| is_identifier_char(c) || c == '.');
            let after_ok = !text[after..].chars().next().is_some_and(is_identifier_char);
            if !before_ok || !after_ok {
                continue;
            }

            let rest = &text[after..call_start];
            let gap = rest.len() - rest.trim_start().len();
            let rest = rest.trim_start();
            if !rest.starts_with('=') || rest.starts_with("==") || rest.starts_with("=>") {
                continue;
            }
            let value = &rest[1..];
            let value_start = after + gap + 1 + (value.len() - value.trim_start().len());
            if let Some(end) = self.assigned_value_end(text, value_start, call_start) {
                latest = Some(&text[value_start..end]);
            }
        }
        latest
    }

    /// Exclusive end of a traceable literal starting at `start`, not past `limit`
    fn assigned_value_end(&self, text: &str, start: usize, limit: usize) -> Option<usize> {
        let first = text[start..limit].chars().next()?;
        let end = match first {
            '{' => delimiter::find_balanced_end_within(text, start, '{', '}', self.max_param_span)
                .ok()?
                + 1,
            '[' => delimiter::find_balanced_end_within(text, start, '[', ']', self.max_param_span)
                .ok()?
                + 1,
            '\'' | '"' | '`' => {
                delimiter::find_balanced_end_within(text, start, first, first, self.max_param_span)
                    .ok()?
                    + 1
            }
            _ => {
                let rest = &text[start..limit];
                let len = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+')))
                    .unwrap_or(rest.len());
                let token = &rest[..len];
                let numeric = token.starts_with(|c: char| c.is_ascii_digit() || c == '-')
                    && token.parse::<f64>().is_ok();
                if !numeric && !matches!(token, "true" | "false" | "null") {
                    return None;
                }
                start + len
            }
        };
        (end <= limit).then_some(end)
    }

    fn find_url(&self, text: &str, m: &RawMatch<'_>, args: Option<&[Range<usize>]>) -> Option<String> {
        if matches!(m.tag, PatternTag::ConfigObject(_)) {
            let from_field = args.into_iter().flatten().take(2).find_map(|range| {
                delimiter::object_property(&text[range.clone()], "url")
                    .and_then(delimiter::string_literal_content)
                    .filter(|url| is_url_candidate(url))
            });
            if let Some(url) = from_field {
                return Some(url.to_string());
            }
        }

        let window = match (m.call_open, args) {
            // The URL of a call is expected in its first argument
            (Some(_), Some(args)) => args.first()?.clone(),
            (Some(open), None) => open + 1..open + 1 + self.url_window,
            (None, _) => m.start..m.end,
        };
        let start = window.start;
        let end = delimiter::floor_char_boundary(text, window.end.min(start + self.url_window));

        delimiter::string_literals(text, start..end)
            .into_iter()
            .map(|(s, e)| &text[s + 1..e - 1])
            .find(|body| is_url_candidate(body))
            .map(str::to_string)
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// A lone variable name such as `payload`
fn is_bare_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(is_identifier_char)
        && !matches!(text, "true" | "false" | "null" | "undefined" | "this")
}

/// Non-empty top-level argument ranges of the call body `inner`
fn argument_ranges(text: &str, inner: Range<usize>) -> Vec<Range<usize>> {
    let body = &text[inner.clone()];
    delimiter::split_top_level(body, b',')
        .into_iter()
        .filter_map(|r| {
            let segment = &body[r.clone()];
            let leading = segment.len() - segment.trim_start().len();
            let trimmed = segment.trim();
            if trimmed.is_empty() {
                return None;
            }
            let start = inner.start + r.start + leading;
            Some(start..start + trimmed.len())
        })
        .collect()
}

/// Joins the arguments left after dropping the URL position
fn parameter_text(text: &str, tag: PatternTag, args: &[Range<usize>]) -> Option<String> {
    let first_is_literal = args
        .first()
        .is_some_and(|r| delimiter::string_literal_content(&text[r.clone()]).is_some());
    let drop_first = match tag {
        PatternTag::MethodCall(_) | PatternTag::Fetch | PatternTag::WebSocket => true,
        PatternTag::ConfigObject(_) | PatternTag::GraphQl => first_is_literal,
        PatternTag::CatchAll(_) => return None,
    };
    let remaining = if drop_first { args.get(1..)? } else { args };
    let first = remaining.first()?;
    let last = remaining.last()?;
    Some(text[first.start..last.end].to_string())
}

/// Literal bodies that can stand for a URL: no whitespace, not a bare method name
fn is_url_candidate(body: &str) -> bool {
    let body = body.trim();
    !body.is_empty() && !body.contains(char::is_whitespace) && HttpMethod::parse(body).is_none()
}

/// Whether a literal URL plausibly points at an endpoint rather than an asset
pub fn is_likely_api_url(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() || url == "/" || url.starts_with('#') {
        return false;
    }
    let lower = url.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return false;
    }
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    if path.contains("/api/") {
        return true;
    }
    !STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::patterns::PatternSet;

    fn contexts(text: &str) -> Vec<(PatternTag, CallContext)> {
        let options = ExtractOptions::default();
        let set = PatternSet::with_defaults(&options).expect("patterns compile");
        let extractor = ContextExtractor::new(&options);
        set.matches(text)
            .map(|m| (m.tag, extractor.extract(text, &m)))
            .collect()
    }

    #[test]
    fn test_url_without_parameters() {
        let found = contexts(r#"axios.get("/api/users")"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.url, "/api/users");
        assert!(found[0].1.url_is_literal);
        assert_eq!(found[0].1.arguments, None);
    }

    #[test]
    fn test_arguments_after_url() {
        let found = contexts("axios.post('/api/login', { user: name, pass: pw }, config);");
        assert_eq!(
            found[0].1.arguments.as_deref(),
            Some("{ user: name, pass: pw }, config")
        );
    }

    #[test]
    fn test_config_object_url_field() {
        let text = "axios({ method: 'post', url: '/api/orders', data: order })";
        let found = contexts(text);
        assert_eq!(found[0].1.url, "/api/orders");
        assert_eq!(
            found[0].1.arguments.as_deref(),
            Some("{ method: 'post', url: '/api/orders', data: order }")
        );
    }

    #[test]
    fn test_missing_literal_falls_back_to_matched_text() {
        let found = contexts("axios.get(ENDPOINTS.users)");
        assert_eq!(found[0].1.url, "axios.get(ENDPOINTS.users)");
        assert!(!found[0].1.url_is_literal);
        assert_eq!(found[0].1.arguments, None);
    }

    #[test]
    fn test_url_found_in_concatenation() {
        let found = contexts(r#"http.get(base + "/api/profile")"#);
        assert_eq!(found[0].1.url, "/api/profile");
    }

    #[test]
    fn test_unbalanced_arguments_are_absent() {
        let found = contexts("fetch('/api/stream', { method: 'GET'");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.url, "/api/stream");
        assert_eq!(found[0].1.arguments, None);
    }

    #[test]
    fn test_catch_all_skips_method_literal() {
        let found = contexts(r#"xhr.open("PUT", "/api/items/1")"#);
        assert_eq!(found[0].1.url, "/api/items/1");
        assert_eq!(found[0].1.arguments, None);
    }

    #[test]
    fn test_graphql_keeps_all_arguments() {
        let text = r#"client.query({ query: "query { me { id } }", variables: { id } })"#;
        let found = contexts(text);
        assert_eq!(found[0].0, PatternTag::GraphQl);
        assert!(!found[0].1.url_is_literal);
        assert_eq!(
            found[0].1.arguments.as_deref(),
            Some(r#"{ query: "query { me { id } }", variables: { id } }"#)
        );
    }

    #[test]
    fn test_bare_identifier_traced_to_assignment() {
        let text = "const payload = { user: name, remember: true };\naxios.post('/api/login', payload);";
        let found = contexts(text);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].1.arguments.as_deref(),
            Some("{ user: name, remember: true }")
        );
    }

    #[test]
    fn test_nearest_assignment_wins() {
        let text = "let body = [1]; body = 'a=1&b=2'; if (body == x) {}\n$.post('/api/form', body);";
        let found = contexts(text);
        assert_eq!(found[0].1.arguments.as_deref(), Some("'a=1&b=2'"));
    }

    #[test]
    fn test_untraceable_identifier_is_kept() {
        let found = contexts("let data = build();\naxios.put('/api/items', data);");
        assert_eq!(found[0].1.arguments.as_deref(), Some("data"));

        let found = contexts("const mydata = {a: 1};\naxios.put('/api/items', data);");
        assert_eq!(found[0].1.arguments.as_deref(), Some("data"));
    }

    #[test]
    fn test_assignment_outside_window_is_ignored() {
        let text = format!(
            "const payload = {{a: 1}};\n{}\naxios.post('/api/x', payload);",
            "// filler\n".repeat(60)
        );
        let found = contexts(&text);
        assert_eq!(found[0].1.arguments.as_deref(), Some("payload"));
    }

    #[test]
    fn test_is_likely_api_url() {
        assert!(is_likely_api_url("/api/users"));
        assert!(is_likely_api_url("https://example.com/v1/orders?x=1"));
        assert!(is_likely_api_url("/api/config.json"));
        assert!(!is_likely_api_url("/static/app.js"));
        assert!(!is_likely_api_url("/img/logo.PNG"));
        assert!(!is_likely_api_url("data:image/png;base64,AAAA"));
        assert!(!is_likely_api_url("#top"));
        assert!(!is_likely_api_url("/"));
    }
}
