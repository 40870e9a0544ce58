//! Extraction engine: script text in, classified call sites out
//!
//! The engine is synchronous and holds no per-run state, so one instance can
//! be shared across tasks that process different origins concurrently.

pub mod classify;
pub mod context;
pub mod dedup;
pub mod delimiter;
pub mod normalize;
pub mod patterns;

use crate::error::Result;
use crate::models::{ExtractOptions, ExtractionResult, OriginReport, RequestCandidate, SourceUnit};
use classify::{Classifier, ClassifierInput};
use context::ContextExtractor;
use patterns::PatternSet;
use tracing::debug;

/// Runs the pattern, context, normalize, classify and dedup stages over a script
pub struct Engine {
    patterns: PatternSet,
    context: ContextExtractor,
    classifier: Classifier,
}

impl Engine {
    pub fn new(options: &ExtractOptions) -> Result<Self> {
        Ok(Self {
            patterns: PatternSet::with_defaults(options)?,
            context: ContextExtractor::new(options),
            classifier: Classifier::new()?,
        })
    }

    /// Creates an Engine with default tuning
    pub fn with_defaults() -> Result<Self> {
        Self::new(&ExtractOptions::default())
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Extracts the deduplicated call sites of one script body
    pub fn extract(&self, unit: &SourceUnit) -> OriginReport {
        let text = unit.text.as_str();
        let mut candidates = Vec::new();

        for m in self.patterns.matches(text) {
            let ctx = self.context.extract(text, &m);
            if ctx.url_is_literal && !m.tag.is_socket() && !context::is_likely_api_url(&ctx.url) {
                debug!("Skipping {} match on asset URL {}", m.tag.name(), ctx.url);
                continue;
            }

            let parameters = ctx.arguments.as_deref().map(normalize::normalize);
            let kind = self.classifier.classify(&ClassifierInput {
                tag: m.tag,
                url: &ctx.url,
                parameters: parameters.as_ref(),
            });

            candidates.push(RequestCandidate {
                origin: unit.origin.clone(),
                kind,
                method: m.tag.request_method(),
                url: ctx.url,
                parameters,
            });
        }

        let found = candidates.len();
        let candidates = dedup::dedup(candidates);
        debug!(
            "{}: {} call sites, {} after dedup",
            unit.origin,
            found,
            candidates.len()
        );

        OriginReport {
            origin: unit.origin.clone(),
            kind: unit.kind,
            candidates,
        }
    }

    /// Extracts every unit in order; origins are never merged
    pub fn extract_all<'a>(&self, units: impl IntoIterator<Item = &'a SourceUnit>) -> ExtractionResult {
        ExtractionResult {
            origins: units.into_iter().map(|unit| self.extract(unit)).collect(),
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, RequestKind, SourceKind};
    use serde_json::{json, Value};

    fn engine() -> Engine {
        Engine::with_defaults().expect("engine builds")
    }

    fn run(text: &str) -> Vec<RequestCandidate> {
        engine()
            .extract(&SourceUnit::new("app.js", text, SourceKind::Local))
            .candidates
    }

    #[test]
    fn test_restful_get_without_parameters() {
        let found = run(r#"axios.get("/api/users")"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, RequestKind::Restful);
        assert_eq!(found[0].method, Some(HttpMethod::Get));
        assert_eq!(found[0].url, "/api/users");
        assert_eq!(found[0].parameters, None);
        assert_eq!(found[0].origin, "app.js");
    }

    #[test]
    fn test_graphql_over_fetch() {
        let text = r#"fetch("/graphql", {method:"POST", body: JSON.stringify({query: "{ items { id } }", variables: {id: userId}})})"#;
        let found = run(text);
        assert_eq!(found.len(), 1);
        let candidate = &found[0];
        assert_eq!(candidate.kind, RequestKind::GraphQl);
        assert_eq!(candidate.method, Some(HttpMethod::Post));
        assert_eq!(candidate.url, "/graphql");

        let params = candidate.parameters.as_ref().expect("parameters");
        let repaired: Value =
            serde_json::from_str(params.repaired_text.as_deref().expect("repaired")).expect("json");
        assert_eq!(repaired["body"]["query"], json!("{ items { id } }"));
        assert_eq!(repaired["body"]["variables"], json!({"id": "__EXPR_0__"}));
        assert_eq!(params.expressions[0].text, "userId");
        assert_eq!(params.expression(0), Some("userId"));
    }

    #[test]
    fn test_window_fetch_carries_method_field() {
        let found = run(r#"window.fetch("/api/x", {method: "POST", body: data})"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, RequestKind::Restful);
        assert_eq!(found[0].method, Some(HttpMethod::Post));
        assert_eq!(found[0].url, "/api/x");
        assert!(found[0].has_parameters());
    }

    #[test]
    fn test_variable_parameter_uses_assigned_object() {
        let found = run("const payload = {username: user, remember: true};\naxios.post('/api/login', payload);");
        assert_eq!(found.len(), 1);
        let params = found[0].parameters.as_ref().expect("parameters");
        let repaired: Value =
            serde_json::from_str(params.repaired_text.as_deref().expect("repaired")).expect("json");
        assert_eq!(repaired, json!({"username": "__EXPR_0__", "remember": true}));
        assert_eq!(params.expression(0), Some("user"));
    }

    #[test]
    fn test_websocket_constructor() {
        let found = run(r#"const ws = new WebSocket("wss://example.com/realtime");"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, RequestKind::WebSocket);
        assert_eq!(found[0].method, Some(HttpMethod::Ws));
        assert_eq!(found[0].url, "wss://example.com/realtime");
        assert_eq!(found[0].parameters, None);
    }

    #[test]
    fn test_duplicates_collapse_within_origin_only() {
        let text = "axios.get('/api/users');\nload();\naxios.get('/api/users');\n";
        assert_eq!(run(text).len(), 1);

        let units = [
            SourceUnit::new("a.js", text, SourceKind::External),
            SourceUnit::new("b.js", text, SourceKind::External),
        ];
        let result = engine().extract_all(&units);
        assert_eq!(result.origins.len(), 2);
        assert_eq!(result.total_candidates(), 2);
        assert_eq!(result.origins[0].candidates[0].origin, "a.js");
        assert_eq!(result.origins[1].candidates[0].origin, "b.js");
    }

    #[test]
    fn test_discovery_order_preserved() {
        let text = r#"
            api.delete(`/api/items/${id}`);
            fetch('/api/feed');
            axios.post('/api/login', { user, pass });
        "#;
        let urls: Vec<String> = run(text).into_iter().map(|c| c.url).collect();
        assert_eq!(urls, vec!["/api/items/${id}", "/api/feed", "/api/login"]);
    }

    #[test]
    fn test_missing_url_literal_is_still_reported() {
        let found = run("axios.get(ENDPOINTS.users)");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "axios.get(ENDPOINTS.users)");
        assert_eq!(found[0].kind, RequestKind::Restful);
    }

    #[test]
    fn test_asset_urls_are_skipped() {
        assert!(run("fetch('/static/app.css')").is_empty());
        assert_eq!(run("fetch('/api/config.json')").len(), 1);
    }

    #[test]
    fn test_unrepairable_parameters_keep_raw_text() {
        let found = run("axios.post('/api/x', {a: })");
        let params = found[0].parameters.as_ref().expect("parameters");
        assert_eq!(params.raw_text, "{a: }");
        assert_eq!(params.repaired_text, None);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let text = r#"
            $.ajax({ url: '/api/orders', type: 'POST', data: { id: orderId, items } });
            client.query({ query: "query { me { id } }" });
            xhr.open("PUT", "/api/items/1");
        "#;
        let unit = SourceUnit::new("bundle.js", text, SourceKind::External);
        let first = engine().extract(&unit);
        let second = engine().extract(&unit);
        assert_eq!(first, second);
        assert_eq!(first.candidate_count(), 3);
    }

    #[test]
    fn test_garbage_input_terminates() {
        let inputs = [
            "fetch(((((((",
            "axios.get('/api/x', {a: [1, {b: `${`${`",
            "'''\"\"\"```",
            "/* unterminated comment fetch('/api/a')",
            "",
        ];
        for text in inputs {
            let _ = run(text);
        }
    }
}
