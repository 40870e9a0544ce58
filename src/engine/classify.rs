//! Request kind classification
//!
//! Every rule is checked independently and the highest-priority kind among the
//! rules that apply wins, so the outcome never depends on the order the rules
//! are registered in.

use crate::engine::patterns::PatternTag;
use crate::error::Result;
use crate::models::{ParameterBlock, RequestKind};
use regex::Regex;
use serde_json::Value;

/// What the classifier gets to look at for one call site
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub tag: PatternTag,
    pub url: &'a str,
    pub parameters: Option<&'a ParameterBlock>,
}

/// One classification rule
pub trait ClassificationRule: Send + Sync {
    /// Kind assigned when the rule applies
    fn kind(&self) -> RequestKind;

    fn applies(&self, input: &ClassifierInput<'_>) -> bool;
}

/// Socket constructors
pub struct WebSocketRule;

impl ClassificationRule for WebSocketRule {
    fn kind(&self) -> RequestKind {
        RequestKind::WebSocket
    }

    fn applies(&self, input: &ClassifierInput<'_>) -> bool {
        input.tag.is_socket()
    }
}

/// `query` or `mutation` token in the raw parameter text
pub struct GraphQlRule {
    token: Regex,
}

impl GraphQlRule {
    pub fn new() -> Result<Self> {
        Ok(Self {
            token: Regex::new(r"\b(?:query|mutation)\b")?,
        })
    }
}

impl ClassificationRule for GraphQlRule {
    fn kind(&self) -> RequestKind {
        RequestKind::GraphQl
    }

    fn applies(&self, input: &ClassifierInput<'_>) -> bool {
        input
            .parameters
            .is_some_and(|p| self.token.is_match(&p.raw_text))
    }
}

/// `/rpc` in the URL, or a JSON-RPC envelope anywhere in the parameters
pub struct RpcRule;

impl ClassificationRule for RpcRule {
    fn kind(&self) -> RequestKind {
        RequestKind::Rpc
    }

    fn applies(&self, input: &ClassifierInput<'_>) -> bool {
        if url_path(input.url).to_ascii_lowercase().contains("/rpc") {
            return true;
        }
        input
            .parameters
            .and_then(|p| p.repaired_text.as_deref())
            .and_then(|text| serde_json::from_str::<Value>(text).ok())
            .is_some_and(|value| has_rpc_envelope(&value))
    }
}

/// `/api/` in the URL, or a method spelled out at the call site
pub struct RestRule;

impl ClassificationRule for RestRule {
    fn kind(&self) -> RequestKind {
        RequestKind::Restful
    }

    fn applies(&self, input: &ClassifierInput<'_>) -> bool {
        url_path(input.url).to_ascii_lowercase().contains("/api/")
            || input.tag.explicit_method().is_some()
    }
}

/// Drops the query string and fragment
fn url_path(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

fn has_rpc_envelope(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            ["method", "params", "id"].iter().all(|key| map.contains_key(*key))
                || map.values().any(has_rpc_envelope)
        }
        Value::Array(items) => items.iter().any(has_rpc_envelope),
        _ => false,
    }
}

/// Assigns a [`RequestKind`] from a fixed rule set
pub struct Classifier {
    rules: Vec<Box<dyn ClassificationRule>>,
}

impl Classifier {
    pub fn new() -> Result<Self> {
        Ok(Self::with_rules(vec![
            Box::new(WebSocketRule),
            Box::new(GraphQlRule::new()?),
            Box::new(RpcRule),
            Box::new(RestRule),
        ]))
    }

    pub fn with_rules(rules: Vec<Box<dyn ClassificationRule>>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, input: &ClassifierInput<'_>) -> RequestKind {
        self.rules
            .iter()
            .filter(|rule| rule.applies(input))
            .map(|rule| rule.kind())
            .min()
            .unwrap_or(RequestKind::GenericHttp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::normalize::normalize;
    use crate::models::HttpMethod;

    fn classify(tag: PatternTag, url: &str, params: Option<&str>) -> RequestKind {
        let block = params.map(normalize);
        Classifier::new().expect("rules compile").classify(&ClassifierInput {
            tag,
            url,
            parameters: block.as_ref(),
        })
    }

    #[test]
    fn test_websocket_wins_over_everything() {
        let kind = classify(PatternTag::WebSocket, "wss://x/api/rpc", Some("{query: 1}"));
        assert_eq!(kind, RequestKind::WebSocket);
    }

    #[test]
    fn test_graphql_token() {
        let kind = classify(
            PatternTag::ConfigObject(Some(HttpMethod::Post)),
            "/api/graphql",
            Some("{body: JSON.stringify({query: q})}"),
        );
        assert_eq!(kind, RequestKind::GraphQl);
        // Token boundaries matter
        let kind = classify(PatternTag::Fetch, "/search", Some("{querystring: q}"));
        assert_eq!(kind, RequestKind::GenericHttp);
    }

    #[test]
    fn test_rpc_by_url_and_envelope() {
        assert_eq!(classify(PatternTag::Fetch, "/RPC/v1", None), RequestKind::Rpc);
        let kind = classify(
            PatternTag::MethodCall(HttpMethod::Post),
            "/api/endpoint",
            Some("{jsonrpc: '2.0', method: 'eth_call', params: [], id: 1}"),
        );
        assert_eq!(kind, RequestKind::Rpc);
        let kind = classify(
            PatternTag::Fetch,
            "/bridge",
            Some("{method: 'POST', body: {method: 'sum', params: [1, 2], id: n}}"),
        );
        assert_eq!(kind, RequestKind::Rpc);
    }

    #[test]
    fn test_restful_by_path_or_method() {
        assert_eq!(classify(PatternTag::Fetch, "/api/users?x=1", None), RequestKind::Restful);
        assert_eq!(
            classify(PatternTag::MethodCall(HttpMethod::Delete), "/users/1", None),
            RequestKind::Restful
        );
        assert_eq!(classify(PatternTag::ConfigObject(None), "/users", None), RequestKind::GenericHttp);
    }

    #[test]
    fn test_generic_fallback() {
        assert_eq!(classify(PatternTag::Fetch, "/data", None), RequestKind::GenericHttp);
        assert_eq!(
            classify(PatternTag::Fetch, "https://example.com/x?next=/api/", None),
            RequestKind::GenericHttp
        );
    }

    #[test]
    fn test_rule_order_does_not_change_outcome() {
        let block = normalize("{query: 'query { a }', method: 'm', params: [], id: 1}");
        let inputs = [
            ClassifierInput { tag: PatternTag::WebSocket, url: "/rpc", parameters: Some(&block) },
            ClassifierInput { tag: PatternTag::Fetch, url: "/rpc", parameters: Some(&block) },
            ClassifierInput {
                tag: PatternTag::MethodCall(HttpMethod::Get),
                url: "/api/rpc",
                parameters: None,
            },
            ClassifierInput { tag: PatternTag::CatchAll(HttpMethod::Put), url: "/x", parameters: None },
            ClassifierInput { tag: PatternTag::GraphQl, url: "/graphql", parameters: None },
        ];

        let forward = Classifier::new().expect("rules compile");
        let reversed = Classifier::with_rules(vec![
            Box::new(RestRule),
            Box::new(RpcRule),
            Box::new(GraphQlRule::new().expect("rule compiles")),
            Box::new(WebSocketRule),
        ]);
        let shuffled = Classifier::with_rules(vec![
            Box::new(RpcRule),
            Box::new(WebSocketRule),
            Box::new(RestRule),
            Box::new(GraphQlRule::new().expect("rule compiles")),
        ]);
        for input in &inputs {
            let expected = forward.classify(input);
            assert_eq!(reversed.classify(input), expected);
            assert_eq!(shuffled.classify(input), expected);
        }
        assert_eq!(forward.classify(&inputs[0]), RequestKind::WebSocket);
        assert_eq!(forward.classify(&inputs[1]), RequestKind::GraphQl);
        assert_eq!(forward.classify(&inputs[2]), RequestKind::Rpc);
        assert_eq!(forward.classify(&inputs[3]), RequestKind::Restful);
        assert_eq!(forward.classify(&inputs[4]), RequestKind::GenericHttp);
    }
}
