//! Script discovery in HTML pages

use scraper::{Html, Selector};
use url::Url;

/// A script referenced by a page, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptRef {
    /// Absolute URL of a `script[src]`
    External(String),
    /// Body of an inline `<script>`
    Inline(String),
}

/// Script types that hold data or templates rather than code
fn is_javascript_type(script_type: Option<&str>) -> bool {
    let Some(script_type) = script_type else {
        return true;
    };
    let script_type = script_type.trim().to_ascii_lowercase();
    script_type.is_empty()
        || script_type == "module"
        || script_type.contains("javascript")
        || script_type.contains("ecmascript")
        || script_type.contains("jsx")
        || script_type.contains("babel")
}

/// Collects external and inline scripts from `html`.
///
/// Returns the scripts plus the `src` values that could not be resolved
/// against `page_url`.
pub fn extract_scripts(page_url: &Url, html: &str) -> (Vec<ScriptRef>, Vec<String>) {
    let document = Html::parse_document(html);
    let mut scripts = Vec::new();
    let mut unresolved = Vec::new();

    let Ok(selector) = Selector::parse("script") else {
        return (scripts, unresolved);
    };

    for element in document.select(&selector) {
        let attrs = element.value();
        if !is_javascript_type(attrs.attr("type")) {
            continue;
        }

        if let Some(src) = attrs.attr("src") {
            let src = src.trim();
            let lower = src.to_ascii_lowercase();
            if src.is_empty() || lower.starts_with("data:") || lower.starts_with("javascript:") {
                continue;
            }
            match page_url.join(src) {
                Ok(mut resolved) => {
                    resolved.set_fragment(None);
                    scripts.push(ScriptRef::External(resolved.to_string()));
                }
                Err(_) => unresolved.push(src.to_string()),
            }
            continue;
        }

        let body: String = element.text().collect();
        if !body.trim().is_empty() {
            scripts.push(ScriptRef::Inline(body));
        }
    }

    (scripts, unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://example.com/app/index.html").expect("valid url")
    }

    #[test]
    fn test_scripts_in_document_order() {
        let html = r#"<html><head>
            <script src="/static/vendor.js"></script>
            <script>axios.get('/api/a')</script>
            </head><body>
            <script src="main.js#v2"></script>
            <script src="https://cdn.example.net/lib.js"></script>
            </body></html>"#;
        let (scripts, unresolved) = extract_scripts(&page(), html);
        assert_eq!(
            scripts,
            vec![
                ScriptRef::External("https://example.com/static/vendor.js".to_string()),
                ScriptRef::Inline("axios.get('/api/a')".to_string()),
                ScriptRef::External("https://example.com/app/main.js".to_string()),
                ScriptRef::External("https://cdn.example.net/lib.js".to_string()),
            ]
        );
        assert!(unresolved.is_empty());
    }

    #[test]
    fn test_non_javascript_and_empty_scripts_skipped() {
        let html = r#"
            <script type="application/ld+json">{"@context": "https://schema.org"}</script>
            <script type="text/template"><div>{{ name }}</div></script>
            <script>   </script>
            <script src=""></script>
            <script src="data:text/javascript,alert(1)"></script>
            <script type="module">fetch('/api/m')</script>
            <script type="text/javascript">fetch('/api/t')</script>
        "#;
        let (scripts, _) = extract_scripts(&page(), html);
        assert_eq!(
            scripts,
            vec![
                ScriptRef::Inline("fetch('/api/m')".to_string()),
                ScriptRef::Inline("fetch('/api/t')".to_string()),
            ]
        );
    }

    #[test]
    fn test_unresolvable_src_reported() {
        let html = r#"<script src="http://[::1"></script><script src="/ok.js"></script>"#;
        let (scripts, unresolved) = extract_scripts(&page(), html);
        assert_eq!(scripts, vec![ScriptRef::External("https://example.com/ok.js".to_string())]);
        assert_eq!(unresolved, vec!["http://[::1".to_string()]);
    }
}
