//! HTML report generation using Tera templates

use crate::error::Result;
use crate::models::{RequestKind, ScanRun};
use crate::report::text::render_parameters;
use serde::Serialize;
use std::path::Path;
use tera::{Context, Tera};
use tracing::info;

#[derive(Serialize)]
struct CandidateView<'a> {
    kind: &'a str,
    method: &'a str,
    url: &'a str,
    parameters: Option<String>,
    repaired: bool,
}

#[derive(Serialize)]
struct OriginView<'a> {
    anchor: String,
    origin: &'a str,
    kind: String,
    with_parameters: usize,
    candidates: Vec<CandidateView<'a>>,
}

#[derive(Serialize)]
struct KindCount {
    label: &'static str,
    count: usize,
}

fn origin_views(run: &ScanRun) -> Vec<OriginView<'_>> {
    run.result
        .origins
        .iter()
        .enumerate()
        .map(|(i, origin)| OriginView {
            anchor: format!("origin-{}", i + 1),
            origin: &origin.origin,
            kind: origin.kind.to_string(),
            with_parameters: origin.with_parameters_count(),
            candidates: origin
                .candidates
                .iter()
                .map(|c| CandidateView {
                    kind: c.kind.label(),
                    method: c.method_label(),
                    url: &c.url,
                    parameters: c
                        .parameters
                        .as_ref()
                        .filter(|_| c.has_parameters())
                        .map(render_parameters),
                    repaired: c.parameters.as_ref().is_some_and(|p| p.is_repaired()),
                })
                .collect(),
        })
        .collect()
}

/// Renders a run to an HTML string
pub fn render(run: &ScanRun) -> Result<String> {
    let template_path = "templates/report.html";
    let template_content =
        std::fs::read_to_string(template_path).unwrap_or_else(|_| default_template().to_string());

    let mut tera = Tera::default();
    tera.add_raw_template("report.html", &template_content)?;

    let kind_counts: Vec<KindCount> = RequestKind::ALL
        .iter()
        .map(|kind| KindCount {
            label: kind.label(),
            count: run.result.count_by_kind(*kind),
        })
        .collect();

    let mut context = Context::new();
    context.insert("input", &run.input);
    context.insert("run_id", &run.run_id);
    context.insert("started_at", &run.started_at.format("%Y-%m-%d %H:%M:%S").to_string());
    context.insert(
        "finished_at",
        &run.finished_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "N/A".to_string()),
    );
    context.insert("status", &run.status.to_string());
    context.insert("total_requests", &run.total_requests);
    context.insert("origins", &origin_views(run));
    context.insert("warnings", &run.result.warnings);
    context.insert("kind_counts", &kind_counts);
    context.insert("total_candidates", &run.result.total_candidates());
    context.insert("total_with_parameters", &run.result.total_with_parameters());
    context.insert("version", env!("CARGO_PKG_VERSION"));

    Ok(tera.render("report.html", &context)?)
}

/// Generates an HTML report file from a run
pub fn generate(run: &ScanRun, output_path: &Path) -> Result<()> {
    let rendered = render(run)?;
    std::fs::write(output_path, rendered)?;
    info!("HTML report saved to {}", output_path.display());
    Ok(())
}

fn default_template() -> &'static str {
    r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>jsprobe - API Extraction Report</title>
    <style>
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f1f5f9; color: #1e293b; line-height: 1.6; }
        .container { max-width: 1200px; margin: 0 auto; padding: 20px; }
        .header { background: linear-gradient(135deg, #0f172a 0%, #1e293b 50%, #334155 100%); color: white; padding: 40px 30px; border-radius: 12px; margin-bottom: 30px; text-align: center; }
        .header h1 { font-size: 2.2em; margin-bottom: 5px; letter-spacing: 2px; }
        .header .meta { opacity: 0.6; margin-top: 15px; font-size: 0.9em; word-break: break-all; }
        .summary { display: grid; grid-template-columns: repeat(5, 1fr); gap: 15px; margin-bottom: 30px; }
        @media (max-width: 768px) { .summary { grid-template-columns: repeat(2, 1fr); } }
        .card { background: white; padding: 25px 15px; border-radius: 10px; text-align: center; box-shadow: 0 1px 3px rgba(0,0,0,0.1); border-top: 4px solid #e2e8f0; }
        .card .count { font-size: 2.5em; font-weight: 800; }
        .card .label { font-size: 0.85em; text-transform: uppercase; letter-spacing: 1px; margin-top: 5px; opacity: 0.7; }
        .card.k-WebSocket { border-top-color: #7c3aed; } .card.k-GraphQL { border-top-color: #db2777; }
        .card.k-RPC { border-top-color: #ea580c; } .card.k-RESTful { border-top-color: #2563eb; }
        .card.k-GenericHTTP { border-top-color: #6b7280; }
        .section-title { font-size: 1.4em; font-weight: 700; margin: 30px 0 15px; padding-bottom: 10px; border-bottom: 2px solid #e2e8f0; }
        .toc { background: white; padding: 20px 25px; border-radius: 10px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
        .toc input { width: 100%; padding: 8px 12px; border: 1px solid #cbd5e1; border-radius: 6px; margin-bottom: 12px; font-size: 0.95em; }
        .toc ul { list-style: none; }
        .toc li { padding: 3px 0; word-break: break-all; }
        .toc a { color: #2563eb; text-decoration: none; }
        .toc .count { color: #64748b; font-size: 0.85em; margin-left: 6px; }
        .origin { background: white; padding: 25px; border-radius: 10px; margin-bottom: 15px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); border-left: 4px solid #334155; }
        .origin h3 { margin-bottom: 10px; font-size: 1.05em; word-break: break-all; }
        table { width: 100%; border-collapse: collapse; font-size: 0.9em; }
        th, td { text-align: left; padding: 8px; border-bottom: 1px solid #f1f5f9; vertical-align: top; }
        td.url { word-break: break-all; font-family: monospace; }
        .badge { display: inline-block; padding: 2px 10px; border-radius: 20px; color: white; font-size: 0.75em; font-weight: 700; letter-spacing: 0.5px; vertical-align: middle; }
        .badge-WebSocket { background: #7c3aed; } .badge-GraphQL { background: #db2777; }
        .badge-RPC { background: #ea580c; } .badge-RESTful { background: #2563eb; }
        .badge-GenericHTTP { background: #6b7280; }
        .method { font-family: monospace; font-weight: 700; }
        .raw { color: #b45309; font-size: 0.8em; }
        details summary { cursor: pointer; color: #475569; }
        pre { background: #f8fafc; border: 1px solid #e2e8f0; padding: 15px; border-radius: 6px; overflow-x: auto; font-size: 0.85em; margin: 8px 0; white-space: pre-wrap; word-wrap: break-word; }
        .warning { background: #fffbeb; border-left: 4px solid #ca8a04; padding: 10px 15px; margin-bottom: 8px; border-radius: 6px; word-break: break-all; }
        .empty { color: #64748b; }
        .footer { text-align: center; padding: 30px; color: #94a3b8; font-size: 0.85em; margin-top: 30px; }
        .info-bar { background: white; padding: 15px 25px; border-radius: 10px; margin-bottom: 20px; display: flex; justify-content: space-between; flex-wrap: wrap; gap: 10px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); font-size: 0.9em; color: #64748b; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>JSPROBE</h1>
            <div class="subtitle">JavaScript API Extraction Report</div>
            <div class="meta">Input: {{ input }} | Run ID: {{ run_id }}</div>
        </div>
        <div class="info-bar">
            <span><strong>Started:</strong> {{ started_at }}</span>
            <span><strong>Finished:</strong> {{ finished_at }}</span>
            <span><strong>Status:</strong> {{ status }}</span>
            <span><strong>Requests:</strong> {{ total_requests }}</span>
            <span><strong>Call sites:</strong> {{ total_candidates }} ({{ total_with_parameters }} with parameters)</span>
        </div>
        <div class="summary">
            {% for k in kind_counts %}<div class="card k-{{ k.label }}"><div class="count">{{ k.count }}</div><div class="label">{{ k.label }}</div></div>
            {% endfor %}
        </div>
        {% if warnings | length > 0 %}
        <div class="section-title">Warnings ({{ warnings | length }})</div>
        {% for w in warnings %}<div class="warning"><strong>{{ w.origin }}</strong>: {{ w.message }}</div>
        {% endfor %}
        {% endif %}
        <div class="section-title">Sources ({{ origins | length }})</div>
        <div class="toc">
            <input type="search" id="toc-filter" placeholder="Filter sources and URLs...">
            <ul id="toc">
            {% for o in origins %}<li data-origin="{{ o.anchor }}"><a href="#{{ o.anchor }}">{{ o.origin }}</a><span class="count">{{ o.candidates | length }} call sites</span></li>
            {% endfor %}
            </ul>
        </div>
        <div class="section-title">Call Sites</div>
        {% for o in origins %}
        <div class="origin" id="{{ o.anchor }}">
            <h3>{{ o.origin }} <span class="count">({{ o.kind }}, {{ o.candidates | length }} call sites, {{ o.with_parameters }} with parameters)</span></h3>
            {% if o.candidates | length == 0 %}
            <p class="empty">No request information found.</p>
            {% else %}
            <table>
                <tr><th>Kind</th><th>Method</th><th>URL</th><th>Parameters</th></tr>
                {% for c in o.candidates %}
                <tr>
                    <td><span class="badge badge-{{ c.kind }}">{{ c.kind }}</span></td>
                    <td class="method">{{ c.method }}</td>
                    <td class="url">{{ c.url }}</td>
                    <td>{% if c.parameters %}<details><summary>show{% if not c.repaired %} <span class="raw">raw</span>{% endif %}</summary><pre>{{ c.parameters }}</pre></details>{% else %}<span class="empty">none</span>{% endif %}</td>
                </tr>
                {% endfor %}
            </table>
            {% endif %}
        </div>
        {% endfor %}
        <div class="footer">Generated by jsprobe v{{ version }} | {{ started_at }}</div>
    </div>
    <script>
        document.getElementById('toc-filter').addEventListener('input', function (e) {
            var needle = e.target.value.toLowerCase();
            document.querySelectorAll('#toc li').forEach(function (li) {
                var section = document.getElementById(li.dataset.origin);
                var hit = !needle || section.textContent.toLowerCase().indexOf(needle) !== -1;
                li.style.display = hit ? '' : 'none';
                section.style.display = hit ? '' : 'none';
            });
        });
    </script>
</body>
</html>"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::normalize::normalize;
    use crate::models::{
        AcquireWarning, HttpMethod, OriginReport, RequestCandidate, RunStatus, SourceKind,
    };

    fn sample_run() -> ScanRun {
        let mut run = ScanRun::new("page https://example.com/");
        run.result.origins.push(OriginReport {
            origin: "https://example.com/ inline script #1".to_string(),
            kind: SourceKind::Inline,
            candidates: vec![RequestCandidate {
                origin: "https://example.com/ inline script #1".to_string(),
                kind: RequestKind::Restful,
                method: Some(HttpMethod::Post),
                url: "/api/login?next=<home>".to_string(),
                parameters: Some(normalize("{user: name}")),
            }],
        });
        run.result
            .warnings
            .push(AcquireWarning::new("https://example.com/x.js", "HTTP 404 Not Found"));
        run.finish(RunStatus::Completed);
        run
    }

    #[test]
    fn test_render_contains_candidates_and_warnings() {
        let html = render(&sample_run()).expect("renders");
        assert!(html.contains("badge-RESTful"));
        assert!(html.contains("__JS_EXPR_0__"));
        assert!(html.contains("HTTP 404 Not Found"));
        assert!(html.contains(r##"href="#origin-1""##));
        assert!(html.contains("<td class=\"method\">POST</td>"));
    }

    #[test]
    fn test_render_escapes_source_text() {
        let html = render(&sample_run()).expect("renders");
        assert!(html.contains("next=&lt;home&gt;"));
        assert!(!html.contains("next=<home>"));
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.html");
        generate(&sample_run(), &path).expect("generates");
        let html = std::fs::read_to_string(&path).expect("read");
        assert!(html.starts_with("<!DOCTYPE html>"));
    }
}
