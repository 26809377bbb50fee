use std::fmt::Write;

use crate::testing::{TestResult, TestStatus};

use super::{Report, Summary};

const STYLE: &str = r#"
body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 1200px; margin: 0 auto; padding: 20px; }
h1, h2, h3 { color: #2c3e50; }
.summary { display: flex; flex-wrap: wrap; margin-bottom: 20px; }
.card { flex: 1; min-width: 160px; padding: 12px 15px; margin: 8px; border-radius: 5px; box-shadow: 0 2px 5px rgba(0,0,0,0.1); }
.card p { font-size: 1.4em; margin: 0; }
.total { background: #e3f2fd; border-left: 5px solid #2196F3; }
.pass { background: #e8f5e9; border-left: 5px solid #4CAF50; }
.fail { background: #ffebee; border-left: 5px solid #F44336; }
.error { background: #fce4ec; border-left: 5px solid #AD1457; }
.skipped { background: #fff8e1; border-left: 5px solid #FFC107; }
.duration { background: #f3e5f5; border-left: 5px solid #9C27B0; }
table { width: 100%; border-collapse: collapse; margin-bottom: 20px; }
th, td { padding: 8px 12px; text-align: left; border-bottom: 1px solid #ddd; vertical-align: top; }
th { background: #f5f5f5; }
td.status { font-weight: bold; text-transform: uppercase; }
pre { background: #f5f5f5; padding: 10px; border-radius: 4px; white-space: pre-wrap; word-break: break-all; }
.meta td:first-child { font-weight: bold; width: 200px; }
.charts { display: flex; flex-wrap: wrap; gap: 20px; margin-bottom: 20px; }
.chart { flex: 1; min-width: 300px; }
.chart svg text { font-size: 11px; fill: #333; }
"#;

pub fn render(report: &Report) -> String {
    let meta = &report.metadata;
    let mut html = String::with_capacity(16 * 1024);

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<h1>{title}</h1>\n",
        title = escape(&meta.title),
    );

    if meta.cancelled {
        html.push_str("<p class=\"card fail\">Run was cancelled before every case ran.</p>\n");
    }

    html.push_str("<table class=\"meta\">\n");
    let schema = meta.schema_path.as_deref().unwrap_or("none");
    let auth = match &meta.auth_detail {
        Some(detail) => detail.clone(),
        None if meta.authenticated => "authenticated".to_string(),
        None => "not authenticated".to_string(),
    };
    for (label, value) in [
        ("Run", meta.run_id.clone()),
        ("API", meta.base_url.clone()),
        ("Started", meta.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ("Modules", meta.modules.join(", ")),
        ("Execution", format!("{} ({} workers)", meta.execution, meta.workers)),
        ("Seed", meta.seed.to_string()),
        ("Test data", (if meta.generate_data { "generated" } else { "disabled" }).to_string()),
        ("Authentication", auth),
        ("Schema", schema.to_string()),
    ] {
        let _ = writeln!(html, "<tr><td>{label}</td><td>{}</td></tr>", escape(&value));
    }
    html.push_str("</table>\n");

    summary_cards(&mut html, &report.summary, meta.duration_secs());
    charts(&mut html, report);

    html.push_str("<h2>Results by Module</h2>\n");
    html.push_str(
        "<table>\n<tr><th>Module</th><th>Total</th><th>Passed</th><th>Failed</th>\
         <th>Errors</th><th>Skipped</th><th>Pass rate</th></tr>\n",
    );
    for (module, summary) in &report.by_module {
        summary_row(&mut html, module, summary);
    }
    html.push_str("</table>\n");

    html.push_str("<h2>Results by Endpoint</h2>\n");
    html.push_str(
        "<table>\n<tr><th>Endpoint</th><th>Total</th><th>Passed</th><th>Failed</th>\
         <th>Errors</th><th>Skipped</th><th>Avg latency</th><th>Max latency</th></tr>\n",
    );
    for (endpoint, summary) in &report.by_endpoint {
        let counts = &summary.counts;
        let _ = writeln!(
            html,
            "<tr><td><code>{}</code></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td>{:.1} ms</td><td>{:.1} ms</td></tr>",
            escape(endpoint),
            counts.total,
            counts.passed,
            counts.failed,
            counts.errors,
            counts.skipped,
            summary.avg_latency_ms,
            summary.max_latency_ms,
        );
    }
    html.push_str("</table>\n");

    html.push_str("<h2>Test Results</h2>\n");
    html.push_str(
        "<table>\n<tr><th>#</th><th>Test</th><th>Request</th><th>Status</th>\
         <th>Latency</th><th>Details</th></tr>\n",
    );
    for result in &report.results {
        result_row(&mut html, result);
    }
    html.push_str("</table>\n");

    if !report.cleanup_failures.is_empty() {
        html.push_str("<h2>Cleanup Failures</h2>\n<table>\n<tr><th>Instance</th><th>Id</th><th>Error</th></tr>\n");
        for failure in &report.cleanup_failures {
            let _ = writeln!(
                html,
                "<tr class=\"fail\"><td>{}</td><td><code>{}</code></td><td>{}</td></tr>",
                escape(&failure.instance),
                escape(&failure.id),
                escape(&failure.message),
            );
        }
        html.push_str("</table>\n");
    }

    let _ = write!(
        html,
        "<p><small>Generated by llm-api-harness {}</small></p>\n</body>\n</html>\n",
        escape(&meta.harness_version)
    );
    html
}

fn summary_cards(html: &mut String, summary: &Summary, duration_secs: f64) {
    html.push_str("<div class=\"summary\">\n");
    for (class, label, value) in [
        ("total", "Total", summary.total.to_string()),
        ("pass", "Passed", format!("{} ({:.1}%)", summary.passed, summary.pass_rate)),
        ("fail", "Failed", summary.failed.to_string()),
        ("error", "Errors", summary.errors.to_string()),
        ("skipped", "Skipped", summary.skipped.to_string()),
        ("duration", "Duration", format!("{duration_secs:.2} s")),
    ] {
        let _ = writeln!(html, "<div class=\"card {class}\"><h3>{label}</h3><p>{value}</p></div>");
    }
    html.push_str("</div>\n");
}

/// Status colours shared by the charts, in `STATUS_ORDER` order.
const STATUS_ORDER: [(TestStatus, &str); 4] = [
    (TestStatus::Pass, "#4CAF50"),
    (TestStatus::Fail, "#F44336"),
    (TestStatus::Error, "#AD1457"),
    (TestStatus::Skipped, "#FFC107"),
];

const BAR_HEIGHT: f64 = 18.0;
const BAR_GAP: f64 = 8.0;
const LABEL_WIDTH: f64 = 220.0;
const BAR_WIDTH: f64 = 320.0;

fn count(summary: &Summary, status: TestStatus) -> usize {
    match status {
        TestStatus::Pass => summary.passed,
        TestStatus::Fail => summary.failed,
        TestStatus::Error => summary.errors,
        TestStatus::Skipped => summary.skipped,
    }
}

fn charts(html: &mut String, report: &Report) {
    if report.summary.total == 0 {
        return;
    }
    html.push_str("<h2>Charts</h2>\n<div class=\"charts\">\n");
    status_pie(html, &report.summary);
    module_bars(html, report);
    latency_bars(html, report);
    html.push_str("</div>\n");
}

/// Donut of the overall outcome. Each slice is a dashed stroke on a circle
/// whose circumference is 100, so dash lengths are percentages.
fn status_pie(html: &mut String, summary: &Summary) {
    const RADIUS: f64 = 15.915_494;
    html.push_str(
        "<div class=\"chart\"><h3>Outcome</h3>\
         <svg class=\"chart-status\" viewBox=\"0 0 80 42\" width=\"320\" height=\"168\" role=\"img\">\n",
    );
    let mut offset = 0.0;
    let mut legend_y = 8.0;
    for (status, color) in STATUS_ORDER {
        let value = count(summary, status);
        if value == 0 {
            continue;
        }
        let share = value as f64 / summary.total as f64 * 100.0;
        let _ = writeln!(
            html,
            "<circle cx=\"21\" cy=\"21\" r=\"{RADIUS}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"6\" \
             stroke-dasharray=\"{share:.2} {rest:.2}\" stroke-dashoffset=\"{dash:.2}\">\
             <title>{status}: {value}</title></circle>",
            rest = 100.0 - share,
            dash = 25.0 - offset,
        );
        let _ = writeln!(
            html,
            "<rect x=\"44\" y=\"{square:.1}\" width=\"4\" height=\"4\" fill=\"{color}\"/>\
             <text x=\"50\" y=\"{legend_y:.1}\" style=\"font-size:4px\">{status} {value} ({share:.1}%)</text>",
            square = legend_y - 3.5,
        );
        offset += share;
        legend_y += 7.0;
    }
    let _ = writeln!(
        html,
        "<text x=\"21\" y=\"22.5\" text-anchor=\"middle\" style=\"font-size:5px\">{:.0}%</text>",
        summary.pass_rate
    );
    html.push_str("</svg></div>\n");
}

/// One stacked bar per module, scaled to the largest module.
fn module_bars(html: &mut String, report: &Report) {
    let widest = report.by_module.values().map(|s| s.total).max().unwrap_or(0).max(1);
    let height = report.by_module.len() as f64 * (BAR_HEIGHT + BAR_GAP) + BAR_GAP;
    let _ = writeln!(
        html,
        "<div class=\"chart\"><h3>By module</h3><svg class=\"chart-modules\" viewBox=\"0 0 {w} {height}\" \
         width=\"{w}\" height=\"{height}\" role=\"img\">",
        w = LABEL_WIDTH + BAR_WIDTH,
    );
    for (row, (module, summary)) in report.by_module.iter().enumerate() {
        let y = BAR_GAP + row as f64 * (BAR_HEIGHT + BAR_GAP);
        let _ = writeln!(
            html,
            "<text x=\"0\" y=\"{:.1}\">{}</text>",
            y + BAR_HEIGHT * 0.75,
            escape(module)
        );
        let mut x = LABEL_WIDTH;
        for (status, color) in STATUS_ORDER {
            let value = count(summary, status);
            if value == 0 {
                continue;
            }
            let width = value as f64 / widest as f64 * BAR_WIDTH;
            let _ = writeln!(
                html,
                "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{width:.1}\" height=\"{BAR_HEIGHT}\" fill=\"{color}\">\
                 <title>{}: {value} {status}</title></rect>",
                escape(module),
            );
            x += width;
        }
    }
    html.push_str("</svg></div>\n");
}

/// Average latency per endpoint, longest first, scaled to the slowest.
fn latency_bars(html: &mut String, report: &Report) {
    let mut endpoints: Vec<_> = report
        .by_endpoint
        .iter()
        .filter(|(_, summary)| summary.avg_latency_ms > 0.0)
        .collect();
    if endpoints.is_empty() {
        return;
    }
    endpoints.sort_by(|a, b| b.1.avg_latency_ms.total_cmp(&a.1.avg_latency_ms));
    let slowest = endpoints[0].1.avg_latency_ms;
    let height = endpoints.len() as f64 * (BAR_HEIGHT + BAR_GAP) + BAR_GAP;
    let _ = writeln!(
        html,
        "<div class=\"chart\"><h3>Average latency</h3><svg class=\"chart-latency\" viewBox=\"0 0 {w} {height}\" \
         width=\"{w}\" height=\"{height}\" role=\"img\">",
        w = LABEL_WIDTH + BAR_WIDTH + 70.0,
    );
    for (row, (endpoint, summary)) in endpoints.into_iter().enumerate() {
        let y = BAR_GAP + row as f64 * (BAR_HEIGHT + BAR_GAP);
        let width = (summary.avg_latency_ms / slowest * BAR_WIDTH).max(1.0);
        let _ = writeln!(
            html,
            "<text x=\"0\" y=\"{text_y:.1}\">{name}</text>\
             <rect x=\"{LABEL_WIDTH}\" y=\"{y:.1}\" width=\"{width:.1}\" height=\"{BAR_HEIGHT}\" fill=\"#9C27B0\">\
             <title>{name}: {avg:.1} ms</title></rect>\
             <text x=\"{label_x:.1}\" y=\"{text_y:.1}\">{avg:.1} ms</text>",
            text_y = y + BAR_HEIGHT * 0.75,
            name = escape(endpoint),
            avg = summary.avg_latency_ms,
            label_x = LABEL_WIDTH + width + 4.0,
        );
    }
    html.push_str("</svg></div>\n");
}

fn summary_row(html: &mut String, name: &str, summary: &Summary) {
    let _ = writeln!(
        html,
        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.1}%</td></tr>",
        escape(name),
        summary.total,
        summary.passed,
        summary.failed,
        summary.errors,
        summary.skipped,
        summary.pass_rate,
    );
}

fn result_row(html: &mut String, result: &TestResult) {
    let class = status_class(result.status);
    let _ = write!(
        html,
        "<tr class=\"{class}\"><td>{}</td><td>{}</td><td><code>{}</code><br><small>{}</small></td>\
         <td class=\"status\">{}</td><td>{:.1} ms</td><td>",
        result.sequence,
        escape(&result.test_id),
        escape(&result.endpoint),
        escape(&result.path),
        result.status,
        result.latency_ms,
    );

    if let Some(message) = &result.message {
        let _ = write!(html, "{}", escape(message));
    }
    if !result.violations.is_empty() {
        html.push_str("<ul>");
        for violation in &result.violations {
            let location = if violation.path.is_empty() {
                String::new()
            } else {
                format!("<code>{}</code>: ", escape(&violation.path))
            };
            let _ = write!(html, "<li>{location}{}</li>", escape(&violation.message));
        }
        html.push_str("</ul>");
    }
    if let Some(response) = &result.response {
        let _ = write!(
            html,
            "<details><summary>Response {}{}</summary><pre>{}</pre></details>",
            response.status,
            if response.truncated { " (truncated)" } else { "" },
            escape(&response.body),
        );
    }
    html.push_str("</td></tr>\n");
}

fn status_class(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Pass => "pass",
        TestStatus::Fail => "fail",
        TestStatus::Error => "error",
        TestStatus::Skipped => "skipped",
    }
}

pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
