//! Report export
//!
//! Deterministic renderings of an [`AuditReport`] for storage or display.
//! Rendering is purely a formatting step with no side effects; the same
//! report always produces the same document.

use super::AuditReport;
use crate::error::Result;

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// JSON format
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Markdown document with stable section headers
    Markdown,
}

/// Report exporter
pub struct ReportExporter;

impl ReportExporter {
    /// Export in the requested format
    pub fn export(report: &AuditReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => Ok(serde_json::to_string(report)?),
            ReportFormat::JsonPretty => Ok(serde_json::to_string_pretty(report)?),
            ReportFormat::Markdown => Ok(Self::to_markdown(report)),
        }
    }

    /// Render as a Markdown document.
    ///
    /// Section headers are stable: Summary, Events by Category, Decisions
    /// Flow, Insights.
    pub fn to_markdown(report: &AuditReport) -> String {
        let mut lines = Vec::new();
        let summary = &report.summary;

        lines.push(format!("# Audit Report: {}", report.session_id));
        lines.push(String::new());
        lines.push(format!(
            "Generated at {}",
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        lines.push(String::new());

        lines.push("## Summary".to_string());
        lines.push(String::new());
        lines.push(format!("- Total events: {}", summary.total_events));
        if let (Some(first), Some(last)) = (summary.first_timestamp, summary.last_timestamp) {
            lines.push(format!(
                "- Time span: {} to {}",
                first.format("%H:%M:%S"),
                last.format("%H:%M:%S")
            ));
        }
        for (source, count) in &summary.by_source {
            lines.push(format!("- From {source}: {count}"));
        }
        lines.push(String::new());

        lines.push("## Events by Category".to_string());
        lines.push(String::new());
        if summary.by_category.is_empty() {
            lines.push("(none)".to_string());
        } else {
            for (category, count) in &summary.by_category {
                lines.push(format!("- {category}: {count}"));
            }
        }
        lines.push(String::new());

        lines.push("## Decisions Flow".to_string());
        lines.push(String::new());
        let flow = &summary.decisions_flow;
        lines.push(format!("- Created: {}", flow.created));
        lines.push(format!("- Resolved: {}", flow.resolved));
        lines.push(format!("- Deferred: {}", flow.deferred));
        lines.push(format!("- Pending: {}", flow.pending));
        lines.push(String::new());

        lines.push("## Insights".to_string());
        lines.push(String::new());
        if report.insights.is_empty() {
            lines.push("No findings.".to_string());
        } else {
            for insight in &report.insights {
                lines.push(format!(
                    "- **{}** [{}]: {}",
                    insight.title,
                    insight.severity.as_str(),
                    insight.description
                ));
            }
        }
        lines.push(String::new());

        lines.join("\n")
    }
}
