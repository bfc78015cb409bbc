//! Markdown report generation.
//!
//! This module renders a [`ResearchReport`] as Markdown or pretty JSON.

use crate::models::{ReportSection, ResearchReport, RiskAssessment, RiskBucket};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &ResearchReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", report.title));
    output.push_str(&format!("> {}\n\n", report.query));

    output.push_str(&generate_metadata_section(report));

    if let Some(ref error) = report.error {
        output.push_str("## Run Failed\n\n");
        output.push_str(&format!("❌ {}\n\n", error));
    }

    output.push_str(&generate_summary_section(report));

    if let Some(ref risk) = report.risk {
        output.push_str(&generate_risk_section(risk));
    }

    output.push_str(&generate_findings_section(&report.key_findings));

    if !report.sections.is_empty() {
        output.push_str("## Worker Analyses\n\n");
        for section in &report.sections {
            output.push_str(&generate_worker_section(section));
        }
    }

    output.push_str(&generate_list_section("Next Steps", &report.next_steps, true));
    output.push_str(&generate_list_section("Data Sources", &report.data_sources, false));

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(report: &ResearchReport) -> String {
    let metadata = &report.metadata;
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Run:** `{}`\n", metadata.run_id));
    section.push_str(&format!("- **State:** {}\n", metadata.run_state));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(ref condition) = report.condition {
        section.push_str(&format!("- **Condition:** {}\n", condition));
    }
    if let Some(ref drug) = report.drug_name {
        section.push_str(&format!("- **Drug:** {}\n", drug));
    }
    if let Some(method) = metadata.decomposition_method {
        section.push_str(&format!("- **Decomposition:** {}\n", method));
    }
    section.push_str(&format!(
        "- **Tasks:** {} dispatched, {} succeeded, {} failed ({} timed out)\n",
        metadata.tasks_dispatched, metadata.succeeded, metadata.failed, metadata.timed_out
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the executive summary section.
fn generate_summary_section(report: &ResearchReport) -> String {
    let mut section = String::new();

    section.push_str("## Executive Summary\n\n");
    if let Some(ref summary) = report.executive_summary {
        section.push_str(summary);
        section.push_str("\n\n");
    }

    section.push_str(&format!(
        "**Overall Confidence:** {:.1}/10\n\n",
        report.overall_confidence
    ));

    if let Some(ref recommendation) = report.recommendation {
        section.push_str(&format!("> 💡 **Recommendation:** {}\n\n", recommendation));
    }

    section
}

/// Generate the risk assessment table.
fn generate_risk_section(risk: &RiskAssessment) -> String {
    let mut section = String::new();

    section.push_str("## Risk Assessment\n\n");
    section.push_str(&format!(
        "**Overall Risk:** {} {}\n\n",
        risk.overall.emoji(),
        bucket_label(risk.overall)
    ));

    if !risk.per_worker.is_empty() {
        section.push_str("| Worker | Risk |\n");
        section.push_str("|:---|:---:|\n");
        for (kind, bucket) in &risk.per_worker {
            section.push_str(&format!(
                "| {} | {} {} |\n",
                kind.title(),
                bucket.emoji(),
                bucket_label(*bucket)
            ));
        }
        section.push('\n');
    }

    if !risk.incomplete.is_empty() {
        let names: Vec<&str> = risk.incomplete.iter().map(|k| k.title()).collect();
        section.push_str(&format!(
            "*Not assessed (worker failed or timed out): {}*\n\n",
            names.join(", ")
        ));
    }

    section
}

fn bucket_label(bucket: RiskBucket) -> &'static str {
    match bucket {
        RiskBucket::Low => "LOW",
        RiskBucket::Moderate => "MODERATE",
        RiskBucket::High => "HIGH",
        RiskBucket::Incomplete => "INCOMPLETE",
    }
}

/// Generate the key findings section.
fn generate_findings_section(findings: &[String]) -> String {
    let mut section = String::new();

    section.push_str("## Key Findings\n\n");
    if findings.is_empty() {
        section.push_str("No findings were produced.\n\n");
        return section;
    }

    for finding in findings {
        section.push_str(&format!("- {}\n", finding));
    }
    section.push('\n');

    section
}

/// Generate the section for a single worker.
fn generate_worker_section(worker: &ReportSection) -> String {
    let mut block = String::new();

    block.push_str(&format!("### {}\n\n", worker.worker.title()));

    let mut status_line = format!("*Status: {}", worker.status);
    if let Some(confidence) = worker.confidence {
        status_line.push_str(&format!(" | Confidence: {:.1}/10", confidence));
    }
    status_line.push_str("*\n\n");
    block.push_str(&status_line);

    if let Some(ref error) = worker.error {
        block.push_str(&format!("**Error:** {}\n\n", error));
    }

    if let Some(ref recommendation) = worker.recommendation {
        block.push_str(&format!("> 💡 {}\n\n", recommendation));
    }

    if !worker.data.is_null() {
        if let Ok(pretty) = serde_json::to_string_pretty(&worker.data) {
            block.push_str("<details>\n<summary>View Data</summary>\n\n```json\n");
            block.push_str(&pretty);
            block.push_str("\n```\n</details>\n\n");
        }
    }

    block
}

/// Generate a titled list, skipped when empty.
fn generate_list_section(title: &str, items: &[String], numbered: bool) -> String {
    if items.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str(&format!("## {}\n\n", title));

    for (i, item) in items.iter().enumerate() {
        if numbered {
            section.push_str(&format!("{}. {}\n", i + 1, item));
        } else {
            section.push_str(&format!("- {}\n", item));
        }
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by repurpose v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ResearchReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecompositionMethod, ReportMetadata, WorkerKind};
    use chrono::Utc;
    use serde_json::json;

    fn create_test_report() -> ResearchReport {
        let metadata = ReportMetadata {
            run_id: "run-1".to_string(),
            run_state: "completed".to_string(),
            analysis_date: Utc::now(),
            decomposition_method: Some(DecompositionMethod::Keyword),
            tasks_dispatched: 2,
            succeeded: 1,
            failed: 1,
            timed_out: 1,
            duration_seconds: 12.5,
        };

        ResearchReport {
            title: "Drug Repurposing Analysis: Alzheimer".to_string(),
            query: "Can metformin treat Alzheimer's?".to_string(),
            condition: Some("Alzheimer".to_string()),
            drug_name: Some("Metformin".to_string()),
            metadata,
            executive_summary: Some("Metformin shows moderate promise.".to_string()),
            recommendation: None,
            overall_confidence: 7.5,
            sections: vec![
                ReportSection {
                    worker: WorkerKind::Clinical,
                    status: "success".to_string(),
                    error: None,
                    confidence: Some(7.5),
                    recommendation: Some("Moderate clinical evidence.".to_string()),
                    data: json!({ "total_trials": 12 }),
                },
                ReportSection {
                    worker: WorkerKind::Patent,
                    status: "not_available".to_string(),
                    error: Some("timeout".to_string()),
                    confidence: None,
                    recommendation: None,
                    data: serde_json::Value::Null,
                },
            ],
            key_findings: vec!["clinical: 12 trials found with evidence score 5.5/10".to_string()],
            risk: Some(RiskAssessment {
                per_worker: [
                    (WorkerKind::Clinical, RiskBucket::Moderate),
                    (WorkerKind::Patent, RiskBucket::Incomplete),
                ]
                .into_iter()
                .collect(),
                incomplete: vec![WorkerKind::Patent],
                overall: RiskBucket::Moderate,
            }),
            next_steps: vec!["Engage patent attorney for freedom-to-operate analysis".to_string()],
            data_sources: vec!["ClinicalTrials.gov".to_string()],
            error: None,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Drug Repurposing Analysis: Alzheimer"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("- **Decomposition:** keyword"));
        assert!(markdown.contains("2 dispatched, 1 succeeded, 1 failed (1 timed out)"));
        assert!(markdown.contains("Metformin shows moderate promise."));
        assert!(markdown.contains("**Overall Confidence:** 7.5/10"));
        assert!(markdown.contains("**Overall Risk:** 🟡 MODERATE"));
        assert!(markdown.contains("| Patent Landscape | ⚪ INCOMPLETE |"));
        assert!(markdown.contains("### Clinical Intelligence"));
        assert!(markdown.contains("\"total_trials\": 12"));
        assert!(markdown.contains("**Error:** timeout"));
        assert!(markdown.contains("1. Engage patent attorney"));
        assert!(markdown.contains("- ClinicalTrials.gov"));
        assert!(!markdown.contains("## Run Failed"));
    }

    #[test]
    fn test_failed_run_markdown() {
        let mut report = create_test_report();
        report.error = Some("decomposition produced no tasks".to_string());
        report.sections.clear();
        report.risk = None;
        report.key_findings.clear();
        report.next_steps.clear();

        let markdown = generate_markdown_report(&report);
        assert!(markdown.contains("## Run Failed"));
        assert!(markdown.contains("decomposition produced no tasks"));
        assert!(markdown.contains("No findings were produced."));
        assert!(!markdown.contains("## Risk Assessment"));
        assert!(!markdown.contains("## Next Steps"));
    }

    #[test]
    fn test_generate_risk_section_lists_incomplete() {
        let report = create_test_report();
        let section = generate_risk_section(report.risk.as_ref().unwrap());
        assert!(section.contains("| Clinical Intelligence | 🟡 MODERATE |"));
        assert!(section.contains("Not assessed (worker failed or timed out): Patent Landscape"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"run_id\""));
        assert!(json.contains("\"sections\""));
        assert!(json.contains("\"not_available\""));
        assert!(!json.contains("\"error\": null"));

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["risk"]["overall"], "moderate");
        assert_eq!(parsed["sections"][0]["worker"], "clinical");
    }
}
