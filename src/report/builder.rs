//! Assemble a [`ResearchReport`] from a finished run.

use crate::models::{ReportMetadata, ReportSection, ResearchReport, WorkerKind, WorkerOutcome};
use crate::orchestrator::QueryRun;
use serde_json::Value;

/// Status shown for a section whose worker produced no usable data.
pub const NOT_AVAILABLE: &str = "not_available";

/// Standard follow-ups, most important first.
const STANDARD_NEXT_STEPS: [&str; 5] = [
    "Conduct detailed review of clinical trial results",
    "Engage patent attorney for freedom-to-operate analysis",
    "Develop detailed market entry strategy",
    "Initiate discussions with key opinion leaders",
    "Evaluate regulatory pathway and requirements",
];

const MAX_NEXT_STEPS: usize = 3;

/// Build the report for a run in any terminal state.
///
/// Worker payloads are copied into the sections only when
/// `include_payloads` is set.
pub fn build_report(run: &QueryRun, include_payloads: bool) -> ResearchReport {
    let decomposition = run.decomposition.as_ref();
    let condition = decomposition.map(|d| d.condition.clone());
    let aggregate = run.aggregate.as_ref();

    let title = match &condition {
        Some(condition) => format!("Drug Repurposing Analysis: {}", condition),
        None => "Drug Repurposing Analysis".to_string(),
    };

    let sections = aggregate
        .map(|result| {
            result
                .by_worker
                .values()
                .map(|outcome| section(outcome, include_payloads))
                .collect()
        })
        .unwrap_or_default();

    let metadata = ReportMetadata {
        run_id: run.id.clone(),
        run_state: run.state.to_string(),
        analysis_date: run.started_at,
        decomposition_method: decomposition.map(|d| d.method),
        tasks_dispatched: run.tasks.len(),
        succeeded: aggregate.map_or(0, |r| r.succeeded),
        failed: aggregate.map_or(0, |r| r.failed),
        timed_out: aggregate.map_or(0, |r| r.timed_out),
        duration_seconds: run.duration_seconds().unwrap_or_default(),
    };

    ResearchReport {
        title,
        query: run.query.clone(),
        condition,
        drug_name: decomposition.and_then(|d| d.drug_name.clone()),
        metadata,
        executive_summary: run.narrative.as_ref().map(|n| n.executive_summary.clone()),
        recommendation: run.narrative.as_ref().and_then(|n| n.recommendation.clone()),
        overall_confidence: aggregate.map_or(0.0, |r| r.overall_confidence),
        sections,
        key_findings: aggregate.map(|r| r.findings.clone()).unwrap_or_default(),
        risk: aggregate.map(|r| r.risk.clone()),
        next_steps: aggregate
            .map(|r| next_steps(&r.risk.incomplete))
            .unwrap_or_default(),
        data_sources: aggregate.map(|r| r.data_sources.clone()).unwrap_or_default(),
        error: run.error.clone(),
    }
}

fn section(outcome: &WorkerOutcome, include_payloads: bool) -> ReportSection {
    let usable = outcome.is_usable();
    ReportSection {
        worker: outcome.worker,
        status: if usable {
            outcome.status.to_string()
        } else {
            NOT_AVAILABLE.to_string()
        },
        error: outcome.error.clone(),
        confidence: usable.then(|| outcome.confidence_score()),
        recommendation: outcome.data["recommendation"].as_str().map(String::from),
        data: if usable && include_payloads {
            outcome.data.clone()
        } else {
            Value::Null
        },
    }
}

/// Re-runs for incomplete workers come first, then the standard steps.
fn next_steps(incomplete: &[WorkerKind]) -> Vec<String> {
    incomplete
        .iter()
        .map(|kind| format!("Re-run {} analysis once its data source is available", kind.title()))
        .chain(STANDARD_NEXT_STEPS.iter().map(|s| s.to_string()))
        .take(MAX_NEXT_STEPS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate;
    use crate::models::{
        Analysis, Decomposition, DecompositionMethod, DomainScore, Narrative, RiskBucket,
    };
    use crate::orchestrator::RunState;
    use serde_json::json;
    use std::time::Duration;

    fn completed_run() -> QueryRun {
        let decomposition = Decomposition {
            condition: "Alzheimer".to_string(),
            drug_name: Some("Metformin".to_string()),
            analysis_type: "repurposing".to_string(),
            required_workers: [WorkerKind::Clinical, WorkerKind::Patent].into_iter().collect(),
            parameters: Default::default(),
            method: DecompositionMethod::Llm,
        };
        let tasks = crate::decompose::build_tasks(&decomposition);

        let outcomes = vec![
            WorkerOutcome::from_analysis(
                &tasks[0],
                Analysis {
                    data: json!({ "recommendation": "Moderate clinical evidence.", "total_trials": 12 }),
                    confidence: 0.75,
                    score: Some(DomainScore::opportunity(5.5)),
                    findings: vec!["12 trials found with evidence score 5.5/10".to_string()],
                    sources: vec!["ClinicalTrials.gov".to_string()],
                    warnings: Vec::new(),
                },
                Duration::from_millis(40),
            ),
            WorkerOutcome::timed_out(&tasks[1], Duration::from_secs(5)),
        ];

        let mut run = QueryRun::new("Can metformin treat Alzheimer's?");
        for state in [RunState::Decomposing, RunState::Dispatching, RunState::Aggregating] {
            run.advance(state).unwrap();
        }
        run.aggregate = Some(aggregate(&outcomes));
        run.decomposition = Some(decomposition);
        run.tasks = tasks;
        run.outcomes = outcomes;
        run.narrative = Some(Narrative {
            executive_summary: "Metformin shows moderate promise.".to_string(),
            recommendation: None,
        });
        run.advance(RunState::Completed).unwrap();
        run
    }

    #[test]
    fn test_build_report_from_completed_run() {
        let report = build_report(&completed_run(), true);

        assert_eq!(report.title, "Drug Repurposing Analysis: Alzheimer");
        assert_eq!(report.drug_name.as_deref(), Some("Metformin"));
        assert_eq!(report.metadata.run_state, "completed");
        assert_eq!(report.metadata.tasks_dispatched, 2);
        assert_eq!(report.metadata.timed_out, 1);
        assert_eq!(report.overall_confidence, 7.5);
        assert_eq!(
            report.executive_summary.as_deref(),
            Some("Metformin shows moderate promise.")
        );
        assert_eq!(report.recommendation, None);

        assert_eq!(report.sections.len(), 2);
        let clinical = &report.sections[0];
        assert_eq!(clinical.status, "success");
        assert_eq!(clinical.confidence, Some(7.5));
        assert_eq!(clinical.recommendation.as_deref(), Some("Moderate clinical evidence."));
        assert_eq!(clinical.data["total_trials"], 12);

        let patent = &report.sections[1];
        assert_eq!(patent.status, NOT_AVAILABLE);
        assert_eq!(patent.error.as_deref(), Some("timeout"));
        assert_eq!(patent.confidence, None);

        let risk = report.risk.unwrap();
        assert_eq!(risk.overall, RiskBucket::Moderate);
        assert_eq!(risk.incomplete, vec![WorkerKind::Patent]);
        assert_eq!(report.next_steps.len(), 3);
        assert!(report.next_steps[0].starts_with("Re-run Patent Landscape"));
        assert_eq!(report.data_sources, vec!["ClinicalTrials.gov"]);
    }

    #[test]
    fn test_payloads_omitted_when_disabled() {
        let report = build_report(&completed_run(), false);
        assert!(report.sections.iter().all(|s| s.data.is_null()));
        assert!(report.sections[0].recommendation.is_some());
    }

    #[test]
    fn test_failed_run_report_carries_error() {
        let mut run = QueryRun::new("what now?");
        run.advance(RunState::Decomposing).unwrap();
        run.error = Some("no actionable parameters could be extracted from the query".to_string());
        run.advance(RunState::Failed).unwrap();

        let report = build_report(&run, true);
        assert_eq!(report.title, "Drug Repurposing Analysis");
        assert_eq!(report.metadata.run_state, "failed");
        assert!(report.sections.is_empty());
        assert!(report.risk.is_none());
        assert!(report.next_steps.is_empty());
        assert!(report.error.is_some());
    }

    #[test]
    fn test_next_steps_default() {
        assert_eq!(
            next_steps(&[]),
            vec![
                "Conduct detailed review of clinical trial results",
                "Engage patent attorney for freedom-to-operate analysis",
                "Develop detailed market entry strategy",
            ]
        );
    }
}
