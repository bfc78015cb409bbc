//! Outcome aggregation and risk bucketing.
//!
//! `aggregate` is a pure function of its input: the same outcomes in the
//! same order always produce an identical [`AggregatedResult`].

use crate::models::{
    AggregatedResult, OutcomeStatus, RiskAssessment, RiskBucket, WorkerKind, WorkerOutcome,
};
use crate::workers::round2;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Merge worker outcomes into a single confidence-weighted result.
pub fn aggregate(outcomes: &[WorkerOutcome]) -> AggregatedResult {
    let usable: Vec<&WorkerOutcome> = outcomes.iter().filter(|o| o.is_usable()).collect();

    let mut by_worker = BTreeMap::new();
    for outcome in outcomes {
        by_worker
            .entry(outcome.worker)
            .or_insert_with(|| outcome.clone());
    }

    AggregatedResult {
        by_worker,
        overall_confidence: overall_confidence(&usable),
        total: outcomes.len(),
        succeeded: usable.len(),
        failed: outcomes.len() - usable.len(),
        timed_out: outcomes.iter().filter(|o| o.is_timeout()).count(),
        partial: usable
            .iter()
            .filter(|o| o.status == OutcomeStatus::Partial)
            .count(),
        findings: merge_findings(&usable),
        risk: assess_risk(outcomes),
        data_sources: data_sources(&usable),
        total_elapsed_ms: outcomes.iter().map(|o| o.elapsed_ms).sum(),
    }
}

/// Mean confidence on the 0-10 scale; zero when nothing succeeded.
fn overall_confidence(usable: &[&WorkerOutcome]) -> f64 {
    if usable.is_empty() {
        return 0.0;
    }
    let sum: f64 = usable.iter().map(|o| o.confidence_score()).sum();
    round2(sum / usable.len() as f64)
}

fn merge_findings(usable: &[&WorkerOutcome]) -> Vec<String> {
    usable
        .iter()
        .flat_map(|o| o.findings.iter().map(move |f| format!("{}: {}", o.worker, f)))
        .collect()
}

fn data_sources(usable: &[&WorkerOutcome]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for source in usable.iter().flat_map(|o| o.sources.iter()) {
        if !sources.contains(source) {
            sources.push(source.clone());
        }
    }
    sources
}

/// Bucket each worker's headline score and take the most severe bucket.
///
/// A worker with a usable outcome but no score contributes nothing. A
/// worker whose outcomes all failed is reported as incomplete.
pub fn assess_risk(outcomes: &[WorkerOutcome]) -> RiskAssessment {
    let mut per_worker: BTreeMap<WorkerKind, RiskBucket> = BTreeMap::new();

    for outcome in outcomes.iter().filter(|o| o.is_usable()) {
        if let Some(score) = outcome.score {
            let bucket = RiskBucket::from_risk_value(score.risk_value());
            per_worker
                .entry(outcome.worker)
                .and_modify(|b| *b = (*b).max(bucket))
                .or_insert(bucket);
        }
    }

    let usable_workers: Vec<WorkerKind> = outcomes
        .iter()
        .filter(|o| o.is_usable())
        .map(|o| o.worker)
        .collect();

    let mut incomplete = Vec::new();
    for outcome in outcomes.iter().filter(|o| !o.is_usable()) {
        if usable_workers.contains(&outcome.worker) {
            continue;
        }
        if let Entry::Vacant(slot) = per_worker.entry(outcome.worker) {
            slot.insert(RiskBucket::Incomplete);
            incomplete.push(outcome.worker);
        }
    }
    incomplete.sort();

    let overall = per_worker
        .values()
        .copied()
        .filter(RiskBucket::is_assessed)
        .max()
        .unwrap_or(RiskBucket::Incomplete);

    RiskAssessment {
        per_worker,
        incomplete,
        overall,
    }
}

/// Generate a text summary of a run's aggregate.
pub fn summary_text(result: &AggregatedResult) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "Tasks: {} ({} succeeded, {} failed, {} timed out)",
        result.total, result.succeeded, result.failed, result.timed_out
    ));
    lines.push(format!(
        "Overall confidence: {:.1}/10",
        result.overall_confidence
    ));
    lines.push(format!(
        "Overall risk: {} {}",
        result.risk.overall.emoji(),
        result.risk.overall
    ));

    if !result.risk.per_worker.is_empty() {
        lines.push(String::new());
        lines.push("By Worker:".to_string());
        for (worker, bucket) in &result.risk.per_worker {
            lines.push(format!("- {} {}: {}", bucket.emoji(), worker.title(), bucket));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DomainScore, TIMEOUT_ERROR};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn create_outcome(
        worker: WorkerKind,
        status: OutcomeStatus,
        confidence: f64,
        score: Option<DomainScore>,
    ) -> WorkerOutcome {
        let id = format!("{}-{}", worker, confidence);
        WorkerOutcome {
            worker,
            task_id: id.clone(),
            status,
            data: json!({ "task": id }),
            error: match status {
                OutcomeStatus::Success => None,
                OutcomeStatus::Partial => Some("incomplete upstream data".to_string()),
                OutcomeStatus::Failed => Some("connection refused".to_string()),
            },
            elapsed_ms: 100,
            confidence,
            score,
            findings: vec![format!("{} finding", worker)],
            sources: vec![format!("{} db", worker), "Shared db".to_string()],
            completed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn success(worker: WorkerKind, confidence: f64, score: Option<DomainScore>) -> WorkerOutcome {
        create_outcome(worker, OutcomeStatus::Success, confidence, score)
    }

    fn failed(worker: WorkerKind) -> WorkerOutcome {
        create_outcome(worker, OutcomeStatus::Failed, 0.0, None)
    }

    #[test]
    fn test_empty_input() {
        let result = aggregate(&[]);
        assert_eq!(result.overall_confidence, 0.0);
        assert_eq!(result.total, 0);
        assert_eq!(result.risk.overall, RiskBucket::Incomplete);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_all_failed_yields_zero_and_incomplete() {
        let mut timed_out = failed(WorkerKind::Patent);
        timed_out.error = Some(TIMEOUT_ERROR.to_string());
        let outcomes = vec![failed(WorkerKind::Clinical), timed_out];

        let result = aggregate(&outcomes);
        assert_eq!(result.overall_confidence, 0.0);
        assert_eq!(result.failed, 2);
        assert_eq!(result.timed_out, 1);
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.risk.overall, RiskBucket::Incomplete);
        assert_eq!(
            result.risk.incomplete,
            vec![WorkerKind::Clinical, WorkerKind::Patent]
        );
        assert!(result.data_sources.is_empty());
    }

    #[test]
    fn test_risk_ceiling() {
        let outcomes = vec![
            success(WorkerKind::Patent, 0.8, Some(DomainScore::risk(8.0))),
            success(WorkerKind::Clinical, 0.5, Some(DomainScore::risk(2.0))),
            success(WorkerKind::Market, 0.75, Some(DomainScore::opportunity(9.0))),
        ];

        let risk = aggregate(&outcomes).risk;
        assert_eq!(risk.per_worker[&WorkerKind::Patent], RiskBucket::High);
        assert_eq!(risk.per_worker[&WorkerKind::Clinical], RiskBucket::Low);
        assert_eq!(risk.per_worker[&WorkerKind::Market], RiskBucket::Low);
        assert_eq!(risk.overall, RiskBucket::High);
        assert!(risk.incomplete.is_empty());
    }

    #[test]
    fn test_failed_worker_reported_incomplete_not_low() {
        let outcomes = vec![
            success(WorkerKind::Clinical, 0.5, Some(DomainScore::opportunity(5.0))),
            failed(WorkerKind::Patent),
        ];

        let risk = aggregate(&outcomes).risk;
        assert_eq!(risk.per_worker[&WorkerKind::Patent], RiskBucket::Incomplete);
        assert_eq!(risk.incomplete, vec![WorkerKind::Patent]);
        assert_eq!(risk.overall, RiskBucket::Moderate);
    }

    #[test]
    fn test_partial_counts_as_succeeded() {
        let outcomes = vec![
            create_outcome(WorkerKind::Literature, OutcomeStatus::Partial, 0.8, None),
            success(WorkerKind::Market, 0.6, None),
        ];

        let result = aggregate(&outcomes);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.partial, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.overall_confidence, 7.0);
    }

    #[test]
    fn test_findings_prefixed_in_input_order() {
        let outcomes = vec![
            success(WorkerKind::Market, 0.5, None),
            failed(WorkerKind::Patent),
            success(WorkerKind::Clinical, 0.5, None),
        ];

        let result = aggregate(&outcomes);
        assert_eq!(
            result.findings,
            vec!["market: market finding", "clinical: clinical finding"]
        );
        assert_eq!(
            result.data_sources,
            vec!["market db", "Shared db", "clinical db"]
        );
        assert_eq!(result.total_elapsed_ms, 300);
    }

    #[test]
    fn test_by_worker_keeps_first_outcome() {
        let first = success(WorkerKind::Clinical, 0.5, None);
        let second = success(WorkerKind::Clinical, 0.75, None);

        let result = aggregate(&[first.clone(), second]);
        assert_eq!(result.by_worker.len(), 1);
        assert_eq!(result.by_worker[&WorkerKind::Clinical], first);
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let outcomes = vec![
            success(WorkerKind::Clinical, 0.75, Some(DomainScore::opportunity(7.5))),
            failed(WorkerKind::Patent),
            success(WorkerKind::Literature, 0.5, Some(DomainScore::opportunity(3.0))),
        ];
        assert_eq!(aggregate(&outcomes), aggregate(&outcomes));
    }

    #[test]
    fn test_aggregate_after_serde_round_trip() {
        let outcomes = vec![
            success(WorkerKind::Clinical, 0.75, Some(DomainScore::opportunity(7.5))),
            failed(WorkerKind::Patent),
            success(WorkerKind::Market, 0.5, Some(DomainScore::opportunity(6.0))),
        ];
        let json = serde_json::to_string(&outcomes).unwrap();
        let restored: Vec<WorkerOutcome> = serde_json::from_str(&json).unwrap();

        let result = aggregate(&outcomes);
        assert_eq!(aggregate(&restored), result);
        assert_eq!(result.overall_confidence, 6.25);

        let json = serde_json::to_string(&result).unwrap();
        let restored: AggregatedResult = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, result);
    }

    #[test]
    fn test_evidence_confidences_survive_serde() {
        // Clinical confidences are a two-decimal evidence score divided by ten.
        for cents in 0..=1000u32 {
            let confidence = round2(cents as f64 / 100.0) / 10.0;
            let outcomes = vec![
                success(WorkerKind::Clinical, confidence, Some(DomainScore::opportunity(5.0))),
                success(WorkerKind::Market, 0.75, None),
            ];

            let json = serde_json::to_string(&outcomes).unwrap();
            let restored: Vec<WorkerOutcome> = serde_json::from_str(&json).unwrap();
            assert_eq!(restored, outcomes, "confidence {}", confidence);

            let result = aggregate(&outcomes);
            assert_eq!(aggregate(&restored), result, "confidence {}", confidence);

            let json = serde_json::to_string(&result).unwrap();
            let restored: AggregatedResult = serde_json::from_str(&json).unwrap();
            assert_eq!(restored, result, "confidence {}", confidence);
        }
    }

    #[test]
    fn test_summary_text() {
        let result = aggregate(&[
            success(WorkerKind::Patent, 0.8, Some(DomainScore::risk(8.0))),
            failed(WorkerKind::Market),
        ]);
        let text = summary_text(&result);
        assert!(text.contains("Tasks: 2 (1 succeeded, 1 failed, 0 timed out)"));
        assert!(text.contains("Overall risk: 🔴 high"));
        assert!(text.contains("Market Intelligence: incomplete"));
    }
}
