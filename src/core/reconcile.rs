// MedScan - core/reconcile.rs
//
// Maps the remote service's single ambiguous response into a strict
// `ScanOutcome`:
//
//   error set, score absent   -> Fatal (info carries only the error)
//   anything else             -> SuccessOrWarning (every field defaulted;
//                                a co-present error becomes a warning)
//
// Scan IDs and timestamps are always generated here, never echoed from the
// response.

use crate::core::model::{
    FeatureComparison, FeatureComparisons, NormalizedForensicResult, NormalizedMedicineInfo,
    RawComparison, RawFeatureComparison, ReconciledScan, ScanOutcome, UnifiedAnalysisResult,
    Verdict,
};
use crate::util::constants;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Classify and normalise `raw`, stamping it with a fresh scan ID and `now`.
pub fn reconcile(raw: UnifiedAnalysisResult, now: DateTime<Utc>) -> ReconciledScan {
    let scan_id = Uuid::new_v4();
    let error = raw.error.as_deref().map(str::trim).filter(|e| !e.is_empty());

    let outcome = match (error, raw.score) {
        (Some(error), None) => {
            tracing::warn!(%scan_id, error, "Analysis failed: no usable result data");
            ScanOutcome::Fatal {
                info: NormalizedMedicineInfo {
                    error: Some(error.to_string()),
                    ..Default::default()
                },
            }
        }
        (warning, _) => {
            let warning = warning.map(str::to_string);
            if let Some(ref w) = warning {
                tracing::info!(%scan_id, warning = %w, "Analysis returned data with a warning");
            }
            ScanOutcome::SuccessOrWarning {
                info: medicine_info(&raw),
                forensic: forensic_result(&raw),
                warning,
            }
        }
    };

    ReconciledScan {
        scan_id,
        timestamp: now,
        outcome,
    }
}

fn medicine_info(raw: &UnifiedAnalysisResult) -> NormalizedMedicineInfo {
    NormalizedMedicineInfo {
        uses: non_blank(&raw.uses),
        mechanism: non_blank(&raw.mechanism),
        indications: non_blank(&raw.indications),
        disclaimer: non_blank(&raw.disclaimer),
        error: None,
    }
}

fn forensic_result(raw: &UnifiedAnalysisResult) -> NormalizedForensicResult {
    let verdict = match raw.verdict.as_deref() {
        Some(label) => Verdict::from_label(label).unwrap_or_else(|| {
            tracing::debug!(verdict = label, "Unrecognised verdict label");
            Verdict::Inconclusive
        }),
        None => Verdict::Inconclusive,
    };

    let comparison = raw.comparison.clone().unwrap_or_default();

    NormalizedForensicResult {
        score: clamp_score(raw.score),
        verdict,
        imprint: non_blank(&raw.imprint).unwrap_or_else(|| constants::FALLBACK_IMPRINT.to_string()),
        sources: raw.sources.clone().unwrap_or_default(),
        comparison: comparisons(comparison),
        detailed: raw.detailed.clone().unwrap_or_default(),
    }
}

fn comparisons(raw: RawComparison) -> FeatureComparisons {
    FeatureComparisons {
        color: feature(raw.color),
        shape: feature(raw.shape),
        imprint: feature(raw.imprint),
        packaging: feature(raw.packaging),
    }
}

fn feature(raw: Option<RawFeatureComparison>) -> FeatureComparison {
    let raw = raw.unwrap_or_default();
    FeatureComparison {
        matched: raw.matched.unwrap_or(false),
        status: non_blank(&raw.status)
            .unwrap_or_else(|| constants::FALLBACK_COMPARISON_STATUS.to_string()),
        reason: non_blank(&raw.reason)
            .unwrap_or_else(|| constants::FALLBACK_COMPARISON_REASON.to_string()),
    }
}

/// Absent -> 0; otherwise rounded and clamped to 0..=MAX_SCORE.
fn clamp_score(score: Option<f64>) -> u32 {
    match score {
        Some(s) if s.is_finite() => s.round().clamp(0.0, f64::from(constants::MAX_SCORE)) as u32,
        _ => 0,
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::RawComparison;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_error_without_score_is_fatal() {
        let raw = UnifiedAnalysisResult {
            error: Some("x".to_string()),
            uses: Some("ignored".to_string()),
            ..Default::default()
        };

        let scan = reconcile(raw, now());
        match scan.outcome {
            ScanOutcome::Fatal { info } => {
                assert_eq!(info.error.as_deref(), Some("x"));
                assert!(info.uses.is_none(), "fatal info carries only the error");
            }
            other => panic!("expected Fatal, got {other:?}"),
        }
    }

    #[test]
    fn test_error_with_score_is_soft_warning() {
        let raw = UnifiedAnalysisResult {
            error: Some("x".to_string()),
            score: Some(70.0),
            verdict: Some("Inconclusive".to_string()),
            uses: Some("Fever".to_string()),
            ..Default::default()
        };

        match reconcile(raw, now()).outcome {
            ScanOutcome::SuccessOrWarning {
                info,
                forensic,
                warning,
            } => {
                assert_eq!(forensic.score, 70);
                assert_eq!(forensic.verdict, Verdict::Inconclusive);
                assert_eq!(warning.as_deref(), Some("x"));
                assert_eq!(info.uses.as_deref(), Some("Fever"));
                assert!(info.error.is_none());
            }
            other => panic!("expected SuccessOrWarning, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_response_defaults_every_field() {
        match reconcile(UnifiedAnalysisResult::default(), now()).outcome {
            ScanOutcome::SuccessOrWarning {
                forensic, warning, ..
            } => {
                assert!(warning.is_none());
                assert_eq!(forensic.score, 0);
                assert_eq!(forensic.verdict, Verdict::Inconclusive);
                assert_eq!(forensic.imprint, "Not detected");
                assert!(forensic.sources.is_empty());
                assert!(forensic.detailed.is_empty());
                let missing = FeatureComparison {
                    matched: false,
                    status: "omission".to_string(),
                    reason: "AI response missing data.".to_string(),
                };
                assert_eq!(forensic.comparison.color, missing);
                assert_eq!(forensic.comparison.shape, missing);
                assert_eq!(forensic.comparison.imprint, missing);
                assert_eq!(forensic.comparison.packaging, missing);
            }
            other => panic!("expected SuccessOrWarning, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_comparison_keeps_supplied_fields() {
        let raw = UnifiedAnalysisResult {
            score: Some(91.0),
            verdict: Some("authentic".to_string()),
            imprint: Some("IBU 200".to_string()),
            comparison: Some(RawComparison {
                shape: Some(RawFeatureComparison {
                    matched: Some(true),
                    status: Some("match".to_string()),
                    reason: None,
                }),
                ..Default::default()
            }),
            sources: Some(vec!["https://example.org/label".to_string()]),
            ..Default::default()
        };

        let ScanOutcome::SuccessOrWarning { forensic, .. } = reconcile(raw, now()).outcome else {
            panic!("expected SuccessOrWarning");
        };
        assert_eq!(forensic.verdict, Verdict::Authentic);
        assert_eq!(forensic.imprint, "IBU 200");
        assert!(forensic.comparison.shape.matched);
        assert_eq!(forensic.comparison.shape.status, "match");
        assert_eq!(forensic.comparison.shape.reason, "AI response missing data.");
        assert_eq!(forensic.comparison.color.status, "omission");
        assert_eq!(forensic.sources.len(), 1);
    }

    #[test]
    fn test_score_is_clamped_and_unknown_verdict_is_inconclusive() {
        let raw = UnifiedAnalysisResult {
            score: Some(140.4),
            verdict: Some("Probably fine".to_string()),
            ..Default::default()
        };
        let ScanOutcome::SuccessOrWarning { forensic, .. } = reconcile(raw, now()).outcome else {
            panic!("expected SuccessOrWarning");
        };
        assert_eq!(forensic.score, 100);
        assert_eq!(forensic.verdict, Verdict::Inconclusive);

        assert_eq!(clamp_score(Some(-3.0)), 0);
        assert_eq!(clamp_score(Some(69.6)), 70);
    }

    #[test]
    fn test_blank_error_is_not_an_error() {
        let raw = UnifiedAnalysisResult {
            error: Some("   ".to_string()),
            ..Default::default()
        };
        let outcome = reconcile(raw, now()).outcome;
        assert!(matches!(
            outcome,
            ScanOutcome::SuccessOrWarning { warning: None, .. }
        ));
    }

    #[test]
    fn test_each_reconciliation_gets_fresh_identity() {
        let a = reconcile(UnifiedAnalysisResult::default(), now());
        let b = reconcile(UnifiedAnalysisResult::default(), now());
        assert_ne!(a.scan_id, b.scan_id);
        assert_eq!(a.timestamp, now());
    }
}
