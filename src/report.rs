//! Session results.
//!
//! Every trigger produces exactly one `TriggerOutcome`. Classified and
//! capture-failed outcomes are scored; skipped ones (no camera, stop
//! requested) are recorded but excluded from the accuracy figure.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::classify::AnalysisResult;
use crate::schedule::TriggerRecord;
use crate::storage::StoredArtifact;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeKind {
    Classified {
        result: AnalysisResult,
        artifact: Option<StoredArtifact>,
    },
    CaptureFailed {
        reason: String,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TriggerOutcome {
    pub trigger: TriggerRecord,
    /// Offset from session start at which the capture was actually issued.
    pub actual_offset_sec: f64,
    #[serde(flatten)]
    pub kind: OutcomeKind,
}

impl TriggerOutcome {
    pub fn lateness_sec(&self) -> f64 {
        self.actual_offset_sec - self.trigger.target_time_sec
    }

    pub fn is_scored(&self) -> bool {
        !matches!(self.kind, OutcomeKind::Skipped { .. })
    }

    pub fn is_correct(&self) -> bool {
        matches!(&self.kind, OutcomeKind::Classified { result, .. } if result.correct)
    }

    fn status_label(&self) -> String {
        match &self.kind {
            OutcomeKind::Classified { result, .. } => result.verdict_label(),
            OutcomeKind::CaptureFailed { .. } => "CAPTURE FAILED".to_string(),
            OutcomeKind::Skipped { .. } => "SKIPPED".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SessionSummary {
    pub total: usize,
    pub correct: usize,
    /// Percent; 0 when nothing was scored.
    pub accuracy: f64,
}

impl SessionSummary {
    pub fn new(total: usize, correct: usize) -> Self {
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64 * 100.0
        };
        Self {
            total,
            correct,
            accuracy,
        }
    }
}

/// Append-only log of a session's outcomes.
#[derive(Clone, Debug, Default)]
pub struct SessionLog {
    outcomes: Vec<TriggerOutcome>,
    scored: usize,
    correct: usize,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: TriggerOutcome) {
        if outcome.is_scored() {
            self.scored += 1;
        }
        if outcome.is_correct() {
            self.correct += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[TriggerOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::new(self.scored, self.correct)
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.scored
    }

    /// Per-trigger table followed by the accuracy line.
    pub fn log_summary(&self) {
        log::info!(
            "{:<8} {:<10} {:<8} {:<16} {:>9} {:>8}",
            "entity",
            "label",
            "expected",
            "result",
            "solidity",
            "late_ms"
        );
        for outcome in &self.outcomes {
            let solidity = match &outcome.kind {
                OutcomeKind::Classified { result, .. } => result
                    .solidity()
                    .map(|s| format!("{:.3}", s))
                    .unwrap_or_else(|| "-".to_string()),
                _ => "-".to_string(),
            };
            let mark = if outcome.is_correct() { "ok" } else { "" };
            log::info!(
                "{:<8} {:<10} {:<8} {:<16} {:>9} {:>8.1} {}",
                outcome.trigger.entity_id,
                outcome.trigger.label,
                outcome.trigger.expected,
                outcome.status_label(),
                solidity,
                outcome.lateness_sec() * 1000.0,
                mark
            );
        }
        let summary = self.summary();
        log::info!(
            "accuracy: {}/{} correct ({:.1}%), {} skipped",
            summary.correct,
            summary.total,
            summary.accuracy,
            self.skipped()
        );
    }
}

/// Serialized form of a finished session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub device: String,
    pub classifier: String,
    pub summary: SessionSummary,
    pub skipped: usize,
    pub outcomes: Vec<TriggerOutcome>,
}

impl SessionReport {
    pub fn new(log: &SessionLog, device: impl Into<String>, classifier: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            classifier: classifier.into(),
            summary: log.summary(),
            skipped: log.skipped(),
            outcomes: log.outcomes().to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize session report")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("write session report {}", path.display()))?;
        log::info!("session report written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassificationRule;
    use crate::schedule::Verdict;

    fn trigger(entity_id: u64, expected: Verdict) -> TriggerRecord {
        TriggerRecord {
            sequence_index: entity_id * 10,
            target_time_sec: entity_id as f64,
            entity_id,
            label: "circle".to_string(),
            expected,
        }
    }

    fn classified(entity_id: u64, expected: Verdict, correct: bool) -> TriggerOutcome {
        let mut result = ClassificationRule::default()
            .judge(None, (32, 32))
            .score(expected);
        result.correct = correct;
        TriggerOutcome {
            trigger: trigger(entity_id, expected),
            actual_offset_sec: entity_id as f64 + 0.002,
            kind: OutcomeKind::Classified {
                result,
                artifact: None,
            },
        }
    }

    #[test]
    fn empty_session_has_zero_accuracy() {
        let summary = SessionLog::new().summary();
        assert_eq!(summary, SessionSummary::new(0, 0));
        assert_eq!(summary.accuracy, 0.0);
    }

    #[test]
    fn failures_count_skips_do_not() {
        let mut log = SessionLog::new();
        log.push(classified(0, Verdict::Reject, true));
        log.push(classified(1, Verdict::Accept, false));
        log.push(TriggerOutcome {
            trigger: trigger(2, Verdict::Accept),
            actual_offset_sec: 2.0,
            kind: OutcomeKind::CaptureFailed {
                reason: "timeout".to_string(),
            },
        });
        log.push(TriggerOutcome {
            trigger: trigger(3, Verdict::Accept),
            actual_offset_sec: 3.0,
            kind: OutcomeKind::Skipped {
                reason: "camera unavailable".to_string(),
            },
        });
        let summary = log.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.correct, 1);
        assert!((summary.accuracy - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(log.skipped(), 1);
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn report_serializes_outcome_kinds() {
        let mut log = SessionLog::new();
        log.push(classified(0, Verdict::Reject, true));
        log.push(TriggerOutcome {
            trigger: trigger(1, Verdict::Accept),
            actual_offset_sec: 1.01,
            kind: OutcomeKind::CaptureFailed {
                reason: "timeout".to_string(),
            },
        });
        let report = SessionReport::new(&log, "tcp://127.0.0.1:9000", "hsv-solidity");
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["summary"]["total"], 2);
        assert_eq!(value["outcomes"][0]["kind"], "classified");
        assert_eq!(value["outcomes"][0]["result"]["verdict"], "NO_DOT");
        assert_eq!(value["outcomes"][0]["trigger"]["expected"], "REJECT");
        assert_eq!(value["outcomes"][1]["kind"], "capture_failed");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        report.write_to(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("hsv-solidity"));
    }

    #[test]
    fn lateness_is_actual_minus_target() {
        let outcome = classified(2, Verdict::Accept, true);
        assert!((outcome.lateness_sec() - 0.002).abs() < 1e-9);
    }
}
