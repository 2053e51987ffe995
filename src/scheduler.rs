use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::Camera;
use crate::classify::MarkerClassifier;
use crate::report::{OutcomeKind, SessionLog, TriggerOutcome};
use crate::schedule::{TriggerRecord, TriggerSchedule};
use crate::storage::{trigger_artifact_name, ArtifactStore};

/// Longest single sleep while waiting for a trigger, so a stop request is noticed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running,
    Finished,
}

#[derive(Clone, Debug, Default)]
pub struct SchedulerOptions {
    /// Delay between `run` and the session epoch (gives the video player time to start).
    pub lead_in: Duration,
}

/// Fires one capture per trigger at its offset from the session epoch.
pub struct CaptureScheduler {
    triggers: Vec<TriggerRecord>,
    options: SchedulerOptions,
    state: SessionState,
    stop: Arc<AtomicBool>,
}

impl CaptureScheduler {
    pub fn new(schedule: &TriggerSchedule, options: SchedulerOptions) -> Self {
        Self {
            triggers: schedule.records().to_vec(),
            options,
            state: SessionState::NotStarted,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that, once set, skips every trigger not yet fired.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the whole session. Per-trigger failures are recorded, never returned.
    pub fn run(
        &mut self,
        camera: &mut dyn Camera,
        classifier: &dyn MarkerClassifier,
        artifacts: &mut dyn ArtifactStore,
    ) -> Result<SessionLog> {
        if self.state != SessionState::NotStarted {
            return Err(anyhow!("session already {:?}", self.state));
        }
        if !self.options.lead_in.is_zero() {
            log::info!("starting in {:.1}s", self.options.lead_in.as_secs_f64());
            std::thread::sleep(self.options.lead_in);
        }

        self.state = SessionState::Running;
        let t0 = Instant::now();
        log::info!(
            "session started: {} triggers, classifier {}",
            self.triggers.len(),
            classifier.name()
        );
        if !camera.is_available() {
            log::warn!("camera unavailable; triggers will be timed but not captured");
        }

        let mut session = SessionLog::new();
        for trigger in &self.triggers {
            let stopped = !wait_until(t0, trigger.target_offset(), &self.stop);
            let actual = t0.elapsed().as_secs_f64();
            let kind = if stopped {
                OutcomeKind::Skipped {
                    reason: "session stopped".to_string(),
                }
            } else if !camera.is_available() {
                OutcomeKind::Skipped {
                    reason: "camera unavailable".to_string(),
                }
            } else {
                log::info!(
                    "trigger entity {} ({}) at {:.3}s (target {:.3}s)",
                    trigger.entity_id,
                    trigger.label,
                    actual,
                    trigger.target_time_sec
                );
                fire(trigger, camera, classifier, artifacts)
            };
            session.push(TriggerOutcome {
                trigger: trigger.clone(),
                actual_offset_sec: actual,
                kind,
            });
        }

        self.state = SessionState::Finished;
        let summary = session.summary();
        log::info!(
            "session finished: {}/{} correct ({:.1}%)",
            summary.correct,
            summary.total,
            summary.accuracy
        );
        Ok(session)
    }
}

fn fire(
    trigger: &TriggerRecord,
    camera: &mut dyn Camera,
    classifier: &dyn MarkerClassifier,
    artifacts: &mut dyn ArtifactStore,
) -> OutcomeKind {
    let frame = match camera.capture() {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("entity {}: {}", trigger.entity_id, e);
            return OutcomeKind::CaptureFailed {
                reason: e.to_string(),
            };
        }
    };

    let name = trigger_artifact_name(trigger.entity_id, &trigger.label);
    let artifact = match artifacts.store(&name, &frame.payload) {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            log::warn!("entity {}: could not save capture: {:#}", trigger.entity_id, e);
            None
        }
    };

    let result = classifier.classify(&frame.payload, trigger.expected);
    log::info!(
        "entity {}: {} (expected {}){}",
        trigger.entity_id,
        result.verdict_label(),
        trigger.expected,
        if result.correct { "" } else { " MISMATCH" }
    );
    OutcomeKind::Classified { result, artifact }
}

/// Sleep until `offset` past `t0`. Returns false if `stop` was raised first.
fn wait_until(t0: Instant, offset: Duration, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let elapsed = t0.elapsed();
        if elapsed >= offset {
            return true;
        }
        std::thread::sleep((offset - elapsed).min(WAIT_SLICE));
    }
}
