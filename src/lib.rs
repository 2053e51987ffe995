//! dot-sync: synchronized capture rig for paint-dot inspection
//!
//! This crate drives an ESP32-CAM over a serial (or TCP-bridged) byte link,
//! fires still captures at externally computed trigger times, and judges the
//! painted marker in each image by the solidity of its largest colored region.
//!
//! # Pipeline
//!
//! Trigger schedule → capture scheduler → capture client → frame codec →
//! JPEG bytes → dot classifier → verdict → session log.
//!
//! # Module Structure
//!
//! - `transport`: length-delimited frame codec and byte links (serial, TCP)
//! - `capture`: request/response capture client (`C` / `S` commands)
//! - `schedule`: trigger list loading and per-entity deduplication
//! - `scheduler`: wall-clock synchronized capture loop
//! - `classify`: HSV segmentation, contour geometry, accept/reject rule
//! - `report`: append-only session log and accuracy summary
//! - `storage`: persisted capture artifacts
//! - `config`: explicit rig configuration (file + env layering)
//! - `sim`: loopback camera for bench runs without hardware

pub mod capture;
pub mod classify;
pub mod config;
pub mod report;
pub mod schedule;
pub mod scheduler;
pub mod sim;
pub mod storage;
pub mod transport;

pub use capture::{Camera, CaptureClient, CaptureError, CaptureStats};
pub use classify::{
    AnalysisResult, ClassificationRule, DotAnalysis, DotClassifier, DotVerdict, MarkerClassifier,
    ShapeFeatures,
};
pub use config::{CaptureSettings, ClassifierSettings, RigConfig};
pub use report::{OutcomeKind, SessionLog, SessionReport, SessionSummary, TriggerOutcome};
pub use schedule::{TriggerRecord, TriggerSchedule, Verdict};
pub use scheduler::{CaptureScheduler, SchedulerOptions, SessionState};
pub use storage::{
    ArtifactStore, DiscardArtifactStore, FilesystemArtifactStore, InMemoryArtifactStore,
    StoredArtifact,
};
pub use transport::{ByteLink, Frame, FrameDecoder, TransportError, FRAME_END, FRAME_START};
