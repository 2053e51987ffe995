//! Paint-dot classification.
//!
//! A capture is segmented by color (yellow or red paint), cleaned with a
//! close/open pass, and the largest external region is judged by solidity:
//! a clean filled dot (or ring) is nearly convex, a bitten, doubled or
//! smeared dot is not.

mod backend;
mod dot;
mod result;
pub mod segment;
pub mod shape;

pub use backend::MarkerClassifier;
pub use dot::DotClassifier;
pub use result::{AnalysisResult, ClassificationRule, DotAnalysis, DotVerdict, ShapeFeatures};
pub use segment::{ColorThresholds, HsvRange};
