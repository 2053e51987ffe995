use serde::Serialize;

use crate::schedule::Verdict;

const DEFAULT_MIN_AREA: f64 = 50.0;
const DEFAULT_SOLIDITY_THRESHOLD: f64 = 0.92;

/// Outcome of judging one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DotVerdict {
    Accept,
    Reject,
    /// No colored region large enough to be a dot.
    NoDot,
}

impl DotVerdict {
    pub fn as_verdict(self) -> Option<Verdict> {
        match self {
            DotVerdict::Accept => Some(Verdict::Accept),
            DotVerdict::Reject => Some(Verdict::Reject),
            DotVerdict::NoDot => None,
        }
    }
}

impl std::fmt::Display for DotVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DotVerdict::Accept => write!(f, "ACCEPT"),
            DotVerdict::Reject => write!(f, "REJECT"),
            DotVerdict::NoDot => write!(f, "NO_DOT"),
        }
    }
}

/// Geometry of the candidate dot region, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ShapeFeatures {
    pub area: f64,
    pub perimeter: f64,
    /// Bounding box (width, height).
    pub bounding_size: (u32, u32),
    pub hull_area: f64,
    /// area / hull_area; 0 for a degenerate hull.
    pub solidity: f64,
    /// 4π·area/perimeter². Reported only; not part of the verdict.
    pub circularity: f64,
}

impl ShapeFeatures {
    pub fn new(area: f64, perimeter: f64, bounding_size: (u32, u32), hull_area: f64) -> Self {
        let circularity = if perimeter > 0.0 {
            4.0 * std::f64::consts::PI * area / (perimeter * perimeter)
        } else {
            0.0
        };
        Self {
            area,
            perimeter,
            bounding_size,
            hull_area,
            solidity: solidity(area, hull_area),
            circularity,
        }
    }
}

/// Ratio of region area to convex hull area, clamped to [0, 1].
pub fn solidity(area: f64, hull_area: f64) -> f64 {
    if hull_area > 0.0 {
        (area / hull_area).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// The decision boundary: minimum region size and the solidity cut.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ClassificationRule {
    pub min_area: f64,
    pub solidity_threshold: f64,
}

impl Default for ClassificationRule {
    fn default() -> Self {
        Self {
            min_area: DEFAULT_MIN_AREA,
            solidity_threshold: DEFAULT_SOLIDITY_THRESHOLD,
        }
    }
}

impl ClassificationRule {
    /// Judge the largest region of an image (`None` when there was no region).
    pub fn judge(&self, largest: Option<ShapeFeatures>, image_size: (u32, u32)) -> DotAnalysis {
        let features = largest.filter(|f| f.area >= self.min_area);
        let verdict = match &features {
            None => DotVerdict::NoDot,
            Some(f) if f.solidity >= self.solidity_threshold => DotVerdict::Accept,
            Some(_) => DotVerdict::Reject,
        };
        DotAnalysis {
            image_size,
            features,
            verdict,
        }
    }
}

/// Classification of one image without an expectation attached.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DotAnalysis {
    pub image_size: (u32, u32),
    pub features: Option<ShapeFeatures>,
    pub verdict: DotVerdict,
}

impl DotAnalysis {
    pub fn dot_found(&self) -> bool {
        self.features.is_some()
    }

    /// Compare against the expected verdict. A missing dot counts as a
    /// correct rejection.
    pub fn score(self, expected: Verdict) -> AnalysisResult {
        let correct = match self.verdict {
            DotVerdict::NoDot => expected == Verdict::Reject,
            verdict => verdict.as_verdict() == Some(expected),
        };
        AnalysisResult {
            dot_found: self.features.is_some(),
            features: self.features,
            verdict: self.verdict,
            expected,
            correct,
            image_size: Some(self.image_size),
            decode_error: None,
        }
    }
}

/// Per-trigger classification, scored against the trigger's expectation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub dot_found: bool,
    pub features: Option<ShapeFeatures>,
    pub verdict: DotVerdict,
    pub expected: Verdict,
    pub correct: bool,
    pub image_size: Option<(u32, u32)>,
    /// Set when the payload was not a decodable image.
    pub decode_error: Option<String>,
}

impl AnalysisResult {
    pub fn decode_failure(expected: Verdict, error: impl Into<String>) -> Self {
        Self {
            dot_found: false,
            features: None,
            verdict: DotVerdict::NoDot,
            expected,
            correct: false,
            image_size: None,
            decode_error: Some(error.into()),
        }
    }

    /// Verdict as shown to operators; a missing dot reads as a rejection.
    pub fn verdict_label(&self) -> String {
        match self.verdict {
            DotVerdict::NoDot if self.decode_error.is_none() => "REJECT (no dot)".to_string(),
            verdict => verdict.to_string(),
        }
    }

    pub fn solidity(&self) -> Option<f64> {
        self.features.map(|f| f.solidity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features_with_solidity(solidity: f64) -> ShapeFeatures {
        ShapeFeatures {
            area: 400.0,
            perimeter: 72.0,
            bounding_size: (23, 23),
            hull_area: 400.0 / solidity,
            solidity,
            circularity: 0.97,
        }
    }

    #[test]
    fn threshold_is_a_closed_lower_bound() {
        let rule = ClassificationRule::default();
        let at = rule.judge(Some(features_with_solidity(0.92)), (64, 64));
        assert_eq!(at.verdict, DotVerdict::Accept);
        let below = rule.judge(Some(features_with_solidity(0.919_999_9)), (64, 64));
        assert_eq!(below.verdict, DotVerdict::Reject);
    }

    #[test]
    fn small_regions_are_not_dots() {
        let rule = ClassificationRule::default();
        let mut tiny = features_with_solidity(1.0);
        tiny.area = 49.0;
        let analysis = rule.judge(Some(tiny), (64, 64));
        assert_eq!(analysis.verdict, DotVerdict::NoDot);
        assert!(!analysis.dot_found());
    }

    #[test]
    fn region_at_min_area_is_a_dot() {
        let rule = ClassificationRule::default();
        let mut edge = features_with_solidity(1.0);
        edge.area = 50.0;
        let analysis = rule.judge(Some(edge), (64, 64));
        assert!(analysis.dot_found());
        assert_eq!(analysis.verdict, DotVerdict::Accept);
    }

    #[test]
    fn missing_dot_scores_as_correct_rejection() {
        let rule = ClassificationRule::default();
        let result = rule.judge(None, (64, 64)).score(Verdict::Reject);
        assert!(result.correct);
        assert!(!result.dot_found);
        assert_eq!(result.verdict, DotVerdict::NoDot);
        assert_eq!(result.verdict_label(), "REJECT (no dot)");

        let result = rule.judge(None, (64, 64)).score(Verdict::Accept);
        assert!(!result.correct);
    }

    #[test]
    fn degenerate_hull_has_zero_solidity() {
        assert_eq!(solidity(0.0, 0.0), 0.0);
        let features = ShapeFeatures::new(60.0, 0.0, (1, 1), 0.0);
        assert_eq!(features.solidity, 0.0);
        assert_eq!(features.circularity, 0.0);
        let analysis = ClassificationRule::default().judge(Some(features), (8, 8));
        assert_eq!(analysis.verdict, DotVerdict::Reject);
    }

    #[test]
    fn decode_failure_is_never_correct() {
        let result = AnalysisResult::decode_failure(Verdict::Reject, "not a jpeg");
        assert!(!result.correct);
        assert_eq!(result.verdict, DotVerdict::NoDot);
        assert_eq!(result.verdict_label(), "NO_DOT");
    }
}
