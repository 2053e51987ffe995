use anyhow::{Context, Result};
use image::{GrayImage, RgbImage};

use crate::classify::backend::MarkerClassifier;
use crate::classify::result::{AnalysisResult, ClassificationRule, DotAnalysis};
use crate::classify::segment::{clean_mask, marker_mask, ColorThresholds};
use crate::classify::shape::largest_region;
use crate::config::ClassifierSettings;
use crate::schedule::Verdict;

/// Color-segmentation + solidity classifier for yellow/red paint dots.
#[derive(Clone, Debug)]
pub struct DotClassifier {
    colors: ColorThresholds,
    rule: ClassificationRule,
    kernel_radius: u8,
}

impl DotClassifier {
    pub fn new(settings: &ClassifierSettings) -> Self {
        Self {
            colors: settings.colors.clone(),
            rule: ClassificationRule {
                min_area: settings.min_area,
                solidity_threshold: settings.solidity_threshold,
            },
            kernel_radius: settings.kernel_radius,
        }
    }

    pub fn rule(&self) -> ClassificationRule {
        self.rule
    }

    /// Decode a JPEG (or any supported format) and analyze it.
    pub fn analyze(&self, payload: &[u8]) -> Result<DotAnalysis> {
        let image = image::load_from_memory(payload)
            .context("decode capture")?
            .into_rgb8();
        Ok(self.analyze_image(&image))
    }

    pub fn analyze_image(&self, image: &RgbImage) -> DotAnalysis {
        let mask = marker_mask(image, &self.colors);
        self.analyze_mask(&mask)
    }

    /// Judge an already segmented mask (non-zero = paint).
    pub fn analyze_mask(&self, mask: &GrayImage) -> DotAnalysis {
        let cleaned = clean_mask(mask, self.kernel_radius);
        self.rule.judge(largest_region(&cleaned), mask.dimensions())
    }
}

impl Default for DotClassifier {
    fn default() -> Self {
        Self::new(&ClassifierSettings::default())
    }
}

impl MarkerClassifier for DotClassifier {
    fn name(&self) -> &'static str {
        "hsv-solidity"
    }

    fn classify(&self, payload: &[u8], expected: Verdict) -> AnalysisResult {
        match self.analyze(payload) {
            Ok(analysis) => analysis.score(expected),
            Err(e) => {
                log::warn!("capture could not be decoded: {:#}", e);
                AnalysisResult::decode_failure(expected, format!("{:#}", e))
            }
        }
    }
}
