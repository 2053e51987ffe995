//! Color segmentation of paint pixels.
//!
//! Hue/saturation/value use the 8-bit convention common to vision tooling:
//! H in [0, 180) (degrees halved), S and V in [0, 255].

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use serde::Deserialize;

pub const MASK_ON: u8 = 255;

/// Inclusive HSV box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }
}

pub const YELLOW: HsvRange = HsvRange::new([15, 60, 60], [45, 255, 255]);
/// Red wraps around hue 0, so it takes two boxes.
pub const RED_LOW: HsvRange = HsvRange::new([0, 100, 100], [10, 255, 255]);
pub const RED_HIGH: HsvRange = HsvRange::new([160, 100, 100], [180, 255, 255]);

/// Paint colors that count as marker pixels.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ColorThresholds {
    pub yellow: HsvRange,
    pub red_low: HsvRange,
    pub red_high: HsvRange,
}

impl Default for ColorThresholds {
    fn default() -> Self {
        Self {
            yellow: YELLOW,
            red_low: RED_LOW,
            red_high: RED_HIGH,
        }
    }
}

impl ColorThresholds {
    pub fn ranges(&self) -> [&HsvRange; 3] {
        [&self.yellow, &self.red_low, &self.red_high]
    }

    pub fn matches(&self, hsv: [u8; 3]) -> bool {
        self.ranges().iter().any(|range| range.contains(hsv))
    }
}

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(i32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max == 0 {
        0
    } else {
        ((255 * delta) as f32 / max as f32).round() as i32
    };

    let h = if delta == 0 {
        0.0
    } else {
        let degrees = if max == r {
            60.0 * (g - b) as f32 / delta as f32
        } else if max == g {
            120.0 + 60.0 * (b - r) as f32 / delta as f32
        } else {
            240.0 + 60.0 * (r - g) as f32 / delta as f32
        };
        if degrees < 0.0 {
            degrees + 360.0
        } else {
            degrees
        }
    };
    let h = ((h / 2.0).round() as i32) % 180;

    [h as u8, s.clamp(0, 255) as u8, max as u8]
}

/// Binary mask (0 / 255) of pixels matching any paint color.
pub fn marker_mask(image: &RgbImage, thresholds: &ColorThresholds) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        if thresholds.matches(rgb_to_hsv(pixel.0)) {
            mask.put_pixel(x, y, Luma([MASK_ON]));
        }
    }
    mask
}

/// Close then open with a square structuring element of side `2 * radius + 1`.
///
/// Closing first merges fragmented paint, opening then removes isolated specks.
pub fn clean_mask(mask: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return mask.clone();
    }
    let closed = close(mask, Norm::LInf, radius);
    open(&closed, Norm::LInf, radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn primary_colors_map_to_expected_hues() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([255, 255, 0]), [30, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv([128, 128, 128]), [0, 0, 128]);
    }

    #[test]
    fn paint_colors_pass_and_rubber_does_not() {
        let thresholds = ColorThresholds::default();
        // Renderer colors: yellow and red paint on dark rubber.
        assert!(thresholds.matches(rgb_to_hsv([255, 230, 0])));
        assert!(thresholds.matches(rgb_to_hsv([230, 0, 0])));
        // Magenta-ish red on the high side of the hue wrap.
        assert!(thresholds.matches(rgb_to_hsv([230, 0, 60])));
        assert!(!thresholds.matches(rgb_to_hsv([25, 25, 25])));
        assert!(!thresholds.matches(rgb_to_hsv([0, 0, 230])));
        // Dull red fails the saturation/value floor.
        assert!(!thresholds.matches(rgb_to_hsv([90, 40, 40])));
    }

    #[test]
    fn cleaning_removes_specks_and_fills_pinholes() {
        let mut image = RgbImage::from_pixel(40, 40, Rgb([25, 25, 25]));
        for y in 10..30 {
            for x in 10..30 {
                image.put_pixel(x, y, Rgb([255, 230, 0]));
            }
        }
        // Pinhole inside the square, speck outside it.
        image.put_pixel(20, 20, Rgb([25, 25, 25]));
        image.put_pixel(4, 4, Rgb([255, 230, 0]));

        let mask = marker_mask(&image, &ColorThresholds::default());
        assert_eq!(mask.get_pixel(4, 4)[0], MASK_ON);
        assert_eq!(mask.get_pixel(20, 20)[0], 0);

        let cleaned = clean_mask(&mask, 2);
        assert_eq!(cleaned.get_pixel(4, 4)[0], 0);
        assert_eq!(cleaned.get_pixel(20, 20)[0], MASK_ON);
        assert_eq!(cleaned.get_pixel(15, 15)[0], MASK_ON);
    }
}
