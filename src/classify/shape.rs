//! Region geometry on a binary mask.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::geometry::{arc_length, convex_hull};
use imageproc::point::Point;

use crate::classify::result::ShapeFeatures;

/// Outer borders of top-level regions (holes and nested islands excluded).
pub fn external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| matches!(contour.border_type, BorderType::Outer))
        .filter(|contour| contour.parent.is_none())
        .collect()
}

/// Features of the region with the largest enclosed area, if any region exists.
pub fn largest_region(mask: &GrayImage) -> Option<ShapeFeatures> {
    external_contours(mask)
        .iter()
        .map(|contour| region_features(&contour.points))
        .max_by(|a, b| a.area.total_cmp(&b.area))
}

/// Geometry of one closed contour.
pub fn region_features(points: &[Point<i32>]) -> ShapeFeatures {
    let area = polygon_area(points);
    let perimeter = if points.len() > 1 {
        arc_length(points, true)
    } else {
        0.0
    };
    let hull = convex_hull(points);
    let hull_area = polygon_area(&hull);
    ShapeFeatures::new(area, perimeter, bounding_size(points), hull_area)
}

/// Shoelace area of a closed polygon. Fewer than three vertices enclose nothing.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(p, q)| p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

/// Pixel extent (width, height) of a point set, inclusive of both ends.
pub fn bounding_size(points: &[Point<i32>]) -> (u32, u32) {
    let Some(first) = points.first() else {
        return (0, 0);
    };
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    ((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{render_mask, DotShape};

    #[test]
    fn square_polygon_area_and_extent() {
        let square = [
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        assert_eq!(polygon_area(&square), 100.0);
        assert_eq!(bounding_size(&square), (11, 11));
        let features = region_features(&square);
        assert_eq!(features.solidity, 1.0);
        assert_eq!(features.perimeter, 40.0);
    }

    #[test]
    fn single_pixel_region_is_degenerate() {
        let mut mask = GrayImage::new(9, 9);
        mask.put_pixel(4, 4, image::Luma([255]));
        let features = largest_region(&mask).expect("one region");
        assert_eq!(features.area, 0.0);
        assert_eq!(features.hull_area, 0.0);
        assert_eq!(features.solidity, 0.0);
    }

    #[test]
    fn empty_mask_has_no_region() {
        assert!(largest_region(&GrayImage::new(16, 16)).is_none());
    }

    #[test]
    fn filled_disk_is_nearly_convex() {
        for radius in [12u32, 20] {
            let mask = render_mask(96, 96, DotShape::Circle, radius);
            let features = largest_region(&mask).unwrap();
            assert!(features.solidity >= 0.92, "r={} {:?}", radius, features);
            assert!(features.circularity > 0.75, "r={} {:?}", radius, features);
            let (w, h) = features.bounding_size;
            assert_eq!(w, 2 * radius + 1);
            assert_eq!(h, 2 * radius + 1);
        }
    }

    #[test]
    fn missing_wedge_lowers_solidity() {
        let mask = render_mask(96, 96, DotShape::Pacman, 20);
        let features = largest_region(&mask).unwrap();
        assert!(features.solidity < 0.92, "{:?}", features);
    }

    #[test]
    fn ring_is_judged_by_its_outer_border() {
        let mask = render_mask(96, 96, DotShape::Donut, 20);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        let features = largest_region(&mask).unwrap();
        assert!(features.solidity >= 0.92, "{:?}", features);
    }

    #[test]
    fn largest_of_several_regions_wins() {
        let mut mask = render_mask(96, 96, DotShape::Circle, 20);
        for y in 2..6 {
            for x in 2..6 {
                mask.put_pixel(x, y, image::Luma([255]));
            }
        }
        assert_eq!(external_contours(&mask).len(), 2);
        let features = largest_region(&mask).unwrap();
        assert_eq!(features.bounding_size, (41, 41));
    }
}
