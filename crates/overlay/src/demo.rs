//! Placeholder regions for illustrating an empty result.
//!
//! Only produced on explicit request, always tagged `is_demo`, never mixed with real
//! detections.

use std::borrow::Cow;

use crate::types::Region;

const MARGIN_RATIO: f64 = 0.06;
const BOX_WIDTH_RATIO: f64 = 0.65;
const BOX_HEIGHT_RATIO: f64 = 0.60;
const MAX_COLUMNS: usize = 3;

/// Lay out `count` placeholder boxes on a grid of at most three columns.
///
/// The grid covers the image minus a 6% margin on each side; each box takes 65% x 60%
/// of its cell and is centered in it. Boxes use corner encoding.
pub fn build_demo_regions(width: u32, height: u32, count: usize) -> Vec<Region> {
    if count == 0 || width == 0 || height == 0 {
        return Vec::new();
    }

    let (width, height) = (width as f64, height as f64);
    let cols = count.clamp(1, MAX_COLUMNS);
    let rows = count.div_ceil(cols);

    let margin_x = width * MARGIN_RATIO;
    let margin_y = height * MARGIN_RATIO;
    let cell_width = (width - 2.0 * margin_x) / cols as f64;
    let cell_height = (height - 2.0 * margin_y) / rows as f64;
    let box_width = cell_width * BOX_WIDTH_RATIO;
    let box_height = cell_height * BOX_HEIGHT_RATIO;

    (0..count)
        .map(|index| {
            let row = (index / cols) as f64;
            let col = (index % cols) as f64;
            let x0 = margin_x + col * cell_width + (cell_width - box_width) / 2.0;
            let y0 = margin_y + row * cell_height + (cell_height - box_height) / 2.0;

            let mut region = Region::with_bbox([x0, y0, x0 + box_width, y0 + box_height]);
            region.is_demo = true;
            region
        })
        .collect()
}

/// Regions to draw for a sample: the real ones, or placeholders when there are none and
/// `demo` is set.
pub fn display_regions(regions: &[Region], demo: bool, width: u32, height: u32, count: usize) -> Cow<'_, [Region]> {
    if regions.is_empty() && demo {
        Cow::Owned(build_demo_regions(width, height, count))
    } else {
        Cow::Borrowed(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::{classify, normalize_region};
    use crate::types::BoxEncoding;

    #[test]
    fn test_four_boxes_on_three_columns() {
        let regions = build_demo_regions(900, 600, 4);
        assert_eq!(regions.len(), 4);

        for region in &regions {
            assert!(region.is_demo);
            assert!(region.score.is_none() && region.concept_id.is_none() && region.concept_name.is_none());
            assert_eq!(classify(&region.bbox, 900, 600), Some(BoxEncoding::Corners));

            let b = normalize_region(region, 900, 600).expect("numeric box");
            assert!(b.x >= 0.0 && b.y >= 0.0);
            assert!(b.right() <= 900.0 && b.bottom() <= 600.0);
        }

        // Fourth box wraps to the second row, first column
        let first = regions[0].bbox_numbers().expect("numbers");
        let fourth = regions[3].bbox_numbers().expect("numbers");
        assert_eq!(first[0], fourth[0]);
        assert!(fourth[1] > first[3]);
    }

    #[test]
    fn test_grid_geometry() {
        let regions = build_demo_regions(900, 600, 4);
        let [x0, y0, x1, y1] = regions[0].bbox_numbers().expect("numbers");

        // margin 54 / 36, cell 264 x 264, box 171.6 x 158.4
        let eps = 1e-9;
        assert!((x0 - (54.0 + (264.0 - 171.6) / 2.0)).abs() < eps);
        assert!((y0 - (36.0 + (264.0 - 158.4) / 2.0)).abs() < eps);
        assert!((x1 - x0 - 171.6).abs() < eps);
        assert!((y1 - y0 - 158.4).abs() < eps);
    }

    #[test]
    fn test_single_box_uses_one_column() {
        let regions = build_demo_regions(100, 100, 1);
        let [x0, _, x1, _] = regions[0].bbox_numbers().expect("numbers");
        assert!(((x0 + x1) / 2.0 - 50.0).abs() < 1e-9, "centered");
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(build_demo_regions(900, 600, 0).is_empty());
        assert!(build_demo_regions(0, 600, 3).is_empty());
        assert!(build_demo_regions(900, 0, 3).is_empty());
    }

    #[test]
    fn test_demo_only_replaces_empty_lists() {
        let real = vec![
            Region::with_bbox([1.0, 1.0, 5.0, 5.0]),
            Region::with_bbox([2.0, 2.0, 6.0, 6.0]),
            Region::with_bbox([3.0, 3.0, 7.0, 7.0]),
        ];

        let shown = display_regions(&real, true, 900, 600, 3);
        assert!(matches!(shown, Cow::Borrowed(_)));
        assert!(shown.iter().all(|r| !r.is_demo));

        assert!(display_regions(&[], false, 900, 600, 3).is_empty());

        let demo = display_regions(&[], true, 900, 600, 3);
        assert_eq!(demo.len(), 3);
        assert!(demo.iter().all(|r| r.is_demo));
    }
}
