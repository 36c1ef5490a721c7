//! Bounding boxes and labels as a resolution-independent layer.
//!
//! Shapes live in natural image coordinates; the SVG form carries a `viewBox` of the
//! natural size so it scales with the displayed image without recomputation. The raster
//! form is produced on demand for flattened exports.

use std::fmt::Write as _;

use image::RgbaImage;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use crate::bbox::normalize_region;
use crate::color::{color_for, rgb_for, Rgb};
use crate::types::{NormalizedBox, Region};

const STROKE_WIDTH: u32 = 2;
const DASH: f32 = 6.0;
const GAP: f32 = 4.0;
const CHIP_HEIGHT: u32 = 14;
const CHIP_CHAR_WIDTH: u32 = 6;
const CHIP_PADDING: u32 = 4;
const CHIP_ALPHA: u8 = 220;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorShape {
    pub rect: NormalizedBox,
    pub color: Rgb,
    /// Color as supplied for the region, used verbatim in SVG output
    pub color_hex: String,
    pub label: String,
    /// Demo shapes get a dashed stroke and a `DEMO` chip
    pub demo: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VectorLayer {
    pub natural_width: u32,
    pub natural_height: u32,
    pub shapes: Vec<VectorShape>,
    /// Regions left out because their box was malformed
    pub skipped: usize,
}

impl VectorLayer {
    /// Build shapes for every region with a usable box, in region order
    pub fn build(regions: &[Region], natural_width: u32, natural_height: u32) -> Self {
        let mut layer = VectorLayer {
            natural_width,
            natural_height,
            ..Default::default()
        };

        for region in regions {
            let Some(rect) = normalize_region(region, natural_width, natural_height) else {
                layer.skipped += 1;
                continue;
            };
            layer.shapes.push(VectorShape {
                rect,
                color: rgb_for(region),
                color_hex: svg_color(region),
                label: label_for(region),
                demo: region.is_demo,
            });
        }

        layer
    }

    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" preserveAspectRatio="none">"#,
            self.natural_width, self.natural_height
        );
        for shape in &self.shapes {
            let r = &shape.rect;
            let dash = if shape.demo {
                format!(r#" stroke-dasharray="{DASH} {GAP}""#)
            } else {
                String::new()
            };
            let _ = writeln!(
                svg,
                r#"  <rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="{}" stroke-width="{}" vector-effect="non-scaling-stroke"{}/>"#,
                r.x, r.y, r.width, r.height, escape(&shape.color_hex), STROKE_WIDTH, dash
            );
            let _ = writeln!(
                svg,
                r#"  <text x="{:.2}" y="{:.2}" fill="{}" font-size="12" font-family="sans-serif">{}</text>"#,
                r.x,
                (r.y - 3.0).max(12.0),
                escape(&shape.color_hex),
                escape(&shape.label)
            );
        }
        svg.push_str("</svg>\n");
        svg
    }

    /// Draw strokes and label chips into a transparent layer of the given display size.
    ///
    /// Label text is only carried by the SVG form.
    pub fn rasterize(&self, width: u32, height: u32) -> RgbaImage {
        let mut canvas = RgbaImage::new(width, height);
        if self.natural_width == 0 || self.natural_height == 0 || width == 0 || height == 0 {
            return canvas;
        }

        let sx = width as f32 / self.natural_width as f32;
        let sy = height as f32 / self.natural_height as f32;

        for shape in &self.shapes {
            let rect = shape.rect.scaled(sx, sy);
            if rect.is_empty() {
                continue;
            }
            let color = shape.color.to_rgba(u8::MAX);
            if shape.demo {
                draw_dashed_rect(&mut canvas, &rect, color);
            } else {
                for inset in 0..STROKE_WIDTH {
                    if let Some(r) = pixel_rect(&rect, inset) {
                        draw_hollow_rect_mut(&mut canvas, r, color);
                    }
                }
            }
            draw_chip(&mut canvas, &rect, &shape.label, shape.color);
        }

        canvas
    }
}

/// Label text: concept (or placeholder) and score as a percentage; `DEMO` for placeholders
pub fn label_for(region: &Region) -> String {
    if region.is_demo {
        return "DEMO".to_string();
    }
    let name = match (&region.concept_name, region.concept_id) {
        (Some(name), _) => name.clone(),
        (None, Some(id)) => format!("Concept {id}"),
        (None, None) => "region".to_string(),
    };
    match region.score {
        Some(score) if score.is_finite() => format!("{name} {:.0}%", (score * 100.0).clamp(0.0, 100.0)),
        _ => name,
    }
}

fn svg_color(region: &Region) -> String {
    let hex = color_for(region);
    if Rgb::from_hex(&hex).is_ok() {
        hex
    } else {
        rgb_for(region).to_hex()
    }
}

fn pixel_rect(rect: &NormalizedBox, inset: u32) -> Option<Rect> {
    let inset = inset as f32;
    let width = (rect.width - 2.0 * inset).round();
    let height = (rect.height - 2.0 * inset).round();
    if width < 1.0 || height < 1.0 {
        return None;
    }
    Some(
        Rect::at((rect.x + inset).round() as i32, (rect.y + inset).round() as i32)
            .of_size(width as u32, height as u32),
    )
}

fn draw_dashed_rect(canvas: &mut RgbaImage, rect: &NormalizedBox, color: image::Rgba<u8>) {
    let (x0, y0) = (rect.x, rect.y);
    let (x1, y1) = (rect.right() - 1.0, rect.bottom() - 1.0);
    let edges = [
        ((x0, y0), (x1, y0)),
        ((x1, y0), (x1, y1)),
        ((x1, y1), (x0, y1)),
        ((x0, y1), (x0, y0)),
    ];
    for (start, end) in edges {
        let length = ((end.0 - start.0).powi(2) + (end.1 - start.1).powi(2)).sqrt();
        if length <= 0.0 {
            continue;
        }
        let (dx, dy) = ((end.0 - start.0) / length, (end.1 - start.1) / length);
        let mut offset = 0.0;
        while offset < length {
            let stop = (offset + DASH).min(length);
            draw_line_segment_mut(
                canvas,
                (start.0 + dx * offset, start.1 + dy * offset),
                (start.0 + dx * stop, start.1 + dy * stop),
                color,
            );
            offset += DASH + GAP;
        }
    }
}

fn draw_chip(canvas: &mut RgbaImage, rect: &NormalizedBox, label: &str, color: Rgb) {
    let chars = label.chars().count() as u32;
    let chip_width = chars * CHIP_CHAR_WIDTH + 2 * CHIP_PADDING;
    // Above the box when there is room, otherwise tucked inside its top edge
    let top = if rect.y >= CHIP_HEIGHT as f32 {
        rect.y - CHIP_HEIGHT as f32
    } else {
        rect.y
    };
    let chip = Rect::at(rect.x.round() as i32, top.round() as i32).of_size(chip_width.max(1), CHIP_HEIGHT);
    draw_filled_rect_mut(canvas, chip, color.to_rgba(CHIP_ALPHA));
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::build_demo_regions;

    #[test]
    fn test_build_skips_malformed_boxes() {
        let mut broken = Region::with_bbox([0.0; 4]);
        broken.bbox.pop();
        let regions = vec![
            Region::with_bbox([100.0, 100.0, 300.0, 250.0]).concept(1, "roof").score(0.87),
            broken,
            Region::with_bbox([100.0, 100.0, 50.0, 40.0]),
        ];

        let layer = VectorLayer::build(&regions, 800, 600);
        assert_eq!(layer.shapes.len(), 2);
        assert_eq!(layer.skipped, 1);
        assert_eq!(layer.shapes[0].rect, NormalizedBox::new(100.0, 100.0, 200.0, 150.0));
        assert_eq!(layer.shapes[0].label, "roof 87%");
        assert_eq!(layer.shapes[1].label, "region");
    }

    #[test]
    fn test_labels_degrade_to_placeholders() {
        let mut by_id = Region::with_bbox([0.0; 4]);
        by_id.concept_id = Some(9);
        assert_eq!(label_for(&by_id), "Concept 9");

        let mut demo = Region::with_bbox([0.0; 4]).score(0.5);
        demo.is_demo = true;
        assert_eq!(label_for(&demo), "DEMO");
    }

    #[test]
    fn test_non_finite_score_is_dropped_from_label() {
        let roof = Region::with_bbox([0.0; 4]).concept(3, "roof");
        assert_eq!(label_for(&roof.clone().score(0.876)), "roof 88%");
        assert_eq!(label_for(&roof.clone().score(f32::NAN)), "roof");
        assert_eq!(label_for(&roof.score(f32::INFINITY)), "roof");
    }

    #[test]
    fn test_svg_uses_natural_view_box() {
        let regions = vec![Region::with_bbox([10.0, 20.0, 30.0, 60.0]).concept(1, "a<b").color("#112233")];
        let svg = VectorLayer::build(&regions, 640, 480).to_svg();

        assert!(svg.contains(r#"viewBox="0 0 640 480""#));
        assert!(svg.contains(r#"preserveAspectRatio="none""#));
        assert!(svg.contains(r##"stroke="#112233""##));
        assert!(svg.contains("a&lt;b"));
        assert!(!svg.contains("stroke-dasharray"));
    }

    #[test]
    fn test_demo_shapes_are_dashed() {
        let layer = VectorLayer::build(&build_demo_regions(900, 600, 2), 900, 600);
        assert!(layer.shapes.iter().all(|s| s.demo && s.label == "DEMO"));
        assert_eq!(layer.to_svg().matches("stroke-dasharray").count(), 2);
    }

    #[test]
    fn test_malformed_explicit_color_gets_fallback_stroke() {
        let regions = vec![Region::with_bbox([1.0, 1.0, 5.0, 5.0]).concept(3, "roof").color("\"><script>")];
        let svg = VectorLayer::build(&regions, 10, 10).to_svg();
        assert!(svg.contains(r##"stroke="#c3ab22""##));
    }

    #[test]
    fn test_rasterize_scales_to_display_size() {
        let regions = vec![Region::with_bbox([20.0, 40.0, 60.0, 80.0]).color("#ff0000")];
        let layer = VectorLayer::build(&regions, 100, 100);
        let canvas = layer.rasterize(200, 200);

        // Box (20,40)-(60,80) in natural space lands at (40,80)-(120,160)
        assert_eq!(canvas.get_pixel(40, 120), &image::Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(119, 120), &image::Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(80, 120)[3], 0);
        // Chip sits above the box
        assert_eq!(canvas.get_pixel(42, 70)[3], CHIP_ALPHA);
    }

    #[test]
    fn test_rasterize_with_zero_sizes_is_blank() {
        let layer = VectorLayer::build(&[Region::with_bbox([0.0, 0.0, 5.0, 5.0])], 0, 0);
        assert!(layer.rasterize(10, 10).pixels().all(|p| p[3] == 0));
    }
}
