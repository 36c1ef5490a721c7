//! Resolution of the two box encodings the job store emits.
//!
//! Boxes arrive either as corners `[x1, y1, x2, y2]` or as `[x, y, width, height]`, with
//! nothing tagging which. The reading is picked by checking which one fits the image.
//! Small boxes near the origin pass both checks; [`is_ambiguous`] reports that class so
//! callers can flag it, but nothing here pretends to know the producer's intent.

use crate::types::{BBoxComponent, BoxEncoding, NormalizedBox, Region};

/// Normalize a raw box into image pixel space.
///
/// Returns `None` for wrong arity or any component that is not a finite number.
pub fn normalize(bbox: &[BBoxComponent], image_width: u32, image_height: u32) -> Option<NormalizedBox> {
    let numbers = numbers(bbox)?;
    Some(normalize_numbers(numbers, image_width, image_height))
}

/// Normalize the box of a region
pub fn normalize_region(region: &Region, image_width: u32, image_height: u32) -> Option<NormalizedBox> {
    let numbers = region.bbox_numbers()?;
    Some(normalize_numbers(numbers, image_width, image_height))
}

/// Normalize four already-validated numbers
pub fn normalize_numbers(bbox: [f64; 4], image_width: u32, image_height: u32) -> NormalizedBox {
    let [a, b, c, d] = bbox;
    let w = image_width as f64;
    let h = image_height as f64;

    let (width, height) = match encoding_of(bbox, w, h) {
        BoxEncoding::Corners => (c - a, d - b),
        BoxEncoding::OriginSize | BoxEncoding::Fallback => (c, d),
    };

    let x = a.max(0.0).min(w);
    let y = b.max(0.0).min(h);
    let width = width.min(w - x).max(0.0);
    let height = height.min(h - y).max(0.0);

    NormalizedBox::new(x as f32, y as f32, width as f32, height as f32)
}

/// Report which reading the normalizer would use for this box
pub fn classify(bbox: &[BBoxComponent], image_width: u32, image_height: u32) -> Option<BoxEncoding> {
    let numbers = numbers(bbox)?;
    Some(encoding_of(numbers, image_width as f64, image_height as f64))
}

/// True when both readings fit the image and disagree about the rectangle.
///
/// The heuristic still returns the corner reading for these; treat the result as a guess.
pub fn is_ambiguous(bbox: &[BBoxComponent], image_width: u32, image_height: u32) -> bool {
    let Some([a, b, c, d]) = numbers(bbox) else {
        return false;
    };
    let w = image_width as f64;
    let h = image_height as f64;
    let same_rect = a == 0.0 && b == 0.0;
    fits_as_corners([a, b, c, d], w, h) && fits_as_origin_size([a, b, c, d], w, h) && !same_rect
}

fn numbers(bbox: &[BBoxComponent]) -> Option<[f64; 4]> {
    let [a, b, c, d] = bbox else {
        return None;
    };
    Some([a.as_number()?, b.as_number()?, c.as_number()?, d.as_number()?])
}

fn encoding_of(bbox: [f64; 4], w: f64, h: f64) -> BoxEncoding {
    if fits_as_corners(bbox, w, h) {
        BoxEncoding::Corners
    } else if fits_as_origin_size(bbox, w, h) {
        BoxEncoding::OriginSize
    } else {
        BoxEncoding::Fallback
    }
}

// The +1 slack absorbs producers that report inclusive pixel edges.
fn fits_as_corners([a, b, c, d]: [f64; 4], w: f64, h: f64) -> bool {
    c > a && d > b && c <= w + 1.0 && d <= h + 1.0
}

fn fits_as_origin_size([a, b, c, d]: [f64; 4], w: f64, h: f64) -> bool {
    a + c <= w + 1.0 && b + d <= h + 1.0
}
