use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::Result;

/// One image from a job's sample list together with its detected regions.
///
/// The job store owns these records; the overlay engine only reads them and a new fetch
/// replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Sample {
    pub image_id: i64,
    /// Dataset-relative path of the image, when the job store reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_path: Option<String>,
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl Sample {
    pub fn new(image_id: i64, regions: Vec<Region>) -> Self {
        Self {
            image_id,
            rel_path: None,
            regions,
        }
    }

    /// Load a sample from its JSON representation
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a sample from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn mask_count(&self) -> usize {
        self.regions.iter().filter(|r| r.has_mask()).count()
    }
}

/// A detected or segmented object instance.
///
/// Only `bbox` is always present upstream; everything else degrades to placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Region {
    /// Four numbers, either `[x1, y1, x2, y2]` or `[x, y, width, height]`
    pub bbox: Vec<BBoxComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0.0, max = 1.0))]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_name: Option<String>,
    /// Canonical concept color as `#RRGGBB`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_ref: Option<String>,
    /// Pre-resolved mask location attached by the job store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<i64>,
    #[serde(default)]
    pub is_demo: bool,
}

impl Region {
    /// Region with a numeric box and no other metadata
    pub fn with_bbox(bbox: [f64; 4]) -> Self {
        Self {
            bbox: bbox.iter().copied().map(BBoxComponent::Number).collect(),
            ..Default::default()
        }
    }

    pub fn concept(mut self, id: i64, name: impl Into<String>) -> Self {
        self.concept_id = Some(id);
        self.concept_name = Some(name.into());
        self
    }

    pub fn score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn color(mut self, hex: impl Into<String>) -> Self {
        self.color_hex = Some(hex.into());
        self
    }

    pub fn mask(mut self, mask_ref: impl Into<String>) -> Self {
        self.mask_ref = Some(mask_ref.into());
        self
    }

    pub fn has_mask(&self) -> bool {
        self.mask_ref.is_some() || self.mask_url.is_some()
    }

    /// The four box components as finite numbers, or `None` when malformed
    pub fn bbox_numbers(&self) -> Option<[f64; 4]> {
        if self.bbox.len() != 4 {
            return None;
        }
        let mut out = [0.0; 4];
        for (slot, component) in out.iter_mut().zip(&self.bbox) {
            *slot = component.as_number()?;
        }
        Some(out)
    }
}

/// A single bounding-box component as produced upstream.
///
/// Producers are inconsistent: numbers usually, numeric strings sometimes, and
/// occasionally garbage. Anything that is not a finite number is rejected at
/// normalization time rather than at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum BBoxComponent {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl BBoxComponent {
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            Self::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for BBoxComponent {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for BBoxComponent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Axis-aligned rectangle in image pixel space, clamped to the image bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct NormalizedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Project into another coordinate space, e.g. natural size to on-screen size
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }
}

/// Which reading of the four box numbers the normalizer settled on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BoxEncoding {
    /// `[x1, y1, x2, y2]`
    Corners,
    /// `[x, y, width, height]` that fits inside the image
    OriginSize,
    /// `[x, y, width, height]` assumed even though it overflows the image
    Fallback,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_parses_mixed_bbox_components() {
        let json = r#"{"bbox": [10, "20.5", 30, null], "concept_name": "roof"}"#;
        let region: Region = serde_json::from_str(json).expect("region should parse");

        assert_eq!(region.bbox.len(), 4);
        assert_eq!(region.bbox[1].as_number(), Some(20.5));
        assert_eq!(region.bbox[3].as_number(), None);
        assert!(region.bbox_numbers().is_none());
        assert!(!region.is_demo);
    }

    #[test]
    fn test_sample_parses_job_store_payload() {
        let json = r##"{
            "image_id": 7,
            "rel_path": "site/a.jpg",
            "regions": [
                {"bbox": [1, 2, 3, 4], "score": 0.9, "color_hex": "#ff0000",
                 "concept_name": "roof", "concept_id": 3, "region_id": 11,
                 "mask_ref": "4/7/11.png", "mask_url": "/api/v1/masks/4/7/11.png",
                 "bbox_xyxy": [1, 2, 4, 6]}
            ]
        }"##;
        let sample = Sample::from_json(json).expect("sample should parse");

        assert_eq!(sample.image_id, 7);
        assert_eq!(sample.mask_count(), 1);
        assert_eq!(sample.regions[0].bbox_numbers(), Some([1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_non_finite_strings_are_rejected() {
        assert_eq!(BBoxComponent::from("NaN").as_number(), None);
        assert_eq!(BBoxComponent::from("inf").as_number(), None);
        assert_eq!(BBoxComponent::from(" 12 ").as_number(), Some(12.0));
        assert_eq!(BBoxComponent::Number(f64::NAN).as_number(), None);
    }

    #[test]
    fn test_box_encoding_names() {
        assert_eq!(BoxEncoding::OriginSize.to_string(), "origin_size");
        let parsed: BoxEncoding = "corners".parse().expect("known name");
        assert_eq!(parsed, BoxEncoding::Corners);
    }
}
