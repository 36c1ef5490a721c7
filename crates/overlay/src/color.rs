//! Deterministic region colors.
//!
//! Colors are a pure function of the region's concept identity, so the legend, the box
//! strokes and the mask fills agree without any palette being stored.

use image::Rgba;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};
use crate::types::Region;

const SATURATION: f64 = 0.70;
const LIGHTNESS: f64 = 0.45;
const DEFAULT_SEED: &str = "region";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB`, `RRGGBB` or the `#RGB` shorthand
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || OverlayError::InvalidColor(hex.to_string());
        if !digits.is_ascii() {
            return Err(invalid());
        }

        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match digits.len() {
            6 => Ok(Self::new(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            3 => {
                let expand = |s: &str| channel(s).map(|v| v * 17);
                Ok(Self::new(
                    expand(&digits[0..1])?,
                    expand(&digits[1..2])?,
                    expand(&digits[2..3])?,
                ))
            }
            _ => Err(invalid()),
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_rgba(&self, alpha: u8) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, alpha])
    }

    /// Convert HSL (hue in degrees, saturation and lightness in 0..=1)
    pub fn from_hsl(hue: f64, saturation: f64, lightness: f64) -> Self {
        let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
        let sector = (hue.rem_euclid(360.0)) / 60.0;
        let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
        let m = lightness - chroma / 2.0;

        let (r, g, b) = match sector as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let to_byte = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::new(to_byte(r), to_byte(g), to_byte(b))
    }
}

/// Display color for a region as `#RRGGBB`.
///
/// An explicit `color_hex` is returned verbatim; otherwise the color is derived from the
/// concept identity.
pub fn color_for(region: &Region) -> String {
    match &region.color_hex {
        Some(hex) => hex.clone(),
        None => hashed_color(&seed_for(region)).to_hex(),
    }
}

/// Drawing color for a region. A malformed explicit color falls back to the derived one.
pub fn rgb_for(region: &Region) -> Rgb {
    region
        .color_hex
        .as_deref()
        .and_then(|hex| Rgb::from_hex(hex).ok())
        .unwrap_or_else(|| hashed_color(&seed_for(region)))
}

/// Identity used for hashing: concept id, else concept name, else `"region"`
pub fn seed_for(region: &Region) -> String {
    match (&region.concept_id, &region.concept_name) {
        (Some(id), _) => id.to_string(),
        (None, Some(name)) => name.clone(),
        (None, None) => DEFAULT_SEED.to_string(),
    }
}

/// Color derived from a seed string
pub fn hashed_color(seed: &str) -> Rgb {
    let hue = seed_hash(seed).unsigned_abs() % 360;
    Rgb::from_hsl(hue as f64, SATURATION, LIGHTNESS)
}

/// 32-bit rolling hash over UTF-16 code units (`h = h * 31 + unit`, wrapping)
pub fn seed_hash(seed: &str) -> i32 {
    seed.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// One row of a concept legend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LegendEntry {
    pub label: String,
    pub color_hex: String,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f32>,
    #[serde(default)]
    pub is_demo: bool,
}

/// Build legend rows in first-appearance order.
///
/// Real regions group by concept identity; demo regions collapse into a single `DEMO` row
/// so they never blend into real results.
pub fn legend(regions: &[Region]) -> Vec<LegendEntry> {
    let mut entries: Vec<(Option<String>, LegendEntry)> = Vec::new();

    for region in regions {
        let key = (!region.is_demo).then(|| seed_for(region));
        let index = match entries.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                let label = if region.is_demo {
                    "DEMO".to_string()
                } else {
                    legend_label(region)
                };
                entries.push((
                    key,
                    LegendEntry {
                        label,
                        color_hex: color_for(region),
                        count: 0,
                        best_score: None,
                        is_demo: region.is_demo,
                    },
                ));
                entries.len() - 1
            }
        };

        let entry = &mut entries[index].1;
        entry.count += 1;
        if let Some(score) = region.score {
            entry.best_score = Some(entry.best_score.map_or(score, |best| best.max(score)));
        }
    }

    entries.into_iter().map(|(_, entry)| entry).collect()
}

fn legend_label(region: &Region) -> String {
    match (&region.concept_name, region.concept_id) {
        (Some(name), _) => name.clone(),
        (None, Some(id)) => format!("Concept {id}"),
        (None, None) => DEFAULT_SEED.to_string(),
    }
}
