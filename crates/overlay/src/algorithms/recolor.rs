use image::{Rgba, RgbaImage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{color::Rgb, traits::MaskRecolorer};

/// Where the mask shape is encoded in the decoded buffer
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaskChannel {
    /// Alpha when the buffer has any non-opaque pixel, luminance otherwise
    #[default]
    Auto,
    Alpha,
    Luminance,
}

impl MaskChannel {
    /// Settle `Auto` against an actual buffer
    pub fn resolve(self, mask: &RgbaImage) -> MaskChannel {
        match self {
            MaskChannel::Auto => {
                if mask.pixels().any(|p| p[3] < u8::MAX) {
                    MaskChannel::Alpha
                } else {
                    MaskChannel::Luminance
                }
            }
            other => other,
        }
    }

    fn coverage(self, pixel: &Rgba<u8>) -> u8 {
        match self {
            MaskChannel::Luminance => pixel[0],
            MaskChannel::Alpha | MaskChannel::Auto => pixel[3],
        }
    }
}

/// Recolors by replacing RGB and scaling the mask coverage by the opacity
#[derive(Debug, Clone, Default)]
pub struct AlphaRecolorer {
    pub channel: MaskChannel,
}

impl MaskRecolorer for AlphaRecolorer {
    fn recolor(&self, mask: &RgbaImage, color: Rgb, opacity: f32) -> RgbaImage {
        recolor(mask, color, opacity, self.channel)
    }
}

/// Fill pass: every covered pixel takes `color` with alpha `coverage * opacity`,
/// everything else becomes fully transparent.
pub fn recolor(mask: &RgbaImage, color: Rgb, opacity: f32, channel: MaskChannel) -> RgbaImage {
    let channel = channel.resolve(mask);
    let opacity = opacity.clamp(0.0, 1.0);

    let mut layer = RgbaImage::new(mask.width(), mask.height());
    for (src, dst) in mask.pixels().zip(layer.pixels_mut()) {
        let coverage = channel.coverage(src);
        if coverage == 0 {
            continue;
        }
        let alpha = (coverage as f32 / 255.0 * opacity * 255.0).round() as u8;
        *dst = color.to_rgba(alpha);
    }
    layer
}
