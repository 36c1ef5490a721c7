use std::future::Future;

use image::RgbaImage;

use crate::{color::Rgb, error::Result};

/// Trait for mask recoloring algorithms
pub trait MaskRecolorer: Send + Sync {
    /// Turn a decoded mask buffer into a colored, translucent fill layer
    fn recolor(&self, mask: &RgbaImage, color: Rgb, opacity: f32) -> RgbaImage;
}

/// Trait for mask edge extraction algorithms
pub trait EdgeExtractor: Send + Sync {
    /// Flag the boundary pixels of a fill layer, one entry per pixel in row-major order
    fn edge_pixels(&self, layer: &RgbaImage) -> Vec<bool>;
}

/// Trait for fetching mask resources by URL
pub trait MaskLoader: Send + Sync {
    /// Fetch the raw encoded bytes of a mask image
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Trait for turning a region's opaque mask reference into a loadable URL
pub trait MaskResolver: Send + Sync {
    fn resolve(&self, job_id: i64, mask_ref: &str) -> Option<String>;
}

impl<F> MaskResolver for F
where
    F: Fn(i64, &str) -> Option<String> + Send + Sync,
{
    fn resolve(&self, job_id: i64, mask_ref: &str) -> Option<String> {
        self(job_id, mask_ref)
    }
}
