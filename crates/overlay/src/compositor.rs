//! Mask compositing.
//!
//! Each region's mask is fetched, decoded, scaled to the surface, recolored with the region
//! color at the requested opacity, outlined, and alpha-blended onto the surface in region
//! order. A mask that fails to load is logged and skipped; it never aborts the others.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use tracing::debug;

use crate::algorithms::{apply_outline, AlphaRecolorer, FourNeighbourEdges, MaskChannel};
use crate::color::rgb_for;
use crate::error::Result;
use crate::scheduler::RenderTicket;
use crate::traits::{EdgeExtractor, MaskLoader, MaskRecolorer, MaskResolver};
use crate::types::Region;

/// Resampling used when a mask is scaled to the surface
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResampleFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CompositorConfig {
    pub channel: MaskChannel,
    /// Alpha of mask outlines; not affected by the fill opacity
    pub outline_alpha: u8,
    pub filter: ResampleFilter,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            channel: MaskChannel::Auto,
            outline_alpha: 230,
            filter: ResampleFilter::Triangle,
        }
    }
}

/// Outcome of one compositing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeReport {
    /// Masks blended onto the surface
    pub drawn: usize,
    /// Regions whose mask reference resolved to nothing
    pub skipped: usize,
    /// Masks that failed to fetch or decode
    pub failed: usize,
    /// The run stopped early because a newer render superseded it
    pub cancelled: bool,
}

pub struct MaskCompositor<L: MaskLoader> {
    loader: L,
    recolorer: Box<dyn MaskRecolorer>,
    edges: Box<dyn EdgeExtractor>,
    config: CompositorConfig,
}

impl<L: MaskLoader> MaskCompositor<L> {
    pub fn new(loader: L) -> Self {
        Self::with_config(loader, CompositorConfig::default())
    }

    pub fn with_config(loader: L, config: CompositorConfig) -> Self {
        Self {
            loader,
            recolorer: Box::new(AlphaRecolorer { channel: config.channel }),
            edges: Box::new(FourNeighbourEdges),
            config,
        }
    }

    /// Replace the recoloring algorithm
    pub fn set_recolorer<R>(mut self, recolorer: R) -> Self
    where
        R: MaskRecolorer + 'static,
    {
        self.recolorer = Box::new(recolorer);
        self
    }

    /// Replace the edge extraction algorithm
    pub fn set_edge_extractor<E>(mut self, edges: E) -> Self
    where
        E: EdgeExtractor + 'static,
    {
        self.edges = Box::new(edges);
        self
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Composite every region's mask onto `surface`, sized to the surface dimensions
    pub async fn composite_masks<R>(
        &self,
        surface: &mut RgbaImage,
        regions: &[Region],
        resolver: &R,
        job_id: i64,
        opacity: f32,
    ) -> CompositeReport
    where
        R: MaskResolver + ?Sized,
    {
        self.composite(surface, regions, resolver, job_id, opacity, None).await
    }

    /// Like [`composite_masks`](Self::composite_masks), but stops between regions once
    /// `ticket` is no longer the latest render.
    pub async fn composite_masks_until<R>(
        &self,
        surface: &mut RgbaImage,
        regions: &[Region],
        resolver: &R,
        job_id: i64,
        opacity: f32,
        ticket: &RenderTicket,
    ) -> CompositeReport
    where
        R: MaskResolver + ?Sized,
    {
        self.composite(surface, regions, resolver, job_id, opacity, Some(ticket)).await
    }

    async fn composite<R>(
        &self,
        surface: &mut RgbaImage,
        regions: &[Region],
        resolver: &R,
        job_id: i64,
        opacity: f32,
        ticket: Option<&RenderTicket>,
    ) -> CompositeReport
    where
        R: MaskResolver + ?Sized,
    {
        let mut report = CompositeReport::default();
        let (width, height) = surface.dimensions();
        if width == 0 || height == 0 {
            return report;
        }

        for (index, region) in regions.iter().enumerate() {
            if !region.has_mask() {
                continue;
            }
            if ticket.is_some_and(|t| !t.is_current()) {
                report.cancelled = true;
                break;
            }

            let Some(url) = mask_url(region, resolver, job_id) else {
                report.skipped += 1;
                continue;
            };

            match self.render_layer(&url, region, width, height, opacity).await {
                Ok(layer) => {
                    imageops::overlay(surface, &layer, 0, 0);
                    report.drawn += 1;
                }
                Err(e) => {
                    debug!(region = index, url = %url, error = %e, "skipping mask");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Fetch, decode, scale, recolor and outline one mask into a surface-sized layer
    async fn render_layer(
        &self,
        url: &str,
        region: &Region,
        width: u32,
        height: u32,
        opacity: f32,
    ) -> Result<RgbaImage> {
        let bytes = self.loader.fetch(url).await?;
        let mask = image::load_from_memory(&bytes)?.to_rgba8();
        let mask = if mask.dimensions() == (width, height) {
            mask
        } else {
            imageops::resize(&mask, width, height, self.config.filter.into())
        };

        let color = rgb_for(region);
        let mut layer = self.recolorer.recolor(&mask, color, opacity);
        let edges = self.edges.edge_pixels(&layer);
        apply_outline(&mut layer, &edges, color, self.config.outline_alpha);
        Ok(layer)
    }
}

/// Resolver output first, then any URL the job store attached to the region
fn mask_url<R>(region: &Region, resolver: &R, job_id: i64) -> Option<String>
where
    R: MaskResolver + ?Sized,
{
    region
        .mask_ref
        .as_deref()
        .and_then(|mask_ref| resolver.resolve(job_id, mask_ref))
        .or_else(|| region.mask_url.clone())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba};

    use super::*;
    use crate::loader::{MemoryMaskLoader, PassthroughResolver};

    fn png_rect(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> Vec<u8> {
        let mut mask = GrayImage::new(width, height);
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(mask)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    // Alpha blending goes through f32 and truncates
    fn close(actual: u8, expected: u8) -> bool {
        actual.abs_diff(expected) <= 1
    }

    fn region(mask: &str, color: &str) -> Region {
        Region::with_bbox([0.0, 0.0, 10.0, 10.0]).color(color).mask(mask)
    }

    #[tokio::test]
    async fn test_failing_mask_is_isolated() {
        let loader = MemoryMaskLoader::new();
        loader.insert("1.png", png_rect(20, 20, 0, 0, 6, 6));
        loader.insert("3.png", png_rect(20, 20, 14, 14, 20, 20));
        let compositor = MaskCompositor::new(loader);

        let regions = vec![
            region("1.png", "#ff0000"),
            region("2.png", "#00ff00"),
            region("3.png", "#0000ff"),
        ];
        let before = regions.clone();
        let mut surface = RgbaImage::new(20, 20);

        let report = compositor
            .composite_masks(&mut surface, &regions, &PassthroughResolver, 1, 0.5)
            .await;

        assert_eq!(report.drawn, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.cancelled);
        assert_eq!(regions, before, "regions are never mutated");
        assert_eq!(surface.get_pixel(2, 2)[0], 255);
        assert_eq!(surface.get_pixel(17, 17)[2], 255);
        assert_eq!(surface.get_pixel(10, 10)[3], 0);
    }

    #[tokio::test]
    async fn test_fill_and_outline_alphas() {
        let loader = MemoryMaskLoader::new();
        loader.insert("m.png", png_rect(10, 10, 2, 2, 8, 8));
        let compositor = MaskCompositor::new(loader);
        let mut surface = RgbaImage::new(10, 10);

        compositor
            .composite_masks(&mut surface, &[region("m.png", "#0000ff")], &PassthroughResolver, 1, 0.2)
            .await;

        // Interior at fill opacity, boundary at the fixed outline alpha
        let interior = surface.get_pixel(5, 5);
        let boundary = surface.get_pixel(2, 5);
        assert_eq!(interior[2], 255);
        assert!(close(interior[3], 51), "{interior:?}");
        assert_eq!(boundary[2], 255);
        assert!(close(boundary[3], 230), "{boundary:?}");
        assert_eq!(surface.get_pixel(1, 5), &Rgba([0, 0, 0, 0]));
    }

    #[tokio::test]
    async fn test_masks_scale_to_surface() {
        let loader = MemoryMaskLoader::new();
        loader.insert("m.png", png_rect(10, 10, 0, 0, 5, 10));
        let config = CompositorConfig {
            filter: ResampleFilter::Nearest,
            ..Default::default()
        };
        let compositor = MaskCompositor::with_config(loader, config);
        let mut surface = RgbaImage::new(40, 20);

        let report = compositor
            .composite_masks(&mut surface, &[region("m.png", "#ff0000")], &PassthroughResolver, 1, 0.8)
            .await;

        assert_eq!(report.drawn, 1);
        assert!(surface.get_pixel(5, 10)[3] > 0);
        assert_eq!(surface.get_pixel(30, 10)[3], 0);
    }

    #[tokio::test]
    async fn test_later_regions_draw_over_earlier() {
        let loader = MemoryMaskLoader::new();
        loader.insert("full.png", png_rect(8, 8, 0, 0, 8, 8));
        let compositor = MaskCompositor::new(loader);
        let mut surface = RgbaImage::new(8, 8);
        let regions = vec![region("full.png", "#ff0000"), region("full.png", "#0000ff")];

        compositor
            .composite_masks(&mut surface, &regions, &PassthroughResolver, 1, 0.8)
            .await;

        let center = surface.get_pixel(4, 4);
        assert!(center[2] > center[0], "blue drawn last dominates: {center:?}");
    }

    #[tokio::test]
    async fn test_unresolvable_and_maskless_regions() {
        let compositor = MaskCompositor::new(MemoryMaskLoader::new());
        let mut surface = RgbaImage::new(4, 4);
        let nothing = |_: i64, _: &str| -> Option<String> { None };
        let regions = vec![region("x.png", "#ff0000"), Region::with_bbox([0.0, 0.0, 1.0, 1.0])];

        let report = compositor
            .composite_masks(&mut surface, &regions, &nothing, 1, 0.5)
            .await;

        assert_eq!(report, CompositeReport { skipped: 1, ..Default::default() });
    }

    #[tokio::test]
    async fn test_region_mask_url_is_used_when_resolver_declines() {
        let loader = MemoryMaskLoader::new();
        loader.insert("/api/v1/masks/1/2/3.png", png_rect(4, 4, 0, 0, 4, 4));
        let compositor = MaskCompositor::new(loader);
        let mut surface = RgbaImage::new(4, 4);
        let mut with_url = Region::with_bbox([0.0, 0.0, 4.0, 4.0]);
        with_url.mask_url = Some("/api/v1/masks/1/2/3.png".into());
        let nothing = |_: i64, _: &str| -> Option<String> { None };

        let report = compositor
            .composite_masks(&mut surface, &[with_url], &nothing, 1, 0.5)
            .await;

        assert_eq!(report.drawn, 1);
        let expected = rgb_for(&Region::with_bbox([0.0; 4]));
        let pixel = surface.get_pixel(0, 0);
        assert!(close(pixel[0], expected.r) && close(pixel[1], expected.g) && close(pixel[2], expected.b));
    }
}
