//! When to render.
//!
//! The view state (mounts, sample, display options, measured size) lives in
//! [`OverlayScheduler`]. Every trigger marks it dirty and funnels into
//! [`OverlayScheduler::schedule_render`], which either no-ops or hands back a
//! [`RenderPass`] snapshot stamped with a fresh generation. Passes run asynchronously and
//! come back through [`OverlayScheduler::commit`], which drops anything older than the
//! latest generation so a slow pass can never overwrite a newer frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tracing::debug;

use crate::compositor::{CompositeReport, MaskCompositor};
use crate::config::DisplayOptions;
use crate::demo::display_regions;
use crate::traits::{MaskLoader, MaskResolver};
use crate::types::{Region, Sample};
use crate::vector::VectorLayer;

/// Largest surface side in pixels
pub const MAX_SURFACE_SIDE: u32 = 16_384;

/// On-screen size of the image element, in CSS-like pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutRect {
    pub width: f32,
    pub height: f32,
}

impl LayoutRect {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Whole-pixel size, `None` while hidden, not laid out, or not finite.
    /// Each side is capped at [`MAX_SURFACE_SIDE`].
    pub fn pixel_size(&self) -> Option<(u32, u32)> {
        let width = self.width.round();
        let height = self.height.round();
        if !(width.is_finite() && height.is_finite() && width >= 1.0 && height >= 1.0) {
            return None;
        }
        let cap = MAX_SURFACE_SIDE as f32;
        Some((width.min(cap) as u32, height.min(cap) as u32))
    }
}

/// The base photo as the view sees it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImageElement {
    /// Natural size, known once the image has loaded
    pub natural: Option<(u32, u32)>,
    pub rect: LayoutRect,
}

/// The drawing surface and the frame last committed to it
#[derive(Debug, Clone, Default)]
pub struct Surface {
    frame: Option<Arc<RenderedFrame>>,
}

impl Surface {
    pub fn frame(&self) -> Option<&Arc<RenderedFrame>> {
        self.frame.as_ref()
    }
}

/// Image element plus drawing surface; either may be missing while the view mounts
#[derive(Debug, Clone, Default)]
pub struct RenderTarget {
    pub image: Option<ImageElement>,
    pub surface: Option<Surface>,
}

/// Generation stamp carried by a render pass
#[derive(Debug, Clone)]
pub struct RenderTicket {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl RenderTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once a newer pass has been scheduled or the view unmounted
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RenderTrigger {
    Mounted,
    ImageLoaded,
    Resized,
    RegionsChanged,
    OptionsChanged,
}

/// Inputs to the scheduler, as a view would emit them
#[derive(Debug, Clone)]
pub enum ViewEvent {
    MountImage(ImageElement),
    MountSurface,
    Unmount,
    ImageLoaded {
        natural_width: u32,
        natural_height: u32,
        rect: LayoutRect,
    },
    Resized(LayoutRect),
    SetSample(Sample),
    SetShowBoxes(bool),
    SetShowMasks(bool),
    SetOpacity(f32),
    SetDemo(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// A newer pass was scheduled after this one started
    Stale { generation: u64, latest: u64 },
    /// The surface went away while the pass was running
    Unmounted,
}

pub struct OverlayScheduler {
    job_id: i64,
    target: RenderTarget,
    sample: Option<Arc<Sample>>,
    options: DisplayOptions,
    dirty: bool,
    pending: Option<RenderTrigger>,
    latest: Arc<AtomicU64>,
}

impl OverlayScheduler {
    pub fn new(job_id: i64, options: DisplayOptions) -> Self {
        Self {
            job_id,
            target: RenderTarget::default(),
            sample: None,
            options: options.sanitized(),
            dirty: false,
            pending: None,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn options(&self) -> &DisplayOptions {
        &self.options
    }

    pub fn sample(&self) -> Option<&Sample> {
        self.sample.as_deref()
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Latest generation handed out
    pub fn generation(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    /// Frame currently on the surface
    pub fn current_frame(&self) -> Option<&Arc<RenderedFrame>> {
        self.target.surface.as_ref().and_then(Surface::frame)
    }

    #[must_use = "a dropped render pass is never drawn"]
    pub fn mount_image(&mut self, image: ImageElement) -> Option<RenderPass> {
        self.target.image = Some(image);
        self.invalidate(RenderTrigger::Mounted)
    }

    #[must_use = "a dropped render pass is never drawn"]
    pub fn mount_surface(&mut self) -> Option<RenderPass> {
        if self.target.surface.is_none() {
            self.target.surface = Some(Surface::default());
        }
        self.invalidate(RenderTrigger::Mounted)
    }

    /// Detach both mounts; in-flight passes become stale
    pub fn unmount(&mut self) {
        self.target = RenderTarget::default();
        self.latest.fetch_add(1, Ordering::AcqRel);
        self.dirty = true;
    }

    #[must_use = "a dropped render pass is never drawn"]
    pub fn on_image_load(&mut self, natural_width: u32, natural_height: u32, rect: LayoutRect) -> Option<RenderPass> {
        let image = self.target.image.get_or_insert_with(ImageElement::default);
        image.natural = Some((natural_width, natural_height));
        image.rect = rect;
        self.invalidate(RenderTrigger::ImageLoaded)
    }

    #[must_use = "a dropped render pass is never drawn"]
    pub fn on_resize(&mut self, rect: LayoutRect) -> Option<RenderPass> {
        match self.target.image.as_mut() {
            Some(image) if image.rect == rect => None,
            Some(image) => {
                image.rect = rect;
                self.invalidate(RenderTrigger::Resized)
            }
            None => None,
        }
    }

    /// Replace the sample wholesale
    #[must_use = "a dropped render pass is never drawn"]
    pub fn set_sample(&mut self, sample: Sample) -> Option<RenderPass> {
        if self.sample.as_deref() == Some(&sample) {
            return None;
        }
        self.sample = Some(Arc::new(sample));
        self.invalidate(RenderTrigger::RegionsChanged)
    }

    #[must_use = "a dropped render pass is never drawn"]
    pub fn set_show_boxes(&mut self, show: bool) -> Option<RenderPass> {
        self.update_options(|o| o.show_boxes = show)
    }

    #[must_use = "a dropped render pass is never drawn"]
    pub fn set_show_masks(&mut self, show: bool) -> Option<RenderPass> {
        self.update_options(|o| o.show_masks = show)
    }

    /// Set the mask fill opacity, clamped to `0.1..=0.8`
    #[must_use = "a dropped render pass is never drawn"]
    pub fn set_opacity(&mut self, opacity: f32) -> Option<RenderPass> {
        let opacity = DisplayOptions::clamp_opacity(opacity);
        self.update_options(|o| o.opacity = opacity)
    }

    #[must_use = "a dropped render pass is never drawn"]
    pub fn set_demo(&mut self, demo: bool) -> Option<RenderPass> {
        self.update_options(|o| o.demo = demo)
    }

    /// Route a view event to the matching setter or trigger
    #[must_use = "a dropped render pass is never drawn"]
    pub fn apply(&mut self, event: ViewEvent) -> Option<RenderPass> {
        match event {
            ViewEvent::MountImage(image) => self.mount_image(image),
            ViewEvent::MountSurface => self.mount_surface(),
            ViewEvent::Unmount => {
                self.unmount();
                None
            }
            ViewEvent::ImageLoaded {
                natural_width,
                natural_height,
                rect,
            } => self.on_image_load(natural_width, natural_height, rect),
            ViewEvent::Resized(rect) => self.on_resize(rect),
            ViewEvent::SetSample(sample) => self.set_sample(sample),
            ViewEvent::SetShowBoxes(show) => self.set_show_boxes(show),
            ViewEvent::SetShowMasks(show) => self.set_show_masks(show),
            ViewEvent::SetOpacity(opacity) => self.set_opacity(opacity),
            ViewEvent::SetDemo(demo) => self.set_demo(demo),
        }
    }

    /// Start a render pass if the view is dirty and ready.
    ///
    /// Silently does nothing while the image or surface is unmounted, the image has not
    /// loaded, or the measured rect is empty; the dirty flag survives so the next trigger
    /// picks the work up.
    #[must_use = "a dropped render pass is never drawn"]
    pub fn schedule_render(&mut self) -> Option<RenderPass> {
        if !self.dirty {
            return None;
        }
        self.target.surface.as_ref()?;
        let image = self.target.image?;
        let (natural_width, natural_height) = image.natural?;
        let (width, height) = image.rect.pixel_size()?;

        let regions: Vec<Region> = match &self.sample {
            Some(sample) => display_regions(
                &sample.regions,
                self.options.demo,
                natural_width,
                natural_height,
                self.options.demo_count,
            )
            .into_owned(),
            None => Vec::new(),
        };

        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        let trigger = self.pending.take().unwrap_or(RenderTrigger::OptionsChanged);
        self.dirty = false;
        debug!(generation, %trigger, width, height, regions = regions.len(), "render scheduled");

        Some(RenderPass {
            ticket: RenderTicket {
                generation,
                latest: Arc::clone(&self.latest),
            },
            trigger,
            job_id: self.job_id,
            width,
            height,
            natural_width,
            natural_height,
            regions,
            options: self.options,
        })
    }

    /// Put a finished frame on the surface unless something newer has been scheduled
    pub fn commit(&mut self, frame: RenderedFrame) -> CommitOutcome {
        let latest = self.generation();
        if frame.generation != latest {
            debug!(generation = frame.generation, latest, "discarding stale frame");
            return CommitOutcome::Stale {
                generation: frame.generation,
                latest,
            };
        }
        match self.target.surface.as_mut() {
            Some(surface) => {
                surface.frame = Some(Arc::new(frame));
                CommitOutcome::Applied
            }
            None => CommitOutcome::Unmounted,
        }
    }

    fn update_options(&mut self, update: impl FnOnce(&mut DisplayOptions)) -> Option<RenderPass> {
        let before = self.options;
        update(&mut self.options);
        if self.options == before {
            return None;
        }
        self.invalidate(RenderTrigger::OptionsChanged)
    }

    fn invalidate(&mut self, trigger: RenderTrigger) -> Option<RenderPass> {
        self.dirty = true;
        self.pending = Some(trigger);
        self.schedule_render()
    }
}

/// Snapshot of everything one render needs, detached from the scheduler
#[derive(Debug, Clone)]
#[must_use = "a render pass does nothing until it is run and committed"]
pub struct RenderPass {
    ticket: RenderTicket,
    pub trigger: RenderTrigger,
    pub job_id: i64,
    /// Surface size in pixels
    pub width: u32,
    pub height: u32,
    pub natural_width: u32,
    pub natural_height: u32,
    pub regions: Vec<Region>,
    pub options: DisplayOptions,
}

impl RenderPass {
    pub fn generation(&self) -> u64 {
        self.ticket.generation
    }

    pub fn ticket(&self) -> &RenderTicket {
        &self.ticket
    }

    /// Composite masks offscreen and build the box layer
    pub async fn run<L, R>(self, compositor: &MaskCompositor<L>, resolver: &R) -> RenderedFrame
    where
        L: MaskLoader,
        R: MaskResolver + ?Sized,
    {
        let mut mask_layer = RgbaImage::new(self.width, self.height);
        let report = if self.options.show_masks {
            compositor
                .composite_masks_until(
                    &mut mask_layer,
                    &self.regions,
                    resolver,
                    self.job_id,
                    self.options.opacity,
                    &self.ticket,
                )
                .await
        } else {
            CompositeReport::default()
        };

        let vector = self
            .options
            .show_boxes
            .then(|| VectorLayer::build(&self.regions, self.natural_width, self.natural_height));

        RenderedFrame {
            generation: self.ticket.generation,
            width: self.width,
            height: self.height,
            mask_layer,
            vector,
            report,
        }
    }
}

/// Output of one render pass
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub generation: u64,
    pub width: u32,
    pub height: u32,
    /// Composited mask fills and outlines at surface size
    pub mask_layer: RgbaImage,
    /// Boxes and labels in natural coordinates, when boxes are shown
    pub vector: Option<VectorLayer>,
    pub report: CompositeReport,
}

impl RenderedFrame {
    /// Flatten base photo, masks and boxes into one image at surface size
    pub fn flatten(&self, base: &RgbaImage) -> RgbaImage {
        let mut out = if base.dimensions() == (self.width, self.height) {
            base.clone()
        } else {
            imageops::resize(base, self.width, self.height, FilterType::Triangle)
        };
        imageops::overlay(&mut out, &self.mask_layer, 0, 0);
        if let Some(vector) = &self.vector {
            imageops::overlay(&mut out, &vector.rasterize(self.width, self.height), 0, 0);
        }
        out
    }
}
