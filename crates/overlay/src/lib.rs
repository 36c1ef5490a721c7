//! # Detection Overlay Rendering
//!
//! Draws a detection job's results over the photo they came from: bounding boxes in
//! whatever encoding the upstream model produced, per-concept colors, and segmentation
//! masks recolored and outlined on top of the image.
//!
//! ## Core Features
//!
//! - **Box Normalization**: Corner and origin-size encodings resolved against the image size
//! - **Deterministic Colors**: The same concept gets the same color in every view and legend
//! - **Mask Compositing**: Coverage masks tinted, outlined and blended onto one surface
//! - **Pluggable Loaders**: Masks from disk, `data:` URLs, memory, or HTTP (`http` feature)
//! - **Render Scheduling**: Generation-stamped passes so a slow render never overwrites a newer one
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use overlay::{DisplayOptions, FsMaskLoader, JobStoreResolver, MaskCompositor, Sample};
//! use overlay::scheduler::{ImageElement, LayoutRect, OverlayScheduler};
//!
//! # async fn run() -> overlay::Result<()> {
//! let sample = Sample::from_json_file("sample.json")?;
//! let compositor = MaskCompositor::new(FsMaskLoader::new("masks"));
//! let resolver = JobStoreResolver::new("http://localhost:8000");
//!
//! let mut scheduler = OverlayScheduler::new(42, DisplayOptions::default());
//! // Nothing renders until the image has loaded
//! let _ = scheduler.mount_surface();
//! let _ = scheduler.mount_image(ImageElement::default());
//! let _ = scheduler.set_sample(sample);
//!
//! if let Some(pass) = scheduler.on_image_load(1600, 1200, LayoutRect::new(800.0, 600.0)) {
//!     let frame = pass.run(&compositor, &resolver).await;
//!     scheduler.commit(frame);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Legend
//!
//! ```rust
//! use overlay::{legend, Region};
//!
//! let regions = vec![
//!     Region::with_bbox([0.0, 0.0, 10.0, 10.0]).concept(3, "roof").score(0.9),
//!     Region::with_bbox([5.0, 5.0, 10.0, 10.0]).concept(3, "roof").score(0.7),
//! ];
//! let entries = legend(&regions);
//! assert_eq!(entries.len(), 1);
//! assert_eq!(entries[0].count, 2);
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod traits;
pub mod algorithms;
pub mod bbox;
pub mod color;
pub mod config;
pub mod loader;
pub mod compositor;
pub mod demo;
pub mod vector;
pub mod scheduler;
pub mod runtime;

// Re-exports for convenience
pub use error::{OverlayError, Result};
pub use types::{BBoxComponent, BoxEncoding, NormalizedBox, Region, Sample};
pub use traits::*;
pub use algorithms::*;
pub use bbox::{normalize, normalize_region};
pub use color::{color_for, legend, LegendEntry, Rgb};
pub use config::{DisplayOptions, MaskSource, OverlayConfig};
pub use loader::*;
pub use compositor::{CompositeReport, CompositorConfig, MaskCompositor, ResampleFilter};
pub use demo::{build_demo_regions, display_regions};
pub use vector::{VectorLayer, VectorShape};
pub use scheduler::{CommitOutcome, OverlayScheduler, RenderPass, RenderedFrame, ViewEvent};
pub use runtime::{OverlayHandle, OverlayRuntime};
