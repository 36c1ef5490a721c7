use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use overlay::scheduler::{ImageElement, LayoutRect};
use overlay::{
    DisplayOptions, MaskResolver, OverlayConfig, OverlayError, OverlayScheduler,
    PassthroughResolver, RenderedFrame, Sample,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ImageError(#[from] image::ImageError),
    #[error(transparent)]
    OverlayError(#[from] OverlayError),
    #[error("Image has no pixels: {0}")]
    EmptyImage(String),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// One photo plus the sample describing its detections
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RenderJob {
    pub name: String,
    pub image: String,
    /// Sample JSON file
    pub sample: String,
    /// Overrides the manifest's job id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    /// Overrides the manifest's display options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayOptions>,
}

/// Batch of renders, loadable from TOML or JSON
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RenderManifest {
    pub output_dir: String,
    #[serde(default)]
    pub job_id: i64,
    /// Rendered width in pixels; natural size when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Also write each box layer as SVG
    #[serde(default)]
    pub svg: bool,
    #[serde(default)]
    pub config: OverlayConfig,
    pub jobs: Vec<RenderJob>,
}

impl RenderManifest {
    /// Load a manifest from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let manifest: RenderManifest = toml::from_str(content)?;
        Ok(manifest)
    }

    /// Load a manifest from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CliError> {
        let manifest: RenderManifest = serde_json::from_str(content)?;
        Ok(manifest)
    }

    /// Auto-detect file format and load the manifest
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// `{output_dir}/{name}.png`
    pub fn output_path(&self, job: &RenderJob) -> PathBuf {
        Path::new(&self.output_dir).join(format!("{}.png", job.name))
    }

    pub fn display_for(&self, job: &RenderJob) -> DisplayOptions {
        job.display.unwrap_or(self.config.display).sanitized()
    }
}

/// Result of rendering one photo
pub struct Rendered {
    pub image: RgbaImage,
    pub frame: RenderedFrame,
}

/// Render one photo with its overlays through the scheduler, offscreen.
///
/// `width` scales the output; the height follows the photo's aspect ratio.
pub async fn render_image(
    config: &OverlayConfig,
    photo: RgbaImage,
    sample: Sample,
    job_id: i64,
    display: DisplayOptions,
    width: Option<u32>,
) -> Result<Rendered, CliError> {
    let (natural_width, natural_height) = photo.dimensions();
    if natural_width == 0 || natural_height == 0 {
        return Err(CliError::EmptyImage(format!("sample {}", sample.image_id)));
    }
    let rect = match width {
        Some(width) => LayoutRect::new(
            width as f32,
            (natural_height as f32 * width as f32 / natural_width as f32).max(1.0),
        ),
        None => LayoutRect::new(natural_width as f32, natural_height as f32),
    };

    let compositor = config.build_compositor();
    let (_, job_store) = config.mask_stack();
    let resolver: Box<dyn MaskResolver> = match job_store {
        Some(resolver) => Box::new(resolver),
        None => Box::new(PassthroughResolver),
    };

    // The image mount is the last readiness step, so it hands back the pass.
    let mut scheduler = OverlayScheduler::new(job_id, display);
    let _ = scheduler.mount_surface();
    let _ = scheduler.set_sample(sample);
    let pass = scheduler
        .mount_image(ImageElement {
            natural: Some((natural_width, natural_height)),
            rect,
        })
        .or_else(|| scheduler.schedule_render());
    let frame = match pass {
        Some(pass) => pass.run(&compositor, resolver.as_ref()).await,
        None => return Err(CliError::EmptyImage(format!("{}x{}", rect.width, rect.height))),
    };

    let image = frame.flatten(&photo);
    Ok(Rendered { image, frame })
}
