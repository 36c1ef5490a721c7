use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::compositor::{CompositorConfig, MaskCompositor};
use crate::error::{OverlayError, Result};
use crate::loader::{JobStoreResolver, SchemeLoader};

pub const MIN_OPACITY: f32 = 0.1;
pub const MAX_OPACITY: f32 = 0.8;

/// Caller-controlled display switches
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DisplayOptions {
    pub show_boxes: bool,
    pub show_masks: bool,
    /// Mask fill opacity, kept within 0.1..=0.8
    #[schemars(range(min = 0.1, max = 0.8))]
    pub opacity: f32,
    /// Synthesize placeholder regions when a sample has none
    pub demo: bool,
    /// Number of placeholder regions per image
    #[schemars(range(min = 1, max = 12))]
    pub demo_count: usize,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_boxes: true,
            show_masks: true,
            opacity: 0.45,
            demo: false,
            demo_count: 3,
        }
    }
}

impl DisplayOptions {
    pub fn clamp_opacity(opacity: f32) -> f32 {
        if opacity.is_nan() {
            return MIN_OPACITY;
        }
        opacity.clamp(MIN_OPACITY, MAX_OPACITY)
    }

    /// Copy with every field inside its documented range
    pub fn sanitized(mut self) -> Self {
        self.opacity = Self::clamp_opacity(self.opacity);
        self
    }
}

/// Where mask resources come from
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MaskSource {
    /// Local directory that relative mask references are joined onto
    pub root: Option<PathBuf>,
    /// Job store base URL; when set, references resolve to its mask endpoint
    pub base_url: Option<String>,
}

/// Overlay engine configuration, loadable from TOML or JSON
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OverlayConfig {
    pub display: DisplayOptions,
    pub compositor: CompositorConfig,
    pub masks: MaskSource,
}

impl OverlayConfig {
    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: OverlayConfig = toml::from_str(content)?;
        Ok(config.sanitized())
    }

    /// Load configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let config: OverlayConfig = serde_json::from_str(content)?;
        Ok(config.sanitized())
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = || fs::read_to_string(path);
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content()?),
            Some("json") => Self::from_json(&content()?),
            _ => Err(OverlayError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// JSON schema of the configuration file
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(OverlayConfig)
    }

    /// Loader and resolver described by the `[masks]` section
    pub fn mask_stack(&self) -> (SchemeLoader, Option<JobStoreResolver>) {
        let loader = match &self.masks.root {
            Some(root) => SchemeLoader::with_root(root),
            None => SchemeLoader::default(),
        };
        let resolver = self.masks.base_url.as_deref().map(JobStoreResolver::new);
        (loader, resolver)
    }

    /// Compositor over the configured loader
    pub fn build_compositor(&self) -> MaskCompositor<SchemeLoader> {
        let (loader, _) = self.mask_stack();
        MaskCompositor::with_config(loader, self.compositor)
    }

    fn sanitized(mut self) -> Self {
        self.display = self.display.sanitized();
        self
    }
}
