//! PNG rendering of text onto a fixed-size canvas.
//!
//! # Responsibilities
//! - Validate a render request against the configured limits
//! - Resolve and cache fonts
//! - Rasterize text and encode the canvas as PNG
//!
//! # Design Decisions
//! - Pure function of the spec and the font bytes; identical specs produce
//!   identical bytes within a process
//! - Synchronous; callers run it on the blocking pool
//! - Font size is capped at the canvas height and off-canvas glyphs are
//!   skipped, so render time is bounded by the canvas
//! - Font and limit problems are the endpoint author's fault (500), text
//!   problems are the caller's (400)

pub mod canvas;
pub mod font;

use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::RenderConfig;
use crate::observability::metrics;

pub use font::FontCache;

/// Everything needed to draw one image.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSpec {
    pub text: String,
    /// Font file, absolute or relative to the fonts directory.
    pub font: String,
    pub width: u32,
    pub height: u32,
    pub font_size: f32,
    pub foreground: [u8; 4],
    pub background: [u8; 4],
    pub padding: u32,
    /// Overrides the configured text limit when set.
    pub max_text_len: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("font '{font}' is unavailable: {reason}")]
    FontUnavailable { font: String, reason: String },

    #[error("font '{font}' is not a valid TrueType/OpenType font")]
    InvalidFont { font: String },

    #[error("canvas {width}x{height} is outside the allowed 1x1 to {max_width}x{max_height}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("font size {size} must be a positive number no larger than {max}")]
    InvalidFontSize { size: f32, max: u32 },

    #[error("text is {len} characters long, limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("text contains control character {found:?} at position {position}")]
    InvalidText { position: usize, found: char },

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

impl RenderError {
    /// Whether the request text, rather than the endpoint, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RenderError::TextTooLong { .. } | RenderError::InvalidText { .. }
        )
    }
}

/// Renderer shared by all image endpoints.
#[derive(Debug, Clone)]
pub struct ImageRenderer {
    fonts: Arc<FontCache>,
    limits: RenderConfig,
}

impl ImageRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            fonts: Arc::new(FontCache::new(config.fonts_dir.clone())),
            limits: config.clone(),
        }
    }

    pub fn fonts(&self) -> &FontCache {
        &self.fonts
    }

    /// Render `spec` to PNG bytes. Blocking.
    pub fn render(&self, spec: &RenderSpec) -> Result<Vec<u8>, RenderError> {
        let result = self.check(spec).and_then(|_| {
            let font = self.fonts.load(&spec.font)?;
            canvas::rasterize(&font, spec)
        });

        metrics::record_render(result.is_ok());
        match &result {
            Ok(png) => tracing::debug!(
                width = spec.width,
                height = spec.height,
                bytes = png.len(),
                "Image rendered"
            ),
            Err(e) => tracing::warn!(font = %spec.font, error = %e, "Image render failed"),
        }
        result
    }

    fn check(&self, spec: &RenderSpec) -> Result<(), RenderError> {
        let RenderConfig {
            max_width,
            max_height,
            max_text_len,
            ..
        } = self.limits;

        if spec.width == 0 || spec.height == 0 || spec.width > max_width || spec.height > max_height
        {
            return Err(RenderError::InvalidDimensions {
                width: spec.width,
                height: spec.height,
                max_width,
                max_height,
            });
        }
        // glyph outlines scale with the square of the size, so the canvas bounds it
        if !(spec.font_size.is_finite()
            && spec.font_size > 0.0
            && spec.font_size <= spec.height as f32)
        {
            return Err(RenderError::InvalidFontSize {
                size: spec.font_size,
                max: spec.height,
            });
        }

        let max = spec.max_text_len.unwrap_or(max_text_len);
        let len = spec.text.chars().count();
        if len > max {
            return Err(RenderError::TextTooLong { len, max });
        }
        if let Some((position, found)) = spec
            .text
            .chars()
            .enumerate()
            .find(|(_, c)| c.is_control() && *c != '\n')
        {
            return Err(RenderError::InvalidText { position, found });
        }
        Ok(())
    }
}
