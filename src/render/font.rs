//! Font resolution and caching.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ab_glyph::FontVec;
use dashmap::DashMap;

use crate::render::RenderError;

/// Loaded fonts keyed by resolved path.
///
/// Only successful loads are cached, so a font installed after a failed
/// request is picked up by the next one.
pub struct FontCache {
    fonts_dir: PathBuf,
    fonts: DashMap<PathBuf, Arc<FontVec>>,
}

impl std::fmt::Debug for FontCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontCache")
            .field("fonts_dir", &self.fonts_dir)
            .field("loaded", &self.fonts.len())
            .finish()
    }
}

impl FontCache {
    pub fn new(fonts_dir: impl Into<PathBuf>) -> Self {
        Self {
            fonts_dir: fonts_dir.into(),
            fonts: DashMap::new(),
        }
    }

    pub fn fonts_dir(&self) -> &Path {
        &self.fonts_dir
    }

    /// Map a font reference to a file path. `..` components are refused.
    pub fn resolve(&self, font: &str) -> Result<PathBuf, RenderError> {
        let reference = Path::new(font);
        if font.is_empty() || reference.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(RenderError::FontUnavailable {
                font: font.to_string(),
                reason: "font reference must not be empty or contain '..'".to_string(),
            });
        }

        if reference.is_absolute() {
            Ok(reference.to_path_buf())
        } else {
            Ok(self.fonts_dir.join(reference))
        }
    }

    /// Load (or reuse) the font behind `font`. Blocking file I/O.
    pub fn load(&self, font: &str) -> Result<Arc<FontVec>, RenderError> {
        let path = self.resolve(font)?;
        if let Some(cached) = self.fonts.get(&path) {
            return Ok(Arc::clone(cached.value()));
        }

        let bytes = std::fs::read(&path).map_err(|e| RenderError::FontUnavailable {
            font: font.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        let parsed = FontVec::try_from_vec(bytes).map_err(|_| RenderError::InvalidFont {
            font: font.to_string(),
        })?;

        let parsed = Arc::new(parsed);
        self.fonts.insert(path.clone(), Arc::clone(&parsed));
        tracing::debug!(path = ?path, "Font loaded");
        Ok(parsed)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}
