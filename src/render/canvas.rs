//! Text rasterization onto an RGBA canvas and PNG encoding.

use std::io::Cursor;

use ab_glyph::{point, Font, FontVec, PxScale, Rect, ScaleFont};
use image::{ImageFormat, RgbaImage};

use crate::render::{RenderError, RenderSpec};

/// Draw `spec.text` with `font` and return the encoded PNG.
///
/// Lines are left-aligned at the padding and break on `\n` only. Glyphs
/// falling outside the canvas are clipped; glyphs entirely outside it are
/// never drawn, so the work done is bounded by the canvas area.
pub(crate) fn rasterize(font: &FontVec, spec: &RenderSpec) -> Result<Vec<u8>, RenderError> {
    let mut canvas =
        RgbaImage::from_pixel(spec.width, spec.height, image::Rgba(spec.background));

    let scale = PxScale::from(spec.font_size);
    let scaled = font.as_scaled(scale);
    let line_advance = scaled.height() + scaled.line_gap();
    let left = spec.padding as f32;
    let right = spec.width as f32;
    let bottom = spec.height as f32;
    let mut baseline = spec.padding as f32 + scaled.ascent();

    for line in spec.text.split('\n') {
        if baseline - scaled.ascent() >= bottom {
            break;
        }
        let mut caret = left;
        let mut previous = None;

        for c in line.chars() {
            if caret >= right {
                break;
            }
            let id = scaled.glyph_id(c);
            if let Some(prev) = previous {
                caret += scaled.kern(prev, id);
            }
            let glyph = id.with_scale_and_position(scale, point(caret, baseline));
            caret += scaled.h_advance(id);
            previous = Some(id);

            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            if !visible(bounds, spec.width, spec.height) {
                continue;
            }
            outlined.draw(|x, y, coverage| {
                let px = bounds.min.x as i64 + x as i64;
                let py = bounds.min.y as i64 + y as i64;
                if px < 0 || py < 0 || px >= spec.width as i64 || py >= spec.height as i64 {
                    return;
                }
                let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                pixel.0 = blend(pixel.0, spec.foreground, coverage);
            });
        }

        baseline += line_advance;
    }

    encode(&canvas)
}

/// Whether any pixel of `bounds` lands on a `width` x `height` canvas.
fn visible(bounds: Rect, width: u32, height: u32) -> bool {
    bounds.max.x > 0.0
        && bounds.max.y > 0.0
        && bounds.min.x < width as f32
        && bounds.min.y < height as f32
}

/// Source-over blend of `fg` at `coverage` onto `dst`.
fn blend(dst: [u8; 4], fg: [u8; 4], coverage: f32) -> [u8; 4] {
    let alpha = coverage.clamp(0.0, 1.0) * (fg[3] as f32 / 255.0);
    let mix = |src: u8, dst: u8| (src as f32 * alpha + dst as f32 * (1.0 - alpha)).round() as u8;
    [
        mix(fg[0], dst[0]),
        mix(fg[1], dst[1]),
        mix(fg[2], dst[2]),
        (alpha * 255.0 + dst[3] as f32 * (1.0 - alpha)).round() as u8,
    ]
}

fn encode(canvas: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut out = Cursor::new(Vec::new());
    canvas
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}
