//! Tangent-space normal map reconstruction from luminance.
//!
//! A 3x3 Sobel kernel estimates the gradient at each pixel, with reads past
//! the border clamped to the edge. The gradient is scaled by `strength` and
//! combined with a fixed Z of 128 before normalization:
//!
//! ```text
//! R = (nx / len * 0.5 + 0.5) * 255
//! G = (ny / len * 0.5 + 0.5) * 255
//! B = (nz / len) * 255
//! ```
//!
//! Output follows the DirectX convention (green grows with +Y in image space).

use crate::luminance::LuminanceField;
use crate::texture::{clamp_to_u8, TextureMap};

/// Gradient gain applied before normalization.
pub const DEFAULT_STRENGTH: f64 = 1.5;

/// Fixed Z component of the unnormalized normal.
pub const FLAT_Z: f64 = 128.0;

#[derive(Debug, Clone, Copy)]
pub struct NormalMapSynthesizer {
    strength: f64,
}

impl Default for NormalMapSynthesizer {
    fn default() -> Self {
        Self {
            strength: DEFAULT_STRENGTH,
        }
    }
}

impl NormalMapSynthesizer {
    /// Sobel gradient (dx, dy) at (x, y) with clamped border sampling.
    pub fn gradient(field: &LuminanceField, x: u32, y: u32) -> (f64, f64) {
        let (x, y) = (x as i64, y as i64);
        let l = |ox: i64, oy: i64| field.get_clamped(x + ox, y + oy);

        let tl = l(-1, -1);
        let t = l(0, -1);
        let tr = l(1, -1);
        let ml = l(-1, 0);
        let mr = l(1, 0);
        let bl = l(-1, 1);
        let b = l(0, 1);
        let br = l(1, 1);

        let dx = (tr + 2.0 * mr + br) - (tl + 2.0 * ml + bl);
        let dy = (bl + 2.0 * b + br) - (tl + 2.0 * t + tr);
        (dx, dy)
    }

    /// Encode one gradient as an RGBA normal.
    pub fn encode(&self, dx: f64, dy: f64) -> [u8; 4] {
        let nx = dx * self.strength;
        let ny = dy * self.strength;
        let nz = FLAT_Z;
        let len = (nx * nx + ny * ny + nz * nz).sqrt();

        [
            clamp_to_u8((nx / len * 0.5 + 0.5) * 255.0),
            clamp_to_u8((ny / len * 0.5 + 0.5) * 255.0),
            clamp_to_u8((nz / len) * 255.0),
            255,
        ]
    }

    pub fn synthesize(&self, field: &LuminanceField) -> TextureMap {
        let mut data = Vec::with_capacity(field.len() * 4);
        for y in 0..field.height {
            for x in 0..field.width {
                let (dx, dy) = Self::gradient(field, x, y);
                data.extend_from_slice(&self.encode(dx, dy));
            }
        }
        TextureMap {
            width: field.width,
            height: field.height,
            data,
            path: None,
        }
    }
}
