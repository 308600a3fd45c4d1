//! Luminance extraction.
//!
//! Luminance here is the plain mean of R, G and B. It is not perceptual luma;
//! every transfer curve downstream is tuned against this average.

use crate::texture::TextureMap;

/// Unweighted channel average. Alpha is ignored.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    (r as f64 + g as f64 + b as f64) / 3.0
}

/// Per-pixel luminance of a texture at its native resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct LuminanceField {
    pub width: u32,
    pub height: u32,
    values: Vec<f64>,
}

impl LuminanceField {
    pub fn from_texture(texture: &TextureMap) -> Self {
        let values = texture
            .pixels()
            .map(|p| luminance(p[0], p[1], p[2]))
            .collect();
        Self {
            width: texture.width,
            height: texture.height,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read luminance at signed coordinates, clamping to the nearest edge pixel.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> f64 {
        let px = x.clamp(0, self.width as i64 - 1) as usize;
        let py = y.clamp(0, self.height as i64 - 1) as usize;
        self.values[py * self.width as usize + px]
    }

    /// Map every luminance value through `f`, producing an 8-bit field.
    pub fn map<F>(&self, f: F) -> Vec<u8>
    where
        F: Fn(f64) -> u8,
    {
        self.values.iter().map(|&l| f(l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luminance_is_plain_average() {
        assert_eq!(luminance(255, 0, 0), 85.0);
        assert_eq!(luminance(10, 20, 30), 20.0);
        assert!((luminance(1, 1, 2) - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn alpha_does_not_affect_field() {
        let opaque = TextureMap::filled(2, 2, [30, 60, 90, 255]);
        let clear = TextureMap::filled(2, 2, [30, 60, 90, 0]);
        assert_eq!(
            LuminanceField::from_texture(&opaque),
            LuminanceField::from_texture(&clear)
        );
    }

    #[test]
    fn clamped_reads_never_wrap() {
        let tex = TextureMap::from_greyscale(3, 1, &[0, 100, 200]);
        let field = LuminanceField::from_texture(&tex);
        assert_eq!(field.get_clamped(-1, 0), 0.0);
        assert_eq!(field.get_clamped(3, 0), 200.0);
        assert_eq!(field.get_clamped(1, -5), 100.0);
        assert_eq!(field.get_clamped(1, 7), 100.0);
    }
}
