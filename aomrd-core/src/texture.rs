//! In-memory RGBA texture grid shared by every pipeline stage.

use crate::image_loading::LoadedImage;
use crate::Result;
use image::{ImageBuffer, RgbaImage};
use std::path::PathBuf;

/// A texture with resolution and 8-bit RGBA pixel data
#[derive(Debug, Clone, PartialEq)]
pub struct TextureMap {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// RGBA pixel data (4 bytes per pixel, row-major)
    pub data: Vec<u8>,
    /// Source path when loaded from file
    pub path: Option<PathBuf>,
}

impl TextureMap {
    pub fn from_loaded(image: LoadedImage, path: Option<PathBuf>) -> Self {
        Self {
            width: image.width,
            height: image.height,
            data: image.data,
            path,
        }
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
            path: None,
        }
    }

    /// A texture where every pixel has the same RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(count * 4);
        for _ in 0..count {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
            path: None,
        }
    }

    /// Build a greyscale texture (R=G=B=value, A=255) from a single-channel field.
    pub fn from_greyscale(width: u32, height: u32, values: &[u8]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 4);
        for &v in values {
            data.extend_from_slice(&[v, v, v, 255]);
        }
        Self {
            width,
            height,
            data,
            path: None,
        }
    }

    /// Copy into an `image` buffer, validating the data length.
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        ImageBuffer::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| crate::Error::Other("Invalid texture dimensions".into()))
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Get pixel at (x, y) as [R, G, B, A]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        if i + 4 > self.data.len() {
            return None;
        }
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(4)
    }

    pub fn is_square(&self, size: u32) -> bool {
        self.width == size && self.height == size
    }
}

/// Clamp to [0, 255] and round half to even, matching 8-bit canvas storage.
#[inline]
pub fn clamp_to_u8(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 255.0).round_ties_even() as u8
}
