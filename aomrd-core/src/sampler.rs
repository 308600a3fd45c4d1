//! Image sampling capability.
//!
//! The numeric pipeline never touches a decoder or resizer directly; it goes
//! through [`ImageSampler`] so the same code runs headless in batch jobs and
//! tests. [`FilteredSampler`] is the default implementation on top of the
//! `image` crate.

use crate::image_loading::{DecodeError, ImageLoader};
use crate::texture::TextureMap;
use crate::Result;
use image::imageops::FilterType;

/// Decode bytes into a pixel grid and resample grids to a new size.
pub trait ImageSampler: Send + Sync {
    /// Decode encoded image bytes into an RGBA grid.
    fn load(&self, bytes: &[u8]) -> std::result::Result<TextureMap, DecodeError>;

    /// Resample `grid` to exactly `width` x `height`.
    fn resample(&self, grid: &TextureMap, width: u32, height: u32) -> Result<TextureMap>;
}

/// Smooth resampling via `image::imageops::resize`.
///
/// The default triangle filter is bilinear when upscaling and widens its
/// support when downscaling, so both directions keep gradients without
/// aliasing. Reads past the border clamp to the edge pixel.
#[derive(Debug, Clone, Copy)]
pub struct FilteredSampler {
    filter: FilterType,
}

impl Default for FilteredSampler {
    fn default() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }
}

impl FilteredSampler {
    /// Use a different smooth filter. Nearest-neighbour is rejected and
    /// falls back to the triangle filter.
    pub fn with_filter(filter: FilterType) -> Self {
        let filter = match filter {
            FilterType::Nearest => FilterType::Triangle,
            other => other,
        };
        Self { filter }
    }
}

impl ImageSampler for FilteredSampler {
    fn load(&self, bytes: &[u8]) -> std::result::Result<TextureMap, DecodeError> {
        ImageLoader::load_from_memory(bytes).map(|img| TextureMap::from_loaded(img, None))
    }

    fn resample(&self, grid: &TextureMap, width: u32, height: u32) -> Result<TextureMap> {
        if width == 0 || height == 0 || grid.width == 0 || grid.height == 0 {
            return Err(crate::Error::Other(format!(
                "Cannot resample {}x{} texture to {}x{}",
                grid.width, grid.height, width, height
            )));
        }
        if grid.width == width && grid.height == height {
            return Ok(grid.clone());
        }

        let img = grid.to_rgba_image()?;
        let resized = image::imageops::resize(&img, width, height, self.filter);
        tracing::trace!(
            from_w = grid.width,
            from_h = grid.height,
            to_w = width,
            to_h = height,
            "resampled texture"
        );

        let mut out = TextureMap::from_rgba_image(resized);
        out.path = grid.path.clone();
        Ok(out)
    }
}

/// Dimensions that fit `width` x `height` inside `max_dim` on the longest
/// edge, preserving aspect ratio. Images already inside the bound are kept.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width <= max_dim && height <= max_dim {
        return (width, height);
    }

    let scale = if width >= height {
        max_dim as f64 / width as f64
    } else {
        max_dim as f64 / height as f64
    };

    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);

    (new_width.min(max_dim), new_height.min(max_dim))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> TextureMap {
        let img = image::RgbaImage::from_fn(w, h, |x, _| {
            let v = ((x as f32 / (w - 1).max(1) as f32) * 255.0) as u8;
            image::Rgba([v, v, v, 255])
        });
        TextureMap::from_rgba_image(img)
    }

    #[test]
    fn resample_same_size_is_identity() {
        let tex = gradient(8, 8);
        let out = FilteredSampler::default().resample(&tex, 8, 8).unwrap();
        assert_eq!(out, tex);
    }

    #[test]
    fn resample_non_square_to_square() {
        let tex = gradient(64, 16);
        let out = FilteredSampler::default().resample(&tex, 32, 32).unwrap();
        assert_eq!((out.width, out.height), (32, 32));
        assert_eq!(out.data.len(), 32 * 32 * 4);
    }

    #[test]
    fn upscaling_is_smooth_not_nearest() {
        // Two-pixel black/white image upscaled to 8 must produce intermediate greys.
        let img = image::RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        let tex = TextureMap::from_rgba_image(img);
        let out = FilteredSampler::default().resample(&tex, 8, 1).unwrap();
        let intermediates = out
            .pixels()
            .filter(|p| p[0] > 0 && p[0] < 255)
            .count();
        assert!(intermediates >= 2, "expected blended pixels, got {:?}", out.data);
    }

    #[test]
    fn nearest_filter_is_replaced_with_triangle() {
        assert_eq!(FilteredSampler::with_filter(FilterType::Nearest).filter, FilterType::Triangle);
        assert_eq!(FilteredSampler::with_filter(FilterType::CatmullRom).filter, FilterType::CatmullRom);

        let tex = TextureMap::from_greyscale(2, 1, &[0, 255]);
        let out = FilteredSampler::with_filter(FilterType::Nearest).resample(&tex, 8, 1).unwrap();
        assert!(out.pixels().any(|p| p[0] > 0 && p[0] < 255), "{:?}", out.data);
    }

    #[test]
    fn constant_image_stays_constant() {
        let tex = TextureMap::filled(7, 3, [90, 90, 90, 255]);
        let out = FilteredSampler::default().resample(&tex, 16, 16).unwrap();
        assert!(out.pixels().all(|p| p == [90, 90, 90, 255]));
    }

    #[test]
    fn load_decodes_encoded_bytes() {
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::RgbaImage::from_pixel(3, 2, image::Rgba([5, 6, 7, 8]))
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        let sampler = FilteredSampler::default();
        let tex = sampler.load(bytes.get_ref()).unwrap();
        assert_eq!((tex.width, tex.height), (3, 2));
        assert_eq!(tex.pixel(2, 1), Some([5, 6, 7, 8]));
        assert!(matches!(sampler.load(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn resample_rejects_empty() {
        let tex = TextureMap::filled(0, 0, [0; 4]);
        assert!(FilteredSampler::default().resample(&tex, 4, 4).is_err());
    }

    #[test]
    fn fit_within_preserves_aspect() {
        assert_eq!(fit_within(1024, 512, 512), (512, 256));
        assert_eq!(fit_within(300, 900, 512), (170, 512));
        assert_eq!(fit_within(200, 100, 512), (200, 100));
        assert_eq!(fit_within(4000, 1, 512), (512, 1));
    }
}
