//! Image loading and channel detection.
//!
//! Decodes PNG, JPG, TGA, BMP and WebP data into 8-bit RGBA and maps common
//! texture filenames onto the six packer channels.

use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// The six channel slots of a packing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureChannel {
    AmbientOcclusion,
    Metallic,
    Roughness,
    Displacement,
    Normal,
    Alpha,
}

impl TextureChannel {
    pub const ALL: [TextureChannel; 6] = [
        TextureChannel::AmbientOcclusion,
        TextureChannel::Metallic,
        TextureChannel::Roughness,
        TextureChannel::Displacement,
        TextureChannel::Normal,
        TextureChannel::Alpha,
    ];

    /// Channels composited into the AOMRD pack, in R, G, B, A order.
    pub const PACKED: [TextureChannel; 4] = [
        TextureChannel::AmbientOcclusion,
        TextureChannel::Metallic,
        TextureChannel::Roughness,
        TextureChannel::Displacement,
    ];

    /// Common filename fragments for this channel (without extension)
    pub fn common_suffixes(&self) -> &[&'static str] {
        match self {
            TextureChannel::AmbientOcclusion => &["ambientocclusion", "ambient_occlusion", "occlusion", "ao"],
            TextureChannel::Metallic => &["metallic", "metalness", "metal"],
            TextureChannel::Roughness => &["roughness", "rough"],
            TextureChannel::Displacement => &["displacement", "height", "disp", "bump"],
            TextureChannel::Normal => &["normal", "nrm"],
            TextureChannel::Alpha => &["alpha", "opacity", "mask"],
        }
    }

    /// Default intensity of an empty slot.
    pub fn default_intensity(&self) -> f32 {
        match self {
            TextureChannel::Metallic | TextureChannel::Displacement => 0.0,
            TextureChannel::Roughness => 0.5,
            _ => 1.0,
        }
    }

    /// Index into an RGBA pixel for packed channels.
    pub fn packed_index(&self) -> Option<usize> {
        match self {
            TextureChannel::AmbientOcclusion => Some(0),
            TextureChannel::Metallic => Some(1),
            TextureChannel::Roughness => Some(2),
            TextureChannel::Displacement => Some(3),
            TextureChannel::Normal | TextureChannel::Alpha => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TextureChannel::AmbientOcclusion => "ao",
            TextureChannel::Metallic => "metallic",
            TextureChannel::Roughness => "roughness",
            TextureChannel::Displacement => "displacement",
            TextureChannel::Normal => "normal",
            TextureChannel::Alpha => "alpha",
        }
    }

    /// Parse a channel name as typed on the command line or in config.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "ao" | "ambient_occlusion" | "ambientocclusion" | "occlusion" => Some(TextureChannel::AmbientOcclusion),
            "metallic" | "metal" | "m" => Some(TextureChannel::Metallic),
            "roughness" | "rough" | "r" => Some(TextureChannel::Roughness),
            "displacement" | "height" | "disp" | "d" => Some(TextureChannel::Displacement),
            "normal" | "n" => Some(TextureChannel::Normal),
            "alpha" | "opacity" => Some(TextureChannel::Alpha),
            _ => None,
        }
    }

    /// Attempt to detect the channel from a filename.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let stem = path.as_ref().file_stem()?.to_str()?.to_lowercase();
        let tokens: Vec<&str> = stem
            .split(|c: char| c == '_' || c == '-' || c == '.' || c == ' ')
            .filter(|t| !t.is_empty())
            .collect();

        // Whole-token matches first so "ao" does not fire inside words like "chaos".
        for channel in TextureChannel::ALL {
            if channel
                .common_suffixes()
                .iter()
                .any(|s| tokens.iter().any(|t| t == s))
            {
                return Some(channel);
            }
        }
        for channel in TextureChannel::ALL {
            if channel
                .common_suffixes()
                .iter()
                .filter(|s| s.len() > 3)
                .any(|s| stem.contains(s))
            {
                return Some(channel);
            }
        }
        None
    }
}

impl std::fmt::Display for TextureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Supported image formats for loading
pub const SUPPORTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Tga,
    ImageFormat::Bmp,
    ImageFormat::WebP,
];

/// Failure to turn bytes into a pixel grid.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("image data is empty")]
    Empty,

    #[error("unrecognized image format")]
    UnknownFormat,

    #[error("unsupported format: {0:?}. Use PNG, JPG, TGA, BMP or WebP.")]
    Unsupported(ImageFormat),

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A decoded image with RGBA pixel data
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// RGBA pixel data (4 bytes per pixel, row-major)
    pub data: Vec<u8>,
    /// Source format used when loading
    pub format: ImageFormat,
}

impl LoadedImage {
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    fn from_dynamic(image: DynamicImage, format: ImageFormat) -> Self {
        let (width, height) = image.dimensions();
        let data = image.to_rgba8().into_raw();

        Self {
            width,
            height,
            data,
            format,
        }
    }
}

/// Decodes texture images from files or memory
pub struct ImageLoader;

impl ImageLoader {
    /// Decode an image held in memory. The format is sniffed from the bytes.
    pub fn load_from_memory(bytes: &[u8]) -> Result<LoadedImage, DecodeError> {
        Self::decode(bytes, None)
    }

    /// Load an image from a file path. The extension is used when the
    /// content alone does not identify the format.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<LoadedImage, DecodeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(&bytes, ImageFormat::from_path(path).ok())
    }

    fn decode(bytes: &[u8], hint: Option<ImageFormat>) -> Result<LoadedImage, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)?;
        let format = reader
            .format()
            .or(hint)
            .ok_or(DecodeError::UnknownFormat)?;

        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(DecodeError::Unsupported(format));
        }

        reader.set_format(format);
        let image = reader.decode()?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            format = ?format,
            "decoded image"
        );
        Ok(LoadedImage::from_dynamic(image, format))
    }
}
