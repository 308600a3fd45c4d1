//! Procedural channel synthesis from a base-color image.
//!
//! Every map is derived from the base image's luminance at its native
//! resolution through a pointwise transfer curve:
//!
//! | Map          | Value per pixel                                   |
//! |--------------|---------------------------------------------------|
//! | AO           | `255 - (255 - L) * ao_intensity`                  |
//! | Metallic     | `255` if metal, else `0`                          |
//! | Roughness    | `roughness_estimate * 255 + (L - 128) * 0.15`     |
//! | Displacement | `L * displacement_contrast`                       |
//! | Alpha        | `255`                                             |
//!
//! All values are clamped to [0, 255]. The normal map comes from
//! [`crate::normal_map`].

use crate::image_loading::TextureChannel;
use crate::luminance::LuminanceField;
use crate::normal_map::NormalMapSynthesizer;
use crate::texture::{clamp_to_u8, TextureMap};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Luminance-driven variation applied around the roughness base level.
const ROUGHNESS_VARIATION: f64 = 0.15;

/// Luminance treated as the neutral midpoint of the roughness variation band.
const ROUGHNESS_PIVOT: f64 = 128.0;

/// Scalar material description driving procedural synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PbrParameters {
    #[serde(alias = "is_metal")]
    pub is_metal: bool,
    /// Base micro-surface roughness, 0..=1
    #[serde(alias = "roughness_estimate")]
    pub roughness_estimate: f32,
    /// How strongly dark areas occlude, 0..=2
    #[serde(alias = "ao_intensity")]
    pub ao_intensity: f32,
    /// Height contrast, 0..=1
    #[serde(alias = "displacement_contrast")]
    pub displacement_contrast: f32,
    /// Free-text rationale from the analyzer (may be empty)
    pub description: String,
}

impl Default for PbrParameters {
    fn default() -> Self {
        Self {
            is_metal: false,
            roughness_estimate: 0.5,
            ao_intensity: 1.0,
            displacement_contrast: 0.5,
            description: String::new(),
        }
    }
}

impl PbrParameters {
    /// Clamp every scalar into its documented range. Non-finite values fall
    /// back to the defaults.
    pub fn clamped(mut self) -> Self {
        let defaults = Self::default();
        self.roughness_estimate = clamp_or(self.roughness_estimate, 0.0, 1.0, defaults.roughness_estimate);
        self.ao_intensity = clamp_or(self.ao_intensity, 0.0, 2.0, defaults.ao_intensity);
        self.displacement_contrast =
            clamp_or(self.displacement_contrast, 0.0, 1.0, defaults.displacement_contrast);
        self
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// The six maps derived from one base image, all at its native resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ProceduralMaps {
    pub ao: TextureMap,
    pub metallic: TextureMap,
    pub roughness: TextureMap,
    pub displacement: TextureMap,
    pub normal: TextureMap,
    pub alpha: TextureMap,
}

impl ProceduralMaps {
    pub fn get(&self, channel: TextureChannel) -> &TextureMap {
        match channel {
            TextureChannel::AmbientOcclusion => &self.ao,
            TextureChannel::Metallic => &self.metallic,
            TextureChannel::Roughness => &self.roughness,
            TextureChannel::Displacement => &self.displacement,
            TextureChannel::Normal => &self.normal,
            TextureChannel::Alpha => &self.alpha,
        }
    }

    /// Consume into (channel, map) pairs in channel order.
    pub fn into_channels(self) -> [(TextureChannel, TextureMap); 6] {
        [
            (TextureChannel::AmbientOcclusion, self.ao),
            (TextureChannel::Metallic, self.metallic),
            (TextureChannel::Roughness, self.roughness),
            (TextureChannel::Displacement, self.displacement),
            (TextureChannel::Normal, self.normal),
            (TextureChannel::Alpha, self.alpha),
        ]
    }
}

/// Pointwise transfer functions from luminance to channel values.
pub struct ChannelSynthesizer;

impl ChannelSynthesizer {
    #[inline]
    pub fn ao_value(l: f64, ao_intensity: f32) -> u8 {
        clamp_to_u8(255.0 - (255.0 - l) * ao_intensity as f64)
    }

    #[inline]
    pub fn metallic_value(is_metal: bool) -> u8 {
        if is_metal {
            255
        } else {
            0
        }
    }

    #[inline]
    pub fn roughness_value(l: f64, roughness_estimate: f32) -> u8 {
        let base = roughness_estimate as f64 * 255.0;
        let variation = (l - ROUGHNESS_PIVOT) * ROUGHNESS_VARIATION;
        clamp_to_u8(base + variation)
    }

    #[inline]
    pub fn displacement_value(l: f64, displacement_contrast: f32) -> u8 {
        clamp_to_u8(l * displacement_contrast as f64)
    }

    pub fn ambient_occlusion(field: &LuminanceField, params: &PbrParameters) -> TextureMap {
        let values = field.map(|l| Self::ao_value(l, params.ao_intensity));
        TextureMap::from_greyscale(field.width, field.height, &values)
    }

    pub fn metallic(field: &LuminanceField, params: &PbrParameters) -> TextureMap {
        let v = Self::metallic_value(params.is_metal);
        TextureMap::filled(field.width, field.height, [v, v, v, 255])
    }

    pub fn roughness(field: &LuminanceField, params: &PbrParameters) -> TextureMap {
        let values = field.map(|l| Self::roughness_value(l, params.roughness_estimate));
        TextureMap::from_greyscale(field.width, field.height, &values)
    }

    pub fn displacement(field: &LuminanceField, params: &PbrParameters) -> TextureMap {
        let values = field.map(|l| Self::displacement_value(l, params.displacement_contrast));
        TextureMap::from_greyscale(field.width, field.height, &values)
    }

    pub fn alpha(field: &LuminanceField) -> TextureMap {
        TextureMap::filled(field.width, field.height, [255, 255, 255, 255])
    }

    /// Derive all six maps from `base`. Pure in (base, params).
    pub fn synthesize(base: &TextureMap, params: &PbrParameters) -> Result<ProceduralMaps> {
        if base.pixel_count() == 0 || base.data.len() != base.pixel_count() * 4 {
            return Err(crate::Error::Other(format!(
                "Cannot synthesize maps from a {}x{} base image",
                base.width, base.height
            )));
        }

        let field = LuminanceField::from_texture(base);
        let maps = ProceduralMaps {
            ao: Self::ambient_occlusion(&field, params),
            metallic: Self::metallic(&field, params),
            roughness: Self::roughness(&field, params),
            displacement: Self::displacement(&field, params),
            normal: NormalMapSynthesizer::default().synthesize(&field),
            alpha: Self::alpha(&field),
        };
        tracing::debug!(
            width = base.width,
            height = base.height,
            is_metal = params.is_metal,
            "synthesized procedural maps"
        );
        Ok(maps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_base(l: u8) -> TextureMap {
        TextureMap::filled(4, 4, [l, l, l, 255])
    }

    fn all_equal(tex: &TextureMap, expected: [u8; 4]) -> bool {
        tex.pixels().all(|p| p == expected)
    }

    #[test]
    fn ao_of_luminance_200_at_intensity_one_is_200() {
        let params = PbrParameters::default();
        let maps = ChannelSynthesizer::synthesize(&flat_base(200), &params).unwrap();
        assert!(all_equal(&maps.ao, [200, 200, 200, 255]));
    }

    #[test]
    fn displacement_of_black_is_black() {
        let params = PbrParameters {
            displacement_contrast: 0.5,
            ..Default::default()
        };
        let maps = ChannelSynthesizer::synthesize(&flat_base(0), &params).unwrap();
        assert!(all_equal(&maps.displacement, [0, 0, 0, 255]));
    }

    #[test]
    fn metal_flag_fills_metallic_regardless_of_content() {
        let params = PbrParameters {
            is_metal: true,
            ..Default::default()
        };
        let noisy = TextureMap::from_rgba_image(image::RgbaImage::from_fn(5, 3, |x, y| {
            image::Rgba([(x * 50) as u8, (y * 80) as u8, 7, 255])
        }));
        let maps = ChannelSynthesizer::synthesize(&noisy, &params).unwrap();
        assert!(all_equal(&maps.metallic, [255, 255, 255, 255]));

        let dielectric = ChannelSynthesizer::synthesize(&noisy, &PbrParameters::default()).unwrap();
        assert!(all_equal(&dielectric.metallic, [0, 0, 0, 255]));
    }

    #[test]
    fn alpha_map_is_fully_opaque() {
        let maps = ChannelSynthesizer::synthesize(&flat_base(17), &PbrParameters::default()).unwrap();
        assert!(all_equal(&maps.alpha, [255, 255, 255, 255]));
    }

    #[test]
    fn ao_is_non_increasing_in_intensity() {
        for l in [0.0, 12.5, 64.0, 128.0, 200.0, 254.0] {
            let mut last = u8::MAX;
            for step in 0..=20 {
                let intensity = step as f32 * 0.1;
                let v = ChannelSynthesizer::ao_value(l, intensity);
                assert!(v <= last, "AO rose at L={} intensity={}", l, intensity);
                last = v;
            }
        }
        assert_eq!(ChannelSynthesizer::ao_value(255.0, 2.0), 255);
    }

    #[test]
    fn roughness_varies_around_base_level() {
        assert_eq!(ChannelSynthesizer::roughness_value(128.0, 0.5), 128);
        // 127.5 + (228 - 128) * 0.15 = 142.5 -> ties to even
        assert_eq!(ChannelSynthesizer::roughness_value(228.0, 0.5), 142);
        assert_eq!(ChannelSynthesizer::roughness_value(0.0, 0.0), 0);
        assert_eq!(ChannelSynthesizer::roughness_value(255.0, 1.0), 255);
    }

    #[test]
    fn displacement_scales_luminance() {
        assert_eq!(ChannelSynthesizer::displacement_value(200.0, 0.5), 100);
        assert_eq!(ChannelSynthesizer::displacement_value(255.0, 1.0), 255);
    }

    #[test]
    fn synthesis_is_pure() {
        let base = TextureMap::from_rgba_image(image::RgbaImage::from_fn(6, 6, |x, y| {
            image::Rgba([(x * 40) as u8, (y * 30) as u8, ((x + y) * 10) as u8, 255])
        }));
        let params = PbrParameters {
            is_metal: false,
            roughness_estimate: 0.3,
            ao_intensity: 1.4,
            displacement_contrast: 0.8,
            description: "test".into(),
        };
        let a = ChannelSynthesizer::synthesize(&base, &params).unwrap();
        let b = ChannelSynthesizer::synthesize(&base, &params).unwrap();
        assert_eq!(a, b);
        assert_eq!((a.normal.width, a.normal.height), (6, 6));
    }

    #[test]
    fn empty_base_is_rejected() {
        let empty = TextureMap::filled(0, 0, [0; 4]);
        assert!(ChannelSynthesizer::synthesize(&empty, &PbrParameters::default()).is_err());
    }

    #[test]
    fn clamped_parameters_stay_in_range() {
        let p = PbrParameters {
            is_metal: false,
            roughness_estimate: 3.0,
            ao_intensity: -1.0,
            displacement_contrast: f32::NAN,
            description: String::new(),
        }
        .clamped();
        assert_eq!(p.roughness_estimate, 1.0);
        assert_eq!(p.ao_intensity, 0.0);
        assert_eq!(p.displacement_contrast, 0.5);
    }

    #[test]
    fn parameters_accept_camel_and_snake_case() {
        let camel: PbrParameters =
            serde_json::from_str(r#"{"isMetal":true,"roughnessEstimate":0.2}"#).unwrap();
        assert!(camel.is_metal);
        assert_eq!(camel.roughness_estimate, 0.2);
        assert_eq!(camel.ao_intensity, 1.0);

        let snake: PbrParameters = toml::from_str("is_metal = true\nao_intensity = 1.5\n").unwrap();
        assert!(snake.is_metal);
        assert_eq!(snake.ao_intensity, 1.5);
    }
}
