//! Per-session channel state.
//!
//! A [`Session`] is the explicit replacement for UI-held state: the base
//! color, six channel slots, the current PBR parameters and the export
//! resolution. Core functions read a [`ChannelTable`] snapshot and never
//! reach back into the session.

use crate::image_loading::{DecodeError, ImageLoader, TextureChannel};
use crate::packing::ExportResolution;
use crate::synthesis::{ChannelSynthesizer, PbrParameters};
use crate::texture::TextureMap;
use crate::Result;
use std::path::{Path, PathBuf};

/// Supported image extensions for folder scanning
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tga", "bmp", "webp"];

/// Valid intensity range for every channel slot.
pub const INTENSITY_RANGE: (f32, f32) = (0.0, 2.0);

/// State of one channel slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSource {
    /// Bound image; `None` packs as a flat constant.
    pub image: Option<TextureMap>,
    /// Multiplier in [0, 2].
    pub intensity: f32,
    pub inverted: bool,
}

impl ChannelSource {
    pub fn empty(channel: TextureChannel) -> Self {
        Self {
            image: None,
            intensity: channel.default_intensity(),
            inverted: false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.image.is_some()
    }
}

/// The six channel slots, indexed by [`TextureChannel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTable {
    sources: [ChannelSource; 6],
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self {
            sources: TextureChannel::ALL.map(ChannelSource::empty),
        }
    }
}

fn slot(channel: TextureChannel) -> usize {
    match channel {
        TextureChannel::AmbientOcclusion => 0,
        TextureChannel::Metallic => 1,
        TextureChannel::Roughness => 2,
        TextureChannel::Displacement => 3,
        TextureChannel::Normal => 4,
        TextureChannel::Alpha => 5,
    }
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: TextureChannel) -> &ChannelSource {
        &self.sources[slot(channel)]
    }

    pub fn get_mut(&mut self, channel: TextureChannel) -> &mut ChannelSource {
        &mut self.sources[slot(channel)]
    }

    /// Sources for the R, G, B and A channels of the pack.
    pub fn packed(&self) -> [&ChannelSource; 4] {
        TextureChannel::PACKED.map(|c| self.get(c))
    }

    pub fn bound_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_bound()).count()
    }

    /// Bind an uploaded image. Uploads reset the slot intensity to 1.0.
    pub fn upload(&mut self, channel: TextureChannel, image: TextureMap) {
        let source = self.get_mut(channel);
        source.image = Some(image);
        source.intensity = 1.0;
    }

    /// Bind a generated image, keeping intensity and inversion.
    pub fn bind_generated(&mut self, channel: TextureChannel, image: TextureMap) {
        self.get_mut(channel).image = Some(image);
    }

    /// Unbind the image, keeping intensity and inversion.
    pub fn clear(&mut self, channel: TextureChannel) {
        self.get_mut(channel).image = None;
    }

    pub fn set_intensity(&mut self, channel: TextureChannel, intensity: f32) {
        let (min, max) = INTENSITY_RANGE;
        let value = if intensity.is_finite() {
            intensity.clamp(min, max)
        } else {
            channel.default_intensity()
        };
        self.get_mut(channel).intensity = value;
    }

    pub fn set_inverted(&mut self, channel: TextureChannel, inverted: bool) {
        self.get_mut(channel).inverted = inverted;
    }

    /// Load channel images from a folder by detecting the channel from each
    /// filename (ao, metallic, roughness, height, normal, opacity, ...).
    ///
    /// The first file in name order wins per channel. Files that fail to
    /// decode are skipped and returned alongside the table.
    pub fn load_from_folder<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<(PathBuf, DecodeError)>)> {
        let path = path.as_ref();
        let mut candidates: Vec<(PathBuf, TextureChannel)> = Vec::new();

        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(ext) = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|s| s.to_lowercase())
            else {
                continue;
            };
            if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }

            if let Some(channel) = TextureChannel::from_path(&path) {
                candidates.push((path, channel));
            }
        }

        // Sort for deterministic ordering (first match wins per channel)
        candidates.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));

        let mut table = Self::default();
        let mut failures = Vec::new();
        for (file_path, channel) in candidates {
            if table.get(channel).is_bound() {
                continue;
            }
            match ImageLoader::load(&file_path) {
                Ok(img) => {
                    tracing::debug!(%channel, path = %file_path.display(), "bound channel from folder");
                    table.upload(channel, TextureMap::from_loaded(img, Some(file_path)));
                }
                Err(e) => {
                    tracing::warn!(%channel, path = %file_path.display(), error = %e, "skipping undecodable texture");
                    failures.push((file_path, e));
                }
            }
        }

        Ok((table, failures))
    }
}

/// Mutable state of one packing session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    base_color: Option<TextureMap>,
    channels: ChannelTable,
    parameters: PbrParameters,
    analyzed: bool,
    resolution: ExportResolution,
    revision: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolution(mut self, resolution: ExportResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_parameters(mut self, parameters: PbrParameters) -> Self {
        self.parameters = parameters.clamped();
        self
    }

    pub fn base_color(&self) -> Option<&TextureMap> {
        self.base_color.as_ref()
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub fn parameters(&self) -> &PbrParameters {
        &self.parameters
    }

    pub fn resolution(&self) -> ExportResolution {
        self.resolution
    }

    /// Whether analysis has run (or been attempted) for the current base color.
    pub fn has_analyzed(&self) -> bool {
        self.analyzed
    }

    /// Bumped on every change to inputs that affect packing or synthesis.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// A consistent copy of the channel table for one repack.
    pub fn snapshot(&self) -> ChannelTable {
        self.channels.clone()
    }

    pub fn set_base_color(&mut self, image: TextureMap) {
        self.base_color = Some(image);
        self.analyzed = false;
        self.touch();
    }

    pub fn clear_base_color(&mut self) {
        self.base_color = None;
        self.analyzed = false;
        self.touch();
    }

    pub fn upload(&mut self, channel: TextureChannel, image: TextureMap) {
        self.channels.upload(channel, image);
        self.touch();
    }

    pub fn clear(&mut self, channel: TextureChannel) {
        self.channels.clear(channel);
        self.touch();
    }

    pub fn set_intensity(&mut self, channel: TextureChannel, intensity: f32) {
        self.channels.set_intensity(channel, intensity);
        self.touch();
    }

    pub fn set_inverted(&mut self, channel: TextureChannel, inverted: bool) {
        self.channels.set_inverted(channel, inverted);
        self.touch();
    }

    pub fn set_resolution(&mut self, resolution: ExportResolution) {
        self.resolution = resolution;
        self.touch();
    }

    pub(crate) fn mark_analyzed(&mut self) {
        self.analyzed = true;
    }

    /// Replace the PBR parameters and, when a base color is bound,
    /// regenerate every procedural map from it.
    pub fn update_parameters(&mut self, parameters: PbrParameters) -> Result<()> {
        self.parameters = parameters.clamped();
        self.touch();
        if self.base_color.is_some() {
            self.regenerate()?;
        }
        Ok(())
    }

    /// Synthesize all six maps from the base color with the current
    /// parameters and bind them, keeping each slot's intensity and inversion.
    pub fn regenerate(&mut self) -> Result<()> {
        let base = self.base_color.as_ref().ok_or(crate::Error::MissingBaseColor)?;
        let maps = ChannelSynthesizer::synthesize(base, &self.parameters)?;
        for (channel, map) in maps.into_channels() {
            self.channels.bind_generated(channel, map);
        }
        self.touch();
        Ok(())
    }

    /// Back to an empty session; the export resolution is kept.
    pub fn reset(&mut self) {
        let resolution = self.resolution;
        let revision = self.revision;
        *self = Self {
            resolution,
            revision,
            ..Self::default()
        };
        self.touch();
    }
}
