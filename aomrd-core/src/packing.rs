//! AOMRD channel packing.
//!
//! Composites four greyscale sources into one RGBA texture:
//!
//! - **R channel** = Ambient Occlusion
//! - **G channel** = Metallic
//! - **B channel** = Roughness
//! - **A channel** = Displacement
//!
//! Each bound source is resampled to the export resolution, reduced to
//! luminance, scaled by its intensity and optionally inverted. An unbound
//! source fills its channel with `intensity * 255`. All four channels are
//! always written.

use crate::image_loading::TextureChannel;
use crate::luminance::luminance;
use crate::sampler::ImageSampler;
use crate::session::{ChannelSource, ChannelTable};
use crate::texture::{clamp_to_u8, TextureMap};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Square export sizes offered for packed and standalone maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ExportResolution {
    /// 512 x 512
    Res512,
    /// 1024 x 1024
    Res1K,
    /// 2048 x 2048
    #[default]
    Res2K,
    /// 4096 x 4096
    Res4K,
    /// 8192 x 8192
    Res8K,
}

impl ExportResolution {
    pub const ALL: [ExportResolution; 5] = [
        ExportResolution::Res512,
        ExportResolution::Res1K,
        ExportResolution::Res2K,
        ExportResolution::Res4K,
        ExportResolution::Res8K,
    ];

    /// Edge length in pixels.
    pub fn size(&self) -> u32 {
        match self {
            ExportResolution::Res512 => 512,
            ExportResolution::Res1K => 1024,
            ExportResolution::Res2K => 2048,
            ExportResolution::Res4K => 4096,
            ExportResolution::Res8K => 8192,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ExportResolution::Res512 => "512px",
            ExportResolution::Res1K => "1k",
            ExportResolution::Res2K => "2k",
            ExportResolution::Res4K => "4k",
            ExportResolution::Res8K => "8k",
        }
    }
}

impl TryFrom<u32> for ExportResolution {
    type Error = crate::Error;

    fn try_from(size: u32) -> Result<Self> {
        ExportResolution::ALL
            .into_iter()
            .find(|r| r.size() == size)
            .ok_or(crate::Error::InvalidResolution(size))
    }
}

impl From<ExportResolution> for u32 {
    fn from(res: ExportResolution) -> u32 {
        res.size()
    }
}

impl FromStr for ExportResolution {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "512" | "512px" => return Ok(ExportResolution::Res512),
            "1k" => return Ok(ExportResolution::Res1K),
            "2k" => return Ok(ExportResolution::Res2K),
            "4k" => return Ok(ExportResolution::Res4K),
            "8k" => return Ok(ExportResolution::Res8K),
            _ => {}
        }
        let size: u32 = lower
            .parse()
            .map_err(|_| crate::Error::Other(format!("Unknown resolution: {}. Use 512, 1024, 2048, 4096 or 8192.", s)))?;
        ExportResolution::try_from(size)
    }
}

impl std::fmt::Display for ExportResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.size())
    }
}

/// A bound channel whose image could not be used; its plane was filled
/// with the slot constant instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedChannel {
    pub channel: TextureChannel,
    pub reason: String,
}

/// Result of one packing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedOutput {
    pub texture: TextureMap,
    pub resolution: ExportResolution,
    pub skipped: Vec<SkippedChannel>,
}

/// Composites packed channel sources at a fixed resolution.
pub struct ChannelPacker<'a> {
    sampler: &'a dyn ImageSampler,
}

impl<'a> ChannelPacker<'a> {
    pub fn new(sampler: &'a dyn ImageSampler) -> Self {
        Self { sampler }
    }

    /// The constant an unbound slot packs to.
    pub fn constant_value(intensity: f32) -> u8 {
        clamp_to_u8(intensity as f64 * 255.0)
    }

    /// Scale, invert and clamp one luminance sample.
    #[inline]
    pub fn channel_value(lum: f64, intensity: f32, inverted: bool) -> u8 {
        let mut v = lum * intensity as f64;
        if inverted {
            v = 255.0 - v;
        }
        clamp_to_u8(v)
    }

    /// Resolve one source into a `size` x `size` single-channel plane.
    ///
    /// Returns `Ok(None)` when `is_stale` reports the pass was superseded.
    fn resolve_plane(
        &self,
        source: &ChannelSource,
        size: u32,
        is_stale: &dyn Fn() -> bool,
    ) -> Result<Option<Vec<u8>>> {
        let count = (size as usize) * (size as usize);
        let Some(image) = source.image.as_ref() else {
            return Ok(Some(vec![Self::constant_value(source.intensity); count]));
        };

        let resampled = self.sampler.resample(image, size, size)?;
        if resampled.width != size || resampled.height != size || resampled.data.len() != count * 4 {
            return Err(crate::Error::Other(format!(
                "sampler returned {}x{} ({} bytes), expected {}x{}",
                resampled.width,
                resampled.height,
                resampled.data.len(),
                size,
                size
            )));
        }
        let row_len = size as usize * 4;
        let mut plane = Vec::with_capacity(count);
        for row in resampled.data.chunks_exact(row_len) {
            if is_stale() {
                return Ok(None);
            }
            for p in row.chunks_exact(4) {
                let lum = luminance(p[0], p[1], p[2]);
                plane.push(Self::channel_value(lum, source.intensity, source.inverted));
            }
        }
        Ok(Some(plane))
    }

    /// Pack four sources (R, G, B, A order) at `resolution`.
    pub fn pack(
        &self,
        slots: [&ChannelSource; 4],
        resolution: ExportResolution,
    ) -> Result<PackedOutput> {
        self.pack_cancellable(slots, resolution, &|| false)?
            .ok_or(crate::Error::Superseded)
    }

    /// Like [`pack`](Self::pack), but polls `is_stale` between rows and gives
    /// up with `Ok(None)` once it returns true.
    pub fn pack_cancellable(
        &self,
        slots: [&ChannelSource; 4],
        resolution: ExportResolution,
        is_stale: &dyn Fn() -> bool,
    ) -> Result<Option<PackedOutput>> {
        let size = resolution.size();
        let count = (size as usize) * (size as usize);
        let mut data = vec![0u8; count * 4];
        let mut skipped = Vec::new();

        for (channel, source) in TextureChannel::PACKED.into_iter().zip(slots) {
            let Some(index) = channel.packed_index() else {
                continue;
            };
            let plane = match self.resolve_plane(source, size, is_stale) {
                Ok(Some(plane)) => plane,
                Ok(None) => return Ok(None),
                Err(e) => {
                    tracing::warn!(%channel, error = %e, "channel unusable, packing its constant instead");
                    skipped.push(SkippedChannel {
                        channel,
                        reason: e.to_string(),
                    });
                    vec![Self::constant_value(source.intensity); count]
                }
            };

            for (px, v) in data.chunks_exact_mut(4).zip(plane) {
                px[index] = v;
            }
        }

        tracing::debug!(size, skipped = skipped.len(), "packed AOMRD texture");
        Ok(Some(PackedOutput {
            texture: TextureMap {
                width: size,
                height: size,
                data,
                path: None,
            },
            resolution,
            skipped,
        }))
    }

    /// Pack the AO, Metallic, Roughness and Displacement sources of a table.
    pub fn pack_table(&self, table: &ChannelTable, resolution: ExportResolution) -> Result<PackedOutput> {
        self.pack(table.packed(), resolution)
    }
}
