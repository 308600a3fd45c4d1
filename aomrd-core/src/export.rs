//! PNG export of packed and standalone maps.
//!
//! Files are named `T_<ROLE>_<resolution>.png` with ROLE one of `AOMRD`,
//! `NORMAL` or `ALPHA`. Standalone maps are resampled to the export
//! resolution when they are not already that size.

use crate::packing::{ChannelPacker, ExportResolution, PackedOutput, SkippedChannel};
use crate::image_loading::TextureChannel;
use crate::sampler::ImageSampler;
use crate::session::ChannelTable;
use crate::texture::TextureMap;
use crate::Result;
use image::ImageFormat;
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Which export a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportRole {
    Aomrd,
    Normal,
    Alpha,
}

impl ExportRole {
    pub fn tag(&self) -> &'static str {
        match self {
            ExportRole::Aomrd => "AOMRD",
            ExportRole::Normal => "NORMAL",
            ExportRole::Alpha => "ALPHA",
        }
    }

    /// Channel exported standalone under this role.
    pub fn channel(&self) -> Option<TextureChannel> {
        match self {
            ExportRole::Aomrd => None,
            ExportRole::Normal => Some(TextureChannel::Normal),
            ExportRole::Alpha => Some(TextureChannel::Alpha),
        }
    }

    pub fn file_name(&self, resolution: ExportResolution) -> String {
        format!("T_{}_{}.png", self.tag(), resolution.size())
    }
}

/// Files written by one export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportBundle {
    pub resolution: u32,
    pub written: Vec<(ExportRole, PathBuf)>,
    /// Packed channels whose image could not be used.
    pub skipped: Vec<SkippedChannel>,
}

impl ExportBundle {
    pub fn path(&self, role: ExportRole) -> Option<&Path> {
        self.written
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, p)| p.as_path())
    }
}

/// Serializes textures to PNG.
pub struct ExportEncoder<'a> {
    sampler: &'a dyn ImageSampler,
}

impl<'a> ExportEncoder<'a> {
    pub fn new(sampler: &'a dyn ImageSampler) -> Self {
        Self { sampler }
    }

    /// Encode a texture as RGBA8 PNG bytes.
    pub fn encode(texture: &TextureMap) -> Result<Vec<u8>> {
        let img = texture.to_rgba_image()?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Resample a standalone map to the export size if needed.
    pub fn standalone(&self, texture: &TextureMap, resolution: ExportResolution) -> Result<TextureMap> {
        let size = resolution.size();
        if texture.is_square(size) {
            return Ok(texture.clone());
        }
        self.sampler.resample(texture, size, size)
    }

    /// Write one texture into `dir` under its role's filename.
    pub fn write<P: AsRef<Path>>(
        &self,
        role: ExportRole,
        texture: &TextureMap,
        resolution: ExportResolution,
        dir: P,
    ) -> Result<PathBuf> {
        let texture = self.standalone(texture, resolution)?;
        let bytes = Self::encode(&texture)?;
        let path = dir.as_ref().join(role.file_name(resolution));
        std::fs::write(&path, bytes)?;
        tracing::info!(role = role.tag(), path = %path.display(), "exported texture");
        Ok(path)
    }

    /// Write an already packed output.
    pub fn write_packed<P: AsRef<Path>>(&self, packed: &PackedOutput, dir: P) -> Result<PathBuf> {
        self.write(ExportRole::Aomrd, &packed.texture, packed.resolution, dir)
    }

    /// Pack the table and write every available export to `dir`.
    ///
    /// The AOMRD pack is always written; NORMAL and ALPHA only when those
    /// channels have an image bound. Creates `dir` if needed.
    pub fn export_bundle<P: AsRef<Path>>(
        &self,
        table: &ChannelTable,
        resolution: ExportResolution,
        dir: P,
    ) -> Result<ExportBundle> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let packed = ChannelPacker::new(self.sampler).pack_table(table, resolution)?;
        let mut written = vec![(ExportRole::Aomrd, self.write_packed(&packed, dir)?)];

        for role in [ExportRole::Normal, ExportRole::Alpha] {
            let Some(channel) = role.channel() else {
                continue;
            };
            if let Some(image) = table.get(channel).image.as_ref() {
                written.push((role, self.write(role, image, resolution, dir)?));
            }
        }

        Ok(ExportBundle {
            resolution: resolution.size(),
            written,
            skipped: packed.skipped,
        })
    }
}
