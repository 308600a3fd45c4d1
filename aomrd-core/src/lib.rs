//! # AOMRD Core
//!
//! Engine for packing greyscale material maps into a single AOMRD texture
//! (AO in R, Metallic in G, Roughness in B, Displacement in A) and for
//! deriving those maps procedurally from a base-color image.
//! Designed for use by CLI tools and desktop applications.
//!
//! ## Architecture
//!
//! - [`image_loading`] - Image decoding and channel detection
//! - [`sampler`] - Bilinear resampling behind the [`ImageSampler`] seam
//! - [`luminance`] - Unweighted luminance fields
//! - [`synthesis`] - Procedural AO / Metallic / Roughness / Displacement / Alpha
//! - [`normal_map`] - Sobel normal reconstruction
//! - [`packing`] - AOMRD channel packing
//! - [`export`] - PNG export
//! - [`session`] - Channel table and session state
//! - [`analysis`] - Material analyzers (heuristic and external command)
//! - [`generation`] - Image generator seam
//! - [`pipeline`] - Smart generate, repack scheduling and session export
//! - [`config`] - TOML configuration

pub mod analysis;
pub mod config;
pub mod export;
pub mod generation;
pub mod image_loading;
pub mod luminance;
pub mod normal_map;
pub mod packing;
pub mod pipeline;
pub mod sampler;
pub mod session;
pub mod synthesis;
pub mod texture;

// Re-export main types for convenient access
pub use analysis::{
    parse_analysis_response, AnalysisError, AnalysisImage, CommandAnalyzer, ConfiguredAnalyzer,
    HeuristicAnalyzer, MaterialAnalyzer,
};
pub use config::{AnalyzerConfig, AnalyzerKind, PackerConfig};
pub use export::{ExportBundle, ExportEncoder, ExportRole};
pub use generation::{generate_base_color, GenerationError, GenerationRequest, ImageGenerator};
pub use image_loading::{DecodeError, ImageLoader, LoadedImage, TextureChannel};
pub use luminance::{luminance, LuminanceField};
pub use normal_map::NormalMapSynthesizer;
pub use packing::{ChannelPacker, ExportResolution, PackedOutput, SkippedChannel};
pub use pipeline::{export_session, full_repack, smart_generate, GenerateOutcome, RepackOutcome, Repacker};
pub use sampler::{FilteredSampler, ImageSampler};
pub use session::{ChannelSource, ChannelTable, Session};
pub use synthesis::{ChannelSynthesizer, PbrParameters, ProceduralMaps};
pub use texture::TextureMap;

/// Common result type for AOMRD operations
pub type Result<T> = std::result::Result<T, Error>;

/// Library-wide error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("No base color image is loaded")]
    MissingBaseColor,

    #[error("Unsupported export resolution: {0}. Use 512, 1024, 2048, 4096 or 8192.")]
    InvalidResolution(u32),

    #[error("Repack superseded by a newer request")]
    Superseded,

    #[error("{0}")]
    Other(String),
}
