//! Material analysis: estimate [`PbrParameters`] from a base-color image.
//!
//! The analyzer is an external collaborator behind [`MaterialAnalyzer`].
//! Two implementations ship with the crate:
//!
//! - [`HeuristicAnalyzer`] - offline, derives parameters from color statistics
//! - [`CommandAnalyzer`] - runs an external program (for example a wrapper
//!   around a hosted vision model) that receives the image as JSON on stdin
//!   and prints the parameters as JSON on stdout
//!
//! Images are shrunk to at most 512 px on the longest edge and sent as JPEG.

use crate::image_loading::ImageLoader;
use crate::sampler::{fit_within, ImageSampler};
use crate::synthesis::PbrParameters;
use crate::texture::TextureMap;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Longest edge of the image submitted for analysis.
pub const MAX_ANALYSIS_EDGE: u32 = 512;

/// JPEG quality of the submitted image.
pub const ANALYSIS_JPEG_QUALITY: u8 = 80;

/// How long an external analyzer may run before it is killed.
pub const DEFAULT_ANALYZER_TIMEOUT: Duration = Duration::from_secs(60);

/// Instructions sent to external analyzers along with the image.
pub const ANALYSIS_PROMPT: &str = "Estimate real-time PBR parameters for this material texture. \
Return JSON with: isMetal (boolean, true for conductive metals such as chrome, gold or steel), \
roughnessEstimate (number 0-1, base micro-surface roughness), \
aoIntensity (number 0-1, how much dark areas contribute to occlusion), \
displacementContrast (number 0-1, expected height variation), \
description (string, short rationale).";

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    #[error("analyzer process failed: {0}")]
    Process(String),

    #[error("malformed analyzer response: {0}")]
    MalformedResponse(String),

    #[error("analyzer returned invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: f64 },

    #[error("could not prepare image for analysis: {0}")]
    Image(String),
}

/// The downscaled, JPEG-encoded image submitted to an analyzer.
#[derive(Debug, Clone)]
pub struct AnalysisImage {
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

impl AnalysisImage {
    /// Shrink `base` to fit [`MAX_ANALYSIS_EDGE`] and encode it as JPEG.
    pub fn prepare(base: &TextureMap, sampler: &dyn ImageSampler) -> Result<Self, AnalysisError> {
        let (width, height) = fit_within(base.width, base.height, MAX_ANALYSIS_EDGE);
        let resized = sampler
            .resample(base, width, height)
            .map_err(|e| AnalysisError::Image(e.to_string()))?;
        let rgba = resized
            .to_rgba_image()
            .map_err(|e| AnalysisError::Image(e.to_string()))?;
        let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();

        let mut data = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut data, ANALYSIS_JPEG_QUALITY)
            .encode_image(&rgb)
            .map_err(|e| AnalysisError::Image(e.to_string()))?;

        Ok(Self {
            width,
            height,
            mime_type: "image/jpeg",
            data,
        })
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Analyzer response as it arrives on the wire; every field is required.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    is_metal: bool,
    roughness_estimate: f64,
    ao_intensity: f64,
    displacement_contrast: f64,
    description: String,
}

fn checked(field: &'static str, value: f64, min: f64, max: f64) -> Result<f32, AnalysisError> {
    if !value.is_finite() {
        return Err(AnalysisError::InvalidValue { field, value });
    }
    Ok(value.clamp(min, max) as f32)
}

/// Parse a JSON analyzer response into clamped parameters.
pub fn parse_analysis_response(text: &str) -> Result<PbrParameters, AnalysisError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AnalysisError::MalformedResponse("empty response".into()));
    }
    let raw: RawAnalysis =
        serde_json::from_str(text).map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;

    Ok(PbrParameters {
        is_metal: raw.is_metal,
        roughness_estimate: checked("roughnessEstimate", raw.roughness_estimate, 0.0, 1.0)?,
        ao_intensity: checked("aoIntensity", raw.ao_intensity, 0.0, 2.0)?,
        displacement_contrast: checked("displacementContrast", raw.displacement_contrast, 0.0, 1.0)?,
        description: raw.description,
    })
}

/// Estimates PBR parameters for a base-color image.
#[allow(async_fn_in_trait)]
pub trait MaterialAnalyzer {
    async fn analyze(&self, image: &AnalysisImage) -> Result<PbrParameters, AnalysisError>;

    fn name(&self) -> &str;
}

/// Color statistics of a texture
#[derive(Debug, Clone)]
pub struct TextureFeatures {
    pub mean_luminance: f32,
    pub std_r: f32,
    pub std_g: f32,
    pub std_b: f32,
    pub variance: f32,
    pub edge_density: f32,
    pub saturation_mean: f32,
    pub warm_ratio: f32, // R/(R+G+B) for warm vs cool
}

/// Extract color statistics from a texture
pub fn extract_features(tex: &TextureMap) -> TextureFeatures {
    let (w, h) = (tex.width as usize, tex.height as usize);
    let n = w * h;
    if n == 0 || tex.data.len() < n * 4 {
        return TextureFeatures {
            mean_luminance: 0.0,
            std_r: 0.0,
            std_g: 0.0,
            std_b: 0.0,
            variance: 0.0,
            edge_density: 0.0,
            saturation_mean: 0.0,
            warm_ratio: 0.33,
        };
    }

    let mut sum = [0f64; 3];
    let mut sum_sq = [0f64; 3];
    let mut sum_sat = 0f64;
    let mut sum_warm = 0f64;

    for p in tex.pixels() {
        let c = [p[0] as f64, p[1] as f64, p[2] as f64];
        for i in 0..3 {
            sum[i] += c[i];
            sum_sq[i] += c[i] * c[i];
        }
        let maxc = c[0].max(c[1]).max(c[2]);
        let minc = c[0].min(c[1]).min(c[2]);
        sum_sat += if maxc > 0.0 { (maxc - minc) / maxc } else { 0.0 };
        let total = c[0] + c[1] + c[2];
        sum_warm += if total > 0.0 { c[0] / total } else { 0.33 };
    }

    let nf = n as f64;
    let std = |i: usize| ((sum_sq[i] / nf - (sum[i] / nf).powi(2)).max(0.0).sqrt()) as f32;
    let (std_r, std_g, std_b) = (std(0), std(1), std(2));

    // Neighbour differences above the threshold count as edges
    let threshold = 30.0;
    let data = &tex.data;
    let lum_sum = |i: usize| data[i] as f32 + data[i + 1] as f32 + data[i + 2] as f32;
    let mut edge_count = 0u32;
    for y in 0..h.saturating_sub(1) {
        for x in 0..w.saturating_sub(1) {
            let i = (y * w + x) * 4;
            let c = lum_sum(i);
            let right = lum_sum(i + 4);
            let down = lum_sum(i + w * 4);
            if (c - right).abs() > threshold || (c - down).abs() > threshold {
                edge_count += 1;
            }
        }
    }

    TextureFeatures {
        mean_luminance: ((sum[0] + sum[1] + sum[2]) / (3.0 * nf)) as f32,
        std_r,
        std_g,
        std_b,
        variance: (std_r * std_r + std_g * std_g + std_b * std_b) / 3.0,
        edge_density: edge_count as f32 / n as f32,
        saturation_mean: (sum_sat / nf) as f32,
        warm_ratio: (sum_warm / nf) as f32,
    }
}

/// Broad material families the heuristic analyzer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialClass {
    Metal,
    Wood,
    Fabric,
    Stone,
    Plastic,
    Unknown,
}

impl MaterialClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialClass::Metal => "metal",
            MaterialClass::Wood => "wood",
            MaterialClass::Fabric => "fabric",
            MaterialClass::Stone => "stone",
            MaterialClass::Plastic => "plastic",
            MaterialClass::Unknown => "unknown",
        }
    }

    /// Starting parameters for this family: (metal, roughness, ao, displacement).
    fn base_parameters(&self) -> (bool, f32, f32, f32) {
        match self {
            MaterialClass::Metal => (true, 0.3, 0.8, 0.3),
            MaterialClass::Wood => (false, 0.65, 1.0, 0.5),
            MaterialClass::Fabric => (false, 0.85, 1.2, 0.4),
            MaterialClass::Stone => (false, 0.8, 1.4, 0.8),
            MaterialClass::Plastic => (false, 0.35, 0.6, 0.2),
            MaterialClass::Unknown => (false, 0.5, 1.0, 0.5),
        }
    }
}

/// Classify from color statistics
pub fn classify(f: &TextureFeatures) -> (MaterialClass, f32) {
    // Metal: desaturated with strong tonal contrast
    if f.saturation_mean < 0.2 && f.std_r + f.std_g + f.std_b > 80.0 {
        return (MaterialClass::Metal, 0.5);
    }
    // Wood: warm tones, grain
    if f.warm_ratio > 0.38 && f.warm_ratio < 0.5 && f.edge_density > 0.02 && f.edge_density < 0.08 {
        return (MaterialClass::Wood, 0.6);
    }
    // Fabric: woven patterns, moderate saturation
    if f.edge_density > 0.03 && f.saturation_mean > 0.2 && f.saturation_mean < 0.6 {
        return (MaterialClass::Fabric, 0.5);
    }
    // Stone: cool, medium variance
    if f.warm_ratio < 0.34 && f.variance > 100.0 && f.variance < 2000.0 {
        return (MaterialClass::Stone, 0.45);
    }
    // Plastic: saturated and uniform
    if f.saturation_mean > 0.4 && f.variance < 300.0 {
        return (MaterialClass::Plastic, 0.5);
    }
    (MaterialClass::Unknown, 0.3)
}

/// Offline analyzer built on color statistics. Never fails on a decodable image.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn estimate(&self, tex: &TextureMap) -> PbrParameters {
        let f = extract_features(tex);
        let (class, confidence) = classify(&f);
        let (is_metal, roughness, ao, displacement) = class.base_parameters();

        // Busier surfaces get more relief
        let relief = (f.edge_density * 4.0).min(0.2);

        PbrParameters {
            is_metal,
            roughness_estimate: roughness,
            ao_intensity: ao,
            displacement_contrast: (displacement + relief).min(1.0),
            description: format!(
                "Heuristic estimate: looks like {} (confidence {:.2}), mean luminance {:.0}, saturation {:.2}.",
                class.as_str(),
                confidence,
                f.mean_luminance,
                f.saturation_mean
            ),
        }
        .clamped()
    }
}

impl MaterialAnalyzer for HeuristicAnalyzer {
    async fn analyze(&self, image: &AnalysisImage) -> Result<PbrParameters, AnalysisError> {
        let decoded =
            ImageLoader::load_from_memory(&image.data).map_err(|e| AnalysisError::Image(e.to_string()))?;
        Ok(self.estimate(&TextureMap::from_loaded(decoded, None)))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Request written to an external analyzer's stdin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerRequest<'a> {
    pub prompt: &'a str,
    pub mime_type: &'a str,
    pub width: u32,
    pub height: u32,
    /// Base64-encoded image bytes
    pub data: String,
}

/// Runs an external program as the analyzer.
///
/// The program receives an [`AnalyzerRequest`] as JSON on stdin and must
/// print the parameters as JSON (camelCase keys) on stdout. A program still
/// running after `timeout` is killed and the analysis fails.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandAnalyzer {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            timeout: DEFAULT_ANALYZER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, image: &AnalysisImage) -> Result<PbrParameters, AnalysisError> {
        let request = AnalyzerRequest {
            prompt: ANALYSIS_PROMPT,
            mime_type: image.mime_type,
            width: image.width,
            height: image.height,
            data: image.to_base64(),
        };
        let input = serde_json::to_vec(&request)
            .map_err(|e| AnalysisError::Process(format!("could not serialize request: {}", e)))?;

        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AnalysisError::Unavailable(format!("{}: {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .await
                .map_err(|e| AnalysisError::Process(format!("writing request: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AnalysisError::Process(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::Process(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        parse_analysis_response(&String::from_utf8_lossy(&output.stdout))
    }
}

impl MaterialAnalyzer for CommandAnalyzer {
    async fn analyze(&self, image: &AnalysisImage) -> Result<PbrParameters, AnalysisError> {
        // Dropping the timed-out future drops the child, which kill_on_drop reaps.
        tokio::time::timeout(self.timeout, self.run(image))
            .await
            .map_err(|_| {
                AnalysisError::Process(format!(
                    "{} timed out after {}s",
                    self.command,
                    self.timeout.as_secs_f32()
                ))
            })?
    }

    fn name(&self) -> &str {
        &self.command
    }
}

/// Analyzer chosen at runtime from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredAnalyzer {
    Heuristic(HeuristicAnalyzer),
    Command(CommandAnalyzer),
}

impl MaterialAnalyzer for ConfiguredAnalyzer {
    async fn analyze(&self, image: &AnalysisImage) -> Result<PbrParameters, AnalysisError> {
        match self {
            ConfiguredAnalyzer::Heuristic(a) => a.analyze(image).await,
            ConfiguredAnalyzer::Command(a) => a.analyze(image).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            ConfiguredAnalyzer::Heuristic(a) => a.name(),
            ConfiguredAnalyzer::Command(a) => a.name(),
        }
    }
}
