//! End-to-end operations over a [`Session`].
//!
//! - [`smart_generate`] - analyze the base color (optional), fall back to
//!   defaults on failure, synthesize and bind all six maps
//! - [`full_repack`] - pack the session's channels; needs a base color
//! - [`Repacker`] - async repack scheduling where newer requests supersede
//!   older ones
//! - [`export_session`] - write every available export for a session

use crate::analysis::{AnalysisImage, MaterialAnalyzer};
use crate::export::{ExportBundle, ExportEncoder};
use crate::packing::{ChannelPacker, ExportResolution, PackedOutput};
use crate::sampler::ImageSampler;
use crate::session::{ChannelTable, Session};
use crate::synthesis::PbrParameters;
use crate::{Error, Result};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// What [`smart_generate`] ended up using.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    pub parameters: PbrParameters,
    /// Name of the analyzer that ran, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    /// Set when analysis failed and `defaults` were used instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Analyze the session's base color and regenerate every procedural map.
///
/// Without an analyzer, or when analysis fails, `defaults` drive synthesis.
/// Analysis failure is logged and reported in the outcome, never returned
/// as an error.
pub async fn smart_generate<A: MaterialAnalyzer>(
    session: &mut Session,
    analyzer: Option<&A>,
    defaults: &PbrParameters,
    sampler: &dyn ImageSampler,
) -> Result<GenerateOutcome> {
    let base = session.base_color().ok_or(Error::MissingBaseColor)?;

    let outcome = match analyzer {
        None => GenerateOutcome {
            parameters: defaults.clone(),
            analyzer: None,
            fallback_reason: None,
        },
        Some(analyzer) => {
            let started = Instant::now();
            let result = match AnalysisImage::prepare(base, sampler) {
                Ok(image) => analyzer.analyze(&image).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(parameters) => {
                    tracing::info!(
                        analyzer = analyzer.name(),
                        is_metal = parameters.is_metal,
                        roughness = parameters.roughness_estimate,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "material analyzed"
                    );
                    GenerateOutcome {
                        parameters,
                        analyzer: Some(analyzer.name().to_string()),
                        fallback_reason: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(analyzer = analyzer.name(), error = %e, "analysis failed, using default parameters");
                    GenerateOutcome {
                        parameters: defaults.clone(),
                        analyzer: Some(analyzer.name().to_string()),
                        fallback_reason: Some(e.to_string()),
                    }
                }
            }
        }
    };

    if analyzer.is_some() {
        session.mark_analyzed();
    }
    session.update_parameters(outcome.parameters.clone())?;
    Ok(outcome)
}

/// Pack the session's AO, Metallic, Roughness and Displacement channels.
pub fn full_repack(session: &Session, sampler: &dyn ImageSampler) -> Result<PackedOutput> {
    if session.base_color().is_none() {
        return Err(Error::MissingBaseColor);
    }
    ChannelPacker::new(sampler).pack_table(session.channels(), session.resolution())
}

/// Write the AOMRD pack and any bound NORMAL / ALPHA maps for the session.
pub fn export_session<P: AsRef<Path>>(
    session: &Session,
    sampler: &dyn ImageSampler,
    dir: P,
) -> Result<ExportBundle> {
    if session.base_color().is_none() {
        return Err(Error::MissingBaseColor);
    }
    ExportEncoder::new(sampler).export_bundle(session.channels(), session.resolution(), dir)
}

/// Result of one scheduled repack.
#[derive(Debug, Clone, PartialEq)]
pub enum RepackOutcome {
    Packed(PackedOutput),
    /// A newer request was issued before this one finished; its result was
    /// discarded.
    Superseded,
}

impl RepackOutcome {
    pub fn packed(self) -> Option<PackedOutput> {
        match self {
            RepackOutcome::Packed(out) => Some(out),
            RepackOutcome::Superseded => None,
        }
    }
}

/// Schedules repacks on blocking workers. Each request takes a ticket; only
/// the holder of the latest ticket may publish a result.
#[derive(Clone)]
pub struct Repacker {
    generation: Arc<AtomicU64>,
    sampler: Arc<dyn ImageSampler>,
}

impl Repacker {
    pub fn new(sampler: Arc<dyn ImageSampler>) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            sampler,
        }
    }

    /// Ticket of the most recent request.
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Supersede any in-flight repack without starting a new one.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Start a repack of `table`. The ticket is taken immediately, so a
    /// later call supersedes this one even before it is polled.
    pub fn request(
        &self,
        table: ChannelTable,
        resolution: ExportResolution,
    ) -> impl Future<Output = Result<RepackOutcome>> + Send + 'static {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let sampler = Arc::clone(&self.sampler);

        async move {
            let worker_generation = Arc::clone(&generation);
            let packed = tokio::task::spawn_blocking(move || {
                let is_stale = || worker_generation.load(Ordering::SeqCst) != ticket;
                if is_stale() {
                    return Ok(None);
                }
                ChannelPacker::new(sampler.as_ref()).pack_cancellable(table.packed(), resolution, &is_stale)
            })
            .await
            .map_err(|e| Error::Other(format!("Repack worker failed: {}", e)))??;

            match packed {
                Some(out) if generation.load(Ordering::SeqCst) == ticket => Ok(RepackOutcome::Packed(out)),
                _ => {
                    tracing::debug!(ticket, "discarding superseded repack");
                    Ok(RepackOutcome::Superseded)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, HeuristicAnalyzer};
    use crate::export::ExportRole;
    use crate::image_loading::TextureChannel;
    use crate::sampler::FilteredSampler;
    use crate::texture::TextureMap;

    struct BrokenAnalyzer;

    impl MaterialAnalyzer for BrokenAnalyzer {
        async fn analyze(&self, _image: &AnalysisImage) -> std::result::Result<PbrParameters, AnalysisError> {
            Err(AnalysisError::MalformedResponse("not json".into()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn grey_session(v: u8) -> Session {
        let mut session = Session::new().with_resolution(ExportResolution::Res512);
        session.set_base_color(TextureMap::filled(4, 4, [v, v, v, 255]));
        session
    }

    #[tokio::test]
    async fn smart_generate_requires_base_color() {
        let mut session = Session::new();
        let result = smart_generate(
            &mut session,
            Some(&HeuristicAnalyzer),
            &PbrParameters::default(),
            &FilteredSampler::default(),
        )
        .await;
        assert!(matches!(result, Err(Error::MissingBaseColor)));
    }

    #[tokio::test]
    async fn analysis_failure_falls_back_to_defaults() {
        let mut session = grey_session(200);
        let defaults = PbrParameters {
            roughness_estimate: 0.25,
            ..Default::default()
        };
        let outcome = smart_generate(&mut session, Some(&BrokenAnalyzer), &defaults, &FilteredSampler::default())
            .await
            .unwrap();

        assert_eq!(outcome.parameters, defaults);
        assert!(outcome.fallback_reason.unwrap().contains("not json"));
        assert!(session.has_analyzed());
        assert_eq!(session.parameters(), &defaults);
        assert_eq!(session.channels().bound_count(), 6);
    }

    #[tokio::test]
    async fn skipping_analysis_uses_defaults_without_marking_analyzed() {
        let mut session = grey_session(120);
        let outcome = smart_generate::<HeuristicAnalyzer>(
            &mut session,
            None,
            &PbrParameters::default(),
            &FilteredSampler::default(),
        )
        .await
        .unwrap();
        assert!(outcome.analyzer.is_none());
        assert!(!session.has_analyzed());
        assert_eq!(session.channels().bound_count(), 6);
    }

    #[tokio::test]
    async fn heuristic_smart_generate_binds_maps() {
        let mut session = grey_session(128);
        let outcome = smart_generate(
            &mut session,
            Some(&HeuristicAnalyzer),
            &PbrParameters::default(),
            &FilteredSampler::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.analyzer.as_deref(), Some("heuristic"));
        assert!(outcome.fallback_reason.is_none());
        assert!(session.has_analyzed());
        let normal = session.channels().get(TextureChannel::Normal).image.as_ref().unwrap();
        assert_eq!(normal.pixel(1, 1), Some([128, 128, 255, 255]));
    }

    #[test]
    fn full_repack_needs_base_and_keeps_slot_intensities() {
        let sampler = FilteredSampler::default();
        assert!(matches!(full_repack(&Session::new(), &sampler), Err(Error::MissingBaseColor)));

        let mut session = grey_session(200);
        session.regenerate().unwrap();
        let out = full_repack(&session, &sampler).unwrap();
        assert_eq!((out.texture.width, out.texture.height), (512, 512));
        // AO 200 at intensity 1, metallic at intensity 0, roughness 138 at
        // intensity 0.5, displacement at intensity 0.
        assert!(out.texture.pixels().all(|p| p == [200, 0, 69, 0]));
    }

    #[test]
    fn export_session_writes_all_three_roles_after_generation() {
        let sampler = FilteredSampler::default();
        let dir = tempfile::tempdir().unwrap();
        assert!(export_session(&Session::new(), &sampler, dir.path()).is_err());

        let mut session = grey_session(90);
        session.regenerate().unwrap();
        let bundle = export_session(&session, &sampler, dir.path()).unwrap();
        assert_eq!(bundle.written.len(), 3);
        assert!(bundle.path(ExportRole::Alpha).unwrap().ends_with("T_ALPHA_512.png"));
        assert!(dir.path().join("T_NORMAL_512.png").exists());
    }

    #[tokio::test]
    async fn newer_request_supersedes_older() {
        let repacker = Repacker::new(Arc::new(FilteredSampler::default()));
        let mut first = ChannelTable::default();
        first.upload(TextureChannel::AmbientOcclusion, TextureMap::filled(8, 8, [10, 10, 10, 255]));
        let second = ChannelTable::default();

        let a = repacker.request(first, ExportResolution::Res512);
        let b = repacker.request(second, ExportResolution::Res512);
        let (a, b) = tokio::join!(a, b);

        assert_eq!(a.unwrap(), RepackOutcome::Superseded);
        let packed = b.unwrap().packed().unwrap();
        assert!(packed.texture.pixels().all(|p| p == [255, 0, 128, 0]));
        assert_eq!(repacker.current(), 2);
    }

    /// Supersedes its repacker from inside the worker, after the pre-pack
    /// ticket check has already passed.
    #[derive(Default)]
    struct InvalidatingSampler {
        repacker: std::sync::OnceLock<Repacker>,
        resamples: AtomicU64,
    }

    impl ImageSampler for InvalidatingSampler {
        fn load(&self, bytes: &[u8]) -> std::result::Result<TextureMap, crate::image_loading::DecodeError> {
            FilteredSampler::default().load(bytes)
        }

        fn resample(&self, grid: &TextureMap, width: u32, height: u32) -> Result<TextureMap> {
            self.resamples.fetch_add(1, Ordering::SeqCst);
            if let Some(repacker) = self.repacker.get() {
                repacker.invalidate();
            }
            FilteredSampler::default().resample(grid, width, height)
        }
    }

    #[tokio::test]
    async fn ticket_change_mid_pack_discards_result() {
        let sampler = Arc::new(InvalidatingSampler::default());
        let repacker = Repacker::new(sampler.clone());
        assert!(sampler.repacker.set(repacker.clone()).is_ok());

        let mut table = ChannelTable::default();
        table.upload(TextureChannel::AmbientOcclusion, TextureMap::filled(8, 8, [10, 10, 10, 255]));
        let outcome = repacker.request(table, ExportResolution::Res512).await.unwrap();

        assert_eq!(outcome, RepackOutcome::Superseded);
        assert_eq!(sampler.resamples.load(Ordering::SeqCst), 1);
        assert_eq!(repacker.current(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_analyzer_falls_back_to_defaults() {
        use crate::analysis::CommandAnalyzer;
        use std::time::Duration;

        let analyzer = CommandAnalyzer::new("sh", vec!["-c".into(), "sleep 5".into()])
            .with_timeout(Duration::from_millis(200));
        let mut session = grey_session(150);
        let outcome = smart_generate(&mut session, Some(&analyzer), &PbrParameters::default(), &FilteredSampler::default())
            .await
            .unwrap();

        assert!(outcome.fallback_reason.unwrap().contains("timed out"));
        assert_eq!(outcome.parameters, PbrParameters::default());
        assert_eq!(session.channels().bound_count(), 6);
    }

    #[tokio::test]
    async fn invalidate_discards_in_flight_result() {
        let repacker = Repacker::new(Arc::new(FilteredSampler::default()));
        let pending = repacker.request(ChannelTable::default(), ExportResolution::Res512);
        repacker.invalidate();
        assert_eq!(pending.await.unwrap(), RepackOutcome::Superseded);
    }
}
