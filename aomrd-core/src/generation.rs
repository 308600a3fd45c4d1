//! Image generator seam.
//!
//! Base-color images may come from a generator (a text-to-image or
//! image-to-image service) instead of an upload. The generator returns one
//! or more candidates; the caller picks one and it becomes the session's
//! base color.

use crate::session::Session;
use crate::texture::TextureMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Generator returned no images")]
    Empty,

    #[error("Candidate {index} out of range ({count} generated)")]
    NoSuchCandidate { index: usize, count: usize },
}

/// Prompt plus an optional reference image.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub reference: Option<TextureMap>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: TextureMap) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// Trait for base-color generators
#[allow(async_fn_in_trait)]
pub trait ImageGenerator {
    /// Generate candidate images for the request
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<TextureMap>, GenerationError>;
}

/// Run the generator and bind candidate `index` as the session's base color.
///
/// Returns how many candidates were generated. Procedural maps are not
/// regenerated; run [`crate::pipeline::smart_generate`] afterwards.
pub async fn generate_base_color<G: ImageGenerator>(
    session: &mut Session,
    generator: &G,
    request: &GenerationRequest,
    index: usize,
) -> crate::Result<usize> {
    let mut images = generator.generate(request).await?;
    let count = images.len();
    if count == 0 {
        return Err(GenerationError::Empty.into());
    }
    if index >= count {
        return Err(GenerationError::NoSuchCandidate { index, count }.into());
    }

    let chosen = images.swap_remove(index);
    tracing::info!(
        count,
        index,
        width = chosen.width,
        height = chosen.height,
        "bound generated base color"
    );
    session.set_base_color(chosen);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SolidGenerator {
        shades: Vec<u8>,
    }

    impl ImageGenerator for SolidGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<Vec<TextureMap>, GenerationError> {
            if request.prompt.is_empty() {
                return Err(GenerationError::Generation("empty prompt".into()));
            }
            let size = request.reference.as_ref().map(|r| r.width).unwrap_or(8);
            Ok(self
                .shades
                .iter()
                .map(|&v| TextureMap::filled(size, size, [v, v, v, 255]))
                .collect())
        }
    }

    #[tokio::test]
    async fn chosen_candidate_becomes_base_color() {
        let generator = SolidGenerator { shades: vec![10, 20, 30] };
        let mut session = Session::new();
        let request = GenerationRequest::new("mossy cobblestone")
            .with_reference(TextureMap::filled(4, 4, [0, 0, 0, 255]));

        let count = generate_base_color(&mut session, &generator, &request, 1).await.unwrap();
        assert_eq!(count, 3);
        let base = session.base_color().unwrap();
        assert_eq!(base.width, 4);
        assert_eq!(base.pixel(0, 0), Some([20, 20, 20, 255]));
        assert!(!session.has_analyzed());
    }

    #[tokio::test]
    async fn empty_and_out_of_range_results_are_errors() {
        let mut session = Session::new();
        let request = GenerationRequest::new("rust");

        let none = SolidGenerator { shades: vec![] };
        assert!(matches!(
            generate_base_color(&mut session, &none, &request, 0).await,
            Err(crate::Error::Generation(GenerationError::Empty))
        ));

        let one = SolidGenerator { shades: vec![5] };
        assert!(matches!(
            generate_base_color(&mut session, &one, &request, 2).await,
            Err(crate::Error::Generation(GenerationError::NoSuchCandidate { index: 2, count: 1 }))
        ));
        assert!(session.base_color().is_none());
    }

    #[tokio::test]
    async fn generator_failure_propagates() {
        let mut session = Session::new();
        let generator = SolidGenerator { shades: vec![1] };
        let result = generate_base_color(&mut session, &generator, &GenerationRequest::default(), 0).await;
        assert!(matches!(result, Err(crate::Error::Generation(GenerationError::Generation(_)))));
    }
}
