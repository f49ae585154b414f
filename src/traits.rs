use crate::errors::Result;
use ndarray::prelude::*;

/// An opaque loaded model: tensor in, tensor out.
///
/// Implementations must be safe to call from several request threads at once and must not
/// carry state from one call into the next.
pub trait ScoringSession: Send + Sync {
    /// Human-readable model name used in logs and errors.
    fn name(&self) -> &str;

    /// Input shape declared by the artifact, `None` for dynamic dimensions.
    fn declared_input(&self) -> Vec<Option<usize>>;

    /// Output shape declared by the artifact, `None` for dynamic dimensions.
    fn declared_output(&self) -> Vec<Option<usize>>;

    /// Run one forward pass.
    fn run(&self, input: ArrayViewD<f32>) -> Result<ArrayD<f32>>;
}

/// The identity-provider boundary.
pub trait TokenVerifier: Send + Sync {
    /// Returns the authenticated principal for a bearer token.
    fn verify(&self, token: &str) -> Result<String>;
}
