use crate::codec::{CodecError, LayerLayout, NetworkParams};

/// Loss and gradient of a network for one parameter instantiation.
///
/// Evaluated concurrently for every particle of the swarm, hence `Send + Sync`.
/// The returned gradient must have the same structure as `params`.
pub trait Objective: Send + Sync {
    fn loss_and_gradient(&self, params: &NetworkParams) -> (f32, NetworkParams);

    /// Rejects a layout this objective cannot evaluate. Checked once, before
    /// the first evaluation.
    fn check_layout(&self, _layout: &LayerLayout) -> Result<(), CodecError> {
        Ok(())
    }
}

impl<F> Objective for F
where
    F: Fn(&NetworkParams) -> (f32, NetworkParams) + Send + Sync,
{
    fn loss_and_gradient(&self, params: &NetworkParams) -> (f32, NetworkParams) {
        self(params)
    }
}
