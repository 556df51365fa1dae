//! Probabilistic actors.
mod categorical;
mod gaussian;
use crate::{module::FunctionalModule, params::ParamSet, TensorDict};
use anyhow::Result;
use candle_core::Tensor;
pub use categorical::CategoricalActor;
pub use gaussian::GaussianActor;

/// A policy whose log-density can be evaluated on recorded actions.
pub trait ProbabilisticActor: FunctionalModule {
    /// Log-probability of `action` under the policy evaluated on `td` with
    /// `params`.
    ///
    /// The result has the batch shape of `td`; gradients flow into `params`.
    fn log_prob(&self, params: &ParamSet, td: &TensorDict, action: &Tensor) -> Result<Tensor>;
}
