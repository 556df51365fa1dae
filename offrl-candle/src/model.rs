//! Interface of neural networks used in objectives.
use anyhow::Result;
use candle_nn::VarBuilder;

/// Neural network model not owing its parameters.
///
/// A model reads every parameter from the [`VarBuilder`] passed to
/// [`SubModel1::build`]. Building it from a `VarBuilder` backed by a `VarMap`
/// registers fresh trainable parameters; building it from one backed by a
/// parameter snapshot evaluates the same architecture under those values.
///
/// [`VarBuilder`]: https://docs.rs/candle-nn/0.8.4/candle_nn/var_builder/type.VarBuilder.html
pub trait SubModel1 {
    /// Configuration from which [`SubModel1`] is constructed.
    type Config;

    /// Input of the [`SubModel1`].
    type Input;

    /// Output of the [`SubModel1`].
    type Output;

    /// Builds [`SubModel1`] with [`VarBuilder`] and [`SubModel1::Config`].
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// A generalized forward function.
    fn forward(&self, input: &Self::Input) -> Result<Self::Output>;
}
