//! Function approximators reading from and writing to a [`TensorDict`].
use crate::{model::SubModel1, params::ParamSet, TensorDict};
use anyhow::{bail, Result};
use candle_core::{DType, Tensor, D};
use candle_nn::VarBuilder;
use offrl_core::NestedKey;
use std::marker::PhantomData;

/// A function approximator with named inputs and outputs.
///
/// The module itself holds no parameter values. [`FunctionalModule::forward`]
/// is a pure function of a [`ParamSet`] and the input batch, so evaluating
/// the module under live, target or ensemble parameters only differs in the
/// `ParamSet` passed in.
pub trait FunctionalModule {
    /// Keys of the inputs, in the order they are consumed.
    fn in_keys(&self) -> &[NestedKey];

    /// Keys of the outputs written by [`FunctionalModule::forward`].
    fn out_keys(&self) -> &[NestedKey];

    /// Registers freshly initialized parameters of the module in `vb`.
    fn init(&self, vb: VarBuilder) -> Result<()>;

    /// Evaluates the module on `td` under `params` and writes its outputs into `td`.
    fn forward(&self, params: &ParamSet, td: &mut TensorDict) -> Result<()>;
}

/// Wraps a [`SubModel1`] mapping a tensor to a tensor as a [`FunctionalModule`].
///
/// The inputs are concatenated along the last dimension before being fed to
/// the model, so a state-action value function takes
/// `in_keys = ["observation", "action"]`.
pub struct TensorDictModule<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: Clone,
{
    prefix: String,
    config: P::Config,
    in_keys: Vec<NestedKey>,
    out_keys: Vec<NestedKey>,
    phantom: PhantomData<P>,
}

impl<P> TensorDictModule<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: Clone,
{
    /// Creates a module whose parameters are named under `prefix`.
    pub fn new(
        prefix: impl Into<String>,
        config: P::Config,
        in_keys: Vec<NestedKey>,
        out_key: impl Into<NestedKey>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            config,
            in_keys,
            out_keys: vec![out_key.into()],
            phantom: PhantomData,
        }
    }

    fn build_model(&self, vb: VarBuilder) -> Result<P> {
        P::build(vb.pp(&self.prefix), self.config.clone())
    }
}

impl<P> FunctionalModule for TensorDictModule<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: Clone,
{
    fn in_keys(&self) -> &[NestedKey] {
        &self.in_keys
    }

    fn out_keys(&self) -> &[NestedKey] {
        &self.out_keys
    }

    fn init(&self, vb: VarBuilder) -> Result<()> {
        self.build_model(vb)?;
        Ok(())
    }

    fn forward(&self, params: &ParamSet, td: &mut TensorDict) -> Result<()> {
        let model = self.build_model(params.var_builder())?;
        let xs = concat_inputs(td, &self.in_keys)?;
        let ys = model.forward(&xs)?;
        td.set(self.out_keys[0].clone(), ys)
    }
}

/// Concatenates the tensors at `keys` along the last dimension, as `f32`.
pub fn concat_inputs(td: &TensorDict, keys: &[NestedKey]) -> Result<Tensor> {
    let xs = keys
        .iter()
        .map(|k| Ok(td.get(k)?.to_dtype(DType::F32)?))
        .collect::<Result<Vec<_>>>()?;
    match xs.len() {
        0 => bail!("A module needs at least one input key"),
        1 => Ok(xs[0].clone()),
        _ => Ok(Tensor::cat(&xs, D::Minus1)?),
    }
}
