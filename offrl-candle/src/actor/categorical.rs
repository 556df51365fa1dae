use super::ProbabilisticActor;
use crate::{
    model::SubModel1,
    module::{concat_inputs, FunctionalModule},
    params::ParamSet,
    selection::ActionSelection,
    TensorDict,
};
use anyhow::Result;
use candle_core::{Tensor, D};
use candle_nn::{ops::log_softmax, VarBuilder};
use offrl_core::{ActionSpace, NestedKey};
use std::marker::PhantomData;

/// Actor with categorical policy over a discrete action space.
///
/// The model `P` outputs unnormalized logits, written under `logits` by
/// [`FunctionalModule::forward`]. Recorded actions are read according to the
/// action space, as integer indices or one-hot vectors.
pub struct CategoricalActor<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: Clone,
{
    prefix: String,
    config: P::Config,
    in_keys: Vec<NestedKey>,
    out_keys: Vec<NestedKey>,
    selection: ActionSelection,
    phantom: PhantomData<P>,
}

impl<P> CategoricalActor<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: Clone,
{
    /// Creates an actor reading the observation from `in_keys`.
    pub fn new(
        prefix: impl Into<String>,
        config: P::Config,
        in_keys: Vec<NestedKey>,
        action_space: ActionSpace,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            config,
            in_keys,
            out_keys: vec!["logits".into()],
            selection: ActionSelection::discrete(action_space),
            phantom: PhantomData,
        }
    }

    fn logits(&self, params: &ParamSet, td: &TensorDict) -> Result<Tensor> {
        let model = P::build(params.var_builder().pp(&self.prefix), self.config.clone())?;
        model.forward(&concat_inputs(td, &self.in_keys)?)
    }
}

impl<P> FunctionalModule for CategoricalActor<P>
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
        P::build(vb.pp(&self.prefix), self.config.clone())?;
        Ok(())
    }

    fn forward(&self, params: &ParamSet, td: &mut TensorDict) -> Result<()> {
        let logits = self.logits(params, td)?;
        td.set(self.out_keys[0].clone(), logits)
    }
}

impl<P> ProbabilisticActor for CategoricalActor<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: Clone,
{
    fn log_prob(&self, params: &ParamSet, td: &TensorDict, action: &Tensor) -> Result<Tensor> {
        let log_probs = log_softmax(&self.logits(params, td)?, D::Minus1)?;
        self.selection.select(&log_probs, action)
    }
}
