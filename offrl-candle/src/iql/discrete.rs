use super::{IqlConfig, IqlLoss, IqlLossOutput};
use crate::{
    actor::ProbabilisticActor, module::FunctionalModule, params::FunctionalParams,
    selection::ActionSelection, TensorDict,
};
use anyhow::Result;
use candle_core::Tensor;
use log::warn;
use offrl_core::{ActionSpace, LossKeys, NestedKey, ValueEstimatorConfig};
use std::path::{Path, PathBuf};

/// IQL loss for discrete action spaces.
///
/// The qvalue network takes the state only and outputs one value per action,
/// `[..., n_actions]`. The value of the recorded action is read according to
/// the action space: by index for categorical actions, by a dot product for
/// one-hot, multi-one-hot and binary actions.
pub struct DiscreteIqlLoss<A, Q, V>
where
    A: ProbabilisticActor,
    Q: FunctionalModule,
    V: FunctionalModule,
{
    loss: IqlLoss<A, Q, V>,
    action_space: ActionSpace,
}

impl<A, Q, V> DiscreteIqlLoss<A, Q, V>
where
    A: ProbabilisticActor,
    Q: FunctionalModule,
    V: FunctionalModule,
{
    /// Builds the loss and initializes the parameters of the networks.
    ///
    /// Without `action_space` in the config, one-hot actions are assumed.
    pub fn build(actor: A, qvalue: Q, value: V, config: &IqlConfig) -> Result<Self> {
        let action_space = match config.action_space {
            Some(action_space) => action_space,
            None => {
                warn!("action_space is not given, one-hot actions are assumed");
                ActionSpace::OneHot
            }
        };
        let selection = ActionSelection::discrete(action_space);
        let loss = IqlLoss::build_with_selection(actor, qvalue, value, config, selection)?;
        Ok(Self { loss, action_space })
    }

    /// Encoding of the actions.
    pub fn action_space(&self) -> ActionSpace {
        self.action_space
    }

    /// See [`IqlLoss::forward`].
    pub fn forward(&self, td: &mut TensorDict) -> Result<IqlLossOutput> {
        self.loss.forward(td)
    }

    /// See [`IqlLoss::actor_loss`].
    pub fn actor_loss(&self, td: &TensorDict) -> Result<(Tensor, Tensor)> {
        self.loss.actor_loss(td)
    }

    /// See [`IqlLoss::value_loss`].
    pub fn value_loss(&self, td: &TensorDict) -> Result<Tensor> {
        self.loss.value_loss(td)
    }

    /// See [`IqlLoss::qvalue_loss`].
    pub fn qvalue_loss(&self, td: &TensorDict) -> Result<(Tensor, Tensor)> {
        self.loss.qvalue_loss(td)
    }

    /// See [`IqlLoss::in_keys`].
    pub fn in_keys(&self) -> Vec<NestedKey> {
        self.loss.in_keys()
    }

    /// See [`IqlLoss::set_keys`].
    pub fn set_keys(&mut self, keys: LossKeys) {
        self.loss.set_keys(keys)
    }

    /// See [`IqlLoss::make_value_estimator`].
    pub fn make_value_estimator(&mut self, config: &ValueEstimatorConfig) -> Result<()> {
        self.loss.make_value_estimator(config)
    }

    /// Parameters of the qvalue ensemble.
    pub fn qvalue_params(&self) -> &FunctionalParams {
        self.loss.qvalue_params()
    }

    /// See [`IqlLoss::save_params`].
    pub fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.loss.save_params(path)
    }

    /// See [`IqlLoss::load_params`].
    pub fn load_params(&mut self, path: &Path) -> Result<()> {
        self.loss.load_params(path)
    }

    /// The underlying loss, for accessing the networks and their parameters.
    pub fn inner(&self) -> &IqlLoss<A, Q, V> {
        &self.loss
    }

    /// The underlying loss, for optimization.
    pub fn inner_mut(&mut self) -> &mut IqlLoss<A, Q, V> {
        &mut self.loss
    }
}
