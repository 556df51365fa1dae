use super::{IqlConfig, IqlLossOutput};
use crate::{
    actor::ProbabilisticActor,
    ensemble::vmap_module,
    module::FunctionalModule,
    params::{FunctionalParams, ParamSet},
    selection::ActionSelection,
    util::{advantage_weight, distance_loss, expectile_loss},
    value::{make_value_estimator, squeeze_batch, ValueEstimator},
    TensorDict,
};
use anyhow::Result;
use candle_core::Tensor;
use log::{info, trace};
use offrl_core::{
    error::OffrlError, LossFunction, LossKeys, NestedKey, ValueEstimatorConfig,
    ValueEstimatorKeys,
};
use std::{
    convert::TryFrom,
    fs,
    path::{Path, PathBuf},
};

fn shape_mismatch(what: &str, a: &Tensor, b: &Tensor) -> anyhow::Error {
    let msg = format!("{} {:?} vs {:?}", what, a.dims(), b.dims());
    OffrlError::ShapeMismatch(msg).into()
}

/// Implicit Q-learning (IQL) loss.
///
/// The loss binds three function approximators: a probabilistic actor, a
/// state-action value function replicated `num_qvalue_nets` times, and a state
/// value function. Actions are continuous; the qvalue network takes the action
/// as one of its inputs and outputs `[..., 1]`. See
/// [`DiscreteIqlLoss`](super::DiscreteIqlLoss) for discrete action spaces.
///
/// The actor and the value network are trained on their live parameters only.
/// The qvalue ensemble keeps target parameters, read by the actor and value
/// losses and refreshed only by an explicit update (see
/// [`IqlOptimizer`](super::IqlOptimizer)).
pub struct IqlLoss<A, Q, V>
where
    A: ProbabilisticActor,
    Q: FunctionalModule,
    V: FunctionalModule,
{
    actor: A,
    qvalue: Q,
    value: V,
    actor_params: FunctionalParams,
    qvalue_params: FunctionalParams,
    value_params: FunctionalParams,
    value_estimator: Box<dyn ValueEstimator>,
    keys: LossKeys,
    temperature: f64,
    expectile: f64,
    loss_function: LossFunction,
    selection: ActionSelection,
}

impl<A, Q, V> IqlLoss<A, Q, V>
where
    A: ProbabilisticActor,
    Q: FunctionalModule,
    V: FunctionalModule,
{
    /// Builds the loss and initializes the parameters of the networks.
    pub fn build(actor: A, qvalue: Q, value: V, config: &IqlConfig) -> Result<Self> {
        Self::build_with_selection(actor, qvalue, value, config, ActionSelection::Continuous)
    }

    pub(super) fn build_with_selection(
        actor: A,
        qvalue: Q,
        value: V,
        config: &IqlConfig,
        selection: ActionSelection,
    ) -> Result<Self> {
        let config = config.resolve()?;
        let device = match config.device {
            Some(device) => candle_core::Device::try_from(device)?,
            None => candle_core::Device::Cpu,
        };

        let actor_params = FunctionalParams::build("actor", &actor, &device, false)?;
        let qvalue_params = FunctionalParams::build_ensemble(
            "qvalue",
            &qvalue,
            config.num_qvalue_nets,
            &device,
            true,
        )?;
        let value_params = FunctionalParams::build("value", &value, &device, false)?;
        let value_estimator =
            make_value_estimator(&config.value_estimator, config.keys.value_estimator_keys())?;
        info!(
            "Build IQL loss with {} qvalue networks and {} estimator",
            config.num_qvalue_nets, config.value_estimator.kind
        );

        Ok(Self {
            actor,
            qvalue,
            value,
            actor_params,
            qvalue_params,
            value_params,
            value_estimator,
            keys: config.keys,
            temperature: config.temperature,
            expectile: config.expectile,
            loss_function: config.loss_function,
            selection,
        })
    }

    /// Computes the three losses on a batch of transitions.
    ///
    /// A batch with more than one batch dimension (e.g., `[B, T]`) is
    /// flattened for the computation. The priority (max squared TD error over
    /// the ensemble) and the detached log-probability of the recorded actions
    /// are written into `td` with its original batch shape.
    pub fn forward(&self, td: &mut TensorDict) -> Result<IqlLossOutput> {
        let batch_size = td.batch_size().to_vec();
        let flat = match td.ndim() > 1 {
            true => td.flatten()?,
            false => td.clone(),
        };

        let (loss_actor, log_prob) = self.actor_loss(&flat)?;
        let (loss_qvalue, priority) = self.qvalue_loss(&flat)?;
        let loss_value = self.value_loss(&flat)?;

        if loss_actor.shape() != loss_qvalue.shape() {
            return Err(shape_mismatch("loss_actor and loss_qvalue", &loss_actor, &loss_qvalue));
        }
        if loss_actor.shape() != loss_value.shape() {
            return Err(shape_mismatch("loss_actor and loss_value", &loss_actor, &loss_value));
        }
        let entropy = log_prob.mean_all()?.neg()?;

        let mut written = TensorDict::new(flat.batch_size());
        written.set(self.keys.priority.clone(), priority)?;
        written.set(self.keys.log_prob.clone(), log_prob)?;
        td.update(&written.reshape(&batch_size)?.detach()?)?;

        Ok(IqlLossOutput {
            loss_actor,
            loss_qvalue,
            loss_value,
            entropy,
        })
    }

    /// Values of the recorded actions under every member of the ensemble,
    /// `[N, B]`.
    fn qvalues(&self, td: &TensorDict, params: &ParamSet) -> Result<Tensor> {
        let out = vmap_module(&self.qvalue, params, td)?;
        let q = out.get(&self.keys.state_action_value)?;
        self.selection.select(q, td.get(&self.keys.action)?)
    }

    /// Minimum over the target ensemble of the values of the recorded actions.
    fn min_target_qvalue(&self, td: &TensorDict) -> Result<Tensor> {
        let q = self.qvalues(td, &self.qvalue_params.target()?)?;
        Ok(q.min(0)?.detach())
    }

    /// State values under `params`, with the batch shape of `td`.
    fn state_value(&self, td: &TensorDict, params: &ParamSet) -> Result<Tensor> {
        let mut td_v = td.select(self.value.in_keys())?;
        self.value.forward(params, &mut td_v)?;
        squeeze_batch(td_v.get(&self.keys.value)?, td.ndim())
    }

    /// Advantage-weighted regression of the actor.
    ///
    /// Returns the loss and the detached log-probability of the recorded actions.
    pub fn actor_loss(&self, td: &TensorDict) -> Result<(Tensor, Tensor)> {
        trace!("Log probability of actions in the batch");
        let action = td.get(&self.keys.action)?;
        let log_prob = self
            .actor
            .log_prob(&self.actor_params.live()?, td, action)?;

        let min_q = self.min_target_qvalue(td)?;
        if log_prob.shape() != min_q.shape() {
            return Err(shape_mismatch("log_prob and min_q", &log_prob, &min_q));
        }
        let value = self.state_value(td, &self.value_params.live()?)?.detach();
        let weight = advantage_weight(&(min_q - value)?, self.temperature)?;

        let loss = (weight * &log_prob)?.mean_all()?.neg()?;
        Ok((loss, log_prob.detach()))
    }

    /// Expectile regression of the value network on the target qvalues.
    pub fn value_loss(&self, td: &TensorDict) -> Result<Tensor> {
        let min_q = self.min_target_qvalue(td)?;
        let value = self.state_value(td, &self.value_params.live()?)?;
        let diff = (min_q - value)?;
        expectile_loss(&diff, self.expectile)
    }

    /// Regression of the qvalue ensemble on the value estimator targets.
    ///
    /// Returns the loss and the priority of the transitions.
    pub fn qvalue_loss(&self, td: &TensorDict) -> Result<(Tensor, Tensor)> {
        trace!("Compute qvalue targets");
        let target = self
            .value_estimator
            .value_estimate(td, &self.value, &self.value_params.target()?)?;

        let pred = self.qvalues(td, &self.qvalue_params.live()?)?;
        let target = target.to_dtype(pred.dtype())?;
        let td_error = (&pred - target.broadcast_as(pred.shape())?)?
            .sqr()?
            .detach();
        let priority = td_error.max(0)?;

        let loss = distance_loss(&pred, &target, self.loss_function)?
            .sum(0)?
            .mean_all()?;
        Ok((loss, priority))
    }

    /// Keys of the batch fields read by the loss.
    pub fn in_keys(&self) -> Vec<NestedKey> {
        let mut keys = vec![
            self.keys.action.clone(),
            self.keys.reward.next(),
            self.keys.done.next(),
            self.keys.terminated.next(),
        ];
        keys.extend(self.actor.in_keys().iter().cloned());
        keys.extend(self.actor.in_keys().iter().map(|k| k.next()));
        keys.extend(self.qvalue.in_keys().iter().cloned());
        keys.extend(self.value.in_keys().iter().cloned());
        keys.extend(self.value.in_keys().iter().map(|k| k.next()));

        let mut unique: Vec<NestedKey> = vec![];
        for key in keys.into_iter() {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        unique
    }

    /// Keys of the batch fields.
    pub fn keys(&self) -> &LossKeys {
        &self.keys
    }

    /// Remaps the keys of the batch fields, for the value estimator too.
    pub fn set_keys(&mut self, keys: LossKeys) {
        let estimator_keys = self.value_estimator_keys(&keys);
        self.value_estimator.set_keys(estimator_keys);
        self.keys = keys;
    }

    fn value_estimator_keys(&self, keys: &LossKeys) -> ValueEstimatorKeys {
        let current = self.value_estimator.keys();
        ValueEstimatorKeys {
            value_target: current.value_target.clone(),
            advantage: current.advantage.clone(),
            ..keys.value_estimator_keys()
        }
    }

    /// Replaces the value estimator.
    pub fn make_value_estimator(&mut self, config: &ValueEstimatorConfig) -> Result<()> {
        let keys = self.value_estimator_keys(&self.keys);
        self.value_estimator = make_value_estimator(config, keys)?;
        info!("Use {} estimator with gamma {}", config.kind, config.gamma);
        Ok(())
    }

    /// The value estimator.
    pub fn value_estimator(&self) -> &dyn ValueEstimator {
        self.value_estimator.as_ref()
    }

    /// Inverse temperature of the advantage weighting.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Expectile of the value regression.
    pub fn expectile(&self) -> f64 {
        self.expectile
    }

    /// Distance of the qvalue regression.
    pub fn loss_function(&self) -> LossFunction {
        self.loss_function
    }

    /// Selection of the value of the recorded action.
    pub fn selection(&self) -> ActionSelection {
        self.selection
    }

    /// The actor.
    pub fn actor(&self) -> &A {
        &self.actor
    }

    /// The qvalue network.
    pub fn qvalue(&self) -> &Q {
        &self.qvalue
    }

    /// The value network.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Parameters of the actor.
    pub fn actor_params(&self) -> &FunctionalParams {
        &self.actor_params
    }

    /// Parameters of the qvalue ensemble.
    pub fn qvalue_params(&self) -> &FunctionalParams {
        &self.qvalue_params
    }

    /// Parameters of the qvalue ensemble, for target updates.
    pub fn qvalue_params_mut(&mut self) -> &mut FunctionalParams {
        &mut self.qvalue_params
    }

    /// Parameters of the value network.
    pub fn value_params(&self) -> &FunctionalParams {
        &self.value_params
    }

    /// Saves the parameters of the three networks in `path`.
    pub fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;
        let mut paths = self.actor_params.save(path.join("actor"))?;
        paths.extend(self.qvalue_params.save(path.join("qvalue"))?);
        paths.extend(self.value_params.save(path.join("value"))?);
        Ok(paths)
    }

    /// Loads parameters saved with [`IqlLoss::save_params`].
    pub fn load_params(&mut self, path: &Path) -> Result<()> {
        self.actor_params.load(path.join("actor"))?;
        self.qvalue_params.load(path.join("qvalue"))?;
        self.value_params.load(path.join("value"))?;
        Ok(())
    }
}
