//! Configuration of IQL losses.
use crate::{opt::OptimizerConfig, params::TargetNetUpdater, Device};
use anyhow::Result;
use log::warn;
use offrl_core::{
    error::OffrlError, load_yaml, save_yaml, ActionSpace, LossFunction, LossKeys, NestedKey,
    ValueEstimatorConfig,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of [`IqlLoss`](super::IqlLoss) and
/// [`DiscreteIqlLoss`](super::DiscreteIqlLoss).
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct IqlConfig {
    /// Number of qvalue networks in the ensemble.
    pub num_qvalue_nets: usize,

    /// Distance of the qvalue regression.
    pub loss_function: LossFunction,

    /// Inverse temperature of the advantage weighting, the beta in the paper.
    pub temperature: f64,

    /// Expectile of the value regression, in `[0, 1)`.
    pub expectile: f64,

    /// Value estimator computing qvalue targets.
    pub value_estimator: ValueEstimatorConfig,

    /// Deprecated. Use `value_estimator.gamma`.
    pub gamma: Option<f64>,

    /// Deprecated. Use `keys.priority`.
    pub priority_key: Option<NestedKey>,

    /// Keys of the fields in a batch.
    pub keys: LossKeys,

    /// Encoding of actions, used by the discrete variant only.
    pub action_space: Option<ActionSpace>,

    /// Optimizer of the actor.
    pub actor_opt_config: OptimizerConfig,

    /// Optimizer of the qvalue ensemble.
    pub qvalue_opt_config: OptimizerConfig,

    /// Optimizer of the value network.
    pub value_opt_config: OptimizerConfig,

    /// Refresh rule of the qvalue target parameters.
    pub target_update: TargetNetUpdater,

    /// Device of the parameters.
    pub device: Option<Device>,
}

impl Default for IqlConfig {
    fn default() -> Self {
        Self {
            num_qvalue_nets: 2,
            loss_function: LossFunction::default(),
            temperature: 1.0,
            expectile: 0.5,
            value_estimator: ValueEstimatorConfig::default(),
            gamma: None,
            priority_key: None,
            keys: LossKeys::default(),
            action_space: None,
            actor_opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            qvalue_opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            value_opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            target_update: TargetNetUpdater::default(),
            device: None,
        }
    }
}

impl IqlConfig {
    /// Sets the number of qvalue networks.
    pub fn num_qvalue_nets(mut self, v: usize) -> Self {
        self.num_qvalue_nets = v;
        self
    }

    /// Sets the distance of the qvalue regression.
    pub fn loss_function(mut self, v: LossFunction) -> Self {
        self.loss_function = v;
        self
    }

    /// Sets the temperature.
    pub fn temperature(mut self, v: f64) -> Self {
        self.temperature = v;
        self
    }

    /// Sets the expectile.
    pub fn expectile(mut self, v: f64) -> Self {
        self.expectile = v;
        self
    }

    /// Sets the value estimator.
    pub fn value_estimator(mut self, v: ValueEstimatorConfig) -> Self {
        self.value_estimator = v;
        self
    }

    /// Sets the keys.
    pub fn keys(mut self, v: LossKeys) -> Self {
        self.keys = v;
        self
    }

    /// Sets the action space.
    pub fn action_space(mut self, v: ActionSpace) -> Self {
        self.action_space = Some(v);
        self
    }

    /// Sets the optimizer of the actor.
    pub fn actor_opt_config(mut self, v: OptimizerConfig) -> Self {
        self.actor_opt_config = v;
        self
    }

    /// Sets the optimizer of the qvalue ensemble.
    pub fn qvalue_opt_config(mut self, v: OptimizerConfig) -> Self {
        self.qvalue_opt_config = v;
        self
    }

    /// Sets the optimizer of the value network.
    pub fn value_opt_config(mut self, v: OptimizerConfig) -> Self {
        self.value_opt_config = v;
        self
    }

    /// Sets the refresh rule of the target parameters.
    pub fn target_update(mut self, v: TargetNetUpdater) -> Self {
        self.target_update = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = Some(v);
        self
    }

    /// Loads [`IqlConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_yaml(path)
    }

    /// Saves [`IqlConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_yaml(self, path)
    }

    /// Checks hyperparameters and folds deprecated fields into their
    /// replacements.
    pub(super) fn resolve(&self) -> Result<Self> {
        let mut config = self.clone();
        if !(0.0..1.0).contains(&config.expectile) {
            let msg = format!("expectile must be in [0, 1), got {}", config.expectile);
            return Err(OffrlError::Config(msg).into());
        }
        if config.num_qvalue_nets == 0 {
            let msg = "num_qvalue_nets must be positive".to_string();
            return Err(OffrlError::Config(msg).into());
        }
        if let Some(gamma) = config.gamma.take() {
            warn!("gamma is deprecated, set value_estimator.gamma instead");
            config.value_estimator.gamma = gamma;
        }
        if let Some(key) = config.priority_key.take() {
            warn!("priority_key is deprecated, set keys.priority instead");
            config.keys.priority = key;
        }
        config.value_estimator.check()?;
        Ok(config)
    }
}
