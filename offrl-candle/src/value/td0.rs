use super::ValueEstimator;
use anyhow::Result;
use candle_core::Tensor;
use offrl_core::ValueEstimatorKeys;

/// One-step temporal difference target, `r + gamma * v'`.
pub struct TD0Estimator {
    gamma: f64,
    keys: ValueEstimatorKeys,
}

impl TD0Estimator {
    /// Creates the estimator.
    pub fn new(gamma: f64, keys: ValueEstimatorKeys) -> Self {
        Self { gamma, keys }
    }
}

impl ValueEstimator for TD0Estimator {
    fn keys(&self) -> &ValueEstimatorKeys {
        &self.keys
    }

    fn set_keys(&mut self, keys: ValueEstimatorKeys) {
        self.keys = keys;
    }

    fn gamma(&self) -> f64 {
        self.gamma
    }

    fn returns(&self, reward: &Tensor, next_value: &Tensor, _done: &Tensor) -> Result<Tensor> {
        Ok((reward + next_value.affine(self.gamma, 0.0)?)?)
    }
}
