use super::ValueEstimator;
use anyhow::{bail, Result};
use candle_core::{Tensor, D};
use offrl_core::ValueEstimatorKeys;

/// TD(lambda) return along the last dimension.
///
/// `G_t = r_t + gamma * (done_t ? v_t : lambda * G_{t+1} + (1 - lambda) * v_t)`,
/// with the episode forced to end at the last step.
fn td_lambda_return(
    gamma: f64,
    lmbda: f64,
    reward: &Tensor,
    next_value: &Tensor,
    done: &Tensor,
) -> Result<Tensor> {
    if reward.rank() == 0 {
        bail!("TD(lambda) needs a time dimension");
    }
    let len = reward.dim(D::Minus1)?;
    let mut returns = Vec::with_capacity(len);
    let mut g_next: Option<Tensor> = None;

    for t in (0..len).rev() {
        let r = reward.narrow(D::Minus1, t, 1)?;
        let v = next_value.narrow(D::Minus1, t, 1)?;
        let bootstrap = match &g_next {
            None => v,
            Some(g) => {
                let d = done.narrow(D::Minus1, t, 1)?;
                let mixed = (g.affine(lmbda, 0.0)? + v.affine(1.0 - lmbda, 0.0)?)?;
                ((&d * &v)? + (d.affine(-1.0, 1.0)? * mixed)?)?
            }
        };
        let g = (r + bootstrap.affine(gamma, 0.0)?)?;
        returns.push(g.clone());
        g_next = Some(g);
    }

    returns.reverse();
    Ok(Tensor::cat(&returns, D::Minus1)?)
}

/// TD(lambda) estimator.
pub struct TDLambdaEstimator {
    gamma: f64,
    lmbda: f64,
    keys: ValueEstimatorKeys,
}

impl TDLambdaEstimator {
    /// Creates the estimator.
    pub fn new(gamma: f64, lmbda: f64, keys: ValueEstimatorKeys) -> Self {
        Self { gamma, lmbda, keys }
    }
}

impl ValueEstimator for TDLambdaEstimator {
    fn keys(&self) -> &ValueEstimatorKeys {
        &self.keys
    }

    fn set_keys(&mut self, keys: ValueEstimatorKeys) {
        self.keys = keys;
    }

    fn gamma(&self) -> f64 {
        self.gamma
    }

    fn returns(&self, reward: &Tensor, next_value: &Tensor, done: &Tensor) -> Result<Tensor> {
        td_lambda_return(self.gamma, self.lmbda, reward, next_value, done)
    }
}

/// Monte-Carlo return bootstrapped at the end of the batch, i.e., TD(1).
pub struct TD1Estimator {
    gamma: f64,
    keys: ValueEstimatorKeys,
}

impl TD1Estimator {
    /// Creates the estimator.
    pub fn new(gamma: f64, keys: ValueEstimatorKeys) -> Self {
        Self { gamma, keys }
    }
}

impl ValueEstimator for TD1Estimator {
    fn keys(&self) -> &ValueEstimatorKeys {
        &self.keys
    }

    fn set_keys(&mut self, keys: ValueEstimatorKeys) {
        self.keys = keys;
    }

    fn gamma(&self) -> f64 {
        self.gamma
    }

    fn returns(&self, reward: &Tensor, next_value: &Tensor, done: &Tensor) -> Result<Tensor> {
        td_lambda_return(self.gamma, 1.0, reward, next_value, done)
    }
}
