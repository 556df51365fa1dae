//! Value estimators.
//!
//! A value estimator turns the rewards and the value of the next state in a
//! batch into a regression target for the state-action value. Time runs along
//! the last batch dimension; the value of the next state is masked with
//! `1 - terminated` (falling back to `done` when `terminated` is absent).
mod td0;
mod td_lambda;
use crate::{module::FunctionalModule, params::ParamSet, TensorDict};
use anyhow::Result;
use candle_core::{DType, Tensor, D};
use log::trace;
use offrl_core::{
    error::OffrlError, keys::NEXT, ValueEstimatorConfig, ValueEstimatorKeys, ValueEstimatorKind,
};
pub use td0::TD0Estimator;
pub use td_lambda::{TD1Estimator, TDLambdaEstimator};

/// Removes the trailing singleton dimension of a per-sample scalar.
pub(crate) fn squeeze_batch(t: &Tensor, batch_ndim: usize) -> Result<Tensor> {
    match t.rank() > batch_ndim && t.dims().last() == Some(&1) {
        true => Ok(t.squeeze(D::Minus1)?),
        false => Ok(t.clone()),
    }
}

/// Computes regression targets from rewards and next-state values.
pub trait ValueEstimator {
    /// Keys read and written by the estimator.
    fn keys(&self) -> &ValueEstimatorKeys;

    /// Remaps the keys read and written by the estimator.
    fn set_keys(&mut self, keys: ValueEstimatorKeys);

    /// Discount factor.
    fn gamma(&self) -> f64;

    /// Returns the targets given tensors of the batch shape.
    ///
    /// `next_value` is already masked by termination.
    fn returns(&self, reward: &Tensor, next_value: &Tensor, done: &Tensor) -> Result<Tensor>;

    /// Evaluates `value_network` on the next states in `td` under `params`
    /// and returns the targets, detached, with the batch shape of `td`.
    fn value_estimate(
        &self,
        td: &TensorDict,
        value_network: &dyn FunctionalModule,
        params: &ParamSet,
    ) -> Result<Tensor> {
        let keys = self.keys();
        let n = td.ndim();

        trace!("Evaluate the value network on the next states");
        let mut next_td = td.get_sub(NEXT)?.select(value_network.in_keys())?;
        value_network.forward(params, &mut next_td)?;
        let next_value = squeeze_batch(next_td.get(&keys.value)?, n)?.detach();
        let dtype = next_value.dtype();

        let reward = squeeze_batch(td.get(&keys.reward.next())?, n)?.to_dtype(dtype)?;
        let done = squeeze_batch(td.get(&keys.done.next())?, n)?.to_dtype(DType::F32)?;
        let terminated = match td.contains(&keys.terminated.next()) {
            true => squeeze_batch(td.get(&keys.terminated.next())?, n)?.to_dtype(DType::F32)?,
            false => done.clone(),
        };
        let next_value = (terminated.affine(-1.0, 1.0)?.to_dtype(dtype)? * next_value)?;

        Ok(self
            .returns(&reward, &next_value, &done.to_dtype(dtype)?)?
            .detach())
    }

    /// Writes the targets and the advantages into `td`.
    ///
    /// Targets are computed with `target_params`, the advantage is the target
    /// minus the value of the current state under `params`.
    fn forward(
        &self,
        td: &mut TensorDict,
        value_network: &dyn FunctionalModule,
        params: &ParamSet,
        target_params: &ParamSet,
    ) -> Result<()> {
        let target = self.value_estimate(td, value_network, target_params)?;
        let mut cur = td.select(value_network.in_keys())?;
        value_network.forward(params, &mut cur)?;
        let value = squeeze_batch(cur.get(&self.keys().value)?, td.ndim())?;
        let advantage = (&target - value.detach())?;

        let keys = self.keys().clone();
        td.set(keys.value_target, target)?;
        td.set(keys.advantage, advantage)
    }
}

/// Builds the estimator of the given configuration.
///
/// [`ValueEstimatorKind::GAE`] is not supported.
pub fn make_value_estimator(
    config: &ValueEstimatorConfig,
    keys: ValueEstimatorKeys,
) -> Result<Box<dyn ValueEstimator>> {
    config.check()?;
    let estimator: Box<dyn ValueEstimator> = match config.kind {
        ValueEstimatorKind::TD0 => Box::new(TD0Estimator::new(config.gamma, keys)),
        ValueEstimatorKind::TD1 => Box::new(TD1Estimator::new(config.gamma, keys)),
        ValueEstimatorKind::TDLambda => {
            Box::new(TDLambdaEstimator::new(config.gamma, config.lmbda, keys))
        }
        ValueEstimatorKind::GAE => {
            let msg = "GAE is not supported as a value estimator of IQL".to_string();
            return Err(OffrlError::Config(msg).into());
        }
    };
    Ok(estimator)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mlp::{Mlp, MlpConfig},
        module::TensorDictModule,
        params::FunctionalParams,
    };
    use candle_core::Device;
    use offrl_core::NestedKey;

    fn tensor(v: &[f32]) -> Result<Tensor> {
        Ok(Tensor::from_slice(v, (v.len(),), &Device::Cpu)?)
    }

    fn assert_close(t: &Tensor, expected: &[f32]) -> Result<()> {
        let v = t.to_vec1::<f32>()?;
        assert_eq!(v.len(), expected.len());
        for (x, y) in v.iter().zip(expected.iter()) {
            assert!((x - y).abs() < 1e-4, "{:?} != {:?}", v, expected);
        }
        Ok(())
    }

    #[test]
    fn test_td_returns() -> Result<()> {
        let keys = ValueEstimatorKeys::default();
        let r = tensor(&[1.0, 2.0, 3.0])?;
        let v = tensor(&[10.0, 20.0, 30.0])?;
        let done = tensor(&[0.0, 0.0, 0.0])?;

        let td0 = TD0Estimator::new(0.9, keys.clone()).returns(&r, &v, &done)?;
        assert_close(&td0, &[10.0, 20.0, 30.0])?;

        let tdl = TDLambdaEstimator::new(0.9, 0.5, keys.clone()).returns(&r, &v, &done)?;
        assert_close(&tdl, &[16.525, 24.5, 30.0])?;

        let td1 = TD1Estimator::new(0.9, keys.clone()).returns(&r, &v, &done)?;
        assert_close(&td1, &[27.1, 29.0, 30.0])?;
        let td1_ = TDLambdaEstimator::new(0.9, 1.0, keys.clone()).returns(&r, &v, &done)?;
        assert_close(&td1_, &[27.1, 29.0, 30.0])?;

        let tdl0 = TDLambdaEstimator::new(0.9, 0.0, keys).returns(&r, &v, &done)?;
        assert_close(&tdl0, &[10.0, 20.0, 30.0])?;
        Ok(())
    }

    fn batch_with_episode_end() -> Result<TensorDict> {
        let dev = Device::Cpu;
        let mut td = TensorDict::new(&[3]);
        td.set(("next", "observation"), Tensor::zeros((3, 2), DType::F32, &dev)?)?;
        td.set("observation", Tensor::zeros((3, 2), DType::F32, &dev)?)?;
        td.set(("next", "reward"), Tensor::from_slice(&[1f32, 2., 3.], (3, 1), &dev)?)?;
        let flags = Tensor::from_slice(&[0u8, 1, 0], (3, 1), &dev)?;
        td.set(("next", "done"), flags.clone())?;
        td.set(("next", "terminated"), flags)?;
        Ok(td)
    }

    /// A value network returning `c` for every state.
    fn constant_value(c: f32) -> Result<(TensorDictModule<Mlp>, ParamSet)> {
        let module = TensorDictModule::<Mlp>::new(
            "value",
            MlpConfig::new(2, vec![1], 1, false),
            vec!["observation".into()],
            "state_value",
        );
        let params = FunctionalParams::build("value", &module, &Device::Cpu, false)?.live()?;
        let names = params.names();
        let tensors = names
            .iter()
            .map(|k| {
                let t = params.get(k).unwrap();
                let t = match k.as_str() {
                    "value.mlp.ln0.bias" => t.ones_like()?,
                    "value.mlp.ln1.weight" => t.ones_like()?.affine(c as f64, 0.0)?,
                    _ => t.zeros_like()?,
                };
                Ok((k.clone(), t))
            })
            .collect::<Result<_>>()?;
        Ok((module, ParamSet::new(tensors, &Device::Cpu)))
    }

    #[test]
    fn test_value_estimate_masks_terminal() -> Result<()> {
        let (module, params) = constant_value(10.0)?;
        let td = batch_with_episode_end()?;
        let config = ValueEstimatorConfig::new(ValueEstimatorKind::TDLambda)
            .gamma(0.9)
            .lmbda(0.5);
        let estimator = make_value_estimator(&config, ValueEstimatorKeys::default())?;
        let target = estimator.value_estimate(&td, &module, &params)?;
        assert_eq!(target.dims(), &[3]);
        // v = [10, 0, 10], done at 1: G1 = 2, G0 = 1 + 0.9 * (0.5 * 2 + 0.5 * 10)
        assert_close(&target, &[6.4, 2.0, 12.0])?;
        Ok(())
    }

    #[test]
    fn test_terminated_falls_back_to_done() -> Result<()> {
        let (module, params) = constant_value(10.0)?;
        let td = {
            let td = batch_with_episode_end()?;
            let keys: Vec<NestedKey> = vec![
                "observation".into(),
                "next.observation".into(),
                "next.reward".into(),
                "next.done".into(),
            ];
            td.select(&keys)?
        };
        let config = ValueEstimatorConfig::new(ValueEstimatorKind::TD0).gamma(0.9);
        let estimator = make_value_estimator(&config, ValueEstimatorKeys::default())?;
        let target = estimator.value_estimate(&td, &module, &params)?;
        assert_close(&target, &[10.0, 2.0, 12.0])?;
        Ok(())
    }

    #[test]
    fn test_forward_writes_advantage() -> Result<()> {
        let (module, params) = constant_value(10.0)?;
        let mut td = batch_with_episode_end()?;
        let config = ValueEstimatorConfig::new(ValueEstimatorKind::TD0).gamma(0.9);
        let estimator = make_value_estimator(&config, ValueEstimatorKeys::default())?;
        estimator.forward(&mut td, &module, &params, &params)?;
        assert_close(td.get(&"value_target".into())?, &[10.0, 2.0, 12.0])?;
        assert_close(td.get(&"advantage".into())?, &[0.0, -8.0, 2.0])?;
        Ok(())
    }

    #[test]
    fn test_gae_is_rejected() {
        let config = ValueEstimatorConfig::new(ValueEstimatorKind::GAE);
        let res = make_value_estimator(&config, ValueEstimatorKeys::default());
        assert!(matches!(
            res.err().and_then(|e| e.downcast::<OffrlError>().ok()),
            Some(OffrlError::Config(_))
        ));
    }
}
