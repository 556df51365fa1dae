//! Actor with tanh-squashed Gaussian policy.
use super::ProbabilisticActor;
use crate::{
    model::SubModel1,
    module::{concat_inputs, FunctionalModule},
    params::ParamSet,
    TensorDict,
};
use anyhow::Result;
use candle_core::{Tensor, D};
use candle_nn::VarBuilder;
use offrl_core::NestedKey;
use std::marker::PhantomData;

const EPS: f64 = 1e-6;

fn normal_logp(z: &Tensor, log_std: &Tensor) -> Result<Tensor> {
    let c = -0.5 * (2.0 * std::f64::consts::PI).ln();
    let tmp = (z.sqr()?.affine(-0.5, c)? - log_std)?;
    Ok(tmp.sum(D::Minus1)?)
}

fn atanh(t: &Tensor) -> Result<Tensor> {
    let num = t.affine(1.0, 1.0)?;
    let den = t.affine(-1.0, 1.0)?;
    Ok((num / den)?.log()?.affine(0.5, 0.0)?)
}

/// `sum log(1 - a^2)` over the action dimension.
fn log_jacobian_tanh(a: &Tensor) -> Result<Tensor> {
    Ok(a.sqr()?.affine(-1.0, 1.0 + EPS)?.log()?.sum(D::Minus1)?)
}

/// Actor with Gaussian policy squashed into `(-1, 1)` by `tanh`.
///
/// The model `P` outputs the mean and the log standard deviation of the
/// pre-squash Gaussian; the log standard deviation is clamped to
/// `[min_log_std, max_log_std]`. [`FunctionalModule::forward`] writes the
/// mean and the standard deviation under `loc` and `scale`.
pub struct GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: Clone,
{
    prefix: String,
    config: P::Config,
    in_keys: Vec<NestedKey>,
    out_keys: Vec<NestedKey>,
    min_log_std: f64,
    max_log_std: f64,
    phantom: PhantomData<P>,
}

impl<P> GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: Clone,
{
    /// Creates an actor reading the observation from `in_keys`.
    pub fn new(prefix: impl Into<String>, config: P::Config, in_keys: Vec<NestedKey>) -> Self {
        Self {
            prefix: prefix.into(),
            config,
            in_keys,
            out_keys: vec!["loc".into(), "scale".into()],
            min_log_std: -20.0,
            max_log_std: 2.0,
            phantom: PhantomData,
        }
    }

    /// Sets the minimum value of log std.
    pub fn min_log_std(mut self, v: f64) -> Self {
        self.min_log_std = v;
        self
    }

    /// Sets the maximum value of log std.
    pub fn max_log_std(mut self, v: f64) -> Self {
        self.max_log_std = v;
        self
    }

    fn build_model(&self, vb: VarBuilder) -> Result<P> {
        P::build(vb.pp(&self.prefix), self.config.clone())
    }

    /// Returns the mean and the clamped log std.
    fn dist_params(&self, params: &ParamSet, td: &TensorDict) -> Result<(Tensor, Tensor)> {
        let model = self.build_model(params.var_builder())?;
        let xs = concat_inputs(td, &self.in_keys)?;
        let (mean, log_std) = model.forward(&xs)?;
        let log_std = log_std.clamp(self.min_log_std, self.max_log_std)?;
        Ok((mean, log_std))
    }
}

impl<P> FunctionalModule for GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
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
        let (mean, log_std) = self.dist_params(params, td)?;
        td.set(self.out_keys[0].clone(), mean)?;
        td.set(self.out_keys[1].clone(), log_std.exp()?)
    }
}

impl<P> ProbabilisticActor for GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: Clone,
{
    fn log_prob(&self, params: &ParamSet, td: &TensorDict, action: &Tensor) -> Result<Tensor> {
        let (mean, log_std) = self.dist_params(params, td)?;
        log::trace!("Inverse transformation to the standard normal");
        let a = action.to_dtype(mean.dtype())?.clamp(-1.0 + EPS, 1.0 - EPS)?;
        let u = atanh(&a)?;
        let z = ((u - mean)? / log_std.exp()?)?;
        Ok((normal_logp(&z, &log_std)? - log_jacobian_tanh(&a)?)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mlp::{Mlp2, MlpConfig};
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_atanh() -> Result<()> {
        let t = Tensor::from_slice(&[0f32, 0.5, -0.5], (3,), &Device::Cpu)?;
        let u = atanh(&t)?.tanh()?.to_vec1::<f32>()?;
        for (x, y) in u.iter().zip([0f32, 0.5, -0.5].iter()) {
            assert!((x - y).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_log_prob() -> Result<()> {
        let dev = Device::Cpu;
        let actor = GaussianActor::<Mlp2>::new(
            "actor",
            MlpConfig::new(3, vec![16], 2, false),
            vec!["observation".into()],
        );
        let varmap = VarMap::new();
        actor.init(VarBuilder::from_varmap(&varmap, DType::F32, &dev))?;
        let params = ParamSet::from_varmap(&varmap, &dev)?;

        let mut td = TensorDict::new(&[5]);
        td.set("observation", Tensor::randn(0f32, 1., (5, 3), &dev)?)?;
        let action = Tensor::zeros((5, 2), DType::F32, &dev)?;
        let logp = actor.log_prob(&params, &td, &action)?;
        assert_eq!(logp.dims(), &[5]);

        // at a = 0 the density equals the pre-squash Gaussian density
        actor.forward(&params, &mut td)?;
        let mean = td.get(&"loc".into())?;
        let std = td.get(&"scale".into())?;
        let expected = {
            let z = (mean.neg()? / std)?;
            normal_logp(&z, &std.log()?)?
        };
        let diff = (logp - expected)?.abs()?.max(0)?.to_scalar::<f32>()?;
        assert!(diff < 1e-4);
        Ok(())
    }
}
