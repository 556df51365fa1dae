use super::{IqlConfig, IqlLoss};
use crate::{
    actor::ProbabilisticActor,
    module::FunctionalModule,
    opt::Optimizer,
    params::TargetNetUpdater,
    TensorDict,
};
use anyhow::Result;
use candle_core::DType;
use log::trace;
use offrl_core::record::{Record, RecordValue};

/// Optimizers of the three networks of an [`IqlLoss`].
///
/// One step back-propagates the sum of the losses once, updates the live
/// parameters of the actor, the qvalue ensemble and the value network, then
/// refreshes the qvalue target parameters.
pub struct IqlOptimizer {
    actor_opt: Optimizer,
    qvalue_opt: Optimizer,
    value_opt: Optimizer,
    target_update: TargetNetUpdater,
    n_updates: usize,
}

impl IqlOptimizer {
    /// Builds optimizers on the live parameters of `loss`.
    pub fn build<A, Q, V>(loss: &IqlLoss<A, Q, V>, config: &IqlConfig) -> Result<Self>
    where
        A: ProbabilisticActor,
        Q: FunctionalModule,
        V: FunctionalModule,
    {
        Ok(Self {
            actor_opt: config.actor_opt_config.build(loss.actor_params().vars())?,
            qvalue_opt: config.qvalue_opt_config.build(loss.qvalue_params().vars())?,
            value_opt: config.value_opt_config.build(loss.value_params().vars())?,
            target_update: config.target_update.clone(),
            n_updates: 0,
        })
    }

    /// Number of steps taken.
    pub fn n_updates(&self) -> usize {
        self.n_updates
    }

    /// Computes the losses on `td` and updates the parameters.
    ///
    /// Returns the scalar losses, the number of updates and the per-sample
    /// priorities written into `td`, flattened.
    pub fn step<A, Q, V>(&mut self, loss: &mut IqlLoss<A, Q, V>, td: &mut TensorDict) -> Result<Record>
    where
        A: ProbabilisticActor,
        Q: FunctionalModule,
        V: FunctionalModule,
    {
        let out = loss.forward(td)?;
        trace!("Backward pass of the total loss");
        let grads = out.total_loss()?.backward()?;
        self.actor_opt.step(&grads)?;
        self.qvalue_opt.step(&grads)?;
        self.value_opt.step(&grads)?;
        self.n_updates += 1;
        self.target_update
            .step(loss.qvalue_params_mut(), self.n_updates)?;

        let priority_key = &loss.keys().priority;
        let priority = td
            .get(priority_key)?
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;
        Ok(out.to_record()?.merge(Record::from_slice(&[
            ("n_updates".to_string(), RecordValue::Scalar(self.n_updates as f32)),
            (priority_key.to_string(), RecordValue::Array1(priority)),
        ])))
    }
}
