use crate::util::to_scalar;
use anyhow::Result;
use candle_core::Tensor;
use offrl_core::{
    error::OffrlError,
    record::{Record, RecordValue},
};
use std::collections::BTreeMap;

/// Losses computed by [`IqlLoss::forward`](super::IqlLoss::forward).
///
/// `loss_actor`, `loss_qvalue` and `loss_value` carry gradients of the actor,
/// qvalue and value parameters respectively. `entropy` is detached.
#[derive(Debug, Clone)]
pub struct IqlLossOutput {
    /// Advantage-weighted negative log-likelihood of the recorded actions.
    pub loss_actor: Tensor,

    /// Regression loss of the qvalue ensemble, summed over its members.
    pub loss_qvalue: Tensor,

    /// Expectile regression loss of the value network.
    pub loss_value: Tensor,

    /// Negative mean log-probability of the recorded actions.
    pub entropy: Tensor,
}

impl IqlLossOutput {
    /// Names of the fields.
    pub const KEYS: [&'static str; 4] = ["loss_actor", "loss_qvalue", "loss_value", "entropy"];

    /// Returns the field of the given name.
    pub fn get(&self, key: &str) -> Result<&Tensor> {
        match key {
            "loss_actor" => Ok(&self.loss_actor),
            "loss_qvalue" => Ok(&self.loss_qvalue),
            "loss_value" => Ok(&self.loss_value),
            "entropy" => Ok(&self.entropy),
            _ => Err(OffrlError::MissingKey(key.to_string()).into()),
        }
    }

    /// Returns the fields of the given names.
    pub fn select(&self, keys: &[&str]) -> Result<BTreeMap<String, Tensor>> {
        keys.iter()
            .map(|k| Ok((k.to_string(), self.get(k)?.clone())))
            .collect()
    }

    /// Sum of the three losses, to be back-propagated once.
    pub fn total_loss(&self) -> Result<Tensor> {
        Ok(((&self.loss_actor + &self.loss_qvalue)? + &self.loss_value)?)
    }

    /// Scalar values of the fields, for logging.
    pub fn to_record(&self) -> Result<Record> {
        let mut record = Record::empty();
        for key in Self::KEYS.iter() {
            record.insert(*key, RecordValue::Scalar(to_scalar(self.get(key)?)?));
        }
        Ok(record)
    }
}
