//! Offline actor-critic objectives implemented with [candle](https://crates.io/crates/candle-core).
//!
//! The central type is [`iql::IqlLoss`] (and [`iql::DiscreteIqlLoss`]), which
//! computes the actor, qvalue and value losses of implicit Q-learning on a
//! [`TensorDict`] of transitions. Networks implement
//! [`module::FunctionalModule`] and are evaluated as pure functions of a
//! [`params::ParamSet`], so target and ensemble parameters are plain values.
pub mod actor;
pub mod ensemble;
pub mod iql;
pub mod mlp;
pub mod model;
pub mod module;
pub mod opt;
pub mod params;
pub mod selection;
mod tensor_dict;
pub mod util;
pub mod value;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
pub use tensor_dict::TensorDict;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The GPU device of the given ordinal.
    Cuda(usize),
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}
