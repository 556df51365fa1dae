//! Distance functions used for regression losses.
use crate::error::OffrlError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Distance between a prediction and its regression target.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum LossFunction {
    /// Squared error.
    L2,

    /// Absolute error.
    L1,

    /// Smooth L1 (Huber with delta 1).
    SmoothL1,
}

impl Default for LossFunction {
    fn default() -> Self {
        Self::SmoothL1
    }
}

impl FromStr for LossFunction {
    type Err = OffrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l2" | "mse" => Ok(Self::L2),
            "l1" => Ok(Self::L1),
            "smooth_l1" => Ok(Self::SmoothL1),
            _ => Err(OffrlError::Config(format!("Unknown loss function {}", s))),
        }
    }
}
