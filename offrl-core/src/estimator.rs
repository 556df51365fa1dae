//! Kinds and hyperparameters of value estimators.
use crate::error::OffrlError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Default discount factor of value estimators.
pub const DEFAULT_GAMMA: f64 = 0.99;

/// Default lambda of TD(lambda).
pub const DEFAULT_LMBDA: f64 = 0.95;

/// Named constants selecting a value estimator.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum ValueEstimatorKind {
    /// One-step bootstrap.
    TD0,

    /// Discounted sum of rewards to the end of the trajectory.
    TD1,

    /// Exponentially weighted mixture of n-step returns.
    TDLambda,

    /// Generalized advantage estimation.
    GAE,
}

impl FromStr for ValueEstimatorKind {
    type Err = OffrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "td0" => Ok(Self::TD0),
            "td1" => Ok(Self::TD1),
            "tdlambda" | "td_lambda" => Ok(Self::TDLambda),
            "gae" => Ok(Self::GAE),
            _ => Err(OffrlError::Config(format!("Unknown value type {}", s))),
        }
    }
}

impl fmt::Display for ValueEstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TD0 => "TD0",
            Self::TD1 => "TD1",
            Self::TDLambda => "TDLambda",
            Self::GAE => "GAE",
        };
        write!(f, "{}", s)
    }
}

/// Configuration of a value estimator.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct ValueEstimatorConfig {
    /// Kind of the estimator.
    pub kind: ValueEstimatorKind,

    /// Discount factor.
    pub gamma: f64,

    /// Lambda, used only by [`ValueEstimatorKind::TDLambda`].
    pub lmbda: f64,
}

impl Default for ValueEstimatorConfig {
    fn default() -> Self {
        Self {
            kind: ValueEstimatorKind::TD0,
            gamma: DEFAULT_GAMMA,
            lmbda: DEFAULT_LMBDA,
        }
    }
}

impl ValueEstimatorConfig {
    /// Default hyperparameters of the given kind.
    pub fn new(kind: ValueEstimatorKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets lambda.
    pub fn lmbda(mut self, v: f64) -> Self {
        self.lmbda = v;
        self
    }

    /// Checks the hyperparameters.
    pub fn check(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gamma) {
            let msg = format!("gamma must be in [0, 1], got {}", self.gamma);
            return Err(OffrlError::Config(msg).into());
        }
        if !(0.0..=1.0).contains(&self.lmbda) {
            let msg = format!("lmbda must be in [0, 1], got {}", self.lmbda);
            return Err(OffrlError::Config(msg).into());
        }
        Ok(())
    }
}
