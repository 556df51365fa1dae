//! Encodings of discrete action spaces.
use crate::error::OffrlError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Encoding of actions in a discrete action space.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum ActionSpace {
    /// One-hot vector over `n` actions.
    OneHot,

    /// Concatenation of several one-hot vectors.
    MultOneHot,

    /// Binary vector.
    Binary,

    /// Integer index of the action.
    Categorical,
}

impl ActionSpace {
    /// Returns `true` if actions are integer indices.
    pub fn is_categorical(&self) -> bool {
        matches!(self, Self::Categorical)
    }
}

impl FromStr for ActionSpace {
    type Err = OffrlError;

    /// Accepts the names `one-hot`, `mult-one-hot`, `binary` and `categorical`
    /// (underscores are accepted in place of hyphens).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('_', "-").as_str() {
            "one-hot" => Ok(Self::OneHot),
            "mult-one-hot" => Ok(Self::MultOneHot),
            "binary" => Ok(Self::Binary),
            "categorical" => Ok(Self::Categorical),
            _ => Err(OffrlError::Config(format!("Unknown action space {}", s))),
        }
    }
}

impl fmt::Display for ActionSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OneHot => "one-hot",
            Self::MultOneHot => "mult-one-hot",
            Self::Binary => "binary",
            Self::Categorical => "categorical",
        };
        write!(f, "{}", s)
    }
}
