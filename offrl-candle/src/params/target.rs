use super::FunctionalParams;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Rule for refreshing target parameters from live parameters.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum TargetNetUpdater {
    /// Exponential moving average with coefficient `tau` after every update.
    Soft {
        /// Soft update coefficient.
        tau: f64,
    },

    /// Copy of the live parameters every `interval` updates.
    Hard {
        /// Number of updates between two copies.
        interval: usize,
    },
}

impl Default for TargetNetUpdater {
    fn default() -> Self {
        Self::Soft { tau: 0.005 }
    }
}

impl TargetNetUpdater {
    /// Applies the rule after the `n_updates`-th parameter update.
    pub fn step(&self, params: &mut FunctionalParams, n_updates: usize) -> Result<()> {
        match self {
            Self::Soft { tau } => params.soft_update(*tau),
            Self::Hard { interval } => {
                if *interval > 0 && n_updates % *interval == 0 {
                    params.hard_update()
                } else {
                    Ok(())
                }
            }
        }
    }
}
