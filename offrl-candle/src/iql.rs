//! Implicit Q-learning (IQL) losses.
mod base;
mod config;
mod discrete;
mod optimizer;
mod output;
pub use base::IqlLoss;
pub use config::IqlConfig;
pub use discrete::DiscreteIqlLoss;
pub use optimizer::IqlOptimizer;
pub use output::IqlLossOutput;
