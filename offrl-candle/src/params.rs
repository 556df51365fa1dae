//! Functional parameters of networks.
//!
//! Networks are evaluated as pure functions of a [`ParamSet`]. Each network
//! role owns a [`FunctionalParams`] holding its live (trainable) parameters
//! and, optionally, a frozen target copy refreshed by a [`TargetNetUpdater`].
mod functional;
mod param_set;
mod target;
pub use functional::FunctionalParams;
pub use param_set::ParamSet;
pub use target::TargetNetUpdater;
