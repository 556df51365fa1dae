#![warn(missing_docs)]
//! Backend-independent building blocks of offline RL objectives.
//!
//! This crate holds what objectives share regardless of the tensor backend:
//! the named-key registry, the kinds of value estimators, action spaces and
//! distance functions, the error taxonomy, and records for logging.
pub mod error;
pub mod keys;
pub mod record;

mod action_space;
mod estimator;
mod loss_function;
mod util;

pub use action_space::ActionSpace;
pub use estimator::{ValueEstimatorConfig, ValueEstimatorKind, DEFAULT_GAMMA, DEFAULT_LMBDA};
pub use keys::{LossKeys, NestedKey, ValueEstimatorKeys};
pub use loss_function::LossFunction;
pub use util::{load_yaml, save_yaml};
