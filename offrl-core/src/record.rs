//! Records of scalar diagnostics produced by objectives.
//!
//! Objectives compute tensors; for logging, their outputs are converted into a
//! [`Record`], a backend-free map from names to [`RecordValue`]s.
//!
//! ```rust
//! use offrl_core::record::{Record, RecordValue};
//!
//! let mut record = Record::empty();
//! record.insert("loss_qvalue", RecordValue::Scalar(0.25));
//! record.insert("priority", RecordValue::Array1(vec![0.1, 0.4]));
//! ```
mod base;

pub use base::{Record, RecordValue};
