//! Selection of the value of the recorded action.
use anyhow::Result;
use candle_core::{DType, Tensor, D};
use offrl_core::ActionSpace;

/// How the value of the recorded action is read from a network output.
///
/// Resolved once from the action space when a loss is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSelection {
    /// The network takes the action as input and outputs `[..., 1]`.
    Continuous,

    /// The network outputs `[..., n_actions]`; actions are integer indices.
    Categorical,

    /// The network outputs `[..., n_actions]`; actions are one-hot,
    /// multi-one-hot or binary vectors.
    OneHot,
}

impl ActionSelection {
    /// Selection rule of a discrete action space.
    pub fn discrete(action_space: ActionSpace) -> Self {
        match action_space.is_categorical() {
            true => Self::Categorical,
            false => Self::OneHot,
        }
    }

    /// Returns `true` if the qvalue network takes the action as input.
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Continuous)
    }

    /// Reads the values of `action` from `values`.
    ///
    /// `values` may carry extra leading dimensions (e.g., an ensemble axis),
    /// the action is broadcast over them. The trailing action dimension is
    /// removed from the result.
    pub fn select(&self, values: &Tensor, action: &Tensor) -> Result<Tensor> {
        match self {
            Self::Continuous => Ok(values.squeeze(D::Minus1)?),
            Self::Categorical => {
                let action = match action.rank() == 1 || action.dims().last() != Some(&1) {
                    true => action.unsqueeze(D::Minus1)?,
                    false => action.clone(),
                };
                let mut shape = values.dims().to_vec();
                if let Some(last) = shape.last_mut() {
                    *last = 1;
                }
                let index = action
                    .to_dtype(DType::U32)?
                    .broadcast_as(shape)?
                    .contiguous()?;
                Ok(values
                    .contiguous()?
                    .gather(&index, D::Minus1)?
                    .squeeze(D::Minus1)?)
            }
            Self::OneHot => {
                let action = action.to_dtype(values.dtype())?;
                Ok(values.broadcast_mul(&action)?.sum(D::Minus1)?)
            }
        }
    }
}
