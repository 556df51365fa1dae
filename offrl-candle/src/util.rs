//! Utilities.
use anyhow::Result;
use candle_core::{DType, Tensor};
use offrl_core::LossFunction;

/// Upper bound of the exponentiated advantage weighting the actor loss.
pub const MAX_ADVANTAGE_WEIGHT: f64 = 100.0;

/// Elementwise smooth L1 distance.
///
/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    let d = (x - y)?.abs()?;
    let m1 = d.detach().lt(1.0)?.to_dtype(d.dtype())?;
    let m2 = m1.affine(-1.0, 1.0)?;
    Ok(((m1 * d.sqr()?.affine(0.5, 0.0)?)? + (m2 * d.affine(1.0, -0.5)?)?)?)
}

/// Elementwise distance between `pred` and `target`.
///
/// `target` is broadcast to the shape of `pred`, so an ensemble of predictions
/// `[N, B]` can be compared with a single target `[B]`.
pub fn distance_loss(pred: &Tensor, target: &Tensor, loss_function: LossFunction) -> Result<Tensor> {
    let target = target.broadcast_as(pred.shape())?;
    match loss_function {
        LossFunction::L2 => Ok((pred - target)?.sqr()?),
        LossFunction::L1 => Ok((pred - target)?.abs()?),
        LossFunction::SmoothL1 => smooth_l1(pred, &target),
    }
}

/// Asymmetric squared loss of `diff = target - pred`.
///
/// Positive differences are weighted by `expectile`, the others by `1 - expectile`.
/// Returns the mean over all elements.
pub fn expectile_loss(diff: &Tensor, expectile: f64) -> Result<Tensor> {
    let weight = diff
        .detach()
        .gt(0.0)?
        .to_dtype(diff.dtype())?
        .affine(2.0 * expectile - 1.0, 1.0 - expectile)?;
    Ok((weight * diff.sqr()?)?.mean_all()?)
}

/// `min(exp(advantage * temperature), 100)`, detached.
pub fn advantage_weight(advantage: &Tensor, temperature: f64) -> Result<Tensor> {
    Ok(advantage
        .affine(temperature, 0.0)?
        .exp()?
        .clamp(0f64, MAX_ADVANTAGE_WEIGHT)?
        .detach())
}

/// Returns a scalar of a 0-dim tensor as `f32`.
pub fn to_scalar(t: &Tensor) -> Result<f32> {
    Ok(t.to_dtype(DType::F32)?.to_scalar::<f32>()?)
}
