//! Multilayer perceptron.
mod base;
mod config;
mod mlp2;
use anyhow::{bail, Result};
pub use base::Mlp;
use candle_core::{Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
pub use config::MlpConfig;
pub use mlp2::Mlp2;

/// Returns vector of linear modules from [`MlpConfig`].
///
/// If `with_out_layer` is `false`, the last layer maps to the last hidden
/// units and heads are expected to be added by the caller.
fn create_linear_layers(
    prefix: &str,
    vs: VarBuilder,
    config: &MlpConfig,
    with_out_layer: bool,
) -> Result<Vec<Linear>> {
    if config.units.is_empty() {
        bail!("MlpConfig needs at least one hidden layer");
    }
    let mut in_out_pairs: Vec<(usize, usize)> = (0..config.units.len() - 1)
        .map(|i| (config.units[i], config.units[i + 1]))
        .collect();
    in_out_pairs.insert(0, (config.in_dim, config.units[0]));
    if with_out_layer {
        in_out_pairs.push((config.units[config.units.len() - 1], config.out_dim));
    }
    let vs = vs.pp(prefix);

    in_out_pairs
        .iter()
        .enumerate()
        .map(|(i, &(in_dim, out_dim))| Ok(linear(in_dim, out_dim, vs.pp(format!("ln{}", i)))?))
        .collect()
}

/// ReLU between layers, no activation after the last one.
fn mlp_forward(xs: Tensor, layers: &[Linear]) -> Result<Tensor> {
    let n_layers = layers.len();
    let mut xs = xs;

    for (i, layer) in layers.iter().enumerate() {
        xs = layer.forward(&xs)?;
        if i + 1 < n_layers {
            xs = xs.relu()?;
        }
    }

    Ok(xs)
}
