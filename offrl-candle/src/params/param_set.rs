use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use std::{collections::HashMap, path::Path};

/// Named parameter tensors of a function approximator.
///
/// A `ParamSet` taken from a [`VarMap`] shares the trainable variables, so
/// gradients of a loss computed under it flow into the variables.
/// [`ParamSet::detach`] returns an owned copy cut from the computation graph.
///
/// A stacked set holds `N` ensemble members along the leading axis of every
/// tensor; [`ParamSet::member`] returns the parameters of one member.
///
/// [`VarMap`]: https://docs.rs/candle-nn/0.8.4/candle_nn/var_map/struct.VarMap.html
#[derive(Clone, Debug)]
pub struct ParamSet {
    tensors: HashMap<String, Tensor>,
    device: Device,
    ensemble_size: Option<usize>,
}

impl ParamSet {
    /// Creates a parameter set from named tensors.
    pub fn new(tensors: HashMap<String, Tensor>, device: &Device) -> Self {
        Self {
            tensors,
            device: device.clone(),
            ensemble_size: None,
        }
    }

    /// Takes the variables of a [`VarMap`] without copying them.
    pub fn from_varmap(varmap: &VarMap, device: &Device) -> Result<Self> {
        let data = varmap
            .data()
            .lock()
            .map_err(|_| anyhow!("VarMap lock is poisoned"))?;
        let tensors = data
            .iter()
            .map(|(k, v)| (k.clone(), v.as_tensor().clone()))
            .collect();
        Ok(Self::new(tensors, device))
    }

    /// Stacks the parameters of ensemble members along a new leading axis.
    pub fn stack(members: &[ParamSet]) -> Result<ParamSet> {
        let first = members
            .first()
            .context("Cannot stack an empty list of parameter sets")?;
        let mut tensors = HashMap::new();
        for name in first.tensors.keys() {
            let ts = members
                .iter()
                .map(|m| m.get(name).with_context(|| format!("{} is missing in a member", name)))
                .collect::<Result<Vec<_>>>()?;
            tensors.insert(name.clone(), Tensor::stack(&ts, 0)?);
        }
        Ok(Self {
            tensors,
            device: first.device.clone(),
            ensemble_size: Some(members.len()),
        })
    }

    /// Marks the set as a stack of `n` members.
    pub(crate) fn with_ensemble_size(mut self, n: Option<usize>) -> Self {
        self.ensemble_size = n;
        self
    }

    /// Returns the parameters of the `i`-th ensemble member.
    pub fn member(&self, i: usize) -> Result<ParamSet> {
        match self.ensemble_size {
            Some(n) if i < n => {}
            Some(n) => return Err(anyhow!("Member {} out of an ensemble of {}", i, n)),
            None => return Err(anyhow!("Parameter set is not stacked")),
        }
        let tensors = self
            .tensors
            .iter()
            .map(|(k, t)| Ok((k.clone(), t.get(i)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self::new(tensors, &self.device))
    }

    /// Number of stacked members, `None` for a single parameter set.
    pub fn ensemble_size(&self) -> Option<usize> {
        self.ensemble_size
    }

    /// Returns the tensor of the given parameter.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Named tensors.
    pub fn tensors(&self) -> &HashMap<String, Tensor> {
        &self.tensors
    }

    /// Parameter names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tensors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of parameter tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Returns `true` if there is no parameter.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Device of the parameters.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// A [`VarBuilder`] that serves these tensors to a model being built.
    ///
    /// [`VarBuilder`]: https://docs.rs/candle-nn/0.8.4/candle_nn/var_builder/type.VarBuilder.html
    pub fn var_builder(&self) -> VarBuilder<'static> {
        VarBuilder::from_tensors(self.tensors.clone(), DType::F32, &self.device)
    }

    /// Returns an owned copy of the parameters, detached from the computation graph.
    ///
    /// The copy does not share storage with `self`, so later in-place updates
    /// of the variables do not leak into it.
    pub fn detach(&self) -> Result<ParamSet> {
        let tensors = self
            .tensors
            .iter()
            .map(|(k, t)| Ok((k.clone(), t.copy()?.detach())))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self {
            tensors,
            device: self.device.clone(),
            ensemble_size: self.ensemble_size,
        })
    }

    /// Saves the tensors in safetensors format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        candle_core::safetensors::save(&self.tensors, path.as_ref())?;
        info!("Save parameters to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads tensors saved with [`ParamSet::save`].
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<ParamSet> {
        let tensors = candle_core::safetensors::load(path.as_ref(), device)?;
        info!("Load parameters from {:?}", path.as_ref());
        Ok(Self::new(tensors, device))
    }
}
