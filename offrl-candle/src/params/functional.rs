use super::ParamSet;
use crate::module::FunctionalModule;
use anyhow::{anyhow, Context, Result};
use candle_core::{DType::F32, Device, Var};
use candle_nn::{VarBuilder, VarMap};
use log::{debug, info};
use offrl_core::error::OffrlError;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Live and target parameters of one network role.
///
/// Live parameters are trainable variables held in a [`VarMap`]; an optimizer
/// built on [`FunctionalParams::vars`] updates them. Target parameters, when
/// requested, are an owned detached copy refreshed only by
/// [`FunctionalParams::soft_update`] or [`FunctionalParams::hard_update`].
///
/// [`VarMap`]: https://docs.rs/candle-nn/0.8.4/candle_nn/var_map/struct.VarMap.html
pub struct FunctionalParams {
    name: String,
    device: Device,
    varmap: VarMap,
    ensemble_size: Option<usize>,
    target: Option<ParamSet>,
}

impl FunctionalParams {
    /// Initializes the parameters of `module`.
    pub fn build(
        name: impl Into<String>,
        module: &dyn FunctionalModule,
        device: &Device,
        create_target: bool,
    ) -> Result<Self> {
        let name = name.into();
        let varmap = VarMap::new();
        module.init(VarBuilder::from_varmap(&varmap, F32, device))?;
        debug!("Initialized {} parameter tensors of {}", varmap.all_vars().len(), name);
        Self::with_varmap(name, varmap, device, None, create_target)
    }

    /// Initializes `n` independent copies of the parameters of `module`,
    /// stacked along a leading ensemble axis.
    pub fn build_ensemble(
        name: impl Into<String>,
        module: &dyn FunctionalModule,
        n: usize,
        device: &Device,
        create_target: bool,
    ) -> Result<Self> {
        let name = name.into();
        if n == 0 {
            let msg = format!("Ensemble of {} needs at least one member", name);
            return Err(OffrlError::Config(msg).into());
        }

        let members = (0..n)
            .map(|ix| {
                if device.is_cuda() {
                    device.set_seed((ix + 10) as _)?;
                }
                let varmap = VarMap::new();
                module.init(VarBuilder::from_varmap(&varmap, F32, device))?;
                ParamSet::from_varmap(&varmap, device)
            })
            .collect::<Result<Vec<_>>>()?;
        let stacked = ParamSet::stack(&members)?;

        let varmap = VarMap::new();
        {
            let mut data = varmap
                .data()
                .lock()
                .map_err(|_| anyhow!("VarMap lock is poisoned"))?;
            for (k, t) in stacked.tensors().iter() {
                data.insert(k.clone(), Var::from_tensor(t)?);
            }
        }
        debug!("Initialized an ensemble of {} copies of {}", n, name);
        Self::with_varmap(name, varmap, device, Some(n), create_target)
    }

    fn with_varmap(
        name: String,
        varmap: VarMap,
        device: &Device,
        ensemble_size: Option<usize>,
        create_target: bool,
    ) -> Result<Self> {
        let mut params = Self {
            name,
            device: device.clone(),
            varmap,
            ensemble_size,
            target: None,
        };
        if create_target {
            params.hard_update()?;
        }
        Ok(params)
    }

    /// Name of the network role, e.g. `qvalue`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of ensemble members, `None` for a single network.
    pub fn ensemble_size(&self) -> Option<usize> {
        self.ensemble_size
    }

    /// Returns `true` if target parameters are maintained.
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    /// Live parameters, sharing the trainable variables.
    pub fn live(&self) -> Result<ParamSet> {
        Ok(ParamSet::from_varmap(&self.varmap, &self.device)?.with_ensemble_size(self.ensemble_size))
    }

    /// Target parameters.
    ///
    /// Without a maintained target, a detached copy of the live parameters is
    /// returned, so the result never receives gradients.
    pub fn target(&self) -> Result<ParamSet> {
        match &self.target {
            Some(target) => Ok(target.clone()),
            None => self.live()?.detach(),
        }
    }

    /// Trainable variables, for building an optimizer.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// `target = tau * live + (1 - tau) * target`.
    pub fn soft_update(&mut self, tau: f64) -> Result<()> {
        let live = self.live()?;
        let target = self
            .target
            .as_ref()
            .with_context(|| format!("{} has no target parameters", self.name))?;

        let mut tensors = HashMap::new();
        for (k, t_dest) in target.tensors().iter() {
            let t_src = live
                .get(k)
                .with_context(|| format!("{} is missing in live parameters", k))?
                .detach();
            let t_dest = (t_src.affine(tau, 0.)? + t_dest.affine(1.0 - tau, 0.)?)?;
            tensors.insert(k.clone(), t_dest);
        }
        self.target = Some(ParamSet::new(tensors, &self.device).with_ensemble_size(self.ensemble_size));
        Ok(())
    }

    /// Copies the live parameters into the target parameters.
    pub fn hard_update(&mut self) -> Result<()> {
        self.target = Some(self.live()?.detach()?);
        Ok(())
    }

    /// Save live parameters to prefix + ".pt" and target parameters to prefix + ".tgt.pt".
    pub fn save(&self, prefix: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("pt");
        self.varmap.save(path.as_path())?;
        info!("Save {} parameters to {:?}", self.name, path);
        let mut paths = vec![path];

        if let Some(target) = &self.target {
            let mut path_tgt = PathBuf::from(prefix.as_ref());
            path_tgt.set_extension("tgt.pt");
            target.save(&path_tgt)?;
            paths.push(path_tgt);
        }

        Ok(paths)
    }

    /// Load parameters saved with [`FunctionalParams::save`].
    pub fn load(&mut self, prefix: impl AsRef<Path>) -> Result<()> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("pt");
        self.varmap.load(path.as_path())?;
        info!("Load {} parameters from {:?}", self.name, path);

        if self.target.is_some() {
            let mut path_tgt = PathBuf::from(prefix.as_ref());
            path_tgt.set_extension("tgt.pt");
            let target = ParamSet::load(&path_tgt, &self.device)?;
            self.target = Some(target.with_ensemble_size(self.ensemble_size));
        }

        Ok(())
    }
}
