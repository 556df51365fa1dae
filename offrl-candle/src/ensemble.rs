//! Evaluation of a module under a stack of parameter sets.
use crate::{module::FunctionalModule, params::ParamSet, TensorDict};
use anyhow::{anyhow, Result};
use log::trace;

/// Evaluates `module` on `td` under every member of `stacked`.
///
/// The outputs of the members are stacked along a new leading axis, so the
/// result has batch size `[N, ...td.batch_size()]` and holds the `out_keys`
/// of the module only. Members are evaluated independently of each other;
/// `td` is not modified.
pub fn vmap_module(
    module: &dyn FunctionalModule,
    stacked: &ParamSet,
    td: &TensorDict,
) -> Result<TensorDict> {
    let n = stacked
        .ensemble_size()
        .ok_or_else(|| anyhow!("vmap_module needs stacked parameters"))?;
    trace!("Evaluate a module under {} parameter sets", n);

    let outputs = (0..n)
        .map(|i| {
            let mut td_i = td.select(module.in_keys())?;
            module.forward(&stacked.member(i)?, &mut td_i)?;
            td_i.select(module.out_keys())
        })
        .collect::<Result<Vec<_>>>()?;
    TensorDict::stack(&outputs)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mlp::{Mlp, MlpConfig},
        module::TensorDictModule,
        params::FunctionalParams,
    };
    use candle_core::{Device, Tensor};

    fn module() -> TensorDictModule<Mlp> {
        TensorDictModule::new(
            "qvalue",
            MlpConfig::new(3, vec![8], 1, false),
            vec!["observation".into()],
            "state_action_value",
        )
    }

    fn batch() -> Result<TensorDict> {
        let mut td = TensorDict::new(&[5]);
        td.set("observation", Tensor::randn(0f32, 1., (5, 3), &Device::Cpu)?)?;
        Ok(td)
    }

    #[test]
    fn test_matches_sequential_calls() -> Result<()> {
        let module = module();
        let params = FunctionalParams::build_ensemble("qvalue", &module, 3, &Device::Cpu, false)?;
        let live = params.live()?;
        let td = batch()?;

        let out = vmap_module(&module, &live, &td)?;
        assert_eq!(out.batch_size(), &[3, 5]);
        let q = out.get(&"state_action_value".into())?;
        assert_eq!(q.dims(), &[3, 5, 1]);

        for i in 0..3 {
            let mut td_i = td.clone();
            module.forward(&live.member(i)?, &mut td_i)?;
            let q_i = td_i.get(&"state_action_value".into())?.to_vec2::<f32>()?;
            assert_eq!(q.get(i)?.to_vec2::<f32>()?, q_i);
        }
        assert!(!td.contains(&"state_action_value".into()));
        Ok(())
    }

    #[test]
    fn test_ensemble_collapse() -> Result<()> {
        // N copies of the same parameters give N identical outputs
        let module = module();
        let single = FunctionalParams::build("qvalue", &module, &Device::Cpu, false)?.live()?;
        let stacked = ParamSet::stack(&[single.clone(), single.clone(), single.clone()])?;
        let td = batch()?;
        let out = vmap_module(&module, &stacked, &td)?;
        let q = out.get(&"state_action_value".into())?;
        let q0 = q.get(0)?.to_vec2::<f32>()?;
        assert_eq!(q.get(1)?.to_vec2::<f32>()?, q0);
        assert_eq!(q.get(2)?.to_vec2::<f32>()?, q0);

        // the minimum over members is the single network's output
        let mut td_single = td.clone();
        module.forward(&single, &mut td_single)?;
        let q_single = td_single.get(&"state_action_value".into())?.to_vec2::<f32>()?;
        assert_eq!(q.min(0)?.to_vec2::<f32>()?, q_single);
        assert_eq!(q.min(0)?.to_vec2::<f32>()?, q0);
        Ok(())
    }

    #[test]
    fn test_requires_stack() -> Result<()> {
        let module = module();
        let single = FunctionalParams::build("qvalue", &module, &Device::Cpu, false)?.live()?;
        assert!(vmap_module(&module, &single, &batch()?).is_err());
        Ok(())
    }
}
