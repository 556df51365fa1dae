use anyhow::Result;
use candle_core::{Device, Tensor, D};
use offrl_candle::{
    actor::GaussianActor,
    ensemble::vmap_module,
    iql::{IqlConfig, IqlLoss, IqlOptimizer},
    mlp::{Mlp, Mlp2, MlpConfig},
    module::{FunctionalModule, TensorDictModule},
    opt::OptimizerConfig,
    params::TargetNetUpdater,
    util::smooth_l1,
    TensorDict,
};
use offrl_core::{error::OffrlError, LossFunction, ValueEstimatorConfig, ValueEstimatorKind};
use tempdir::TempDir;

const BATCH_SIZE: usize = 8;
const DIM_OBS: usize = 3;
const DIM_ACT: usize = 2;
const N_QVALUE_NETS: usize = 3;
const GAMMA: f64 = 0.9;

type Actor = GaussianActor<Mlp2>;
type Net = TensorDictModule<Mlp>;

fn networks() -> (Actor, Net, Net) {
    let actor = GaussianActor::<Mlp2>::new(
        "actor",
        MlpConfig::new(DIM_OBS, vec![16, 16], DIM_ACT, false),
        vec!["observation".into()],
    )
    .min_log_std(-5.0)
    .max_log_std(2.0);
    let qvalue = TensorDictModule::new(
        "qvalue",
        MlpConfig::new(DIM_OBS + DIM_ACT, vec![16, 16], 1, false),
        vec!["observation".into(), "action".into()],
        "state_action_value",
    );
    let value = TensorDictModule::new(
        "value",
        MlpConfig::new(DIM_OBS, vec![16, 16], 1, false),
        vec!["observation".into()],
        "state_value",
    );
    (actor, qvalue, value)
}

fn config() -> IqlConfig {
    IqlConfig::default()
        .num_qvalue_nets(N_QVALUE_NETS)
        .temperature(3.0)
        .expectile(0.7)
        .value_estimator(ValueEstimatorConfig::new(ValueEstimatorKind::TD0).gamma(GAMMA))
}

fn batch() -> Result<TensorDict> {
    let dev = Device::Cpu;
    let mut td = TensorDict::new(&[BATCH_SIZE]);
    td.set("observation", Tensor::randn(0f32, 1., (BATCH_SIZE, DIM_OBS), &dev)?)?;
    td.set("action", Tensor::randn(0f32, 1., (BATCH_SIZE, DIM_ACT), &dev)?.tanh()?)?;
    td.set(("next", "observation"), Tensor::randn(0f32, 1., (BATCH_SIZE, DIM_OBS), &dev)?)?;
    td.set(("next", "reward"), Tensor::randn(0f32, 1., (BATCH_SIZE, 1), &dev)?)?;
    let done = Tensor::from_slice(&[0u8, 0, 0, 1, 0, 0, 0, 1], (BATCH_SIZE, 1), &dev)?;
    td.set(("next", "done"), done.clone())?;
    td.set(("next", "terminated"), done)?;
    Ok(td)
}

fn assert_close(a: &Tensor, b: &Tensor) -> Result<()> {
    let d = (a - b)?.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?;
    assert!(d < 1e-4, "{:?} != {:?}", a, b);
    Ok(())
}

#[test]
fn test_forward() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let (actor, qvalue, value) = networks();
    let loss = IqlLoss::build(actor, qvalue, value, &config())?;
    let mut td = batch()?;
    let out = loss.forward(&mut td)?;

    let record = out.to_record()?;
    assert_eq!(record.len(), 4);
    for key in ["loss_actor", "loss_qvalue", "loss_value", "entropy"].iter() {
        assert!(record.get_scalar(key)?.is_finite());
    }
    assert_eq!(td.get(&"td_error".into())?.dims(), &[BATCH_SIZE]);
    assert_eq!(td.get(&"_log_prob".into())?.dims(), &[BATCH_SIZE]);

    let sub = out.select(&["loss_actor", "loss_value"])?;
    assert_eq!(sub.len(), 2);
    Ok(())
}

#[test]
fn test_qvalue_loss_composition() -> Result<()> {
    let (actor, qvalue, value) = networks();
    let loss = IqlLoss::build(actor, qvalue, value, &config())?;
    let td = batch()?;

    // r + gamma * (1 - terminated) * V(s')
    let mut next = td.get_sub("next")?.clone();
    loss.value().forward(&loss.value_params().live()?, &mut next)?;
    let v_next = next.get(&"state_value".into())?.squeeze(D::Minus1)?;
    let not_done = td
        .get(&"next.terminated".into())?
        .to_dtype(candle_core::DType::F32)?
        .affine(-1.0, 1.0)?
        .squeeze(D::Minus1)?;
    let reward = td.get(&"next.reward".into())?.squeeze(D::Minus1)?;
    let target = (reward + (not_done * v_next)?.affine(GAMMA, 0.0)?)?;

    let pred = vmap_module(loss.qvalue(), &loss.qvalue_params().live()?, &td)?;
    let pred = pred.get(&"state_action_value".into())?.squeeze(D::Minus1)?;
    assert_eq!(pred.dims(), &[N_QVALUE_NETS, BATCH_SIZE]);
    let target_ = target.broadcast_as(pred.shape())?;
    let expected = smooth_l1(&pred, &target_)?.sum(0)?.mean_all()?;
    let expected_priority = (&pred - &target_)?.sqr()?.max(0)?;

    let (loss_qvalue, priority) = loss.qvalue_loss(&td)?;
    assert_close(&loss_qvalue, &expected)?;
    assert_close(&priority, &expected_priority)?;
    Ok(())
}

#[test]
fn test_value_loss_expectile() -> Result<()> {
    let (actor, qvalue, value) = networks();
    let loss = IqlLoss::build(actor, qvalue, value, &config())?;
    let td = batch()?;

    let q = vmap_module(loss.qvalue(), &loss.qvalue_params().target()?, &td)?;
    let q = q.get(&"state_action_value".into())?.squeeze(D::Minus1)?.min(0)?;
    let mut td_v = td.clone();
    loss.value().forward(&loss.value_params().live()?, &mut td_v)?;
    let v = td_v.get(&"state_value".into())?.squeeze(D::Minus1)?;

    let diff = (q - v)?.to_vec1::<f32>()?;
    let expected: f32 = diff
        .iter()
        .map(|d| if *d > 0.0 { 0.7 * d * d } else { 0.3 * d * d })
        .sum::<f32>()
        / BATCH_SIZE as f32;
    let loss_value = loss.value_loss(&td)?.to_scalar::<f32>()?;
    assert!((loss_value - expected).abs() < 1e-4);
    Ok(())
}

#[test]
fn test_value_estimators() -> Result<()> {
    let (actor, qvalue, value) = networks();
    let mut loss = IqlLoss::build(actor, qvalue, value, &config())?;
    let td = batch()?;
    let (l0, _) = loss.qvalue_loss(&td)?;

    // TD(lambda) with lambda = 0 equals TD0
    let td_lambda = ValueEstimatorConfig::new(ValueEstimatorKind::TDLambda)
        .gamma(GAMMA)
        .lmbda(0.0);
    loss.make_value_estimator(&td_lambda)?;
    let (l1, _) = loss.qvalue_loss(&td)?;
    assert_close(&l0, &l1)?;
    assert_eq!(loss.value_estimator().gamma(), GAMMA);

    loss.make_value_estimator(&ValueEstimatorConfig::new(ValueEstimatorKind::TD1))?;
    loss.forward(&mut batch()?)?;

    let res = loss.make_value_estimator(&ValueEstimatorConfig::new(ValueEstimatorKind::GAE));
    assert!(res.is_err());
    Ok(())
}

#[test]
fn test_build_errors() {
    let gae = config().value_estimator(ValueEstimatorConfig::new(ValueEstimatorKind::GAE));
    let expectile = config().expectile(1.0);
    let n_nets = config().num_qvalue_nets(0);

    for config in [gae, expectile, n_nets].iter() {
        let (actor, qvalue, value) = networks();
        let err = IqlLoss::build(actor, qvalue, value, config).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<OffrlError>(),
            Some(OffrlError::Config(_))
        ));
    }
}

#[test]
fn test_deprecated_gamma() -> Result<()> {
    let mut config = config();
    config.gamma = Some(0.5);
    let (actor, qvalue, value) = networks();
    let loss = IqlLoss::build(actor, qvalue, value, &config)?;
    assert_eq!(loss.value_estimator().gamma(), 0.5);
    Ok(())
}

#[test]
fn test_optimization() -> Result<()> {
    let config = config()
        .loss_function(LossFunction::L2)
        .actor_opt_config(OptimizerConfig::Adam { lr: 1e-3 })
        .qvalue_opt_config(OptimizerConfig::Adam { lr: 1e-2 })
        .value_opt_config(OptimizerConfig::Adam { lr: 1e-4 })
        .target_update(TargetNetUpdater::Soft { tau: 0.0 });
    let (actor, qvalue, value) = networks();
    let mut loss = IqlLoss::build(actor, qvalue, value, &config)?;
    let mut opt = IqlOptimizer::build(&loss, &config)?;
    let td = batch()?;

    let target0 = loss.qvalue_params().target()?;
    let (l0, _) = loss.qvalue_loss(&td)?;
    for _ in 0..49 {
        opt.step(&mut loss, &mut td.clone())?;
    }
    let mut td_last = td.clone();
    let record = opt.step(&mut loss, &mut td_last)?;
    let (l1, _) = loss.qvalue_loss(&td)?;
    assert!(l1.to_scalar::<f32>()? < l0.to_scalar::<f32>()?);
    assert_eq!(opt.n_updates(), 50);
    assert_eq!(record.get_scalar("n_updates")?, 50.0);

    // per-sample priorities of the last step, as written into the batch
    let priority = record.get_array1("td_error")?;
    assert_eq!(priority.len(), BATCH_SIZE);
    assert_eq!(priority, td_last.get(&"td_error".into())?.to_vec1::<f32>()?);
    assert!(priority.iter().all(|p| *p >= 0.0));

    // tau = 0 leaves the target parameters alone
    let target1 = loss.qvalue_params().target()?;
    for name in target0.names().iter() {
        let a = target0.get(name).unwrap().flatten_all()?.to_vec1::<f32>()?;
        let b = target1.get(name).unwrap().flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(a, b);
    }
    Ok(())
}

#[test]
fn test_save_load_params() -> Result<()> {
    let dir = TempDir::new("iql_params")?;
    let (actor, qvalue, value) = networks();
    let loss = IqlLoss::build(actor, qvalue, value, &config())?;
    let paths = loss.save_params(dir.path())?;
    assert_eq!(paths.len(), 4);

    let (actor, qvalue, value) = networks();
    let mut loss_ = IqlLoss::build(actor, qvalue, value, &config())?;
    loss_.load_params(dir.path())?;

    let td = batch()?;
    let out = loss.forward(&mut td.clone())?;
    let out_ = loss_.forward(&mut td.clone())?;
    assert_close(&out.loss_actor, &out_.loss_actor)?;
    assert_close(&out.loss_qvalue, &out_.loss_qvalue)?;
    assert_close(&out.loss_value, &out_.loss_value)?;
    Ok(())
}
