//! Transition batches addressed by nested keys.
use anyhow::{bail, Result};
use candle_core::Tensor;
use offrl_core::{error::OffrlError, NestedKey};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
enum Entry {
    Tensor(Tensor),
    Dict(TensorDict),
}

/// A mapping from nested keys to [`Tensor`]s sharing leading batch dimensions.
///
/// A batch of transitions has batch size `[B]` (or `[B, T]` with a time
/// dimension). Fields describing the post-transition state are stored under
/// the `next` sub-dictionary, e.g. `("next", "reward")`. Nested dictionaries
/// always carry the batch size of their parent.
///
/// [`Tensor`]: https://docs.rs/candle-core/0.8.4/candle_core/struct.Tensor.html
#[derive(Clone, Debug)]
pub struct TensorDict {
    batch_size: Vec<usize>,
    entries: BTreeMap<String, Entry>,
}

impl TensorDict {
    /// Creates an empty dictionary with the given batch size.
    pub fn new(batch_size: &[usize]) -> Self {
        Self {
            batch_size: batch_size.to_vec(),
            entries: BTreeMap::new(),
        }
    }

    /// Batch dimensions shared by all tensors.
    pub fn batch_size(&self) -> &[usize] {
        &self.batch_size
    }

    /// Number of batch dimensions.
    pub fn ndim(&self) -> usize {
        self.batch_size.len()
    }

    /// Number of elements in the batch, i.e., the product of the batch dimensions.
    pub fn numel(&self) -> usize {
        self.batch_size.iter().product()
    }

    /// Returns `true` if the dictionary holds no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the tensor at `key`.
    pub fn get(&self, key: &NestedKey) -> Result<&Tensor> {
        match self.lookup(key.parts()) {
            Some(t) => Ok(t),
            None => Err(OffrlError::MissingKey(key.to_string()).into()),
        }
    }

    fn lookup(&self, parts: &[String]) -> Option<&Tensor> {
        let (first, rest) = parts.split_first()?;
        match (self.entries.get(first)?, rest.is_empty()) {
            (Entry::Tensor(t), true) => Some(t),
            (Entry::Dict(d), false) => d.lookup(rest),
            _ => None,
        }
    }

    /// Returns `true` if a tensor is stored at `key`.
    pub fn contains(&self, key: &NestedKey) -> bool {
        self.lookup(key.parts()).is_some()
    }

    /// Returns the sub-dictionary `name`, e.g. `next`.
    pub fn get_sub(&self, name: &str) -> Result<&TensorDict> {
        match self.entries.get(name) {
            Some(Entry::Dict(d)) => Ok(d),
            _ => Err(OffrlError::MissingKey(name.to_string()).into()),
        }
    }

    /// Stores `tensor` at `key`, creating intermediate sub-dictionaries.
    ///
    /// The leading dimensions of `tensor` must equal the batch size.
    pub fn set(&mut self, key: impl Into<NestedKey>, tensor: Tensor) -> Result<()> {
        let key = key.into();
        let dims = tensor.dims();
        let n = self.batch_size.len();
        if dims.len() < n || dims[..n] != self.batch_size[..] {
            return Err(OffrlError::BatchSize(format!(
                "{} has shape {:?}, expected leading dims {:?}",
                key, dims, self.batch_size
            ))
            .into());
        }
        self.insert(key.parts(), tensor, &key)
    }

    fn insert(&mut self, parts: &[String], tensor: Tensor, key: &NestedKey) -> Result<()> {
        let (first, rest) = match parts.split_first() {
            Some(p) => p,
            None => bail!("Empty key"),
        };
        if rest.is_empty() {
            self.entries.insert(first.clone(), Entry::Tensor(tensor));
            return Ok(());
        }
        let batch_size = self.batch_size.clone();
        let entry = self
            .entries
            .entry(first.clone())
            .or_insert_with(|| Entry::Dict(TensorDict::new(&batch_size)));
        match entry {
            Entry::Dict(d) => d.insert(rest, tensor, key),
            Entry::Tensor(_) => bail!("Cannot set {}: {} holds a tensor", key, first),
        }
    }

    /// Returns the keys of all tensors, in sorted order.
    pub fn keys(&self) -> Vec<NestedKey> {
        let mut keys = vec![];
        for (name, entry) in self.entries.iter() {
            match entry {
                Entry::Tensor(_) => keys.push(NestedKey::new(vec![name.clone()])),
                Entry::Dict(d) => keys.extend(d.keys().iter().map(|k| k.prefixed(name))),
            }
        }
        keys
    }

    /// Returns a new dictionary with the given keys only.
    ///
    /// Tensors are shared, not copied. Every key must exist.
    pub fn select(&self, keys: &[NestedKey]) -> Result<TensorDict> {
        let mut td = TensorDict::new(&self.batch_size);
        for key in keys.iter() {
            td.set(key.clone(), self.get(key)?.clone())?;
        }
        Ok(td)
    }

    /// Copies all tensors of `other` into this dictionary.
    pub fn update(&mut self, other: &TensorDict) -> Result<()> {
        for key in other.keys().into_iter() {
            let t = other.get(&key)?.clone();
            self.set(key, t)?;
        }
        Ok(())
    }

    /// Returns the dictionary with the batch dimensions reshaped to `batch_size`.
    ///
    /// Trailing (feature) dimensions of each tensor are kept.
    pub fn reshape(&self, batch_size: &[usize]) -> Result<TensorDict> {
        if batch_size.iter().product::<usize>() != self.numel() {
            return Err(OffrlError::BatchSize(format!(
                "cannot reshape batch {:?} into {:?}",
                self.batch_size, batch_size
            ))
            .into());
        }
        let n = self.ndim();
        self.map(batch_size, &|t| {
            let mut shape = batch_size.to_vec();
            shape.extend_from_slice(&t.dims()[n..]);
            Ok(t.reshape(shape)?)
        })
    }

    /// Flattens the batch dimensions into one.
    pub fn flatten(&self) -> Result<TensorDict> {
        self.reshape(&[self.numel()])
    }

    /// Returns the dictionary with all tensors detached from the computation graph.
    pub fn detach(&self) -> Result<TensorDict> {
        self.map(&self.batch_size, &|t| Ok(t.detach()))
    }

    fn map(&self, batch_size: &[usize], f: &dyn Fn(&Tensor) -> Result<Tensor>) -> Result<TensorDict> {
        let mut entries = BTreeMap::new();
        for (name, entry) in self.entries.iter() {
            let entry = match entry {
                Entry::Tensor(t) => Entry::Tensor(f(t)?),
                Entry::Dict(d) => Entry::Dict(d.map(batch_size, f)?),
            };
            entries.insert(name.clone(), entry);
        }
        Ok(TensorDict {
            batch_size: batch_size.to_vec(),
            entries,
        })
    }

    /// Stacks dictionaries with identical keys along a new leading batch dimension.
    pub fn stack(tds: &[TensorDict]) -> Result<TensorDict> {
        let first = match tds.first() {
            Some(td) => td,
            None => bail!("Cannot stack an empty list of TensorDict"),
        };
        let mut batch_size = vec![tds.len()];
        batch_size.extend_from_slice(first.batch_size());

        let mut td = TensorDict::new(&batch_size);
        for key in first.keys().into_iter() {
            let ts = tds.iter().map(|td| td.get(&key)).collect::<Result<Vec<_>>>()?;
            td.set(key, Tensor::stack(&ts, 0)?)?;
        }
        Ok(td)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};

    fn batch() -> Result<TensorDict> {
        let dev = Device::Cpu;
        let mut td = TensorDict::new(&[2, 3]);
        td.set("observation", Tensor::randn(0f32, 1., (2, 3, 4), &dev)?)?;
        td.set(("next", "reward"), Tensor::ones((2, 3, 1), DType::F32, &dev)?)?;
        td.set(("next", "observation"), Tensor::zeros((2, 3, 4), DType::F32, &dev)?)?;
        Ok(td)
    }

    #[test]
    fn test_get_set_nested() -> Result<()> {
        let td = batch()?;
        assert_eq!(td.get(&"next.reward".into())?.dims(), &[2, 3, 1]);
        assert!(td.contains(&("next", "observation").into()));
        assert!(!td.contains(&"next".into()));
        assert_eq!(td.get_sub("next")?.batch_size(), &[2, 3]);
        assert_eq!(td.keys().len(), 3);
        Ok(())
    }

    #[test]
    fn test_batch_size_is_enforced() -> Result<()> {
        let mut td = batch()?;
        let t = Tensor::zeros((3, 2), DType::F32, &Device::Cpu)?;
        let err = td.set("bad", t).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OffrlError>(),
            Some(OffrlError::BatchSize(_))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_key() -> Result<()> {
        let td = batch()?;
        let err = td.select(&["action".into()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OffrlError>(),
            Some(OffrlError::MissingKey(_))
        ));
        Ok(())
    }

    #[test]
    fn test_reshape_round_trip() -> Result<()> {
        let td = batch()?;
        let flat = td.flatten()?;
        assert_eq!(flat.batch_size(), &[6]);
        assert_eq!(flat.get(&"observation".into())?.dims(), &[6, 4]);
        assert_eq!(flat.get_sub("next")?.batch_size(), &[6]);

        let td_ = flat.reshape(&[2, 3])?;
        for key in td.keys().iter() {
            let a = td.get(key)?.flatten_all()?.to_vec1::<f32>()?;
            let b = td_.get(key)?.flatten_all()?.to_vec1::<f32>()?;
            assert_eq!(a, b);
        }
        assert!(td.reshape(&[4]).is_err());
        Ok(())
    }

    #[test]
    fn test_update_overwrites_and_adds() -> Result<()> {
        let dev = Device::Cpu;
        let mut td = batch()?;
        let mut other = TensorDict::new(&[2, 3]);
        other.set(("next", "reward"), Tensor::zeros((2, 3, 1), DType::F32, &dev)?)?;
        other.set("td_error", Tensor::ones((2, 3), DType::F32, &dev)?)?;
        td.update(&other)?;

        assert_eq!(td.keys().len(), 4);
        let reward = td.get(&"next.reward".into())?.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(reward, vec![0.0; 6]);
        assert_eq!(td.get(&"next.observation".into())?.dims(), &[2, 3, 4]);

        let mut wrong = TensorDict::new(&[6]);
        wrong.set("td_error", Tensor::ones(6, DType::F32, &dev)?)?;
        assert!(td.update(&wrong).is_err());
        Ok(())
    }

    #[test]
    fn test_detach() -> Result<()> {
        let var = candle_core::Var::ones((2, 3), DType::F32, &Device::Cpu)?;
        let mut td = TensorDict::new(&[2]);
        td.set("x", var.as_tensor().clone())?;
        td.set(("next", "x"), var.as_tensor().clone())?;
        let td = td.detach()?;
        assert_eq!(td.batch_size(), &[2]);
        for key in td.keys().iter() {
            assert!(!td.get(key)?.is_variable());
        }
        Ok(())
    }

    #[test]
    fn test_stack() -> Result<()> {
        let td = batch()?.flatten()?;
        let stacked = TensorDict::stack(&[td.clone(), td])?;
        assert_eq!(stacked.batch_size(), &[2, 6]);
        assert_eq!(stacked.get(&"next.reward".into())?.dims(), &[2, 6, 1]);
        Ok(())
    }
}
