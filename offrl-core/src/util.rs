//! Utilities for configuration files.
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Saves a configuration as a YAML file.
pub fn save_yaml<T: Serialize>(config: &T, path: impl AsRef<Path>) -> Result<()> {
    let path_ = path.as_ref().to_owned();
    let mut file = File::create(path)?;
    file.write_all(serde_yaml::to_string(config)?.as_bytes())?;
    info!("Save config into {}", path_.display());
    Ok(())
}

/// Loads a configuration from a YAML file.
pub fn load_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path_ = path.as_ref().to_owned();
    let file = File::open(path)?;
    let rdr = BufReader::new(file);
    let b = serde_yaml::from_reader(rdr)?;
    info!("Load config from {}", path_.display());
    Ok(b)
}
