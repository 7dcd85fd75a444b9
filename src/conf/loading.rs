use std::path::Path;

use anyhow::Context;
use anyhow::Result;

use super::Configuration;

/// No configuration file exists at the given path.
#[derive(Debug, thiserror::Error)]
#[error("configuration file not found at '{path}'")]
pub struct ConfigFileNotFound {
    pub path: String,
}

/// The configuration file exists but could not be read.
#[derive(Debug, thiserror::Error)]
#[error("unable to read configuration file at '{path}'")]
pub struct ConfigFileRead {
    pub path: String,
}

/// The configuration file content is not a valid configuration.
#[derive(Debug, thiserror::Error)]
#[error("unable to decode configuration file at '{path}'")]
pub struct ConfigFileDecode {
    pub path: String,
}

/// Read a [`Configuration`] from a YAML (or JSON) file.
///
/// The configured CAs are not decoded here, storing the configuration does that.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Configuration> {
    let path = path.as_ref();
    let display = path.display().to_string();
    if !path.exists() {
        anyhow::bail!(ConfigFileNotFound { path: display });
    }
    let text = std::fs::read_to_string(path).with_context(|| ConfigFileRead {
        path: display.clone(),
    })?;
    let config = serde_yaml::from_str(&text).with_context(|| ConfigFileDecode { path: display })?;
    Ok(config)
}
