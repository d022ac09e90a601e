mod aspect_config;
mod base_config;

use std::path::{Path, PathBuf};

pub use aspect_config::AspectConfig;
pub use base_config::{default_bazel_executable, Config};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file {0:?} does not exist")]
    Missing(PathBuf),
    #[error("Unable to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn parse_config(input: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(input)
}

fn fallback_paths(name: &str) -> Vec<PathBuf> {
    let file_name = format!(".{}", name);
    let mut paths = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(&file_name));
    }
    paths.push(Path::new("/etc").join(&file_name));
    paths
}

/// An explicit `path` must exist. Without one the first of `~/.<name>` and
/// `/etc/.<name>` is used, and defaults when neither exists.
pub fn load_config_file(path: Option<&Path>, name: &str) -> Result<Config, ConfigError> {
    let chosen = match path {
        Some(path) if !path.exists() => return Err(ConfigError::Missing(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => fallback_paths(name).into_iter().find(|p| p.exists()),
    };
    let path = match chosen {
        Some(path) => path,
        None => return Ok(Config::default()),
    };

    debug!("Loading config from {:?}", path);
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    parse_config(&content).map_err(|source| ConfigError::Parse { path, source })
}
