use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "dam.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", config_name(.path))]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml::de::Error,
    },
}

fn config_name(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => CONFIG_FILE.to_string(),
    }
}

/// Contents of `dam.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DamConfig {
    pub build: BuildSettings,
    pub assembler: AssemblerSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    /// Directory for the `.j` file and the assembler's output. Relative
    /// paths are taken from the source file's directory. Unset means the
    /// source file's directory itself.
    pub out_dir: Option<PathBuf>,
    pub keep_assembly: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            out_dir: None,
            keep_assembly: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssemblerSettings {
    pub program: String,
    /// Passed before `-d <dir> <file.j>`, e.g. `["-jar", "jasmin.jar"]`.
    pub args: Vec<String>,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            program: "jasmin".to_string(),
            args: Vec::new(),
        }
    }
}

impl std::str::FromStr for DamConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|source| ConfigError::Parse { path: None, source })
    }
}

impl DamConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    /// Look for `dam.toml` in `start` and each of its parents. Returns the
    /// file found with its parsed contents, or `None` when there is none.
    pub fn discover(start: &Path) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "found config");
                let config = Self::load(&candidate)?;
                return Ok(Some((candidate, config)));
            }
            if !dir.pop() {
                return Ok(None);
            }
        }
    }
}
