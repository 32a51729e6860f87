use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::Parameters;
use crate::error::{Error, Result};

/// Settings read from `config.toml`. Every field is optional in the file.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Parameter updates per second.
    #[serde(default = "default_param_rate")]
    pub param_rate: u32,
    /// Minimum transition width in milliseconds.
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u32,
    /// Roll-off compensation spec, `freq=mult[,freq=mult]...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolloff: Option<String>,
    /// Directory that relative WAV output paths are placed under.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_param_rate() -> u32 {
    10
}

fn default_fade_ms() -> u32 {
    60_000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            param_rate: default_param_rate(),
            fade_ms: default_fade_ms(),
            rolloff: None,
            output_dir: default_output_dir(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&txt).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Load `path` if it exists, falling back to the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default configuration to `path`.
    pub fn generate_default(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let txt = toml::to_string_pretty(&Self::default())
            .map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, txt).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn parameters(&self) -> Parameters {
        Parameters {
            sample_rate: self.sample_rate,
            param_rate: self.param_rate,
            fade_ms: self.fade_ms,
            rolloff: self.rolloff.clone(),
        }
    }

    /// Resolve a relative output file under `output_dir`.
    pub fn output_path(&self, name: &Path) -> PathBuf {
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.output_dir.join(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::load_or_default(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.sample_rate, 44_100);
        assert_eq!(cfg.param_rate, 10);
        assert_eq!(cfg.fade_ms, 60_000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sample_rate = 48000\nrolloff = \"100=1,1000=0.5\"\n").unwrap();
        let cfg = EngineConfig::load_or_default(&path).unwrap();
        assert_eq!(cfg.sample_rate, 48_000);
        assert_eq!(cfg.fade_ms, 60_000);
        assert_eq!(cfg.rolloff.as_deref(), Some("100=1,1000=0.5"));
        assert_eq!(cfg.parameters().sample_rate, 48_000);
    }

    #[test]
    fn generated_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        EngineConfig::generate_default(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), EngineConfig::default());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sample_rate = \"fast\"\n").unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn relative_outputs_go_under_output_dir() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.output_path(Path::new("a.wav")), PathBuf::from("output/a.wav"));
        let abs = std::env::temp_dir().join("b.wav");
        assert_eq!(cfg.output_path(&abs), abs);
    }
}
