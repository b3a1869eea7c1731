use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::ConfigError;

/// Env var pointing at a JSON training config.
pub const CONFIG_ENV: &str = "NEO_HAZARD_CONFIG";

/// Training parameters. Every field has a documented default so a partial
/// JSON file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Fraction of each class held out for evaluation. Default 0.25.
    pub test_size: f64,
    /// Seed for the stratified shuffle. Part of the reproducibility
    /// contract: same rows + same seed = same split. Default 42.
    pub seed: u64,
    /// Newton iteration budget for the classifier. Default 200.
    pub max_iter: usize,
    /// Convergence threshold on the max-abs gradient. Default 1e-4.
    pub tol: f64,
    /// Inverse L2 regularization strength. Default 1.0.
    pub c: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            test_size: 0.25,
            seed: 42,
            max_iter: 200,
            tol: 1e-4,
            c: 1.0,
        }
    }
}

impl TrainConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Explicit path wins, then `NEO_HAZARD_CONFIG`, then defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            return Self::load(p);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(p) if !p.is_empty() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(ConfigError::Invalid(format!("tol must be positive, got {}", self.tol)));
        }
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(ConfigError::Invalid(format!("c must be positive, got {}", self.c)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"seed": 7, "max_iter": 50}}"#).unwrap();

        let cfg = TrainConfig::load(f.path()).unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.max_iter, 50);
        assert_eq!(cfg.test_size, 0.25);
        assert_eq!(cfg.c, 1.0);
    }

    #[test]
    fn explicit_path_wins() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"seed": 11}}"#).unwrap();
        assert_eq!(TrainConfig::resolve(Some(f.path())).unwrap().seed, 11);
    }

    #[test]
    fn out_of_range_values_rejected() {
        let cfg = TrainConfig {
            test_size: 1.0,
            ..TrainConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let cfg = TrainConfig {
            c: 0.0,
            ..TrainConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_json_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "seed = 3").unwrap();
        assert!(matches!(TrainConfig::load(f.path()), Err(ConfigError::Json(_))));
    }
}
