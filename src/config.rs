//! `stackmerge.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::{EnrichmentOptions, MergeError, MergeResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Per-stack enrichment switches.
    #[serde(default)]
    pub enrichment: EnrichmentOptions,

    /// Seed for the scaler's rounding RNG; OS entropy when unset.
    #[serde(default)]
    pub scale_seed: Option<u64>,
}

impl Config {
    pub fn load(path: &Path) -> MergeResult<Self> {
        let s = std::fs::read_to_string(path)?;
        toml::from_str::<Config>(&s).map_err(|err| MergeError::Config(format!("{}: {err}", path.display())))
    }

    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProfileApiVersion;

    fn temp_config(name: &str, body: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("stackmerge-{name}-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!("stackmerge-missing-{}.toml", uuid::Uuid::new_v4()));
        assert_eq!(Config::load_optional(&path), Config::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let path = temp_config(
            "partial",
            "scale_seed = 9\n\n[enrichment]\nprofile_api_version = \"v1\"\ncontainer_names = false\n",
        );
        let cfg = Config::load_optional(&path);
        assert_eq!(cfg.scale_seed, Some(9));
        assert_eq!(cfg.enrichment.profile_api_version, ProfileApiVersion::V1);
        assert!(!cfg.enrichment.container_names);
        assert!(cfg.enrichment.application_identifiers);
        assert!(cfg.enrichment.application_metadata);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn invalid_file_falls_back_but_strict_load_errors() {
        let path = temp_config("invalid", "scale_seed = \"nope\"");
        assert_eq!(Config::load_optional(&path), Config::default());
        match Config::load(&path) {
            Err(MergeError::Config(msg)) => assert!(msg.contains(&path.display().to_string())),
            other => panic!("expected config error, got {other:?}"),
        }
        let _ = std::fs::remove_file(&path);
    }
}
