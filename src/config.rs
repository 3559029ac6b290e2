//! Runtime settings read from the environment.

use std::path::PathBuf;

use crate::data::{default_notes_path, default_plotting_config_path};
use crate::grouping::{SignificanceRule, DEFAULT_TOP_K};
use crate::options::OptionDefaults;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dataset_path: Option<PathBuf>,
    /// Defaults to `<dataset stem>.db` next to the dataset.
    pub notes_path: Option<PathBuf>,
    /// Defaults to `<dataset stem>_plotting-config.json` next to the dataset.
    pub plotting_config_path: Option<PathBuf>,
    pub significance: SignificanceRule,
    pub defaults: OptionDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dataset_path: None,
            notes_path: None,
            plotting_config_path: None,
            significance: SignificanceRule::default(),
            defaults: OptionDefaults::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let base = OptionDefaults::default();
        Self {
            dataset_path: std::env::var("DATASET_PATH").ok().map(PathBuf::from),
            notes_path: std::env::var("NOTES_DB").ok().map(PathBuf::from),
            plotting_config_path: std::env::var("PLOTTING_CONFIG").ok().map(PathBuf::from),
            significance: SignificanceRule {
                top_k: std::env::var("SIGNIFICANT_TOP_K").ok().and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_TOP_K),
                min_share: std::env::var("NEGLIGIBLE_SHARE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|s: &f64| s.is_finite() && *s >= 0.0)
                    .unwrap_or(0.0),
            },
            defaults: OptionDefaults {
                country: env_or("DEFAULT_COUNTRY", base.country),
                category: env_or("DEFAULT_CATEGORY", base.category),
                entity: env_or("DEFAULT_ENTITY", base.entity),
                source_scenario: env_or("DEFAULT_SOURCE_SCENARIO", base.source_scenario),
                country_priority: base.country_priority,
            },
        }
    }

    /// Point the config at `dataset`, keeping any side-file paths already set.
    pub fn with_dataset(mut self, dataset: impl Into<PathBuf>) -> Self {
        self.dataset_path = Some(dataset.into());
        self
    }

    /// Fill unset side-file paths with the ones colocated with the dataset.
    pub fn resolve_paths(&mut self) {
        let Some(dataset) = self.dataset_path.clone() else {
            return;
        };
        if self.notes_path.is_none() {
            self.notes_path = Some(default_notes_path(&dataset));
        }
        if self.plotting_config_path.is_none() {
            self.plotting_config_path = Some(default_plotting_config_path(&dataset));
        }
    }
}

/// An empty value disables the preference.
fn env_or(key: &str, fallback: Option<String>) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(v.trim().to_string()),
        Err(_) => fallback,
    }
}
