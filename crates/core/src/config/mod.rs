use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{BackdropError, EmptyQueryPolicy, ImagePool, KeywordTable, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backgrounds: BackgroundConfig,
}

impl AppConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&raw)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.backgrounds.validate()
    }
}

/// Configuration of the backdrop engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Directory image identifiers are resolved against.
    pub asset_root: PathBuf,
    pub carousel_interval_ms: u64,
    pub empty_query: EmptyQueryPolicy,
    pub pools: ImagePool,
    pub keywords: KeywordTable,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("public"),
            carousel_interval_ms: 5_000,
            empty_query: EmptyQueryPolicy::default(),
            pools: ImagePool::default(),
            keywords: KeywordTable::default(),
        }
    }
}

impl BackgroundConfig {
    pub fn carousel_period(&self) -> Duration {
        Duration::from_millis(self.carousel_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.carousel_interval_ms == 0 {
            return Err(BackdropError::InvalidConfig(
                "carousel_interval_ms must be greater than zero".to_string(),
            ));
        }
        self.pools.validate()
    }
}
