use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use config::{Config, Environment};
use serde::Deserialize;

const DEFAULT_API_URL: &str = "https://api.openai-hk.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "grok-3-deepsearch";
const DEFAULT_CHANGELOG_URL: &str = "https://cursor.com/changelog";
const DEFAULT_DB_PATH: &str = "data/harvest.sqlite";

/// Runtime settings, read from `HARVEST_*` environment variables.
#[derive(Clone, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub changelog_url: String,
    pub db_path: PathBuf,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default("model", DEFAULT_MODEL)?
            .set_default("changelog_url", DEFAULT_CHANGELOG_URL)?
            .set_default("db_path", DEFAULT_DB_PATH)?
            .add_source(Environment::with_prefix("HARVEST"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("changelog_url", &self.changelog_url)
            .field("db_path", &self.db_path)
            .finish()
    }
}
