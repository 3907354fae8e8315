use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3100";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_MODEL: &str = "models/gemini-2.5-flash";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 900;
const DEFAULT_RSS_MAX_ITEMS: usize = 20;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}")]
    InvalidVar(&'static str),
}

/// Service configuration, collected from the environment once at
/// startup. The prompt override file is re-read per evaluation and only
/// its location is fixed here.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub data_dir: PathBuf,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub prompt_override: PathBuf,
    pub poll_interval: Duration,
    pub rss_max_items: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;
        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("GEMINI_API_KEY"))?;

        let bind_addr =
            std::env::var("CURATA_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let data_dir = PathBuf::from(
            std::env::var("CURATA_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string()),
        );
        let gemini_model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let prompt_override = std::env::var("CURATA_PROMPT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("prompt.toml"));

        let poll_interval = match std::env::var("CURATA_POLL_INTERVAL_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidVar("CURATA_POLL_INTERVAL_SECS"))?,
            ),
            Err(_) => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        };

        let rss_max_items = match std::env::var("CURATA_RSS_MAX_ITEMS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidVar("CURATA_RSS_MAX_ITEMS"))?,
            Err(_) => DEFAULT_RSS_MAX_ITEMS,
        };

        Ok(Config {
            bind_addr,
            database_url,
            data_dir,
            gemini_api_key,
            gemini_model,
            prompt_override,
            poll_interval,
            rss_max_items,
        })
    }

    pub fn preview_dir(&self) -> PathBuf {
        self.data_dir.join("previews")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.data_dir.join("audit").join("links.csv")
    }
}
