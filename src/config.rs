use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::extract::DEFAULT_MAX_SCAN;

const DEFAULT_BASE_URL: &str = "https://conveniomarco2.mercadopublico.cl/alimentos2/alimentos";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config ({path}): {error}")]
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("failed to parse config ({path}): {error}")]
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
    #[error("invalid base URL {url}: {error}")]
    BaseUrl {
        url: String,
        error: url::ParseError,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Marketplace {
    pub base_url: String,
    pub page_size: u32,
    pub order: String,
    pub user_agent: String,
}

impl Default for Marketplace {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            page_size: 25,
            order: "name".into(),
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Http {
    pub timeout_secs: u64,
}

impl Default for Http {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Catalog {
    pub workers: usize,
    pub delay_ms: u64,
    pub max_pages: Option<u32>,
    pub output: PathBuf,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            workers: 5,
            delay_ms: 500,
            max_pages: None,
            output: "productos_convenio_marco.csv".into(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Prices {
    pub workers: usize,
    pub delay_ms: u64,
    pub max_products: Option<usize>,
    pub input: PathBuf,
    pub output: PathBuf,
    pub max_scan: usize,
}

impl Default for Prices {
    fn default() -> Self {
        Self {
            workers: 4,
            delay_ms: 1000,
            max_products: None,
            input: "productos_convenio_marco.csv".into(),
            output: "productos_precios_ofertas.csv".into(),
            max_scan: DEFAULT_MAX_SCAN,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub marketplace: Marketplace,
    pub http: Http,
    pub catalog: Catalog,
    pub prices: Prices,
}

impl Config {
    /// Load from `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let src = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_owned(),
            error,
        })?;
        toml::from_str(&src).map_err(|error| ConfigError::Parse {
            path: path.to_owned(),
            error,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.marketplace.base_url).map_err(|error| ConfigError::BaseUrl {
            url: self.marketplace.base_url.clone(),
            error,
        })?;
        if self.marketplace.page_size == 0 {
            return Err(ConfigError::Zero("marketplace.page_size"));
        }
        if self.catalog.workers == 0 {
            return Err(ConfigError::Zero("catalog.workers"));
        }
        if self.prices.workers == 0 {
            return Err(ConfigError::Zero("prices.workers"));
        }
        if self.prices.max_scan == 0 {
            return Err(ConfigError::Zero("prices.max_scan"));
        }
        Ok(())
    }
}
