use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONF_DIR_NAME: &str = ".skylark";
const CONFIG_FILE_NAME: &str = "skylark.toml";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro-latest";

static CONF_DIR: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Resolved runtime configuration: TOML file under the conf dir, overlaid by
/// environment variables, overlaid by CLI flags.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub sky_scrapper_api_key: Option<String>,
    pub serpapi_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: None,
            gemini_api_key: None,
            sky_scrapper_api_key: None,
            serpapi_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct SkylarkTomlFile {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    gemini_api_key: Option<String>,
    #[serde(default)]
    sky_scrapper_api_key: Option<String>,
    #[serde(default)]
    serpapi_key: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

pub fn init_conf_dir(conf_dir: Option<PathBuf>) {
    let resolved = conf_dir.unwrap_or_else(default_conf_dir);
    let _ = CONF_DIR.set(resolved);
}

pub fn current_conf_dir() -> PathBuf {
    CONF_DIR.get().cloned().unwrap_or_else(default_conf_dir)
}

fn default_conf_dir() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(DEFAULT_CONF_DIR_NAME)
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = current_conf_dir().join(CONFIG_FILE_NAME);
    let file = load_toml_file(&path)?;
    Ok(resolve_config(&file, |key| env::var(key).ok()))
}

// The process environment wins over the `[env]` table, which wins over the
// file's own keys. The process environment is never mutated.
fn resolve_config(
    file: &SkylarkTomlFile,
    process_env: impl Fn(&str) -> Option<String>,
) -> AppConfig {
    let lookup = |key: &str| {
        non_empty(process_env(key)).or_else(|| non_empty(file.env.get(key).cloned()))
    };

    AppConfig {
        model: lookup("GEMINI_MODEL_NAME")
            .or_else(|| non_empty(file.model.clone()))
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        base_url: non_empty(file.base_url.clone()),
        gemini_api_key: lookup("GEMINI_API_KEY")
            .or_else(|| non_empty(file.gemini_api_key.clone())),
        sky_scrapper_api_key: lookup("FLIGHTS_SCRAPER_SKY_API_KEY")
            .or_else(|| non_empty(file.sky_scrapper_api_key.clone())),
        serpapi_key: lookup("SERPAPI_KEY").or_else(|| non_empty(file.serpapi_key.clone())),
    }
}

fn load_toml_file(path: &Path) -> Result<SkylarkTomlFile, ConfigError> {
    if !path.exists() {
        return Ok(SkylarkTomlFile::default());
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
