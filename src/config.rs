use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DashboardError;
use crate::lapis::DEFAULT_LAPIS_URL;
use crate::queries::DEFAULT_GROWTH_MODEL_URL;

pub const CONFIG_FILE: &str = "dashboard.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub lapis_url: Option<String>,
    #[serde(default)]
    pub growth_model_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub date_field: Option<String>,
    #[serde(default)]
    pub min_proportion: Option<f64>,
    #[serde(default)]
    pub max_grid_columns: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub lapis_url: String,
    pub growth_model_url: String,
    pub timeout: Duration,
    pub date_field: String,
    pub min_proportion: f64,
    pub max_grid_columns: usize,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            lapis_url: DEFAULT_LAPIS_URL.to_string(),
            growth_model_url: DEFAULT_GROWTH_MODEL_URL.to_string(),
            timeout: Duration::from_secs(default_timeout_secs()),
            date_field: default_date_field(),
            min_proportion: default_min_proportion(),
            max_grid_columns: default_max_grid_columns(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path is used as given. Otherwise `dashboard.json` in the
    /// working directory wins over the one in the user config directory.
    pub fn locate(path: Option<&str>) -> Result<Utf8PathBuf, DashboardError> {
        if let Some(path) = path {
            return Ok(Utf8PathBuf::from(path));
        }
        let local = Utf8PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Ok(local);
        }
        user_config_path()
            .filter(|candidate| candidate.exists())
            .ok_or(DashboardError::MissingConfig)
    }

    pub fn load(path: Option<&str>) -> Result<Config, DashboardError> {
        let config_path = Self::locate(path)?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Utf8Path) -> Result<Config, DashboardError> {
        debug!(%path, "reading config");
        let content = fs::read_to_string(path)
            .map_err(|_| DashboardError::ConfigRead(path.as_std_path().to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| DashboardError::ConfigParse(err.to_string()))
    }

    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, DashboardError> {
        Self::resolve_config(Self::load(path)?)
    }

    /// Like [`ConfigLoader::resolve`], but an absent implicit config file
    /// yields the defaults.
    pub fn resolve_or_default(path: Option<&str>) -> Result<ResolvedConfig, DashboardError> {
        match Self::resolve(path) {
            Err(DashboardError::MissingConfig) => Ok(ResolvedConfig::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, DashboardError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(DashboardError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let lapis_url = non_empty_url("lapis_url", config.lapis_url, DEFAULT_LAPIS_URL)?;
        let growth_model_url = non_empty_url(
            "growth_model_url",
            config.growth_model_url,
            DEFAULT_GROWTH_MODEL_URL,
        )?;

        let timeout_secs = config.timeout_secs.unwrap_or_else(default_timeout_secs);
        if timeout_secs == 0 {
            return Err(DashboardError::InvalidConfig(
                "timeout_secs must be positive".to_string(),
            ));
        }

        let date_field = config.date_field.unwrap_or_else(default_date_field);
        if date_field.trim().is_empty() {
            return Err(DashboardError::InvalidConfig(
                "date_field must not be empty".to_string(),
            ));
        }

        let min_proportion = config.min_proportion.unwrap_or_else(default_min_proportion);
        if !(0.0..=1.0).contains(&min_proportion) {
            return Err(DashboardError::InvalidConfig(format!(
                "min_proportion must be within [0, 1], got {min_proportion}"
            )));
        }

        let max_grid_columns = config
            .max_grid_columns
            .unwrap_or_else(default_max_grid_columns);
        if max_grid_columns == 0 {
            return Err(DashboardError::InvalidConfig(
                "max_grid_columns must be positive".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            lapis_url,
            growth_model_url,
            timeout: Duration::from_secs(timeout_secs),
            date_field,
            min_proportion,
            max_grid_columns,
        })
    }
}

fn user_config_path() -> Option<Utf8PathBuf> {
    BaseDirs::new().and_then(|dirs| {
        Utf8PathBuf::from_path_buf(dirs.config_dir().join("genomic-dashboard").join(CONFIG_FILE))
            .ok()
    })
}

fn non_empty_url(
    name: &str,
    value: Option<String>,
    default: &str,
) -> Result<String, DashboardError> {
    let url = value.unwrap_or_else(|| default.to_string());
    let url = url.trim().trim_end_matches('/').to_string();
    if url.is_empty() {
        return Err(DashboardError::InvalidConfig(format!("{name} must not be empty")));
    }
    Ok(url)
}

pub fn default_timeout_secs() -> u64 {
    60
}

pub fn default_date_field() -> String {
    "date".to_string()
}

pub fn default_min_proportion() -> f64 {
    0.05
}

pub fn default_max_grid_columns() -> usize {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_resolves_to_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved, ResolvedConfig::default());
        assert_eq!(resolved.lapis_url, DEFAULT_LAPIS_URL);
        assert_eq!(resolved.timeout, Duration::from_secs(60));
    }

    #[test]
    fn trailing_slash_is_dropped_from_urls() {
        let config = Config {
            lapis_url: Some("http://localhost:8090/".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.lapis_url, "http://localhost:8090");
    }
}
