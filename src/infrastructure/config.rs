use crate::domain::calibration::DEFAULT_MIN_PIXEL_SEPARATION;
use crate::domain::collector::DEFAULT_DEDUP_THRESHOLD;
use crate::domain::gate::GateSettings;
use crate::domain::query_guard::DEFAULT_ROW_LIMIT;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub digitisation: DigitisationSettings,
    #[serde(default)]
    pub query: QuerySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DigitisationSettings {
    #[serde(default = "default_min_separation")]
    pub min_calibration_separation_px: f64,
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold_px: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuerySettings {
    #[serde(default = "default_max_rows")]
    pub max_rows: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_path() -> String {
    "qp_digitiser.db".to_string()
}

fn default_min_separation() -> f64 {
    DEFAULT_MIN_PIXEL_SEPARATION
}

fn default_dedup_threshold() -> f64 {
    DEFAULT_DEDUP_THRESHOLD
}

fn default_max_rows() -> u64 {
    DEFAULT_ROW_LIMIT
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for DigitisationSettings {
    fn default() -> Self {
        Self {
            min_calibration_separation_px: default_min_separation(),
            dedup_threshold_px: default_dedup_threshold(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
        }
    }
}

impl DigitisationSettings {
    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            min_calibration_separation: self.min_calibration_separation_px,
            dedup_threshold: self.dedup_threshold_px,
        }
    }
}

/// `config/digitiser.{toml,yaml,json}` if present, then `DIGITISER__*` environment variables
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/digitiser").required(false))
        .add_source(
            config::Environment::with_prefix("DIGITISER")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
