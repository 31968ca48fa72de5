use anyhow::Result;
use chrono::NaiveDate;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pasa::reconcile::DEFAULT_LOOKBACK_DAYS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub db: DbConfig,
    pub report: ReportConfig,
}

/// Connection parameters of the forecast database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub mtpasa_table: String,
    pub stpasa_table: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "SRA_Analysis".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            mtpasa_table: "MTPASA_DUIDAvailability".to_string(),
            stpasa_table: "STPASA".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Where the HTML report is written
    pub output: PathBuf,
    pub lookback_days: u64,
    /// Number of most recent publish runs shown in delta charts
    pub recent_runs: usize,
    /// Region selected when a delta chart first loads
    pub default_region: String,
    /// Processing date override, defaults to the local date
    pub today: Option<NaiveDate>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("pasa.html"),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            recent_runs: 15,
            default_region: "NSW1".to_string(),
            today: None,
        }
    }
}

impl ReportConfig {
    pub fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

impl Config {
    /// Defaults, then `pasa.toml`, then `PASA_` environment variables (`PASA_DB__HOST`)
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("pasa.toml"))
                .merge(Env::prefixed("PASA_").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }
}
