//! Engine settings, read from a JSON file.
//!
//! Every field has a default, so a partial (or missing) file is fine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write settings file: {0}")]
    Write(#[from] std::io::Error),
    #[error("cannot encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Point adjustments applied to registry rates at plan creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterestSettings {
    /// Added to the moratory rate when a plan asks for the standard surcharge.
    pub moratory_surcharge_points: Decimal,
    /// Subtracted from the moratory rate for debts arising before 2013.
    pub pre_2013_reduction_points: Decimal,
}

impl Default for InterestSettings {
    fn default() -> Self {
        Self {
            moratory_surcharge_points: dec!(4),
            pre_2013_reduction_points: dec!(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcingSettings {
    pub central_bank_url: String,
    pub ministry_index_url: String,
    pub legal_reference_urls: Vec<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub ministry_max_pages: u32,
    pub ministry_max_items: usize,
    /// Points added to the central-bank reference rate to obtain the moratory rate.
    pub statutory_surcharge_points: Decimal,
    /// When `false` the scheduled sourcing trigger does nothing.
    pub scheduled_enabled: bool,
}

impl Default for SourcingSettings {
    fn default() -> Self {
        Self {
            central_bank_url:
                "https://www.bancaditalia.it/compiti/polmon-garanzie/tassi-bce/index.html"
                    .to_string(),
            ministry_index_url: "https://www.mef.gov.it/ufficio-stampa/comunicati/".to_string(),
            legal_reference_urls: vec![
                "https://www.altalex.com/documents/news/tasso-di-interesse-legale".to_string(),
            ],
            timeout_secs: 10,
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            ministry_max_pages: 2,
            ministry_max_items: 10,
            statutory_surcharge_points: dec!(8),
            scheduled_enabled: true,
        }
    }
}

impl SourcingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub expiry_horizon_days: i64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            expiry_horizon_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: String,
    /// Database holding ledger movements and case events for the local adapters.
    pub journal_path: String,
    pub interest: InterestSettings,
    pub sourcing: SourcingSettings,
    pub monitor: MonitorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let data = default_data_dir();
        Self {
            database_path: data.join("engine.sqlite").to_string_lossy().to_string(),
            journal_path: data.join("journal.sqlite").to_string_lossy().to_string(),
            interest: InterestSettings::default(),
            sourcing: SourcingSettings::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repayment-engine")
}

/// `<config dir>/repayment-engine/settings.json`.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repayment-engine")
        .join("settings.json")
}

/// Load settings from `path`; a missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        log::debug!("no settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_settings(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}
