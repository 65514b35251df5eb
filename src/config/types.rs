use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::device::constants::DEFAULT_SCAN_TIMEOUT;
use crate::inference::types::PatientData;

pub const DEFAULT_PREDICTION_INTERVAL: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Seconds between two classifier runs on the monitor screen.
    pub prediction_interval_secs: u64,
    /// Seconds a scan runs before the device is reported as not found.
    pub scan_timeout_secs: u64,
    pub model_path: Option<PathBuf>,
    /// The last submitted patient form.
    pub patient: Option<PatientData>,
}

impl Config {
    pub fn prediction_interval(&self) -> Duration {
        Duration::from_secs(self.prediction_interval_secs.max(1))
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prediction_interval_secs: DEFAULT_PREDICTION_INTERVAL,
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT,
            model_path: None,
            patient: None,
        }
    }
}
