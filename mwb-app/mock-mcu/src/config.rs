use std::{fmt, fs, path::Path};

use mwb_core::utils::{
    connection::LinkConfig,
    controllers::{ChassisConfig, MotorConfig},
    scheduler::HeartbeatConfig,
};
use serde::{Deserialize, Serialize};

/// Every tunable of the robot in one JSON document. Missing sections and
/// fields fall back to the firmware defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub chassis: ChassisConfig,
    pub motor: MotorConfig,
    pub link: LinkConfig,
    pub heartbeat: HeartbeatConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot read config: {e}"),
            Self::Parse(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl RobotConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(ConfigError::Parse)
    }
}
