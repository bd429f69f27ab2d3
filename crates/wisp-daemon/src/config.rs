//! Configuration file management.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Measurement loop settings.
    #[serde(default)]
    pub measurement: MeasurementConfig,
    /// Submission queue settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Distribution agent settings.
    #[serde(default)]
    pub distribution: DistributionConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Measurement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Seconds between measurement ticks.
    #[serde(default = "default_measurement_interval")]
    pub interval_secs: u64,
    /// Per-probe deadline in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Probe strategy: "synthetic" | "interface".
    #[serde(default = "default_probe_mode")]
    pub probe: String,
    /// Interface name for the "interface" probe.
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Fall back to the synthetic probe when a real probe fails.
    #[serde(default = "default_true")]
    pub synthetic_fallback: bool,
    /// Upper bound for synthetic samples, in bytes.
    #[serde(default = "default_max_synthetic_bytes")]
    pub max_synthetic_bytes: u64,
    /// Whether synthetic samples earn points.
    #[serde(default = "default_true")]
    pub credit_synthetic: bool,
}

/// Submission queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pause after a failed anchor attempt, in seconds.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
}

/// Distribution agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Seconds between distribution cycles.
    #[serde(default = "default_distribution_interval")]
    pub interval_secs: u64,
    /// Deadline for each gateway call, in seconds.
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,
    /// Micro-wisps per point.
    #[serde(default = "default_rate")]
    pub rate_micro_wisps_per_point: u64,
    /// Contributor share percentage.
    #[serde(default = "default_user_share")]
    pub user_share_pct: u8,
    /// Charity pool share percentage.
    #[serde(default = "default_charity_share")]
    pub charity_share_pct: u8,
    /// Run distribution cycles on the scheduler.
    #[serde(default = "default_true")]
    pub scheduled: bool,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

// Default value functions

fn default_measurement_interval() -> u64 {
    wisp_types::DEFAULT_MEASUREMENT_INTERVAL_SECS
}

fn default_probe_timeout() -> u64 {
    20
}

fn default_probe_mode() -> String {
    "synthetic".to_string()
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_max_synthetic_bytes() -> u64 {
    wisp_measure::probe::DEFAULT_MAX_SYNTHETIC_BYTES
}

fn default_retry_interval() -> u64 {
    30
}

fn default_distribution_interval() -> u64 {
    wisp_types::DEFAULT_DISTRIBUTION_INTERVAL_SECS
}

fn default_gateway_timeout() -> u64 {
    60
}

fn default_rate() -> u64 {
    wisp_types::DEFAULT_RATE_MICRO_WISPS_PER_POINT
}

fn default_user_share() -> u8 {
    wisp_types::DEFAULT_USER_SHARE_PCT
}

fn default_charity_share() -> u8 {
    wisp_types::DEFAULT_CHARITY_SHARE_PCT
}

fn default_true() -> bool {
    true
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_measurement_interval(),
            probe_timeout_secs: default_probe_timeout(),
            probe: default_probe_mode(),
            interface: default_interface(),
            synthetic_fallback: true,
            max_synthetic_bytes: default_max_synthetic_bytes(),
            credit_synthetic: true,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval(),
        }
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_distribution_interval(),
            gateway_timeout_secs: default_gateway_timeout(),
            rate_micro_wisps_per_point: default_rate(),
            user_share_pct: default_user_share(),
            charity_share_pct: default_charity_share(),
            scheduled: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("WISP_DATA_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("WISP_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Wisp")
        }
        #[cfg(target_os = "linux")]
        {
            dirs_fallback(".wisp")
        }
        #[cfg(target_os = "windows")]
        {
            dirs_fallback("Wisp")
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            dirs_fallback(".wisp")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/wisp"))
}
