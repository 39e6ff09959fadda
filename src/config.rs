// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::ResolutionTier;
use crate::constants::timing::{
    DEFAULT_SCAN_FREQUENCY_HZ, MAX_SCAN_FREQUENCY_HZ, MIN_SCAN_FREQUENCY_HZ,
};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Which symbologies the decoder should look for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SymbologyFilter {
    /// Every symbology the decoder supports
    #[default]
    All,
    /// EAN-13, EAN-8, UPC-A and UPC-E retail codes
    EanUpc,
    /// Code 128
    Code128,
    /// QR codes
    QrCode,
}

impl SymbologyFilter {
    pub const ALL: [SymbologyFilter; 4] = [
        SymbologyFilter::All,
        SymbologyFilter::EanUpc,
        SymbologyFilter::Code128,
        SymbologyFilter::QrCode,
    ];

    /// Get display name for the filter
    pub fn display_name(&self) -> &'static str {
        match self {
            SymbologyFilter::All => "All",
            SymbologyFilter::EanUpc => "EAN/UPC",
            SymbologyFilter::Code128 => "Code 128",
            SymbologyFilter::QrCode => "QR Code",
        }
    }
}

impl std::fmt::Display for SymbologyFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Per-session scan configuration
///
/// Chosen before `start()` and immutable for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub symbology_filter: SymbologyFilter,
    pub resolution_tier: ResolutionTier,
    /// Decode cycles per second (5-15)
    pub scan_frequency_hz: u32,
}

impl ScanConfig {
    /// Build a validated configuration
    pub fn new(
        symbology_filter: SymbologyFilter,
        resolution_tier: ResolutionTier,
        scan_frequency_hz: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            symbology_filter,
            resolution_tier,
            scan_frequency_hz,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject frequencies outside the supported range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SCAN_FREQUENCY_HZ..=MAX_SCAN_FREQUENCY_HZ).contains(&self.scan_frequency_hz) {
            return Err(ConfigError::FrequencyOutOfRange(self.scan_frequency_hz));
        }
        Ok(())
    }

    /// Time budget of one scan cycle (`1 / scan_frequency_hz`)
    pub fn cycle_budget(&self) -> Duration {
        let hz = self.scan_frequency_hz.max(1);
        Duration::from_micros(1_000_000 / hz as u64)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            symbology_filter: SymbologyFilter::default(),
            resolution_tier: ResolutionTier::default(),
            scan_frequency_hz: DEFAULT_SCAN_FREQUENCY_HZ,
        }
    }
}

/// Persisted user preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Scan configuration used when the caller does not override it
    pub scan: ScanConfig,
    /// Preferred camera device path (e.g. `/dev/video2`)
    pub preferred_device: Option<String>,
    /// Mirror the overlay horizontally (front camera preview)
    pub mirror_preview: bool,
    /// Vibrate on confirmation when a haptic device is available
    pub haptics_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            preferred_device: None,
            mirror_preview: false,
            haptics_enabled: true,
        }
    }
}

impl Settings {
    /// File name inside the application config directory
    pub const FILE_NAME: &'static str = "settings.json";

    /// Application config directory name
    pub const APP_DIR: &'static str = "barcode-scanner";

    /// Default settings path (`$XDG_CONFIG_HOME/barcode-scanner/settings.json`)
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(Self::APP_DIR).join(Self::FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load settings, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let settings: Settings = serde_json::from_str(&contents)?;
        settings.scan.validate()?;
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Write settings as pretty JSON, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.scan.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_bounds() {
        assert!(ScanConfig::new(SymbologyFilter::All, ResolutionTier::SD, 5).is_ok());
        assert!(ScanConfig::new(SymbologyFilter::All, ResolutionTier::SD, 15).is_ok());
        assert_eq!(
            ScanConfig::new(SymbologyFilter::All, ResolutionTier::SD, 4),
            Err(ConfigError::FrequencyOutOfRange(4))
        );
        assert_eq!(
            ScanConfig::new(SymbologyFilter::All, ResolutionTier::SD, 30),
            Err(ConfigError::FrequencyOutOfRange(30))
        );
    }

    #[test]
    fn test_cycle_budget() {
        let config = ScanConfig::new(SymbologyFilter::QrCode, ResolutionTier::HD, 10).unwrap();
        assert_eq!(config.cycle_budget(), Duration::from_millis(100));
    }
}
