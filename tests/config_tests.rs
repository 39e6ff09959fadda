// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use barcode_scanner::errors::ConfigError;
use barcode_scanner::{ResolutionTier, ScanConfig, Settings, SymbologyFilter};
use std::path::PathBuf;

fn temp_settings_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("barcode-scanner-test-{}", uuid::Uuid::new_v4()))
        .join(Settings::FILE_NAME)
}

#[test]
fn test_scan_config_default() {
    let config = ScanConfig::default();

    assert_eq!(config.symbology_filter, SymbologyFilter::All);
    assert_eq!(config.resolution_tier, ResolutionTier::HD);
    assert_eq!(config.scan_frequency_hz, 10);
    assert!(config.validate().is_ok());
}

#[test]
fn test_settings_default() {
    let settings = Settings::default();
    assert!(settings.preferred_device.is_none());
    assert!(!settings.mirror_preview, "Rear camera preview is not mirrored");
    assert!(settings.haptics_enabled);
}

#[test]
fn test_missing_settings_file_yields_defaults() {
    let path = temp_settings_path();
    assert_eq!(Settings::load(&path).unwrap(), Settings::default());
}

#[test]
fn test_settings_save_then_load() {
    let path = temp_settings_path();
    let settings = Settings {
        scan: ScanConfig::new(SymbologyFilter::EanUpc, ResolutionTier::FullHD, 12).unwrap(),
        preferred_device: Some("/dev/video2".into()),
        mirror_preview: true,
        haptics_enabled: false,
    };

    settings.save(&path).unwrap();
    let loaded = Settings::load(&path).unwrap();
    assert_eq!(loaded, settings);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn test_malformed_settings_file() {
    let path = temp_settings_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(Settings::load(&path), Err(ConfigError::Parse(_))));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_out_of_range_frequency_in_file_is_rejected() {
    let path = temp_settings_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        r#"{"scan":{"symbology_filter":"All","resolution_tier":"SD","scan_frequency_hz":60}}"#,
    )
    .unwrap();

    assert_eq!(
        Settings::load(&path),
        Err(ConfigError::FrequencyOutOfRange(60))
    );

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
