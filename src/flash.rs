// SPDX-License-Identifier: GPL-3.0-only

//! Torch LED control via Linux sysfs
//!
//! Discovers flash LEDs exposed at `/sys/class/leds/*:flash` (and
//! `*:torch`). Only the `brightness` file is used, which `feedbackd` makes
//! group-writable, avoiding the root-only `flash_strobe` interface.

use crate::errors::UnsupportedError;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default sysfs LED class directory
pub const SYSFS_LEDS_DIR: &str = "/sys/class/leds";

/// A flash LED device discovered via sysfs
#[derive(Debug, Clone)]
pub struct FlashDevice {
    /// Sysfs path, e.g. `/sys/class/leds/white:flash`
    path: PathBuf,
    /// Maximum brightness value (from `max_brightness` file)
    max_brightness: u32,
    /// Directory basename
    name: String,
}

impl FlashDevice {
    /// Get the device name (e.g. "white:flash")
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set raw brightness value (0 = off, max_brightness = full)
    pub fn set_brightness(&self, value: u32) -> io::Result<()> {
        let clamped = value.min(self.max_brightness);
        std::fs::write(self.path.join("brightness"), clamped.to_string())
    }

    /// Turn off the LED
    pub fn off(&self) -> io::Result<()> {
        self.set_brightness(0)
    }

    /// Turn on at a fraction of max brightness (0.0 = off, 1.0 = full)
    pub fn torch(&self, intensity: f32) -> io::Result<()> {
        let clamped = intensity.clamp(0.0, 1.0);
        let value = (clamped * self.max_brightness as f32).round() as u32;
        self.set_brightness(value)
    }
}

/// Result of torch LED discovery
///
/// Separates "hardware exists" from "we can control it" so callers can
/// report a permission problem instead of plain absence.
#[derive(Debug, Default)]
pub struct TorchLeds {
    /// Devices we can actually control (writable)
    pub devices: Vec<FlashDevice>,
    /// LEDs found but not writable
    pub unwritable: Vec<String>,
}

impl TorchLeds {
    /// Scan the system LED class directory
    pub fn detect() -> Self {
        Self::detect_in(Path::new(SYSFS_LEDS_DIR))
    }

    /// Scan an LED class directory for `*:flash` / `*:torch` entries
    pub fn detect_in(leds_dir: &Path) -> Self {
        let Ok(entries) = std::fs::read_dir(leds_dir) else {
            debug!(dir = %leds_dir.display(), "Cannot read LED class directory, torch discovery skipped");
            return Self::default();
        };

        let mut leds = Self::default();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };

            if !name_str.ends_with(":flash") && !name_str.ends_with(":torch") {
                continue;
            }

            let led_path = entry.path();
            let brightness_path = led_path.join("brightness");
            let max_brightness_path = led_path.join("max_brightness");

            let max_brightness = match std::fs::read_to_string(&max_brightness_path) {
                Ok(s) => match s.trim().parse::<u32>() {
                    Ok(v) if v > 0 => v,
                    _ => {
                        warn!(
                            path = %max_brightness_path.display(),
                            "Invalid max_brightness value"
                        );
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        path = %max_brightness_path.display(),
                        error = %e,
                        "Cannot read max_brightness"
                    );
                    continue;
                }
            };

            match std::fs::OpenOptions::new()
                .write(true)
                .open(&brightness_path)
            {
                Ok(_) => {
                    info!(name = name_str, max_brightness, "Discovered torch LED");
                    leds.devices.push(FlashDevice {
                        path: led_path,
                        max_brightness,
                        name: name_str.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        path = %brightness_path.display(),
                        "Torch LED found but not writable"
                    );
                    leds.unwritable.push(name_str.to_string());
                }
            }
        }

        // Deterministic ordering (white before yellow)
        leds.devices.sort_by(|a, b| a.name.cmp(&b.name));
        leds
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Explain why no torch can be driven
    pub fn unsupported_reason(&self) -> UnsupportedError {
        if self.unwritable.is_empty() {
            UnsupportedError::new("no flash LED found")
        } else {
            UnsupportedError::new(format!(
                "flash LED {} is not writable; add the user to the 'feedbackd' group",
                self.unwritable.join(", ")
            ))
        }
    }

    /// Turn every discovered LED on (full brightness) or off
    pub fn set_all(&self, enabled: bool) -> Result<(), UnsupportedError> {
        if self.devices.is_empty() {
            return Err(self.unsupported_reason());
        }

        for device in &self.devices {
            let result = if enabled {
                device.torch(1.0)
            } else {
                device.off()
            };
            if let Err(e) = result {
                warn!(name = device.name(), error = %e, "Failed to switch torch LED");
                return Err(UnsupportedError::new(format!("{}: {}", device.name(), e)));
            }
        }
        Ok(())
    }
}
