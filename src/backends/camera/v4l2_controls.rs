// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 flash control interface
//!
//! Drives the torch of sensors that expose the flash control class
//! (`V4L2_CID_FLASH_LED_MODE`). Phone sensors on mainline kernels usually do;
//! USB webcams usually don't, in which case the sysfs LED fallback in
//! [`crate::flash`] is tried.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use tracing::{debug, warn};

// ===== V4L2 Control Class Bases =====
const V4L2_CTRL_CLASS_FLASH: u32 = 0x009c0000;

const V4L2_CID_FLASH_CLASS_BASE: u32 = V4L2_CTRL_CLASS_FLASH | 0x900;

// ===== V4L2 Control IDs (Flash Class) =====

/// LED mode: none, flash or torch
pub const V4L2_CID_FLASH_LED_MODE: u32 = V4L2_CID_FLASH_CLASS_BASE + 1;
/// Torch intensity in driver units
pub const V4L2_CID_FLASH_TORCH_INTENSITY: u32 = V4L2_CID_FLASH_CLASS_BASE + 8;

// ===== V4L2 Flash LED Mode Menu Values =====

pub const V4L2_FLASH_LED_MODE_NONE: i32 = 0;
pub const V4L2_FLASH_LED_MODE_FLASH: i32 = 1;
pub const V4L2_FLASH_LED_MODE_TORCH: i32 = 2;

// ===== V4L2 Control Flags =====
const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;

// ===== V4L2 ioctl Numbers =====
// Calculated as: (dir << 30) | (size << 16) | ('V' << 8) | nr
// where dir: 2=READ, 1=WRITE, 3=READ|WRITE

/// Set control value (v4l2_control: 8 bytes)
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
/// Query control info (v4l2_queryctrl: 68 bytes)
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

// ===== V4L2 ioctl Structures =====

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

#[repr(C)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

/// Range information of a V4L2 control
#[derive(Debug, Clone)]
pub struct ControlInfo {
    pub id: u32,
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub default_value: i32,
    pub flags: u32,
}

impl ControlInfo {
    pub fn is_disabled(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_DISABLED != 0
    }

    /// Whether a menu control can take `value`
    pub fn accepts(&self, value: i32) -> bool {
        (self.minimum..=self.maximum).contains(&value)
    }
}

fn extract_name(bytes: &[u8; 32]) -> String {
    let name_len = bytes.iter().position(|&c| c == 0).unwrap_or(32);
    String::from_utf8_lossy(&bytes[..name_len]).to_string()
}

/// Query if a control exists and get its information
pub fn query_control(device_path: &str, control_id: u32) -> Option<ControlInfo> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut qctrl = V4l2Queryctrl {
        id: control_id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCTRL, &mut qctrl as *mut V4l2Queryctrl) };

    if result < 0 {
        return None;
    }

    Some(ControlInfo {
        id: qctrl.id,
        name: extract_name(&qctrl.name),
        minimum: qctrl.minimum,
        maximum: qctrl.maximum,
        default_value: qctrl.default_value,
        flags: qctrl.flags,
    })
}

/// Set value of a control
pub fn set_control(device_path: &str, control_id: u32, value: i32) -> Result<(), String> {
    let file = File::open(device_path).map_err(|e| format!("Failed to open device: {}", e))?;
    let fd = file.as_raw_fd();

    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_S_CTRL, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(
            device_path,
            control_id,
            value,
            ?errno,
            "Failed to set V4L2 control"
        );
        return Err(format!("Failed to set control: {}", errno));
    }

    Ok(())
}

/// Check whether the device can switch its flash LED into torch mode
pub fn supports_torch(device_path: &str) -> bool {
    query_control(device_path, V4L2_CID_FLASH_LED_MODE)
        .map(|info| !info.is_disabled() && info.accepts(V4L2_FLASH_LED_MODE_TORCH))
        .unwrap_or(false)
}

/// Switch the flash LED between torch and off
pub fn set_torch_mode(device_path: &str, enabled: bool) -> Result<(), String> {
    let mode = if enabled {
        V4L2_FLASH_LED_MODE_TORCH
    } else {
        V4L2_FLASH_LED_MODE_NONE
    };
    debug!(device_path, enabled, "Setting V4L2 flash LED mode");
    set_control(device_path, V4L2_CID_FLASH_LED_MODE, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_id_values() {
        // Values from linux/v4l2-controls.h
        assert_eq!(V4L2_CID_FLASH_LED_MODE, 0x009c0901);
        assert_eq!(V4L2_CID_FLASH_TORCH_INTENSITY, 0x009c0908);
    }

    #[test]
    fn test_menu_range() {
        let info = ControlInfo {
            id: V4L2_CID_FLASH_LED_MODE,
            name: "LED Mode".into(),
            minimum: V4L2_FLASH_LED_MODE_NONE,
            maximum: V4L2_FLASH_LED_MODE_FLASH,
            default_value: 0,
            flags: 0,
        };
        // Flash-only LED: no torch mode
        assert!(!info.accepts(V4L2_FLASH_LED_MODE_TORCH));
    }

    #[test]
    fn test_missing_device_has_no_torch() {
        assert!(!supports_torch("/nonexistent/video99"));
    }
}
