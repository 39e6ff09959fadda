// SPDX-License-Identifier: GPL-3.0-only

//! Process-wide exclusive device claims
//!
//! A camera device is owned by at most one open stream at a time. A second
//! claim fails immediately with `CameraError::DeviceBusy` instead of blocking
//! on the device node.

use crate::errors::CameraError;
use std::collections::HashSet;
use std::sync::{LazyLock, Mutex, PoisonError};
use tracing::debug;

static CLAIMED_DEVICES: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// RAII guard for an exclusively claimed device; dropping it releases the claim
#[derive(Debug)]
pub struct DeviceClaim {
    device: String,
}

impl DeviceClaim {
    /// Claim a device, failing fast if it is already held
    pub fn acquire(device: &str) -> Result<Self, CameraError> {
        let mut claimed = CLAIMED_DEVICES
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !claimed.insert(device.to_string()) {
            debug!(device, "Device already claimed");
            return Err(CameraError::DeviceBusy(device.to_string()));
        }

        debug!(device, "Device claimed");
        Ok(Self {
            device: device.to_string(),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        CLAIMED_DEVICES
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.device);
        debug!(device = %self.device, "Device claim released");
    }
}
