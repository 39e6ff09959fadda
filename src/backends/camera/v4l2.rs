// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 video source
//!
//! Enumerates `/dev/video*` capture nodes, prefers rear-facing sensors,
//! negotiates a pixel format that satisfies the stream constraints and runs
//! an mmap capture loop that publishes luma frames into a [`FrameSlot`].

use super::claims::DeviceClaim;
use super::format_converters::{mjpeg_to_luma, strip_stride, yuyv_to_luma};
use super::frame_loop::{CaptureContext, CaptureThread};
use super::frame_slot::FrameSlot;
use super::types::{CameraDevice, FacingMode, Frame, StreamConstraints, StreamHandle};
use super::v4l2_controls;
use super::VideoSource;
use crate::config::ScanConfig;
use crate::constants::camera::{PREFERRED_FOURCCS, V4L2_BUFFER_COUNT};
use crate::constants::timing::{FRAME_LOG_INTERVAL, FRAME_WAIT_TIMEOUT};
use crate::errors::{CameraError, UnsupportedError};
use crate::flash::TorchLeds;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

/// Consecutive dequeue failures before the device is considered gone
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Per-dequeue timeout so the capture thread notices stop requests
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(250);

/// Enumerate V4L2 capture devices, rear-facing first
pub fn list_devices() -> Vec<CameraDevice> {
    let mut entries: Vec<_> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("video"))
                .unwrap_or(false)
        })
        .collect();
    entries.sort();

    let mut devices = Vec::new();
    for path in entries {
        let path_str = path.to_string_lossy().to_string();
        let dev = match Device::with_path(&path) {
            Ok(dev) => dev,
            Err(e) => {
                debug!(path = %path_str, error = %e, "Skipping unopenable video node");
                continue;
            }
        };

        // Metadata nodes expose no capture formats
        let has_formats = dev
            .enum_formats()
            .map(|formats| !formats.is_empty())
            .unwrap_or(false);
        if !has_formats {
            continue;
        }

        let Ok(caps) = dev.query_caps() else {
            continue;
        };

        let facing = FacingMode::from_card_name(&caps.card);
        info!(name = %caps.card, path = %path_str, %facing, "Found V4L2 camera");

        devices.push(CameraDevice {
            name: caps.card.clone(),
            path: path_str,
            driver: caps.driver.clone(),
            facing,
        });
    }

    // Stable sort keeps /dev order within a facing class
    devices.sort_by_key(|d| d.facing.rank_for(FacingMode::Environment));
    devices
}

/// How the torch of an open device is driven
enum TorchControl {
    /// `V4L2_CID_FLASH_LED_MODE` on the video node
    V4l2(String),
    /// sysfs flash LEDs
    Sysfs(TorchLeds),
    Unsupported(UnsupportedError),
}

impl TorchControl {
    fn detect(device_path: &str) -> Self {
        if v4l2_controls::supports_torch(device_path) {
            debug!(device_path, "Torch via V4L2 flash control");
            return TorchControl::V4l2(device_path.to_string());
        }

        let leds = TorchLeds::detect();
        if !leds.is_empty() {
            debug!(device_path, count = leds.devices.len(), "Torch via sysfs LEDs");
            return TorchControl::Sysfs(leds);
        }

        TorchControl::Unsupported(leds.unsupported_reason())
    }

    fn set(&self, enabled: bool) -> Result<(), UnsupportedError> {
        match self {
            TorchControl::V4l2(path) => {
                v4l2_controls::set_torch_mode(path, enabled).map_err(UnsupportedError::new)
            }
            TorchControl::Sysfs(leds) => leds.set_all(enabled),
            TorchControl::Unsupported(reason) => Err(reason.clone()),
        }
    }
}

/// One open V4L2 stream
///
/// Field order matters: the capture thread stops before the claim is released.
struct V4l2Stream {
    device: CameraDevice,
    slot: Arc<FrameSlot>,
    capture: CaptureThread,
    torch: TorchControl,
    torch_on: bool,
    _claim: DeviceClaim,
}

/// Video source backed by V4L2 capture devices
pub struct V4l2Source {
    /// Open only this device instead of picking by facing
    preferred_device: Option<String>,
    streams: Mutex<HashMap<u64, V4l2Stream>>,
}

impl Default for V4l2Source {
    fn default() -> Self {
        Self::new()
    }
}

impl V4l2Source {
    pub fn new() -> Self {
        Self {
            preferred_device: None,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Restrict the source to one device node
    pub fn with_device(mut self, path: impl Into<String>) -> Self {
        self.preferred_device = Some(path.into());
        self
    }

    fn lock_streams(&self) -> MutexGuard<'_, HashMap<u64, V4l2Stream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn candidates(&self, facing: FacingMode) -> Vec<CameraDevice> {
        let mut devices = list_devices();
        if let Some(path) = &self.preferred_device {
            devices.retain(|d| &d.path == path);
        }
        devices.sort_by_key(|d| d.facing.rank_for(facing));
        devices
    }

    fn open_device(
        &self,
        device: &CameraDevice,
        constraints: StreamConstraints,
    ) -> Result<V4l2Stream, CameraError> {
        let claim = DeviceClaim::acquire(&device.path)?;
        let slot = Arc::new(FrameSlot::new());

        let path = device.path.clone();
        let capture_slot = Arc::clone(&slot);
        let thread_name = format!("v4l2-capture:{}", device.path);
        let capture = CaptureThread::spawn(&thread_name, move |ctx| {
            run_capture(ctx, &path, constraints, &capture_slot);
        })?;

        Ok(V4l2Stream {
            device: device.clone(),
            slot,
            capture,
            torch: TorchControl::detect(&device.path),
            torch_on: false,
            _claim: claim,
        })
    }
}

impl VideoSource for V4l2Source {
    fn open(&self, config: &ScanConfig) -> Result<StreamHandle, CameraError> {
        let constraints = StreamConstraints::from_config(config);
        let candidates = self.candidates(constraints.facing);
        if candidates.is_empty() {
            warn!(preferred = ?self.preferred_device, "No V4L2 capture device available");
            return Err(CameraError::NoDeviceFound);
        }

        let mut first_error = None;
        for device in &candidates {
            match self.open_device(device, constraints) {
                Ok(stream) => {
                    let handle = StreamHandle::new(&device.path);
                    info!(
                        name = %device.name,
                        path = %device.path,
                        facing = %device.facing,
                        handle = %handle,
                        "Opened V4L2 camera"
                    );
                    self.lock_streams().insert(handle.id(), stream);
                    return Ok(handle);
                }
                Err(e) => {
                    warn!(path = %device.path, error = %e, "Failed to open camera candidate");
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error.unwrap_or(CameraError::NoDeviceFound))
    }

    fn next_frame(&self, handle: &StreamHandle) -> Result<Frame, CameraError> {
        let slot = self
            .lock_streams()
            .get(&handle.id())
            .map(|s| Arc::clone(&s.slot))
            .ok_or(CameraError::Closed)?;
        slot.take_latest(FRAME_WAIT_TIMEOUT)
    }

    fn set_torch(&self, handle: &StreamHandle, enabled: bool) -> Result<(), UnsupportedError> {
        let mut streams = self.lock_streams();
        let stream = streams
            .get_mut(&handle.id())
            .ok_or_else(|| UnsupportedError::new("stream is closed"))?;
        stream.torch.set(enabled)?;
        stream.torch_on = enabled;
        info!(device = %stream.device.path, enabled, "Torch switched");
        Ok(())
    }

    fn close(&self, handle: &StreamHandle) {
        let Some(mut stream) = self.lock_streams().remove(&handle.id()) else {
            debug!(handle = %handle, "Close on already closed stream");
            return;
        };

        if stream.torch_on {
            if let Err(e) = stream.torch.set(false) {
                warn!(error = %e, "Failed to switch torch off on close");
            }
        }
        stream.slot.close();
        stream.capture.stop();
        info!(
            handle = %handle,
            published_frames = stream.slot.published_frames(),
            dropped_frames = stream.slot.dropped_frames(),
            "Closed V4L2 camera"
        );
    }

    fn name(&self) -> &str {
        "v4l2"
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        let ids: Vec<u64> = self.lock_streams().keys().copied().collect();
        for id in ids {
            if let Some(mut stream) = self.lock_streams().remove(&id) {
                stream.slot.close();
                stream.capture.stop();
            }
        }
    }
}

/// Try the preferred pixel formats until one satisfies the constraints
fn negotiate_format(dev: &Device, constraints: &StreamConstraints) -> Result<Format, CameraError> {
    let mut last_violation = String::from("no supported pixel format");

    for fourcc_bytes in PREFERRED_FOURCCS {
        let fourcc = FourCC::new(fourcc_bytes);
        let requested = Format::new(constraints.min_width, constraints.min_height, fourcc);
        let granted = match dev.set_format(&requested) {
            Ok(f) => f,
            Err(e) => {
                debug!(?fourcc, error = %e, "Format rejected");
                continue;
            }
        };

        if granted.fourcc != fourcc {
            debug!(requested = ?fourcc, granted = ?granted.fourcc, "Driver substituted pixel format");
            continue;
        }

        match constraints.check(granted.width, granted.height) {
            Ok(()) => return Ok(granted),
            Err(violation) => {
                debug!(?fourcc, %violation, "Granted format violates constraints");
                last_violation = violation;
            }
        }
    }

    Err(CameraError::ConstraintUnsatisfiable(last_violation))
}

/// Request the capture rate; drivers without frame interval support keep their default
fn apply_frame_rate(dev: &Device, path: &str, constraints: &StreamConstraints) {
    match dev.set_params(&Parameters::with_fps(constraints.frame_rate)) {
        Ok(granted) => {
            let interval = granted.interval;
            debug!(
                path,
                requested_fps = constraints.frame_rate,
                granted = %interval,
                "Frame interval configured"
            );
        }
        Err(e) => debug!(path, error = %e, "Driver rejected frame interval"),
    }
}

/// Convert one dequeued buffer to a packed luma plane
fn buffer_to_luma(buf: &[u8], format: &Format) -> Option<(u32, u32, Vec<u8>)> {
    if format.fourcc == FourCC::new(b"YUYV") {
        Some((
            format.width,
            format.height,
            yuyv_to_luma(buf, format.width, format.height, format.stride),
        ))
    } else if format.fourcc == FourCC::new(b"GREY") {
        Some((
            format.width,
            format.height,
            strip_stride(
                buf,
                format.width as usize,
                format.height as usize,
                (format.stride as usize).max(format.width as usize),
            ),
        ))
    } else if format.fourcc == FourCC::new(b"MJPG") {
        mjpeg_to_luma(buf)
    } else {
        None
    }
}

/// Capture thread body: open, negotiate, stream into the slot
fn run_capture(
    ctx: &mut CaptureContext,
    path: &str,
    constraints: StreamConstraints,
    slot: &FrameSlot,
) {
    let dev = match Device::with_path(path) {
        Ok(dev) => dev,
        Err(e) => return ctx.report_ready(Err(CameraError::from_open_error(path, &e))),
    };

    let format = match negotiate_format(&dev, &constraints) {
        Ok(f) => f,
        Err(e) => return ctx.report_ready(Err(e)),
    };

    info!(
        path,
        width = format.width,
        height = format.height,
        fourcc = ?format.fourcc,
        "V4L2 format configured"
    );
    apply_frame_rate(&dev, path, &constraints);

    let mut stream = match Stream::with_buffers(&dev, Type::VideoCapture, V4L2_BUFFER_COUNT) {
        Ok(s) => s,
        Err(e) => return ctx.report_ready(Err(CameraError::from_open_error(path, &e))),
    };
    stream.set_timeout(DEQUEUE_TIMEOUT);

    ctx.report_ready(Ok(()));

    let mut sequence = 0u64;
    let mut consecutive_errors = 0u32;

    while !ctx.should_stop() {
        let (buf, _meta) = match stream.next() {
            Ok(frame) => frame,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                consecutive_errors += 1;
                let gone = e.raw_os_error() == Some(libc::ENODEV);
                if gone || consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    warn!(path, error = %e, consecutive_errors, "Camera stream lost");
                    slot.fail(CameraError::Disconnected(format!("{}: {}", path, e)));
                    return;
                }
                debug!(path, error = %e, "Failed to dequeue frame");
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };
        consecutive_errors = 0;

        let captured_at = Instant::now();
        let Some((width, height, luma)) = buffer_to_luma(buf, &format) else {
            debug!(path, "Dropped undecodable frame");
            continue;
        };

        sequence += 1;
        if sequence % FRAME_LOG_INTERVAL == 0 {
            debug!(path, sequence, dropped = slot.dropped_frames(), "Capture progress");
        }

        let mut frame = Frame::gray(width, height, luma).with_sequence(sequence);
        frame.captured_at = captured_at;
        if !slot.publish(frame) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_to_luma_yuyv() {
        let format = Format::new(2, 1, FourCC::new(b"YUYV"));
        let (w, h, luma) = buffer_to_luma(&[10, 128, 20, 128], &format).unwrap();
        assert_eq!((w, h), (2, 1));
        assert_eq!(luma, vec![10, 20]);
    }

    #[test]
    fn test_buffer_to_luma_unknown_format() {
        let format = Format::new(2, 1, FourCC::new(b"NV12"));
        assert!(buffer_to_luma(&[0; 4], &format).is_none());
    }

    #[test]
    fn test_missing_preferred_device() {
        let source = V4l2Source::new().with_device("/dev/video-does-not-exist");
        let result = source.open(&ScanConfig::default());
        assert_eq!(result.unwrap_err(), CameraError::NoDeviceFound);
    }

    #[test]
    fn test_operations_on_unknown_handle() {
        let source = V4l2Source::new();
        let handle = StreamHandle::new("/dev/video-unknown");
        assert_eq!(source.next_frame(&handle).unwrap_err(), CameraError::Closed);
        assert!(source.set_torch(&handle, true).is_err());
        // Closing twice is a no-op
        source.close(&handle);
        source.close(&handle);
    }
}
