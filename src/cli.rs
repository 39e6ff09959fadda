// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for barcode scanning
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Scanning with a live camera
//! - Scanning a sequence of image files

use barcode_scanner::backends::camera::v4l2::list_devices;
use barcode_scanner::constants::ResolutionTier;
use barcode_scanner::haptics::Haptics;
use barcode_scanner::overlay::ImageCanvas;
use barcode_scanner::{
    CompositeDecoder, DeadlineOutcome, FileSource, ScanConfig, ScanError, ScannerSession,
    SessionState, Settings, SymbologyFilter, V4l2Source, scan_with_deadline,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;

/// Effectively unbounded scan when no timeout is given
const NO_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Command-line overrides on top of the persisted settings
pub struct ScanOverrides {
    pub filter: Option<SymbologyFilter>,
    pub resolution: Option<ResolutionTier>,
    pub frequency: Option<u32>,
    pub timeout: Option<u64>,
}

pub struct CameraScanArgs {
    pub overrides: ScanOverrides,
    pub device: Option<String>,
    pub torch: bool,
    pub mirror: bool,
    pub overlay_out: Option<PathBuf>,
}

/// Terminal bell stands in for a vibration motor
struct BellHaptics;

impl Haptics for BellHaptics {
    fn vibrate(&self, _pattern: &[u64]) -> Result<(), String> {
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| e.to_string())
    }
}

fn load_settings() -> Settings {
    let loaded = Settings::default_path().and_then(|path| Settings::load(&path));
    loaded.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load settings, using defaults");
        Settings::default()
    })
}

fn effective_config(
    settings: &Settings,
    overrides: &ScanOverrides,
) -> Result<ScanConfig, Box<dyn std::error::Error>> {
    let base = settings.scan;
    Ok(ScanConfig::new(
        overrides.filter.unwrap_or(base.symbology_filter),
        overrides.resolution.unwrap_or(base.resolution_tier),
        overrides.frequency.unwrap_or(base.scan_frequency_hz),
    )?)
}

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let cameras = list_devices();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera.name);
        println!("      Device: {}", camera.path);
        println!("      Driver: {}", camera.driver);
        println!("      Facing: {}", camera.facing);
        println!();
    }

    Ok(())
}

/// Scan with a live camera until a code is confirmed
pub fn scan_camera(args: CameraScanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings();
    let config = effective_config(&settings, &args.overrides)?;

    let mut source = V4l2Source::new();
    if let Some(device) = args.device.or(settings.preferred_device.clone()) {
        source = source.with_device(device);
    }

    let mut session = ScannerSession::new(Arc::new(source), Arc::new(CompositeDecoder::default()))
        .mirrored(args.mirror || settings.mirror_preview);
    if settings.haptics_enabled {
        session = session.with_haptics(Arc::new(BellHaptics));
    }

    let canvas = args.overlay_out.as_ref().map(|_| {
        let tier = config.resolution_tier;
        Arc::new(Mutex::new(ImageCanvas::new(tier.min_width(), tier.min_height())))
    });
    if let Some(canvas) = &canvas {
        session = session.with_canvas(Box::new(Arc::clone(canvas)));
    }

    let session = Arc::new(session);
    let timeout = args.overrides.timeout.map(Duration::from_secs);

    println!("Scanning for {}... (press Ctrl+C to stop)", config.symbology_filter);
    let outcome = run_session(&session, config, timeout, args.torch)?;

    if let (Some(path), Some(canvas), DeadlineOutcome::Confirmed(_)) =
        (&args.overlay_out, &canvas, &outcome)
    {
        canvas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .save(path)?;
        eprintln!("Overlay saved: {}", path.display());
    }

    session.close();
    report_outcome(outcome, timeout)
}

/// Scan a sequence of images as if it were a camera
pub fn scan_files(
    paths: &[PathBuf],
    overrides: ScanOverrides,
    once: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings();
    let config = effective_config(&settings, &overrides)?;

    let source = FileSource::from_paths(paths)?.looping(!once);
    println!("Scanning {}...", source.label());

    let session = Arc::new(ScannerSession::new(
        Arc::new(source),
        Arc::new(CompositeDecoder::default()),
    ));
    let timeout = overrides.timeout.map(Duration::from_secs);

    let outcome = run_session(&session, config, timeout, false)?;
    session.close();
    report_outcome(outcome, timeout)
}

fn run_session(
    session: &Arc<ScannerSession>,
    config: ScanConfig,
    timeout: Option<Duration>,
    torch: bool,
) -> Result<DeadlineOutcome, Box<dyn std::error::Error>> {
    session.on_progress(|progress| {
        eprint!("\r{:>3}% {:<40}", progress.percent, progress.feedback_text);
        let _ = std::io::stderr().flush();
    });

    // Set up Ctrl+C handler
    let stopper = Arc::clone(session);
    ctrlc::set_handler(move || {
        let _ = stopper.stop();
    })?;

    // Create async runtime for the deadline wrapper
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let scan = tokio::spawn(scan_with_deadline(
            Arc::clone(session),
            config,
            timeout.unwrap_or(NO_TIMEOUT),
        ));

        if torch {
            // The torch can only be switched once the camera is open
            while !scan.is_finished() {
                match session.state() {
                    SessionState::Idle | SessionState::Initializing => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                    SessionState::Scanning => {
                        if let Err(e) = session.set_torch(true) {
                            eprintln!("Torch unavailable: {}", e);
                        }
                        break;
                    }
                    _ => break,
                }
            }
        }

        scan.await
    })?;
    eprintln!();

    Ok(outcome)
}

fn report_outcome(
    outcome: DeadlineOutcome,
    timeout: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        DeadlineOutcome::Confirmed(result) => {
            println!("{}\t{}", result.code, result.symbology);
            Ok(())
        }
        DeadlineOutcome::TimedOut => Err(format!(
            "No barcode confirmed within {} seconds",
            timeout.unwrap_or(NO_TIMEOUT).as_secs()
        )
        .into()),
        DeadlineOutcome::Cancelled => {
            eprintln!("Scan cancelled");
            Ok(())
        }
        DeadlineOutcome::Failed(e) => {
            if let ScanError::Camera(camera) = &e {
                if camera.is_acquisition_error() {
                    eprintln!(
                        "Check that a camera is connected and not in use \
                         (see 'barcode-scanner list')"
                    );
                }
            }
            Err(e.into())
        }
    }
}

/// Print the effective settings as JSON
pub fn show_config() -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings();
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

/// Print where settings are stored
pub fn show_config_path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", Settings::default_path()?.display());
    Ok(())
}
