// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the scanner session state machine
//!
//! A scripted video source replays one-pixel frames whose value selects what
//! the scripted decoder reports: `A`/`B` are codes, `P` panics, anything else
//! decodes to nothing.

use barcode_scanner::backends::camera::DeviceClaim;
use barcode_scanner::constants::timing::FRAME_WAIT_TIMEOUT;
use barcode_scanner::decoder::{DecodeGlitch, rect_polygon};
use barcode_scanner::decoder::Point;
use barcode_scanner::errors::{ConfigError, RenderError};
use barcode_scanner::overlay::{Canvas, Stroke};
use barcode_scanner::{
    CameraError, DeadlineOutcome, Frame, FrameDecoder, RawDetection, ScanConfig, ScanError,
    ScannerSession, SessionMisuseError, SessionState, StreamHandle, Symbology, SymbologyFilter,
    UnsupportedError, VideoSource, scan_with_deadline,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

struct ScriptedSource {
    label: String,
    /// Markers replayed per open; the last one repeats forever
    script: Vec<u8>,
    open_error: Option<CameraError>,
    open_delay: Duration,
    /// Report a disconnect after this many frames
    disconnect_after: Option<usize>,
    /// Never deliver a frame, timing out like a stalled camera
    stalled: bool,
    opens: AtomicUsize,
    cursor: AtomicUsize,
    streams: Mutex<HashMap<u64, DeviceClaim>>,
    closes: Mutex<HashMap<u64, usize>>,
}

impl ScriptedSource {
    fn new(label: &str, script: &[u8]) -> Self {
        Self {
            label: label.to_string(),
            script: script.to_vec(),
            open_error: None,
            open_delay: Duration::ZERO,
            disconnect_after: None,
            stalled: false,
            opens: AtomicUsize::new(0),
            cursor: AtomicUsize::new(0),
            streams: Mutex::new(HashMap::new()),
            closes: Mutex::new(HashMap::new()),
        }
    }

    fn failing(label: &str, error: CameraError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::new(label, &[0])
        }
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Total close calls on handles this source handed out
    fn closes(&self) -> usize {
        self.closes.lock().unwrap().values().sum()
    }

    fn assert_closed_at_most_once(&self) {
        for (id, count) in self.closes.lock().unwrap().iter() {
            assert!(*count <= 1, "handle {} closed {} times", id, count);
        }
    }

    fn is_open(&self) -> bool {
        !self.streams.lock().unwrap().is_empty()
    }

    /// Frames handed out since the last open
    fn frames_pulled(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

impl VideoSource for ScriptedSource {
    fn open(&self, _config: &ScanConfig) -> Result<StreamHandle, CameraError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.open_delay);
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }
        let claim = DeviceClaim::acquire(&self.label)?;
        let handle = StreamHandle::new(&self.label);
        self.cursor.store(0, Ordering::SeqCst);
        self.streams.lock().unwrap().insert(handle.id(), claim);
        Ok(handle)
    }

    fn next_frame(&self, handle: &StreamHandle) -> Result<Frame, CameraError> {
        if !self.streams.lock().unwrap().contains_key(&handle.id()) {
            return Err(CameraError::Closed);
        }
        if self.stalled {
            thread::sleep(FRAME_WAIT_TIMEOUT);
            return Err(CameraError::FrameTimeout);
        }
        thread::sleep(Duration::from_millis(5));
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        if self.disconnect_after.is_some_and(|n| i >= n) {
            return Err(CameraError::Disconnected(self.label.clone()));
        }
        let marker = self.script[i.min(self.script.len() - 1)];
        Ok(Frame::gray(1, 1, vec![marker]).with_sequence(i as u64))
    }

    fn set_torch(&self, _handle: &StreamHandle, _enabled: bool) -> Result<(), UnsupportedError> {
        Err(UnsupportedError::new("scripted source has no torch"))
    }

    fn close(&self, handle: &StreamHandle) {
        self.streams.lock().unwrap().remove(&handle.id());
        *self.closes.lock().unwrap().entry(handle.id()).or_insert(0) += 1;
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedDecoder;

impl FrameDecoder for ScriptedDecoder {
    fn decode(
        &self,
        frame: &Frame,
        _filter: SymbologyFilter,
    ) -> Result<Vec<RawDetection>, DecodeGlitch> {
        let code = match frame.data[0] {
            b'A' => "A",
            b'B' => "B",
            b'P' => panic!("decoder blew up"),
            b'G' => return Err(DecodeGlitch("garbled".into())),
            _ => return Ok(Vec::new()),
        };
        Ok(vec![RawDetection {
            code: code.to_string(),
            symbology: Symbology::QrCode,
            bounding_box: rect_polygon(0.0, 0.0, 1.0, 1.0),
            frame_timestamp: frame.captured_at,
        }])
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Decoder that takes `delay` per frame and never finds anything
struct SlowDecoder {
    delay: Duration,
    starts: Mutex<Vec<Instant>>,
}

impl SlowDecoder {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            starts: Mutex::new(Vec::new()),
        }
    }

    fn starts(&self) -> Vec<Instant> {
        self.starts.lock().unwrap().clone()
    }
}

impl FrameDecoder for SlowDecoder {
    fn decode(
        &self,
        _frame: &Frame,
        _filter: SymbologyFilter,
    ) -> Result<Vec<RawDetection>, DecodeGlitch> {
        self.starts.lock().unwrap().push(Instant::now());
        thread::sleep(self.delay);
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Canvas that only counts finished overlay frames
struct PresentCounter {
    presents: Arc<AtomicUsize>,
}

impl Canvas for PresentCounter {
    fn size(&self) -> (f32, f32) {
        (320.0, 240.0)
    }

    fn clear_rect(&mut self, _x: f32, _y: f32, _w: f32, _h: f32) -> Result<(), RenderError> {
        Ok(())
    }

    fn stroke_polygon(&mut self, _points: &[Point], _stroke: Stroke) -> Result<(), RenderError> {
        Ok(())
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.presents.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_config() -> ScanConfig {
    ScanConfig::new(SymbologyFilter::All, Default::default(), 15).unwrap()
}

fn session_for(source: &Arc<ScriptedSource>) -> ScannerSession {
    ScannerSession::new(source.clone(), Arc::new(ScriptedDecoder))
}

fn wait_for_state(session: &ScannerSession, pred: impl Fn(&SessionState) -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < WAIT {
        if pred(&session.state()) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Start and return a receiver for the confirmed code
fn start_collecting(session: &ScannerSession) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    session
        .start(
            fast_config(),
            move |result| {
                let _ = tx.send(result.code);
            },
            |_| {},
        )
        .unwrap();
    rx
}

#[test]
fn test_confirms_after_three_cycles() {
    let source = Arc::new(ScriptedSource::new("test:session-confirm", b"AAA"));
    let session = session_for(&source);
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    session.on_progress(move |p| sink.lock().unwrap().push(p.percent));

    let rx = start_collecting(&session);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "A");
    assert!(wait_for_state(&session, |s| *s == SessionState::Detected));

    assert_eq!(*progress.lock().unwrap(), vec![50, 70, 90]);
    assert_eq!(source.closes(), 1);
    assert!(!source.is_open());
    // Exactly one result
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_decoder_panics_and_glitches_are_absorbed() {
    let source = Arc::new(ScriptedSource::new("test:session-panic", b"PGAPAGA"));
    let session = session_for(&source);

    let rx = start_collecting(&session);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "A");
    assert_eq!(session.state(), SessionState::Detected);
}

#[test]
fn test_interrupted_run_needs_fresh_streak() {
    let source = Arc::new(ScriptedSource::new("test:session-interrupt", b"AABAAA"));
    let session = session_for(&source);
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    session.on_progress(move |p| sink.lock().unwrap().push(p.percent));

    let rx = start_collecting(&session);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "A");
    assert_eq!(*progress.lock().unwrap(), vec![50, 70, 50, 50, 70, 90]);
}

#[test]
fn test_stop_cancels_without_result() {
    let source = Arc::new(ScriptedSource::new("test:session-stop", &[0]));
    let session = session_for(&source);
    let rx = start_collecting(&session);

    thread::sleep(Duration::from_millis(100));
    session.stop().unwrap();

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(source.closes(), 1);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    assert_eq!(
        session.stop(),
        Err(ScanError::SessionMisuse(SessionMisuseError::NotScanning))
    );
    session.close();
    assert_eq!(source.closes(), 1);
}

#[test]
fn test_close_from_idle_and_stopped() {
    let source = Arc::new(ScriptedSource::new("test:session-close-idle", &[0]));
    let session = session_for(&source);

    session.close();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(source.closes(), 0);

    let _rx = start_collecting(&session);
    session.stop().unwrap();
    session.close();
    session.close();
    assert_eq!(source.closes(), 1);
    source.assert_closed_at_most_once();
}

#[test]
fn test_close_while_scanning() {
    let source = Arc::new(ScriptedSource::new("test:session-close-scanning", &[0]));
    let session = session_for(&source);
    let _rx = start_collecting(&session);
    assert_eq!(session.state(), SessionState::Scanning);

    session.close();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(source.closes(), 1);
    assert!(!source.is_open());
}

#[test]
fn test_close_after_detected() {
    let source = Arc::new(ScriptedSource::new("test:session-close-detected", b"A"));
    let session = session_for(&source);
    let rx = start_collecting(&session);
    rx.recv_timeout(WAIT).unwrap();
    assert!(wait_for_state(&session, |s| *s == SessionState::Detected));

    session.close();
    session.close();
    assert_eq!(source.closes(), 1);
    source.assert_closed_at_most_once();
}

#[test]
fn test_close_after_error_closes_nothing() {
    let source = Arc::new(ScriptedSource::failing(
        "test:session-close-error",
        CameraError::NoDeviceFound,
    ));
    let session = session_for(&source);
    assert!(session.start(fast_config(), |_| {}, |_| {}).is_err());
    assert!(matches!(session.state(), SessionState::Error(_)));

    session.close();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(source.closes(), 0);
}

#[test]
fn test_close_while_initializing() {
    let source = Arc::new(ScriptedSource {
        open_delay: Duration::from_millis(300),
        ..ScriptedSource::new("test:session-close-init", &[0])
    });
    let session = Arc::new(session_for(&source));

    let starter = session.clone();
    let start = thread::spawn(move || starter.start(fast_config(), |_| {}, |_| {}));

    assert!(wait_for_state(&session, |s| *s == SessionState::Initializing));
    session.close();
    assert_eq!(session.state(), SessionState::Stopped);

    let result = start.join().unwrap();
    assert_eq!(result, Err(ScanError::Camera(CameraError::Closed)));
    // The handle opened late is released by start() itself
    assert_eq!(source.opens(), 1);
    assert_eq!(source.closes(), 1);
    assert!(!source.is_open());
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_drop_releases_camera() {
    let source = Arc::new(ScriptedSource::new("test:session-drop", &[0]));
    {
        let session = session_for(&source);
        let _rx = start_collecting(&session);
    }
    assert_eq!(source.closes(), 1);
    assert!(!source.is_open());
}

#[test]
fn test_reset_then_start_begins_with_empty_tally() {
    let source = Arc::new(ScriptedSource::new("test:session-reset", b"AAA"));
    let session = session_for(&source);
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    session.on_progress(move |p| sink.lock().unwrap().push(p.percent));

    let rx = start_collecting(&session);
    rx.recv_timeout(WAIT).unwrap();
    assert!(wait_for_state(&session, |s| *s == SessionState::Detected));

    assert_eq!(
        session.start(fast_config(), |_| {}, |_| {}),
        Err(ScanError::SessionMisuse(SessionMisuseError::ResetRequired))
    );

    session.reset().unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.progress().percent, 0);
    progress.lock().unwrap().clear();

    let rx = start_collecting(&session);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "A");
    assert_eq!(*progress.lock().unwrap(), vec![50, 70, 90]);
    assert_eq!(source.opens(), 2);
    assert_eq!(source.closes(), 2);
    source.assert_closed_at_most_once();
}

#[test]
fn test_misuse_while_scanning() {
    let source = Arc::new(ScriptedSource::new("test:session-misuse", &[0]));
    let session = session_for(&source);
    let _rx = start_collecting(&session);

    assert_eq!(
        session.start(fast_config(), |_| {}, |_| {}),
        Err(ScanError::SessionMisuse(SessionMisuseError::AlreadyActive))
    );
    assert_eq!(
        session.reset(),
        Err(ScanError::SessionMisuse(SessionMisuseError::NotFinished))
    );
    assert_eq!(session.state(), SessionState::Scanning);
    assert_eq!(source.opens(), 1);

    // Idle reset is a no-op
    session.stop().unwrap();
    session.reset().unwrap();
    session.reset().unwrap();
}

#[test]
fn test_invalid_config_is_rejected_before_open() {
    let source = Arc::new(ScriptedSource::new("test:session-config", &[0]));
    let session = session_for(&source);
    let config = ScanConfig {
        scan_frequency_hz: 99,
        ..ScanConfig::default()
    };

    assert_eq!(
        session.start(config, |_| {}, |_| {}),
        Err(ScanError::Config(ConfigError::FrequencyOutOfRange(99)))
    );
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(source.opens(), 0);
}

#[test]
fn test_busy_device_fails_fast() {
    let first_source = Arc::new(ScriptedSource::new("test:session-busy", &[0]));
    let second_source = Arc::new(ScriptedSource::new("test:session-busy", &[0]));
    let first = session_for(&first_source);
    let second = session_for(&second_source);

    let _rx = start_collecting(&first);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let started = Instant::now();
    let result = second.start(fast_config(), |_| {}, move |e| sink.lock().unwrap().push(e));

    assert!(started.elapsed() < Duration::from_secs(1));
    let busy = ScanError::Camera(CameraError::DeviceBusy("test:session-busy".into()));
    assert_eq!(result, Err(busy.clone()));
    assert_eq!(*errors.lock().unwrap(), vec![busy.clone()]);
    assert_eq!(second.state(), SessionState::Error(busy));
    assert!(!second_source.is_open());
    assert_eq!(second_source.closes(), 0);

    // Released claim lets the second session retry
    first.close();
    second.start(fast_config(), |_| {}, |_| {}).unwrap();
    assert_eq!(second.state(), SessionState::Scanning);
}

#[test]
fn test_permission_denied_is_reported_and_retryable() {
    let source = Arc::new(ScriptedSource::failing(
        "test:session-permission",
        CameraError::PermissionDenied,
    ));
    let session = session_for(&source);
    let errors = Arc::new(AtomicUsize::new(0));

    for attempt in 1..=2 {
        let counter = errors.clone();
        let result = session.start(fast_config(), |_| {}, move |e| {
            assert_eq!(e, ScanError::Camera(CameraError::PermissionDenied));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(result.is_err());
        assert_eq!(errors.load(Ordering::SeqCst), attempt);
    }

    // Never retried automatically
    assert_eq!(source.opens(), 2);
}

#[test]
fn test_disconnect_moves_to_error() {
    let source = Arc::new(ScriptedSource {
        disconnect_after: Some(2),
        ..ScriptedSource::new("test:session-disconnect", &[0])
    });
    let session = session_for(&source);
    let (tx, rx) = mpsc::channel();
    session
        .start(fast_config(), |_| {}, move |e| {
            let _ = tx.send(e);
        })
        .unwrap();

    let error = rx.recv_timeout(WAIT).unwrap();
    assert!(matches!(error, ScanError::Camera(CameraError::Disconnected(_))));
    assert!(matches!(session.state(), SessionState::Error(_)));
    assert_eq!(source.closes(), 1);
    assert!(!source.is_open());
}

#[test]
fn test_torch_unsupported_is_not_fatal() {
    let source = Arc::new(ScriptedSource::new("test:session-torch", &[0]));
    let session = session_for(&source);

    assert!(session.set_torch(true).is_err(), "no stream open yet");

    let _rx = start_collecting(&session);
    assert!(session.set_torch(true).is_err());
    thread::sleep(Duration::from_millis(100));
    assert_eq!(session.state(), SessionState::Scanning);
}

#[test]
fn test_stop_from_progress_callback() {
    let source = Arc::new(ScriptedSource::new("test:session-stop-inside", b"A\0"));
    let session = Arc::new(session_for(&source));
    let weak = Arc::downgrade(&session);
    session.on_progress(move |_| {
        if let Some(session) = weak.upgrade() {
            let _ = session.stop();
        }
    });

    let rx = start_collecting(&session);
    assert!(wait_for_state(&session, |s| *s == SessionState::Stopped));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(source.closes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_stops_session() {
    let source = Arc::new(ScriptedSource::new("test:session-deadline", &[0]));
    let session = Arc::new(session_for(&source));

    let outcome =
        scan_with_deadline(session.clone(), fast_config(), Duration::from_millis(300)).await;

    assert_eq!(outcome, DeadlineOutcome::TimedOut);
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(source.closes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_returns_confirmed_result() {
    let source = Arc::new(ScriptedSource::new("test:session-deadline-ok", b"B"));
    let session = Arc::new(session_for(&source));

    let outcome = scan_with_deadline(session.clone(), fast_config(), WAIT).await;

    match outcome {
        DeadlineOutcome::Confirmed(result) => assert_eq!(result.code, "B"),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Detected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_reports_open_failure() {
    let source = Arc::new(ScriptedSource::failing(
        "test:session-deadline-fail",
        CameraError::PermissionDenied,
    ));
    let session = Arc::new(session_for(&source));

    let outcome = scan_with_deadline(session, fast_config(), WAIT).await;
    assert_eq!(
        outcome,
        DeadlineOutcome::Failed(ScanError::Camera(CameraError::PermissionDenied))
    );
}

#[test]
fn test_slow_decode_skips_ticks_instead_of_queueing() {
    let config = fast_config();
    let budget = config.cycle_budget();
    let delay = budget * 3;

    let source = Arc::new(ScriptedSource::new("test:session-slow-decode", &[0]));
    let decoder = Arc::new(SlowDecoder::new(delay));
    let session = ScannerSession::new(source.clone(), decoder.clone());
    session.start(config, |_| {}, |_| {}).unwrap();

    thread::sleep(Duration::from_secs(1));
    let stop_started = Instant::now();
    session.stop().unwrap();
    let stop_time = stop_started.elapsed();

    let starts = decoder.starts();
    let frames = source.frames_pulled();
    assert!(starts.len() >= 2, "only {} decodes", starts.len());
    // One frame pulled per decode, nothing buffered behind the slow ones
    assert!(
        frames.abs_diff(starts.len()) <= 1,
        "{} frames for {} decodes",
        frames,
        starts.len()
    );

    // After an overrun the next cycle waits a full budget, no catch-up burst
    for pair in starts.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap >= delay + budget / 2,
            "back-to-back cycles {:?} apart",
            gap
        );
    }

    // stop() waits for at most the decode in flight
    assert!(stop_time < delay + budget, "stop took {:?}", stop_time);
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_stalled_camera_keeps_overlay_animating() {
    let config = ScanConfig::new(SymbologyFilter::All, Default::default(), 10).unwrap();
    let source = Arc::new(ScriptedSource {
        stalled: true,
        ..ScriptedSource::new("test:session-stalled", &[0])
    });
    let presents = Arc::new(AtomicUsize::new(0));
    let session = ScannerSession::new(source.clone(), Arc::new(ScriptedDecoder)).with_canvas(
        Box::new(PresentCounter {
            presents: presents.clone(),
        }),
    );

    assert!(FRAME_WAIT_TIMEOUT <= config.cycle_budget());
    session.start(config, |_| {}, |_| {}).unwrap();
    thread::sleep(Duration::from_secs(1));
    session.stop().unwrap();

    // Idle redraws keep pace with the scan frequency while no frame arrives
    let redraws = presents.load(Ordering::SeqCst);
    assert!(redraws >= 6, "only {} overlay redraws in one second", redraws);
    assert_eq!(source.frames_pulled(), 0);
}
