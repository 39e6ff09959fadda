// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the confirmation tracker

use barcode_scanner::decoder::rect_polygon;
use barcode_scanner::{ConfirmationTracker, RawDetection, Symbology};
use std::time::Instant;

fn cycle(codes: &[&str]) -> Vec<RawDetection> {
    codes
        .iter()
        .map(|code| RawDetection {
            code: code.to_string(),
            symbology: Symbology::Ean13,
            bounding_box: rect_polygon(10.0, 10.0, 100.0, 40.0),
            frame_timestamp: Instant::now(),
        })
        .collect()
}

#[test]
fn test_three_consecutive_cycles_confirm() {
    let mut tracker = ConfirmationTracker::new();
    let mut percents = Vec::new();
    let mut confirmed = Vec::new();

    for _ in 0..3 {
        let obs = tracker.observe(&cycle(&["A"]));
        percents.push(obs.progress.percent);
        confirmed.extend(obs.confirmed);
    }

    assert_eq!(percents, vec![50, 70, 90]);
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].code, "A");
    assert_eq!(confirmed[0].symbology, Symbology::Ean13);
    assert_eq!(tracker.progress().feedback_text, "Barcode detected");
}

#[test]
fn test_interrupting_code_breaks_the_run() {
    let mut tracker = ConfirmationTracker::new();
    let script = ["A", "B", "A", "A", "A"];
    let mut confirmed_at = None;

    for (i, code) in script.iter().enumerate() {
        let obs = tracker.observe(&cycle(&[code]));
        match i {
            1 => {
                assert_eq!(tracker.leader(), Some("B"));
                assert_eq!(tracker.leader_tally(), 1);
            }
            2 => {
                assert_eq!(tracker.leader(), Some("A"));
                assert_eq!(tracker.leader_tally(), 1);
            }
            _ => {}
        }
        if let Some(result) = obs.confirmed {
            assert!(confirmed_at.is_none(), "confirmed twice");
            assert_eq!(result.code, "A");
            confirmed_at = Some(i);
        }
    }

    assert_eq!(confirmed_at, Some(4));
}

#[test]
fn test_alternating_codes_never_confirm() {
    let mut tracker = ConfirmationTracker::new();
    for i in 0..1000 {
        let code = if i % 2 == 0 { "A" } else { "B" };
        let obs = tracker.observe(&cycle(&[code]));
        assert!(obs.confirmed.is_none());
        assert_eq!(tracker.leader_tally(), 1);
    }
    assert!(!tracker.is_confirmed());
}

#[test]
fn test_empty_cycles_do_not_reset_progress() {
    let mut tracker = ConfirmationTracker::new();
    tracker.observe(&cycle(&["A"]));
    tracker.observe(&cycle(&["A"]));

    for _ in 0..10 {
        let obs = tracker.observe(&[]);
        assert!(!obs.changed);
        assert_eq!(tracker.leader(), Some("A"));
        assert_eq!(tracker.leader_tally(), 2);
        assert_eq!(obs.progress.percent, 70);
    }

    let obs = tracker.observe(&cycle(&["A"]));
    assert!(obs.confirmed.is_some());
}

#[test]
fn test_at_most_one_confirmation_per_session() {
    let mut tracker = ConfirmationTracker::new();
    let confirmations = (0..20)
        .filter_map(|_| tracker.observe(&cycle(&["A"])).confirmed)
        .count();
    assert_eq!(confirmations, 1);

    // Later codes are ignored until reset
    let obs = tracker.observe(&cycle(&["B"]));
    assert!(!obs.changed);
    assert_eq!(tracker.leader(), Some("A"));
}

#[test]
fn test_reset_starts_from_empty_tally() {
    let mut tracker = ConfirmationTracker::new();
    for _ in 0..3 {
        tracker.observe(&cycle(&["A"]));
    }
    assert!(tracker.is_confirmed());

    tracker.reset();
    let obs = tracker.observe(&cycle(&["A"]));
    assert_eq!(tracker.leader_tally(), 1);
    assert_eq!(obs.progress.percent, 50);
    assert!(obs.confirmed.is_none());
}
