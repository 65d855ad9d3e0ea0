//! Frame-accurate seeking against a sequential decode of the same clip.

use std::{
    hash::{DefaultHasher, Hash, Hasher},
    path::Path,
};

use framegrab::{CaptureOptions, CaptureSession, PixelFormat, PropertyId, SeekOutcome};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn open_sample() -> Option<CaptureSession> {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return None;
    }
    Some(CaptureSession::open(SAMPLE_VIDEO, &CaptureOptions::new()).expect("Failed to open test video"))
}

fn fingerprint(session: &mut CaptureSession) -> Option<u64> {
    let frame = session.read(PixelFormat::Bgr24)?;
    let mut hasher = DefaultHasher::new();
    frame.to_packed_vec().hash(&mut hasher);
    Some(hasher.finish())
}

fn sequential_fingerprints() -> Option<Vec<u64>> {
    let mut session = open_sample()?;
    let mut fingerprints = Vec::new();
    while let Some(fingerprint) = fingerprint(&mut session) {
        fingerprints.push(fingerprint);
    }
    Some(fingerprints)
}

#[test]
fn seek_lands_on_exact_frames() {
    let Some(expected) = sequential_fingerprints() else {
        return;
    };
    assert_eq!(expected.len(), 300);

    let mut session = open_sample().expect("open");
    for target in [150, 0, 1, 11, 12, 13, 299, 2, 250, 24, 23, 100] {
        let report = session.seek_to_frame(target);
        assert_eq!(report.outcome, SeekOutcome::Converged, "frame {target}");
        assert_eq!(report.position, target);
        assert_eq!(session.property(PropertyId::PosFrames), target as f64);

        let actual = fingerprint(&mut session).expect("frame after seek");
        assert_eq!(actual, expected[target as usize], "frame {target}");
        assert_eq!(session.property(PropertyId::PosFrames), (target + 1) as f64);
    }
}

#[test]
fn seek_then_grab_continues_sequentially() {
    let Some(expected) = sequential_fingerprints() else {
        return;
    };

    let mut session = open_sample().expect("open");
    session.seek_to_frame(37);
    for frame in 37..60 {
        assert_eq!(fingerprint(&mut session), Some(expected[frame]), "frame {frame}");
    }
}

#[test]
fn seek_to_zero_after_reading() {
    let Some(mut session) = open_sample() else {
        return;
    };

    let first = fingerprint(&mut session).expect("frame 0");
    for _ in 0..100 {
        assert!(session.grab_frame());
    }
    session.seek_to_frame(0);
    assert_eq!(session.property(PropertyId::PosFrames), 0.0);
    assert_eq!(fingerprint(&mut session), Some(first));
}

#[test]
fn seek_past_the_end_is_clamped() {
    let Some(mut session) = open_sample() else {
        return;
    };

    let report = session.seek_to_frame(10_000);
    assert_eq!(report.target, 300);
    assert!(!session.grab_frame());

    let report = session.seek_to_frame(-20);
    assert_eq!(report.target, 0);
    assert!(session.grab_frame());
}

#[test]
fn seek_by_seconds_rounds_to_nearest_frame() {
    let Some(expected) = sequential_fingerprints() else {
        return;
    };

    let mut session = open_sample().expect("open");
    let report = session.seek_to_seconds(5.0);
    assert_eq!(report.target, 150);
    assert_eq!(fingerprint(&mut session), Some(expected[150]));

    let report = session.seek_to_seconds(2.02);
    assert_eq!(report.target, 61);
}

#[test]
fn positional_properties_seek() {
    let Some(expected) = sequential_fingerprints() else {
        return;
    };

    let mut session = open_sample().expect("open");

    assert!(session.set_property(PropertyId::PosFrames, 75.0));
    assert_eq!(fingerprint(&mut session), Some(expected[75]));

    assert!(session.set_property(PropertyId::PosMsec, 4000.0));
    assert_eq!(session.property(PropertyId::PosFrames), 120.0);
    assert_eq!(fingerprint(&mut session), Some(expected[120]));

    assert!(session.set_property(PropertyId::PosAviRatio, 0.5));
    assert_eq!(session.property(PropertyId::PosFrames), 150.0);
    assert!((session.property(PropertyId::PosAviRatio) - 0.5).abs() < 1e-9);

    assert!(session.set_property_by_id(1, 10.0));
    assert_eq!(fingerprint(&mut session), Some(expected[10]));
}
