//! Opening, reopening and option validation.
//!
//! Most of these tests need no fixtures; the ones that do are skipped when
//! `tests/fixtures/generate_fixtures.sh` has not been run.

use std::{path::Path, time::Duration};

use framegrab::{
    AccelerationType, CaptureError, CaptureOptions, CaptureSession, PixelFormat, PropertyId,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";
const AUDIO_ONLY: &str = "tests/fixtures/audio_only.wav";

#[test]
fn open_nonexistent_file() {
    let result = CaptureSession::open("this_file_does_not_exist.mp4", &CaptureOptions::new());
    assert!(result.is_err());

    let error_message = result.unwrap_err().to_string();
    assert!(
        error_message.contains("Failed to open"),
        "Error message should mention open failure: {error_message}",
    );
    assert!(error_message.contains("this_file_does_not_exist.mp4"));
}

#[test]
fn open_invalid_file() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file")
        .expect("Failed to write invalid file");

    let path = invalid_file_path.to_string_lossy();
    let result = CaptureSession::open(&path, &CaptureOptions::new());
    assert!(result.is_err(), "Expected error for invalid media file");
}

#[test]
fn unknown_input_format_is_rejected() {
    let options = CaptureOptions::new().with_input_format("definitely_not_a_demuxer");
    let result = CaptureSession::open("whatever.bin", &options);
    match result {
        Err(CaptureError::Open { reason, .. }) => {
            assert!(reason.contains("definitely_not_a_demuxer"), "{reason}");
        }
        other => panic!("expected open error, got {other:?}"),
    }
}

// ── option validation ──────────────────────────────────────────────

#[test]
fn device_index_requires_an_acceleration_type() {
    let options = CaptureOptions::new().with_device_index(0);
    let result = CaptureSession::open("irrelevant.mp4", &options);
    assert!(matches!(result, Err(CaptureError::InvalidOptions(_))));
}

#[test]
fn device_index_cannot_be_combined_with_any() {
    let options = CaptureOptions::new()
        .with_acceleration(AccelerationType::Any)
        .with_device_index(1);
    let result = CaptureSession::open("irrelevant.mp4", &options);

    let error_message = result.unwrap_err().to_string();
    assert!(
        error_message.contains("Invalid capture options"),
        "{error_message}"
    );
}

#[test]
fn flat_options_reject_odd_length() {
    let result = CaptureOptions::from_flat(&[50, 1, 51]);
    assert!(matches!(result, Err(CaptureError::InvalidOptions(_))));
}

#[test]
fn flat_options_reject_unknown_ids() {
    let result = CaptureOptions::from_flat(&[7, 100]);
    assert!(matches!(result, Err(CaptureError::InvalidOptions(_))));
}

#[test]
fn flat_options_reject_unsupported_format() {
    let result = CaptureOptions::from_flat(&[8, 2]);
    let error_message = result.unwrap_err().to_string();
    assert!(error_message.contains("-1"), "{error_message}");
}

// ── fixture-backed ─────────────────────────────────────────────────

#[test]
fn audio_only_file_has_no_video_stream() {
    if !Path::new(AUDIO_ONLY).exists() {
        return;
    }

    let result = CaptureSession::open(AUDIO_ONLY, &CaptureOptions::new());
    assert!(matches!(result, Err(CaptureError::NoVideoStream(_))));
}

#[test]
fn open_reports_dimensions() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let session =
        CaptureSession::open(SAMPLE_VIDEO, &CaptureOptions::new()).expect("Failed to open test video");
    assert!(session.is_opened());

    let metadata = session.metadata().expect("metadata");
    assert_eq!(metadata.width, 320);
    assert_eq!(metadata.height, 240);
    assert!((metadata.frames_per_second - 30.0).abs() < 0.01);
}

#[test]
fn flat_options_open_in_raw_mode() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let options = CaptureOptions::from_flat(&[8, -1, 54, 5000]).expect("flat options");
    let session = CaptureSession::open(SAMPLE_VIDEO, &options).expect("Failed to open test video");
    assert!(session.is_raw_mode());
    assert_eq!(session.property(PropertyId::ReadTimeoutMsec), 5000.0);
}

#[test]
fn failed_reopen_leaves_session_closed() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let mut session =
        CaptureSession::open(SAMPLE_VIDEO, &CaptureOptions::new()).expect("Failed to open test video");
    assert!(session.grab_frame());

    let result = session.reopen("this_file_does_not_exist.mp4", &CaptureOptions::new());
    assert!(result.is_err());
    assert!(!session.is_opened());
    assert!(session.metadata().is_none());
    assert!(!session.grab_frame());
    assert!(session.retrieve_frame(PixelFormat::Bgr24).is_none());
    assert_eq!(session.property(PropertyId::FrameCount), 0.0);
    assert!(!session.set_property(PropertyId::PosFrames, 10.0));
}

#[test]
fn close_is_idempotent() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let mut session =
        CaptureSession::open(SAMPLE_VIDEO, &CaptureOptions::new()).expect("Failed to open test video");
    session.close();
    session.close();
    assert!(!session.is_opened());
}

#[test]
fn timeouts_are_reported_as_properties() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let session =
        CaptureSession::open(SAMPLE_VIDEO, &CaptureOptions::new()).expect("Failed to open test video");
    assert_eq!(session.property(PropertyId::OpenTimeoutMsec), 30_000.0);
    assert_eq!(session.property(PropertyId::ReadTimeoutMsec), 30_000.0);

    let options = CaptureOptions::new()
        .with_open_timeout(Duration::from_millis(2_500))
        .with_read_timeout(Duration::ZERO);
    let session = CaptureSession::open(SAMPLE_VIDEO, &options).expect("Failed to open test video");
    assert_eq!(session.property(PropertyId::OpenTimeoutMsec), 2_500.0);
    assert_eq!(session.property(PropertyId::ReadTimeoutMsec), 0.0);
}
