//! Property table, rotation metadata and reopen stability.

use std::path::Path;

use framegrab::{
    AccelerationType, CaptureOptions, CaptureSession, FFMPEG_BACKEND_ID, PixelFormat, PropertyId,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";
const ROTATED_VIDEO: &str = "tests/fixtures/rotated_video.mp4";
const MATROSKA_VIDEO: &str = "tests/fixtures/sample_video.mkv";

fn open(path: &str) -> Option<CaptureSession> {
    if !Path::new(path).exists() {
        return None;
    }
    Some(CaptureSession::open(path, &CaptureOptions::new()).expect("Failed to open test video"))
}

#[test]
fn static_properties() {
    let Some(session) = open(SAMPLE_VIDEO) else {
        return;
    };

    assert_eq!(session.property(PropertyId::FrameWidth), 320.0);
    assert_eq!(session.property(PropertyId::FrameHeight), 240.0);
    assert!((session.property(PropertyId::Fps) - 30.0).abs() < 0.01);
    assert_eq!(session.property(PropertyId::FrameCount), 300.0);
    assert_eq!(session.property(PropertyId::Format), 0.0);
    assert_eq!(session.property(PropertyId::Backend), FFMPEG_BACKEND_ID);
    assert_eq!(session.property(PropertyId::VideoTotalChannels), 3.0);
    assert_eq!(session.property(PropertyId::VideoStream), 0.0);
    assert_eq!(session.property(PropertyId::OrientationMeta), 0.0);
    assert_eq!(session.property(PropertyId::OrientationAuto), 1.0);
    assert_eq!(session.property(PropertyId::PosFrames), 0.0);
    assert_eq!(session.property(PropertyId::PosAviRatio), 0.0);
    assert!(session.property(PropertyId::Fourcc) > 0.0);
    assert!(session.property(PropertyId::Bitrate) > 0.0);
    assert_eq!(
        session.property(PropertyId::HwAcceleration),
        f64::from(AccelerationType::None.code())
    );
    assert_eq!(session.property(PropertyId::HwDevice), -1.0);
}

#[test]
fn properties_by_numeric_id() {
    let Some(session) = open(SAMPLE_VIDEO) else {
        return;
    };

    assert_eq!(session.property_by_id(3), 320.0);
    assert_eq!(session.property_by_id(7), 300.0);
    assert_eq!(session.property_by_id(42), FFMPEG_BACKEND_ID);
    assert_eq!(session.property_by_id(9999), 0.0);
}

#[test]
fn read_only_properties_reject_writes() {
    let Some(mut session) = open(SAMPLE_VIDEO) else {
        return;
    };

    assert!(!session.set_property(PropertyId::FrameWidth, 640.0));
    assert!(!session.set_property(PropertyId::FrameCount, 1.0));
    assert!(!session.set_property(PropertyId::HwAcceleration, 1.0));
    assert!(!session.set_property_by_id(9999, 1.0));
    assert_eq!(session.property(PropertyId::FrameWidth), 320.0);
}

#[test]
fn frame_count_is_stable_across_reopen() {
    let Some(mut session) = open(SAMPLE_VIDEO) else {
        return;
    };

    let before = session.property(PropertyId::FrameCount);
    for _ in 0..20 {
        session.grab_frame();
    }
    session
        .reopen(SAMPLE_VIDEO, &CaptureOptions::new())
        .expect("Failed to reopen test video");
    assert_eq!(session.property(PropertyId::FrameCount), before);
    assert_eq!(session.property(PropertyId::PosFrames), 0.0);
}

#[test]
fn fourcc_falls_back_to_codec_name() {
    let Some(session) = open(MATROSKA_VIDEO) else {
        return;
    };
    let Some(metadata) = session.metadata() else {
        return;
    };
    if metadata.codec_tag != 0 {
        return;
    }
    let codec = metadata.codec.clone();

    let fourcc = session.property(PropertyId::Fourcc) as u32;
    if codec.len() >= 4 {
        assert_eq!(fourcc.to_le_bytes(), codec.as_bytes()[..4], "{codec}");
    }
    if codec == "h264" {
        assert_eq!(fourcc.to_le_bytes(), *b"h264");
    }
}

// ── rotation ───────────────────────────────────────────────────────

#[test]
fn rotation_swaps_reported_and_retrieved_dimensions() {
    let Some(mut session) = open(ROTATED_VIDEO) else {
        return;
    };

    let rotation = session.property(PropertyId::OrientationMeta);
    assert!(rotation == 90.0 || rotation == 270.0, "{rotation}");
    assert_eq!(session.property(PropertyId::FrameWidth), 240.0);
    assert_eq!(session.property(PropertyId::FrameHeight), 320.0);

    let frame = session.read(PixelFormat::Bgr24).expect("first frame");
    assert_eq!((frame.width(), frame.height()), (240, 320));
    assert_eq!(frame.stride(), 240 * 3);
}

#[test]
fn disabling_auto_rotation_restores_stored_orientation() {
    let Some(mut session) = open(ROTATED_VIDEO) else {
        return;
    };

    assert!(session.set_property(PropertyId::OrientationAuto, 0.0));
    assert_eq!(session.property(PropertyId::OrientationAuto), 0.0);
    assert_eq!(session.property(PropertyId::FrameWidth), 320.0);
    assert_eq!(session.property(PropertyId::FrameHeight), 240.0);

    let frame = session.read(PixelFormat::Bgr24).expect("first frame");
    assert_eq!((frame.width(), frame.height()), (320, 240));
}

#[test]
fn rotated_pixels_match_unrotated_pixels() {
    let Some(mut session) = open(ROTATED_VIDEO) else {
        return;
    };
    if session.property(PropertyId::OrientationMeta) != 90.0 {
        return;
    }

    assert!(session.grab_frame());
    let rotated = session
        .retrieve_frame(PixelFormat::Bgr24)
        .expect("rotated frame")
        .to_packed_vec();
    session.set_property(PropertyId::OrientationAuto, 0.0);
    let stored = session
        .retrieve_frame(PixelFormat::Bgr24)
        .expect("stored frame")
        .to_packed_vec();

    // Clockwise: stored (x, y) lands at (height - 1 - y, x).
    for (x, y) in [(0, 0), (319, 0), (17, 203), (319, 239)] {
        let source = (y * 320 + x) * 3;
        let target = (x * 240 + (239 - y)) * 3;
        assert_eq!(stored[source..source + 3], rotated[target..target + 3], "({x}, {y})");
    }
}
