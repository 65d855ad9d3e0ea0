//! Sequential grabbing and frame retrieval.

use std::{
    path::Path,
    sync::{Arc, Mutex},
    thread,
};

use framegrab::{CaptureOptions, CaptureSession, FrameLayout, PixelFormat, PropertyId};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn open_sample() -> Option<CaptureSession> {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return None;
    }
    Some(CaptureSession::open(SAMPLE_VIDEO, &CaptureOptions::new()).expect("Failed to open test video"))
}

#[test]
fn retrieve_before_grab_is_none() {
    let Some(mut session) = open_sample() else {
        return;
    };
    assert!(session.retrieve_frame(PixelFormat::Bgr24).is_none());
}

#[test]
fn grabs_every_frame_then_stops() {
    let Some(mut session) = open_sample() else {
        return;
    };

    let mut grabbed = 0;
    while session.grab_frame() {
        grabbed += 1;
        assert_eq!(session.property(PropertyId::PosFrames), grabbed as f64);
    }
    assert_eq!(grabbed, 300);

    // End of stream is sticky.
    assert!(!session.grab_frame());
    assert!(!session.grab_frame());
    assert!(session.retrieve_frame(PixelFormat::Bgr24).is_none());
}

#[test]
fn position_in_milliseconds_increases() {
    let Some(mut session) = open_sample() else {
        return;
    };

    assert_eq!(session.property(PropertyId::PosMsec), 0.0);
    let mut previous = -1.0;
    for _ in 0..45 {
        assert!(session.grab_frame());
        let position = session.property(PropertyId::PosMsec);
        assert!(position > previous, "{position} after {previous}");
        previous = position;
    }
    // Frame 44 at 30 fps.
    assert!((previous - 44.0 * 1000.0 / 30.0).abs() < 1.0, "{previous}");
}

#[test]
fn retrieved_frames_have_declared_geometry() {
    let Some(mut session) = open_sample() else {
        return;
    };

    let frame = session.read(PixelFormat::Bgr24).expect("first frame");
    assert_eq!(frame.width(), 320);
    assert_eq!(frame.height(), 240);
    assert_eq!(frame.channels(), 3);
    assert!(frame.stride() >= 320 * 3);
    assert_eq!(frame.layout(), FrameLayout::Pixels(PixelFormat::Bgr24));
    assert!(frame.data().len() >= frame.stride() * 239 + 320 * 3);
    assert_eq!(frame.row(0).map(<[u8]>::len), Some(320 * 3));
    assert!(frame.row(240).is_none());
}

#[test]
fn retrieve_can_repeat_with_another_format() {
    let Some(mut session) = open_sample() else {
        return;
    };

    assert!(session.grab_frame());
    let bgr = session
        .retrieve_frame(PixelFormat::Bgr24)
        .expect("bgr frame")
        .to_packed_vec();
    let rgb = session
        .retrieve_frame(PixelFormat::Rgb24)
        .expect("rgb frame")
        .to_packed_vec();

    assert_eq!(bgr.len(), 320 * 240 * 3);
    assert_eq!(rgb.len(), bgr.len());
    for (bgr_pixel, rgb_pixel) in bgr.chunks_exact(3).zip(rgb.chunks_exact(3)).step_by(97) {
        for channel in 0..3 {
            let difference = i16::from(bgr_pixel[channel]) - i16::from(rgb_pixel[2 - channel]);
            assert!(difference.abs() <= 2, "{bgr_pixel:?} vs {rgb_pixel:?}");
        }
    }
}

#[test]
fn frame_converts_to_image() {
    let Some(mut session) = open_sample() else {
        return;
    };

    let frame = session.read(PixelFormat::Bgr24).expect("first frame");
    let packed = frame.to_packed_vec();
    let image = frame.to_image().expect("image").to_rgb8();
    assert_eq!(image.dimensions(), (320, 240));

    // Channels come out in RGB order regardless of the source layout.
    let pixel = image.get_pixel(10, 10);
    let offset = (10 * 320 + 10) * 3;
    assert_eq!(pixel.0, [packed[offset + 2], packed[offset + 1], packed[offset]]);

    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let output = temporary_directory.path().join("frame.png");
    image.save(&output).expect("Failed to save frame");
    assert!(output.exists());
}

#[test]
fn decoded_frames_differ_over_time() {
    let Some(mut session) = open_sample() else {
        return;
    };

    let first = session.read(PixelFormat::Bgr24).expect("frame 0").to_packed_vec();
    for _ in 0..29 {
        assert!(session.grab_frame());
    }
    let later = session.read(PixelFormat::Bgr24).expect("frame 30").to_packed_vec();
    assert_ne!(first, later);
}

#[test]
fn session_moves_to_a_worker_thread() {
    let Some(mut session) = open_sample() else {
        return;
    };
    assert!(session.grab_frame());

    let shared = Arc::new(Mutex::new(session));
    let worker = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            let mut session = shared.lock().expect("session lock");
            assert!(session.grab_frame());
            session.property(PropertyId::PosFrames)
        })
    };
    assert_eq!(worker.join().expect("worker panicked"), 2.0);

    let mut session = shared.lock().expect("session lock");
    assert!(session.read(PixelFormat::Bgr24).is_some());
    assert_eq!(session.property(PropertyId::PosFrames), 3.0);
}
