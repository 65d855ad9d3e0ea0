//! Hardware negotiation and software fallback.
//!
//! Runners rarely have a usable accelerator, so these tests only assert what
//! holds either way: the session opens and reports the backend it ended up
//! with.

use std::path::Path;

use framegrab::{
    AccelerationType, CaptureOptions, CaptureSession, PixelFormat, PropertyId,
    available_hardware_devices,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

#[test]
fn enumerating_devices_does_not_fail() {
    let devices = available_hardware_devices();
    for device in &devices {
        assert_ne!(device.acceleration(), AccelerationType::None);
    }
}

#[test]
fn any_acceleration_falls_back_to_software() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let options = CaptureOptions::new().with_acceleration(AccelerationType::Any);
    let mut session = CaptureSession::open(SAMPLE_VIDEO, &options).expect("Failed to open test video");

    let code = session.property(PropertyId::HwAcceleration) as i32;
    let acceleration = AccelerationType::from_code(code).expect("known acceleration code");
    assert_ne!(acceleration, AccelerationType::Any);
    if acceleration == AccelerationType::None {
        assert_eq!(session.property(PropertyId::HwDevice), -1.0);
    } else {
        assert!(session.property(PropertyId::HwDevice) >= 0.0);
    }

    let frame = session.read(PixelFormat::Bgr24).expect("first frame");
    assert_eq!((frame.width(), frame.height()), (320, 240));
}

#[test]
fn unavailable_accelerator_falls_back_to_software() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let missing = [
        AccelerationType::D3d11,
        AccelerationType::Vaapi,
        AccelerationType::Cuda,
        AccelerationType::VideoToolbox,
        AccelerationType::Dxva2,
    ]
    .into_iter()
    .find(|kind| {
        kind.device()
            .is_some_and(|device| !available_hardware_devices().contains(&device))
    });
    let Some(missing) = missing else {
        return;
    };

    let options = CaptureOptions::new()
        .with_acceleration(missing)
        .with_opencl(true);
    let mut session = CaptureSession::open(SAMPLE_VIDEO, &options).expect("Failed to open test video");
    assert_eq!(
        session.property(PropertyId::HwAcceleration),
        f64::from(AccelerationType::None.code())
    );
    assert_eq!(session.property(PropertyId::HwAccelerationUseOpencl), 0.0);
    assert!(session.read(PixelFormat::Bgr24).is_some());
}

#[test]
fn unknown_decoder_name_is_unavailable() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let options = CaptureOptions::new().with_decoder("no_such_decoder");
    let result = CaptureSession::open(SAMPLE_VIDEO, &options);
    let error_message = result.unwrap_err().to_string();
    assert!(
        error_message.contains("No usable decoder"),
        "{error_message}"
    );
}
