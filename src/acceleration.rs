//! Decoder negotiation and hardware-accelerated decoding.
//!
//! Opening a session walks a chain of [`DecodeBackend`] candidates and keeps
//! the first one whose decoder opens. The chain is either the single backend
//! requested through [`AccelerationType`], or, for
//! [`AccelerationType::Any`], every hardware backend this platform prefers
//! and this FFmpeg build supports. Software decoding is always the last
//! candidate.
//!
//! The chain only depends on the [`DecoderProvider`] trait, so the FFmpeg
//! provider can be swapped for another implementation.
//!
//! # Platform Support
//!
//! Hardware availability depends on the FFmpeg build and on the host GPU
//! drivers. Use [`available_hardware_devices`] to see what the build offers.

use std::{
    ffi::CString,
    fmt::{Display, Formatter, Result as FmtResult},
    os::raw::c_int,
    ptr,
};

use ffmpeg_next::{
    codec::{Codec, Id, Parameters, context::Context as CodecContext},
    decoder::Video as VideoDecoder,
    frame::Video as VideoFrame,
};
use ffmpeg_sys_next::{
    AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX, AVBufferRef, AVCodec, AVCodecContext,
    AVCodecHWConfig, AVHWDeviceContext, AVHWDeviceType, AVPixelFormat,
};

use crate::error::CaptureError;

/// Acceleration backend requested by the caller or reported by a session.
///
/// The numeric codes are the values accepted and reported by the
/// [`HwAcceleration`](crate::PropertyId::HwAcceleration) property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccelerationType {
    /// Software decoding only.
    #[default]
    None,
    /// The first hardware backend that works, software otherwise.
    Any,
    /// Direct3D 11.
    D3d11,
    /// Video Acceleration API.
    Vaapi,
    /// Intel Media SDK / Quick Sync.
    Mfx,
    /// NVIDIA CUDA.
    Cuda,
    /// Apple VideoToolbox.
    VideoToolbox,
    /// DirectX Video Acceleration 2.
    Dxva2,
}

impl AccelerationType {
    /// Numeric property code.
    pub fn code(self) -> i32 {
        match self {
            AccelerationType::None => 0,
            AccelerationType::Any => 1,
            AccelerationType::D3d11 => 2,
            AccelerationType::Vaapi => 3,
            AccelerationType::Mfx => 4,
            AccelerationType::Cuda => 5,
            AccelerationType::VideoToolbox => 6,
            AccelerationType::Dxva2 => 7,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => AccelerationType::None,
            1 => AccelerationType::Any,
            2 => AccelerationType::D3d11,
            3 => AccelerationType::Vaapi,
            4 => AccelerationType::Mfx,
            5 => AccelerationType::Cuda,
            6 => AccelerationType::VideoToolbox,
            7 => AccelerationType::Dxva2,
            _ => return None,
        })
    }

    /// The FFmpeg device type behind a concrete backend.
    ///
    /// `None` and `Any` have no device.
    pub fn device(self) -> Option<HardwareDeviceType> {
        match self {
            AccelerationType::None | AccelerationType::Any => None,
            AccelerationType::D3d11 => Some(HardwareDeviceType::D3d11va),
            AccelerationType::Vaapi => Some(HardwareDeviceType::Vaapi),
            AccelerationType::Mfx => Some(HardwareDeviceType::Qsv),
            AccelerationType::Cuda => Some(HardwareDeviceType::Cuda),
            AccelerationType::VideoToolbox => Some(HardwareDeviceType::VideoToolbox),
            AccelerationType::Dxva2 => Some(HardwareDeviceType::Dxva2),
        }
    }
}

/// Hardware device types FFmpeg can decode on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareDeviceType {
    /// NVIDIA CUDA (Linux, Windows).
    Cuda,
    /// Video Acceleration API (Linux).
    Vaapi,
    /// DirectX Video Acceleration 2 (Windows).
    Dxva2,
    /// Direct3D 11 Video Acceleration (Windows).
    D3d11va,
    /// Apple VideoToolbox (macOS, iOS).
    VideoToolbox,
    /// Intel Quick Sync Video.
    Qsv,
}

impl HardwareDeviceType {
    fn to_av_hw_device_type(self) -> AVHWDeviceType {
        match self {
            HardwareDeviceType::Cuda => AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
            HardwareDeviceType::Vaapi => AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
            HardwareDeviceType::Dxva2 => AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2,
            HardwareDeviceType::D3d11va => AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA,
            HardwareDeviceType::VideoToolbox => AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
            HardwareDeviceType::Qsv => AVHWDeviceType::AV_HWDEVICE_TYPE_QSV,
        }
    }

    fn from_av_hw_device_type(device_type: AVHWDeviceType) -> Option<Self> {
        match device_type {
            AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA => Some(HardwareDeviceType::Cuda),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI => Some(HardwareDeviceType::Vaapi),
            AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2 => Some(HardwareDeviceType::Dxva2),
            AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA => Some(HardwareDeviceType::D3d11va),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX => Some(HardwareDeviceType::VideoToolbox),
            AVHWDeviceType::AV_HWDEVICE_TYPE_QSV => Some(HardwareDeviceType::Qsv),
            _ => None,
        }
    }

    /// The acceleration type reported for a session decoding on this device.
    pub fn acceleration(self) -> AccelerationType {
        match self {
            HardwareDeviceType::Cuda => AccelerationType::Cuda,
            HardwareDeviceType::Vaapi => AccelerationType::Vaapi,
            HardwareDeviceType::Dxva2 => AccelerationType::Dxva2,
            HardwareDeviceType::D3d11va => AccelerationType::D3d11,
            HardwareDeviceType::VideoToolbox => AccelerationType::VideoToolbox,
            HardwareDeviceType::Qsv => AccelerationType::Mfx,
        }
    }

    /// Device string passed to FFmpeg for a device index.
    ///
    /// Negative indices select the driver default.
    pub(crate) fn device_name(self, index: i32) -> Option<String> {
        if index < 0 {
            return None;
        }
        Some(match self {
            HardwareDeviceType::Vaapi => format!("/dev/dri/renderD{}", 128 + index),
            _ => index.to_string(),
        })
    }
}

impl Display for HardwareDeviceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            HardwareDeviceType::Cuda => "cuda",
            HardwareDeviceType::Vaapi => "vaapi",
            HardwareDeviceType::Dxva2 => "dxva2",
            HardwareDeviceType::D3d11va => "d3d11va",
            HardwareDeviceType::VideoToolbox => "videotoolbox",
            HardwareDeviceType::Qsv => "qsv",
        };
        f.write_str(name)
    }
}

/// List all hardware device types supported by the FFmpeg build.
pub fn available_hardware_devices() -> Vec<HardwareDeviceType> {
    let mut devices = Vec::new();
    let mut device_type = AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;

    loop {
        device_type = unsafe { ffmpeg_sys_next::av_hwdevice_iterate_types(device_type) };
        if device_type == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            break;
        }
        if let Some(device) = HardwareDeviceType::from_av_hw_device_type(device_type) {
            devices.push(device);
        }
    }

    devices
}

/// One candidate in the negotiation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeBackend {
    Software,
    Hardware(HardwareDeviceType),
}

impl DecodeBackend {
    /// The acceleration type a session reports when this backend wins.
    pub fn acceleration(self) -> AccelerationType {
        match self {
            DecodeBackend::Software => AccelerationType::None,
            DecodeBackend::Hardware(device) => device.acceleration(),
        }
    }
}

impl Display for DecodeBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DecodeBackend::Software => f.write_str("software"),
            DecodeBackend::Hardware(device) => write!(f, "{device}"),
        }
    }
}

fn platform_preference() -> &'static [HardwareDeviceType] {
    if cfg!(target_os = "windows") {
        &[
            HardwareDeviceType::D3d11va,
            HardwareDeviceType::Dxva2,
            HardwareDeviceType::Qsv,
            HardwareDeviceType::Cuda,
        ]
    } else if cfg!(any(target_os = "macos", target_os = "ios")) {
        &[HardwareDeviceType::VideoToolbox]
    } else {
        &[
            HardwareDeviceType::Vaapi,
            HardwareDeviceType::Qsv,
            HardwareDeviceType::Cuda,
        ]
    }
}

/// Build the ordered candidate list for a requested acceleration type.
///
/// `available` is the set of device types the FFmpeg build supports; hardware
/// candidates outside it are skipped. Software is always last.
pub fn candidate_chain(
    requested: AccelerationType,
    available: &[HardwareDeviceType],
) -> Vec<DecodeBackend> {
    let mut chain: Vec<DecodeBackend> = match requested {
        AccelerationType::None => Vec::new(),
        AccelerationType::Any => platform_preference()
            .iter()
            .filter(|device| available.contains(device))
            .map(|device| DecodeBackend::Hardware(*device))
            .collect(),
        specific => specific
            .device()
            .filter(|device| {
                let supported = available.contains(device);
                if !supported {
                    log::debug!("acceleration={device} is not supported by this FFmpeg build");
                }
                supported
            })
            .map(DecodeBackend::Hardware)
            .into_iter()
            .collect(),
    };
    chain.push(DecodeBackend::Software);
    chain
}

/// Something that can open a decoder on a given backend.
pub trait DecoderProvider {
    type Decoder;

    /// Codec name used in error messages.
    fn codec_name(&self) -> String;

    /// Try to open a decoder on `backend`.
    fn open_decoder(&mut self, backend: DecodeBackend) -> Result<Self::Decoder, CaptureError>;
}

/// The winning candidate of a negotiation.
#[derive(Debug)]
pub struct Negotiated<D> {
    pub decoder: D,
    pub backend: DecodeBackend,
}

/// Try each candidate in order and keep the first decoder that opens.
///
/// # Errors
///
/// Returns [`CaptureError::CodecUnavailable`] when every candidate fails.
pub fn negotiate<P: DecoderProvider>(
    provider: &mut P,
    chain: &[DecodeBackend],
) -> Result<Negotiated<P::Decoder>, CaptureError> {
    for &backend in chain {
        match provider.open_decoder(backend) {
            Ok(decoder) => {
                log::debug!("decoder opened backend={backend}");
                return Ok(Negotiated { decoder, backend });
            }
            Err(error) => log::debug!("decoder backend={backend} failed: {error}"),
        }
    }

    let attempted = chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(CaptureError::CodecUnavailable {
        codec: provider.codec_name(),
        attempted,
    })
}

/// Opens FFmpeg video decoders for one stream.
pub(crate) struct FfmpegDecoderProvider {
    pub parameters: Parameters,
    pub codec_id: Id,
    pub decoder_name: Option<String>,
    pub device_index: i32,
    pub thread_count: usize,
}

impl FfmpegDecoderProvider {
    fn find_codec(&self, backend: DecodeBackend) -> Result<Codec, CaptureError> {
        let codec = match &self.decoder_name {
            Some(name) => ffmpeg_next::decoder::find_by_name(name)
                .ok_or_else(|| CaptureError::Decode(format!("decoder {name} not found")))?,
            None => ffmpeg_next::decoder::find(self.codec_id).ok_or_else(|| {
                CaptureError::Decode(format!("no decoder for {}", self.codec_id.name()))
            })?,
        };

        if let DecodeBackend::Hardware(device) = backend {
            let codec_pointer = unsafe { codec.as_ptr() };
            if hardware_pixel_format(codec_pointer, device.to_av_hw_device_type()).is_none() {
                return Err(CaptureError::Decode(format!(
                    "decoder {} has no {device} configuration",
                    codec.name()
                )));
            }
        }

        Ok(codec)
    }
}

impl DecoderProvider for FfmpegDecoderProvider {
    type Decoder = VideoDecoder;

    fn codec_name(&self) -> String {
        self.codec_id.name().to_string()
    }

    fn open_decoder(&mut self, backend: DecodeBackend) -> Result<VideoDecoder, CaptureError> {
        let codec = self.find_codec(backend)?;
        let mut context = CodecContext::from_parameters(self.parameters.clone())?;

        unsafe {
            (*context.as_mut_ptr()).thread_count = self.thread_count as c_int;
        }

        if let DecodeBackend::Hardware(device) = backend {
            let device_context = HardwareDeviceContext::create(device, self.device_index)?;
            unsafe {
                let raw = context.as_mut_ptr();
                (*raw).hw_device_ctx = ffmpeg_sys_next::av_buffer_ref(device_context.0);
                (*raw).get_format = Some(select_hardware_format);
            }
        }

        let decoder = context.decoder().open_as(codec)?.video()?;
        Ok(decoder)
    }
}

/// Owned `AVBufferRef` holding a hardware device context.
struct HardwareDeviceContext(*mut AVBufferRef);

impl HardwareDeviceContext {
    fn create(device: HardwareDeviceType, index: i32) -> Result<Self, CaptureError> {
        let name = device
            .device_name(index)
            .map(CString::new)
            .transpose()
            .map_err(|error| CaptureError::InvalidOptions(error.to_string()))?;
        let mut context: *mut AVBufferRef = ptr::null_mut();

        let result = unsafe {
            ffmpeg_sys_next::av_hwdevice_ctx_create(
                &mut context,
                device.to_av_hw_device_type(),
                name.as_ref().map_or(ptr::null(), |name| name.as_ptr()),
                ptr::null_mut(),
                0,
            )
        };

        if result < 0 || context.is_null() {
            return Err(CaptureError::Decode(format!(
                "failed to create {device} device {index} (result={result})"
            )));
        }
        Ok(Self(context))
    }
}

impl Drop for HardwareDeviceContext {
    fn drop(&mut self) {
        unsafe { ffmpeg_sys_next::av_buffer_unref(&mut self.0) };
    }
}

/// Pixel format a codec produces when decoding on `device_type`.
fn hardware_pixel_format(
    codec: *const AVCodec,
    device_type: AVHWDeviceType,
) -> Option<AVPixelFormat> {
    if codec.is_null() {
        return None;
    }

    let mut index: c_int = 0;
    loop {
        let config: *const AVCodecHWConfig =
            unsafe { ffmpeg_sys_next::avcodec_get_hw_config(codec, index) };
        if config.is_null() {
            return None;
        }

        let (methods, queried_type, pix_fmt) =
            unsafe { ((*config).methods, (*config).device_type, (*config).pix_fmt) };
        if methods & (AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as c_int) != 0
            && queried_type == device_type
        {
            return Some(pix_fmt);
        }

        index += 1;
    }
}

/// `get_format` callback that prefers the surface format of the attached
/// device and otherwise lets FFmpeg pick a software format.
unsafe extern "C" fn select_hardware_format(
    context: *mut AVCodecContext,
    formats: *const AVPixelFormat,
) -> AVPixelFormat {
    unsafe {
        let device_ref = (*context).hw_device_ctx;
        if !device_ref.is_null() {
            let device = (*device_ref).data as *const AVHWDeviceContext;
            if let Some(wanted) = hardware_pixel_format((*context).codec, (*device).type_) {
                let mut cursor = formats;
                while *cursor != AVPixelFormat::AV_PIX_FMT_NONE {
                    if *cursor == wanted {
                        return wanted;
                    }
                    cursor = cursor.add(1);
                }
            }
        }
        ffmpeg_sys_next::avcodec_default_get_format(context, formats)
    }
}

/// Whether `frame` lives in accelerator memory.
pub(crate) fn is_hardware_frame(frame: &VideoFrame) -> bool {
    unsafe { !(*frame.as_ptr()).hw_frames_ctx.is_null() }
}

/// Copy an accelerator-resident frame into `software_frame`.
pub(crate) fn transfer_hardware_frame(
    hardware_frame: &VideoFrame,
    software_frame: &mut VideoFrame,
) -> Result<(), CaptureError> {
    let result = unsafe {
        ffmpeg_sys_next::av_frame_unref(software_frame.as_mut_ptr());
        ffmpeg_sys_next::av_hwframe_transfer_data(
            software_frame.as_mut_ptr(),
            hardware_frame.as_ptr(),
            0,
        )
    };

    if result < 0 {
        let format = unsafe { (*hardware_frame.as_ptr()).format };
        return Err(CaptureError::HardwareTransfer(format!(
            "format={format}, result={result}"
        )));
    }

    unsafe {
        (*software_frame.as_mut_ptr()).pts = (*hardware_frame.as_ptr()).pts;
        (*software_frame.as_mut_ptr()).pkt_dts = (*hardware_frame.as_ptr()).pkt_dts;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedProvider {
        working: Vec<DecodeBackend>,
        attempts: Vec<DecodeBackend>,
    }

    impl DecoderProvider for ScriptedProvider {
        type Decoder = DecodeBackend;

        fn codec_name(&self) -> String {
            "h264".to_string()
        }

        fn open_decoder(&mut self, backend: DecodeBackend) -> Result<DecodeBackend, CaptureError> {
            self.attempts.push(backend);
            if self.working.contains(&backend) {
                Ok(backend)
            } else {
                Err(CaptureError::Decode(format!("{backend} refused")))
            }
        }
    }

    const ALL_DEVICES: [HardwareDeviceType; 6] = [
        HardwareDeviceType::Cuda,
        HardwareDeviceType::Vaapi,
        HardwareDeviceType::Dxva2,
        HardwareDeviceType::D3d11va,
        HardwareDeviceType::VideoToolbox,
        HardwareDeviceType::Qsv,
    ];

    #[test]
    fn software_is_always_last() {
        for requested in [
            AccelerationType::None,
            AccelerationType::Any,
            AccelerationType::Vaapi,
            AccelerationType::D3d11,
        ] {
            let chain = candidate_chain(requested, &ALL_DEVICES);
            assert_eq!(chain.last(), Some(&DecodeBackend::Software), "{requested:?}");
        }
        assert_eq!(
            candidate_chain(AccelerationType::None, &ALL_DEVICES),
            vec![DecodeBackend::Software]
        );
    }

    #[test]
    fn specific_backend_is_tried_first_when_available() {
        let chain = candidate_chain(AccelerationType::Cuda, &ALL_DEVICES);
        assert_eq!(
            chain,
            vec![
                DecodeBackend::Hardware(HardwareDeviceType::Cuda),
                DecodeBackend::Software
            ]
        );
        let chain = candidate_chain(AccelerationType::Cuda, &[HardwareDeviceType::Vaapi]);
        assert_eq!(chain, vec![DecodeBackend::Software]);
    }

    #[test]
    fn any_is_filtered_by_build_support() {
        let chain = candidate_chain(AccelerationType::Any, &[]);
        assert_eq!(chain, vec![DecodeBackend::Software]);

        let chain = candidate_chain(AccelerationType::Any, &ALL_DEVICES);
        assert_eq!(chain.len(), platform_preference().len() + 1);
    }

    #[test]
    fn first_working_candidate_wins() {
        let chain = vec![
            DecodeBackend::Hardware(HardwareDeviceType::Vaapi),
            DecodeBackend::Hardware(HardwareDeviceType::Cuda),
            DecodeBackend::Software,
        ];
        let mut provider = ScriptedProvider {
            working: vec![
                DecodeBackend::Hardware(HardwareDeviceType::Cuda),
                DecodeBackend::Software,
            ],
            attempts: Vec::new(),
        };

        let negotiated = negotiate(&mut provider, &chain).unwrap();
        assert_eq!(
            negotiated.backend,
            DecodeBackend::Hardware(HardwareDeviceType::Cuda)
        );
        assert_eq!(negotiated.backend.acceleration(), AccelerationType::Cuda);
        assert_eq!(provider.attempts.len(), 2);
    }

    #[test]
    fn exhausted_chain_reports_codec_error() {
        let chain = candidate_chain(AccelerationType::Vaapi, &ALL_DEVICES);
        let mut provider = ScriptedProvider {
            working: Vec::new(),
            attempts: Vec::new(),
        };

        let error = negotiate(&mut provider, &chain).unwrap_err();
        let message = error.to_string();
        assert!(matches!(error, CaptureError::CodecUnavailable { .. }));
        assert!(message.contains("vaapi, software"), "{message}");
        assert_eq!(provider.attempts, chain);
    }

    #[test]
    fn acceleration_codes_round_trip() {
        for code in 0..8 {
            let kind = AccelerationType::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert_eq!(AccelerationType::from_code(8), None);
        assert_eq!(AccelerationType::Mfx.device(), Some(HardwareDeviceType::Qsv));
    }

    #[test]
    fn device_names_follow_index() {
        assert_eq!(HardwareDeviceType::Cuda.device_name(-1), None);
        assert_eq!(HardwareDeviceType::Cuda.device_name(1).as_deref(), Some("1"));
        assert_eq!(
            HardwareDeviceType::Vaapi.device_name(0).as_deref(),
            Some("/dev/dri/renderD128")
        );
    }
}
