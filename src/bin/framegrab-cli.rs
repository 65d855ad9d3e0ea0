use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framegrab::{
    AccelerationType, CaptureOptions, CaptureSession, FfmpegLogLevel, PixelFormat, PropertyId,
    SeekOutcome, available_hardware_devices,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value, json};

const CLI_AFTER_HELP: &str = "Examples:\n  framegrab probe input.mp4 --json\n  framegrab grab input.mp4 --out frames --frame 120 --count 10 --progress\n  framegrab grab rtsp://camera/stream --out still --time 0:00:05 --hardware any\n  framegrab raw input.mp4 --out stream.h264\n  framegrab completions zsh > _framegrab";

#[derive(Debug, Parser)]
#[command(
    name = "framegrab",
    version,
    about = "Inspect video streams and grab frame-accurate stills",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Hardware decoding (none, any, d3d11, vaapi, mfx, cuda, videotoolbox, dxva2).
    #[arg(long)]
    hardware: Option<String>,

    /// Hardware device index; requires a specific --hardware type.
    #[arg(long)]
    device: Option<i32>,

    /// Request OpenCL interop with the hardware decoder; requires --hardware.
    #[arg(long)]
    opencl: bool,

    /// Open timeout in milliseconds (0 disables).
    #[arg(long)]
    open_timeout: Option<u64>,

    /// Read timeout in milliseconds (0 disables).
    #[arg(long)]
    read_timeout: Option<u64>,

    /// Force a decoder by name (e.g. h264_cuvid).
    #[arg(long)]
    decoder: Option<String>,

    /// Force the input format (e.g. mjpeg, v4l2).
    #[arg(long)]
    input_format: Option<String>,

    /// Keep frames in stored orientation instead of applying rotation metadata.
    #[arg(long)]
    no_auto_rotate: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print stream properties (alias: info).
    #[command(
        about = "Print stream properties",
        visible_alias = "info",
        after_help = "Examples:\n  framegrab probe input.mp4\n  framegrab probe input.mp4 --json"
    )]
    Probe {
        /// Input path or URL.
        input: String,

        /// Output properties as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Seek and save decoded frames as images.
    #[command(
        about = "Grab frames to image files",
        after_help = "Examples:\n  framegrab grab input.mp4 --out frames --frame 300\n  framegrab grab input.mp4 --out frames --time 00:00:12.5 --count 25 --ext jpg"
    )]
    Grab {
        /// Input path or URL.
        input: String,
        /// Output directory for frame images.
        #[arg(long)]
        out: PathBuf,
        /// First frame to grab.
        #[arg(long, conflicts_with = "time")]
        frame: Option<i64>,
        /// Time of the first frame (seconds, MM:SS or HH:MM:SS).
        #[arg(long)]
        time: Option<String>,
        /// Number of consecutive frames to grab.
        #[arg(long, default_value_t = 1)]
        count: u64,
        /// Output image extension (png, jpg, jpeg, bmp, tiff).
        #[arg(long, default_value = "png")]
        ext: String,
    },

    /// Dump compressed packets without decoding.
    #[command(
        about = "Dump the raw video stream",
        after_help = "Examples:\n  framegrab raw input.mp4 --out stream.h264\n  framegrab raw input.mkv --out first.hevc --packets 100"
    )]
    Raw {
        /// Input path or URL.
        input: String,
        /// Output file path.
        #[arg(long)]
        out: PathBuf,
        /// Stop after this many packets.
        #[arg(long)]
        packets: Option<u64>,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => (0_u64, minutes.parse::<u64>()?, seconds.parse::<f64>()?),
        [hours, minutes, seconds] => (
            hours.parse::<u64>()?,
            minutes.parse::<u64>()?,
            seconds.parse::<f64>()?,
        ),
        _ => return Err(format!("invalid time format: {trimmed}").into()),
    };

    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds.max(0.0)))
}

fn parse_acceleration(value: &str) -> Option<AccelerationType> {
    match value.to_ascii_lowercase().as_str() {
        "none" | "software" | "off" => Some(AccelerationType::None),
        "any" | "auto" => Some(AccelerationType::Any),
        "d3d11" | "d3d11va" => Some(AccelerationType::D3d11),
        "vaapi" => Some(AccelerationType::Vaapi),
        "mfx" | "qsv" => Some(AccelerationType::Mfx),
        "cuda" | "nvdec" => Some(AccelerationType::Cuda),
        "videotoolbox" | "vt" => Some(AccelerationType::VideoToolbox),
        "dxva2" => Some(AccelerationType::Dxva2),
        _ => None,
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn capture_options(
    global: &GlobalOptions,
    raw_mode: bool,
) -> Result<CaptureOptions, Box<dyn std::error::Error>> {
    let mut options = CaptureOptions::new();

    if raw_mode {
        options = options.with_raw_mode(true);
    }
    if let Some(hardware) = &global.hardware {
        let acceleration = parse_acceleration(hardware)
            .ok_or(format!("unsupported --hardware type: {hardware}"))?;
        options = options.with_acceleration(acceleration);
    }
    if let Some(device) = global.device {
        options = options.with_device_index(device);
    }
    if global.opencl {
        options = options.with_opencl(true);
    }
    if let Some(milliseconds) = global.open_timeout {
        options = options.with_open_timeout(Duration::from_millis(milliseconds));
    }
    if let Some(milliseconds) = global.read_timeout {
        options = options.with_read_timeout(Duration::from_millis(milliseconds));
    }
    if let Some(decoder) = &global.decoder {
        options = options.with_decoder(decoder.clone());
    }
    if let Some(format) = &global.input_format {
        options = options.with_input_format(format.clone());
    }

    Ok(options)
}

fn open_session(
    input: &str,
    global: &GlobalOptions,
    raw_mode: bool,
) -> Result<CaptureSession, Box<dyn std::error::Error>> {
    let options = capture_options(global, raw_mode)?;
    let mut session = CaptureSession::open(input, &options)?;
    if global.no_auto_rotate {
        session.set_property(PropertyId::OrientationAuto, 0.0);
    }
    Ok(session)
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed =
            FfmpegLogLevel::parse(level).ok_or(format!("unsupported --log-level: {level}"))?;
        framegrab::set_ffmpeg_log_level(parsed);
    }

    if global.device.is_some() && global.hardware.is_none() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--device has no effect without --hardware".yellow()
        );
    }
    if global.opencl && global.hardware.is_none() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--opencl has no effect without --hardware".yellow()
        );
    }

    Ok(())
}

fn progress_bar(
    enabled: bool,
    length: Option<u64>,
) -> Result<Option<ProgressBar>, Box<dyn std::error::Error>> {
    if !enabled {
        return Ok(None);
    }
    let bar = match length {
        Some(length) => {
            let bar = ProgressBar::new(length);
            let style =
                ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
            bar.set_style(style.progress_chars("##-"));
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(ProgressStyle::with_template("{spinner:.green} {pos} {msg}")?);
            bar
        }
    };
    Ok(Some(bar))
}

fn probe_payload(session: &CaptureSession) -> Value {
    let mut properties = Map::new();
    for property in PropertyId::all() {
        properties.insert(property.name().to_string(), json!(session.property(property)));
    }

    let metadata = session.metadata();
    json!({
        "codec": metadata.map(|meta| meta.codec.clone()),
        "rotation": metadata.map(|meta| meta.rotation),
        "duration_seconds": metadata.map(|meta| meta.duration_seconds),
        "acceleration": session.property(PropertyId::HwAcceleration),
        "hardware_devices": available_hardware_devices()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        "properties": properties,
    })
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Probe { input, json } => {
            let session = open_session(&input, &cli.global, false)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&probe_payload(&session))?);
            } else {
                if let Some(metadata) = session.metadata() {
                    println!(
                        "Video: {}x{} @ {:.3} fps [{}]",
                        session.property(PropertyId::FrameWidth),
                        session.property(PropertyId::FrameHeight),
                        metadata.frames_per_second,
                        metadata.codec,
                    );
                    println!("Frames: {}", metadata.total_frames());
                    println!("Duration: {:.3}s", metadata.duration_seconds);
                    if metadata.rotation != 0 {
                        println!("Rotation: {}°", metadata.rotation);
                    }
                }
                for property in PropertyId::all() {
                    println!(
                        "  {:<28} {}",
                        property.name().dimmed(),
                        session.property(property)
                    );
                }
            }
        }
        Commands::Grab {
            input,
            out,
            frame,
            time,
            count,
            ext,
        } => {
            if count == 0 {
                return Err("--count must be greater than 0".into());
            }

            if out.exists() {
                if !cli.global.overwrite {
                    return Err(format!(
                        "output directory already exists: {} (use --overwrite)",
                        out.display()
                    )
                    .into());
                }
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("writing into existing directory {}", out.display()).yellow()
                );
            }
            fs::create_dir_all(&out)?;

            let mut session = open_session(&input, &cli.global, false)?;
            let start = match (frame, time) {
                (Some(frame), _) => Some(frame),
                (None, Some(time)) => {
                    let seconds = parse_timecode(&time)?.as_secs_f64();
                    let fps = session.property(PropertyId::Fps);
                    Some(framegrab::seek::seconds_to_frame(seconds, fps))
                }
                (None, None) => None,
            };

            let mut first_frame = 0;
            if let Some(start) = start {
                let report = session.seek_to_frame(start);
                if report.outcome != SeekOutcome::Converged {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        format!(
                            "seek to frame {} ended as {:?} at frame {}",
                            report.target, report.outcome, report.position
                        )
                        .yellow()
                    );
                }
                if cli.global.verbose {
                    eprintln!(
                        "seeked to frame {} with {} keyframe seek(s)",
                        report.position, report.keyframe_seeks
                    );
                }
                first_frame = report.position;
            }

            let ext_clean = ext.trim_start_matches('.').to_ascii_lowercase();
            let progress = progress_bar(cli.global.progress, Some(count))?;
            let mut saved = 0_u64;

            for offset in 0..count {
                let frame_number = first_frame + offset as i64;
                let output_path = out.join(format!("frame_{frame_number:06}.{ext_clean}"));
                if output_path.exists() && !cli.global.overwrite {
                    return Err(format!(
                        "output file already exists: {} (use --overwrite)",
                        output_path.display()
                    )
                    .into());
                }

                let Some(frame) = session.read(PixelFormat::Rgb24) else {
                    if cli.global.verbose {
                        eprintln!("stream ended after {saved} frame(s)");
                    }
                    break;
                };
                frame.to_image()?.save(&output_path)?;
                saved += 1;

                if let Some(bar) = &progress {
                    bar.inc(1);
                }
                if cli.global.verbose {
                    eprintln!("saved frame {} -> {}", frame_number, output_path.display());
                }
            }

            if let Some(bar) = progress {
                bar.finish_with_message("done");
            }

            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Saved {saved} frame(s) to {}", out.display()).green()
            );
        }
        Commands::Raw {
            input,
            out,
            packets,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let mut session = open_session(&input, &cli.global, true)?;

            let mut writer = BufWriter::new(File::create(&out)?);
            let progress = progress_bar(cli.global.progress, packets)?;
            let mut written = 0_u64;
            let mut bytes = 0_usize;

            while packets.is_none_or(|limit| written < limit) {
                let Some(frame) = session.read(PixelFormat::default()) else {
                    break;
                };
                writer.write_all(frame.data())?;
                written += 1;
                bytes += frame.data().len();
                if let Some(bar) = &progress {
                    bar.inc(1);
                }
            }
            writer.flush()?;

            if let Some(bar) = progress {
                bar.finish_with_message("done");
            }

            println!(
                "{} {}",
                "saved".green().bold(),
                format!("{written} packet(s), {bytes} bytes -> {}", out.display())
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framegrab", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
