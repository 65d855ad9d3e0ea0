use std::env;
use std::path::PathBuf;

const DEFAULT_TRIPLET: &str = "x64-windows";

fn main() {
    for variable in ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // ffmpeg-sys-next finds FFmpeg through pkg-config everywhere except
    // Windows, where the libraries usually come from vcpkg.
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows"
        || env::var_os("FFMPEG_DIR").is_some()
    {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=framegrab: FFMPEG_DIR is not set. Install FFmpeg with vcpkg and point FFMPEG_DIR at the installed triplet."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| DEFAULT_TRIPLET.to_string());
    let installed = PathBuf::from(&vcpkg_root).join("installed").join(&triplet);

    if !installed.exists() {
        println!(
            "cargo:warning=framegrab: VCPKG_ROOT is set but {} does not exist.",
            installed.display(),
        );
        return;
    }

    println!(
        "cargo:warning=framegrab: using vcpkg FFmpeg at {0}; set FFMPEG_DIR={0} to silence this hint.",
        installed.display(),
    );
    if env::var_os("VCPKGRS_DYNAMIC").is_none() {
        println!("cargo:warning=framegrab: set VCPKGRS_DYNAMIC=1 for dynamically linked vcpkg FFmpeg.");
    }
}
