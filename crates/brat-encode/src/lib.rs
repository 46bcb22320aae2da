//! # brat-encode
//!
//! Video assembly: turns an ordered list of captured frame files into a
//! concat manifest with per-frame durations and encodes it with FFmpeg.
//! Each request works inside its own [`WorkingDirectory`].

pub mod ffmpeg;
pub mod manifest;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod workdir;

pub use ffmpeg::{EncodeSettings, FfmpegEncoder};
pub use manifest::{FrameManifest, FrameTiming, ManifestEntry};
pub use workdir::WorkingDirectory;
