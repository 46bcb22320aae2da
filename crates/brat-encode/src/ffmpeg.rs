use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use tokio::process::Command;
use tokio::sync::Semaphore;

use brat_core::{BratError, BratResult, VideoConfig};

use crate::manifest::FrameManifest;
use crate::workdir::WorkingDirectory;

/// How much of ffmpeg's stderr ends up in an error message.
const STDERR_TAIL_BYTES: usize = 2048;

/// Output stream parameters passed to ffmpeg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub binary: String,
    pub fps: u32,
    pub pixel_format: String,
    pub codec: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            fps: 30,
            pixel_format: "yuv420p".to_string(),
            codec: "libx264".to_string(),
        }
    }
}

impl From<&VideoConfig> for EncodeSettings {
    fn from(config: &VideoConfig) -> Self {
        Self {
            binary: config.ffmpeg_binary.clone(),
            fps: config.fps,
            pixel_format: config.pixel_format.clone(),
            codec: config.codec.clone(),
        }
    }
}

/// Encoder that shells out to FFmpeg's concat demuxer.
///
/// Encodes run as async child processes. A semaphore caps how many run at
/// once so a burst of video requests cannot oversubscribe the CPU.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    settings: EncodeSettings,
    permits: Arc<Semaphore>,
}

impl FfmpegEncoder {
    /// `max_concurrent == 0` sizes the pool to the available parallelism.
    pub fn new(settings: EncodeSettings, max_concurrent: usize) -> Self {
        let limit = if max_concurrent == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            max_concurrent
        };
        Self {
            settings,
            permits: Arc::new(Semaphore::new(limit)),
        }
    }

    pub fn from_config(config: &VideoConfig) -> Self {
        Self::new(EncodeSettings::from(config), config.max_concurrent_encodes)
    }

    /// Check if the configured ffmpeg binary can be executed.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.settings.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Arguments for encoding the concat list at `manifest` into `output`.
    pub fn concat_args(&self, manifest: &Path, output: &Path) -> Vec<OsString> {
        let filter = format!(
            "fps={},format={}",
            self.settings.fps, self.settings.pixel_format
        );
        let mut args: Vec<OsString> = ["-y", "-f", "concat", "-safe", "0", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(manifest.as_os_str().to_owned());
        args.extend(
            ["-vf", filter.as_str(), "-c:v", self.settings.codec.as_str()]
                .into_iter()
                .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        args
    }

    /// Run ffmpeg against an existing concat list.
    ///
    /// Fails with [`BratError::Encode`] if ffmpeg cannot start, exits
    /// non-zero, or leaves no output file behind.
    pub async fn encode_concat(&self, manifest: &Path, output: &Path) -> BratResult<()> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BratError::Encode("encoder pool closed".into()))?;

        let args = self.concat_args(manifest, output);
        tracing::debug!(binary = %self.settings.binary, ?args, "running ffmpeg");
        let start = Instant::now();

        let result = Command::new(&self.settings.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BratError::Encode(format!("failed to start ffmpeg: {e}")))?;

        if !result.status.success() {
            return Err(BratError::Encode(format!(
                "ffmpeg failed with status {}: {}",
                result.status,
                stderr_tail(&result.stderr)
            )));
        }

        let size = tokio::fs::metadata(output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(BratError::Encode(format!(
                "ffmpeg produced no output at {}",
                output.display()
            )));
        }

        tracing::info!(
            output = %output.display(),
            bytes = size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "encoded video"
        );
        Ok(())
    }

    /// Write `manifest` into `workdir` and encode it to the directory's
    /// output path, which is returned on success.
    pub async fn encode_manifest(
        &self,
        manifest: &FrameManifest,
        workdir: &WorkingDirectory,
    ) -> BratResult<PathBuf> {
        let manifest_path = workdir.manifest_path();
        tokio::fs::write(&manifest_path, manifest.to_concat()).await?;
        let output = workdir.output_path();
        tracing::info!(
            frames = manifest.len(),
            duration_secs = manifest.total_duration(),
            fps = self.settings.fps,
            "encoding frame manifest"
        );
        self.encode_concat(&manifest_path, &output).await?;
        Ok(output)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}
