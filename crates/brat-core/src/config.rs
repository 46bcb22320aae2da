use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BratError, BratResult};
use crate::geometry::Viewport;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// How the capture pipeline waits for the page to finish re-rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SettleMode {
    /// Wait for the page to paint two animation frames; fall back to the delay.
    #[default]
    AnimationFrame,
    /// Always sleep for `settle_delay_ms`.
    Fixed,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Page containing the overlay, as a file path or a URL.
    pub target: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub image_clip_width: u32,
    pub image_clip_height: u32,
    pub settle: SettleMode,
    pub settle_delay_ms: u64,
    pub max_contexts: usize,
    pub admission_timeout_ms: u64,
    pub node_binary: String,
    pub driver_script: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target: "site/index.html".to_string(),
            viewport_width: 1536,
            viewport_height: 695,
            image_clip_width: 500,
            image_clip_height: 500,
            settle: SettleMode::AnimationFrame,
            settle_delay_ms: 100,
            max_contexts: 8,
            admission_timeout_ms: 15_000,
            node_binary: "node".to_string(),
            driver_script: PathBuf::from("crates/brat-web/scripts/overlay_driver.js"),
        }
    }
}

impl RenderConfig {
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.viewport_width, self.viewport_height)
    }

    /// Resolve `target` into something a browser can navigate to.
    ///
    /// URLs pass through untouched, relative file paths are made absolute
    /// against the current directory.
    pub fn target_url(&self) -> BratResult<String> {
        if self.target.contains("://") {
            return Ok(self.target.clone());
        }
        let path = Path::new(&self.target);
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        Ok(format!("file://{}", abs.display()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Seconds each intermediate frame stays on screen.
    pub frame_duration: f64,
    /// Seconds the final frame stays on screen.
    pub hold_duration: f64,
    pub fps: u32,
    pub pixel_format: String,
    pub codec: String,
    pub tmp_root: PathBuf,
    /// 0 means one encode per available CPU.
    pub max_concurrent_encodes: usize,
    pub ffmpeg_binary: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frame_duration: 0.5,
            hold_duration: 2.0,
            fps: 30,
            pixel_format: "yuv420p".to_string(),
            codec: "libx264".to_string(),
            tmp_root: PathBuf::from("tmp"),
            max_concurrent_encodes: 0,
            ffmpeg_binary: "ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CounterConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://api.counterapi.dev/v1/aqul/brat/up".to_string(),
            timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BratConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BratConfig {
    pub fn load_from_file(path: &Path) -> BratResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents, path)
    }

    /// Load `path` if it exists, otherwise fall back to defaults. Either way
    /// the `PORT` environment variable overrides the configured port.
    ///
    /// No `.env` file is read: the TOML file plus the real process
    /// environment are the only configuration sources.
    pub fn load_or_default(path: &Path) -> BratResult<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| BratError::config(format!("invalid PORT value '{port}'"), path))?;
        }
        config.validate(path)?;
        Ok(config)
    }

    fn from_toml_str(contents: &str, path: &Path) -> BratResult<Self> {
        toml::from_str(contents).map_err(|e| BratError::config(e.to_string(), path))
    }

    /// Reject values that would make the pipeline misbehave at request time.
    pub fn validate(&self, path: &Path) -> BratResult<()> {
        let r = &self.render;
        if r.viewport_width == 0 || r.viewport_height == 0 {
            return Err(BratError::config("viewport must be non-empty", path));
        }
        if r.image_clip_width == 0 || r.image_clip_height == 0 {
            return Err(BratError::config("image clip must be non-empty", path));
        }
        if r.max_contexts == 0 {
            return Err(BratError::config("max_contexts must be at least 1", path));
        }
        let v = &self.video;
        if v.frame_duration.is_nan() || v.frame_duration <= 0.0 {
            return Err(BratError::config("frame_duration must be positive", path));
        }
        if v.hold_duration.is_nan() || v.hold_duration <= v.frame_duration {
            return Err(BratError::config(
                "hold_duration must be longer than frame_duration",
                path,
            ));
        }
        if v.fps == 0 {
            return Err(BratError::config("fps must be positive", path));
        }
        Ok(())
    }
}
