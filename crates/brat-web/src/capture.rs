//! Word-by-word capture of the overlay.

use std::io::Cursor;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use brat_core::{BoundingBox, BratError, BratResult, RenderConfig, SettleMode};
use brat_encode::WorkingDirectory;

use crate::context::RenderContext;
use crate::overlay::OverlayController;

/// Split text into words on any whitespace, ignoring leading/trailing runs.
pub fn words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Cumulative prefixes of `words` joined by single spaces: `["a", "a b", ...]`.
pub fn prefixes(words: &[&str]) -> Vec<String> {
    let mut out = Vec::with_capacity(words.len());
    let mut current = String::new();
    for word in words {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        out.push(current.clone());
    }
    out
}

/// How to wait for the page to finish re-rendering after a text change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Sleep for a fixed delay. Render completion is not observed, so slow
    /// hosts can capture a stale frame.
    Fixed(Duration),
    /// Wait until the page paints two animation frames, sleeping for
    /// `fallback` instead if the page cannot report that.
    AnimationFrame { fallback: Duration },
}

impl SettlePolicy {
    pub fn from_config(config: &RenderConfig) -> Self {
        let delay = Duration::from_millis(config.settle_delay_ms);
        match config.settle {
            SettleMode::Fixed => SettlePolicy::Fixed(delay),
            SettleMode::AnimationFrame => SettlePolicy::AnimationFrame { fallback: delay },
        }
    }

    async fn settle(&self, ctx: &mut RenderContext) -> BratResult<()> {
        match *self {
            SettlePolicy::Fixed(delay) => tokio::time::sleep(delay).await,
            SettlePolicy::AnimationFrame { fallback } => {
                if let Err(e) = ctx.page()?.wait_for_render().await {
                    tracing::debug!(error = %e, "render signal unavailable, sleeping instead");
                    tokio::time::sleep(fallback).await;
                }
            }
        }
        Ok(())
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        SettlePolicy::AnimationFrame {
            fallback: Duration::from_millis(100),
        }
    }
}

/// One captured prefix frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: usize,
    pub path: PathBuf,
    /// The revealed text: the first `index + 1` words.
    pub text: String,
}

/// Captures the overlay as a single image or as one frame per word.
#[derive(Debug, Clone)]
pub struct FrameCapture {
    settle: SettlePolicy,
    image_clip: (u32, u32),
}

impl FrameCapture {
    pub fn new(settle: SettlePolicy, image_clip: (u32, u32)) -> Self {
        Self { settle, image_clip }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(
            SettlePolicy::from_config(config),
            (config.image_clip_width, config.image_clip_height),
        )
    }

    /// Render the full text once and capture a fixed-size region anchored at
    /// the overlay's top-left corner.
    pub async fn capture_image(
        &self,
        ctx: &mut RenderContext,
        overlay: &mut OverlayController,
        text: &str,
    ) -> BratResult<Vec<u8>> {
        overlay.set_text(ctx, text).await?;
        self.settle.settle(ctx).await?;

        let origin = overlay.overlay_box(ctx).await?;
        let (w, h) = self.image_clip;
        let clip = origin.with_size(w as f64, h as f64);
        let png = ctx.page()?.screenshot(clip).await?;
        tracing::debug!(bytes = png.len(), width = w, height = h, "captured overlay image");
        Ok(png)
    }

    /// Reveal `text` one word at a time and capture a frame after each word.
    ///
    /// The clip region is taken from the overlay's box after the first word
    /// and reused for every later frame, so all frames share one size. Frames
    /// are written to `workdir` and returned in reveal order.
    pub async fn capture_frames(
        &self,
        ctx: &mut RenderContext,
        overlay: &mut OverlayController,
        text: &str,
        workdir: &WorkingDirectory,
    ) -> BratResult<Vec<Frame>> {
        let words = words(text);
        if words.is_empty() {
            return Err(BratError::InvalidArgument("text has no words".into()));
        }

        let start = Instant::now();
        let mut clip: Option<BoundingBox> = None;
        let mut size: Option<(u32, u32)> = None;
        let mut frames = Vec::with_capacity(words.len());

        for (index, prefix) in prefixes(&words).into_iter().enumerate() {
            overlay.set_text(ctx, &prefix).await?;
            self.settle.settle(ctx).await?;

            let region = match clip {
                Some(region) => region,
                None => {
                    let measured = overlay.overlay_box(ctx).await?;
                    let region = measured.even_pixels().ok_or_else(|| {
                        BratError::Render(format!(
                            "overlay has no visible area ({}x{})",
                            measured.width, measured.height
                        ))
                    })?;
                    *clip.insert(region)
                }
            };

            let png = ctx.page()?.screenshot(region).await?;
            let dims = png_dimensions(&png)?;
            match size {
                None => size = Some(dims),
                Some(expected) if expected != dims => {
                    return Err(BratError::Render(format!(
                        "frame {index} is {}x{}, expected {}x{}",
                        dims.0, dims.1, expected.0, expected.1
                    )));
                }
                Some(_) => {}
            }

            let path = workdir.frame_path(index);
            tokio::fs::write(&path, &png).await?;
            tracing::debug!(index, words = index + 1, path = %path.display(), "captured frame");
            frames.push(Frame {
                index,
                path,
                text: prefix,
            });
        }

        tracing::info!(
            frames = frames.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "captured overlay frames"
        );
        Ok(frames)
    }
}

fn png_dimensions(png: &[u8]) -> BratResult<(u32, u32)> {
    image::ImageReader::with_format(Cursor::new(png), image::ImageFormat::Png)
        .into_dimensions()
        .map_err(|e| BratError::Render(format!("unreadable screenshot: {e}")))
}
