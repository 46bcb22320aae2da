use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use brat_core::{BratConfig, BratError, BratResult, Viewport};
use brat_encode::{FfmpegEncoder, FrameManifest, FrameTiming, WorkingDirectory};
use brat_web::{
    words, Admission, EngineHandle, EngineLauncher, FrameCapture, OverlayController,
    OverlaySelectors, RenderContext,
};

/// An encoded video waiting to be delivered. Its working directory, and the
/// file with it, is removed when the artifact is dropped.
#[derive(Debug)]
pub struct VideoArtifact {
    pub path: PathBuf,
    pub frames: usize,
    pub duration_secs: f64,
    pub workdir: WorkingDirectory,
}

/// Request-level orchestration over the shared engine and encoder.
pub struct RenderService {
    engine: EngineHandle,
    admission: Admission,
    capture: FrameCapture,
    encoder: FfmpegEncoder,
    selectors: OverlaySelectors,
    viewport: Viewport,
    target_url: String,
    timing: FrameTiming,
    tmp_root: PathBuf,
}

impl RenderService {
    pub fn new(config: &BratConfig, launcher: Arc<dyn EngineLauncher>) -> BratResult<Self> {
        Ok(Self {
            engine: EngineHandle::new(launcher),
            admission: Admission::from_config(&config.render),
            capture: FrameCapture::from_config(&config.render),
            encoder: FfmpegEncoder::from_config(&config.video),
            selectors: OverlaySelectors::default(),
            viewport: config.render.viewport(),
            target_url: config.render.target_url()?,
            timing: FrameTiming {
                step: config.video.frame_duration,
                hold: config.video.hold_duration,
            },
            tmp_root: config.video.tmp_root.clone(),
        })
    }

    pub fn encoder(&self) -> &FfmpegEncoder {
        &self.encoder
    }

    /// Render `text` as a single PNG.
    pub async fn render_image(&self, text: &str) -> BratResult<Vec<u8>> {
        let start = Instant::now();
        let (mut ctx, mut overlay) = self.open_prepared().await?;
        let result = self.capture.capture_image(&mut ctx, &mut overlay, text).await;
        ctx.close().await;

        let png = result?;
        tracing::info!(
            bytes = png.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rendered image"
        );
        Ok(png)
    }

    /// Render `text` as a word-by-word reveal video.
    ///
    /// On failure the working directory is removed before returning.
    pub async fn render_video(&self, text: &str) -> BratResult<VideoArtifact> {
        if words(text).is_empty() {
            return Err(BratError::InvalidArgument("text has no words".into()));
        }
        let start = Instant::now();
        let workdir = WorkingDirectory::create(&self.tmp_root)?;

        let (path, manifest) = match self.render_into(text, &workdir).await {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(workdir = %workdir.path().display(), error = %e, "video render failed");
                workdir.remove().await;
                return Err(e);
            }
        };

        tracing::info!(
            frames = manifest.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rendered video"
        );
        Ok(VideoArtifact {
            path,
            frames: manifest.len(),
            duration_secs: manifest.total_duration(),
            workdir,
        })
    }

    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }

    async fn render_into(
        &self,
        text: &str,
        workdir: &WorkingDirectory,
    ) -> BratResult<(PathBuf, FrameManifest)> {
        let (mut ctx, mut overlay) = self.open_prepared().await?;
        let captured = self
            .capture
            .capture_frames(&mut ctx, &mut overlay, text, workdir)
            .await;
        ctx.close().await;
        let frames = captured?;

        let paths: Vec<PathBuf> = frames.into_iter().map(|f| f.path).collect();
        let manifest = FrameManifest::from_frames(&paths, self.timing)?;
        let path = self.encoder.encode_manifest(&manifest, workdir).await?;
        Ok((path, manifest))
    }

    async fn open_prepared(&self) -> BratResult<(RenderContext, OverlayController)> {
        let engine = self.engine.acquire().await?;
        let mut ctx = RenderContext::open(&engine, self.viewport, &self.admission).await?;
        let mut overlay = OverlayController::new(self.selectors.clone());
        if let Err(e) = overlay.prepare(&mut ctx, &self.target_url).await {
            ctx.close().await;
            return Err(e);
        }
        Ok((ctx, overlay))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use brat_web::testing::{FakeBehavior, FakeLauncher, PageCall};

    fn service(config: &BratConfig, launcher: &Arc<FakeLauncher>) -> RenderService {
        RenderService::new(config, launcher.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_image_closes_context() {
        let (config, root) = config("image", "false");
        let launcher = Arc::new(FakeLauncher::default());
        let svc = service(&config, &launcher);

        let png = svc.render_image("hello world").await.unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let engine = launcher.engine(0);
        assert_eq!(engine.pages_opened(), 1);
        assert_eq!(engine.pages_closed(), 1);
        assert_eq!(
            engine.calls(0)[0],
            PageCall::Goto("http://brat.test/index.html".into())
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_single_word_video() {
        let (mut config, root) = config("single", "ffmpeg");
        config.video.ffmpeg_binary = fake_ffmpeg(&root).to_string_lossy().into_owned();
        let launcher = Arc::new(FakeLauncher::default());
        let svc = service(&config, &launcher);

        let artifact = svc.render_video("hello").await.unwrap();
        assert_eq!(artifact.frames, 1);
        assert_eq!(artifact.duration_secs, 2.0);
        assert!(artifact.path.exists());
        let manifest = std::fs::read_to_string(artifact.workdir.manifest_path()).unwrap();
        assert_eq!(
            manifest,
            format!(
                "file '{}'\nduration 2\n",
                artifact.workdir.frame_path(0).display()
            )
        );

        artifact.workdir.remove().await;
        assert_eq!(leftover_dirs(&config.video.tmp_root), 0);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relative_tmp_root_video_encodes() {
        let (mut config, root) = config("reltmp", "ffmpeg");
        config.video.ffmpeg_binary = fake_ffmpeg(&root).to_string_lossy().into_owned();
        let relative = PathBuf::from(format!("brat_service_rel_{}", std::process::id()));
        config.video.tmp_root = relative.clone();
        let launcher = Arc::new(FakeLauncher::default());
        let svc = service(&config, &launcher);

        let artifact = svc.render_video("a b").await.unwrap();
        assert_eq!(artifact.frames, 2);
        assert!(artifact.path.exists());

        // Entries resolve the way the concat demuxer resolves them.
        let list_dir = artifact.workdir.manifest_path().parent().unwrap().to_path_buf();
        let manifest = std::fs::read_to_string(artifact.workdir.manifest_path()).unwrap();
        let entries: Vec<PathBuf> = manifest
            .lines()
            .filter_map(|l| l.strip_prefix("file '")?.strip_suffix('\''))
            .map(|entry| list_dir.join(entry))
            .collect();
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert!(entry.is_file(), "{} not found", entry.display());
        }

        artifact.workdir.remove().await;
        let _ = std::fs::remove_dir_all(&relative);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_three_word_video_timing() {
        let (mut config, root) = config("three", "ffmpeg");
        config.video.ffmpeg_binary = fake_ffmpeg(&root).to_string_lossy().into_owned();
        let launcher = Arc::new(FakeLauncher::default());
        let svc = service(&config, &launcher);

        let artifact = svc.render_video("a b c").await.unwrap();
        assert_eq!(artifact.frames, 3);
        let manifest = std::fs::read_to_string(artifact.workdir.manifest_path()).unwrap();
        let durations: Vec<&str> = manifest
            .lines()
            .filter_map(|l| l.strip_prefix("duration "))
            .collect();
        assert_eq!(durations, vec!["0.5", "0.5", "2"]);

        let fills: Vec<String> = launcher
            .engine(0)
            .calls(0)
            .into_iter()
            .filter_map(|c| match c {
                PageCall::Fill(_, text) => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(fills, vec!["a", "a b", "a b c"]);

        artifact.workdir.remove().await;
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_encode_failure_cleans_up() {
        let (config, root) = config("encfail", "false");
        let launcher = Arc::new(FakeLauncher::default());
        let svc = service(&config, &launcher);

        let err = svc.render_video("will not encode").await.unwrap_err();
        assert!(matches!(err, BratError::Encode(_)));
        assert_eq!(leftover_dirs(&config.video.tmp_root), 0);
        assert_eq!(launcher.engine(0).pages_closed(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_render_failure_cleans_up() {
        let (config, root) = config("renderfail", "false");
        let launcher = Arc::new(FakeLauncher::with_behavior(FakeBehavior {
            missing: vec!["#textInput".into()],
            ..FakeBehavior::default()
        }));
        let svc = service(&config, &launcher);

        let err = svc.render_video("a b").await.unwrap_err();
        assert!(matches!(err, BratError::Render(_)));
        assert_eq!(leftover_dirs(&config.video.tmp_root), 0);
        assert_eq!(launcher.engine(0).pages_closed(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_blank_text_never_touches_engine() {
        let (config, root) = config("blank", "false");
        let launcher = Arc::new(FakeLauncher::default());
        let svc = service(&config, &launcher);

        let err = svc.render_video(" \t ").await.unwrap_err();
        assert!(matches!(err, BratError::InvalidArgument(_)));
        assert_eq!(launcher.launches(), 0);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_relaunch_is_transparent() {
        let (config, root) = config("relaunch", "false");
        let launcher = Arc::new(FakeLauncher::default());
        let svc = service(&config, &launcher);
        assert!(!svc.engine.is_ready());

        let first = svc.render_image("hi").await.unwrap();
        launcher.engine(0).crash();
        let second = svc.render_image("hi").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(svc.engine.launch_count(), 2);
        assert_eq!(launcher.engine(1).pages_closed(), 1);

        svc.shutdown().await;
        assert!(launcher.engine(1).was_closed());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_launch_failure_surfaces() {
        let (config, root) = config("nolaunch", "false");
        let launcher = Arc::new(FakeLauncher::failing());
        let svc = service(&config, &launcher);
        let err = svc.render_image("hi").await.unwrap_err();
        assert!(matches!(err, BratError::EngineUnavailable(_)));
        let _ = std::fs::remove_dir_all(&root);
    }
}
