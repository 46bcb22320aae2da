//! Playwright-backed engine.
//!
//! The browser lives in a Node sidecar (`scripts/overlay_driver.js`) that
//! speaks newline-delimited JSON over stdin/stdout. Every request carries an
//! `id`; responses are routed back to the waiting caller by that id, so many
//! contexts can drive the same browser at once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;

use brat_core::{BoundingBox, BratError, BratResult, RenderConfig, Viewport};

use crate::backend::{EngineLauncher, RenderEngine, RenderPage};

/// Upper bound on a single sidecar round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SCRIPT_NAME: &str = "overlay_driver.js";

/// Launches one sidecar process per engine.
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    node_binary: String,
    script: PathBuf,
}

impl PlaywrightLauncher {
    pub fn new(node_binary: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            node_binary: node_binary.into(),
            script: script.into(),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.node_binary.clone(), config.driver_script.clone())
    }

    /// The configured script if it exists, otherwise the copy shipped with
    /// this crate (covers running from inside `crates/brat-web`).
    fn resolve_script(&self) -> PathBuf {
        if self.script.exists() {
            return self.script.clone();
        }
        let local = Path::new("scripts").join(SCRIPT_NAME);
        if local.exists() {
            return local;
        }
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("scripts")
            .join(SCRIPT_NAME)
    }
}

#[async_trait]
impl EngineLauncher for PlaywrightLauncher {
    async fn launch(&self) -> BratResult<Arc<dyn RenderEngine>> {
        let script = self.resolve_script();
        let mut child = Command::new(&self.node_binary)
            .arg(&script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BratError::EngineUnavailable(format!(
                    "failed to spawn {} {}: {e}",
                    self.node_binary,
                    script.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BratError::EngineUnavailable("driver stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BratError::EngineUnavailable("driver stdout not available".into()))?;

        let engine = PlaywrightEngine::start(child, stdin, stdout);
        engine
            .channel
            .request(json!({ "type": "launch" }))
            .await
            .map_err(|e| BratError::EngineUnavailable(format!("browser launch failed: {e}")))?;

        tracing::info!(pid = ?engine.pid, script = %script.display(), "playwright driver ready");
        Ok(Arc::new(engine))
    }
}

type Pending = Mutex<HashMap<u64, oneshot::Sender<Value>>>;

/// Request/response multiplexer over the sidecar's stdio.
struct Channel {
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl Channel {
    async fn request(&self, mut req: Value) -> BratResult<Value> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(BratError::EngineUnavailable("browser process exited".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        req["id"] = json!(id);
        let kind = req["type"].as_str().unwrap_or("request").to_string();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        // The reader may have drained `pending` between the check above and the insert.
        if !self.alive.load(Ordering::Acquire) {
            self.pending.lock().remove(&id);
            return Err(BratError::EngineUnavailable("browser process exited".into()));
        }

        let line = req.to_string() + "\n";
        let written = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.lock().remove(&id);
            self.alive.store(false, Ordering::Release);
            return Err(BratError::EngineUnavailable(format!(
                "failed to write to browser process: {e}"
            )));
        }

        let res = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(res)) => res,
            Ok(Err(_)) => {
                return Err(BratError::EngineUnavailable(
                    "browser process closed unexpectedly".into(),
                ))
            }
            Err(_) => {
                self.pending.lock().remove(&id);
                return Err(BratError::Render(format!(
                    "{kind} timed out after {}s",
                    REQUEST_TIMEOUT.as_secs()
                )));
            }
        };

        if res["type"] == "error" {
            return Err(BratError::Render(format!(
                "{kind}: {}",
                res["error"].as_str().unwrap_or("unknown browser error")
            )));
        }
        Ok(res)
    }

    /// Route responses to their callers until the sidecar closes stdout.
    async fn read_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let res: Value = match serde_json::from_str(&line) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!(error = %e, line = %line, "unparseable driver output");
                            continue;
                        }
                    };
                    let Some(id) = res["id"].as_u64() else {
                        tracing::warn!(line = %line, "driver response without id");
                        continue;
                    };
                    if let Some(tx) = self.pending.lock().remove(&id) {
                        let _ = tx.send(res);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed reading driver output");
                    break;
                }
            }
        }
        self.alive.store(false, Ordering::Release);
        // Dropping the senders wakes every waiter with an error.
        self.pending.lock().clear();
        tracing::warn!("playwright driver exited");
    }
}

pub struct PlaywrightEngine {
    channel: Arc<Channel>,
    child: tokio::sync::Mutex<Option<Child>>,
    pid: Option<u32>,
}

impl PlaywrightEngine {
    fn start(child: Child, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        let channel = Arc::new(Channel {
            stdin: tokio::sync::Mutex::new(stdin),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        });
        tokio::spawn(channel.clone().read_loop(stdout));
        Self {
            channel,
            pid: child.id(),
            child: tokio::sync::Mutex::new(Some(child)),
        }
    }
}

#[async_trait]
impl RenderEngine for PlaywrightEngine {
    async fn new_page(&self, viewport: Viewport) -> BratResult<Box<dyn RenderPage>> {
        let res = self
            .channel
            .request(json!({
                "type": "new_context",
                "viewport": { "width": viewport.width, "height": viewport.height },
            }))
            .await?;
        let context = res["context"]
            .as_u64()
            .ok_or_else(|| BratError::Render("new_context returned no context id".into()))?;
        Ok(Box::new(PlaywrightPage {
            channel: self.channel.clone(),
            context,
            closed: false,
        }))
    }

    fn is_connected(&self) -> bool {
        self.channel.alive.load(Ordering::Acquire)
    }

    async fn close(&self) -> BratResult<()> {
        if self.is_connected() {
            let _ = self.channel.request(json!({ "type": "close" })).await;
        }
        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(pid = ?self.pid, "driver did not exit, killing it");
                    child.kill().await?;
                }
            }
        }
        Ok(())
    }
}

pub struct PlaywrightPage {
    channel: Arc<Channel>,
    context: u64,
    closed: bool,
}

impl PlaywrightPage {
    async fn call(&self, mut req: Value) -> BratResult<Value> {
        if self.closed {
            return Err(BratError::Render("page already closed".into()));
        }
        req["context"] = json!(self.context);
        self.channel.request(req).await
    }
}

#[async_trait]
impl RenderPage for PlaywrightPage {
    async fn goto(&mut self, url: &str) -> BratResult<()> {
        self.call(json!({ "type": "goto", "url": url })).await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> BratResult<()> {
        self.call(json!({ "type": "click", "selector": selector }))
            .await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, text: &str) -> BratResult<()> {
        self.call(json!({ "type": "fill", "selector": selector, "text": text }))
            .await?;
        Ok(())
    }

    async fn bounding_box(&mut self, selector: &str) -> BratResult<Option<BoundingBox>> {
        let res = self
            .call(json!({ "type": "bounding_box", "selector": selector }))
            .await?;
        if res["box"].is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(res["box"].clone())?))
    }

    async fn screenshot(&mut self, clip: BoundingBox) -> BratResult<Vec<u8>> {
        let res = self
            .call(json!({ "type": "screenshot", "clip": clip }))
            .await?;
        let b64 = res["data"]
            .as_str()
            .ok_or_else(|| BratError::Render("missing screenshot data".into()))?;
        general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| BratError::Render(format!("invalid screenshot encoding: {e}")))
    }

    async fn wait_for_render(&mut self) -> BratResult<()> {
        self.call(json!({ "type": "wait_for_render" })).await?;
        Ok(())
    }

    async fn close(&mut self) -> BratResult<()> {
        if self.closed {
            return Ok(());
        }
        let res = self.call(json!({ "type": "close_context" })).await;
        self.closed = true;
        res.map(|_| ())
    }
}

#[cfg(test)]
mod playwright_tests;
