//! In-memory engine used by tests. Records every page call and renders
//! screenshots as blank PNGs of the requested clip size.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use brat_core::{BoundingBox, BratError, BratResult, Viewport};

use crate::backend::{EngineLauncher, RenderEngine, RenderPage};

#[derive(Debug, Clone, PartialEq)]
pub enum PageCall {
    Goto(String),
    Click(String),
    Fill(String, String),
    BoundingBox(String),
    Screenshot(BoundingBox),
    WaitForRender,
    Close,
}

/// Knobs for how the fake page behaves.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    /// Box reported for any present selector while the input is empty.
    pub element_box: BoundingBox,
    /// Extra width per character of the current input value.
    pub grow_per_char: f64,
    /// Selectors that do not exist on the page.
    pub missing: Vec<String>,
    /// When false, `wait_for_render` fails like a page without rAF.
    pub render_signal: bool,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            element_box: BoundingBox::new(100.0, 50.0, 501.0, 301.0),
            grow_per_char: 0.0,
            missing: Vec::new(),
            render_signal: true,
        }
    }
}

#[derive(Default)]
struct EngineState {
    calls: Vec<Vec<PageCall>>,
    closed_pages: usize,
}

#[derive(Default)]
pub struct FakeEngine {
    behavior: FakeBehavior,
    state: Arc<Mutex<EngineState>>,
    crashed: AtomicBool,
    closed: AtomicBool,
}

impl FakeEngine {
    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Simulate the browser process dying.
    pub fn crash(&self) {
        self.crashed.store(true, Ordering::SeqCst);
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pages_opened(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn pages_closed(&self) -> usize {
        self.state.lock().closed_pages
    }

    /// Calls recorded on the `page`-th page opened.
    pub fn calls(&self, page: usize) -> Vec<PageCall> {
        self.state.lock().calls.get(page).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn new_page(&self, _viewport: Viewport) -> BratResult<Box<dyn RenderPage>> {
        if !self.is_connected() {
            return Err(BratError::EngineUnavailable("fake engine crashed".into()));
        }
        let index = {
            let mut state = self.state.lock();
            state.calls.push(Vec::new());
            state.calls.len() - 1
        };
        Ok(Box::new(FakePage {
            index,
            behavior: self.behavior.clone(),
            state: self.state.clone(),
            value: String::new(),
        }))
    }

    fn is_connected(&self) -> bool {
        !self.crashed.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> BratResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    index: usize,
    behavior: FakeBehavior,
    state: Arc<Mutex<EngineState>>,
    value: String,
}

impl FakePage {
    fn record(&self, call: PageCall) {
        self.state.lock().calls[self.index].push(call);
    }

    fn require(&self, selector: &str) -> BratResult<()> {
        if self.behavior.missing.iter().any(|m| m == selector) {
            return Err(BratError::Render(format!("element not found: {selector}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RenderPage for FakePage {
    async fn goto(&mut self, url: &str) -> BratResult<()> {
        self.record(PageCall::Goto(url.to_string()));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> BratResult<()> {
        self.record(PageCall::Click(selector.to_string()));
        self.require(selector)
    }

    async fn fill(&mut self, selector: &str, text: &str) -> BratResult<()> {
        self.record(PageCall::Fill(selector.to_string(), text.to_string()));
        self.require(selector)?;
        self.value = text.to_string();
        Ok(())
    }

    async fn bounding_box(&mut self, selector: &str) -> BratResult<Option<BoundingBox>> {
        self.record(PageCall::BoundingBox(selector.to_string()));
        if self.require(selector).is_err() {
            return Ok(None);
        }
        let b = self.behavior.element_box;
        let grow = self.behavior.grow_per_char * self.value.chars().count() as f64;
        Ok(Some(b.with_size(b.width + grow, b.height)))
    }

    async fn screenshot(&mut self, clip: BoundingBox) -> BratResult<Vec<u8>> {
        self.record(PageCall::Screenshot(clip));
        let img = image::RgbaImage::from_pixel(
            clip.width.round() as u32,
            clip.height.round() as u32,
            image::Rgba([255, 255, 255, 255]),
        );
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| BratError::Render(e.to_string()))?;
        Ok(buf)
    }

    async fn wait_for_render(&mut self) -> BratResult<()> {
        self.record(PageCall::WaitForRender);
        if self.behavior.render_signal {
            Ok(())
        } else {
            Err(BratError::Render("requestAnimationFrame unavailable".into()))
        }
    }

    async fn close(&mut self) -> BratResult<()> {
        self.record(PageCall::Close);
        self.state.lock().closed_pages += 1;
        Ok(())
    }
}

/// Launcher handing out [`FakeEngine`]s and keeping each one for inspection.
#[derive(Default)]
pub struct FakeLauncher {
    behavior: FakeBehavior,
    fail: bool,
    delay: Option<Duration>,
    engines: Mutex<Vec<Arc<FakeEngine>>>,
    launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_launch_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// The `i`-th engine launched. Panics if it does not exist.
    pub fn engine(&self, i: usize) -> Arc<FakeEngine> {
        self.engines.lock()[i].clone()
    }
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self) -> BratResult<Arc<dyn RenderEngine>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(BratError::EngineUnavailable("fake launch failure".into()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        let engine = Arc::new(FakeEngine::with_behavior(self.behavior.clone()));
        self.engines.lock().push(engine.clone());
        Ok(engine)
    }
}
