use std::sync::Arc;

use async_trait::async_trait;
use brat_core::{BoundingBox, BratResult, Viewport};

/// Starts a headless rendering engine.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> BratResult<Arc<dyn RenderEngine>>;
}

/// One running headless browser, shared by every in-flight request.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Open a fresh isolated browsing context with a single page.
    async fn new_page(&self, viewport: Viewport) -> BratResult<Box<dyn RenderPage>>;

    /// False once the engine process has exited or lost its browser.
    fn is_connected(&self) -> bool;

    async fn close(&self) -> BratResult<()>;
}

/// A page inside an isolated context. Not shared between requests.
#[async_trait]
pub trait RenderPage: Send {
    async fn goto(&mut self, url: &str) -> BratResult<()>;

    /// Click the element matching `selector`; a missing element is an error.
    async fn click(&mut self, selector: &str) -> BratResult<()>;

    /// Replace the value of the input matching `selector` with `text`.
    async fn fill(&mut self, selector: &str, text: &str) -> BratResult<()>;

    async fn bounding_box(&mut self, selector: &str) -> BratResult<Option<BoundingBox>>;

    /// PNG bytes of the viewport region `clip`.
    async fn screenshot(&mut self, clip: BoundingBox) -> BratResult<Vec<u8>>;

    /// Resolve once the page has painted after the last DOM change.
    async fn wait_for_render(&mut self) -> BratResult<()>;

    /// Close the page and its context.
    async fn close(&mut self) -> BratResult<()>;
}
