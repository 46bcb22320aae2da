//! # brat-web
//!
//! Drives a headless browser page that renders the brat text overlay:
//! owns the shared engine, hands out isolated per-request contexts, steps
//! the page into text-entry state and captures the overlay word by word.

pub mod backend;
pub mod capture;
pub mod context;
pub mod engine;
pub mod overlay;
pub mod playwright;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{EngineLauncher, RenderEngine, RenderPage};
pub use capture::{prefixes, words, Frame, FrameCapture, SettlePolicy};
pub use context::{Admission, RenderContext};
pub use engine::EngineHandle;
pub use overlay::{OverlayController, OverlaySelectors, OverlayState};
pub use playwright::PlaywrightLauncher;
