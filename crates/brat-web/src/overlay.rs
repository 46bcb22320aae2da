use brat_core::{BoundingBox, BratError, BratResult};

use crate::context::RenderContext;

/// Element selectors on the overlay page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySelectors {
    /// Button that switches the page to the white overlay style.
    pub style_toggle: String,
    /// The element displaying the text; also the capture region.
    pub overlay: String,
    /// The text input feeding the overlay.
    pub input: String,
}

impl Default for OverlaySelectors {
    fn default() -> Self {
        Self {
            style_toggle: "#toggleButtonWhite".to_string(),
            overlay: "#textOverlay".to_string(),
            input: "#textInput".to_string(),
        }
    }
}

/// Where the page is in the interaction sequence. Transitions only move
/// forward, one step at a time, except that `TextSet` may repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OverlayState {
    Initial,
    StyleSelected,
    FieldFocused,
    TextSet,
}

impl OverlayState {
    pub fn name(&self) -> &'static str {
        match self {
            OverlayState::Initial => "initial",
            OverlayState::StyleSelected => "style-selected",
            OverlayState::FieldFocused => "field-focused",
            OverlayState::TextSet => "text-set",
        }
    }
}

/// Drives one render context's page into the text-entry state and sets
/// the displayed text.
#[derive(Debug, Clone)]
pub struct OverlayController {
    selectors: OverlaySelectors,
    state: OverlayState,
}

impl OverlayController {
    pub fn new(selectors: OverlaySelectors) -> Self {
        Self {
            selectors,
            state: OverlayState::Initial,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    /// Load `target_url` and walk the page from `Initial` to `FieldFocused`:
    /// pick the overlay style, focus the overlay, focus the input.
    pub async fn prepare(&mut self, ctx: &mut RenderContext, target_url: &str) -> BratResult<()> {
        self.expect(&[OverlayState::Initial])?;
        let page = ctx.page()?;

        page.goto(target_url)
            .await
            .map_err(|e| render_step("loading overlay page", e))?;

        page.click(&self.selectors.style_toggle)
            .await
            .map_err(|e| render_step("selecting overlay style", e))?;
        self.state = OverlayState::StyleSelected;

        page.click(&self.selectors.overlay)
            .await
            .map_err(|e| render_step("focusing overlay", e))?;
        page.click(&self.selectors.input)
            .await
            .map_err(|e| render_step("focusing text input", e))?;
        self.state = OverlayState::FieldFocused;

        tracing::debug!(target_url, "overlay prepared");
        Ok(())
    }

    /// Replace the input's value with `text` in full.
    pub async fn set_text(&mut self, ctx: &mut RenderContext, text: &str) -> BratResult<()> {
        self.expect(&[OverlayState::FieldFocused, OverlayState::TextSet])?;
        ctx.page()?
            .fill(&self.selectors.input, text)
            .await
            .map_err(|e| render_step("setting overlay text", e))?;
        self.state = OverlayState::TextSet;
        Ok(())
    }

    /// Current bounding box of the overlay element.
    pub async fn overlay_box(&self, ctx: &mut RenderContext) -> BratResult<BoundingBox> {
        ctx.page()?
            .bounding_box(&self.selectors.overlay)
            .await?
            .ok_or_else(|| {
                BratError::Render(format!(
                    "overlay element {} not found",
                    self.selectors.overlay
                ))
            })
    }

    fn expect(&self, allowed: &[OverlayState]) -> BratResult<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(BratError::InvalidState {
            expected: allowed[0].name(),
            found: self.state.name(),
        })
    }
}

impl Default for OverlayController {
    fn default() -> Self {
        Self::new(OverlaySelectors::default())
    }
}

fn render_step(step: &str, err: BratError) -> BratError {
    match err {
        BratError::Render(msg) => BratError::Render(format!("{step}: {msg}")),
        other => other,
    }
}
