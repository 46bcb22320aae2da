use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use brat_core::{BratError, BratResult, RenderConfig, Viewport};

use crate::backend::{RenderEngine, RenderPage};

/// Caps the number of render contexts alive at once.
#[derive(Debug, Clone)]
pub struct Admission {
    permits: Arc<Semaphore>,
    limit: usize,
    wait: Duration,
}

impl Admission {
    /// Allow `limit` contexts; a caller waits at most `wait` for a free slot.
    pub fn new(limit: usize, wait: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            wait,
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(
            config.max_contexts,
            Duration::from_millis(config.admission_timeout_ms),
        )
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    async fn admit(&self) -> BratResult<OwnedSemaphorePermit> {
        match tokio::time::timeout(self.wait, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(BratError::Busy("admission closed".into())),
            Err(_) => Err(BratError::Busy(format!(
                "all {} render contexts in use",
                self.limit
            ))),
        }
    }
}

/// An isolated page owned by exactly one request.
///
/// Call [`close`](Self::close) when done. If the context is dropped without
/// being closed (an error path or a cancelled request), the page is closed on
/// a background task and the admission slot released with it.
pub struct RenderContext {
    page: Option<Box<dyn RenderPage>>,
    permit: Option<OwnedSemaphorePermit>,
    viewport: Viewport,
}

impl RenderContext {
    pub async fn open(
        engine: &Arc<dyn RenderEngine>,
        viewport: Viewport,
        admission: &Admission,
    ) -> BratResult<Self> {
        let permit = admission.admit().await?;
        let page = engine.new_page(viewport).await?;
        tracing::debug!(
            width = viewport.width,
            height = viewport.height,
            in_use = admission.limit() - admission.available(),
            "render context opened"
        );
        Ok(Self {
            page: Some(page),
            permit: Some(permit),
            viewport,
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn page(&mut self) -> BratResult<&mut (dyn RenderPage + 'static)> {
        self.page
            .as_deref_mut()
            .ok_or_else(|| BratError::Render("render context already closed".into()))
    }

    /// Close the page. Failures are logged, never returned.
    pub async fn close(mut self) {
        if let Some(mut page) = self.page.take() {
            if let Err(e) = page.close().await {
                tracing::warn!(error = %e, "failed to close render context");
            } else {
                tracing::debug!("render context closed");
            }
        }
        self.permit.take();
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        let Some(mut page) = self.page.take() else {
            return;
        };
        let permit = self.permit.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        tracing::warn!(error = %e, "failed to close abandoned render context");
                    }
                    drop(permit);
                });
            }
            Err(_) => tracing::warn!("render context dropped outside a runtime; page leaked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEngine, PageCall};

    fn engine() -> (Arc<FakeEngine>, Arc<dyn RenderEngine>) {
        let fake = Arc::new(FakeEngine::default());
        let dyn_engine: Arc<dyn RenderEngine> = fake.clone();
        (fake, dyn_engine)
    }

    #[tokio::test]
    async fn test_open_and_close_releases_slot() {
        let (fake, engine) = engine();
        let admission = Admission::new(2, Duration::from_millis(10));

        let ctx = RenderContext::open(&engine, Viewport::new(800, 600), &admission)
            .await
            .unwrap();
        assert_eq!(ctx.viewport(), Viewport::new(800, 600));
        assert_eq!(admission.available(), 1);
        assert_eq!(fake.pages_opened(), 1);

        ctx.close().await;
        assert_eq!(admission.available(), 2);
        assert_eq!(fake.pages_closed(), 1);
        assert_eq!(fake.calls(0).last(), Some(&PageCall::Close));
    }

    #[tokio::test]
    async fn test_admission_rejects_when_full() {
        let (_fake, engine) = engine();
        let admission = Admission::new(1, Duration::from_millis(20));

        let held = RenderContext::open(&engine, Viewport::default(), &admission)
            .await
            .unwrap();
        let err = match RenderContext::open(&engine, Viewport::default(), &admission).await {
            Ok(_) => panic!("second context should be rejected"),
            Err(e) => e,
        };
        assert!(matches!(err, BratError::Busy(_)));

        held.close().await;
        let again = RenderContext::open(&engine, Viewport::default(), &admission)
            .await
            .unwrap();
        again.close().await;
    }

    #[tokio::test]
    async fn test_drop_closes_in_background() {
        let (fake, engine) = engine();
        let admission = Admission::new(1, Duration::from_millis(10));

        let ctx = RenderContext::open(&engine, Viewport::default(), &admission)
            .await
            .unwrap();
        drop(ctx);

        for _ in 0..50 {
            if fake.pages_closed() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(fake.pages_closed(), 1);
        assert_eq!(admission.available(), 1);
    }

    #[tokio::test]
    async fn test_page_after_failed_open_is_not_leaked() {
        let fake = Arc::new(FakeEngine::default());
        fake.crash();
        let engine: Arc<dyn RenderEngine> = fake.clone();
        let admission = Admission::new(1, Duration::from_millis(10));

        assert!(RenderContext::open(&engine, Viewport::default(), &admission)
            .await
            .is_err());
        assert_eq!(admission.available(), 1);
    }
}
