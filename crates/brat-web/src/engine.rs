use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use brat_core::{BratError, BratResult};

use crate::backend::{EngineLauncher, RenderEngine};

/// Owner of the process-wide rendering engine.
///
/// The engine is launched lazily on the first [`acquire`](Self::acquire) and
/// relaunched when the held instance has disconnected. The slot stays locked
/// for the whole launch, so concurrent callers wait for one launch instead of
/// each starting their own browser.
pub struct EngineHandle {
    launcher: Arc<dyn EngineLauncher>,
    slot: Mutex<Option<Arc<dyn RenderEngine>>>,
    launches: AtomicU64,
}

impl EngineHandle {
    pub fn new(launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            launcher,
            slot: Mutex::new(None),
            launches: AtomicU64::new(0),
        }
    }

    /// Return a connected engine, launching one if needed.
    pub async fn acquire(&self) -> BratResult<Arc<dyn RenderEngine>> {
        let mut slot = self.slot.lock().await;

        if let Some(engine) = slot.as_ref() {
            if engine.is_connected() {
                return Ok(engine.clone());
            }
        }
        if let Some(stale) = slot.take() {
            tracing::warn!("render engine disconnected, relaunching");
            if let Err(e) = stale.close().await {
                tracing::debug!(error = %e, "closing stale render engine failed");
            }
        }

        let start = Instant::now();
        let engine = self.launcher.launch().await.map_err(|e| match e {
            BratError::EngineUnavailable(_) => e,
            other => BratError::EngineUnavailable(other.to_string()),
        })?;
        let launches = self.launches.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            launches,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "render engine launched"
        );

        *slot = Some(engine.clone());
        Ok(engine)
    }

    /// Close the engine if one is held. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let engine = self.slot.lock().await.take();
        if let Some(engine) = engine {
            tracing::info!("closing render engine");
            match engine.close().await {
                Ok(()) => tracing::info!("render engine closed"),
                Err(e) => tracing::warn!(error = %e, "render engine close failed"),
            }
        }
    }

    /// Whether a connected engine is held right now. Never waits: an
    /// in-progress launch reports `false`.
    pub fn is_ready(&self) -> bool {
        match self.slot.try_lock() {
            Ok(slot) => slot.as_ref().is_some_and(|e| e.is_connected()),
            Err(_) => false,
        }
    }

    /// Number of launches performed so far.
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLauncher;

    #[tokio::test]
    async fn test_lazy_launch_and_reuse() {
        let launcher = Arc::new(FakeLauncher::default());
        let handle = EngineHandle::new(launcher.clone());
        assert!(!handle.is_ready());
        assert_eq!(handle.launch_count(), 0);

        let a = handle.acquire().await.unwrap();
        let b = handle.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(handle.is_ready());
        assert_eq!(handle.launch_count(), 1);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_relaunch_after_crash() {
        let launcher = Arc::new(FakeLauncher::default());
        let handle = EngineHandle::new(launcher.clone());

        handle.acquire().await.unwrap();
        launcher.engine(0).crash();
        assert!(!handle.is_ready());

        handle.acquire().await.unwrap();
        assert_eq!(handle.launch_count(), 2);
        assert!(launcher.engine(0).was_closed());
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn test_launch_failure_propagates() {
        let launcher = Arc::new(FakeLauncher::failing());
        let handle = EngineHandle::new(launcher);
        let err = match handle.acquire().await {
            Ok(_) => panic!("acquire should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, BratError::EngineUnavailable(_)));
        assert_eq!(handle.launch_count(), 0);
        assert!(!handle.is_ready());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_launches_once() {
        let launcher = Arc::new(FakeLauncher::with_launch_delay(
            std::time::Duration::from_millis(50),
        ));
        let handle = Arc::new(EngineHandle::new(launcher.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.acquire().await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let launcher = Arc::new(FakeLauncher::default());
        let handle = EngineHandle::new(launcher.clone());
        handle.shutdown().await;

        handle.acquire().await.unwrap();
        handle.shutdown().await;
        handle.shutdown().await;
        assert!(launcher.engine(0).was_closed());
        assert!(!handle.is_ready());
    }
}
