use std::time::Duration;

use brat_core::CounterConfig;

/// Remote hit counter. Every call to [`hit`](Self::hit) increments it and
/// returns the new total; failures count as zero and never reach the caller.
#[derive(Debug, Clone)]
pub struct HitCounter {
    client: Option<reqwest::Client>,
    url: String,
}

impl HitCounter {
    pub fn new(config: &CounterConfig) -> Self {
        let client = if config.enabled {
            reqwest::Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .map_err(|e| tracing::warn!(error = %e, "hit counter disabled"))
                .ok()
        } else {
            None
        };
        Self {
            client,
            url: config.url.clone(),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            client: None,
            url: String::new(),
        }
    }

    pub async fn hit(&self) -> u64 {
        let Some(client) = &self.client else {
            return 0;
        };
        match self.fetch(client).await {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!(error = %e, url = %self.url, "hit counter unavailable");
                0
            }
        }
    }

    async fn fetch(&self, client: &reqwest::Client) -> reqwest::Result<u64> {
        let body: serde_json::Value = client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body["count"].as_u64().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};

    fn config(url: String) -> CounterConfig {
        CounterConfig {
            enabled: true,
            url,
            timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn test_disabled_counter_is_zero() {
        assert_eq!(HitCounter::disabled().hit().await, 0);
        let mut cfg = config("http://127.0.0.1:9/".into());
        cfg.enabled = false;
        assert_eq!(HitCounter::new(&cfg).hit().await, 0);
    }

    #[tokio::test]
    async fn test_unreachable_counter_is_zero() {
        let counter = HitCounter::new(&config("http://127.0.0.1:9/up".into()));
        assert_eq!(counter.hit().await, 0);
    }

    #[tokio::test]
    async fn test_reads_count_field() {
        let app = Router::new()
            .route("/up", get(|| async { Json(serde_json::json!({ "count": 42 })) }))
            .route("/odd", get(|| async { Json(serde_json::json!({ "total": 1 })) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let counter = HitCounter::new(&config(format!("http://{addr}/up")));
        assert_eq!(counter.hit().await, 42);

        let counter = HitCounter::new(&config(format!("http://{addr}/odd")));
        assert_eq!(counter.hit().await, 0);

        let counter = HitCounter::new(&config(format!("http://{addr}/missing")));
        assert_eq!(counter.hit().await, 0);
    }
}
