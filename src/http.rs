use crate::config::HttpConfig;
use crate::error::FetchError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// HTTP client that enforces a minimum inter-request interval and retries
/// transient failures with exponential backoff. One instance per destination
/// host; the pipeline is sequential, so the enforced delay is the deliberate
/// blocking point between calls to the same source.
pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    max_retries: u32,
    backoff: Duration,
    last_request: Mutex<Option<Instant>>,
}

/// 429 and 5xx are retried; everything else in the 4xx range is final.
fn is_transient_status(status: u16) -> bool {
    status == 429 || status >= 500
}

impl RateLimitedClient {
    pub fn new(min_interval: Duration, http: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(Duration::from_secs(http.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            min_interval,
            max_retries: http.max_retries,
            backoff: Duration::from_millis(http.backoff_ms),
            last_request: Mutex::new(None),
        })
    }

    /// Fetch a URL and return the response body as text.
    pub async fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<String, FetchError> {
        let response = self.execute(url, query).await?;
        response.text().await.map_err(|e| FetchError::InvalidResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Fetch a URL and decode the response body as JSON.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let response = self.execute(url, query).await?;
        response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn execute(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            self.pace().await;

            let result = self.client.get(url).query(query).send().await;
            match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if response.status().is_success() {
                        return Ok(response);
                    }
                    if !is_transient_status(status) {
                        return Err(FetchError::Rejected {
                            url: url.to_string(),
                            status,
                        });
                    }
                    if attempt >= self.max_retries {
                        return Err(if status == 429 {
                            FetchError::RateLimitExceeded {
                                url: url.to_string(),
                            }
                        } else {
                            FetchError::UpstreamUnavailable {
                                url: url.to_string(),
                                status: Some(status),
                            }
                        });
                    }
                    warn!(url, status, attempt, "Transient HTTP failure, retrying");
                }
                Err(e) => {
                    // Timeouts and connection failures are transient; anything
                    // else (builder misuse, redirect loops) is not worth retrying
                    if !(e.is_timeout() || e.is_connect()) {
                        return Err(FetchError::InvalidResponse {
                            url: url.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    if attempt >= self.max_retries {
                        return Err(FetchError::UpstreamUnavailable {
                            url: url.to_string(),
                            status: None,
                        });
                    }
                    warn!(url, attempt, error = %e, "Request failed, retrying");
                }
            }

            tokio::time::sleep(self.backoff_delay(attempt)).await;
            attempt += 1;
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt)
    }

    /// Sleep until at least `min_interval` has passed since the previous
    /// request through this client.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Rate limit pause");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local server that answers every request with one fixed status,
    /// counting how many requests arrive.
    async fn stub_status_server(status: u16, hits: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status} stub\r\ncontent-length: 2\r\n\
                     connection: close\r\n\r\n{{}}"
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    fn retrying_client() -> RateLimitedClient {
        let http = HttpConfig {
            max_retries: 2,
            backoff_ms: 1,
            ..HttpConfig::default()
        };
        RateLimitedClient::new(Duration::ZERO, &http).unwrap()
    }

    #[tokio::test]
    async fn a_500_is_retried_to_exhaustion_then_surfaces_unavailable() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = stub_status_server(500, hits.clone()).await;

        match retrying_client().get_json(&url, &[]).await {
            Err(FetchError::UpstreamUnavailable {
                status: Some(500), ..
            }) => {}
            other => panic!("expected UpstreamUnavailable, got {other:?}"),
        }
        // Initial attempt plus max_retries
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn a_404_is_rejected_without_retry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = stub_status_server(404, hits.clone()).await;

        match retrying_client().get_json(&url, &[]).await {
            Err(FetchError::Rejected { status: 404, .. }) => {}
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_429_surfaces_as_rate_limit_exceeded() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = stub_status_server(429, hits.clone()).await;

        match retrying_client().get_json(&url, &[]).await {
            Err(FetchError::RateLimitExceeded { .. }) => {}
            other => panic!("expected RateLimitExceeded, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    fn client(min_interval_ms: u64) -> RateLimitedClient {
        RateLimitedClient::new(
            Duration::from_millis(min_interval_ms),
            &HttpConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn transient_statuses_are_retryable() {
        assert!(is_transient_status(429));
        assert!(is_transient_status(500));
        assert!(is_transient_status(503));
        assert!(!is_transient_status(404));
        assert!(!is_transient_status(401));
        assert!(!is_transient_status(200));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let c = client(0);
        assert_eq!(c.backoff_delay(0), Duration::from_millis(500));
        assert_eq!(c.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(c.backoff_delay(2), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn pacing_enforces_minimum_interval() {
        let c = client(25);
        let start = std::time::Instant::now();
        c.pace().await;
        c.pace().await;
        c.pace().await;
        // N calls take at least (N-1) * min_interval of wall clock
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn first_request_is_not_delayed() {
        let c = client(500);
        let start = std::time::Instant::now();
        c.pace().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
