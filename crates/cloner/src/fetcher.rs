//! Asset download.

use async_trait::async_trait;
use copycat_config::ClonerConfig;
use copycat_core::error::CloneError;
use std::time::Duration;
use tracing::debug;

/// Downloads the bytes behind a resolved asset URL.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CloneError>;
}

/// reqwest-backed fetcher. Any non-2xx status counts as a failure.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    pub fn from_config(config: &ClonerConfig) -> Self {
        Self::new(
            &config.user_agent,
            Duration::from_secs(config.fetch_timeout_secs),
        )
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CloneError> {
        let fail = |reason: String| CloneError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status.as_u16())));
        }

        let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;
        debug!(url = %url, bytes = bytes.len(), "Fetched asset");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new("copycat-test", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn fetches_body_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/style.css"))
            .and(header("user-agent", "copycat-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("body{}"))
            .mount(&server)
            .await;

        let bytes = fetcher()
            .fetch(&format!("{}/style.css", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"body{}");
    }

    #[tokio::test]
    async fn non_success_status_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found page"))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/missing.png", server.uri()))
            .await
            .unwrap_err();
        match err {
            CloneError::Fetch { reason, .. } => assert_eq!(reason, "HTTP 404"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_url_is_failure() {
        let err = fetcher().fetch("img/relative.png").await.unwrap_err();
        assert!(matches!(err, CloneError::Fetch { .. }));
    }
}
