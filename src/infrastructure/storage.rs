//! HTTP object-storage result store
//!
//! Persists final artifacts into a bucket-addressed object store and hands
//! back stable public URLs.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::pipeline::{RenderError, ResultStore};

/// Object store client over a storage HTTP API
pub struct HttpResultStore {
    client: Client,
    base_url: Url,
    token: String,
    bucket: String,
}

impl HttpResultStore {
    pub fn new(base_url: Url, token: impl Into<String>, bucket: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            token: token.into(),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ResultStore for HttpResultStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, RenderError> {
        let endpoint = self
            .base_url
            .join(&format!("storage/v1/object/{}/{path}", self.bucket))
            .map_err(|e| RenderError::Storage(format!("invalid storage path {path}: {e}")))?;

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.token)
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| RenderError::Storage(format!("failed to reach object store: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Storage(format!("HTTP {status}: {body}")));
        }

        Ok(self.public_url(path))
    }

    async fn archive(&self, source_url: &str, path: &str) -> Result<String, RenderError> {
        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| RenderError::Storage(format!("failed to fetch {source_url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Storage(format!(
                "HTTP {status} fetching {source_url}"
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError::Storage(format!("failed to read {source_url}: {e}")))?;

        self.put(path, bytes.to_vec(), &content_type).await
    }

    fn public_url(&self, path: &str) -> String {
        let suffix = format!("storage/v1/object/public/{}/{path}", self.bucket);
        // Resolved against the base the same way `put` resolves its endpoint
        match self.base_url.join(&suffix) {
            Ok(url) => url.into(),
            Err(_) => format!("{}{suffix}", self.base_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> HttpResultStore {
        HttpResultStore::new(Url::parse(&server.uri()).unwrap(), "token-1", "results")
    }

    #[tokio::test]
    async fn test_put_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/results/renders/j1/a.jpg"))
            .and(header("x-upsert", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = store(&server)
            .put("renders/j1/a.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        assert!(url.ends_with("/storage/v1/object/public/results/renders/j1/a.jpg"));
    }

    #[tokio::test]
    async fn test_put_failure_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = store(&server)
            .put("renders/j1/a.jpg", vec![], "image/jpeg")
            .await
            .unwrap_err();
        match err {
            RenderError::Storage(msg) => assert!(msg.contains("403")),
            other => panic!("expected Storage error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_archive_downloads_then_uploads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/external/out.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![9u8; 32])
                    .insert_header("content-type", "image/jpeg"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/results/renders/j2/b.jpg"))
            .and(header("content-type", "image/jpeg"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = store(&server)
            .archive(
                &format!("{}/external/out.jpg", server.uri()),
                "renders/j2/b.jpg",
            )
            .await
            .unwrap();
        assert!(url.contains("/public/results/renders/j2/b.jpg"));
    }

    #[test]
    fn test_public_url_respects_base_path() {
        let store = HttpResultStore::new(
            Url::parse("https://store.example/tenant-a/").unwrap(),
            "t",
            "results",
        );
        assert_eq!(
            store.public_url("renders/j1/a.jpg"),
            "https://store.example/tenant-a/storage/v1/object/public/results/renders/j1/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_archive_source_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = store(&server)
            .archive(&format!("{}/gone.jpg", server.uri()), "renders/x.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Storage(_)));
    }
}
