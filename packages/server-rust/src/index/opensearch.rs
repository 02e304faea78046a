//! OpenSearch REST adapter for [`IndexBackend`].
//!
//! Uses three endpoints: `PUT /{index}` to create an index, `PUT
//! /{index}/_doc/{id}` to create-or-replace a document, and `DELETE
//! /{index}/_doc/{id}`. The same calls work against Elasticsearch.

use std::time::Duration;

use async_trait::async_trait;
use indexsync_core::{IndexDescriptor, Row};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use tracing::debug;

use super::{DeleteOutcome, IndexBackend, IndexCreate, IndexError};

/// Error type OpenSearch returns when creating an index that exists.
const ALREADY_EXISTS: &str = "resource_already_exists_exception";

/// Connection settings for [`OpenSearchClient`].
#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    /// Base URL, e.g. `http://opensearch:9200`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout; an elapsed timeout counts as unreachable.
    pub request_timeout: Duration,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            url: "http://opensearch:9200".to_string(),
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// [`IndexBackend`] over the OpenSearch REST API.
#[derive(Debug, Clone)]
pub struct OpenSearchClient {
    http: reqwest::Client,
    base: Url,
    username: Option<String>,
    password: Option<String>,
}

impl OpenSearchClient {
    /// Builds a client. No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a valid base URL or the HTTP client
    /// cannot be built.
    pub fn new(config: &OpenSearchConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&config.url)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("OpenSearch URL `{}` cannot be used as a base URL", config.url);
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Joins percent-encoded path segments onto the base URL.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// URL of one document. Ids the URL path cannot carry (`""`, `.`, `..`)
    /// would address a different resource and are rejected.
    fn doc_url(&self, index: &str, id: &str) -> Result<Url, IndexError> {
        if matches!(id, "" | "." | "..") {
            return Err(IndexError::Rejected {
                status: StatusCode::BAD_REQUEST.as_u16(),
                reason: format!("document id `{id}` cannot be used in a URL path"),
            });
        }
        Ok(self.url(&[index, "_doc", id]))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<(StatusCode, String), IndexError> {
        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        Ok((status, body))
    }
}

#[async_trait]
impl IndexBackend for OpenSearchClient {
    async fn ensure_index(&self, descriptor: &IndexDescriptor) -> Result<IndexCreate, IndexError> {
        let url = self.url(&[descriptor.name.as_str()]);
        let (status, body) = self
            .send(self.request(Method::PUT, url).json(&descriptor.body()))
            .await?;

        if status.is_success() {
            return Ok(IndexCreate::Created);
        }
        if status == StatusCode::BAD_REQUEST && error_type(&body).as_deref() == Some(ALREADY_EXISTS) {
            return Ok(IndexCreate::AlreadyExists);
        }
        Err(classify(status, &body))
    }

    async fn upsert_document(&self, index: &str, id: &str, body: &Row) -> Result<(), IndexError> {
        let url = self.doc_url(index, id)?;
        let (status, text) = self.send(self.request(Method::PUT, url).json(body)).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(classify(status, &text))
        }
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<DeleteOutcome, IndexError> {
        let url = self.doc_url(index, id)?;
        let (status, text) = self.send(self.request(Method::DELETE, url)).await?;
        if status.is_success() {
            Ok(DeleteOutcome::Deleted)
        } else if status == StatusCode::NOT_FOUND {
            // Covers both a missing document and a missing index.
            debug!(index, id, "document already absent");
            Ok(DeleteOutcome::NotFound)
        } else {
            Err(classify(status, &text))
        }
    }
}

fn transport(err: reqwest::Error) -> IndexError {
    IndexError::Unavailable(err.to_string())
}

/// Maps a non-success response to an error. Throttling and gateway errors
/// are transient and count as unreachable.
fn classify(status: StatusCode, body: &str) -> IndexError {
    let reason = error_reason(body);
    match status {
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => IndexError::Unavailable(format!("{status}: {reason}")),
        _ => IndexError::Rejected {
            status: status.as_u16(),
            reason,
        },
    }
}

fn error_type(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json["error"]["type"].as_str().map(str::to_string)
}

/// Pulls `error.reason` out of an OpenSearch error body, falling back to the
/// (truncated) raw body.
fn error_reason(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["error"]["reason"].as_str().map(str::to_string));
    parsed.unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> OpenSearchClient {
        OpenSearchClient::new(&OpenSearchConfig {
            url: url.to_string(),
            ..OpenSearchConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn url_percent_encodes_segments() {
        let client = client("http://localhost:9200");
        let url = client.url(&["player", "_doc", "a/b c"]);
        assert_eq!(url.as_str(), "http://localhost:9200/player/_doc/a%2Fb%20c");
    }

    #[tokio::test]
    async fn dot_segment_ids_are_rejected_without_a_request() {
        // Nothing listens on port 9; a sent request would be a connectivity error.
        let client = client("http://127.0.0.1:9");
        let body = Row::new();
        for id in ["", ".", ".."] {
            let err = client.upsert_document("player", id, &body).await.unwrap_err();
            assert!(matches!(err, IndexError::Rejected { status: 400, .. }), "{id:?}");
            let err = client.delete_document("player", id).await.unwrap_err();
            assert!(!err.is_connectivity(), "{id:?}");
        }
        assert!(client.doc_url("player", "...").is_ok());
    }

    #[test]
    fn url_keeps_base_path_prefix() {
        let client = client("http://proxy.local/search/");
        let url = client.url(&["club"]);
        assert_eq!(url.as_str(), "http://proxy.local/search/club");
    }

    #[test]
    fn rejects_non_base_url() {
        let result = OpenSearchClient::new(&OpenSearchConfig {
            url: "mailto:ops@example.com".to_string(),
            ..OpenSearchConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn detects_already_exists_error() {
        let body = r#"{"error":{"type":"resource_already_exists_exception","reason":"index [player/abc] already exists"},"status":400}"#;
        assert_eq!(error_type(body).as_deref(), Some(ALREADY_EXISTS));
        assert_eq!(error_reason(body), "index [player/abc] already exists");
    }

    #[test]
    fn throttling_and_gateway_errors_are_connectivity() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ] {
            assert!(classify(status, "").is_connectivity(), "{status}");
        }
    }

    #[test]
    fn mapping_errors_are_rejections() {
        let body = r#"{"error":{"type":"mapper_parsing_exception","reason":"failed to parse field [location]"}}"#;
        match classify(StatusCode::BAD_REQUEST, body) {
            IndexError::Rejected { status, reason } => {
                assert_eq!(status, 400);
                assert_eq!(reason, "failed to parse field [location]");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn non_json_error_body_is_truncated() {
        let body = "x".repeat(500);
        assert_eq!(error_reason(&body).len(), 200);
    }

    #[tokio::test]
    async fn unreachable_backend_is_connectivity_failure() {
        // Port 9 (discard) on localhost is reliably closed in test sandboxes.
        let client = OpenSearchClient::new(&OpenSearchConfig {
            url: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_secs(2),
            ..OpenSearchConfig::default()
        })
        .unwrap();
        let err = client.delete_document("player", "1").await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
