//! HTTP client for the analysis backend.

use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde_json::{Value, json};

/// Errors that can happen outside of a tool call.
///
/// Tool calls themselves never fail, see [`HttpToolBackend::call`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The configured base URL can't carry a path.
    #[error("invalid analysis backend URL `{0}`")]
    InvalidBaseUrl(String),
    /// The request failed or the backend answered with an error status.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// A client of the analysis backend, one HTTP request per tool call.
///
/// Cloning is cheap, clones share the same connection pool.
#[derive(Clone, Debug)]
pub struct HttpToolBackend {
    client: Client,
    base_url: Url,
}

impl HttpToolBackend {
    /// Creates a client of the backend at `base_url`.
    ///
    /// `timeout` bounds every request, from connecting until the body has
    /// been read.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let parsed = Url::parse(base_url)
            .map_err(|_| BackendError::InvalidBaseUrl(base_url.to_owned()))?;
        if parsed.cannot_be_a_base() {
            return Err(BackendError::InvalidBaseUrl(base_url.to_owned()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    /// Invokes a tool and returns its payload.
    ///
    /// This never fails. A body that isn't JSON is wrapped as
    /// `{"result": "<body>"}`, and a failed request (refused, timed out, or
    /// answered with an error status) becomes `{"error": "<message>"}`.
    pub async fn call(&self, tool: &str, arguments: &Value) -> Value {
        let url = self.url(&["tools", tool]);
        trace!("calling tool at {url}: {arguments}");

        let body = match self.post(url, arguments).await {
            Ok(body) => body,
            Err(err) => {
                warn!("tool `{tool}` failed: {err}");
                return json!({ "error": err.to_string() });
            }
        };
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) => {
                debug!("tool `{tool}` returned a non-JSON body");
                json!({ "result": body })
            }
        }
    }

    /// Fetches the analysis status of a job.
    pub async fn status(&self, job_id: &str) -> Result<Value, BackendError> {
        let url = self.url(&["status", job_id]);
        trace!("fetching status at {url}");
        let value = self
            .client
            .get(url)
            .send()
            .await
            .and_then(Response::error_for_status)?
            .json()
            .await?;
        Ok(value)
    }

    async fn post(&self, url: Url, arguments: &Value) -> reqwest::Result<String> {
        self.client
            .post(url)
            .json(arguments)
            .send()
            .await
            .and_then(Response::error_for_status)?
            .text()
            .await
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
