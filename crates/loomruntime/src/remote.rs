use crate::request::RunRequest;
use async_trait::async_trait;
use loomcore::{NodeRunResult, RunOutcome, RunStatus};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Bound on the single remote attempt; the old behavior of waiting
/// indefinitely fed nothing into the fallback path.
pub const DEFAULT_RUNNER_TIMEOUT: Duration = Duration::from_secs(30);

/// Internal classification of a failed remote call
///
/// Never surfaced to callers; it is the trigger condition for the
/// fallback simulator. The reason string ends up as diagnostic context
/// on the persisted execution record.
#[derive(Debug, Clone, Error)]
#[error("execution runtime unavailable: {reason}")]
pub struct RemoteUnavailable {
    pub reason: String,
}

impl RemoteUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Seam for the outbound run call
#[async_trait]
pub trait RemoteRunner: Send + Sync {
    async fn run(&self, request: &RunRequest) -> Result<RunOutcome, RemoteUnavailable>;
}

/// HTTP client for the external execution runtime
///
/// Exactly one attempt per run request; no retries. Connection failures,
/// non-2xx statuses, and unparseable bodies are classified uniformly.
pub struct HttpRunner {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRunner {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, DEFAULT_RUNNER_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Response shape of `POST /run`
#[derive(Debug, Deserialize)]
struct RunResponse {
    status: String,
    #[serde(default)]
    nodes: Vec<NodeRunResult>,
    #[serde(default)]
    total_time: f64,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl RemoteRunner for HttpRunner {
    async fn run(&self, request: &RunRequest) -> Result<RunOutcome, RemoteUnavailable> {
        let url = format!("{}/run", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| RemoteUnavailable::new(format!("request failed: {e}")))?;

        let http_status = response.status();
        if !http_status.is_success() {
            return Err(RemoteUnavailable::new(format!(
                "runtime returned {http_status}"
            )));
        }

        let body: RunResponse = response
            .json()
            .await
            .map_err(|e| RemoteUnavailable::new(format!("malformed response body: {e}")))?;

        let status = match body.status.as_str() {
            "success" => RunStatus::Success,
            "error" => RunStatus::Error,
            other => {
                return Err(RemoteUnavailable::new(format!(
                    "unexpected run status '{other}'"
                )))
            }
        };

        Ok(RunOutcome {
            status,
            nodes: body.nodes,
            total_time_seconds: body.total_time,
            error: body.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestWorkflow, RunRequest};

    fn empty_request() -> RunRequest {
        RunRequest {
            workflow: RequestWorkflow {
                nodes: Vec::new(),
                connections: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn refused_connection_is_classified_as_unavailable() {
        // Port 1 is never listening; the connect fails immediately.
        let runner = HttpRunner::with_timeout("http://127.0.0.1:1", Duration::from_secs(2));
        let err = runner.run(&empty_request()).await.unwrap_err();
        assert!(err.reason.contains("request failed"));
    }

    #[test]
    fn endpoint_is_normalized() {
        let runner = HttpRunner::new("http://runner.local:8000/");
        assert_eq!(runner.endpoint(), "http://runner.local:8000");
    }
}
