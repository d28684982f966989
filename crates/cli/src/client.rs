//! HTTP client for the agent API

use anyhow::{Context, Result};
use enose_lib::{ArtifactInfo, DetectionReport, DetectionRequest, RunnerStatus};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// Reply to a successful detection start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Started {
    pub id: u64,
}

/// Result of a model directory rescan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadSummary {
    pub loaded: Vec<String>,
    pub rejected: Vec<RejectedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedEntry {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Client for a running agent
pub struct AgentClient {
    client: Client,
    base_url: Url,
}

impl AgentClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(path).context("Invalid path")?;
        Ok(self.client.request(method, url))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.context("Failed to reach agent")?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        anyhow::bail!("Agent error ({}): {}", status, message)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path)?).await?;
        response.json().await.context("Failed to parse response")
    }

    pub async fn status(&self) -> Result<RunnerStatus> {
        self.get("v1/status").await
    }

    pub async fn models(&self) -> Result<Vec<ArtifactInfo>> {
        self.get("v1/models").await
    }

    pub async fn reload_models(&self) -> Result<ReloadSummary> {
        let response = self
            .send(self.request(Method::POST, "v1/models/reload")?)
            .await?;
        response.json().await.context("Failed to parse response")
    }

    pub async fn start(&self, request: &DetectionRequest, restart: bool) -> Result<Started> {
        let path = if restart {
            "v1/detections?restart=true"
        } else {
            "v1/detections"
        };
        let response = self
            .send(self.request(Method::POST, path)?.json(request))
            .await?;
        response.json().await.context("Failed to parse response")
    }

    pub async fn cancel(&self) -> Result<()> {
        self.send(self.request(Method::DELETE, "v1/detections/current")?)
            .await?;
        Ok(())
    }

    pub async fn stop(&self) -> Result<DetectionReport> {
        let response = self
            .send(self.request(Method::POST, "v1/detections/current/stop")?)
            .await?;
        response.json().await.context("Failed to parse response")
    }

    /// `None` when no detection has completed yet
    pub async fn latest(&self) -> Result<Option<DetectionReport>> {
        let response = self
            .request(Method::GET, "v1/detections/latest")?
            .send()
            .await
            .context("Failed to reach agent")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("Agent error ({})", response.status());
        }
        response
            .json()
            .await
            .map(Some)
            .context("Failed to parse response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enose_lib::session::SessionState;
    use enose_lib::EnsembleOutcome;

    #[tokio::test]
    async fn test_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"state": "collecting", "generation": 3, "samples": 42, "rejected": 1,
                    "environment": {"temperature_c": 24.5, "humidity_pct": 61.0, "pressure_hpa": 1009.2},
                    "models": ["knn.json"], "window_secs": 15.0}"#,
            )
            .create_async()
            .await;

        let client = AgentClient::new(&server.url()).unwrap();
        let status = client.status().await.unwrap();
        assert_eq!(status.state, SessionState::Collecting);
        assert_eq!(status.samples, 42);
        assert_eq!(status.environment.unwrap().humidity_pct, 61.0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_start_conflict_surfaces_agent_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/detections")
            .with_status(409)
            .with_body(r#"{"error": "a detection window is already collecting"}"#)
            .create_async()
            .await;

        let client = AgentClient::new(&server.url()).unwrap();
        let err = client
            .start(&DetectionRequest::default(), false)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("409"));
        assert!(message.contains("already collecting"));
    }

    #[tokio::test]
    async fn test_start_sends_request_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/detections")
            .match_query(mockito::Matcher::UrlEncoded("restart".into(), "true".into()))
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"duration_secs": 20.0, "whitelist": ["knn.json"]}"#.to_string(),
            ))
            .with_status(202)
            .with_body(r#"{"id": 7}"#)
            .create_async()
            .await;

        let client = AgentClient::new(&server.url()).unwrap();
        let request = DetectionRequest {
            duration_secs: Some(20.0),
            whitelist: Some(vec!["knn.json".to_string()]),
        };
        assert_eq!(client.start(&request, true).await.unwrap().id, 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_latest() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/detections/latest")
            .with_status(404)
            .with_body(r#"{"error": "no detection has completed yet"}"#)
            .create_async()
            .await;

        let client = AgentClient::new(&server.url()).unwrap();
        assert!(client.latest().await.unwrap().is_none());
        mock.assert_async().await;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/detections/latest")
            .with_status(200)
            .with_body(
                r#"{"id": 2, "started_at": 1700000000, "finished_at": 1700000015,
                    "samples_accepted": 30, "samples_rejected": 0,
                    "outcome": {"status": "consensus", "label": "Halal", "confidence": 48.0,
                                "votes": [{"model": "a.json", "label": "Halal", "confidence": 80.0}]}}"#,
            )
            .create_async()
            .await;
        let client = AgentClient::new(&server.url()).unwrap();
        let report = client.latest().await.unwrap().unwrap();
        assert_eq!(report.id, 2);
        match report.outcome {
            EnsembleOutcome::Consensus(result) => assert_eq!(result.label, "Halal"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_not_collecting() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/v1/detections/current")
            .with_status(404)
            .with_body(r#"{"error": "no detection window is collecting"}"#)
            .create_async()
            .await;

        let client = AgentClient::new(&server.url()).unwrap();
        assert!(client.cancel().await.is_err());
    }
}
