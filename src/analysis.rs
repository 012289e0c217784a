//! Boundary to the movement-analysis service.
//!
//! The service interprets keypoints; this crate only builds the request and,
//! with `analysis-http`, posts it. The response is passed back opaquely.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::controller::CaptureHandoff;
use crate::pose::NormalizedKeypoint;

/// Body of `POST /analyze_movement`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub session_id: String,
    pub test_id: String,
    pub keypoints: Vec<NormalizedKeypoint>,
}

impl AnalysisRequest {
    /// `session_id` is the analysis service's conversation id, not the
    /// capture session id.
    pub fn from_handoff(session_id: impl Into<String>, handoff: &CaptureHandoff) -> Self {
        Self {
            session_id: session_id.into(),
            test_id: handoff.test_id.clone(),
            keypoints: handoff.keypoints.clone(),
        }
    }
}

pub trait AnalysisClient {
    fn submit(&self, request: &AnalysisRequest) -> Result<serde_json::Value>;
}

#[cfg(feature = "analysis-http")]
pub use http::HttpAnalysisClient;

#[cfg(feature = "analysis-http")]
mod http {
    use std::time::Duration;

    use anyhow::{Context, Result};

    use super::{AnalysisClient, AnalysisRequest};

    pub struct HttpAnalysisClient {
        base_url: String,
        timeout: Duration,
    }

    impl HttpAnalysisClient {
        pub fn new(base_url: impl Into<String>) -> Self {
            Self {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(30),
            }
        }

        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = timeout;
            self
        }

        fn endpoint(&self) -> String {
            format!("{}/analyze_movement", self.base_url)
        }
    }

    impl AnalysisClient for HttpAnalysisClient {
        fn submit(&self, request: &AnalysisRequest) -> Result<serde_json::Value> {
            let url = self.endpoint();
            let body = serde_json::to_string(request).context("encode analysis request")?;
            let response = ureq::post(&url)
                .timeout(self.timeout)
                .set("Content-Type", "application/json")
                .send_string(&body)
                .with_context(|| format!("post analysis request to {}", url))?;
            let text = response
                .into_string()
                .context("read analysis response")?;
            serde_json::from_str(&text).context("decode analysis response")
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn endpoint_ignores_trailing_slash() {
            let client = HttpAnalysisClient::new("http://localhost:8000/");
            assert_eq!(client.endpoint(), "http://localhost:8000/analyze_movement");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handoff() -> CaptureHandoff {
        CaptureHandoff {
            session_id: 4,
            test_id: "shoulder_flexion".to_string(),
            frame_width: 640,
            frame_height: 480,
            keypoints: vec![NormalizedKeypoint {
                x: 0.5,
                y: 0.25,
                score: 0.9,
                name: "nose".to_string(),
            }],
        }
    }

    #[test]
    fn request_matches_service_payload() {
        let request = AnalysisRequest::from_handoff("chat-1", &handoff());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["session_id"], "chat-1");
        assert_eq!(json["test_id"], "shoulder_flexion");
        assert_eq!(json["keypoints"][0]["name"], "nose");
        assert_eq!(json["keypoints"][0]["x"], 0.5);
    }
}
