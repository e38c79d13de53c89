//! kie.ai job-creation client
//!
//! # Request
//!
//! ```text
//! POST {api_base}/api/v1/jobs/createTask
//! Authorization: Bearer <credential>
//!
//! {"model": "<model>", "input": {"video_url": "<url>"}, "callBackUrl": "<callback>"}
//! ```
//!
//! # Acknowledgment
//!
//! A job is accepted only if the status is 2xx, the body reports success
//! (`code == 200` or `status` of `success`/`ok`) and a job id is present at
//! `data.taskId`, `data.task_id` or top-level `taskId`.

use super::{ProviderClient, ProviderError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Default provider endpoint
pub const DEFAULT_API_BASE: &str = "https://api.kie.ai";

/// Default processing model
pub const DEFAULT_MODEL: &str = "sora-watermark-remover";

const CREATE_TASK_PATH: &str = "/api/v1/jobs/createTask";

/// Provider client configuration
#[derive(Debug, Clone)]
pub struct KieConfig {
    pub api_base: String,
    pub model: String,

    /// Where the provider posts the completion notification
    pub callback_url: String,

    /// Bound on the whole request
    pub timeout: Duration,
}

impl KieConfig {
    pub fn new(callback_url: impl Into<String>) -> Self {
        KieConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            callback_url: callback_url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    model: &'a str,
    input: CreateTaskInput<'a>,
    #[serde(rename = "callBackUrl")]
    callback_url: &'a str,
}

#[derive(Serialize)]
struct CreateTaskInput<'a> {
    video_url: &'a str,
}

/// HTTP client for the job-creation endpoint
#[derive(Clone)]
pub struct KieClient {
    client: Client,
    config: KieConfig,
}

impl KieClient {
    pub fn new(config: KieConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(KieClient { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.api_base.trim_end_matches('/'),
            CREATE_TASK_PATH
        )
    }
}

fn classify(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Interprets a job-creation response
///
/// # Errors
///
/// [`ProviderError::Rejected`] for a non-2xx status or a body that does not
/// report success; [`ProviderError::Malformed`] when the body reports success
/// but carries no job id.
pub fn parse_create_response(status: StatusCode, body: &Value) -> Result<String, ProviderError> {
    let message = || {
        body.get("msg")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_string()
    };

    if !status.is_success() {
        return Err(ProviderError::Rejected(format!("HTTP {}: {}", status.as_u16(), message())));
    }

    let code_ok = body.get("code").and_then(Value::as_i64) == Some(200);
    let status_ok = body
        .get("status")
        .and_then(Value::as_str)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "success" | "ok"))
        .unwrap_or(false);
    if !code_ok && !status_ok {
        return Err(ProviderError::Rejected(message()));
    }

    let data = body.get("data");
    [
        data.and_then(|d| d.get("taskId")),
        data.and_then(|d| d.get("task_id")),
        body.get("taskId"),
    ]
    .into_iter()
    .flatten()
    .find_map(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
    .ok_or_else(|| ProviderError::Malformed("success acknowledgment without job id".to_string()))
}

#[async_trait]
impl ProviderClient for KieClient {
    async fn create_job(&self, token: &str, video_url: &str) -> Result<String, ProviderError> {
        let request = CreateTaskRequest {
            model: &self.config.model,
            input: CreateTaskInput { video_url },
            callback_url: &self.config.callback_url,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else if status.is_success() {
                ProviderError::Malformed(e.to_string())
            } else {
                ProviderError::Rejected(format!("HTTP {}", status.as_u16()))
            }
        })?;

        parse_create_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_code_200_with_data_task_id() {
        let body = json!({"code": 200, "msg": "success", "data": {"taskId": "job-42"}});
        assert_eq!(parse_create_response(StatusCode::OK, &body).unwrap(), "job-42");
    }

    #[test]
    fn test_status_ok_with_snake_case_id() {
        let body = json!({"status": "OK", "data": {"task_id": "abc"}});
        assert_eq!(parse_create_response(StatusCode::OK, &body).unwrap(), "abc");
    }

    #[test]
    fn test_top_level_task_id() {
        let body = json!({"status": "success", "taskId": 991});
        assert_eq!(parse_create_response(StatusCode::OK, &body).unwrap(), "991");
    }

    #[test]
    fn test_non_success_code_rejected() {
        let body = json!({"code": 402, "msg": "Insufficient credits", "data": null});
        assert_eq!(
            parse_create_response(StatusCode::OK, &body),
            Err(ProviderError::Rejected("Insufficient credits".to_string()))
        );
    }

    #[test]
    fn test_http_error_rejected_even_with_code_200() {
        let body = json!({"code": 200, "data": {"taskId": "x"}});
        assert!(matches!(
            parse_create_response(StatusCode::INTERNAL_SERVER_ERROR, &body),
            Err(ProviderError::Rejected(_))
        ));
    }

    #[test]
    fn test_success_without_job_id_is_malformed() {
        let body = json!({"code": 200, "data": {}});
        assert!(matches!(
            parse_create_response(StatusCode::OK, &body),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let request = CreateTaskRequest {
            model: DEFAULT_MODEL,
            input: CreateTaskInput {
                video_url: "https://cdn/x.mp4",
            },
            callback_url: "https://bot.example/callback",
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "sora-watermark-remover",
                "input": {"video_url": "https://cdn/x.mp4"},
                "callBackUrl": "https://bot.example/callback"
            })
        );
    }
}
