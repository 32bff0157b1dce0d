//! Resolution of model tool calls against an external HTTP service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

pub const DEFAULT_FALLBACK_TEXT: &str = "No response from API";

/// Failure modes of a single tool resolution attempt.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("tool endpoint returned status {0}")]
    Status(u16),
    #[error("tool endpoint response has no `body.assistantResponse`")]
    MissingResponse,
}

/// Resolves one function call requested by the model.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Performs a single attempt; no retries.
    async fn invoke(&self, function_name: &str, arguments_json: &str) -> Result<String, ToolError>;
}

/// Invokes the tool and substitutes `fallback` for any failure, so the
/// conversation can always be resumed.
pub async fn resolve_or_fallback(
    invoker: &dyn ToolInvoker,
    function_name: &str,
    arguments_json: &str,
    fallback: &str,
) -> String {
    match invoker.invoke(function_name, arguments_json).await {
        Ok(text) => text,
        Err(e) => {
            warn!(function_name, error = %e, "Tool invocation failed, using fallback text");
            fallback.to_string()
        }
    }
}

#[derive(Serialize)]
struct ToolRequest<'a> {
    twilio: ToolCallBody<'a>,
}

#[derive(Serialize)]
struct ToolCallBody<'a> {
    function_name: &'a str,
    arguments: &'a str,
}

#[derive(Deserialize)]
struct ToolResponse {
    body: Option<ToolResponseBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponseBody {
    assistant_response: Option<String>,
}

/// A `ToolInvoker` that POSTs each call to a fixed endpoint.
pub struct HttpToolInvoker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpToolInvoker {
    /// Creates an invoker for `endpoint` with a per-request `timeout`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(&self, function_name: &str, arguments_json: &str) -> Result<String, ToolError> {
        info!(function_name, endpoint = %self.endpoint, "Calling tool endpoint");
        let request = ToolRequest {
            twilio: ToolCallBody {
                function_name,
                arguments: arguments_json,
            },
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status(status.as_u16()));
        }

        let parsed: ToolResponse = response.json().await?;
        parsed
            .body
            .and_then(|body| body.assistant_response)
            .ok_or(ToolError::MissingResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invoker_for(server: &MockServer) -> HttpToolInvoker {
        HttpToolInvoker::new(format!("{}/voicecall", server.uri()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn test_invoke_extracts_assistant_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/voicecall"))
            .and(body_json(json!({
                "twilio": {"function_name": "get_weather", "arguments": "{\"city\":\"Pune\"}"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"body": {"assistantResponse": "Sunny, 30C"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = invoker_for(&server)
            .invoke("get_weather", r#"{"city":"Pune"}"#)
            .await
            .unwrap();
        assert_eq!(result, "Sunny, 30C");
    }

    #[tokio::test]
    async fn test_non_success_status_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let invoker = invoker_for(&server);
        assert!(matches!(
            invoker.invoke("get_weather", "{}").await,
            Err(ToolError::Status(502))
        ));
        let text =
            resolve_or_fallback(&invoker, "get_weather", "{}", DEFAULT_FALLBACK_TEXT).await;
        assert_eq!(text, DEFAULT_FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn test_missing_fields_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"body": {}})))
            .mount(&server)
            .await;

        let invoker = invoker_for(&server);
        assert!(matches!(
            invoker.invoke("get_weather", "{}").await,
            Err(ToolError::MissingResponse)
        ));
        assert_eq!(
            resolve_or_fallback(&invoker, "get_weather", "{}", "no response available").await,
            "no response available"
        );
    }

    #[tokio::test]
    async fn test_absent_or_malformed_body_falls_back() {
        let server = MockServer::start().await;
        Mock::given(path("/voicecall"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;
        let invoker = invoker_for(&server);
        assert!(matches!(
            invoker.invoke("get_weather", "{}").await,
            Err(ToolError::MissingResponse)
        ));

        server.reset().await;
        Mock::given(path("/voicecall"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;
        assert!(matches!(
            invoker.invoke("get_weather", "{}").await,
            Err(ToolError::Transport(_))
        ));
        assert_eq!(
            resolve_or_fallback(&invoker, "get_weather", "{}", DEFAULT_FALLBACK_TEXT).await,
            DEFAULT_FALLBACK_TEXT
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_back() {
        // Port 9 (discard) on loopback is not expected to accept HTTP.
        let invoker =
            HttpToolInvoker::new("http://127.0.0.1:9/voicecall", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            invoker.invoke("get_weather", "{}").await,
            Err(ToolError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_passes_through_success() {
        let mut mock = MockToolInvoker::new();
        mock.expect_invoke()
            .withf(|name, args| {
                name.to_string() == "get_weather" && args.to_string() == r#"{"city":"Pune"}"#
            })
            .times(1)
            .returning(|_, _| Ok("Sunny, 30C".to_string()));

        let text = resolve_or_fallback(&mock, "get_weather", r#"{"city":"Pune"}"#, "fallback").await;
        assert_eq!(text, "Sunny, 30C");
    }

    #[tokio::test]
    async fn test_resolve_substitutes_fallback_on_error() {
        let mut mock = MockToolInvoker::new();
        mock.expect_invoke()
            .times(1)
            .returning(|_, _| Err(ToolError::Status(500)));

        let text = resolve_or_fallback(&mock, "get_weather", "{}", "fallback").await;
        assert_eq!(text, "fallback");
    }
}
