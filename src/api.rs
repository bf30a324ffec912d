// API client module: a small blocking HTTP client that talks to an
// OpenAI-compatible chat completions endpoint. The rest of the crate only
// sees the `CompletionService` trait, so the interactive loop can be driven
// by a scripted service in tests.

use crate::config::AnalyzerConfig;
use crate::error::{ConfigError, ServiceError};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One request to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Anything that can turn a prompt into generated text.
pub trait CompletionService {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError>;
}

impl<T: CompletionService + ?Sized> CompletionService for &T {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        (**self).complete(request)
    }
}

/// Blocking client for `POST {base_url}/chat/completions`.
///
/// Holds the API key; deliberately not `Debug`.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Create a client from the startup configuration. The configured
    /// timeout bounds every request.
    pub fn new(config: &AnalyzerConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;
        Ok(OpenAiClient {
            client,
            url: config.completions_url(),
            api_key: config.api_key.clone(),
        })
    }
}

impl CompletionService for OpenAiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let body = ChatCompletionRequest::from(request);
        let started = Instant::now();
        debug!(url = %self.url, model = %request.model, "sending completion request");

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(map_transport_error)?;

        let status = res.status();
        let retry_after = parse_retry_after(res.headers());
        let text = res.text().map_err(map_transport_error)?;
        info!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "completion request finished"
        );

        if !status.is_success() {
            let err = map_http_error(status, &text, retry_after);
            warn!(error = %err, "completion request failed");
            return Err(err);
        }
        extract_text(&text)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a CompletionRequest> for ChatCompletionRequest<'a> {
    fn from(req: &'a CompletionRequest) -> Self {
        ChatCompletionRequest {
            model: &req.model,
            messages: [
                ChatMessage { role: "system", content: &req.system },
                ChatMessage { role: "user", content: &req.prompt },
            ],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Pull `choices[0].message.content` out of a successful response body.
fn extract_text(body: &str) -> Result<String, ServiceError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::MalformedResponse(format!("invalid JSON: {}", e)))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ServiceError::MalformedResponse("response contained no text".into()))
}

fn map_transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else if err.is_decode() {
        ServiceError::MalformedResponse(err.to_string())
    } else {
        ServiceError::Network(err.to_string())
    }
}

fn map_http_error(status: StatusCode, body: &str, retry_after: Option<Duration>) -> ServiceError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ServiceError::Timeout,
        _ => ServiceError::Upstream {
            status: status.as_u16(),
            message,
        },
    }
}

// Only the delay-seconds form; HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value: &HeaderValue = headers.get(RETRY_AFTER)?;
    value
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn sample_request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4".into(),
            system: "You are a scholar.".into(),
            prompt: "Analyze this.".into(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    #[test]
    fn request_body_has_system_and_user_messages() {
        let req = sample_request();
        let json = serde_json::to_value(ChatCompletionRequest::from(&req)).unwrap();

        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "You are a scholar.");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "Analyze this.");
        let temp = json["temperature"].as_f64().unwrap();
        assert!((temp - 0.7).abs() < 1e-6);
    }

    #[test]
    fn extracts_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"KEY SYMBOLS: light"}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "KEY SYMBOLS: light");
    }

    #[test]
    fn empty_choices_are_malformed() {
        let err = extract_text(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
    }

    #[test]
    fn null_content_is_malformed() {
        let err = extract_text(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = extract_text("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
    }

    #[test]
    fn unauthorized_maps_to_auth_with_api_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        match map_http_error(StatusCode::UNAUTHORIZED, body, None) {
            ServiceError::Auth(msg) => assert_eq!(msg, "Incorrect API key provided"),
            other => panic!("expected Auth, got {:?}", other),
        }
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        let err = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            "{}",
            Some(Duration::from_secs(5)),
        );
        match err {
            ServiceError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(5)))
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn forbidden_maps_to_auth() {
        let err = map_http_error(StatusCode::FORBIDDEN, "no access", None);
        assert!(matches!(err, ServiceError::Auth(ref m) if m == "no access"), "{:?}", err);
    }

    #[test]
    fn gateway_and_request_timeouts_map_to_timeout() {
        for status in [StatusCode::GATEWAY_TIMEOUT, StatusCode::REQUEST_TIMEOUT] {
            let err = map_http_error(status, "", None);
            assert!(matches!(err, ServiceError::Timeout), "{}: {:?}", status, err);
        }
    }

    #[test]
    fn other_statuses_map_to_upstream_with_raw_body() {
        match map_http_error(StatusCode::INTERNAL_SERVER_ERROR, "  boom  ", None) {
            ServiceError::Upstream { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[test]
    fn retry_after_seconds_are_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn unreachable_host_is_a_network_error() {
        let mut config = AnalyzerConfig::new("sk-test");
        // nothing listens on the discard port
        config.base_url = "http://127.0.0.1:9".into();
        config.timeout = Duration::from_secs(5);
        let client = OpenAiClient::new(&config).unwrap();

        let err = client.complete(&sample_request()).unwrap_err();
        assert!(matches!(err, ServiceError::Network(_)), "{:?}", err);
    }

    #[test]
    fn silent_server_is_reported_as_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        // accept, then hold the connection open without answering
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                thread::sleep(Duration::from_secs(3));
                drop(stream);
            }
        });

        let mut config = AnalyzerConfig::new("sk-test");
        config.base_url = format!("http://{}", addr);
        config.timeout = Duration::from_millis(200);
        let client = OpenAiClient::new(&config).unwrap();

        let err = client.complete(&sample_request()).unwrap_err();
        assert!(matches!(err, ServiceError::Timeout), "{:?}", err);
    }
}
