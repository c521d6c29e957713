use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::completion::{CompletionRequest, CompletionService, EventStream};
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{ChatCompletion, ChatCompletionRequest, Turn};

/// The default OpenAI API base URL.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";

/// The environment variable consulted when no API key is given.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the OpenAI chat completions API.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    completions_url: Url,
    timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl OpenAi {
    /// Create a new OpenAI client.
    ///
    /// The API key can be provided directly or read from the OPENAI_API_KEY environment
    /// variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_ENV).map_err(|_| {
                Error::authentication(format!(
                    "API key not provided and {API_KEY_ENV} environment variable not set"
                ))
            })?,
        };
        validate_api_key(&api_key)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url).map_err(|e| {
            Error::url(format!("Invalid base URL {base_url:?}: {e}"), Some(e))
        })?;
        let completions_url = base_url.join("chat/completions")?;

        Ok(Self {
            api_key,
            client,
            base_url,
            completions_url,
            timeout,
            logger: None,
        })
    }

    /// Send every response and stream event to `logger`.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Replace the API key used for subsequent requests.
    pub fn set_api_key(&mut self, api_key: impl Into<String>) -> Result<()> {
        let api_key = api_key.into();
        validate_api_key(&api_key)?;
        self.api_key = api_key;
        Ok(())
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self, stream: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };
        error_from_body(status_code, retry_after, &error_body)
    }

    /// POST `body` to the chat completions endpoint and check the status.
    async fn post(&self, body: &ChatCompletionRequest) -> Result<Response> {
        CLIENT_REQUESTS.click();
        tracing::debug!(
            url = %self.completions_url,
            model = %body.model,
            messages = body.messages.len(),
            stream = body.stream,
            "sending chat completion request"
        );
        let start = Instant::now();
        let response = self
            .client
            .post(self.completions_url.clone())
            .headers(self.default_headers(body.stream)?)
            .json(body)
            .send()
            .await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let response = response.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            if e.is_timeout() {
                Error::timeout(
                    format!("Request timed out: {}", e),
                    Some(self.timeout.as_secs_f64()),
                )
            } else if e.is_connect() {
                Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
            } else {
                Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
            }
        })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::debug!(error = %err, "chat completion request failed");
            return Err(err);
        }
        Ok(response)
    }

    /// Send a request and get a non-streaming response.
    pub async fn send(&self, mut body: ChatCompletionRequest) -> Result<ChatCompletion> {
        body.stream = false;
        let response = self.post(&body).await?;
        let completion = response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })?;
        if let Some(logger) = &self.logger {
            logger.log_response(&completion);
        }
        Ok(completion)
    }

    /// Send a request and get a streaming response.
    ///
    /// Returns a stream of events that can be processed incrementally.
    pub async fn stream(&self, mut body: ChatCompletionRequest) -> Result<EventStream> {
        body.stream = true;
        let response = self.post(&body).await?;
        let events = process_sse(response.bytes_stream());
        match self.logger.clone() {
            Some(logger) => Ok(Box::pin(events.inspect(move |event| {
                if let Ok(event) = event {
                    logger.log_stream_event(event);
                }
            }))),
            None => Ok(Box::pin(events)),
        }
    }
}

impl fmt::Debug for OpenAi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAi")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

#[async_trait::async_trait]
impl CompletionService for OpenAi {
    async fn complete(&self, request: CompletionRequest) -> Result<Turn> {
        self.send(request.into_wire(false)).await?.into_turn()
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<EventStream> {
        self.stream(request.into_wire(true)).await
    }

    fn set_api_key(&mut self, api_key: &str) -> Result<()> {
        OpenAi::set_api_key(self, api_key)
    }
}

fn validate_api_key(api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(Error::authentication("API key is empty"));
    }
    Ok(())
}

/// Map an error status and its body onto the error variants.
fn error_from_body(status_code: u16, retry_after: Option<u64>, body: &str) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        param: Option<String>,
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error);
    let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
    let error_param = detail.as_ref().and_then(|e| e.param.clone());
    let error_message = detail
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status_code {
        400 => Error::bad_request(error_message, error_param),
        401 => Error::authentication(error_message),
        403 => Error::permission(error_message),
        404 => Error::not_found(error_message),
        408 => Error::timeout(error_message, None),
        429 => Error::rate_limit(error_message, retry_after),
        500 => Error::internal_server(error_message),
        502..=504 => Error::service_unavailable(error_message, retry_after),
        _ => Error::api(status_code, error_type, error_message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = OpenAi::new(Some("test-key".to_string())).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url.as_str(), DEFAULT_API_URL);
        assert_eq!(
            client.completions_url.as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);

        let client = OpenAi::with_options(
            Some("test-key".to_string()),
            Some("http://localhost:8080/v1".to_string()),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(
            client.completions_url.as_str(),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn bad_settings_are_rejected() {
        assert!(OpenAi::new(Some("  ".to_string())).unwrap_err().is_authentication());
        let err = OpenAi::with_options(Some("k".to_string()), Some("not a url".to_string()), None)
            .unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn debug_redacts_key() {
        let client = OpenAi::new(Some("sk-secret".to_string())).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn set_api_key_replaces_credential() {
        let mut client = OpenAi::new(Some("old".to_string())).unwrap();
        client.set_api_key("new").unwrap();
        assert_eq!(client.api_key, "new");
        assert!(client.set_api_key("").is_err());
        assert_eq!(client.api_key, "new");
        let headers = client.default_headers(true).unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer new");
        assert_eq!(headers[header::ACCEPT], "text/event-stream");
    }

    #[test]
    fn error_bodies_map_to_variants() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","param":null,"code":"invalid_api_key"}}"#;
        let err = error_from_body(401, None, body);
        assert!(err.is_authentication());
        assert!(err.to_string().contains("Incorrect API key provided"));

        let body = r#"{"error":{"message":"bad temperature","type":"invalid_request_error","param":"temperature"}}"#;
        match error_from_body(400, None, body) {
            Error::BadRequest { message, param } => {
                assert_eq!(message, "bad temperature");
                assert_eq!(param.as_deref(), Some("temperature"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = error_from_body(429, Some(7), r#"{"error":{"message":"slow down"}}"#);
        assert!(err.is_rate_limit());
        assert!(err.is_retryable());

        assert!(matches!(
            error_from_body(503, None, "upstream down"),
            Error::ServiceUnavailable { .. }
        ));
        match error_from_body(418, None, "teapot") {
            Error::Api {
                status_code,
                message,
                ..
            } => {
                assert_eq!(status_code, 418);
                assert_eq!(message, "teapot");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore] // requires a real API key
    async fn live_stream() {
        let Ok(api_key) = env::var(API_KEY_ENV) else {
            println!("Skipping live_stream: {API_KEY_ENV} not set");
            return;
        };
        let client = OpenAi::new(Some(api_key)).unwrap();
        let request = CompletionRequest::new(
            vec![Turn::user("Reply with the single word: hello")],
            crate::types::Model::default(),
            0.0,
        );
        let mut stream = client.stream_complete(request).await.unwrap();
        let mut received = false;
        while let Some(event) = stream.next().await {
            println!("Received event: {:?}", event.unwrap());
            received = true;
        }
        assert!(received, "Expected to receive some streaming events");
    }
}
