//! Model-service client for structured completions.

use crate::error::{Error, Result};
use crate::schema::ExtractionSchema;
use crate::types::{StructuredCompletion, TokenUsage};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default model identifier for a run.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Builder for constructing a [`Client`].
pub struct ClientBuilder {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    user_agent_suffix: Option<String>,
}

impl ClientBuilder {
    /// Create a new client builder with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent_suffix: None,
        }
    }

    /// Set the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model identifier used for every call of the run.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent suffix.
    pub fn user_agent_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.user_agent_suffix = Some(suffix.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client> {
        if self.api_key.is_empty() {
            return Err(Error::Config("API key is required".into()));
        }

        // Warn about insecure connections
        if !self.base_url.starts_with("https://") {
            warn!(
                base_url = %self.base_url,
                "API base URL is not using HTTPS. This is insecure."
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(Error::Http)?;

        let mut user_agent = format!("fieldwise/{}", env!("CARGO_PKG_VERSION"));
        if let Some(suffix) = self.user_agent_suffix {
            user_agent.push(' ');
            user_agent.push_str(&suffix);
        }

        Ok(Client {
            api_key: self.api_key,
            base_url: self.base_url,
            model: self.model,
            http_client,
            user_agent,
        })
    }
}

/// Client for an OpenAI-compatible chat-completions endpoint.
///
/// One instance serves a whole run: it carries the credential, the endpoint,
/// and the fixed model identifier. There is no retry and no caching; a failed
/// call surfaces as an error and aborts the run.
///
/// # Example
///
/// ```rust,no_run
/// use fieldwise::{Client, ExtractionSchema, FieldSpec};
///
/// #[tokio::main]
/// async fn main() -> Result<(), fieldwise::Error> {
///     let client = Client::builder("your-api-key").build()?;
///
///     let schema = ExtractionSchema::new(
///         "invoice data",
///         vec![FieldSpec::parse("invoice_id", "str", "invoice number")],
///     )?;
///
///     let result = client
///         .extract(&schema, "Invoice #123 due March 1, amount $50")
///         .await?;
///
///     println!("{:?}", result.record);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Client {
    api_key: String,
    base_url: String,
    model: String,
    http_client: reqwest::Client,
    user_agent: String,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// The model identifier every call of this run uses.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one structured completion over `text`, forced into the schema's
    /// shape, and return the parsed record plus token usage.
    pub async fn extract(
        &self,
        schema: &ExtractionSchema,
        text: &str,
    ) -> Result<StructuredCompletion> {
        let system = format!(
            "I'm going to ask for {}. Use {} to parse this data.",
            schema.description(),
            schema.name()
        );
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            functions: vec![FunctionSpec {
                name: schema.name(),
                description: schema.description(),
                parameters: schema.parameters(),
            }],
            function_call: FunctionTarget {
                name: schema.name(),
            },
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = match self
            .http_client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(Error::Timeout),
            Err(e) => return Err(Error::Http(e)),
        };

        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        let completion: ChatResponse = response.json().await.map_err(Error::Http)?;
        let usage = completion
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let arguments = completion
            .choices
            .into_iter()
            .find_map(|choice| choice.message.function_call)
            .ok_or_else(|| {
                Error::MalformedResponse("response carries no function call".into())
            })?
            .arguments;
        let arguments: Value = serde_json::from_str(&arguments).map_err(|e| {
            Error::MalformedResponse(format!("function arguments are not valid JSON: {}", e))
        })?;

        let record = schema.parse_record(&arguments)?;
        Ok(StructuredCompletion { record, usage })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| Error::Config("API key contains invalid header characters".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|_| Error::Config("invalid User-Agent suffix".into()))?,
        );
        Ok(headers)
    }
}

// === Wire format ===

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    functions: Vec<FunctionSpec<'a>>,
    function_call: FunctionTarget<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct FunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: Value,
}

#[derive(Serialize)]
struct FunctionTarget<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    function_call: Option<FunctionCallBody>,
}

#[derive(Deserialize)]
struct FunctionCallBody {
    arguments: String,
}

#[derive(Deserialize)]
struct UsageBody {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldSpec;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn schema() -> ExtractionSchema {
        ExtractionSchema::new(
            "invoice data",
            vec![FieldSpec::parse("invoice_id", "str", "invoice number")],
        )
        .unwrap()
    }

    #[test]
    fn test_build_requires_api_key() {
        let err = Client::builder("").build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_extract_parses_forced_function_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "function_call": {
                            "name": "extract_record",
                            "arguments": "{\"invoice_id\": \"123\"}"
                        }
                    }
                }],
                "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::builder("test-key")
            .base_url(server.uri())
            .build()
            .unwrap();
        let result = client.extract(&schema(), "Invoice #123").await.unwrap();

        assert_eq!(result.record["invoice_id"], json!("123"));
        assert_eq!(result.usage.prompt_tokens, 100);
        assert_eq!(result.usage.completion_tokens, 20);
    }

    #[tokio::test]
    async fn test_extract_maps_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&server)
            .await;

        let client = Client::builder("bad-key")
            .base_url(server.uri())
            .build()
            .unwrap();
        let err = client.extract(&schema(), "text").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_extract_without_function_call_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "plain text"}}],
                "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
            })))
            .mount(&server)
            .await;

        let client = Client::builder("test-key")
            .base_url(server.uri())
            .build()
            .unwrap();
        let err = client.extract(&schema(), "text").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }
}
