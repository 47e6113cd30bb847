//! Reply generation through the Gemini `generateContent` API.

use serde::{Deserialize, Serialize};
use taffy_core::{Role, Turn};
use taffy_providers::{BoxFuture, ProviderError, ProviderResult};
use tracing::{debug, warn};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

pub const NOT_CONFIGURED_REPLY: &str = "Sorry, my connection to Google AI is not configured.";
pub const ERROR_REPLY: &str = "Sorry, I encountered an error trying to understand that.";

const SYSTEM_INSTRUCTION: &str = "You are Taffy, a friendly and helpful scheduling assistant.
Your primary function is to help users schedule events and tasks in their Google Calendar.
Be concise and confirm scheduling requests clearly.
If a user asks you to schedule something, acknowledge it and indicate you will attempt to add it to their calendar.
If the request is unclear (e.g., missing date/time), ask for clarification.
Keep responses relatively short and focused on the scheduling task or casual conversation.";

/// Produces the assistant's conversational reply.
///
/// Never fails: implementations answer with a fixed apology instead.
pub trait ReplyGenerator: Send + Sync {
    fn generate<'a>(&'a self, input: &'a str, history: &'a [Turn]) -> BoxFuture<'a, String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn text(role: Option<&'static str>, text: &'a str) -> Self {
        Self {
            role,
            parts: vec![Part { text }],
        }
    }
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 1,
            top_p: 1.0,
            max_output_tokens: 256,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

/// Gemini-backed [`ReplyGenerator`].
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(http_client: reqwest::Client, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn request(&self, api_key: &str, input: &str, history: &[Turn]) -> ProviderResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let mut contents: Vec<Content<'_>> = history
            .iter()
            .map(|turn| Content::text(Some(role_name(turn.role)), &turn.text))
            .collect();
        contents.push(Content::text(Some("user"), input));

        let body = GenerateRequest {
            system_instruction: Content::text(None, SYSTEM_INSTRUCTION),
            contents,
            generation_config: GenerationConfig::default(),
        };

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()).with_source(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_api_status(status.as_u16(), text).with_provider("gemini"));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();
        Ok(text)
    }
}

impl ReplyGenerator for GeminiClient {
    fn generate<'a>(&'a self, input: &'a str, history: &'a [Turn]) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let Some(api_key) = self.api_key.as_deref() else {
                return NOT_CONFIGURED_REPLY.to_string();
            };

            debug!(model = %self.model, turns = history.len(), "requesting reply");
            match self.request(api_key, input, history).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "reply generation failed");
                    ERROR_REPLY.to_string()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(reqwest::Client::new(), Some("gem-key".to_string()), "gemini-2.0-flash")
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn reply_joins_first_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(query_param("key", "gem-key"))
            .and(body_partial_json(json!({
                "contents": [
                    {"role": "model", "parts": [{"text": "Hello!"}]},
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "user", "parts": [{"text": "book lunch"}]}
                ],
                "generationConfig": {"topK": 1, "maxOutputTokens": 256}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [
                    {"content": {"role": "model", "parts": [{"text": "Sure, "}, {"text": "booking it."}]}},
                    {"content": {"role": "model", "parts": [{"text": "ignored"}]}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let history = vec![
            Turn { role: Role::Model, text: "Hello!".to_string() },
            Turn { role: Role::User, text: "hi".to_string() },
        ];
        let reply = client(&server).generate("book lunch", &history).await;
        assert_eq!(reply, "Sure, booking it.");
    }

    #[tokio::test]
    async fn system_instruction_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_partial_json(json!({
                "systemInstruction": {"parts": [{"text": SYSTEM_INSTRUCTION}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(client(&server).generate("hi", &[]).await, "");
    }

    #[tokio::test]
    async fn http_error_becomes_apology() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        assert_eq!(client(&server).generate("hi", &[]).await, ERROR_REPLY);
    }

    #[tokio::test]
    async fn missing_key_never_calls_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = GeminiClient::new(reqwest::Client::new(), Some(String::new()), "gemini-2.0-flash")
            .with_base_url(server.uri());
        assert!(!client.is_configured());
        assert_eq!(client.generate("hi", &[]).await, NOT_CONFIGURED_REPLY);
    }
}
