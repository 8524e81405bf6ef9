//! HTTP draft generator for OpenAI-compatible chat endpoints.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::template::reply_subject;
use super::{DraftContext, DraftGenerator, DraftText};
use crate::error::GenerationError;
use crate::pipeline::types::EmailRecord;

const PROVIDER: &str = "http";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DRAFT_MAX_TOKENS: u32 = 400;
const DRAFT_TEMPERATURE: f32 = 0.2;
const DEFAULT_CONFIDENCE: f32 = 0.8;

/// Endpoint settings. The key never appears in logs or `Debug` output.
#[derive(Debug)]
pub struct HttpGeneratorConfig {
    /// Full URL of the chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<SecretString>,
}

impl HttpGeneratorConfig {
    /// `None` unless `TRIAGE_GENERATOR_URL` is set.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("TRIAGE_GENERATOR_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: std::env::var("TRIAGE_GENERATOR_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            api_key: std::env::var("TRIAGE_GENERATOR_API_KEY")
                .ok()
                .map(SecretString::from),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// The JSON object the model is asked to return.
#[derive(Debug, Deserialize)]
struct DraftPayload {
    #[serde(default)]
    subject: String,
    body: String,
    #[serde(default)]
    tone: String,
    #[serde(default)]
    confidence: Option<f32>,
}

pub struct HttpDraftGenerator {
    client: reqwest::Client,
    config: HttpGeneratorConfig,
}

impl HttpDraftGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))
        {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    fn unavailable(reason: impl Into<String>) -> GenerationError {
        GenerationError::Unavailable {
            provider: PROVIDER.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl DraftGenerator for HttpDraftGenerator {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(
        &self,
        email: &EmailRecord,
        context: &DraftContext,
    ) -> Result<DraftText, GenerationError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: build_system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: build_user_prompt(email, context),
                },
            ],
            temperature: DRAFT_TEMPERATURE,
            max_tokens: DRAFT_MAX_TOKENS,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(self.build_headers())
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::unavailable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GenerationError::Quota {
                provider: PROVIDER.into(),
            });
        }
        if !status.is_success() {
            return Err(Self::unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            GenerationError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            }
        })?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: "empty completion".into(),
            })?;

        debug!(message_id = %email.message_id, "Draft generator responded");
        parse_draft_response(&content, &email.subject).map_err(|reason| {
            GenerationError::InvalidResponse {
                provider: PROVIDER.into(),
                reason,
            }
        })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_system_prompt() -> String {
    "You draft short, professional email replies for human review.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"subject\": \"...\", \"body\": \"...\", \"tone\": \"...\", \"confidence\": 0.0}\n\n\
     Rules:\n\
     - Keep the body to 2-4 sentences\n\
     - Acknowledge the request; do not promise outcomes or accept liability\n\
     - Never include account numbers, credentials or personal identifiers\n\
     - tone is at most 3 words, e.g. \"professional\""
        .to_string()
}

fn build_user_prompt(email: &EmailRecord, context: &DraftContext) -> String {
    let mut prompt = String::with_capacity(512);
    prompt.push_str(&format!("From: {}\n", email.from));
    prompt.push_str(&format!("Subject: {}\n", email.subject));
    prompt.push_str(&format!(
        "Sender role: {}\nCategory: {}\nPriority: {}\n",
        context.sender_role.label(),
        context.category.label(),
        context.priority
    ));

    let intents: Vec<&str> = context.intent.intents.iter().map(|i| i.label()).collect();
    if !intents.is_empty() {
        prompt.push_str(&format!("Intents: {}\n", intents.join(", ")));
    }
    if let Some(deadline) = &context.intent.extracted_deadline {
        prompt.push_str(&format!(
            "Deadline: {} ({})\n",
            deadline.phrase, deadline.date
        ));
    }

    let body_preview: String = email.body.chars().take(1000).collect();
    prompt.push_str(&format!("\nMessage:\n{body_preview}"));
    prompt
}

// ── Response parsing ────────────────────────────────────────────────

fn parse_draft_response(raw: &str, original_subject: &str) -> Result<DraftText, String> {
    let json_str = extract_json_object(raw);
    let payload: DraftPayload =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;
    if payload.body.trim().is_empty() {
        return Err("draft body is empty".into());
    }
    Ok(DraftText {
        subject: if payload.subject.trim().is_empty() {
            reply_subject(original_subject)
        } else {
            payload.subject
        },
        body: payload.body.trim().to_string(),
        tone_label: if payload.tone.trim().is_empty() {
            "professional".into()
        } else {
            payload.tone
        },
        confidence: payload
            .confidence
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0),
    })
}

/// Pull a JSON object out of model output that may wrap it in markdown.
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after = &trimmed[start + fence.len()..];
            if let Some(end) = after.find("```") {
                let inner = after[..end].trim();
                if inner.starts_with('{') {
                    return inner.to_string();
                }
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }
    trimmed.to_string()
}
