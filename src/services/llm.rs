//! Chat-completion collaborators
//!
//! Query normalization and answer generation against an OpenAI-compatible
//! `/chat/completions` endpoint. Ollama serves the same API under `/v1`, so the
//! local fallback uses the same client.

use crate::config::LlmConfig;
use crate::services::{AnswerGenerator, LegalDictionary, QueryNormalizer, ServiceError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const NORMALIZATION_PROMPT: &str = "You preprocess questions for a Korean housing-lease legal assistant.
Rewrite the user's question using the statutory terms from the dictionary below.
- Every dictionary word that appears must be followed by its statutory term in parentheses, e.g. \"집주인(임대인)이...\".
- Adjust particles so the sentence stays natural Korean.
- Do not answer, explain or add anything. Output only the rewritten question.

[Dictionary]
{dictionary}

Question: {question}
Rewritten question:";

const ANSWER_SYSTEM_PROMPT: &str = "You are a Korean housing-lease and rental-fraud prevention legal assistant.
Answer in Korean, using only the reference material below, which is ordered by legal authority.
- SECTION 1 (statutes) is the primary basis. Use SECTION 2 and SECTION 3 only where SECTION 1 is unclear.
- Where case law departs from the statute, say that the statute is the rule and the ruling an exception.
- Structure: conclusion first, then legal basis citing articles, then procedure, then related cases.
- If a contract term violates a mandatory provision, state clearly that it is void.
- Close by noting that a lawyer should confirm the final decision.

[Reference material]
{context}";

/// One chat-completion endpoint and model
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
}

/// Which endpoint serves a role, picked once when the pipeline is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    Normalize,
    Generate,
}

impl ChatEndpoint {
    /// Primary endpoint when an API key is available, else the local fallback
    ///
    /// `None` when the llm is disabled or neither endpoint is usable.
    pub fn select(config: &LlmConfig, role: ChatRole, api_key: Option<String>) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let (model, temperature) = match role {
            ChatRole::Normalize => (&config.normalize_model, config.normalize_temperature),
            ChatRole::Generate => (&config.generation_model, config.generation_temperature),
        };

        match api_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => Some(Self {
                base_url: config.base_url.clone(),
                api_key: Some(key),
                model: model.clone(),
                temperature,
            }),
            None if !config.fallback_model.is_empty() => {
                tracing::warn!(
                    "{} is not set, using fallback model {} for {:?}",
                    config.api_key_env,
                    config.fallback_model,
                    role
                );
                Some(Self {
                    base_url: config.fallback_base_url.clone(),
                    api_key: None,
                    model: config.fallback_model.clone(),
                    temperature,
                })
            }
            None => None,
        }
    }

    /// [`select`](Self::select) reading the API key from `api_key_env`
    pub fn from_env(config: &LlmConfig, role: ChatRole) -> Option<Self> {
        Self::select(config, role, std::env::var(&config.api_key_env).ok())
    }
}

/// Blocking chat-completion client
///
/// Calls run on the blocking pool through `call_with_timeout`, so the
/// synchronous reqwest client is used.
pub struct ChatClient {
    endpoint: ChatEndpoint,
    client: reqwest::blocking::Client,
}

impl ChatClient {
    pub fn new(endpoint: ChatEndpoint, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &ChatEndpoint {
        &self.endpoint
    }

    /// Send `messages` and return the first choice's text
    pub fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.endpoint.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: self.endpoint.model.clone(),
            messages,
            temperature: self.endpoint.temperature,
            stream: false,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .map_err(|e| ServiceError::Request(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ServiceError::Request(format!("API error {}: {}", status, body)));
        }

        let body: ChatResponse = response
            .json()
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        first_choice_text(body)
    }
}

fn first_choice_text(response: ChatResponse) -> Result<String, ServiceError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| ServiceError::InvalidResponse("No choices in response".to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Model-backed rewrite of the question into statutory vocabulary
pub struct LlmNormalizer {
    chat: ChatClient,
}

impl LlmNormalizer {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }

    pub fn prompt(dictionary: &LegalDictionary, question: &str) -> String {
        let entries = dictionary
            .iter()
            .map(|(word, term)| format!("{} -> {}", word, term))
            .collect::<Vec<_>>()
            .join("\n");

        NORMALIZATION_PROMPT
            .replace("{dictionary}", &entries)
            .replace("{question}", question.trim())
    }
}

impl QueryNormalizer for LlmNormalizer {
    fn normalize(&self, dictionary: &LegalDictionary, question: &str) -> Result<String, ServiceError> {
        self.chat
            .complete(vec![ChatMessage::user(Self::prompt(dictionary, question))])
    }
}

/// Model-backed answer over the tiered context
pub struct LlmAnswerGenerator {
    chat: ChatClient,
}

impl LlmAnswerGenerator {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }

    pub fn messages(context: &str, question: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(ANSWER_SYSTEM_PROMPT.replace("{context}", context)),
            ChatMessage::user(question.trim()),
        ]
    }
}

impl AnswerGenerator for LlmAnswerGenerator {
    fn generate(&self, context: &str, question: &str) -> Result<String, ServiceError> {
        self.chat.complete(Self::messages(context, question))
    }
}
