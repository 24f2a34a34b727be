//! OpenAI 호환 채팅 - OpenAI, DeepSeek, Ollama 공통 경로
//!
//! ref: https://platform.openai.com/docs/api-reference/chat/create
//!
//! 세 프로바이더 모두 `/chat/completions` 형식을 쓰므로 메시지 변환과
//! 호출 로직은 `CompletionEndpoint` 하나로 공유합니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::OpenAiCompatibleConfig;
use crate::error::{RagError, Result};
use crate::http::{build_client, join_endpoint, vendor_error};

use super::{ChatCapable, ChatMessage, ChatParams, ChatResponse};

/// 기본 temperature
pub const DEFAULT_TEMPERATURE: f64 = 0.3;
/// 기본 최대 토큰 수
pub const DEFAULT_MAX_TOKENS: u32 = 300;

// ============================================================================
// Message Translation
// ============================================================================

/// 프로바이더 측 메시지 표현
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeMessage {
    Human(String),
    System(String),
    Ai(String),
}

impl NativeMessage {
    /// OpenAI 와이어 포맷의 role
    pub fn wire_role(&self) -> &'static str {
        match self {
            NativeMessage::Human(_) => "user",
            NativeMessage::System(_) => "system",
            NativeMessage::Ai(_) => "assistant",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            NativeMessage::Human(c) | NativeMessage::System(c) | NativeMessage::Ai(c) => c,
        }
    }
}

/// role별 메시지 변환
///
/// `user`→Human, `system`→System, `assistant`→AI.
/// 그 외 role(예: `tool`)은 에러 없이 조용히 제외됩니다.
pub fn translate_messages(messages: &[ChatMessage]) -> Vec<NativeMessage> {
    messages
        .iter()
        .filter_map(|msg| match msg.role.as_str() {
            "user" => Some(NativeMessage::Human(msg.content.clone())),
            "system" => Some(NativeMessage::System(msg.content.clone())),
            "assistant" => Some(NativeMessage::Ai(msg.content.clone())),
            other => {
                tracing::debug!("Dropping message with unsupported role: {}", other);
                None
            }
        })
        .collect()
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(flatten)]
    params: ChatParams,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// Shared Endpoint
// ============================================================================

/// `/chat/completions` 호출 공통 구현
#[derive(Debug)]
struct CompletionEndpoint {
    provider: &'static str,
    http: reqwest::Client,
    url: Url,
    api_key: String,
    model: String,
    defaults: ChatParams,
}

impl CompletionEndpoint {
    fn new(
        provider: &'static str,
        config: &OpenAiCompatibleConfig,
        params: ChatParams,
    ) -> Result<Self> {
        let defaults = ChatParams {
            temperature: params.temperature.or(Some(DEFAULT_TEMPERATURE)),
            max_tokens: params.max_tokens.or(Some(DEFAULT_MAX_TOKENS)),
            extra: params.extra,
        };

        Ok(Self {
            provider,
            http: build_client(config.timeout)?,
            url: join_endpoint(&config.base_url, "chat/completions")?,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            defaults,
        })
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
    ) -> Result<ChatResponse> {
        let native = translate_messages(messages);
        let request = CompletionRequest {
            model: &self.model,
            messages: native
                .iter()
                .map(|m| WireMessage {
                    role: m.wire_role(),
                    content: m.content(),
                })
                .collect(),
            params: params.merged_over(&self.defaults),
        };

        tracing::debug!(
            "Sending {} messages to {} ({})",
            request.messages.len(),
            self.provider,
            self.model
        );

        let response = self
            .http
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(vendor_error(self.provider, response).await);
        }

        let body: CompletionResponse = response.json().await?;
        let choice = body.choices.into_iter().next().ok_or_else(|| {
            RagError::InvalidResponse(format!("{} returned no choices", self.provider))
        })?;

        Ok(ChatResponse::assistant(choice.message.content.unwrap_or_default()))
    }
}

// ============================================================================
// OpenAI / DeepSeek
// ============================================================================

/// OpenAI 호환 프로바이더 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFlavor {
    OpenAi,
    DeepSeek,
}

impl OpenAiFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "openai",
            OpenAiFlavor::DeepSeek => "deepseek",
        }
    }
}

/// OpenAI 및 DeepSeek 채팅 래퍼
#[derive(Debug)]
pub struct OpenAiCompatibleChat {
    flavor: OpenAiFlavor,
    endpoint: CompletionEndpoint,
}

impl OpenAiCompatibleChat {
    /// 생성
    ///
    /// API 키가 비어 있으면 경고만 남기고 생성은 계속합니다.
    /// 실제 실패는 첫 호출 시 인증 에러로 나타납니다.
    pub fn new(
        flavor: OpenAiFlavor,
        config: &OpenAiCompatibleConfig,
        params: ChatParams,
    ) -> Result<Self> {
        if config.api_key.is_empty() {
            tracing::warn!("API key for {} is missing.", flavor.as_str());
        }

        Ok(Self {
            flavor,
            endpoint: CompletionEndpoint::new(flavor.as_str(), config, params)?,
        })
    }

    pub fn flavor(&self) -> OpenAiFlavor {
        self.flavor
    }

    /// 실제 호출되는 엔드포인트
    pub fn endpoint_url(&self) -> &Url {
        &self.endpoint.url
    }

    /// 생성 시 확정된 기본 파라미터
    pub fn default_params(&self) -> &ChatParams {
        &self.endpoint.defaults
    }
}

#[async_trait]
impl ChatCapable for OpenAiCompatibleChat {
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<ChatResponse> {
        self.endpoint.complete(messages, params).await
    }

    fn provider(&self) -> &str {
        self.flavor.as_str()
    }

    fn model(&self) -> &str {
        &self.endpoint.model
    }
}

// ============================================================================
// Ollama
// ============================================================================

/// Ollama 로컬 채팅 래퍼 (OpenAI 호환 `/v1` 엔드포인트)
#[derive(Debug)]
pub struct OllamaChat {
    endpoint: CompletionEndpoint,
}

impl OllamaChat {
    pub fn new(config: &OpenAiCompatibleConfig, params: ChatParams) -> Result<Self> {
        Ok(Self {
            endpoint: CompletionEndpoint::new("ollama", config, params)?,
        })
    }

    pub fn endpoint_url(&self) -> &Url {
        &self.endpoint.url
    }
}

#[async_trait]
impl ChatCapable for OllamaChat {
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<ChatResponse> {
        self.endpoint.complete(messages, params).await
    }

    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.endpoint.model
    }
}

// ============================================================================
// Tests
// ============================================================================
