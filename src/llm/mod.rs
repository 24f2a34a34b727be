//! LLM 모듈 - 프로바이더 정규화 채팅 인터페이스
//!
//! WatsonX, DeepSeek, OpenAI, Ollama를 하나의 `chat` 계약 뒤에 둡니다.
//! 어떤 프로바이더든 결과는 OpenAI 호환 `ChatResponse` 형태입니다.
//!
//! ```text
//! {"choices": [{"message": {"content": "...", "role": "assistant"}}]}
//! ```

mod factory;
mod openai_compat;
#[cfg(feature = "watsonx")]
pub(crate) mod watsonx;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use factory::{LlmClient, LlmFactory, DEFAULT_WATSONX_MODEL_ID};
pub use openai_compat::{
    translate_messages, NativeMessage, OllamaChat, OpenAiCompatibleChat, OpenAiFlavor,
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
#[cfg(feature = "watsonx")]
pub use watsonx::WatsonxChat;

// ============================================================================
// Messages
// ============================================================================

/// 채팅 메시지 (role: "user" | "system" | "assistant")
///
/// 순서는 시간순이며 의미가 있습니다. 래퍼는 대화 상태를 보관하지 않으므로
/// 호출자가 매번 전체 이력을 보내야 합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// 추론 파라미터
///
/// 생성 시 값은 기본값이 되고, 호출 시 값이 있으면 그것이 우선합니다.
/// `extra`는 벤더 요청 본문에 그대로 펼쳐집니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// 임의의 벤더 파라미터 추가
    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// `self`의 값을 `base` 위에 덮어쓴 결과
    pub fn merged_over(&self, base: &ChatParams) -> ChatParams {
        let mut extra = base.extra.clone();
        for (k, v) in &self.extra {
            extra.insert(k.clone(), v.clone());
        }
        ChatParams {
            temperature: self.temperature.or(base.temperature),
            max_tokens: self.max_tokens.or(base.max_tokens),
            extra,
        }
    }
}

// ============================================================================
// Normalized Response
// ============================================================================

/// 정규화된 채팅 응답 (관례상 index 0만 채워짐)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub content: String,
    pub role: String,
}

impl ChatResponse {
    /// 단일 assistant 응답으로 감싸기
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            choices: vec![ChatChoice {
                message: ResponseMessage {
                    content: content.into(),
                    role: "assistant".to_string(),
                },
            }],
        }
    }

    /// 첫 번째 선택지의 텍스트
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

// ============================================================================
// ChatCapable Trait
// ============================================================================

/// 채팅 가능한 LLM 프로바이더 트레이트
#[async_trait]
pub trait ChatCapable: Send + Sync {
    /// 메시지 목록을 보내고 정규화된 응답을 받음
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<ChatResponse>;

    /// 프로바이더 태그 (watsonx, deepseek, openai, ollama)
    fn provider(&self) -> &str;

    /// 모델 식별자
    fn model(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
