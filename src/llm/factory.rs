//! LLM 팩토리 - 설정된 프로바이더로 채팅 클라이언트 생성
//!
//! 프로바이더 문자열은 `ProviderConfig` 열거형으로 해석된 뒤
//! 전수 패턴 매칭으로 분기합니다. 캐싱하지 않으므로 호출마다 새 클라이언트가 만들어집니다.

use async_trait::async_trait;

use crate::config::{ProviderConfig, Settings};
use crate::error::Result;

use super::openai_compat::{OllamaChat, OpenAiCompatibleChat, OpenAiFlavor};
#[cfg(feature = "watsonx")]
use super::watsonx::WatsonxChat;
use super::{ChatCapable, ChatMessage, ChatParams, ChatResponse};

/// WatsonX에서 `model_id`를 지정하지 않았을 때 쓰는 모델
pub const DEFAULT_WATSONX_MODEL_ID: &str = "meta-llama/llama-3-2-90b-vision-instruct";

// ============================================================================
// LlmClient
// ============================================================================

/// 팩토리가 만드는 채팅 클라이언트
pub enum LlmClient {
    #[cfg(feature = "watsonx")]
    Watsonx(WatsonxChat),
    /// OpenAI 또는 DeepSeek
    OpenAiCompatible(OpenAiCompatibleChat),
    Ollama(OllamaChat),
}

impl LlmClient {
    fn as_chat(&self) -> &dyn ChatCapable {
        match self {
            #[cfg(feature = "watsonx")]
            LlmClient::Watsonx(chat) => chat,
            LlmClient::OpenAiCompatible(chat) => chat,
            LlmClient::Ollama(chat) => chat,
        }
    }

    /// 트레이트 객체로 변환
    pub fn boxed(self) -> Box<dyn ChatCapable> {
        match self {
            #[cfg(feature = "watsonx")]
            LlmClient::Watsonx(chat) => Box::new(chat),
            LlmClient::OpenAiCompatible(chat) => Box::new(chat),
            LlmClient::Ollama(chat) => Box::new(chat),
        }
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider())
            .field("model", &self.model())
            .finish()
    }
}

#[async_trait]
impl ChatCapable for LlmClient {
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<ChatResponse> {
        self.as_chat().chat(messages, params).await
    }

    fn provider(&self) -> &str {
        self.as_chat().provider()
    }

    fn model(&self) -> &str {
        self.as_chat().model()
    }
}

// ============================================================================
// LlmFactory
// ============================================================================

pub struct LlmFactory;

impl LlmFactory {
    /// 활성 프로바이더의 채팅 클라이언트 생성
    ///
    /// # Arguments
    /// * `settings` - 프로바이더 선택 및 연결 정보
    /// * `model_id` - WatsonX 모델 (없으면 `DEFAULT_WATSONX_MODEL_ID`)
    /// * `params` - 추론 파라미터 기본값
    ///
    /// # Errors
    /// 알 수 없는 프로바이더면 `RagError::UnsupportedProvider`,
    /// WatsonX 지원 없이 빌드된 경우 `RagError::MissingDependency`
    pub fn get_llm(
        settings: &Settings,
        model_id: Option<&str>,
        params: ChatParams,
    ) -> Result<LlmClient> {
        let config = settings.provider_config()?;
        tracing::info!("Initializing LLM with provider: {}", config.provider());

        let client = match config {
            ProviderConfig::Watsonx(cfg) => Self::watsonx(model_id, &cfg, params)?,
            ProviderConfig::DeepSeek(cfg) => LlmClient::OpenAiCompatible(OpenAiCompatibleChat::new(
                OpenAiFlavor::DeepSeek,
                &cfg,
                params,
            )?),
            ProviderConfig::OpenAi(cfg) => LlmClient::OpenAiCompatible(OpenAiCompatibleChat::new(
                OpenAiFlavor::OpenAi,
                &cfg,
                params,
            )?),
            ProviderConfig::Ollama(cfg) => LlmClient::Ollama(OllamaChat::new(&cfg, params)?),
        };

        Ok(client)
    }

    #[cfg(feature = "watsonx")]
    fn watsonx(
        model_id: Option<&str>,
        config: &crate::config::WatsonxConfig,
        params: ChatParams,
    ) -> Result<LlmClient> {
        let model_id = model_id.unwrap_or(DEFAULT_WATSONX_MODEL_ID);
        Ok(LlmClient::Watsonx(WatsonxChat::new(model_id, config, params)?))
    }

    #[cfg(not(feature = "watsonx"))]
    fn watsonx(
        _model_id: Option<&str>,
        _config: &crate::config::WatsonxConfig,
        _params: ChatParams,
    ) -> Result<LlmClient> {
        tracing::error!("watsonx support not compiled in. Rebuild with the `watsonx` feature.");
        Err(crate::error::RagError::MissingDependency("watsonx".to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;

    #[test]
    #[cfg(feature = "watsonx")]
    fn test_get_llm_watsonx() {
        let settings = Settings::default().with_provider("watsonx");
        let llm = LlmFactory::get_llm(&settings, None, ChatParams::default()).unwrap();

        match &llm {
            LlmClient::Watsonx(chat) => {
                assert_eq!(chat.project_id(), "skills-network");
                assert_eq!(
                    chat.endpoint_url().as_str(),
                    "https://us-south.ml.cloud.ibm.com/ml/v1/text/chat?version=2024-03-14"
                );
            }
            other => panic!("expected watsonx client, got {:?}", other),
        }
        assert_eq!(llm.model(), DEFAULT_WATSONX_MODEL_ID);
    }

    #[test]
    #[cfg(feature = "watsonx")]
    fn test_get_llm_watsonx_model_override_and_params() {
        let settings = Settings::default().with_provider("WATSONX");
        let params = ChatParams::new().with_param("decoding_method", "greedy");
        let llm = LlmFactory::get_llm(&settings, Some("ibm/granite-13b-chat-v2"), params.clone())
            .unwrap();

        assert_eq!(llm.model(), "ibm/granite-13b-chat-v2");
        match llm {
            LlmClient::Watsonx(chat) => assert_eq!(chat.inference_params(), &params),
            other => panic!("expected watsonx client, got {:?}", other),
        }
    }

    #[test]
    #[cfg(not(feature = "watsonx"))]
    fn test_get_llm_watsonx_without_feature() {
        let settings = Settings::default().with_provider("watsonx");
        let result = LlmFactory::get_llm(&settings, None, ChatParams::default());
        assert!(matches!(result, Err(RagError::MissingDependency(_))));
    }

    #[test]
    fn test_get_llm_deepseek() {
        let settings = Settings::default().with_provider("deepseek");
        let llm = LlmFactory::get_llm(&settings, None, ChatParams::default()).unwrap();

        match &llm {
            LlmClient::OpenAiCompatible(chat) => {
                assert_eq!(chat.flavor(), OpenAiFlavor::DeepSeek);
                assert_eq!(
                    chat.endpoint_url().as_str(),
                    "https://api.deepseek.com/v1/chat/completions"
                );
            }
            other => panic!("expected openai-compatible client, got {:?}", other),
        }
        assert_eq!(llm.provider(), "deepseek");
        assert_eq!(llm.model(), "deepseek-chat");
    }

    #[test]
    fn test_get_llm_openai() {
        let settings = Settings::default().with_provider("OpenAI");
        let llm = LlmFactory::get_llm(&settings, None, ChatParams::default()).unwrap();

        assert!(matches!(llm, LlmClient::OpenAiCompatible(_)));
        assert_eq!(llm.provider(), "openai");
        assert_eq!(llm.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_get_llm_ollama() {
        let settings = Settings::default().with_provider("ollama");
        let llm = LlmFactory::get_llm(&settings, None, ChatParams::default()).unwrap();

        match &llm {
            LlmClient::Ollama(chat) => assert_eq!(
                chat.endpoint_url().as_str(),
                "http://localhost:11434/v1/chat/completions"
            ),
            other => panic!("expected ollama client, got {:?}", other),
        }
        assert_eq!(llm.model(), "llama3");
    }

    #[test]
    fn test_invalid_provider() {
        let settings = Settings::default().with_provider("invalid");
        match LlmFactory::get_llm(&settings, None, ChatParams::default()) {
            Err(RagError::UnsupportedProvider(value)) => assert_eq!(value, "invalid"),
            other => panic!("expected UnsupportedProvider, got {:?}", other),
        }
    }

    #[test]
    fn test_boxed_keeps_identity() {
        let settings = Settings::default().with_provider("openai");
        let llm: Box<dyn ChatCapable> = LlmFactory::get_llm(&settings, None, ChatParams::default())
            .unwrap()
            .boxed();
        assert_eq!(llm.provider(), "openai");
    }
}
