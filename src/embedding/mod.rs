//! 임베딩 모듈 - 프로바이더별 텍스트 벡터화
//!
//! 채팅 팩토리와 같은 프로바이더 분기로 임베딩 클라이언트를 선택합니다.
//! - watsonx: `ibm/slate-125m-english-rtrvr-v2` (/ml/v1/text/embeddings)
//! - deepseek / openai / ollama: OpenAI 호환 `/embeddings`
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&settings)?;
//! let vectors = embedder.embed_batch(&texts).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{OpenAiCompatibleConfig, ProviderConfig, Settings};
use crate::error::{RagError, Result};
use crate::http::{build_client, join_endpoint, vendor_error};

/// OpenAI 임베딩 모델
pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// DeepSeek 임베딩 모델
pub const DEEPSEEK_EMBEDDING_MODEL: &str = "deepseek-embed";
/// WatsonX 임베딩 모델
pub const WATSONX_EMBEDDING_MODEL: &str = "ibm/slate-125m-english-rtrvr-v2";
/// WatsonX 입력 토큰 절단 길이
pub const WATSONX_TRUNCATE_INPUT_TOKENS: u32 = 3;

/// 요청 하나에 담는 최대 텍스트 수
const EMBED_BATCH_SIZE: usize = 100;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 배치 임베딩 (입력 순서 유지)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::InvalidResponse("embedding response was empty".into()))
    }

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI-compatible Embedding
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI 호환 `/embeddings` 구현체 (OpenAI, DeepSeek, Ollama)
#[derive(Debug)]
pub struct OpenAiCompatibleEmbedding {
    provider: &'static str,
    http: reqwest::Client,
    url: Url,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleEmbedding {
    pub fn new(
        provider: &'static str,
        config: &OpenAiCompatibleConfig,
        model: &str,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            http: build_client(config.timeout)?,
            url: join_endpoint(&config.base_url, "embeddings")?,
            api_key: config.api_key.clone(),
            model: model.to_string(),
        })
    }

    pub fn endpoint_url(&self) -> &Url {
        &self.url
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .http
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingsRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(vendor_error(self.provider, response).await);
        }

        let mut body: EmbeddingsResponse = response.json().await?;
        if body.data.len() != texts.len() {
            return Err(RagError::InvalidResponse(format!(
                "{} returned {} embeddings for {} inputs",
                self.provider,
                body.data.len(),
                texts.len()
            )));
        }

        // 응답 순서는 보장되지 않으므로 index 기준 정렬
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, chunk) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({} texts) with {}",
                i + 1,
                chunk.len(),
                self.model
            );
            results.extend(self.embed_chunk(chunk).await?);
        }

        Ok(results)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// WatsonX Embedding
// ============================================================================

#[cfg(feature = "watsonx")]
mod watsonx {
    use super::*;
    use crate::config::WatsonxConfig;
    use crate::llm::watsonx::{IamAuthenticator, WATSONX_API_VERSION};

    #[derive(Debug, Serialize)]
    struct WatsonxEmbedRequest<'a> {
        inputs: &'a [String],
        model_id: &'a str,
        project_id: &'a str,
        parameters: WatsonxEmbedParameters,
    }

    #[derive(Debug, Serialize)]
    struct WatsonxEmbedParameters {
        truncate_input_tokens: u32,
        return_options: WatsonxReturnOptions,
    }

    #[derive(Debug, Serialize)]
    struct WatsonxReturnOptions {
        input_text: bool,
    }

    #[derive(Debug, Deserialize)]
    struct WatsonxEmbedResponse {
        results: Vec<WatsonxEmbedResult>,
    }

    #[derive(Debug, Deserialize)]
    struct WatsonxEmbedResult {
        embedding: Vec<f32>,
    }

    /// watsonx.ai 임베딩 구현체
    #[derive(Debug)]
    pub struct WatsonxEmbedding {
        http: reqwest::Client,
        auth: IamAuthenticator,
        url: Url,
        project_id: String,
        model_id: String,
    }

    impl WatsonxEmbedding {
        pub fn new(config: &WatsonxConfig) -> Result<Self> {
            let http = build_client(config.timeout)?;
            let mut url = join_endpoint(&config.url, "ml/v1/text/embeddings")?;
            url.query_pairs_mut().append_pair("version", WATSONX_API_VERSION);

            Ok(Self {
                auth: IamAuthenticator::new(http.clone(), &config.iam_url, &config.api_key),
                http,
                url,
                project_id: config.project_id.clone(),
                model_id: WATSONX_EMBEDDING_MODEL.to_string(),
            })
        }

        async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let token = self.auth.bearer_token().await?;
            let request = WatsonxEmbedRequest {
                inputs: texts,
                model_id: &self.model_id,
                project_id: &self.project_id,
                parameters: WatsonxEmbedParameters {
                    truncate_input_tokens: WATSONX_TRUNCATE_INPUT_TOKENS,
                    return_options: WatsonxReturnOptions { input_text: true },
                },
            };

            let response = self
                .http
                .post(self.url.clone())
                .bearer_auth(token)
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(vendor_error("watsonx", response).await);
            }

            let body: WatsonxEmbedResponse = response.json().await?;
            if body.results.len() != texts.len() {
                return Err(RagError::InvalidResponse(format!(
                    "watsonx returned {} embeddings for {} inputs",
                    body.results.len(),
                    texts.len()
                )));
            }
            Ok(body.results.into_iter().map(|r| r.embedding).collect())
        }
    }

    #[async_trait]
    impl EmbeddingProvider for WatsonxEmbedding {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut results = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(EMBED_BATCH_SIZE) {
                results.extend(self.embed_chunk(chunk).await?);
            }
            Ok(results)
        }

        fn name(&self) -> &str {
            &self.model_id
        }
    }
}

#[cfg(feature = "watsonx")]
pub use watsonx::WatsonxEmbedding;

// ============================================================================
// Embedder (closed set)
// ============================================================================

/// 프로바이더별 임베딩 클라이언트
#[derive(Debug)]
pub enum Embedder {
    #[cfg(feature = "watsonx")]
    Watsonx(WatsonxEmbedding),
    OpenAiCompatible(OpenAiCompatibleEmbedding),
}

#[async_trait]
impl EmbeddingProvider for Embedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            #[cfg(feature = "watsonx")]
            Embedder::Watsonx(e) => e.embed_batch(texts).await,
            Embedder::OpenAiCompatible(e) => e.embed_batch(texts).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            #[cfg(feature = "watsonx")]
            Embedder::Watsonx(e) => e.name(),
            Embedder::OpenAiCompatible(e) => e.name(),
        }
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 활성 프로바이더의 임베딩 클라이언트 생성
///
/// - deepseek: `deepseek-embed`, DeepSeek base URL
/// - openai: `text-embedding-3-small`, OpenAI base URL
/// - ollama: 설정된 Ollama 모델, 로컬 base URL
pub fn create_embedder(settings: &Settings) -> Result<Embedder> {
    let config = settings.provider_config()?;
    tracing::info!("Initializing embeddings for provider: {}", config.provider());

    let embedder = match config {
        ProviderConfig::Watsonx(cfg) => watsonx_embedder(&cfg)?,
        ProviderConfig::DeepSeek(cfg) => Embedder::OpenAiCompatible(OpenAiCompatibleEmbedding::new(
            "deepseek",
            &cfg,
            DEEPSEEK_EMBEDDING_MODEL,
        )?),
        ProviderConfig::OpenAi(cfg) => Embedder::OpenAiCompatible(OpenAiCompatibleEmbedding::new(
            "openai",
            &cfg,
            OPENAI_EMBEDDING_MODEL,
        )?),
        ProviderConfig::Ollama(cfg) => {
            let model = cfg.model.clone();
            Embedder::OpenAiCompatible(OpenAiCompatibleEmbedding::new("ollama", &cfg, &model)?)
        }
    };

    Ok(embedder)
}

#[cfg(feature = "watsonx")]
fn watsonx_embedder(config: &crate::config::WatsonxConfig) -> Result<Embedder> {
    Ok(Embedder::Watsonx(WatsonxEmbedding::new(config)?))
}

#[cfg(not(feature = "watsonx"))]
fn watsonx_embedder(_config: &crate::config::WatsonxConfig) -> Result<Embedder> {
    tracing::error!("watsonx support not compiled in. Rebuild with the `watsonx` feature.");
    Err(RagError::MissingDependency("watsonx".to_string()))
}

// ============================================================================
// Tests
// ============================================================================
