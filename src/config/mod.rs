//! 설정 모듈 - 환경변수 기반 프로세스 설정
//!
//! `.env` 파일(선택)과 환경변수에서 한 번 읽어 `Settings` 값을 만듭니다.
//! 전역 상태가 아니라 팩토리/빌더 호출마다 명시적으로 전달합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let settings = Settings::load()?;
//! let llm = LlmFactory::get_llm(&settings, None, ChatParams::default())?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RagError, Result};

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_PROVIDER: &str = "watsonx";
pub const DEFAULT_WATSONX_PROJECT_ID: &str = "skills-network";
pub const DEFAULT_WATSONX_URL: &str = "https://us-south.ml.cloud.ibm.com";
pub const DEFAULT_WATSONX_IAM_URL: &str = "https://iam.cloud.ibm.com/identity/token";
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_VECTOR_SEARCH_K: usize = 10;
pub const DEFAULT_HYBRID_WEIGHTS: [f32; 2] = [0.4, 0.6];
pub const DEFAULT_VECTOR_DB_PATH: &str = "./chroma_db";
pub const DEFAULT_COLLECTION_NAME: &str = "documents";
pub const DEFAULT_LOG_LEVEL: &str = "INFO";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Ollama 로컬 엔드포인트용 자리표시 자격 증명
pub const OLLAMA_PLACEHOLDER_KEY: &str = "ollama";

// ============================================================================
// Provider
// ============================================================================

/// 지원하는 LLM 프로바이더
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Watsonx,
    DeepSeek,
    OpenAi,
    Ollama,
}

impl Provider {
    /// 소문자 프로바이더 태그
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Watsonx => "watsonx",
            Provider::DeepSeek => "deepseek",
            Provider::OpenAi => "openai",
            Provider::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = RagError;

    /// 대소문자 구분 없이 파싱합니다.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "watsonx" => Ok(Provider::Watsonx),
            "deepseek" => Ok(Provider::DeepSeek),
            "openai" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            other => Err(RagError::UnsupportedProvider(other.to_string())),
        }
    }
}

// ============================================================================
// Provider Config (tagged union)
// ============================================================================

/// WatsonX 연결 정보
#[derive(Debug, Clone, PartialEq)]
pub struct WatsonxConfig {
    pub api_key: String,
    pub project_id: String,
    /// 리전 엔드포인트 (예: https://us-south.ml.cloud.ibm.com)
    pub url: String,
    /// IBM Cloud IAM 토큰 엔드포인트
    pub iam_url: String,
    pub timeout: Duration,
}

/// OpenAI 호환 엔드포인트 연결 정보 (OpenAI, DeepSeek, Ollama 공통)
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiCompatibleConfig {
    pub api_key: String,
    pub base_url: String,
    /// 채팅 모델 이름
    pub model: String,
    pub timeout: Duration,
}

/// 활성 프로바이더와 해당 프로바이더의 설정
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    Watsonx(WatsonxConfig),
    DeepSeek(OpenAiCompatibleConfig),
    OpenAi(OpenAiCompatibleConfig),
    Ollama(OpenAiCompatibleConfig),
}

impl ProviderConfig {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderConfig::Watsonx(_) => Provider::Watsonx,
            ProviderConfig::DeepSeek(_) => Provider::DeepSeek,
            ProviderConfig::OpenAi(_) => Provider::OpenAi,
            ProviderConfig::Ollama(_) => Provider::Ollama,
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// 프로세스 설정
///
/// 시작 시 한 번 만들고 이후에는 읽기 전용으로 사용합니다.
/// 프로바이더를 바꾸려면 새 값을 만들어 전달하세요.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// 활성 프로바이더 이름 (원본 문자열, 사용 시점에 파싱)
    pub llm_provider: String,

    pub openai_api_key: String,
    pub deepseek_api_key: String,
    pub watsonx_api_key: String,
    pub watsonx_project_id: String,

    pub deepseek_model_name: String,
    pub openai_model_name: String,
    pub ollama_model_name: String,

    pub ollama_base_url: String,
    pub openai_base_url: String,
    pub deepseek_base_url: String,
    pub watsonx_url: String,
    pub watsonx_iam_url: String,

    /// 벡터 검색 깊이 (top-K)
    pub vector_search_k: usize,
    /// 하이브리드 가중치 (키워드, 벡터)
    pub hybrid_retriever_weights: [f32; 2],
    /// 벡터 저장소 디렉토리
    pub vector_db_path: String,
    /// 벡터 테이블 이름
    pub collection_name: String,

    pub log_level: String,
    pub http_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_provider: DEFAULT_PROVIDER.to_string(),
            openai_api_key: String::new(),
            deepseek_api_key: String::new(),
            watsonx_api_key: String::new(),
            watsonx_project_id: DEFAULT_WATSONX_PROJECT_ID.to_string(),
            deepseek_model_name: DEFAULT_DEEPSEEK_MODEL.to_string(),
            openai_model_name: DEFAULT_OPENAI_MODEL.to_string(),
            ollama_model_name: DEFAULT_OLLAMA_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            deepseek_base_url: DEFAULT_DEEPSEEK_BASE_URL.to_string(),
            watsonx_url: DEFAULT_WATSONX_URL.to_string(),
            watsonx_iam_url: DEFAULT_WATSONX_IAM_URL.to_string(),
            vector_search_k: DEFAULT_VECTOR_SEARCH_K,
            hybrid_retriever_weights: DEFAULT_HYBRID_WEIGHTS,
            vector_db_path: DEFAULT_VECTOR_DB_PATH.to_string(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// `.env` 파일을 읽은 뒤 환경변수에서 설정 로드
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_env()
    }

    /// 프로세스 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 키 조회 함수로 설정 로드
    ///
    /// 빈 문자열 값은 미설정으로 취급하지 않습니다 (API 키는 빈 값이 허용됨).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);
        // 첫 번째 키가 우선, 나머지는 호환용 별칭
        let aliased = |keys: &[&str], default: String| {
            keys.iter().find_map(|k| lookup(k)).unwrap_or(default)
        };

        let vector_search_k = match lookup("VECTOR_SEARCH_K") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                RagError::Config(format!("VECTOR_SEARCH_K must be a positive integer: {raw}"))
            })?,
            None => defaults.vector_search_k,
        };
        if vector_search_k == 0 {
            return Err(RagError::Config("VECTOR_SEARCH_K must be at least 1".into()));
        }

        let hybrid_retriever_weights = match lookup("HYBRID_RETRIEVER_WEIGHTS") {
            Some(raw) => parse_weights(&raw)?,
            None => defaults.hybrid_retriever_weights,
        };

        let http_timeout = match lookup("HTTP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse::<u64>().map_err(|_| {
                RagError::Config(format!("HTTP_TIMEOUT_SECS must be an integer: {raw}"))
            })?),
            None => defaults.http_timeout,
        };

        Ok(Self {
            llm_provider: string("LLM_PROVIDER", defaults.llm_provider),
            openai_api_key: string("OPENAI_API_KEY", defaults.openai_api_key),
            deepseek_api_key: string("DEEPSEEK_API_KEY", defaults.deepseek_api_key),
            watsonx_api_key: string("WATSONX_APIKEY", defaults.watsonx_api_key),
            watsonx_project_id: string("WATSONX_PROJECT_ID", defaults.watsonx_project_id),
            deepseek_model_name: string("DEEPSEEK_MODEL_NAME", defaults.deepseek_model_name),
            openai_model_name: string("OPENAI_MODEL_NAME", defaults.openai_model_name),
            ollama_model_name: string("OLLAMA_MODEL_NAME", defaults.ollama_model_name),
            ollama_base_url: string("OLLAMA_BASE_URL", defaults.ollama_base_url),
            openai_base_url: string("OPENAI_BASE_URL", defaults.openai_base_url),
            deepseek_base_url: string("DEEPSEEK_BASE_URL", defaults.deepseek_base_url),
            watsonx_url: string("WATSONX_URL", defaults.watsonx_url),
            watsonx_iam_url: string("WATSONX_IAM_URL", defaults.watsonx_iam_url),
            vector_search_k,
            hybrid_retriever_weights,
            vector_db_path: aliased(&["VECTOR_DB_PATH", "CHROMA_DB_PATH"], defaults.vector_db_path),
            collection_name: aliased(
                &["VECTOR_COLLECTION_NAME", "CHROMA_COLLECTION_NAME"],
                defaults.collection_name,
            ),
            log_level: string("LOG_LEVEL", defaults.log_level),
            http_timeout,
        })
    }

    /// 프로바이더를 바꾼 복사본
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.llm_provider = provider.into();
        self
    }

    /// 활성 프로바이더 파싱 (대소문자 무시)
    pub fn provider(&self) -> Result<Provider> {
        self.llm_provider.parse()
    }

    /// 활성 프로바이더의 연결 정보 해석
    ///
    /// API 키와 base URL은 프로바이더 태그에 따라 선택됩니다.
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let config = match self.provider()? {
            Provider::Watsonx => ProviderConfig::Watsonx(WatsonxConfig {
                api_key: self.watsonx_api_key.clone(),
                project_id: self.watsonx_project_id.clone(),
                url: self.watsonx_url.clone(),
                iam_url: self.watsonx_iam_url.clone(),
                timeout: self.http_timeout,
            }),
            Provider::DeepSeek => ProviderConfig::DeepSeek(OpenAiCompatibleConfig {
                api_key: self.deepseek_api_key.clone(),
                base_url: self.deepseek_base_url.clone(),
                model: self.deepseek_model_name.clone(),
                timeout: self.http_timeout,
            }),
            Provider::OpenAi => ProviderConfig::OpenAi(OpenAiCompatibleConfig {
                api_key: self.openai_api_key.clone(),
                base_url: self.openai_base_url.clone(),
                model: self.openai_model_name.clone(),
                timeout: self.http_timeout,
            }),
            Provider::Ollama => ProviderConfig::Ollama(OpenAiCompatibleConfig {
                api_key: OLLAMA_PLACEHOLDER_KEY.to_string(),
                base_url: self.ollama_base_url.clone(),
                model: self.ollama_model_name.clone(),
                timeout: self.http_timeout,
            }),
        };
        Ok(config)
    }
}

/// 가중치 문자열 파싱 ("0.4,0.6" 또는 "[0.4, 0.6]")
fn parse_weights(raw: &str) -> Result<[f32; 2]> {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let values = inner
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(|_| RagError::Config(format!("Invalid HYBRID_RETRIEVER_WEIGHTS: {raw}")))?;

    match values.as_slice() {
        [lexical, vector] if valid_weight(*lexical) && valid_weight(*vector) => {
            Ok([*lexical, *vector])
        }
        _ => Err(RagError::Config(format!(
            "HYBRID_RETRIEVER_WEIGHTS needs two non-negative numbers: {raw}"
        ))),
    }
}

fn valid_weight(w: f32) -> bool {
    w.is_finite() && w >= 0.0
}

// ============================================================================
// Tests
// ============================================================================
