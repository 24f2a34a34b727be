//! 에러 타입
//!
//! 프로바이더 선택, 벤더 호출, 검색기 빌드 단계의 실패를 하나의 열거형으로 표현합니다.
//! 벤더 호출 실패는 변환하지 않고 그대로 호출자에게 전달됩니다 (재시도 없음).

use thiserror::Error;

/// 크레이트 공통 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;

/// docrag 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 알 수 없는 프로바이더 이름 (watsonx, deepseek, openai, ollama 외)
    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    /// 프로바이더 지원이 빌드에 포함되지 않음 (cargo feature 비활성)
    #[error("Missing dependency: {0} support is not compiled in")]
    MissingDependency(String),

    /// 벤더 API가 2xx 이외의 상태를 반환
    #[error("{provider} API error ({status}): {message}")]
    Vendor {
        provider: String,
        status: u16,
        message: String,
    },

    /// 네트워크/전송 계층 실패
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 벤더 응답이 기대한 형태가 아님
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// 빈 문서 목록으로 검색기를 만들려고 함
    #[error("Cannot build a retriever from an empty document list")]
    EmptyDocuments,

    /// 검색 인덱스 내부 실패
    #[error("Index error: {0}")]
    Index(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] lancedb::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}
