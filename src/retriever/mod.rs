//! Retriever 모듈 - 하이브리드 문서 검색
//!
//! - BM25: 인메모리 SQLite FTS5 키워드 검색
//! - Vector: LanceDB 벡터 검색 (디스크 영속)
//! - Hybrid: 가중 RRF로 두 검색 결과 통합
//! - Builder: 프로바이더별 임베딩 선택 후 하이브리드 검색기 조립

mod bm25;
mod builder;
mod ensemble;
mod vector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// Re-exports
pub use bm25::Bm25Retriever;
pub use builder::RetrieverBuilder;
pub use ensemble::{weighted_rrf, HybridRetriever, RRF_K};
pub use vector::{LanceVectorStore, VectorHit, VectorRetriever};

// ============================================================================
// Types
// ============================================================================

/// 검색 가능한 텍스트 단위
///
/// 파싱 단계(범위 밖)에서 만들어져 검색기 빌더로 전달됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// 메타데이터 항목 추가
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 어느 검색기에서 찾았는지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    /// BM25 키워드 검색만
    Lexical,
    /// 벡터 검색만
    Vector,
    /// 양쪽 모두
    Hybrid,
}

/// 통합 스코어가 붙은 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    /// 가중 RRF 스코어 (높을수록 좋음)
    pub score: f32,
    pub method: SearchMethod,
}

// ============================================================================
// Retriever Trait
// ============================================================================

/// 검색기 트레이트
///
/// 쿼리에 대해 관련도 순으로 정렬된 문서를 반환합니다.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>>;

    /// 검색기 이름 (로그용)
    fn name(&self) -> &str;
}
