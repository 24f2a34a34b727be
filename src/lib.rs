//! docrag - 멀티 프로바이더 LLM + 하이브리드 검색 계층
//!
//! 하나의 설정값으로 채팅 모델(watsonx, deepseek, openai, ollama)을 고르고,
//! SQLite FTS5 키워드 검색과 LanceDB 벡터 검색을 가중 RRF로 결합합니다.
//!
//! ```rust,ignore
//! let settings = Settings::load()?;
//! let llm = LlmFactory::get_llm(&settings, None, ChatParams::new())?;
//! let response = llm.chat(&[ChatMessage::user("Hi")], &ChatParams::new()).await?;
//!
//! let retriever = RetrieverBuilder::new(&settings)?.build_hybrid_retriever(&docs).await?;
//! let hits = retriever.search("query").await?;
//! ```

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod retriever;

mod http;

// Re-exports
pub use config::{Provider, ProviderConfig, Settings};
pub use embedding::{create_embedder, Embedder, EmbeddingProvider};
pub use error::{RagError, Result};
pub use llm::{ChatCapable, ChatMessage, ChatParams, ChatResponse, LlmClient, LlmFactory};
pub use retriever::{
    Document, HybridRetriever, Retriever, RetrieverBuilder, ScoredDocument, SearchMethod,
};
