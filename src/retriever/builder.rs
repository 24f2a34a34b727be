//! Retriever Builder - 하이브리드 검색기 조립
//!
//! 활성 프로바이더에 맞는 임베딩 클라이언트를 고르고,
//! 같은 문서 목록으로 벡터 저장소와 BM25 인덱스를 만들어 하나로 묶습니다.

use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, Result};

use super::{Bm25Retriever, Document, HybridRetriever, LanceVectorStore, VectorRetriever};

/// 하이브리드 검색기 빌더
pub struct RetrieverBuilder {
    settings: Settings,
    embedder: Arc<Embedder>,
}

impl RetrieverBuilder {
    /// 설정의 프로바이더로 임베딩 클라이언트 선택
    ///
    /// 알 수 없는 프로바이더면 `UnsupportedProvider`로 즉시 실패합니다.
    pub fn new(settings: &Settings) -> Result<Self> {
        let embedder = create_embedder(settings)?;
        Ok(Self {
            settings: settings.clone(),
            embedder: Arc::new(embedder),
        })
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// 문서 목록으로 하이브리드 검색기 생성
    ///
    /// 어느 단계든 실패하면 에러를 로그로 남기고 그대로 반환합니다 (부분 결과 없음).
    ///
    /// # Arguments
    /// * `docs` - 인덱싱할 문서 (비어 있으면 `EmptyDocuments`)
    pub async fn build_hybrid_retriever(&self, docs: &[Document]) -> Result<HybridRetriever> {
        self.build(docs).await.map_err(|e| {
            tracing::error!("Failed to build hybrid retriever: {}", e);
            e
        })
    }

    async fn build(&self, docs: &[Document]) -> Result<HybridRetriever> {
        if docs.is_empty() {
            return Err(RagError::EmptyDocuments);
        }

        let k = self.settings.vector_search_k;

        // 1. 벡터 저장소
        let store = LanceVectorStore::from_documents(
            docs,
            self.embedder.as_ref(),
            Path::new(&self.settings.vector_db_path),
            &self.settings.collection_name,
        )
        .await?;
        tracing::info!(
            "Vector store created with {} documents at {}",
            docs.len(),
            store.path().display()
        );

        // 2. BM25
        let bm25 = Bm25Retriever::from_documents(docs, k)?;
        tracing::info!("BM25 retriever created with {} documents", bm25.len());

        // 3. 벡터 top-K
        let vector = VectorRetriever::new(store, Arc::clone(&self.embedder), k);
        tracing::info!("Vector retriever created with k={}", k);

        // 4. 가중 통합
        let weights = self.settings.hybrid_retriever_weights;
        let hybrid = HybridRetriever::new(Box::new(bm25), Box::new(vector), weights, k);
        tracing::info!("Hybrid retriever created with weights {:?}", weights);

        Ok(hybrid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::{Retriever, SearchMethod};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// 텍스트 내용에 따라 고정된 임베딩을 돌려주는 응답기
    struct KeywordEmbeddings;

    fn embed_text(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        vec![
            if text.contains("cat") { 1.0 } else { 0.0 },
            if text.contains("rust") { 1.0 } else { 0.0 },
            if text.contains("ocean") { 1.0 } else { 0.0 },
        ]
    }

    impl Respond for KeywordEmbeddings {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let inputs: Vec<String> = match &body["input"] {
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .collect(),
                other => vec![other.as_str().unwrap_or_default().to_string()],
            };
            let data: Vec<serde_json::Value> = inputs
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    json!({"object": "embedding", "index": i, "embedding": embed_text(text)})
                })
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({"object": "list", "data": data}))
        }
    }

    async fn settings_with_mock(dir: &TempDir) -> (MockServer, Settings) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(KeywordEmbeddings)
            .mount(&server)
            .await;

        let settings = Settings {
            openai_api_key: "test-key".into(),
            openai_base_url: server.uri(),
            vector_db_path: dir.path().join("db").to_string_lossy().into_owned(),
            vector_search_k: 3,
            ..Settings::default()
        }
        .with_provider("openai");

        (server, settings)
    }

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("The cat sleeps on the sofa").with_metadata("source", "cats.md"),
            Document::new("Rust ownership rules explained").with_metadata("source", "rust.md"),
            Document::new("The ocean covers most of the planet")
                .with_metadata("source", "ocean.md"),
            Document::new("Borrowing in Rust avoids data races")
                .with_metadata("source", "rust2.md"),
        ]
    }

    #[tokio::test]
    async fn test_build_and_search() {
        let dir = TempDir::new().unwrap();
        let (_server, settings) = settings_with_mock(&dir).await;

        let builder = RetrieverBuilder::new(&settings).unwrap();
        let retriever = builder.build_hybrid_retriever(&corpus()).await.unwrap();
        assert_eq!(retriever.weights(), [0.4, 0.6]);
        assert_eq!(retriever.limit(), 3);

        let results = retriever.search("rust").await.unwrap();
        assert!(results.len() <= 3);
        assert!(results[0].document.page_content.contains("Rust"));
        assert_eq!(results[0].method, SearchMethod::Hybrid);

        // 같은 쿼리는 같은 결과
        let again = retriever.retrieve("rust").await.unwrap();
        let first: Vec<Document> = results.into_iter().map(|r| r.document).collect();
        assert_eq!(first, again);

        assert!(dir.path().join("db").exists());
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_corpus() {
        let dir = TempDir::new().unwrap();
        let (_server, settings) = settings_with_mock(&dir).await;
        let builder = RetrieverBuilder::new(&settings).unwrap();

        builder.build_hybrid_retriever(&corpus()).await.unwrap();

        let second = vec![
            Document::new("Rust macros generate code"),
            Document::new("The cat chases a mouse"),
        ];
        builder.build_hybrid_retriever(&second).await.unwrap();
        let retriever = builder.build_hybrid_retriever(&second).await.unwrap();

        let store = LanceVectorStore::open(&dir.path().join("db"), "documents")
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), second.len());

        for query in ["ocean", "rust", "cat sofa"] {
            let results = retriever.retrieve(query).await.unwrap();
            assert!(results.iter().all(|d| second.contains(d)), "{query}");
        }

        let rust = retriever.search("rust").await.unwrap();
        assert_eq!(rust[0].document.page_content, "Rust macros generate code");
        assert!((rust[0].score - (0.4 / 61.0 + 0.6 / 61.0)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_empty_documents_fail_before_io() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            vector_db_path: dir.path().join("never").to_string_lossy().into_owned(),
            ..Settings::default()
        }
        .with_provider("openai");

        let builder = RetrieverBuilder::new(&settings).unwrap();
        let result = builder.build_hybrid_retriever(&[]).await;

        assert!(matches!(result, Err(RagError::EmptyDocuments)));
        assert!(!dir.path().join("never").exists());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_returned() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&server)
            .await;

        let settings = Settings {
            openai_base_url: server.uri(),
            vector_db_path: dir.path().join("db").to_string_lossy().into_owned(),
            ..Settings::default()
        }
        .with_provider("openai");

        let builder = RetrieverBuilder::new(&settings).unwrap();
        let result = builder.build_hybrid_retriever(&corpus()).await;
        assert!(matches!(result, Err(RagError::Vendor { status: 401, .. })));
    }

    #[test]
    fn test_unsupported_provider() {
        let result = RetrieverBuilder::new(&Settings::default().with_provider("anthropic"));
        assert!(matches!(result, Err(RagError::UnsupportedProvider(p)) if p == "anthropic"));
    }
}
