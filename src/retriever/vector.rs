//! LanceDB Vector Store - 디스크 영속 벡터 검색
//!
//! 문서 임베딩을 설정된 디렉토리의 LanceDB 테이블에 저장하고
//! 쿼리 임베딩과 가까운 순으로 top-K 문서를 찾습니다.
//! ref: https://lancedb.github.io/lancedb/
//!
//! 같은 디렉토리에 여러 빌드가 동시에 쓰는 것은 지원하지 않습니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::embedding::{Embedder, EmbeddingProvider};
use crate::error::{RagError, Result};

use super::{Document, Retriever};

// ============================================================================
// Types
// ============================================================================

/// 벡터 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub document: Document,
    /// 유사도 (0.0 ~ 1.0, L2 거리에서 변환)
    pub similarity: f32,
}

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소
pub struct LanceVectorStore {
    db: Connection,
    table_name: String,
    path: PathBuf,
}

impl LanceVectorStore {
    /// 저장소 열기 (디렉토리가 없으면 생성)
    ///
    /// # Arguments
    /// * `path` - LanceDB 디렉토리
    /// * `table_name` - 컬렉션(테이블) 이름
    pub async fn open(path: &Path, table_name: &str) -> Result<Self> {
        if !path.exists() {
            tokio::fs::create_dir_all(path).await?;
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::Config(format!("Invalid path encoding: {:?}", path)))?;

        let db = lancedb::connect(path_str).execute().await?;

        Ok(Self {
            db,
            table_name: table_name.to_string(),
            path: path.to_path_buf(),
        })
    }

    /// 문서를 임베딩해 저장소에 적재
    ///
    /// 같은 이름의 테이블이 있으면 `docs`만 담은 새 테이블로 교체합니다.
    pub async fn from_documents(
        docs: &[Document],
        embedder: &dyn EmbeddingProvider,
        path: &Path,
        table_name: &str,
    ) -> Result<Self> {
        let texts: Vec<String> = docs.iter().map(|d| d.page_content.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        let store = Self::open(path, table_name).await?;
        store.replace_documents(docs, &embeddings).await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 테이블 스키마 (임베딩 차원은 첫 배치에서 결정)
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("page_content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 문서와 임베딩을 Arrow RecordBatch로 변환
    fn to_batch(docs: &[Document], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
        if docs.len() != embeddings.len() {
            return Err(RagError::Index(format!(
                "{} documents but {} embeddings",
                docs.len(),
                embeddings.len()
            )));
        }

        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        if dimension == 0 {
            return Err(RagError::Index("Cannot store empty embeddings".into()));
        }
        if embeddings.iter().any(|e| e.len() != dimension) {
            return Err(RagError::Index("Embeddings have inconsistent dimensions".into()));
        }

        let ids: Vec<String> = docs
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();
        let contents: Vec<&str> = docs.iter().map(|d| d.page_content.as_str()).collect();
        let metadata = docs
            .iter()
            .map(|d| serde_json::to_string(&d.metadata))
            .collect::<std::result::Result<Vec<String>, _>>()?;

        let values: Vec<f32> = embeddings.iter().flatten().copied().collect();
        let dimension = dimension as i32;
        let vectors = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dimension,
            Arc::new(Float32Array::from(values)) as Arc<dyn Array>,
            None,
        )?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(vectors),
            ],
        )?;

        Ok(batch)
    }

    async fn table_exists(&self) -> Result<bool> {
        let names = self.db.table_names().execute().await?;
        Ok(names.iter().any(|n| n == &self.table_name))
    }

    /// 문서 추가 (테이블이 있으면 이어서 추가)
    pub async fn add_documents(
        &self,
        docs: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        if docs.is_empty() {
            return Ok(0);
        }

        let batch = Self::to_batch(docs, embeddings)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await? {
            let table = self.db.open_table(&self.table_name).execute().await?;
            table.add(batches).execute().await?;
        } else {
            self.db
                .create_table(&self.table_name, batches)
                .execute()
                .await?;
        }

        tracing::debug!(
            "Stored {} vectors in {}/{}",
            docs.len(),
            self.path.display(),
            self.table_name
        );
        Ok(docs.len())
    }

    /// 테이블을 `docs`만으로 다시 만듦 (기존 행과 스키마는 버림)
    pub async fn replace_documents(
        &self,
        docs: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        // 변환이 실패하면 기존 테이블은 그대로 둠
        let batch = Self::to_batch(docs, embeddings)?;

        if self.table_exists().await? {
            self.db.drop_table(&self.table_name).await?;
            tracing::debug!("Dropped existing table {}", self.table_name);
        }

        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.db
            .create_table(&self.table_name, batches)
            .execute()
            .await?;

        tracing::debug!(
            "Replaced {}/{} with {} vectors",
            self.path.display(),
            self.table_name,
            docs.len()
        );
        Ok(docs.len())
    }

    /// 가까운 순으로 최대 `limit`개 검색
    pub async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        if !self.table_exists().await? {
            return Ok(vec![]);
        }

        let table = self.db.open_table(&self.table_name).execute().await?;
        let batches: Vec<RecordBatch> = table
            .vector_search(query_embedding.to_vec())?
            .limit(limit)
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut hits = Vec::new();

        for batch in batches {
            let contents = string_column(&batch, "page_content")?;
            let metadata = string_column(&batch, "metadata")?;
            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| RagError::Index("Missing _distance column".into()))?;

            for i in 0..batch.num_rows() {
                hits.push(VectorHit {
                    document: Document {
                        page_content: contents.value(i).to_string(),
                        metadata: serde_json::from_str(metadata.value(i))?,
                    },
                    similarity: 1.0 / (1.0 + distances.value(i)),
                });
            }
        }

        // 배치 경계와 무관하게 가까운 순 유지
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(hits)
    }

    /// 저장된 벡터 수
    pub async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }
        let table = self.db.open_table(&self.table_name).execute().await?;
        Ok(table.count_rows(None).await?)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RagError::Index(format!("Missing {} column", name)))
}

// ============================================================================
// VectorRetriever
// ============================================================================

/// 벡터 저장소를 감싼 top-K 검색기
pub struct VectorRetriever {
    store: LanceVectorStore,
    embedder: Arc<Embedder>,
    k: usize,
}

impl VectorRetriever {
    pub fn new(store: LanceVectorStore, embedder: Arc<Embedder>, k: usize) -> Self {
        Self { store, embedder, k }
    }

    /// 유사도가 붙은 검색
    pub async fn search(&self, query: &str) -> Result<Vec<VectorHit>> {
        let query_embedding = self.embedder.embed(query).await?;
        self.store.search(&query_embedding, self.k).await
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        Ok(self
            .search(query)
            .await?
            .into_iter()
            .map(|hit| hit.document)
            .collect())
    }

    fn name(&self) -> &str {
        "vector"
    }
}

// ============================================================================
// Tests
// ============================================================================
