//! 하이브리드 검색 - 가중 RRF (Reciprocal Rank Fusion)
//!
//! BM25 결과와 벡터 결과를 순위 기반으로 통합합니다.
//! score(d) = Σ weight_i / (rank_i(d) + 60), rank는 1부터 시작
//! source: https://plg.uwaterloo.ca/~gvcormac/cormacksigir09-rrf.pdf

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

use super::{Document, Retriever, ScoredDocument, SearchMethod};

/// RRF 상수
pub const RRF_K: f32 = 60.0;

/// 가중 RRF 통합
///
/// 같은 `page_content`를 가진 문서는 하나로 합칩니다.
/// 한 리스트 안에서 반복된 문서는 가장 높은 순위만 반영합니다.
/// 동점이면 먼저 나온 문서(앞쪽 리스트, 높은 순위)가 앞섭니다.
///
/// # Arguments
/// * `lists` - (검색 결과, 가중치) 목록. 첫 번째가 키워드, 두 번째가 벡터 결과
/// * `limit` - 반환할 최대 문서 수
pub fn weighted_rrf(lists: &[(&[Document], f32)], limit: usize) -> Vec<ScoredDocument> {
    struct Entry {
        document: Document,
        score: f32,
        seen_in: [bool; 2],
    }

    let mut order: Vec<Entry> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for (list_idx, (docs, weight)) in lists.iter().enumerate() {
        for (rank, doc) in docs.iter().enumerate() {
            let contribution = weight / (rank as f32 + 1.0 + RRF_K);
            let slot = list_idx.min(1);

            match index.get(doc.page_content.as_str()) {
                Some(&i) if order[i].seen_in[slot] => {}
                Some(&i) => {
                    order[i].score += contribution;
                    order[i].seen_in[slot] = true;
                }
                None => {
                    index.insert(doc.page_content.as_str(), order.len());
                    let mut seen_in = [false; 2];
                    seen_in[slot] = true;
                    order.push(Entry {
                        document: doc.clone(),
                        score: contribution,
                        seen_in,
                    });
                }
            }
        }
    }

    // stable sort - 동점은 첫 등장 순서 유지
    order.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    order
        .into_iter()
        .take(limit)
        .map(|entry| ScoredDocument {
            document: entry.document,
            score: entry.score,
            method: match entry.seen_in {
                [true, true] => SearchMethod::Hybrid,
                [true, false] => SearchMethod::Lexical,
                _ => SearchMethod::Vector,
            },
        })
        .collect()
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// BM25 + 벡터 하이브리드 검색기
///
/// 두 하위 검색기를 순서대로 호출한 뒤 가중 RRF로 합칩니다.
pub struct HybridRetriever {
    lexical: Box<dyn Retriever>,
    vector: Box<dyn Retriever>,
    weights: [f32; 2],
    limit: usize,
}

impl HybridRetriever {
    /// # Arguments
    /// * `lexical` - 키워드 검색기
    /// * `vector` - 벡터 검색기
    /// * `weights` - [키워드, 벡터] 가중치
    /// * `limit` - 통합 결과 최대 개수
    pub fn new(
        lexical: Box<dyn Retriever>,
        vector: Box<dyn Retriever>,
        weights: [f32; 2],
        limit: usize,
    ) -> Self {
        Self {
            lexical,
            vector,
            weights,
            limit,
        }
    }

    pub fn weights(&self) -> [f32; 2] {
        self.weights
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 스코어와 출처가 붙은 검색
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredDocument>> {
        let lexical = self.lexical.retrieve(query).await?;
        let vector = self.vector.retrieve(query).await?;

        tracing::debug!(
            "Hybrid search: {} {} hits, {} {} hits",
            lexical.len(),
            self.lexical.name(),
            vector.len(),
            self.vector.name()
        );

        Ok(weighted_rrf(
            &[
                (lexical.as_slice(), self.weights[0]),
                (vector.as_slice(), self.weights[1]),
            ],
            self.limit,
        ))
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        Ok(self
            .search(query)
            .await?
            .into_iter()
            .map(|scored| scored.document)
            .collect())
    }

    fn name(&self) -> &str {
        "hybrid"
    }
}
