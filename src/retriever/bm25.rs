//! BM25 키워드 검색기 - 인메모리 SQLite FTS5
//!
//! 문서 목록에서 바로 FTS5 인덱스를 만들고 `bm25()` 함수로 순위를 매깁니다.
//! source: https://www.sqlite.org/fts5.html#the_bm25_function

use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use rusqlite::{params, Connection};

use crate::error::{RagError, Result};

use super::{Document, Retriever};

/// BM25 검색기
///
/// 쿼리의 단어 중 하나라도 포함한 문서를 찾습니다 (OR 검색).
pub struct Bm25Retriever {
    conn: Mutex<Connection>,
    k: usize,
    len: usize,
}

impl Bm25Retriever {
    /// 문서 목록에서 생성
    ///
    /// # Arguments
    /// * `docs` - 인덱싱할 문서
    /// * `k` - 검색 시 반환할 최대 문서 수
    pub fn from_documents(docs: &[Document], k: usize) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;

        conn.execute(
            "CREATE VIRTUAL TABLE docs_fts USING fts5(page_content, metadata UNINDEXED)",
            [],
        )?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO docs_fts(rowid, page_content, metadata) VALUES (?1, ?2, ?3)",
            )?;
            for (i, doc) in docs.iter().enumerate() {
                let metadata = serde_json::to_string(&doc.metadata)?;
                stmt.execute(params![i as i64, doc.page_content, metadata])?;
            }
        }
        tx.commit()?;

        tracing::debug!("BM25 index built with {} documents", docs.len());

        Ok(Self {
            conn: Mutex::new(conn),
            k,
            len: docs.len(),
        })
    }

    /// 인덱싱된 문서 수
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 동기 검색 (BM25 순)
    ///
    /// 동점이면 먼저 추가된 문서가 앞섭니다.
    pub fn search(&self, query: &str) -> Result<Vec<Document>> {
        let match_expr = build_match_query(query);
        if match_expr.is_empty() {
            return Ok(vec![]);
        }

        let conn = self
            .conn
            .lock()
            .map_err(|e| RagError::Index(format!("Lock error: {}", e)))?;

        let mut stmt = conn.prepare(
            "SELECT page_content, metadata FROM docs_fts
             WHERE docs_fts MATCH ?1
             ORDER BY bm25(docs_fts), rowid
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![match_expr, self.k as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (page_content, metadata) = row?;
            docs.push(Document {
                page_content,
                metadata: serde_json::from_str(&metadata)?,
            });
        }

        Ok(docs)
    }
}

#[async_trait]
impl Retriever for Bm25Retriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        self.search(query)
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

/// FTS5 MATCH 식 생성
///
/// 단어만 추출해 각각 따옴표로 감싸고 OR로 잇습니다.
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
fn build_match_query(query: &str) -> String {
    static WORD_RE: OnceLock<Regex> = OnceLock::new();
    let word_re = WORD_RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}_]+").unwrap());
    word_re
        .find_iter(query)
        .map(|m| format!("\"{}\"", m.as_str().to_lowercase()))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("Rust is a systems programming language").with_metadata("id", 1),
            Document::new("Python is popular for data science").with_metadata("id", 2),
            Document::new("Rust borrow checker prevents data races in Rust programs")
                .with_metadata("id", 3),
            Document::new("Cooking pasta takes ten minutes").with_metadata("id", 4),
        ]
    }

    #[test]
    fn test_build_match_query() {
        assert_eq!(build_match_query("hello world"), "\"hello\" OR \"world\"");
        assert_eq!(build_match_query("  "), "");
        assert_eq!(
            build_match_query("C++ \"quoted\" AND-NOT"),
            "\"c\" OR \"quoted\" OR \"and\" OR \"not\""
        );
        assert_eq!(build_match_query("한국어 검색"), "\"한국어\" OR \"검색\"");
    }

    #[test]
    fn test_most_relevant_first() {
        let retriever = Bm25Retriever::from_documents(&corpus(), 10).unwrap();
        let results = retriever.search("rust").unwrap();

        assert_eq!(results.len(), 2);
        // "Rust"가 두 번 나오는 문서가 먼저
        assert_eq!(results[0].metadata.get("id"), Some(&serde_json::json!(3)));
        assert_eq!(results[1].metadata.get("id"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_or_semantics() {
        let retriever = Bm25Retriever::from_documents(&corpus(), 10).unwrap();
        let results = retriever.search("pasta science").unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_limit_k() {
        let retriever = Bm25Retriever::from_documents(&corpus(), 1).unwrap();
        let results = retriever.search("rust data").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_no_match_and_empty_query() {
        let retriever = Bm25Retriever::from_documents(&corpus(), 10).unwrap();
        assert!(retriever.search("kubernetes").unwrap().is_empty());
        assert!(retriever.search("!!!").unwrap().is_empty());
    }

    #[test]
    fn test_empty_index() {
        let retriever = Bm25Retriever::from_documents(&[], 10).unwrap();
        assert!(retriever.is_empty());
        assert!(retriever.search("anything").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retriever_trait() {
        let retriever = Bm25Retriever::from_documents(&corpus(), 10).unwrap();
        let docs = retriever.retrieve("python").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "Python is popular for data science");
    }
}
