//! Query execution.

use newsdesk_core::{Error, Result, SearchHit};
use newsdesk_index::VectorIndex;
use std::sync::Arc;
use tracing::debug;

use crate::parser::{ParsedQuery, QueryParser};

/// Query executor.
pub struct QueryExecutor {
    /// Vector index to search
    index: Arc<VectorIndex>,
    /// Query parser
    parser: QueryParser,
    /// Upper bound on any requested limit
    max_limit: usize,
}

impl QueryExecutor {
    /// Create a new query executor.
    pub fn new(index: Arc<VectorIndex>, default_limit: usize, max_limit: usize) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            index,
            parser: QueryParser::new(default_limit.min(max_limit)),
            max_limit,
        }
    }

    pub fn parser(&self) -> &QueryParser {
        &self.parser
    }

    /// Execute a query string.
    pub async fn execute(&self, query_str: &str) -> Result<Vec<SearchHit>> {
        debug!("Executing query: {}", query_str);
        self.execute_parsed(self.parser.parse(query_str)).await
    }

    /// Execute with a pre-parsed query.
    pub async fn execute_parsed(&self, parsed: ParsedQuery) -> Result<Vec<SearchHit>> {
        if parsed.text.trim().is_empty() {
            return Err(Error::Other("query has no search text".to_string()));
        }
        let limit = parsed.limit.min(self.max_limit);
        let filter = (!parsed.filter.is_empty()).then_some(&parsed.filter);

        let outcome = self.index.search(&parsed.text, limit, filter).await;
        match outcome.error {
            None => {
                debug!("Found {} results", outcome.hits.len());
                Ok(outcome.hits)
            }
            Some(error) => Err(Error::Other(format!("search failed: {error}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsdesk_core::{DocumentMetadata, IndexDocument};
    use newsdesk_embed::{EmbedderPool, HashingEmbedder};
    use newsdesk_index::VectorIndexConfig;
    use newsdesk_store::MemoryStore;

    async fn seeded_index(n: usize) -> Arc<VectorIndex> {
        let pool = Arc::new(EmbedderPool::new(Arc::new(HashingEmbedder::new(64)), 2));
        let index = VectorIndex::open(Arc::new(MemoryStore::new()), pool, VectorIndexConfig::default())
            .await
            .unwrap();
        for i in 0..n {
            let source = if i % 2 == 0 { "Reuters" } else { "Bloomberg" };
            let document = IndexDocument {
                id: format!("article-{i}"),
                text: format!("market update number {i} on energy prices"),
                metadata: DocumentMetadata {
                    title: format!("Update {i}"),
                    source: source.to_string(),
                    doc_type: "article".to_string(),
                    ..Default::default()
                },
            };
            assert!(index.upsert(&document).await.success);
        }
        Arc::new(index)
    }

    #[tokio::test]
    async fn test_execute_simple_query() {
        let executor = QueryExecutor::new(seeded_index(4).await, 10, 100);
        let hits = executor.execute("energy prices").await.unwrap();
        assert_eq!(hits.len(), 4);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn test_execute_with_filter() {
        let executor = QueryExecutor::new(seeded_index(6).await, 10, 100);
        let hits = executor.execute("energy source:Bloomberg").await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.metadata.source == "Bloomberg"));
    }

    #[tokio::test]
    async fn test_limit_in_query_is_clamped() {
        let executor = QueryExecutor::new(seeded_index(8).await, 2, 5);
        assert_eq!(executor.execute("energy").await.unwrap().len(), 2);
        assert_eq!(executor.execute("energy limit:3").await.unwrap().len(), 3);
        assert_eq!(executor.execute("energy limit:500").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_execute_empty_results() {
        let executor = QueryExecutor::new(seeded_index(0).await, 10, 100);
        assert!(executor.execute("anything").await.unwrap().is_empty());

        let executor = QueryExecutor::new(seeded_index(2).await, 10, 100);
        let hits = executor.execute("energy type:upload").await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_filter_only_query_is_rejected() {
        let executor = QueryExecutor::new(seeded_index(1).await, 10, 100);
        assert!(executor.execute("source:Reuters").await.is_err());
    }
}
