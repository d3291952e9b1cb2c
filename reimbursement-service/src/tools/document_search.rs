use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::Row;
use tracing::{error, info};

use crate::domain::ToolName;

use super::{Tool, ToolScope};

pub const UNAVAILABLE_MESSAGE: &str = "ERROR: The documentation database is not available.";
pub const NOT_FOUND_MESSAGE: &str = "No relevant information about that topic was found in the \
documentation. Tell the user you do not have that detail.";

const TOP_K: i64 = 3;
// Applied to a cosine similarity (1 - distance), so `>` keeps the most
// similar candidates. Against a raw distance score this comparison inverts.
const SIMILARITY_THRESHOLD: f32 = 0.7;
const DELIMITER: &str = "\n---\n";

#[derive(Debug, Deserialize)]
struct SearchArgs {
    question: String,
}

#[derive(Debug, Clone)]
pub struct DocCandidate {
    pub content: String,
    pub source: String,
    pub score: f32,
}

/// Similarity search over the reimbursement documentation index (pgvector).
pub struct DocumentSearchTool {
    pool: Option<PgPool>,
}

impl DocumentSearchTool {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    async fn search(&self, pool: &PgPool, question: &str) -> anyhow::Result<Vec<DocCandidate>> {
        let embedding = embed_query(question).await?;
        let vector_literal = format!(
            "[{}]",
            embedding
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        let rows = sqlx::query(
            r#"
            SELECT content, source, 1 - (embedding <=> $1::vector) AS score
            FROM reimbursement_documents
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
        )
        .bind(vector_literal)
        .bind(TOP_K)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DocCandidate {
                content: row.get("content"),
                source: row.get("source"),
                score: row.get::<f64, _>("score") as f32,
            })
            .collect())
    }
}

/// Keep candidates above the similarity cutoff and concatenate them with
/// their source attribution. `None` when nothing qualifies.
pub fn format_context(candidates: &[DocCandidate]) -> Option<String> {
    let retained: Vec<String> = candidates
        .iter()
        .filter(|c| c.score > SIMILARITY_THRESHOLD)
        .map(|c| format!("Context: {} (Source: {})", c.content, c.source))
        .collect();

    if retained.is_empty() {
        None
    } else {
        Some(retained.join(DELIMITER))
    }
}

/// Generate an embedding for the query text using fastembed. The ONNX
/// inference is off-loaded to a blocking thread.
async fn embed_query(text: &str) -> anyhow::Result<Vec<f32>> {
    let input = text.to_owned();
    let embedding = tokio::task::spawn_blocking(move || {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let mut model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))?;
        let embeddings = model.embed(vec![input], None)?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedding model returned no output"))
    })
    .await??;
    Ok(embedding)
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> ToolName {
        ToolName::DocumentSearch
    }

    fn usage(&self) -> &'static str {
        concat!(
            "document_search: searches the reimbursement documentation for procedures, ",
            "policies, requirements and general information. ",
            "Arguments: {\"question\": string}.",
        )
    }

    async fn call(&self, args: Value, _scope: &ToolScope) -> String {
        let args: SearchArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return format!("Invalid arguments for document_search (expected question): {e}"),
        };

        let Some(pool) = self.pool.as_ref() else {
            return UNAVAILABLE_MESSAGE.to_string();
        };

        match self.search(pool, &args.question).await {
            Ok(candidates) => {
                info!(candidates = candidates.len(), "document search completed");
                format_context(&candidates).unwrap_or_else(|| NOT_FOUND_MESSAGE.to_string())
            }
            Err(e) => {
                error!(error = %e, "document search failed");
                format!("Failed to search the documentation index. Details: {e}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(content: &str, source: &str, score: f32) -> DocCandidate {
        DocCandidate {
            content: content.to_string(),
            source: source.to_string(),
            score,
        }
    }

    #[test]
    fn below_threshold_candidates_are_dropped() {
        let candidates = vec![
            candidate("refund steps", "manual.pdf", 0.91),
            candidate("unrelated", "other.pdf", 0.42),
        ];
        let context = format_context(&candidates).unwrap();
        assert!(context.contains("refund steps"));
        assert!(context.contains("(Source: manual.pdf)"));
        assert!(!context.contains("unrelated"));
    }

    #[test]
    fn empty_result_set_yields_none() {
        assert!(format_context(&[]).is_none());
        let low = vec![candidate("x", "y.pdf", 0.1)];
        assert!(format_context(&low).is_none());
    }

    #[test]
    fn retained_candidates_are_delimited() {
        let candidates = vec![
            candidate("part one", "a.pdf", 0.8),
            candidate("part two", "b.pdf", 0.75),
        ];
        let context = format_context(&candidates).unwrap();
        assert_eq!(context.matches("\n---\n").count(), 1);
    }
}
