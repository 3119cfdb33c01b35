//! Semantic Index - searchable embeddings of every stored entity.
//!
//! The index is derived data: the entity store pushes the current text of a
//! record on every write, and the whole index can be rebuilt from records.
//! Search applies the metadata filter before ranking, so every hit satisfies
//! the filter; hits are ordered by descending similarity, ties by ID.

mod embedding;
mod filter;

pub use embedding::*;
pub use filter::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

use story_bible::{EntityId, EntityKind, Metadata};

/// One indexed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: EntityId,
    pub text: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: EntityId,
    /// Similarity in `[0, 1]`; higher is more similar.
    pub score: f32,
    pub metadata: Metadata,
}

/// Embedding collection keyed by entity ID.
pub struct SemanticIndex {
    documents: BTreeMap<EntityId, IndexDocument>,
    embedder: Box<dyn Embedder>,
}

impl std::fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("documents", &self.documents.len())
            .field("dimensions", &self.embedder.dimensions())
            .finish()
    }
}

impl Default for SemanticIndex {
    fn default() -> Self {
        Self::new(Box::new(HashingEmbedder::default()))
    }
}

impl SemanticIndex {
    /// Create an empty index backed by `embedder`.
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self {
            documents: BTreeMap::new(),
            embedder,
        }
    }

    /// Insert or replace the document for `id`. Returns the stored document.
    ///
    /// `kind` must match the kind encoded in `id`.
    pub fn upsert(
        &mut self,
        kind: EntityKind,
        id: EntityId,
        text: &str,
        metadata: Metadata,
    ) -> &IndexDocument {
        debug_assert_eq!(kind, id.kind());
        let vector = match self.documents.get(&id) {
            // Re-embedding is the expensive part; skip it when the text is unchanged.
            Some(existing) if existing.text == text => existing.vector.clone(),
            _ => self.embedder.embed(text),
        };
        let document = IndexDocument {
            id,
            text: text.to_string(),
            metadata,
            vector,
        };
        self.documents.insert(id, document);
        &self.documents[&id]
    }

    /// Restore a previously persisted document.
    ///
    /// Documents whose vector length does not match the embedder are re-embedded.
    pub fn restore(&mut self, mut document: IndexDocument) {
        if document.vector.len() != self.embedder.dimensions() {
            document.vector = self.embedder.embed(&document.text);
        }
        self.documents.insert(document.id, document);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<IndexDocument> {
        self.documents.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&IndexDocument> {
        self.documents.get(&id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Rank documents matching `filter` by similarity to `query_text`.
    pub fn search(&self, query_text: &str, limit: usize, filter: &MetadataFilter) -> Vec<SearchHit> {
        let query = self.embedder.embed(query_text);

        let mut hits: Vec<SearchHit> = self
            .documents
            .values()
            .filter(|doc| filter.matches(doc.id, &doc.metadata))
            .map(|doc| {
                let score = cosine_similarity(&query, &doc.vector);
                trace!(id = %doc.id, score, "scored index document");
                SearchHit {
                    id: doc.id,
                    score,
                    metadata: doc.metadata.clone(),
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        hits
    }

    /// Iterate over all documents in ID order.
    pub fn documents(&self) -> impl Iterator<Item = &IndexDocument> {
        self.documents.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(seq: u32) -> EntityId {
        EntityId::new(EntityKind::Scene, seq)
    }

    fn meta(tick: u32, pov: &str) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("tick".to_string(), tick.into());
        meta.insert("pov".to_string(), pov.into());
        meta
    }

    fn setup_index() -> SemanticIndex {
        let mut index = SemanticIndex::default();
        index.upsert(
            EntityKind::Scene,
            scene(0),
            "The smugglers unload crates at the harbor",
            meta(0, "C0"),
        );
        index.upsert(
            EntityKind::Scene,
            scene(1),
            "A quiet breakfast in the orchard house",
            meta(1, "C1"),
        );
        index.upsert(
            EntityKind::Scene,
            scene(2),
            "Harbor guards chase the smugglers through the market",
            meta(2, "C0"),
        );
        index
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let index = setup_index();
        let hits = index.search("smugglers at the harbor", 10, &MetadataFilter::new());

        assert_eq!(hits.len(), 3);
        assert_ne!(hits[0].id, scene(1));
        assert_eq!(hits.last().map(|h| h.id), Some(scene(1)));
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_search_respects_filter_and_limit() {
        let index = setup_index();
        let filter = MetadataFilter::new().equals("pov", "C0");
        let hits = index.search("breakfast in the orchard", 10, &filter);

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.metadata["pov"].as_text() == Some("C0")));

        let limited = index.search("harbor", 1, &MetadataFilter::new());
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_ties_break_by_id() {
        let mut index = SemanticIndex::default();
        index.upsert(EntityKind::Scene, scene(5), "identical text", Metadata::new());
        index.upsert(EntityKind::Scene, scene(3), "identical text", Metadata::new());
        index.upsert(EntityKind::Scene, scene(4), "identical text", Metadata::new());

        let ids: Vec<_> = index
            .search("identical text", 10, &MetadataFilter::new())
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec![scene(3), scene(4), scene(5)]);
    }

    #[test]
    fn test_upsert_replaces_document() {
        let mut index = setup_index();
        index.upsert(EntityKind::Scene, scene(1), "Smugglers again", meta(1, "C1"));

        assert_eq!(index.len(), 3);
        assert_eq!(index.get(scene(1)).unwrap().text, "Smugglers again");
    }

    #[test]
    fn test_restore_reembeds_mismatched_vectors() {
        let mut index = SemanticIndex::default();
        index.restore(IndexDocument {
            id: scene(0),
            text: "storm".to_string(),
            metadata: Metadata::new(),
            vector: vec![1.0, 2.0],
        });
        assert_eq!(index.get(scene(0)).unwrap().vector.len(), 256);
    }
}
