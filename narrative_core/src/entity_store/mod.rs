//! Entity Store - typed CRUD over every narrative record.
//!
//! The store is the sole source of truth. It:
//! - allocates stable, never-reused IDs from a persisted per-kind counter
//! - persists every record through a [`StoreBackend`]
//! - pushes each written record's text into the [`SemanticIndex`] so the two
//!   never diverge

mod backend;

pub use backend::*;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use story_bible::{
    normalize_name, ordered_pair, Character, Entity, EntityId, EntityKind, OpenLoop, Relationship,
    Scene,
};

use crate::error::{NarrativeError, Result};
use crate::semantic_index::{IndexDocument, SemanticIndex};

const META_NAMESPACE: &str = "meta";
const EMBEDDING_NAMESPACE: &str = "embeddings";
const COUNTERS_KEY: &str = "counters";

/// Typed record store backed by a [`StoreBackend`].
pub struct EntityStore {
    backend: Box<dyn StoreBackend>,
    records: BTreeMap<EntityKind, BTreeMap<EntityId, Value>>,
    /// Next sequence number per kind.
    counters: BTreeMap<EntityKind, u32>,
    index: SemanticIndex,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("counters", &self.counters)
            .field("index", &self.index)
            .finish()
    }
}

impl EntityStore {
    /// Create an empty store that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
            records: BTreeMap::new(),
            counters: BTreeMap::new(),
            index: SemanticIndex::default(),
        }
    }

    /// Open a store over `backend` with the default embedder.
    pub fn open(backend: Box<dyn StoreBackend>) -> Result<Self> {
        Self::open_with_index(backend, SemanticIndex::default())
    }

    /// Open a store over `backend`, restoring records, counters and embeddings.
    ///
    /// Embeddings that are missing or stale are recomputed from the records.
    pub fn open_with_index(backend: Box<dyn StoreBackend>, index: SemanticIndex) -> Result<Self> {
        let mut store = Self {
            backend,
            records: BTreeMap::new(),
            counters: BTreeMap::new(),
            index,
        };

        if let Some(value) = store.backend.get(META_NAMESPACE, COUNTERS_KEY)? {
            store.counters = serde_json::from_value(value)?;
        }

        for kind in EntityKind::ALL {
            for (key, value) in store.backend.list(kind.as_str())? {
                let id: EntityId = key.parse()?;
                // A lost counter file must never let an ID be handed out twice.
                let next = store.counters.entry(kind).or_insert(kind.first_seq());
                *next = (*next).max(id.seq() + 1);
                store.records.entry(kind).or_default().insert(id, value);
            }
        }

        let mut persisted: BTreeMap<EntityId, IndexDocument> = BTreeMap::new();
        for (_, value) in store.backend.list(EMBEDDING_NAMESPACE)? {
            let document: IndexDocument = serde_json::from_value(value)?;
            persisted.insert(document.id, document);
        }
        store.rebuild_index(persisted)?;

        debug!(
            records = store.records.values().map(|r| r.len()).sum::<usize>(),
            indexed = store.index.len(),
            "entity store opened"
        );
        Ok(store)
    }

    fn rebuild_index(&mut self, mut persisted: BTreeMap<EntityId, IndexDocument>) -> Result<()> {
        let stored = self
            .records
            .iter()
            .flat_map(|(kind, records)| records.iter().map(move |(id, v)| (*kind, *id, v.clone())))
            .collect::<Vec<_>>();

        for (kind, id, value) in stored {
            let (text, metadata) = index_payload(kind, value)?;
            match persisted.remove(&id) {
                Some(document) if document.text == text => self.index.restore(document),
                _ => {
                    self.index.upsert(kind, id, &text, metadata);
                    self.persist_embedding(id)?;
                }
            }
        }
        Ok(())
    }

    /// The ID the next `create` of `kind` will return.
    pub fn peek_next_id(&self, kind: EntityKind) -> EntityId {
        EntityId::new(kind, self.next_seq(kind))
    }

    fn next_seq(&self, kind: EntityKind) -> u32 {
        self.counters
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.first_seq())
    }

    fn allocate(&mut self, kind: EntityKind) -> Result<EntityId> {
        let seq = self.next_seq(kind);
        self.counters.insert(kind, seq + 1);
        // Persist the counter before the record so a crash can only leave a gap.
        let counters = serde_json::to_value(&self.counters)?;
        self.backend.put(META_NAMESPACE, COUNTERS_KEY, &counters)?;
        Ok(EntityId::new(kind, seq))
    }

    /// Allocate the next ID for the record's kind, persist it, and return the ID.
    pub fn create<T: Entity>(&mut self, mut fields: T) -> Result<EntityId> {
        let id = self.allocate(T::KIND)?;
        fields.set_id(id);
        self.write(&fields)?;
        debug!(%id, kind = %T::KIND, "entity created");
        Ok(id)
    }

    /// Overwrite an existing record. Saving the same value twice is a no-op in effect.
    ///
    /// Fails with `NotFound` when the ID was never created by this store.
    pub fn save<T: Entity>(&mut self, entity: &T) -> Result<()> {
        let id = entity.id();
        if id.kind() != T::KIND || !self.contains(id) {
            return Err(NarrativeError::not_found(id));
        }
        self.write(entity)
    }

    fn write<T: Entity>(&mut self, entity: &T) -> Result<()> {
        let id = entity.id();
        let value = serde_json::to_value(entity)?;
        self.backend.put(T::KIND.as_str(), &id.to_string(), &value)?;
        self.records.entry(T::KIND).or_default().insert(id, value);

        self.index
            .upsert(T::KIND, id, &entity.index_text(), entity.index_metadata());
        self.persist_embedding(id)
    }

    fn persist_embedding(&mut self, id: EntityId) -> Result<()> {
        if let Some(document) = self.index.get(id) {
            let value = serde_json::to_value(document)?;
            self.backend.put(EMBEDDING_NAMESPACE, &id.to_string(), &value)?;
        }
        Ok(())
    }

    /// Load a record by ID.
    pub fn load<T: Entity>(&self, id: EntityId) -> Result<T> {
        if id.kind() != T::KIND {
            return Err(NarrativeError::not_found(id));
        }
        let value = self
            .records
            .get(&T::KIND)
            .and_then(|records| records.get(&id))
            .ok_or_else(|| NarrativeError::not_found(id))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.records
            .get(&id.kind())
            .map(|records| records.contains_key(&id))
            .unwrap_or(false)
    }

    /// IDs of `kind` in creation order.
    pub fn list(&self, kind: EntityKind) -> Vec<EntityId> {
        self.records
            .get(&kind)
            .map(|records| records.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.records.get(&kind).map(|r| r.len()).unwrap_or(0)
    }

    /// Every record of type `T`, in creation order.
    pub fn load_all<T: Entity>(&self) -> Result<Vec<T>> {
        self.records
            .get(&T::KIND)
            .map(|records| {
                records
                    .values()
                    .map(|v| serde_json::from_value(v.clone()).map_err(NarrativeError::from))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Read access to the semantic index. Mutation only happens through writes.
    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    /// Store the full prose of a scene.
    pub fn put_scene_text(&mut self, scene: &Scene, text: &str) -> Result<()> {
        self.backend.put_text(&scene.text_ref, text)
    }

    /// Load the full prose of a scene, if it was stored.
    pub fn scene_text(&self, scene: &Scene) -> Result<Option<String>> {
        self.backend.get_text(&scene.text_ref)
    }

    /// Persist an auxiliary document (story state, outline, ...).
    pub fn put_meta<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.backend.put(META_NAMESPACE, name, &value)
    }

    pub fn get_meta<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.backend.get(META_NAMESPACE, name)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Find a character whose full or display name matches `name`.
    ///
    /// When several match, the oldest wins.
    pub fn find_character_by_name(&self, name: &str) -> Result<Option<Character>> {
        if normalize_name(name).is_empty() {
            return Ok(None);
        }
        Ok(self
            .load_all::<Character>()?
            .into_iter()
            .find(|c| c.answers_to(name)))
    }

    /// The relationship between two characters, regardless of argument order.
    pub fn find_relationship(&self, a: EntityId, b: EntityId) -> Result<Option<Relationship>> {
        let pair = ordered_pair(a, b);
        Ok(self
            .load_all::<Relationship>()?
            .into_iter()
            .find(|r| r.pair() == pair))
    }

    pub fn find_loop_by_fingerprint(&self, fingerprint: &str) -> Result<Option<OpenLoop>> {
        Ok(self
            .load_all::<OpenLoop>()?
            .into_iter()
            .find(|l| l.fingerprint == fingerprint))
    }

    /// The committed scene for `tick`, if any.
    pub fn scene_for_tick(&self, tick: u32) -> Result<Option<Scene>> {
        Ok(self
            .load_all::<Scene>()?
            .into_iter()
            .find(|s| s.tick == tick))
    }

    /// Scenes in chronological (tick) order.
    pub fn scenes_chronological(&self) -> Result<Vec<Scene>> {
        let mut scenes = self.load_all::<Scene>()?;
        scenes.sort_by_key(|s| (s.tick, s.id));
        Ok(scenes)
    }
}

/// Reconstruct index text and metadata from a raw record.
fn index_payload(
    kind: EntityKind,
    value: Value,
) -> Result<(String, story_bible::Metadata)> {
    fn typed<T: Entity>(value: Value) -> Result<(String, story_bible::Metadata)> {
        let entity: T = serde_json::from_value(value)?;
        Ok((entity.index_text(), entity.index_metadata()))
    }

    match kind {
        EntityKind::Character => typed::<Character>(value),
        EntityKind::Location => typed::<story_bible::Location>(value),
        EntityKind::Relationship => typed::<Relationship>(value),
        EntityKind::Scene => typed::<Scene>(value),
        EntityKind::OpenLoop => typed::<OpenLoop>(value),
        EntityKind::Goal => typed::<story_bible::Goal>(value),
        EntityKind::LoreItem => typed::<story_bible::LoreItem>(value),
        EntityKind::PlotBeat => {
            warn!("plot beats are not stored as entity records; ignoring");
            Ok((String::new(), story_bible::Metadata::new()))
        }
    }
}
