use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Serialize, Deserialize};
use serde_json::json;
use tracing::warn;
use crate::core::types::{Poly, COUNT_KEY};

pub const INDEX_SNAPSHOT_ID: &str = "_index";

/// Position of a document inside a tag's membership.
///
/// Ordered most-recent-first: timestamp descending, then write sequence
/// descending, then id. The sequence makes equal timestamps deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberKey {
    pub timestamp: i64,
    pub seq: u64,
    pub id: String,
}

impl Ord for MemberKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other.timestamp.cmp(&self.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for MemberKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// What the index needs to know about one stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: String,
    pub tags: BTreeSet<String>,
    pub timestamp: i64,
    pub seq: u64,
}

impl IndexEntry {
    pub fn key(&self) -> MemberKey {
        MemberKey {
            timestamp: self.timestamp,
            seq: self.seq,
            id: self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TagEntry {
    pub count: u64,
    pub members: BTreeSet<MemberKey>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexState {
    pub(crate) tags: HashMap<String, TagEntry>,
    pub(crate) documents: HashMap<String, (MemberKey, BTreeSet<String>)>,
}

impl IndexState {
    /// Re-filing an id first drops every membership it held.
    pub(crate) fn upsert(&mut self, entry: IndexEntry) -> u64 {
        let clamped = self.drop_document(&entry.id).1;
        let key = entry.key();
        for tag in &entry.tags {
            let tag_entry = self.tags.entry(tag.clone()).or_default();
            if tag_entry.members.insert(key.clone()) {
                tag_entry.count += 1;
            }
        }
        self.documents.insert(entry.id, (key, entry.tags));
        clamped
    }

    /// Returns the tags the document held and how many decrements had to be clamped.
    pub(crate) fn drop_document(&mut self, id: &str) -> (Option<BTreeSet<String>>, u64) {
        let Some((key, tags)) = self.documents.remove(id) else {
            return (None, 0);
        };

        let mut clamped = 0;
        for tag in &tags {
            let Some(entry) = self.tags.get_mut(tag) else {
                warn!(tag = %tag, id, "tag vanished from index before removal");
                clamped += 1;
                continue;
            };
            if !entry.members.remove(&key) {
                warn!(tag = %tag, id, "document missing from tag membership");
            }
            if entry.count == 0 {
                warn!(tag = %tag, id, "tag count already zero, clamping");
                clamped += 1;
            } else {
                entry.count -= 1;
            }
            if entry.count == 0 && entry.members.is_empty() {
                self.tags.remove(tag);
            }
        }
        (Some(tags), clamped)
    }

    pub(crate) fn inconsistent_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.iter()
            .filter(|(_, entry)| entry.count != entry.members.len() as u64)
            .map(|(tag, _)| tag.clone())
            .collect();
        tags.sort();
        tags
    }
}

/// Per-dataset tag index: tag -> {count, membership ordered most-recent-first}.
///
/// All mutation goes through one write lock, so splices on a tag are serialized
/// and a multi-tag update is never observed half-applied.
pub struct TagIndex {
    pub(crate) state: RwLock<IndexState>,
    inconsistencies: AtomicU64,
}

impl TagIndex {
    pub fn new() -> Self {
        TagIndex {
            state: RwLock::new(IndexState::default()),
            inconsistencies: AtomicU64::new(0),
        }
    }

    pub fn insert(&self, entry: IndexEntry) {
        let clamped = self.state.write().upsert(entry);
        self.record_clamped(clamped);
    }

    pub fn insert_batch(&self, entries: Vec<IndexEntry>) {
        let mut state = self.state.write();
        let mut clamped = 0;
        for entry in entries {
            clamped += state.upsert(entry);
        }
        drop(state);
        self.record_clamped(clamped);
    }

    /// Drop a document from every tag it held. Unknown ids are a no-op.
    pub fn remove(&self, id: &str) -> Option<BTreeSet<String>> {
        let (tags, clamped) = self.state.write().drop_document(id);
        self.record_clamped(clamped);
        tags
    }

    pub fn remove_batch<'a, I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.state.write();
        let mut removed = 0;
        let mut clamped = 0;
        for id in ids {
            let (tags, c) = state.drop_document(id);
            clamped += c;
            if tags.is_some() {
                removed += 1;
            }
        }
        drop(state);
        self.record_clamped(clamped);
        removed
    }

    pub fn tag_count(&self, tag: &str) -> u64 {
        self.state.read().tags.get(tag).map(|e| e.count).unwrap_or(0)
    }

    pub fn tags_of(&self, id: &str) -> Option<BTreeSet<String>> {
        self.state.read().documents.get(id).map(|(_, tags)| tags.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().documents.contains_key(id)
    }

    pub fn document_count(&self) -> usize {
        self.state.read().documents.len()
    }

    /// Ids at positions `[offset, offset + limit)` of the tag's membership.
    pub fn page(&self, tag: &str, offset: usize, limit: usize) -> Vec<String> {
        let state = self.state.read();
        match state.tags.get(tag) {
            Some(entry) => entry.members.iter()
                .skip(offset)
                .take(limit)
                .map(|k| k.id.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn members(&self, tag: &str) -> Vec<String> {
        let state = self.state.read();
        state.tags.get(tag)
            .map(|entry| entry.members.iter().map(|k| k.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Uniform sample without replacement of `min(count, membership)` ids.
    pub fn sample<R: Rng + ?Sized>(&self, tag: &str, count: usize, rng: &mut R) -> Vec<String> {
        let state = self.state.read();
        let Some(entry) = state.tags.get(tag) else {
            return Vec::new();
        };
        let amount = count.min(entry.members.len());
        if amount == 0 {
            return Vec::new();
        }
        let members: Vec<&MemberKey> = entry.members.iter().collect();
        rand::seq::index::sample(rng, members.len(), amount)
            .iter()
            .map(|i| members[i].id.clone())
            .collect()
    }

    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.state.read().tags.iter()
            .map(|(tag, entry)| (tag.clone(), entry.count))
            .collect()
    }

    /// Every tag with its count: `{tag: {"count": n}}`.
    pub fn snapshot(&self) -> Poly {
        snapshot_from_counts(&self.counts())
    }

    /// One tag with its count and ordered membership.
    pub fn tag_data(&self, tag: &str) -> Option<Poly> {
        let state = self.state.read();
        let entry = state.tags.get(tag)?;
        let members: Vec<&str> = entry.members.iter().map(|k| k.id.as_str()).collect();
        Some(
            Poly::new(tag)
                .with(COUNT_KEY, entry.count)
                .with("members", json!(members)),
        )
    }

    /// Tags whose count no longer matches their membership length.
    pub fn verify(&self) -> Vec<String> {
        self.state.read().inconsistent_tags()
    }

    /// Clamped over-decrements seen since creation.
    pub fn inconsistencies(&self) -> u64 {
        self.inconsistencies.load(AtomicOrdering::Relaxed)
    }

    fn record_clamped(&self, clamped: u64) {
        if clamped > 0 {
            self.inconsistencies.fetch_add(clamped, AtomicOrdering::Relaxed);
        }
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        TagIndex::new()
    }
}

pub fn snapshot_from_counts(counts: &BTreeMap<String, u64>) -> Poly {
    let mut poly = Poly::new(INDEX_SNAPSHOT_ID);
    for (tag, count) in counts {
        poly.put(tag.clone(), json!({ COUNT_KEY: count }));
    }
    poly
}
