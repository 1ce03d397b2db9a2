use std::collections::{BTreeSet, HashMap};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use crate::index::tag_index::{IndexEntry, IndexState, MemberKey, TagEntry, TagIndex};

/// Below this many documents the sequential build is faster than fanning out.
const PARALLEL_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub documents: usize,
    pub tags: usize,
    /// Tags whose count had drifted from their membership before the rebuild.
    pub inconsistent: Vec<String>,
    /// Tags whose count differs between the old and rebuilt index.
    pub changed: usize,
}

impl RebuildReport {
    pub fn is_clean(&self) -> bool {
        self.inconsistent.is_empty()
    }
}

/// Build a fresh index state from the authoritative document set.
///
/// Ids are expected to be unique; when they are not the last entry wins.
pub fn build_state(entries: Vec<IndexEntry>) -> IndexState {
    if entries.len() < PARALLEL_THRESHOLD {
        let mut state = IndexState::default();
        for entry in entries {
            state.upsert(entry);
        }
        return state;
    }

    let mut documents: HashMap<String, (MemberKey, BTreeSet<String>)> =
        HashMap::with_capacity(entries.len());
    for entry in entries {
        let key = entry.key();
        documents.insert(entry.id, (key, entry.tags));
    }

    let grouped: HashMap<String, Vec<MemberKey>> = documents
        .par_iter()
        .fold(HashMap::new, |mut acc: HashMap<String, Vec<MemberKey>>, (_, (key, tags))| {
            for tag in tags {
                acc.entry(tag.clone()).or_default().push(key.clone());
            }
            acc
        })
        .reduce(HashMap::new, |mut left, right| {
            for (tag, mut keys) in right {
                left.entry(tag).or_default().append(&mut keys);
            }
            left
        });

    let tags: HashMap<String, TagEntry> = grouped
        .into_par_iter()
        .map(|(tag, keys)| {
            let members: BTreeSet<MemberKey> = keys.into_iter().collect();
            let entry = TagEntry {
                count: members.len() as u64,
                members,
            };
            (tag, entry)
        })
        .collect();

    IndexState { tags, documents }
}

impl TagIndex {
    /// Discard the index and rebuild it from `entries`.
    ///
    /// The new state is built without holding the lock and swapped in under
    /// one write, so readers see either the old or the new index.
    pub fn recalculate(&self, entries: Vec<IndexEntry>) -> RebuildReport {
        let rebuilt = build_state(entries);

        let mut state = self.state.write();
        let inconsistent = state.inconsistent_tags();
        for tag in &inconsistent {
            let entry = &state.tags[tag];
            warn!(
                tag = %tag,
                count = entry.count,
                members = entry.members.len(),
                "tag count diverged from membership, corrected by rebuild"
            );
        }

        let changed = changed_tags(&state, &rebuilt);
        if changed > 0 {
            debug!(changed, "rebuild adjusted tag counts");
        }

        let report = RebuildReport {
            documents: rebuilt.documents.len(),
            tags: rebuilt.tags.len(),
            inconsistent,
            changed,
        };
        *state = rebuilt;
        drop(state);

        info!(documents = report.documents, tags = report.tags, "index rebuilt");
        report
    }
}

fn changed_tags(old: &IndexState, new: &IndexState) -> usize {
    let mut changed = old.tags.iter()
        .filter(|(tag, entry)| new.tags.get(*tag).map(|e| e.count) != Some(entry.count))
        .count();
    changed += new.tags.keys()
        .filter(|tag| !old.tags.contains_key(*tag))
        .count();
    changed
}
