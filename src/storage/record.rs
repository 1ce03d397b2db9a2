use std::collections::BTreeSet;
use chrono::Utc;
use serde_json::json;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Poly, Value, INDEXES_KEY, SEQUENCE_KEY, UPDATE_DATE_KEY};
use crate::index::tag_index::IndexEntry;

/// A document as held by a backend: caller data, the tags it is filed
/// under and its write position.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoly {
    pub poly: Poly,
    pub tags: BTreeSet<String>,
    pub timestamp: i64,         // ms since epoch
    pub seq: u64,
}

impl StoredPoly {
    pub fn new(mut poly: Poly, tags: BTreeSet<String>, timestamp: i64, seq: u64) -> Self {
        strip_write_metadata(&mut poly);
        StoredPoly { poly, tags, timestamp, seq }
    }

    pub fn id(&self) -> &str {
        self.poly.id()
    }

    pub fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            id: self.poly.id().to_string(),
            tags: self.tags.clone(),
            timestamp: self.timestamp,
            seq: self.seq,
        }
    }

    /// The document with `_indexes`, `_update_date` and `_seq` in its metadata.
    pub fn to_poly(&self) -> Poly {
        let mut poly = self.poly.clone();
        let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        poly.put_metadata(INDEXES_KEY, json!(tags));
        poly.put_metadata(UPDATE_DATE_KEY, self.timestamp);
        poly.put_metadata(SEQUENCE_KEY, self.seq);
        poly
    }

    /// Inverse of `to_poly`.
    pub fn from_poly(mut poly: Poly) -> Result<Self> {
        let tags = poly.tags();
        let timestamp = poly.fetch_metadata(UPDATE_DATE_KEY)
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::new(
                ErrorKind::Parse,
                format!("document {} has no {}", poly.id(), UPDATE_DATE_KEY),
            ))?;
        let seq = poly.fetch_metadata(SEQUENCE_KEY).and_then(Value::as_u64).unwrap_or(0);
        strip_write_metadata(&mut poly);
        Ok(StoredPoly { poly, tags, timestamp, seq })
    }
}

fn strip_write_metadata(poly: &mut Poly) {
    poly.metadata.remove(INDEXES_KEY);
    poly.metadata.remove(UPDATE_DATE_KEY);
    poly.metadata.remove(SEQUENCE_KEY);
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Ids must be non-empty before anything in a batch is applied.
pub fn validate_ids<'a, I>(ids: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    for id in ids {
        if id.trim().is_empty() {
            return Err(Error::invalid_argument("document id must not be empty"));
        }
    }
    Ok(())
}
