use serde::{Serialize, Deserialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

pub type Value = serde_json::Value;

/// Implicit tag every document is filed under unless the caller opts out.
pub const DATE_TAG: &str = "_date";

pub const CONFIG_ID: &str = "_config";
pub const METADATA_ID: &str = "_metadata";
pub const ITEM_PER_PAGE: &str = "item_per_page";
pub const DEFAULT_ITEM_PER_PAGE: usize = 10;

// Metadata keys attached to persisted documents and datasets
pub const INDEXES_KEY: &str = "_indexes";
pub const UPDATE_DATE_KEY: &str = "_update_date";
pub const CREATE_DATE_KEY: &str = "_create_date";
pub const SEQUENCE_KEY: &str = "_seq";
pub const COUNT_KEY: &str = "count";

/// A document: immutable id, free-form data and out-of-band metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Poly {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Poly {
    pub fn new(id: impl Into<String>) -> Self {
        Poly {
            id: id.into(),
            data: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_generated_id() -> Self {
        Poly::new(Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn fetch(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn fetch_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Numbers stored either natively or as decimal strings.
    pub fn fetch_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(value_as_u64)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put_metadata(key, value);
        self
    }

    pub fn put_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn fetch_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Tags recorded on a persisted document.
    pub fn tags(&self) -> BTreeSet<String> {
        match self.metadata.get(INDEXES_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => BTreeSet::new(),
        }
    }
}

pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Ordered result set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolyList {
    items: Vec<Poly>,
}

impl PolyList {
    pub fn new() -> Self {
        PolyList { items: Vec::new() }
    }

    pub fn push(&mut self, poly: Poly) {
        self.items.push(poly);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Poly> {
        self.items.iter().find(|p| p.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(Poly::id).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Poly> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Poly] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Poly> {
        self.items
    }
}

impl From<Vec<Poly>> for PolyList {
    fn from(items: Vec<Poly>) -> Self {
        PolyList { items }
    }
}

impl FromIterator<Poly> for PolyList {
    fn from_iter<I: IntoIterator<Item = Poly>>(iter: I) -> Self {
        PolyList { items: iter.into_iter().collect() }
    }
}

impl IntoIterator for PolyList {
    type Item = Poly;
    type IntoIter = std::vec::IntoIter<Poly>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a PolyList {
    type Item = &'a Poly;
    type IntoIter = std::slice::Iter<'a, Poly>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A document plus the tags it should be indexed under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRequest {
    pub poly: Poly,
    pub tags: BTreeSet<String>,
}

impl InsertRequest {
    pub fn new(poly: Poly) -> Self {
        InsertRequest {
            poly,
            tags: BTreeSet::new(),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Tags the document ends up indexed under.
    pub fn effective_tags(&self, options: &InsertOptions) -> BTreeSet<String> {
        let mut tags: BTreeSet<String> = self
            .tags
            .iter()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect();
        if !options.skip_default_tag {
            tags.insert(DATE_TAG.to_string());
        }
        tags
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertOptions {
    /// Do not file the documents under the chronological tag.
    pub skip_default_tag: bool,
    /// Skip per-document index maintenance and rebuild once after the batch.
    pub defer_index: bool,
}
