use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::{Value, DATE_TAG, ITEM_PER_PAGE};

pub const RANDOM_COUNT: &str = "random_count";
pub const SEARCH_TEXT: &str = "search_text";
pub const CUSTOM_QUERY: &str = "custom_query";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    #[default]
    Pages,
    Random,
    Search,
    Custom,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Pages => "PAGES",
            QueryType::Random => "RANDOM",
            QueryType::Search => "SEARCH",
            QueryType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "PAGES" => Ok(QueryType::Pages),
            "RANDOM" => Ok(QueryType::Random),
            "SEARCH" => Ok(QueryType::Search),
            "CUSTOM" => Ok(QueryType::Custom),
            other => Err(Error::invalid_argument(format!("unknown query type {}", other))),
        }
    }
}

/// What to fetch: the query type, the tag to walk, the page and loose options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySpec {
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub tag: Option<String>,
    pub page: i64,
    pub options: BTreeMap<String, Value>,
}

impl QuerySpec {
    pub fn pages() -> Self {
        QuerySpec::default()
    }

    pub fn random(count: usize) -> Self {
        QuerySpec {
            query_type: QueryType::Random,
            ..Default::default()
        }
        .option(RANDOM_COUNT, count)
    }

    pub fn search(text: &str) -> Self {
        QuerySpec {
            query_type: QueryType::Search,
            ..Default::default()
        }
        .option(SEARCH_TEXT, text)
    }

    pub fn custom(filter: Value) -> Self {
        QuerySpec {
            query_type: QueryType::Custom,
            ..Default::default()
        }
        .option(CUSTOM_QUERY, filter)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    pub fn item_per_page(self, size: usize) -> Self {
        self.option(ITEM_PER_PAGE, size)
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Missing or blank tags fall back to the chronological tag.
    pub fn resolved_tag(&self) -> &str {
        match self.tag.as_deref() {
            Some(tag) if !tag.trim().is_empty() => tag,
            _ => DATE_TAG,
        }
    }

    pub fn resolved_page(&self) -> usize {
        self.page.max(0) as usize
    }

    pub fn search_text(&self) -> Option<&str> {
        self.options.get(SEARCH_TEXT).and_then(Value::as_str)
    }

    pub fn custom_query(&self) -> Option<&Value> {
        self.options.get(CUSTOM_QUERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_resolve_to_chronological_first_page() {
        let spec = QuerySpec::pages().tag("  ").page(-3);
        assert_eq!(spec.resolved_tag(), DATE_TAG);
        assert_eq!(spec.resolved_page(), 0);
        assert_eq!(spec.query_type, QueryType::Pages);
    }

    #[test]
    fn parses_type_names() {
        assert_eq!("random".parse::<QueryType>().unwrap(), QueryType::Random);
        assert_eq!("".parse::<QueryType>().unwrap(), QueryType::Pages);
        assert!("fuzzy".parse::<QueryType>().is_err());
    }

    #[test]
    fn deserializes_loose_document() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "type": "SEARCH",
            "tag": "rust",
            "options": { "search_text": "borrow checker" }
        }))
        .unwrap();
        assert_eq!(spec.query_type, QueryType::Search);
        assert_eq!(spec.search_text(), Some("borrow checker"));
        assert_eq!(spec.page, 0);
    }
}
