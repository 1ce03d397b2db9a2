use tracing::debug;
use crate::analysis::tokenizer::StandardTokenizer;
use crate::core::error::{Error, Result};
use crate::core::types::{value_as_u64, Poly, Value, DEFAULT_ITEM_PER_PAGE, ITEM_PER_PAGE};
use crate::index::tag_index::TagIndex;
use crate::query::filter::CustomFilter;
use crate::query::matcher::DocumentMatcher;
use crate::query::types::{QuerySpec, QueryType, RANDOM_COUNT};

/// Resolved form of a query against one tag.
#[derive(Debug, Clone)]
pub enum QueryPlan {
    /// Slice `[offset, offset + limit)` of the tag's membership.
    Page { tag: String, offset: usize, limit: usize },
    Random { tag: String, count: usize },
    /// Walk the membership in order, keeping the documents the matcher accepts.
    Filtered {
        tag: String,
        matcher: DocumentMatcher,
        offset: usize,
        limit: usize,
    },
}

impl QueryPlan {
    pub fn tag(&self) -> &str {
        match self {
            QueryPlan::Page { tag, .. }
            | QueryPlan::Random { tag, .. }
            | QueryPlan::Filtered { tag, .. } => tag,
        }
    }
}

/// Turns a query spec into index lookups and runs them.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    pub default_item_per_page: usize,
    pub tokenizer: StandardTokenizer,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        QueryPlanner::new(DEFAULT_ITEM_PER_PAGE)
    }
}

impl QueryPlanner {
    pub fn new(default_item_per_page: usize) -> Self {
        QueryPlanner {
            default_item_per_page: default_item_per_page.max(1),
            tokenizer: StandardTokenizer::default(),
        }
    }

    /// `config` is the dataset configuration; `None` means the dataset was never created.
    pub fn plan(&self, dataset: &str, config: Option<&Poly>, spec: &QuerySpec) -> Result<QueryPlan> {
        let config = config.ok_or_else(|| Error::not_configured(dataset))?;
        let tag = spec.resolved_tag().to_string();
        let limit = self.page_size(config, spec)?;
        let offset = spec.resolved_page().saturating_mul(limit);

        let plan = match spec.query_type {
            QueryType::Pages => QueryPlan::Page { tag, offset, limit },
            QueryType::Random => {
                let count = match spec.options.get(RANDOM_COUNT) {
                    Some(raw) => positive_or_zero(RANDOM_COUNT, raw)?,
                    None => limit,
                };
                QueryPlan::Random { tag, count }
            }
            QueryType::Search => {
                let text = spec.search_text()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| Error::invalid_argument("SEARCH needs a non-empty search_text"))?;
                let matcher = DocumentMatcher::search(text, self.tokenizer.clone());
                QueryPlan::Filtered { tag, matcher, offset, limit }
            }
            QueryType::Custom => {
                let payload = spec.custom_query()
                    .ok_or_else(|| Error::invalid_argument("CUSTOM needs a custom_query"))?;
                let matcher = DocumentMatcher::Custom(CustomFilter::parse(payload)?);
                QueryPlan::Filtered { tag, matcher, offset, limit }
            }
        };

        debug!(dataset, query_type = %spec.query_type, tag = plan.tag(), "query planned");
        Ok(plan)
    }

    /// Option override, then dataset configuration, then the engine default.
    pub fn page_size(&self, config: &Poly, spec: &QuerySpec) -> Result<usize> {
        if let Some(raw) = spec.options.get(ITEM_PER_PAGE) {
            let size = positive_or_zero(ITEM_PER_PAGE, raw)?;
            if size == 0 {
                return Err(Error::invalid_argument("item_per_page must be at least 1"));
            }
            return Ok(size);
        }
        match config.fetch_u64(ITEM_PER_PAGE) {
            Some(size) if size > 0 => Ok(size as usize),
            _ => Ok(self.default_item_per_page),
        }
    }

    /// Run a plan. `load` fetches one stored document; ids the index knows
    /// but storage no longer holds are skipped.
    pub fn execute<F>(&self, index: &TagIndex, plan: &QueryPlan, mut load: F) -> Result<Vec<Poly>>
    where
        F: FnMut(&str) -> Result<Option<Poly>>,
    {
        match plan {
            QueryPlan::Page { tag, offset, limit } => {
                load_all(index.page(tag, *offset, *limit), &mut load)
            }
            QueryPlan::Random { tag, count } => {
                let ids = index.sample(tag, *count, &mut rand::thread_rng());
                load_all(ids, &mut load)
            }
            QueryPlan::Filtered { tag, matcher, offset, limit } => {
                let mut skipped = 0;
                let mut out = Vec::new();
                for id in index.members(tag) {
                    if out.len() >= *limit {
                        break;
                    }
                    let Some(poly) = load(&id)? else { continue };
                    if !matcher.matches(&poly) {
                        continue;
                    }
                    if skipped < *offset {
                        skipped += 1;
                        continue;
                    }
                    out.push(poly);
                }
                Ok(out)
            }
        }
    }

    /// Tag count for PAGES and RANDOM; number of matches for filtered plans.
    pub fn count<F>(&self, index: &TagIndex, plan: &QueryPlan, mut load: F) -> Result<u64>
    where
        F: FnMut(&str) -> Result<Option<Poly>>,
    {
        match plan {
            QueryPlan::Page { tag, .. } | QueryPlan::Random { tag, .. } => Ok(index.tag_count(tag)),
            QueryPlan::Filtered { tag, matcher, .. } => {
                let mut matched = 0;
                for id in index.members(tag) {
                    if let Some(poly) = load(&id)? {
                        if matcher.matches(&poly) {
                            matched += 1;
                        }
                    }
                }
                Ok(matched)
            }
        }
    }
}

fn load_all<F>(ids: Vec<String>, load: &mut F) -> Result<Vec<Poly>>
where
    F: FnMut(&str) -> Result<Option<Poly>>,
{
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(poly) = load(&id)? {
            out.push(poly);
        }
    }
    Ok(out)
}

fn positive_or_zero(key: &str, raw: &Value) -> Result<usize> {
    value_as_u64(raw)
        .map(|n| n as usize)
        .ok_or_else(|| Error::invalid_argument(format!("{} must be a non-negative integer, got {}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};
    use serde_json::json;
    use crate::core::error::ErrorKind;
    use crate::core::types::{CONFIG_ID, DATE_TAG};
    use crate::index::tag_index::IndexEntry;

    fn fixture(n: usize) -> (TagIndex, HashMap<String, Poly>) {
        let index = TagIndex::new();
        let mut docs = HashMap::new();
        for i in 0..n {
            let id = format!("post{}", i);
            let author = if i % 2 == 0 { "author_a" } else { "author_b" };
            let tags: BTreeSet<String> = [DATE_TAG.to_string(), author.to_string()].into();
            index.insert(IndexEntry { id: id.clone(), tags, timestamp: i as i64, seq: i as u64 });
            docs.insert(id.clone(), Poly::new(&id).with("author", author).with("n", i as u64));
        }
        (index, docs)
    }

    fn config() -> Poly {
        Poly::new(CONFIG_ID).with(ITEM_PER_PAGE, 10)
    }

    #[test]
    fn unconfigured_dataset_is_rejected() {
        let err = QueryPlanner::default().plan("blog", None, &QuerySpec::pages()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotConfigured);
    }

    #[test]
    fn page_size_precedence() {
        let planner = QueryPlanner::new(7);
        assert_eq!(planner.page_size(&config(), &QuerySpec::pages()).unwrap(), 10);
        assert_eq!(planner.page_size(&config(), &QuerySpec::pages().item_per_page(3)).unwrap(), 3);
        assert_eq!(planner.page_size(&Poly::new(CONFIG_ID), &QuerySpec::pages()).unwrap(), 7);
        let spec = QuerySpec::pages().option(ITEM_PER_PAGE, "abc");
        assert_eq!(planner.page_size(&config(), &spec).unwrap_err().kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn pages_walk_newest_first() {
        let (index, docs) = fixture(25);
        let planner = QueryPlanner::default();
        let load = |id: &str| Ok(docs.get(id).cloned());

        let plan = planner.plan("blog", Some(&config()), &QuerySpec::pages().page(2)).unwrap();
        let page: Vec<String> = planner.execute(&index, &plan, load).unwrap()
            .iter().map(|p| p.id().to_string()).collect();
        assert_eq!(page, vec!["post4", "post3", "post2", "post1", "post0"]);

        let plan = planner.plan("blog", Some(&config()), &QuerySpec::pages().page(3)).unwrap();
        assert!(planner.execute(&index, &plan, load).unwrap().is_empty());
    }

    #[test]
    fn custom_filter_pages_over_matches() {
        let (index, docs) = fixture(30);
        let planner = QueryPlanner::default();
        let load = |id: &str| Ok(docs.get(id).cloned());

        let spec = QuerySpec::custom(json!({ "author": "author_a" })).item_per_page(4).page(1);
        let plan = planner.plan("blog", Some(&config()), &spec).unwrap();
        let ids: Vec<String> = planner.execute(&index, &plan, load).unwrap()
            .iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["post20", "post18", "post16", "post14"]);
        assert_eq!(planner.count(&index, &plan, load).unwrap(), 15);
    }

    #[test]
    fn random_count_defaults_to_page_size() {
        let (index, docs) = fixture(30);
        let planner = QueryPlanner::default();
        let spec = QuerySpec { query_type: QueryType::Random, ..Default::default() };
        let plan = planner.plan("blog", Some(&config()), &spec).unwrap();
        let got = planner.execute(&index, &plan, |id| Ok(docs.get(id).cloned())).unwrap();
        assert_eq!(got.len(), 10);
    }

    #[test]
    fn search_needs_text() {
        let spec = QuerySpec { query_type: QueryType::Search, ..Default::default() };
        let err = QueryPlanner::default().plan("blog", Some(&config()), &spec).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
