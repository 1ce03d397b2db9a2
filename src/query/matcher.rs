use std::collections::HashSet;
use crate::analysis::tokenizer::StandardTokenizer;
use crate::core::types::Poly;
use crate::query::filter::CustomFilter;

/// Decides whether a stored document satisfies a SEARCH or CUSTOM query.
#[derive(Debug, Clone)]
pub enum DocumentMatcher {
    /// Every term must occur among the document's string values.
    Search {
        terms: Vec<String>,
        tokenizer: StandardTokenizer,
    },
    Custom(CustomFilter),
}

impl DocumentMatcher {
    pub fn search(text: &str, tokenizer: StandardTokenizer) -> Self {
        let terms = tokenizer.terms(text);
        DocumentMatcher::Search { terms, tokenizer }
    }

    pub fn matches(&self, poly: &Poly) -> bool {
        match self {
            DocumentMatcher::Search { terms, tokenizer } => matches_terms(poly, terms, tokenizer),
            DocumentMatcher::Custom(filter) => filter.matches(poly),
        }
    }
}

fn matches_terms(poly: &Poly, terms: &[String], tokenizer: &StandardTokenizer) -> bool {
    let mut found = HashSet::new();
    for value in poly.data.values() {
        tokenizer.value_terms(value, &mut found);
    }
    terms.iter().all(|term| found.contains(term))
}
