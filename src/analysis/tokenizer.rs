use std::collections::HashSet;
use crate::analysis::token::Token;
use crate::core::types::Value;
use unicode_segmentation::UnicodeSegmentation;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &str;
}

/// Standard Unicode word tokenizer
#[derive(Debug, Clone)]
pub struct StandardTokenizer {
    pub lowercase: bool,
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        StandardTokenizer {
            lowercase: true,
            max_token_length: 255,
        }
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;

        for (offset, word) in text.unicode_word_indices() {
            if word.len() > self.max_token_length {
                continue;
            }
            let token_text = if self.lowercase {
                word.to_lowercase()
            } else {
                word.to_string()
            };
            tokens.push(Token::new(token_text, position, offset));
            position += 1;
        }

        tokens
    }

    fn name(&self) -> &str {
        "standard"
    }
}

impl StandardTokenizer {
    /// Distinct terms of a search string, in first-seen order.
    pub fn terms(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tokenize(text)
            .into_iter()
            .filter(|t| seen.insert(t.text.clone()))
            .map(|t| t.text)
            .collect()
    }

    /// Every term found in the string leaves of a JSON value.
    pub fn value_terms(&self, value: &Value, terms: &mut HashSet<String>) {
        match value {
            Value::String(s) => {
                terms.extend(self.tokenize(s).into_iter().map(|t| t.text));
            }
            Value::Array(items) => {
                for item in items {
                    self.value_terms(item, terms);
                }
            }
            Value::Object(map) => {
                for item in map.values() {
                    self.value_terms(item, terms);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lowercases_and_tracks_positions() {
        let tokens = StandardTokenizer::default().tokenize("Hello, Rust World");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "rust", "world"]);
        assert_eq!(tokens[2].position, 2);
        assert_eq!(tokens[1].offset, 7);
    }

    #[test]
    fn terms_are_distinct() {
        let terms = StandardTokenizer::default().terms("rust Rust RUST tags");
        assert_eq!(terms, vec!["rust".to_string(), "tags".to_string()]);
    }

    #[test]
    fn collects_nested_string_values() {
        let mut terms = HashSet::new();
        StandardTokenizer::default().value_terms(
            &json!({"title": "Paging Engine", "tags": ["Cache"], "n": 3}),
            &mut terms,
        );
        assert!(terms.contains("paging"));
        assert!(terms.contains("cache"));
        assert_eq!(terms.len(), 3);
    }
}
