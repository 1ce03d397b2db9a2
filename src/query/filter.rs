use regex::Regex;
use crate::core::error::{Error, Result};
use crate::core::types::{Poly, Value};

/// One field condition of a custom query.
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Exists(bool),
    Regex(Regex),
}

/// Conjunction of field conditions, parsed from a JSON object such as
/// `{"status": "draft", "title": {"$regex": "^Rust"}, "views": {"$in": [1, 2]}}`.
///
/// Dotted paths reach into nested objects; `_id` addresses the document id.
#[derive(Debug, Clone, Default)]
pub struct CustomFilter {
    pub clauses: Vec<(String, Condition)>,
}

impl CustomFilter {
    pub fn parse(payload: &Value) -> Result<Self> {
        let Value::Object(fields) = payload else {
            return Err(Error::invalid_argument(format!(
                "custom query must be an object, got {}",
                payload
            )));
        };

        let mut clauses = Vec::with_capacity(fields.len());
        for (field, raw) in fields {
            clauses.push((field.clone(), parse_condition(field, raw)?));
        }
        Ok(CustomFilter { clauses })
    }

    pub fn matches(&self, poly: &Poly) -> bool {
        self.clauses.iter().all(|(field, condition)| {
            let value = lookup(poly, field);
            condition.test(value.as_ref())
        })
    }
}

fn parse_condition(field: &str, raw: &Value) -> Result<Condition> {
    let operator = match raw {
        Value::Object(map) if map.len() == 1 => map.iter().next().filter(|(k, _)| k.starts_with('$')),
        _ => None,
    };
    let Some((op, arg)) = operator else {
        return Ok(Condition::Eq(raw.clone()));
    };

    match op.as_str() {
        "$ne" => Ok(Condition::Ne(arg.clone())),
        "$in" => match arg {
            Value::Array(items) => Ok(Condition::In(items.clone())),
            _ => Err(Error::invalid_argument(format!("$in on {} needs an array", field))),
        },
        "$exists" => match arg {
            Value::Bool(flag) => Ok(Condition::Exists(*flag)),
            _ => Err(Error::invalid_argument(format!("$exists on {} needs a bool", field))),
        },
        "$regex" => match arg {
            Value::String(pattern) => Ok(Condition::Regex(Regex::new(pattern)?)),
            _ => Err(Error::invalid_argument(format!("$regex on {} needs a string", field))),
        },
        other => Err(Error::invalid_argument(format!("unknown operator {} on {}", other, field))),
    }
}

impl Condition {
    fn test(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Exists(expected) => value.is_some() == *expected,
            Condition::Eq(expected) => value.is_some_and(|v| equals(v, expected)),
            Condition::Ne(expected) => !value.is_some_and(|v| equals(v, expected)),
            Condition::In(options) => {
                value.is_some_and(|v| options.iter().any(|o| equals(v, o)))
            }
            Condition::Regex(pattern) => value.is_some_and(|v| match v {
                Value::String(s) => pattern.is_match(s),
                Value::Array(items) => items.iter()
                    .filter_map(Value::as_str)
                    .any(|s| pattern.is_match(s)),
                _ => false,
            }),
        }
    }
}

/// Array fields match a scalar when any element equals it.
fn equals(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Array(items), other) if !other.is_array() => items.contains(other),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => false,
    }
}

fn lookup(poly: &Poly, path: &str) -> Option<Value> {
    if path == "_id" {
        return Some(Value::String(poly.id().to_string()));
    }
    let mut parts = path.split('.');
    let mut current = poly.fetch(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}
