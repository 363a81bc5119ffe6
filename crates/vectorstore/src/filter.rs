//! Structured filter DSL.
//!
//! A minimal filter language (equality, in-set, not-equal, match-all,
//! conjunction) with a total translation to the store's native filter
//! syntax. Every DSL value has a defined mapping; the translation is
//! pure and tested without any network calls. The same filters also
//! evaluate locally against payloads, which is what the in-memory
//! store uses.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The filter DSL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// Matches every point.
    All,

    /// Field equals value.
    Eq { field: String, value: Value },

    /// Field does not equal value.
    Ne { field: String, value: Value },

    /// Field is one of the given values.
    In { field: String, values: Vec<Value> },

    /// All sub-filters match.
    And { filters: Vec<Filter> },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn in_set(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    /// Translate to the store's native filter JSON.
    ///
    /// Native shape is must/must_not clause lists:
    /// - `Eq`  → `must: [{key, match: {value}}]`
    /// - `Ne`  → `must_not: [{key, match: {value}}]`
    /// - `In`  → `must: [{key, match: {any: [...]}}]`
    /// - `All` → `{}` (no clauses)
    /// - `And` → merged clause lists
    pub fn to_native(&self) -> Value {
        let (must, must_not) = self.clauses();
        let mut out = serde_json::Map::new();
        if !must.is_empty() {
            out.insert("must".into(), Value::Array(must));
        }
        if !must_not.is_empty() {
            out.insert("must_not".into(), Value::Array(must_not));
        }
        Value::Object(out)
    }

    fn clauses(&self) -> (Vec<Value>, Vec<Value>) {
        match self {
            Self::All => (vec![], vec![]),
            Self::Eq { field, value } => (
                vec![json!({"key": field, "match": {"value": value}})],
                vec![],
            ),
            Self::Ne { field, value } => (
                vec![],
                vec![json!({"key": field, "match": {"value": value}})],
            ),
            Self::In { field, values } => (
                vec![json!({"key": field, "match": {"any": values}})],
                vec![],
            ),
            Self::And { filters } => {
                let mut must = vec![];
                let mut must_not = vec![];
                for f in filters {
                    let (m, mn) = f.clauses();
                    must.extend(m);
                    must_not.extend(mn);
                }
                (must, must_not)
            }
        }
    }

    /// Evaluate this filter against a payload locally.
    pub fn matches(&self, payload: &serde_json::Map<String, Value>) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => payload.get(field) == Some(value),
            Self::Ne { field, value } => payload.get(field) != Some(value),
            Self::In { field, values } => payload
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Self::And { filters } => filters.iter().all(|f| f.matches(payload)),
        }
    }
}
