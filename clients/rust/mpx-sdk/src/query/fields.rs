//! Exact-match filters and field selection

use super::{QueryPart, QueryParts};
use indexmap::IndexMap;

/// `by{Field}=value` exact-match filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByFields {
    fields: IndexMap<String, String>,
}

impl ByFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on `field`; a field given twice keeps the last value
    pub fn field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn by_key(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => format!("by{}{}", first.to_uppercase(), chars.as_str()),
        None => "by".to_string(),
    }
}

impl QueryPart for ByFields {
    fn query_parts(&self) -> QueryParts {
        self.fields
            .iter()
            .map(|(field, value)| (by_key(field), value.clone()))
            .collect()
    }
}

/// Restrict the fields returned for each object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    names: Vec<String>,
}

impl Fields {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }
}

impl QueryPart for Fields {
    fn query_parts(&self) -> QueryParts {
        let mut parts = QueryParts::new();
        if !self.names.is_empty() {
            parts.insert("fields".to_string(), self.names.join(","));
        }
        parts
    }
}
