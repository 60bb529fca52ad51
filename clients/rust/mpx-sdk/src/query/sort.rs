//! Result ordering

use super::{QueryPart, QueryParts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort fields, applied in the order they were added
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    fields: Vec<(String, SortOrder)>,
}

impl Sort {
    /// Sort ascending by a single field
    pub fn by(field: impl Into<String>) -> Self {
        Self {
            fields: vec![(field.into(), SortOrder::Ascending)],
        }
    }

    /// Sort descending by a single field
    pub fn by_desc(field: impl Into<String>) -> Self {
        Self {
            fields: vec![(field.into(), SortOrder::Descending)],
        }
    }

    /// Add a tie-breaking field
    pub fn then(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.fields.push((field.into(), order));
        self
    }

    pub fn fields(&self) -> &[(String, SortOrder)] {
        &self.fields
    }
}

/// Sorting by id gives a stable total order across pages
impl Default for Sort {
    fn default() -> Self {
        Self::by("id")
    }
}

impl QueryPart for Sort {
    fn query_parts(&self) -> QueryParts {
        let value = self
            .fields
            .iter()
            .map(|(field, order)| match order {
                SortOrder::Ascending => field.clone(),
                SortOrder::Descending => format!("{}|desc", field),
            })
            .collect::<Vec<_>>()
            .join(",");

        let mut parts = QueryParts::new();
        parts.insert("sort".to_string(), value);
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sorts_by_id() {
        assert_eq!(Sort::default().query_parts()["sort"], "id");
    }

    #[test]
    fn test_multiple_fields() {
        let sort = Sort::by_desc("added").then("title", SortOrder::Ascending);
        assert_eq!(sort.query_parts()["sort"], "added|desc,title");
    }
}
