//! The `q` free-text query language
//!
//! Values are escaped with a fixed set of reserved characters. Values holding
//! whitespace are quoted instead so they match as a phrase.

use super::{QueryPart, QueryParts};
use std::fmt;

/// Characters with meaning in the `q` grammar
const RESERVED: &[char] = &[
    '\\', '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '/',
];

/// Whether a term must or must not match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Must,
    MustNot,
}

/// A single `q` term, e.g. `title:foo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    value: String,
    field: Option<String>,
    namespace: Option<String>,
    match_type: Option<MatchType>,
    wildcard: bool,
    boost: Option<u32>,
}

impl Term {
    /// Match `value` in any searchable field
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            field: None,
            namespace: None,
            match_type: None,
            wildcard: false,
            boost: None,
        }
    }

    /// Restrict the term to a field
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Namespace prefix of a custom field
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn must(mut self) -> Self {
        self.match_type = Some(MatchType::Must);
        self
    }

    pub fn must_not(mut self) -> Self {
        self.match_type = Some(MatchType::MustNot);
        self
    }

    /// Match any value starting with this one
    pub fn wildcard(mut self) -> Self {
        self.wildcard = true;
        self
    }

    pub fn boost(mut self, boost: u32) -> Self {
        self.boost = Some(boost);
        self
    }
}

/// Escape reserved characters, or quote values containing whitespace
pub fn escape_value(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        return format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""));
    }

    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.match_type {
            Some(MatchType::Must) => f.write_str("+")?,
            Some(MatchType::MustNot) => f.write_str("-")?,
            None => {}
        }
        if let Some(ref field) = self.field {
            if let Some(ref namespace) = self.namespace {
                write!(f, "{}$", namespace)?;
            }
            write!(f, "{}:", field)?;
        }
        f.write_str(&escape_value(&self.value))?;
        if self.wildcard {
            f.write_str("*")?;
        }
        if let Some(boost) = self.boost {
            write!(f, "^{}", boost)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => f.write_str("AND"),
            Operator::Or => f.write_str("OR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Term(Term),
    Group(TermGroup),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Term(term) => fmt::Display::fmt(term, f),
            Node::Group(group) => write!(f, "({})", group),
        }
    }
}

/// Terms joined with boolean operators; nested groups are parenthesized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermGroup {
    first: Box<Node>,
    rest: Vec<(Operator, Node)>,
}

impl TermGroup {
    pub fn new(term: Term) -> Self {
        Self {
            first: Box::new(Node::Term(term)),
            rest: Vec::new(),
        }
    }

    pub fn and(mut self, term: Term) -> Self {
        self.rest.push((Operator::And, Node::Term(term)));
        self
    }

    pub fn or(mut self, term: Term) -> Self {
        self.rest.push((Operator::Or, Node::Term(term)));
        self
    }

    pub fn and_group(mut self, group: TermGroup) -> Self {
        self.rest.push((Operator::And, Node::Group(group)));
        self
    }

    pub fn or_group(mut self, group: TermGroup) -> Self {
        self.rest.push((Operator::Or, Node::Group(group)));
        self
    }
}

impl fmt::Display for TermGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.first, f)?;
        for (op, node) in &self.rest {
            write!(f, " {} {}", op, node)?;
        }
        Ok(())
    }
}

impl From<Term> for TermGroup {
    fn from(term: Term) -> Self {
        Self::new(term)
    }
}

/// The `q` query parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QQuery {
    group: TermGroup,
}

impl QQuery {
    pub fn new(group: impl Into<TermGroup>) -> Self {
        Self {
            group: group.into(),
        }
    }
}

impl QueryPart for QQuery {
    fn query_parts(&self) -> QueryParts {
        let mut parts = QueryParts::new();
        parts.insert("q".to_string(), self.group.to_string());
        parts
    }
}
