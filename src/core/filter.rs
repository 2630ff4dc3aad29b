//! Filter Engine
//!
//! Evaluates a list of [`FilterClause`]s over a collection. Clauses combine
//! with AND, values inside a clause combine with OR. The key -> accessor
//! lookup is supplied by the caller as a [`FieldMap`], so the engine knows
//! nothing about any provider schema.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};

use super::error::{Dialect, ErrorEnvelope};

/// Maximum number of values accepted in one clause
pub const MAX_FILTER_VALUES: usize = 200;

/// Compiled-size bound for MATCH patterns
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Comparison applied between a record value and the clause values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// String equality with any value
    Eq,
    /// Equal to none of the values
    Ne,
    /// Anchored regex match with any value
    Match,
    /// Matches none of the patterns
    NotMatch,
}

/// One key/values/operator triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    pub key: String,
    pub values: Vec<String>,
    pub operator: Operator,
}

impl FilterClause {
    pub fn new(key: impl Into<String>, values: Vec<String>, operator: Operator) -> Self {
        Self {
            key: key.into(),
            values,
            operator,
        }
    }

    pub fn eq(key: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(key, values, Operator::Eq)
    }
}

type Accessor<T> = Box<dyn Fn(&T) -> Vec<String> + Send + Sync>;
type PrefixedAccessor<T> = Box<dyn Fn(&T, &str) -> Vec<String> + Send + Sync>;

/// Key -> accessor lookup for one resource type
pub struct FieldMap<T> {
    fields: HashMap<&'static str, Accessor<T>>,
    prefixed: Vec<(&'static str, PrefixedAccessor<T>)>,
}

impl<T> Default for FieldMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> FieldMap<T> {
    /// Single-valued field
    pub fn field(mut self, key: &'static str, get: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.fields.insert(key, Box::new(move |record| vec![get(record)]));
        self
    }

    /// Multi-valued field, e.g. every tag key
    pub fn multi(
        mut self,
        key: &'static str,
        get: impl Fn(&T) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.fields.insert(key, Box::new(get));
        self
    }

    /// Keys sharing a prefix (`tag:Name`, `labels.env`); the accessor gets
    /// the remainder after the prefix
    pub fn prefixed(
        mut self,
        prefix: &'static str,
        get: impl Fn(&T, &str) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.prefixed.push((prefix, Box::new(get)));
        self
    }
}

impl<T> FieldMap<T> {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
            prefixed: Vec::new(),
        }
    }

    pub fn knows(&self, key: &str) -> bool {
        self.fields.contains_key(key)
            || self
                .prefixed
                .iter()
                .any(|(prefix, _)| key.len() > prefix.len() && key.starts_with(prefix))
    }

    /// Values of `key` on a record, `None` for unknown keys
    pub fn values_of(&self, record: &T, key: &str) -> Option<Vec<String>> {
        if let Some(get) = self.fields.get(key) {
            return Some(get(record));
        }
        self.prefixed.iter().find_map(|(prefix, get)| {
            key.strip_prefix(prefix)
                .filter(|rest| !rest.is_empty())
                .map(|rest| get(record, rest))
        })
    }

    /// Reject unknown keys and pathological clauses before evaluation
    pub fn validate(&self, clauses: &[FilterClause], dialect: Dialect) -> Result<(), ErrorEnvelope> {
        for clause in clauses {
            if !self.knows(&clause.key) {
                return Err(ErrorEnvelope::invalid_value(
                    dialect,
                    format!("The filter '{}' is invalid", clause.key),
                ));
            }
            if clause.values.len() > MAX_FILTER_VALUES {
                return Err(ErrorEnvelope::invalid_value(
                    dialect,
                    format!(
                        "The filter '{}' has {} values; at most {} are allowed",
                        clause.key,
                        clause.values.len(),
                        MAX_FILTER_VALUES
                    ),
                ));
            }
            if matches!(clause.operator, Operator::Match | Operator::NotMatch) {
                for pattern in &clause.values {
                    if compile(pattern).is_none() {
                        return Err(ErrorEnvelope::invalid_value(
                            dialect,
                            format!("Invalid pattern '{}' for filter '{}'", pattern, clause.key),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    RegexBuilder::new(&format!("^(?:{})$", pattern))
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .ok()
}

/// A clause with its patterns compiled once
struct Prepared<'c> {
    clause: &'c FilterClause,
    patterns: Vec<Regex>,
}

impl Prepared<'_> {
    fn new(clause: &FilterClause) -> Prepared<'_> {
        let patterns = match clause.operator {
            Operator::Match | Operator::NotMatch => {
                clause.values.iter().filter_map(|v| compile(v)).collect()
            }
            Operator::Eq | Operator::Ne => Vec::new(),
        };
        Prepared { clause, patterns }
    }

    fn matches(&self, actual: &[String]) -> bool {
        let any_equal = || {
            actual
                .iter()
                .any(|a| self.clause.values.iter().any(|v| v == a))
        };
        let any_pattern = || {
            actual
                .iter()
                .any(|a| self.patterns.iter().any(|re| re.is_match(a)))
        };
        match self.clause.operator {
            Operator::Eq => any_equal(),
            Operator::Ne => !any_equal(),
            Operator::Match => any_pattern(),
            Operator::NotMatch => !any_pattern(),
        }
    }
}

/// Keep the records satisfying every clause, preserving input order
pub fn apply<'a, T: 'a>(
    records: impl IntoIterator<Item = &'a T>,
    clauses: &[FilterClause],
    fields: &FieldMap<T>,
) -> Vec<&'a T> {
    let prepared: Vec<Prepared<'_>> = clauses.iter().map(Prepared::new).collect();
    records
        .into_iter()
        .filter(|record| {
            prepared.iter().all(|p| match fields.values_of(record, &p.clause.key) {
                Some(actual) => p.matches(&actual),
                None => false,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: String,
        state: String,
        tags: Vec<(String, String)>,
    }

    fn item(name: &str, state: &str, tags: &[(&str, &str)]) -> Item {
        Item {
            name: name.to_string(),
            state: state.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn fields() -> FieldMap<Item> {
        FieldMap::new()
            .field("name", |i: &Item| i.name.clone())
            .field("state", |i: &Item| i.state.clone())
            .multi("tag-key", |i: &Item| i.tags.iter().map(|(k, _)| k.clone()).collect())
            .prefixed("tag:", |i: &Item, key| {
                i.tags
                    .iter()
                    .filter(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
    }

    fn items() -> Vec<Item> {
        vec![
            item("a", "available", &[("env", "prod")]),
            item("b", "pending", &[("env", "dev")]),
            item("c", "available", &[]),
        ]
    }

    fn names(found: &[&Item]) -> Vec<String> {
        found.iter().map(|i| i.name.clone()).collect()
    }

    #[test]
    fn test_empty_clauses_is_identity() {
        let records = items();
        let found = apply(&records, &[], &fields());
        assert_eq!(names(&found), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_values_or_within_clause() {
        let records = items();
        let clause = FilterClause::eq("name", vec!["a".into(), "c".into()]);
        assert_eq!(names(&apply(&records, &[clause], &fields())), vec!["a", "c"]);
    }

    #[test]
    fn test_clauses_and_together() {
        let records = items();
        let clauses = [
            FilterClause::eq("state", vec!["available".into()]),
            FilterClause::eq("tag:env", vec!["prod".into()]),
        ];
        assert_eq!(names(&apply(&records, &clauses, &fields())), vec!["a"]);
    }

    #[test]
    fn test_ne_and_match_operators() {
        let records = items();
        let ne = FilterClause::new("state", vec!["pending".into()], Operator::Ne);
        assert_eq!(names(&apply(&records, &[ne], &fields())), vec!["a", "c"]);

        let re = FilterClause::new("name", vec!["[ab]".into()], Operator::Match);
        assert_eq!(names(&apply(&records, &[re], &fields())), vec!["a", "b"]);

        let not_re = FilterClause::new("name", vec!["[ab]".into()], Operator::NotMatch);
        assert_eq!(names(&apply(&records, &[not_re], &fields())), vec!["c"]);
    }

    #[test]
    fn test_match_is_anchored() {
        let records = items();
        let re = FilterClause::new("state", vec!["avail".into()], Operator::Match);
        assert!(apply(&records, &[re], &fields()).is_empty());
    }

    #[test]
    fn test_unknown_key_matches_nothing_and_fails_validation() {
        let records = items();
        let clause = FilterClause::eq("color", vec!["red".into()]);
        assert!(apply(&records, std::slice::from_ref(&clause), &fields()).is_empty());

        let err = fields().validate(&[clause], Dialect::Aws).unwrap_err();
        assert_eq!(err.code, "InvalidParameterValue");
    }

    #[test]
    fn test_validate_rejects_bad_pattern_and_too_many_values() {
        let bad = FilterClause::new("name", vec!["(".into()], Operator::Match);
        assert!(fields().validate(&[bad], Dialect::Gcp).is_err());

        let many = FilterClause::eq("name", (0..=MAX_FILTER_VALUES).map(|i| i.to_string()).collect());
        assert!(fields().validate(&[many], Dialect::Aws).is_err());
    }

    #[test]
    fn test_bare_prefix_is_not_a_key() {
        assert!(!fields().knows("tag:"));
        assert!(fields().knows("tag:env"));
    }
}
