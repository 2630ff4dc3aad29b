//! Query parameters of the EC2 API
//!
//! Requests are flat `Name=Value` pairs; lists use 1-based indexes
//! (`VpcId.1`, `Filter.2.Value.1`, `TagSpecification.1.Tag.1.Key`).

use std::collections::{BTreeMap, BTreeSet};

use crate::core::{Dialect, ErrorEnvelope, FilterClause, Operator, Outcome};

use super::tags::Tag;

/// Bounds AWS enforces on `MaxResults` for describe calls
pub const MIN_MAX_RESULTS: i64 = 5;
pub const MAX_MAX_RESULTS: i64 = 1000;

/// Decoded request parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: BTreeMap<String, String>,
}

impl QueryParams {
    /// Merge the URL query string and a form-encoded body; body wins
    pub fn parse(query: Option<&str>, body: &[u8]) -> Self {
        let mut params = BTreeMap::new();
        if let Some(query) = query {
            for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
                params.insert(k.into_owned(), v.into_owned());
            }
        }
        for (k, v) in url::form_urlencoded::parse(body) {
            params.insert(k.into_owned(), v.into_owned());
        }
        Self { params }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn action(&self) -> Option<&str> {
        self.get("Action").filter(|a| !a.is_empty())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|v| v.as_str())
    }

    /// Required, non-empty parameter
    pub fn require(&self, name: &str) -> Outcome<&str> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ErrorEnvelope::missing_parameter(Dialect::Aws, name))
    }

    pub fn bool(&self, name: &str) -> Outcome<Option<bool>> {
        match self.get(name) {
            None => Ok(None),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(v) => Err(invalid_value(name, v)),
        }
    }

    pub fn int(&self, name: &str) -> Outcome<Option<i64>> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| invalid_value(name, v)),
        }
    }

    /// Indexes `N` present under `prefix.N`, ascending
    fn indices(&self, prefix: &str) -> Vec<u32> {
        let lead = format!("{}.", prefix);
        let found: BTreeSet<u32> = self
            .params
            .keys()
            .filter_map(|k| k.strip_prefix(&lead))
            .filter_map(|rest| rest.split('.').next())
            .filter_map(|n| n.parse::<u32>().ok())
            .collect();
        found.into_iter().collect()
    }

    /// Values of a flat indexed list (`VpcId.1`, `VpcId.2`, ...)
    pub fn indexed(&self, prefix: &str) -> Vec<String> {
        self.indices(prefix)
            .into_iter()
            .filter_map(|n| self.get(&format!("{}.{}", prefix, n)))
            .map(|v| v.to_string())
            .collect()
    }

    /// `Filter.N.Name` / `Filter.N.Value.M` as filter clauses
    ///
    /// Values containing `*` or `?` turn the whole clause into a pattern
    /// match, as AWS wildcards do.
    pub fn filters(&self) -> Outcome<Vec<FilterClause>> {
        let mut clauses = Vec::new();
        for n in self.indices("Filter") {
            let name_key = format!("Filter.{}.Name", n);
            let name = self.require(&name_key)?.to_string();
            let values = self.indexed(&format!("Filter.{}.Value", n));

            if values.iter().any(|v| has_wildcard(v)) {
                let patterns = values.iter().map(|v| wildcard_to_regex(v)).collect();
                clauses.push(FilterClause::new(name, patterns, Operator::Match));
            } else {
                clauses.push(FilterClause::eq(name, values));
            }
        }
        Ok(clauses)
    }

    /// `Tag.N.Key` / `Tag.N.Value` pairs under a prefix
    pub fn tags(&self, prefix: &str) -> Outcome<Vec<Tag>> {
        let mut tags = Vec::new();
        for n in self.indices(prefix) {
            let key = self.require(&format!("{}.{}.Key", prefix, n))?;
            let value = self.get(&format!("{}.{}.Value", prefix, n)).unwrap_or("");
            tags.push(Tag::new(key, value));
        }
        Ok(tags)
    }

    /// Tag keys with optional values, for DeleteTags
    pub fn tag_keys(&self, prefix: &str) -> Outcome<Vec<(String, Option<String>)>> {
        let mut keys = Vec::new();
        for n in self.indices(prefix) {
            let key = self.require(&format!("{}.{}.Key", prefix, n))?;
            let value = self
                .get(&format!("{}.{}.Value", prefix, n))
                .map(|v| v.to_string());
            keys.push((key.to_string(), value));
        }
        Ok(keys)
    }

    /// Tags from `TagSpecification.N` entries for one resource type
    pub fn tag_specifications(&self, resource_type: &str) -> Outcome<Vec<Tag>> {
        let mut tags = Vec::new();
        for n in self.indices("TagSpecification") {
            let type_key = format!("TagSpecification.{}.ResourceType", n);
            let declared = self.require(&type_key)?;
            if declared != resource_type {
                return Err(ErrorEnvelope::invalid_value(
                    Dialect::Aws,
                    format!(
                        "'{}' is not a valid taggable resource type for this operation.",
                        declared
                    ),
                ));
            }
            tags.extend(self.tags(&format!("TagSpecification.{}.Tag", n))?);
        }
        Ok(tags)
    }

    /// `MaxResults` within AWS bounds, `None` when absent
    pub fn max_results(&self) -> Outcome<Option<usize>> {
        match self.int("MaxResults")? {
            None => Ok(None),
            Some(n) if (MIN_MAX_RESULTS..=MAX_MAX_RESULTS).contains(&n) => {
                Ok(usize::try_from(n).ok())
            }
            Some(n) => Err(ErrorEnvelope::invalid_value(
                Dialect::Aws,
                format!(
                    "Value ( {} ) for parameter maxResults is invalid. Expecting a value between {} and {}.",
                    n, MIN_MAX_RESULTS, MAX_MAX_RESULTS
                ),
            )),
        }
    }

    pub fn next_token(&self) -> Option<&str> {
        self.get("NextToken").filter(|t| !t.is_empty())
    }

    /// Every parameter, for debug logging
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn invalid_value(name: &str, value: &str) -> ErrorEnvelope {
    ErrorEnvelope::invalid_value(
        Dialect::Aws,
        format!("Value ({}) for parameter {} is invalid.", value, name),
    )
}

fn has_wildcard(value: &str) -> bool {
    let mut escaped = false;
    for c in value.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '*' | '?' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}

/// Translate an AWS wildcard value (`*`, `?`, `\` escapes) to a regex
pub fn wildcard_to_regex(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 8);
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            pattern.push_str(&regex::escape(&c.to_string()));
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    if escaped {
        pattern.push_str(r"\\");
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        QueryParams::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn test_parse_merges_query_and_body() {
        let p = QueryParams::parse(
            Some("Action=DescribeVpcs&Version=2016-11-15"),
            b"VpcId.1=vpc-1&Action=CreateVpc",
        );
        assert_eq!(p.action(), Some("CreateVpc"));
        assert_eq!(p.get("Version"), Some("2016-11-15"));
        assert_eq!(p.indexed("VpcId"), vec!["vpc-1"]);
    }

    #[test]
    fn test_indexed_lists_are_ordered_numerically() {
        let p = params(&[("VpcId.10", "c"), ("VpcId.2", "b"), ("VpcId.1", "a")]);
        assert_eq!(p.indexed("VpcId"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_filters() {
        let p = params(&[
            ("Filter.1.Name", "state"),
            ("Filter.1.Value.1", "available"),
            ("Filter.1.Value.2", "pending"),
            ("Filter.2.Name", "tag:Name"),
            ("Filter.2.Value.1", "web*"),
        ]);
        let clauses = p.filters().expect("filters");
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].operator, Operator::Eq);
        assert_eq!(clauses[0].values, vec!["available", "pending"]);
        assert_eq!(clauses[1].operator, Operator::Match);
        assert_eq!(clauses[1].values, vec!["web.*"]);
    }

    #[test]
    fn test_filter_without_name_is_missing_parameter() {
        let p = params(&[("Filter.1.Value.1", "x")]);
        let err = p.filters().unwrap_err();
        assert_eq!(err.code, "MissingParameter");
        assert!(err.message.contains("Filter.1.Name"));
    }

    #[test]
    fn test_escaped_wildcard_is_literal() {
        assert!(!has_wildcard(r"a\*b"));
        assert_eq!(wildcard_to_regex(r"a\*b?"), r"a\*b.");
    }

    #[test]
    fn test_tag_specifications() {
        let p = params(&[
            ("TagSpecification.1.ResourceType", "vpc"),
            ("TagSpecification.1.Tag.1.Key", "Name"),
            ("TagSpecification.1.Tag.1.Value", "main"),
            ("TagSpecification.1.Tag.2.Key", "empty"),
        ]);
        let tags = p.tag_specifications("vpc").expect("tags");
        assert_eq!(tags, vec![Tag::new("Name", "main"), Tag::new("empty", "")]);

        let err = p.tag_specifications("subnet").unwrap_err();
        assert_eq!(err.code, "InvalidParameterValue");
    }

    #[test]
    fn test_max_results_bounds() {
        assert_eq!(params(&[]).max_results().expect("absent"), None);
        assert_eq!(
            params(&[("MaxResults", "10")]).max_results().expect("valid"),
            Some(10)
        );
        assert!(params(&[("MaxResults", "4")]).max_results().is_err());
        assert!(params(&[("MaxResults", "abc")]).max_results().is_err());
    }

    #[test]
    fn test_bool_parsing() {
        let p = params(&[("A", "true"), ("B", "FALSE"), ("C", "yes")]);
        assert_eq!(p.bool("A").expect("A"), Some(true));
        assert_eq!(p.bool("B").expect("B"), Some(false));
        assert!(p.bool("C").is_err());
        assert_eq!(p.bool("D").expect("D"), None);
    }
}
