//! Tags
//!
//! Key/value tags shared by every EC2 resource, the `tag:` filter family and
//! the CreateTags / DeleteTags actions.

use crate::core::{Dialect, ErrorEnvelope, FieldMap, Outcome, Resource};

use super::query::QueryParams;
use super::xml::{XmlFields, XmlValue};
use super::Ec2State;

/// Tags per resource AWS accepts
pub const MAX_TAGS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Resources carrying a tag set
pub trait Tagged {
    fn tags(&self) -> &[Tag];
    fn tags_mut(&mut self) -> &mut Vec<Tag>;
}

/// Insert or overwrite tags by key
pub fn upsert_tags(tags: &mut Vec<Tag>, new: &[Tag]) {
    for tag in new {
        match tags.iter_mut().find(|t| t.key == tag.key) {
            Some(existing) => existing.value = tag.value.clone(),
            None => tags.push(tag.clone()),
        }
    }
}

/// Remove tags by key; a given value must match for the tag to go
pub fn remove_tags(tags: &mut Vec<Tag>, keys: &[(String, Option<String>)]) {
    tags.retain(|t| {
        !keys.iter().any(|(key, value)| {
            t.key == *key && value.as_ref().map_or(true, |v| *v == t.value)
        })
    })
}

/// Reject tag sets AWS would refuse
pub fn validate_tags(tags: &[Tag]) -> Outcome<()> {
    if tags.len() > MAX_TAGS {
        return Err(ErrorEnvelope::with_code(
            Dialect::Aws,
            crate::core::ErrorKind::InvalidParameterValue,
            "TagLimitExceeded",
            format!("The maximum number of tags per resource is {}", MAX_TAGS),
        ));
    }
    if let Some(tag) = tags.iter().find(|t| t.key.starts_with("aws:")) {
        return Err(ErrorEnvelope::invalid_value(
            Dialect::Aws,
            format!("Tag keys starting with 'aws:' are reserved for internal use: {}", tag.key),
        ));
    }
    Ok(())
}

/// Add `tag:<key>`, `tag-key` and `tag-value` filters to a field map
pub fn with_tag_fields<T: Tagged + 'static>(fields: FieldMap<T>) -> FieldMap<T> {
    fields
        .multi("tag-key", |r: &T| r.tags().iter().map(|t| t.key.clone()).collect())
        .multi("tag-value", |r: &T| r.tags().iter().map(|t| t.value.clone()).collect())
        .prefixed("tag:", |r: &T, key| {
            r.tags()
                .iter()
                .filter(|t| t.key == key)
                .map(|t| t.value.clone())
                .collect()
        })
}

/// `tagSet` element, omitted by the caller when empty
pub fn tag_set(tags: &[Tag]) -> Vec<XmlValue> {
    tags.iter()
        .map(|t| {
            XmlValue::Struct(
                XmlFields::new()
                    .text("key", &t.key)
                    .text("value", &t.value),
            )
        })
        .collect()
}

/// Run a closure against the tag set of whichever resource owns `id`
fn with_tags_of<R>(
    state: &mut Ec2State,
    id: &str,
    f: impl FnOnce(&mut Vec<Tag>) -> R,
) -> Outcome<R> {
    use super::security_group::SecurityGroup;
    use super::subnet::Subnet;
    use super::vpc::Vpc;

    let prefix = id.split_once('-').map(|(p, _)| p).unwrap_or("");
    if prefix == Vpc::def().id_prefix() {
        return Ok(f(state.vpcs.get_mut_or_err(id)?.tags_mut()));
    }
    if prefix == Subnet::def().id_prefix() {
        return Ok(f(state.subnets.get_mut_or_err(id)?.tags_mut()));
    }
    if prefix == SecurityGroup::def().id_prefix() {
        return Ok(f(state.security_groups.get_mut_or_err(id)?.tags_mut()));
    }
    Err(ErrorEnvelope::with_code(
        Dialect::Aws,
        crate::core::ErrorKind::InvalidParameterValue,
        "InvalidID",
        format!("The ID '{}' is not valid", id),
    ))
}

/// CreateTags
pub fn create_tags(state: &mut Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let ids = params.indexed("ResourceId");
    if ids.is_empty() {
        return Err(ErrorEnvelope::missing_parameter(Dialect::Aws, "ResourceId.1"));
    }
    let tags = params.tags("Tag")?;
    if tags.is_empty() {
        return Err(ErrorEnvelope::missing_parameter(Dialect::Aws, "Tag.1.Key"));
    }
    validate_tags(&tags)?;

    // Check every resource before tagging any
    for id in &ids {
        let mut merged = with_tags_of(state, id, |existing| existing.clone())?;
        upsert_tags(&mut merged, &tags);
        validate_tags(&merged)?;
    }
    for id in &ids {
        with_tags_of(state, id, |existing| upsert_tags(existing, &tags))?;
    }

    Ok(XmlFields::new().bool("return", true))
}

/// DeleteTags
pub fn delete_tags(state: &mut Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let ids = params.indexed("ResourceId");
    if ids.is_empty() {
        return Err(ErrorEnvelope::missing_parameter(Dialect::Aws, "ResourceId.1"));
    }
    let keys = params.tag_keys("Tag")?;

    for id in &ids {
        with_tags_of(state, id, |_| ())?;
    }
    for id in &ids {
        with_tags_of(state, id, |existing| {
            if keys.is_empty() {
                existing.clear();
            } else {
                remove_tags(existing, &keys);
            }
        })?;
    }

    Ok(XmlFields::new().bool("return", true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_overwrites_by_key() {
        let mut tags = vec![Tag::new("Name", "old"), Tag::new("env", "dev")];
        upsert_tags(&mut tags, &[Tag::new("Name", "new"), Tag::new("team", "core")]);
        assert_eq!(
            tags,
            vec![
                Tag::new("Name", "new"),
                Tag::new("env", "dev"),
                Tag::new("team", "core")
            ]
        );
    }

    #[test]
    fn test_remove_respects_value() {
        let mut tags = vec![Tag::new("Name", "web"), Tag::new("env", "dev")];
        remove_tags(
            &mut tags,
            &[
                ("Name".to_string(), Some("db".to_string())),
                ("env".to_string(), None),
            ],
        );
        assert_eq!(tags, vec![Tag::new("Name", "web")]);
    }

    #[test]
    fn test_reserved_prefix_rejected() {
        assert!(validate_tags(&[Tag::new("aws:owner", "x")]).is_err());
        assert!(validate_tags(&[Tag::new("owner", "x")]).is_ok());
    }

    #[test]
    fn test_tag_limit() {
        let tags: Vec<Tag> = (0..=MAX_TAGS).map(|i| Tag::new(i.to_string(), "")).collect();
        let err = validate_tags(&tags).unwrap_err();
        assert_eq!(err.code, "TagLimitExceeded");
    }
}
