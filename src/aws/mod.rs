//! EC2 dialect
//!
//! Query-string requests in, XML documents out. Every action is a plain
//! function over [`Ec2State`]; the server holds the state behind a lock and
//! picks the read or write side with [`is_read_only`].

pub mod query;
pub mod security_group;
pub mod subnet;
pub mod tags;
pub mod vpc;
pub mod xml;

use crate::core::{
    filter, page, Dialect, ErrorEnvelope, ErrorKind, FieldMap, FilterClause, IdGenerator, Outcome,
    Page, Resource, ResourceStore,
};

use query::QueryParams;
use security_group::SecurityGroup;
use subnet::Subnet;
use vpc::Vpc;
use xml::XmlFields;

/// In-memory EC2 account for one region
#[derive(Debug, Clone)]
pub struct Ec2State {
    pub account_id: String,
    pub region: String,
    pub vpcs: ResourceStore<Vpc>,
    pub subnets: ResourceStore<Subnet>,
    pub security_groups: ResourceStore<SecurityGroup>,
    pub ids: IdGenerator,
}

impl Ec2State {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self::with_ids(account_id, region, IdGenerator::new(Dialect::Aws))
    }

    pub fn with_ids(account_id: impl Into<String>, region: impl Into<String>, ids: IdGenerator) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            vpcs: ResourceStore::new(),
            subnets: ResourceStore::new(),
            security_groups: ResourceStore::new(),
            ids,
        }
    }
}

/// Actions that only need the read lock
pub fn is_read_only(action: &str) -> bool {
    action.starts_with("Describe")
}

/// Run a mutating action
pub fn dispatch(state: &mut Ec2State, action: &str, params: &QueryParams) -> Outcome<XmlFields> {
    match action {
        "CreateVpc" => vpc::create_vpc(state, params),
        "DeleteVpc" => vpc::delete_vpc(state, params),
        "ModifyVpcTenancy" => vpc::modify_vpc_tenancy(state, params),
        "CreateSubnet" => subnet::create_subnet(state, params),
        "DeleteSubnet" => subnet::delete_subnet(state, params),
        "CreateSecurityGroup" => security_group::create_security_group(state, params),
        "DeleteSecurityGroup" => security_group::delete_security_group(state, params),
        "CreateTags" => tags::create_tags(state, params),
        "DeleteTags" => tags::delete_tags(state, params),
        _ if is_read_only(action) => describe(state, action, params),
        _ => Err(invalid_action(action)),
    }
}

/// Run a read-only action
pub fn describe(state: &Ec2State, action: &str, params: &QueryParams) -> Outcome<XmlFields> {
    match action {
        "DescribeVpcs" => vpc::describe_vpcs(state, params),
        "DescribeSubnets" => subnet::describe_subnets(state, params),
        "DescribeSecurityGroups" => security_group::describe_security_groups(state, params),
        _ => Err(invalid_action(action)),
    }
}

pub fn invalid_action(action: &str) -> ErrorEnvelope {
    ErrorEnvelope::with_code(
        Dialect::Aws,
        ErrorKind::InvalidParameterValue,
        "InvalidAction",
        format!("The action {} is not valid for this web service.", action),
    )
}

/// Shared Describe* flow: explicit ids must exist, then filter and page
///
/// `id_key` is the filter key the explicit ids are matched on.
pub(crate) fn describe_records<T: Resource>(
    store: &ResourceStore<T>,
    ids: &[String],
    id_key: &str,
    params: &QueryParams,
    fields: &FieldMap<T>,
) -> Outcome<Page<T>> {
    for id in ids {
        store.get_or_err(id)?;
    }

    let mut clauses = params.filters()?;
    fields.validate(&clauses, Dialect::Aws)?;
    if !ids.is_empty() {
        clauses.push(FilterClause::eq(id_key, ids.to_vec()));
    }

    let matching: Vec<T> = filter::apply(store.values(), &clauses, fields)
        .into_iter()
        .cloned()
        .collect();
    let max_results = params.max_results()?.unwrap_or(usize::MAX);
    Ok(page(&matching, params.next_token(), max_results))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn state() -> Ec2State {
        Ec2State::with_ids("123456789012", "us-east-1", IdGenerator::seeded(Dialect::Aws, 7))
    }

    pub fn params(pairs: &[(&str, &str)]) -> QueryParams {
        QueryParams::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    /// Text of a top-level or `item`-nested element, for assertions
    pub fn text_of(fields: &XmlFields, path: &[&str]) -> Option<String> {
        use xml::XmlValue;

        let (first, rest) = path.split_first()?;
        let mut value = fields.get(first)?;
        for name in rest {
            value = match value {
                XmlValue::Struct(inner) => inner.get(name)?,
                _ => return None,
            };
        }
        match value {
            XmlValue::Text(t) => Some(t.clone()),
            XmlValue::Bool(b) => Some(b.to_string()),
            XmlValue::Int(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
