//! Security groups

use std::sync::OnceLock;

use crate::core::{
    attach, detach, verify_parents, DependsOn, Dialect, ErrorEnvelope, ErrorKind, FieldMap,
    Outcome, Resource,
};

use super::query::QueryParams;
use super::tags::{tag_set, validate_tags, with_tag_fields, Tag, Tagged};
use super::vpc::Vpc;
use super::xml::{XmlFields, XmlValue};
use super::{describe_records, Ec2State};

const MAX_NAME_LEN: usize = 255;

/// Rule in `ipPermissions` / `ipPermissionsEgress`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpPermission {
    pub ip_protocol: String,
    pub from_port: Option<i64>,
    pub to_port: Option<i64>,
    pub cidr_ranges: Vec<String>,
}

impl IpPermission {
    /// The egress rule AWS puts on every new group
    pub fn allow_all_egress() -> Self {
        Self {
            ip_protocol: "-1".to_string(),
            from_port: None,
            to_port: None,
            cidr_ranges: vec!["0.0.0.0/0".to_string()],
        }
    }

    fn to_xml(&self) -> XmlValue {
        let mut fields = XmlFields::new().text("ipProtocol", &self.ip_protocol);
        if let Some(port) = self.from_port {
            fields = fields.int("fromPort", port);
        }
        if let Some(port) = self.to_port {
            fields = fields.int("toPort", port);
        }
        XmlValue::Struct(
            fields.set("groups", vec![]).set(
                "ipRanges",
                self.cidr_ranges
                    .iter()
                    .map(|c| XmlValue::Struct(XmlFields::new().text("cidrIp", c)))
                    .collect(),
            ),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroup {
    pub group_id: String,
    pub group_name: String,
    pub description: String,
    pub vpc_id: String,
    pub owner_id: String,
    pub ip_permissions: Vec<IpPermission>,
    pub ip_permissions_egress: Vec<IpPermission>,
    pub tags: Vec<Tag>,
}

impl Resource for SecurityGroup {
    const KIND: &'static str = "ec2-security-group";

    fn key(&self) -> &str {
        &self.group_id
    }
}

impl DependsOn<Vpc> for SecurityGroup {
    fn parent_keys(&self) -> Vec<String> {
        vec![self.vpc_id.clone()]
    }
}

impl Tagged for SecurityGroup {
    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut Vec<Tag> {
        &mut self.tags
    }
}

impl SecurityGroup {
    pub fn to_xml(&self) -> XmlValue {
        XmlValue::Struct(
            XmlFields::new()
                .text("ownerId", &self.owner_id)
                .text("groupId", &self.group_id)
                .text("groupName", &self.group_name)
                .text("groupDescription", &self.description)
                .text("vpcId", &self.vpc_id)
                .set(
                    "ipPermissions",
                    self.ip_permissions.iter().map(IpPermission::to_xml).collect(),
                )
                .set(
                    "ipPermissionsEgress",
                    self.ip_permissions_egress
                        .iter()
                        .map(IpPermission::to_xml)
                        .collect(),
                )
                .list("tagSet", tag_set(&self.tags)),
        )
    }
}

fn fields() -> &'static FieldMap<SecurityGroup> {
    static FIELDS: OnceLock<FieldMap<SecurityGroup>> = OnceLock::new();
    FIELDS.get_or_init(|| {
        with_tag_fields(
            FieldMap::new()
                .field("group-id", |g: &SecurityGroup| g.group_id.clone())
                .field("group-name", |g: &SecurityGroup| g.group_name.clone())
                .field("description", |g: &SecurityGroup| g.description.clone())
                .field("vpc-id", |g: &SecurityGroup| g.vpc_id.clone())
                .field("owner-id", |g: &SecurityGroup| g.owner_id.clone())
                .multi("egress.ip-permission.cidr", |g: &SecurityGroup| {
                    g.ip_permissions_egress
                        .iter()
                        .flat_map(|p| p.cidr_ranges.clone())
                        .collect()
                })
                .multi("ip-permission.protocol", |g: &SecurityGroup| {
                    g.ip_permissions
                        .iter()
                        .map(|p| p.ip_protocol.clone())
                        .collect()
                }),
        )
    })
}

fn group_not_found(name: &str) -> ErrorEnvelope {
    ErrorEnvelope::with_code(
        Dialect::Aws,
        ErrorKind::NotFound,
        SecurityGroup::def()
            .not_found_code
            .clone()
            .unwrap_or_else(|| ErrorKind::NotFound.aws_code().to_string()),
        format!("The security group '{}' does not exist", name),
    )
}

/// Resolve a group name to its id; names shared across VPCs are ambiguous
fn id_for_name(state: &Ec2State, name: &str) -> Outcome<String> {
    let matches: Vec<&SecurityGroup> = state
        .security_groups
        .values()
        .into_iter()
        .filter(|g| g.group_name == name)
        .collect();
    match matches.as_slice() {
        [] => Err(group_not_found(name)),
        [group] => Ok(group.group_id.clone()),
        _ => Err(ErrorEnvelope::invalid_value(
            Dialect::Aws,
            format!(
                "Security group name '{}' is used in more than one VPC; specify GroupId",
                name
            ),
        )),
    }
}

fn validate_name(name: &str) -> Outcome<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(ErrorEnvelope::invalid_value(
            Dialect::Aws,
            format!("Group name '{}' exceeds {} characters", name, MAX_NAME_LEN),
        ));
    }
    if name.starts_with("sg-") {
        return Err(ErrorEnvelope::invalid_value(
            Dialect::Aws,
            "Group names may not be in the format sg-*",
        ));
    }
    Ok(())
}

/// CreateSecurityGroup
pub fn create_security_group(state: &mut Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let name = params.require("GroupName")?;
    let description = params.require("GroupDescription")?;
    let vpc_id = params.require("VpcId")?;
    validate_name(name)?;
    let tags = params.tag_specifications(
        SecurityGroup::def()
            .resource_type
            .as_deref()
            .unwrap_or("security-group"),
    )?;
    validate_tags(&tags)?;

    state.vpcs.get_or_err(vpc_id)?;
    if state
        .security_groups
        .find(|g| g.vpc_id == vpc_id && g.group_name == name)
        .is_some()
    {
        return Err(ErrorEnvelope::with_code(
            Dialect::Aws,
            ErrorKind::AlreadyExists,
            SecurityGroup::def()
                .duplicate_code
                .clone()
                .unwrap_or_else(|| ErrorKind::AlreadyExists.aws_code().to_string()),
            format!(
                "The security group '{}' already exists for VPC '{}'",
                name, vpc_id
            ),
        ));
    }

    let group_id = state.ids.generate_unused(SecurityGroup::def().id_prefix(), |id| {
        state.security_groups.contains(id)
    });
    let group = SecurityGroup {
        group_id: group_id.clone(),
        group_name: name.to_string(),
        description: description.to_string(),
        vpc_id: vpc_id.to_string(),
        owner_id: state.account_id.clone(),
        ip_permissions: Vec::new(),
        ip_permissions_egress: vec![IpPermission::allow_all_egress()],
        tags,
    };

    verify_parents(&group, &state.vpcs)?;
    attach(&group, &mut state.vpcs);
    let tag_xml = tag_set(&group.tags);
    state.security_groups.put(group);

    Ok(XmlFields::new()
        .bool("return", true)
        .text("groupId", group_id)
        .list("tagSet", tag_xml))
}

/// DescribeSecurityGroups
pub fn describe_security_groups(state: &Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let mut ids = params.indexed("GroupId");
    for name in params.indexed("GroupName") {
        ids.push(id_for_name(state, &name)?);
    }
    let page = describe_records(&state.security_groups, &ids, "group-id", params, fields())?;

    Ok(XmlFields::new()
        .set(
            "securityGroupInfo",
            page.items.iter().map(SecurityGroup::to_xml).collect(),
        )
        .opt_text("nextToken", page.next_token))
}

/// DeleteSecurityGroup by GroupId or GroupName
pub fn delete_security_group(state: &mut Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let group_id = match (params.get("GroupId"), params.get("GroupName")) {
        (Some(id), _) if !id.is_empty() => id.to_string(),
        (_, Some(name)) if !name.is_empty() => id_for_name(state, name)?,
        _ => return Err(ErrorEnvelope::missing_parameter(Dialect::Aws, "GroupId")),
    };
    let group = state.security_groups.get_or_err(&group_id)?.clone();

    detach(&group, &mut state.vpcs);
    state.security_groups.delete(&group_id);
    Ok(XmlFields::new()
        .bool("return", true)
        .text("groupId", group_id))
}
