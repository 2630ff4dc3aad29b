//! Subnets

use std::sync::OnceLock;

use crate::cidr::Cidr;
use crate::core::{
    attach, detach, verify_parents, DependsOn, Dialect, ErrorEnvelope, ErrorKind, FieldMap,
    Outcome, Resource,
};

use super::query::QueryParams;
use super::tags::{tag_set, validate_tags, with_tag_fields, Tag, Tagged};
use super::vpc::{parse_block, Vpc};
use super::xml::{XmlFields, XmlValue};
use super::{describe_records, Ec2State};

#[derive(Debug, Clone, PartialEq)]
pub struct Subnet {
    pub subnet_id: String,
    pub vpc_id: String,
    pub cidr_block: Cidr,
    pub availability_zone: String,
    pub available_ip_address_count: u64,
    pub default_for_az: bool,
    pub map_public_ip_on_launch: bool,
    pub owner_id: String,
    pub subnet_arn: String,
    pub state: String,
    pub tags: Vec<Tag>,
}

impl Resource for Subnet {
    const KIND: &'static str = "ec2-subnet";

    fn key(&self) -> &str {
        &self.subnet_id
    }
}

impl DependsOn<Vpc> for Subnet {
    fn parent_keys(&self) -> Vec<String> {
        vec![self.vpc_id.clone()]
    }
}

impl Tagged for Subnet {
    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut Vec<Tag> {
        &mut self.tags
    }
}

impl Subnet {
    pub fn to_fields(&self) -> XmlFields {
        XmlFields::new()
            .text("subnetId", &self.subnet_id)
            .text("subnetArn", &self.subnet_arn)
            .text("state", &self.state)
            .text("ownerId", &self.owner_id)
            .text("vpcId", &self.vpc_id)
            .text("cidrBlock", self.cidr_block.to_string())
            .int(
                "availableIpAddressCount",
                i64::try_from(self.available_ip_address_count).unwrap_or(i64::MAX),
            )
            .text("availabilityZone", &self.availability_zone)
            .bool("defaultForAz", self.default_for_az)
            .bool("mapPublicIpOnLaunch", self.map_public_ip_on_launch)
            .list("tagSet", tag_set(&self.tags))
    }
}

fn fields() -> &'static FieldMap<Subnet> {
    static FIELDS: OnceLock<FieldMap<Subnet>> = OnceLock::new();
    FIELDS.get_or_init(|| {
        let cidr = |s: &Subnet| s.cidr_block.to_string();
        let zone = |s: &Subnet| s.availability_zone.clone();
        let default_for_az = |s: &Subnet| s.default_for_az.to_string();
        with_tag_fields(
            FieldMap::new()
                .field("subnet-id", |s: &Subnet| s.subnet_id.clone())
                .field("subnet-arn", |s: &Subnet| s.subnet_arn.clone())
                .field("vpc-id", |s: &Subnet| s.vpc_id.clone())
                .field("cidr-block", cidr)
                .field("cidr", cidr)
                .field("cidrBlock", cidr)
                .field("availability-zone", zone)
                .field("availabilityZone", zone)
                .field("available-ip-address-count", |s: &Subnet| {
                    s.available_ip_address_count.to_string()
                })
                .field("default-for-az", default_for_az)
                .field("defaultForAz", default_for_az)
                .field("map-public-ip-on-launch", |s: &Subnet| {
                    s.map_public_ip_on_launch.to_string()
                })
                .field("owner-id", |s: &Subnet| s.owner_id.clone())
                .field("state", |s: &Subnet| s.state.clone()),
        )
    })
}

/// Availability zone for a new subnet: given, or the region's first zone
fn availability_zone(state: &Ec2State, requested: Option<&str>) -> Outcome<String> {
    let Some(zone) = requested.filter(|z| !z.is_empty()) else {
        return Ok(format!("{}a", state.region));
    };
    let suffix = zone.strip_prefix(state.region.as_str()).unwrap_or("");
    if suffix.len() == 1 && suffix.chars().all(|c| c.is_ascii_lowercase()) {
        return Ok(zone.to_string());
    }
    Err(ErrorEnvelope::invalid_value(
        Dialect::Aws,
        format!(
            "Value ({}) for parameter availabilityZone is invalid. Subnets can currently only be created in the following availability zones: {}a, {}b, {}c.",
            zone, state.region, state.region, state.region
        ),
    ))
}

/// CreateSubnet
pub fn create_subnet(state: &mut Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let vpc_id = params.require("VpcId")?;
    let cidr_block = parse_block(params.require("CidrBlock")?, "InvalidSubnet.Range")?;
    let availability_zone = availability_zone(state, params.get("AvailabilityZone"))?;
    let tags = params.tag_specifications(Subnet::def().resource_type.as_deref().unwrap_or("subnet"))?;
    validate_tags(&tags)?;

    let vpc = state.vpcs.get_or_err(vpc_id)?;
    if !vpc.cidr_block.contains(&cidr_block) {
        return Err(ErrorEnvelope::with_code(
            Dialect::Aws,
            ErrorKind::InvalidParameterValue,
            "InvalidSubnet.Range",
            format!("The CIDR '{}' is invalid.", cidr_block),
        ));
    }
    let conflict = state
        .subnets
        .find(|s| s.vpc_id == vpc_id && s.cidr_block.overlaps(&cidr_block));
    if conflict.is_some() {
        return Err(ErrorEnvelope::with_code(
            Dialect::Aws,
            ErrorKind::AlreadyExists,
            Subnet::def()
                .duplicate_code
                .clone()
                .unwrap_or_else(|| ErrorKind::AlreadyExists.aws_code().to_string()),
            format!("The CIDR '{}' conflicts with another subnet", cidr_block),
        ));
    }

    let subnet_id = state
        .ids
        .generate_unused(Subnet::def().id_prefix(), |id| state.subnets.contains(id));
    let subnet = Subnet {
        subnet_arn: format!(
            "arn:aws:ec2:{}:{}:subnet/{}",
            state.region, state.account_id, subnet_id
        ),
        subnet_id,
        vpc_id: vpc_id.to_string(),
        available_ip_address_count: cidr_block.available_addresses(),
        cidr_block,
        availability_zone,
        default_for_az: false,
        map_public_ip_on_launch: false,
        owner_id: state.account_id.clone(),
        state: "available".to_string(),
        tags,
    };

    verify_parents(&subnet, &state.vpcs)?;
    attach(&subnet, &mut state.vpcs);
    let body = XmlFields::new().structure("subnet", subnet.to_fields());
    state.subnets.put(subnet);
    Ok(body)
}

/// DescribeSubnets
pub fn describe_subnets(state: &Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let ids = params.indexed("SubnetId");
    let page = describe_records(&state.subnets, &ids, "subnet-id", params, fields())?;

    Ok(XmlFields::new()
        .set(
            "subnetSet",
            page.items
                .iter()
                .map(|s| XmlValue::Struct(s.to_fields()))
                .collect(),
        )
        .opt_text("nextToken", page.next_token))
}

/// DeleteSubnet
pub fn delete_subnet(state: &mut Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let subnet_id = params.require("SubnetId")?;
    let subnet = state.subnets.get_or_err(subnet_id)?.clone();

    detach(&subnet, &mut state.vpcs);
    state.subnets.delete(subnet_id);
    Ok(XmlFields::new().bool("return", true))
}
