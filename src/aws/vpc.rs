//! VPCs

use std::sync::OnceLock;

use crate::cidr::{Cidr, MAX_PREFIX, MIN_PREFIX};
use crate::core::{
    Dependents, Dialect, ErrorEnvelope, ErrorKind, FieldMap, HasDependents, Outcome, Resource,
};

use super::query::QueryParams;
use super::tags::{tag_set, validate_tags, with_tag_fields, Tag, Tagged};
use super::xml::{XmlFields, XmlValue};
use super::{describe_records, Ec2State};

const TENANCY_DEFAULT: &str = "default";
const TENANCY_DEDICATED: &str = "dedicated";

#[derive(Debug, Clone, PartialEq)]
pub struct Vpc {
    pub vpc_id: String,
    pub cidr_block: Cidr,
    pub cidr_association_id: String,
    pub dhcp_options_id: String,
    pub instance_tenancy: String,
    pub is_default: bool,
    pub owner_id: String,
    pub state: String,
    pub tags: Vec<Tag>,
    pub dependents: Dependents,
}

impl Resource for Vpc {
    const KIND: &'static str = "ec2-vpc";

    fn key(&self) -> &str {
        &self.vpc_id
    }
}

impl HasDependents for Vpc {
    fn dependents(&self) -> &Dependents {
        &self.dependents
    }

    fn dependents_mut(&mut self) -> &mut Dependents {
        &mut self.dependents
    }
}

impl Tagged for Vpc {
    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut Vec<Tag> {
        &mut self.tags
    }
}

impl Vpc {
    pub fn to_xml(&self) -> XmlValue {
        XmlValue::Struct(self.to_fields())
    }

    pub fn to_fields(&self) -> XmlFields {
        let association = XmlFields::new()
            .text("cidrBlock", self.cidr_block.to_string())
            .text("associationId", &self.cidr_association_id)
            .structure("cidrBlockState", XmlFields::new().text("state", "associated"));

        XmlFields::new()
            .text("vpcId", &self.vpc_id)
            .text("ownerId", &self.owner_id)
            .text("state", &self.state)
            .text("cidrBlock", self.cidr_block.to_string())
            .set("cidrBlockAssociationSet", vec![XmlValue::Struct(association)])
            .text("dhcpOptionsId", &self.dhcp_options_id)
            .text("instanceTenancy", &self.instance_tenancy)
            .bool("isDefault", self.is_default)
            .list("tagSet", tag_set(&self.tags))
    }
}

fn fields() -> &'static FieldMap<Vpc> {
    static FIELDS: OnceLock<FieldMap<Vpc>> = OnceLock::new();
    FIELDS.get_or_init(|| {
        with_tag_fields(
            FieldMap::new()
                .field("vpc-id", |v: &Vpc| v.vpc_id.clone())
                .field("cidr", |v: &Vpc| v.cidr_block.to_string())
                .field("cidr-block-association.cidr-block", |v: &Vpc| v.cidr_block.to_string())
                .field("cidr-block-association.association-id", |v: &Vpc| {
                    v.cidr_association_id.clone()
                })
                .field("dhcp-options-id", |v: &Vpc| v.dhcp_options_id.clone())
                .field("is-default", |v: &Vpc| v.is_default.to_string())
                .field("owner-id", |v: &Vpc| v.owner_id.clone())
                .field("state", |v: &Vpc| v.state.clone()),
        )
    })
}

/// Parse a CIDR parameter into a block within the VPC size range
pub(crate) fn parse_block(raw: &str, range_code: &str) -> Outcome<Cidr> {
    let cidr: Cidr = raw.parse().map_err(|_| {
        ErrorEnvelope::invalid_value(
            Dialect::Aws,
            format!(
                "Value ({}) for parameter cidrBlock is invalid. This is not a valid CIDR block.",
                raw
            ),
        )
    })?;
    if !cidr.in_allowed_range() {
        return Err(ErrorEnvelope::with_code(
            Dialect::Aws,
            ErrorKind::InvalidParameterValue,
            range_code,
            format!(
                "The CIDR '{}' is invalid. Prefix length must be between /{} and /{}.",
                raw, MIN_PREFIX, MAX_PREFIX
            ),
        ));
    }
    Ok(cidr)
}

/// CreateVpc
pub fn create_vpc(state: &mut Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let cidr_block = parse_block(params.require("CidrBlock")?, "InvalidVpc.Range")?;

    let tenancy = params.get("InstanceTenancy").unwrap_or(TENANCY_DEFAULT);
    if tenancy != TENANCY_DEFAULT && tenancy != TENANCY_DEDICATED {
        return Err(ErrorEnvelope::invalid_value(
            Dialect::Aws,
            format!("Value ({}) for parameter instanceTenancy is invalid.", tenancy),
        ));
    }

    let resource_type = Vpc::def().resource_type.as_deref().unwrap_or("vpc");
    let tags = params.tag_specifications(resource_type)?;
    validate_tags(&tags)?;

    let vpc_id = state
        .ids
        .generate_unused(Vpc::def().id_prefix(), |id| state.vpcs.contains(id));
    let vpc = Vpc {
        cidr_association_id: state.ids.generate("vpc-cidr-assoc"),
        dhcp_options_id: state.ids.generate("dopt"),
        vpc_id,
        cidr_block,
        instance_tenancy: tenancy.to_string(),
        is_default: false,
        owner_id: state.account_id.clone(),
        state: "available".to_string(),
        tags,
        dependents: Dependents::new(),
    };

    let body = XmlFields::new().structure("vpc", vpc.to_fields());
    state.vpcs.put(vpc);
    Ok(body)
}

/// DescribeVpcs
pub fn describe_vpcs(state: &Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let ids = params.indexed("VpcId");
    let page = describe_records(&state.vpcs, &ids, "vpc-id", params, fields())?;

    Ok(XmlFields::new()
        .set("vpcSet", page.items.iter().map(Vpc::to_xml).collect())
        .opt_text("nextToken", page.next_token))
}

/// DeleteVpc, refused while subnets or security groups remain
pub fn delete_vpc(state: &mut Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let vpc_id = params.require("VpcId")?;
    state.vpcs.delete_checked(vpc_id)?;
    Ok(XmlFields::new().bool("return", true))
}

/// ModifyVpcTenancy; AWS only allows moving back to `default`
pub fn modify_vpc_tenancy(state: &mut Ec2State, params: &QueryParams) -> Outcome<XmlFields> {
    let vpc_id = params.require("VpcId")?;
    let tenancy = params.require("InstanceTenancy")?;
    if tenancy != TENANCY_DEFAULT {
        return Err(ErrorEnvelope::invalid_value(
            Dialect::Aws,
            format!(
                "Value ({}) for parameter InstanceTenancy is invalid. Only 'default' is supported.",
                tenancy
            ),
        ));
    }

    let vpc = state.vpcs.get_mut_or_err(vpc_id)?;
    vpc.instance_tenancy = tenancy.to_string();
    Ok(XmlFields::new().bool("return", true))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn create(state: &mut Ec2State, pairs: &[(&str, &str)]) -> String {
        let out = create_vpc(state, &params(pairs)).expect("create vpc");
        text_of(&out, &["vpc", "vpcId"]).expect("vpc id")
    }

    #[test]
    fn test_create_vpc_defaults() {
        let mut s = state();
        let id = create(&mut s, &[("CidrBlock", "10.0.0.0/16")]);
        assert!(id.starts_with("vpc-"));
        assert_eq!(id.len(), "vpc-".len() + 17);

        let vpc = s.vpcs.get(&id).expect("stored");
        assert_eq!(vpc.state, "available");
        assert_eq!(vpc.instance_tenancy, "default");
        assert_eq!(vpc.owner_id, "123456789012");
    }

    #[test]
    fn test_create_vpc_validation() {
        let mut s = state();
        let err = create_vpc(&mut s, &params(&[])).unwrap_err();
        assert_eq!(err.code, "MissingParameter");

        let err = create_vpc(&mut s, &params(&[("CidrBlock", "10.0.0.0/8")])).unwrap_err();
        assert_eq!(err.code, "InvalidVpc.Range");

        let err = create_vpc(&mut s, &params(&[("CidrBlock", "banana")])).unwrap_err();
        assert_eq!(err.code, "InvalidParameterValue");

        let err = create_vpc(
            &mut s,
            &params(&[("CidrBlock", "10.0.0.0/16"), ("InstanceTenancy", "host")]),
        )
        .unwrap_err();
        assert_eq!(err.code, "InvalidParameterValue");
        assert!(s.vpcs.is_empty());
    }

    #[test]
    fn test_describe_unknown_id() {
        let s = state();
        let err = describe_vpcs(&s, &params(&[("VpcId.1", "vpc-0000")])).unwrap_err();
        assert_eq!(err.code, "InvalidVpcID.NotFound");
    }

    #[test]
    fn test_describe_rejects_unknown_filter() {
        let s = state();
        let err = describe_vpcs(
            &s,
            &params(&[("Filter.1.Name", "colour"), ("Filter.1.Value.1", "blue")]),
        )
        .unwrap_err();
        assert_eq!(err.code, "InvalidParameterValue");
    }

    #[test]
    fn test_describe_by_wildcard_tag() {
        let mut s = state();
        create(
            &mut s,
            &[
                ("CidrBlock", "10.0.0.0/16"),
                ("TagSpecification.1.ResourceType", "vpc"),
                ("TagSpecification.1.Tag.1.Key", "Name"),
                ("TagSpecification.1.Tag.1.Value", "web-prod"),
            ],
        );
        create(&mut s, &[("CidrBlock", "10.1.0.0/16")]);

        let out = describe_vpcs(
            &s,
            &params(&[("Filter.1.Name", "tag:Name"), ("Filter.1.Value.1", "web*")]),
        )
        .expect("describe");
        match out.get("vpcSet") {
            Some(XmlValue::List(items)) => assert_eq!(items.len(), 1),
            other => panic!("unexpected vpcSet: {:?}", other),
        }
        assert!(out.get("nextToken").is_none());
    }

    #[test]
    fn test_modify_tenancy() {
        let mut s = state();
        let id = create(
            &mut s,
            &[("CidrBlock", "10.0.0.0/16"), ("InstanceTenancy", "dedicated")],
        );
        let err = modify_vpc_tenancy(
            &mut s,
            &params(&[("VpcId", &id), ("InstanceTenancy", "dedicated")]),
        )
        .unwrap_err();
        assert_eq!(err.code, "InvalidParameterValue");

        modify_vpc_tenancy(&mut s, &params(&[("VpcId", &id), ("InstanceTenancy", "default")]))
            .expect("modify");
        assert_eq!(s.vpcs.get(&id).map(|v| v.instance_tenancy.as_str()), Some("default"));
    }

    #[test]
    fn test_delete_missing_vpc() {
        let mut s = state();
        let err = delete_vpc(&mut s, &params(&[("VpcId", "vpc-missing")])).unwrap_err();
        assert_eq!(err.code, "InvalidVpcID.NotFound");
    }
}
