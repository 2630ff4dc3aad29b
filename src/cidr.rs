//! IPv4 CIDR blocks shared by VPC subnets and GCP subnetworks

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Prefix lengths AWS accepts for VPC and subnet blocks
pub const MIN_PREFIX: u8 = 16;
pub const MAX_PREFIX: u8 = 28;

/// Addresses AWS reserves in every subnet
const RESERVED_PER_SUBNET: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: u32,
    prefix: u8,
}

impl Cidr {
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// Usable addresses once AWS reservations are taken out
    pub fn available_addresses(&self) -> u64 {
        self.size().saturating_sub(RESERVED_PER_SUBNET)
    }

    /// Whether `other` lies entirely inside this block
    pub fn contains(&self, other: &Cidr) -> bool {
        other.prefix >= self.prefix && (other.network & self.mask()) == self.network
    }

    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// Address `offset` positions into the block, if it fits
    pub fn host(&self, offset: u32) -> Option<Ipv4Addr> {
        if u64::from(offset) >= self.size() {
            return None;
        }
        Some(Ipv4Addr::from(self.network + offset))
    }

    /// Position of `addr` inside the block
    pub fn offset_of(&self, addr: Ipv4Addr) -> Option<u32> {
        let raw = u32::from(addr);
        ((raw & self.mask()) == self.network).then(|| raw - self.network)
    }

    pub fn in_allowed_range(&self) -> bool {
        (MIN_PREFIX..=MAX_PREFIX).contains(&self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = String;

    /// Parse `a.b.c.d/n`. Host bits must be zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("'{}' is not a CIDR block", s))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| format!("'{}' is not a valid IPv4 address", addr))?;
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| format!("'{}' is not a valid prefix length", prefix))?;

        let cidr = Cidr {
            network: u32::from(addr),
            prefix,
        };
        if cidr.network & !cidr.mask() != 0 {
            return Err(format!("'{}' has host bits set", s));
        }
        Ok(cidr)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.network), self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> Cidr {
        s.parse().expect("valid cidr")
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(cidr("10.0.0.0/16").to_string(), "10.0.0.0/16");
        assert!("10.0.0.1/16".parse::<Cidr>().is_err());
        assert!("10.0.0.0".parse::<Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Cidr>().is_err());
        assert!("300.0.0.0/16".parse::<Cidr>().is_err());
    }

    #[test]
    fn test_contains_and_overlaps() {
        let vpc = cidr("10.0.0.0/16");
        assert!(vpc.contains(&cidr("10.0.1.0/24")));
        assert!(!vpc.contains(&cidr("10.1.0.0/24")));
        assert!(cidr("10.0.0.0/24").overlaps(&cidr("10.0.0.0/25")));
        assert!(!cidr("10.0.0.0/25").overlaps(&cidr("10.0.0.128/25")));
    }

    #[test]
    fn test_available_addresses() {
        assert_eq!(cidr("10.0.0.0/24").available_addresses(), 251);
        assert_eq!(cidr("10.0.0.0/28").available_addresses(), 11);
    }

    #[test]
    fn test_host_offsets() {
        let block = cidr("10.128.0.0/20");
        assert_eq!(block.host(1), Some(Ipv4Addr::new(10, 128, 0, 1)));
        assert_eq!(block.host(4096), None);
        assert_eq!(block.offset_of(Ipv4Addr::new(10, 128, 1, 2)), Some(258));
        assert_eq!(block.offset_of(Ipv4Addr::new(10, 129, 0, 0)), None);
    }

    #[test]
    fn test_allowed_range() {
        assert!(cidr("10.0.0.0/16").in_allowed_range());
        assert!(!cidr("10.0.0.0/8").in_allowed_range());
        assert!(!cidr("10.0.0.0/30").in_allowed_range());
    }
}
