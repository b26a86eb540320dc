//! Logical addressing: IPv4-style addresses, subnet masks, and CIDR blocks.
//!
//! The simulation uses CIDR (classless inter-domain routing) subnetting.
//! Classful networks are not supported. Masks are always contiguous runs of
//! ones, which is what makes the longest-prefix ordering in
//! [`RouteTable`](crate::router::RouteTable) work: a more specific mask
//! compares greater than a less specific one.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error as ThisError;

/// A logical network address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct Ipv4Address([u8; 4]);

impl Ipv4Address {
    /// The address `0.0.0.0`, used as the "directly connected" next hop in
    /// route entries.
    pub const UNSPECIFIED: Self = Self([0u8, 0, 0, 0]);

    /// The address `255.255.255.255`.
    pub const BROADCAST: Self = Self([255u8, 255, 255, 255]);

    /// Creates a new address from octets.
    pub const fn new(address: [u8; 4]) -> Self {
        Self(address)
    }

    /// Gets the address as a `u32`.
    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Gets the address as octets.
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0
    }
}

impl Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl From<u32> for Ipv4Address {
    fn from(n: u32) -> Self {
        Self(n.to_be_bytes())
    }
}

impl From<[u8; 4]> for Ipv4Address {
    fn from(n: [u8; 4]) -> Self {
        Self(n)
    }
}

impl From<Ipv4Address> for u32 {
    fn from(address: Ipv4Address) -> Self {
        address.to_u32()
    }
}

impl From<Ipv4Address> for String {
    fn from(address: Ipv4Address) -> Self {
        address.to_string()
    }
}

impl FromStr for Ipv4Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 4];
        let mut parts = s.split('.');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| bad_address(s))?;
            *octet = part.parse().map_err(|_| bad_address(s))?;
        }
        if parts.next().is_some() {
            return Err(bad_address(s));
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for Ipv4Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

fn bad_address(text: &str) -> AddressError {
    AddressError::MalformedAddress(text.to_string())
}

/// A subnet mask: a contiguous run of ones followed by zeros.
///
/// The `Ord` implementation orders masks by specificity, so iterating a
/// `BTreeMap` keyed by mask in reverse visits the most specific prefix first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Ipv4Mask(u32);

impl Ipv4Mask {
    /// Returns a mask of `size` ones. A `size` over 32 is clamped to 32.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cygnet_core::address::Ipv4Mask;
    /// let mask = Ipv4Mask::from_bitcount(16);
    /// assert_eq!(mask.to_u32(), 0xFF_FF_00_00);
    /// ```
    pub const fn from_bitcount(size: u32) -> Self {
        if size == 0 {
            Self(0)
        } else if size >= 32 {
            Self(0xFF_FF_FF_FF)
        } else {
            Self(((1u32 << size) - 1) << (32 - size))
        }
    }

    /// The number of ones in the mask, i.e. the prefix length.
    pub const fn count_ones(self) -> u32 {
        self.0.count_ones()
    }

    /// The mask as a `u32`.
    pub const fn to_u32(self) -> u32 {
        self.0
    }

    /// Applies the mask to an address, yielding the network identifier.
    pub fn mask(self, address: Ipv4Address) -> Ipv4Address {
        Ipv4Address::from(address.to_u32() & self.0)
    }
}

impl Display for Ipv4Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.count_ones())
    }
}

/// A network address together with its mask, e.g. `192.168.0.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Cidr {
    network: Ipv4Address,
    mask: Ipv4Mask,
}

impl Cidr {
    /// Creates a CIDR block. The address is masked down to its network
    /// identifier, so `192.168.0.17/24` and `192.168.0.0/24` are the same
    /// block.
    pub fn new(address: Ipv4Address, mask: Ipv4Mask) -> Self {
        Self {
            network: mask.mask(address),
            mask,
        }
    }

    /// A /32 block holding exactly one address.
    pub fn host(address: Ipv4Address) -> Self {
        Self::new(address, Ipv4Mask::from_bitcount(32))
    }

    pub fn network(self) -> Ipv4Address {
        self.network
    }

    pub fn mask(self) -> Ipv4Mask {
        self.mask
    }

    /// Whether the address falls inside this block.
    pub fn contains(self, address: Ipv4Address) -> bool {
        self.mask.mask(address) == self.network
    }
}

impl Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.network, self.mask)
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

impl FromStr for Cidr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| AddressError::MalformedCidr(s.to_string()))?;
        let address: Ipv4Address = address.parse()?;
        let prefix: u32 = prefix
            .parse()
            .map_err(|_| AddressError::MalformedCidr(s.to_string()))?;
        if prefix > 32 {
            return Err(AddressError::MalformedCidr(s.to_string()));
        }
        Ok(Self::new(address, Ipv4Mask::from_bitcount(prefix)))
    }
}

impl TryFrom<String> for Cidr {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A host address together with the mask of the subnet it lives in, e.g. an
/// interface assignment of `192.168.0.10/24`.
///
/// Unlike [`Cidr`], the host bits are preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct IpConfig {
    pub address: Ipv4Address,
    pub mask: Ipv4Mask,
}

impl IpConfig {
    pub fn new(address: Ipv4Address, mask: Ipv4Mask) -> Self {
        Self { address, mask }
    }

    /// The subnet the address belongs to.
    pub fn subnet(self) -> Cidr {
        Cidr::new(self.address, self.mask)
    }
}

impl Display for IpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.address, self.mask)
    }
}

impl From<IpConfig> for String {
    fn from(config: IpConfig) -> Self {
        config.to_string()
    }
}

impl FromStr for IpConfig {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| AddressError::MalformedCidr(s.to_string()))?;
        let address: Ipv4Address = address.parse()?;
        let prefix: u32 = prefix
            .parse()
            .map_err(|_| AddressError::MalformedCidr(s.to_string()))?;
        if prefix > 32 {
            return Err(AddressError::MalformedCidr(s.to_string()));
        }
        Ok(Self::new(address, Ipv4Mask::from_bitcount(prefix)))
    }
}

impl TryFrom<String> for IpConfig {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("malformed address: {0:?}")]
    MalformedAddress(String),
    #[error("malformed CIDR block: {0:?}")]
    MalformedCidr(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_quads() {
        let address: Ipv4Address = "192.168.0.10".parse().unwrap();
        assert_eq!(address, Ipv4Address::new([192, 168, 0, 10]));
        assert_eq!(address.to_string(), "192.168.0.10");
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!("192.168.0".parse::<Ipv4Address>().is_err());
        assert!("192.168.0.10.1".parse::<Ipv4Address>().is_err());
        assert!("192.168.0.256".parse::<Ipv4Address>().is_err());
        assert!("giraffe".parse::<Ipv4Address>().is_err());
    }

    #[test]
    fn mask_specificity_ordering() {
        let wide = Ipv4Mask::from_bitcount(8);
        let narrow = Ipv4Mask::from_bitcount(24);
        assert!(narrow > wide);
        assert_eq!(Ipv4Mask::from_bitcount(0).to_u32(), 0);
        assert_eq!(Ipv4Mask::from_bitcount(40).to_u32(), 0xFF_FF_FF_FF);
    }

    #[test]
    fn cidr_contains() {
        let block: Cidr = "10.0.0.0/8".parse().unwrap();
        assert!(block.contains("10.255.0.1".parse().unwrap()));
        assert!(!block.contains("11.0.0.1".parse().unwrap()));
    }

    #[test]
    fn cidr_normalizes_to_network_id() {
        let block: Cidr = "192.168.0.17/24".parse().unwrap();
        assert_eq!(block.network(), Ipv4Address::new([192, 168, 0, 0]));
        assert_eq!(block.to_string(), "192.168.0.0/24");
    }

    #[test]
    fn rejects_malformed_cidr() {
        assert!("10.0.0.0".parse::<Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Cidr>().is_err());
    }

    #[test]
    fn ip_config_keeps_host_bits() {
        let config: IpConfig = "192.168.0.10/24".parse().unwrap();
        assert_eq!(config.address, Ipv4Address::new([192, 168, 0, 10]));
        assert_eq!(config.subnet().network(), Ipv4Address::new([192, 168, 0, 0]));
        assert!(config.subnet().contains(Ipv4Address::new([192, 168, 0, 11])));
    }
}
