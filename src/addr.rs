//! IPv4 and IPv6 addresses as one closed type.
//!
//! [`Address`] is a tagged union over both families. Equality and hashing
//! never cross families: `0.0.0.0` and `::` are different addresses, and an
//! IPv4-mapped IPv6 address is not equal to its IPv4 counterpart. The socket
//! layer is the only place that unmaps, see [`Address::to_canonical`].

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};
use std::str::FromStr;

use arrayvec::ArrayVec;

use crate::error::ParseError;

/// An IPv4 or IPv6 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    /// IPv4, host order.
    V4(u32),
    /// IPv6 as two 64 bit halves, host order.
    V6 { high: u64, low: u64 },
}

impl Address {
    pub const UNSPECIFIED_V4: Address = Address::V4(0);
    pub const UNSPECIFIED_V6: Address = Address::V6 { high: 0, low: 0 };
    pub const LOCALHOST_V4: Address = Address::V4(0x7f00_0001);
    pub const LOCALHOST_V6: Address = Address::V6 { high: 0, low: 1 };

    /// Parse either family. The presence of a `:` selects IPv6.
    pub fn parse(s: &str) -> Result<Address, ParseError> {
        if s.contains(':') {
            parse_v6(s)
        } else {
            parse_v4(s)
        }
    }

    pub fn from_octets(octets: [u8; 4]) -> Address {
        Address::V4(u32::from_be_bytes(octets))
    }

    pub fn from_segments(segments: [u16; 8]) -> Address {
        let mut value: u128 = 0;
        for s in segments {
            value = (value << 16) | s as u128;
        }
        Address::from_u128(value)
    }

    fn from_u128(value: u128) -> Address {
        Address::V6 {
            high: (value >> 64) as u64,
            low: value as u64,
        }
    }

    /// The four octets of an IPv4 address.
    pub fn octets(&self) -> Option<[u8; 4]> {
        match self {
            Address::V4(v) => Some(v.to_be_bytes()),
            Address::V6 { .. } => None,
        }
    }

    /// The eight groups of an IPv6 address.
    pub fn segments(&self) -> Option<[u16; 8]> {
        match self {
            Address::V4(_) => None,
            Address::V6 { high, low } => {
                let mut out = [0u16; 8];
                for (i, s) in out.iter_mut().enumerate() {
                    let half = if i < 4 { *high } else { *low };
                    *s = (half >> (48 - 16 * (i % 4))) as u16;
                }
                Some(out)
            }
        }
    }

    pub(crate) fn as_u128(&self) -> u128 {
        match self {
            Address::V4(v) => *v as u128,
            Address::V6 { high, low } => ((*high as u128) << 64) | *low as u128,
        }
    }

    pub fn is_v4(&self) -> bool {
        matches!(self, Address::V4(_))
    }

    pub fn is_v6(&self) -> bool {
        matches!(self, Address::V6 { .. })
    }

    pub fn is_unspecified(&self) -> bool {
        match self {
            Address::V4(v) => *v == 0,
            Address::V6 { high, low } => *high == 0 && *low == 0,
        }
    }

    pub fn is_loopback(&self) -> bool {
        match self {
            Address::V4(v) => (v >> 24) == 127,
            Address::V6 { .. } => *self == Address::LOCALHOST_V6,
        }
    }

    /// Turn an IPv4-mapped IPv6 address (`::ffff:a.b.c.d`) into IPv4.
    ///
    /// A dual-stack listener reports IPv4 peers in mapped form. Every other
    /// address is returned unchanged.
    pub fn to_canonical(self) -> Address {
        match self {
            Address::V6 { high: 0, low } if (low >> 32) == 0xffff => Address::V4(low as u32),
            other => other,
        }
    }
}

/// Parse dotted-decimal IPv4.
///
/// Exactly four groups of one to three digits, each at most 255. Anything
/// else is [`ParseError::InvalidFormat`].
pub fn parse_v4(s: &str) -> Result<Address, ParseError> {
    let mut value: u32 = 0;
    let mut groups = 0;

    for group in s.split('.') {
        groups += 1;
        if groups > 4 {
            return Err(ParseError::InvalidFormat);
        }
        if group.is_empty() || group.len() > 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidFormat);
        }
        let octet = group
            .bytes()
            .fold(0u32, |acc, b| acc * 10 + (b - b'0') as u32);
        if octet > 255 {
            return Err(ParseError::InvalidFormat);
        }
        value = (value << 8) | octet;
    }

    if groups != 4 {
        return Err(ParseError::InvalidFormat);
    }

    Ok(Address::V4(value))
}

/// Parse colon-hex IPv6 with at most one `::`.
///
/// Too many groups, or fewer than eight without `::`, is
/// [`ParseError::WrongGroupCount`]. A second `::`, an empty group or a
/// non-hex group is [`ParseError::InvalidFormat`].
pub fn parse_v6(s: &str) -> Result<Address, ParseError> {
    if s.is_empty() {
        return Err(ParseError::InvalidFormat);
    }

    let (head, tail) = match s.find("::") {
        Some(i) => {
            let tail = &s[i + 2..];
            if tail.contains("::") {
                return Err(ParseError::InvalidFormat);
            }
            (&s[..i], Some(tail))
        }
        None => (s, None),
    };

    let head = parse_groups(head)?;
    let mut segments = [0u16; 8];

    match tail {
        None => {
            if head.len() != 8 {
                return Err(ParseError::WrongGroupCount);
            }
            segments.copy_from_slice(&head);
        }
        Some(tail) => {
            let tail = parse_groups(tail)?;
            // :: stands for at least one zero group
            if head.len() + tail.len() > 7 {
                return Err(ParseError::WrongGroupCount);
            }
            segments[..head.len()].copy_from_slice(&head);
            segments[8 - tail.len()..].copy_from_slice(&tail);
        }
    }

    Ok(Address::from_segments(segments))
}

fn parse_groups(s: &str) -> Result<ArrayVec<u16, 8>, ParseError> {
    let mut out = ArrayVec::new();
    if s.is_empty() {
        return Ok(out);
    }
    for group in s.split(':') {
        if group.is_empty() || group.len() > 4 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidFormat);
        }
        let value = u16::from_str_radix(group, 16).map_err(|_| ParseError::InvalidFormat)?;
        out.try_push(value)
            .map_err(|_| ParseError::WrongGroupCount)?;
    }
    Ok(out)
}

/// Longest run of at least two zero groups, leftmost on ties.
fn longest_zero_run(segments: &[u16; 8]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut i = 0;
    while i < segments.len() {
        if segments[i] != 0 {
            i += 1;
            continue;
        }
        let start = i;
        while i < segments.len() && segments[i] == 0 {
            i += 1;
        }
        let len = i - start;
        if len >= 2 && best.map(|(_, l)| len > l).unwrap_or(true) {
            best = Some((start, len));
        }
    }
    best
}

fn write_groups(f: &mut fmt::Formatter<'_>, groups: &[u16]) -> fmt::Result {
    for (i, g) in groups.iter().enumerate() {
        if i > 0 {
            f.write_str(":")?;
        }
        write!(f, "{:x}", g)?;
    }
    Ok(())
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::V4(v) => {
                let [a, b, c, d] = v.to_be_bytes();
                write!(f, "{}.{}.{}.{}", a, b, c, d)
            }
            Address::V6 { .. } => {
                let segments = self.segments().unwrap_or_default();
                match longest_zero_run(&segments) {
                    Some((start, len)) => {
                        write_groups(f, &segments[..start])?;
                        f.write_str("::")?;
                        write_groups(f, &segments[start + len..])
                    }
                    None => write_groups(f, &segments),
                }
            }
        }
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl From<Ipv4Addr> for Address {
    fn from(v: Ipv4Addr) -> Self {
        Address::V4(u32::from(v))
    }
}

impl From<Ipv6Addr> for Address {
    fn from(v: Ipv6Addr) -> Self {
        Address::from_u128(u128::from(v))
    }
}

impl From<IpAddr> for Address {
    fn from(v: IpAddr) -> Self {
        match v {
            IpAddr::V4(v) => v.into(),
            IpAddr::V6(v) => v.into(),
        }
    }
}

impl From<Address> for IpAddr {
    fn from(a: Address) -> Self {
        match a {
            Address::V4(v) => IpAddr::V4(Ipv4Addr::from(v)),
            Address::V6 { .. } => IpAddr::V6(Ipv6Addr::from(a.as_u128())),
        }
    }
}

/// An address and a port.
///
/// Port 0 means "any" and is only meaningful when binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    address: Address,
    port: u16,
}

impl Endpoint {
    pub const fn new(address: Address, port: u16) -> Endpoint {
        Endpoint { address, port }
    }

    #[inline(always)]
    pub fn address(&self) -> Address {
        self.address
    }

    #[inline(always)]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Parse `1.2.3.4:80` or `[2001:db8::1]:443`.
    pub fn parse(s: &str) -> Result<Endpoint, ParseError> {
        let (address, port) = if let Some(rest) = s.strip_prefix('[') {
            let (addr, port) = rest.split_once("]:").ok_or(ParseError::InvalidFormat)?;
            (parse_v6(addr)?, port)
        } else {
            let (addr, port) = s.rsplit_once(':').ok_or(ParseError::InvalidFormat)?;
            (parse_v4(addr)?, port)
        };

        Ok(Endpoint::new(address, parse_port(port)?))
    }

    /// Same endpoint with an IPv4-mapped address unmapped.
    pub fn to_canonical(self) -> Endpoint {
        Endpoint::new(self.address.to_canonical(), self.port)
    }
}

fn parse_port(s: &str) -> Result<u16, ParseError> {
    if s.is_empty() || s.len() > 5 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidFormat);
    }
    let value: u32 = s.bytes().fold(0, |acc, b| acc * 10 + (b - b'0') as u32);
    u16::try_from(value).map_err(|_| ParseError::OutOfRange)
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Address::V4(_) => write!(f, "{}:{}", self.address, self.port),
            Address::V6 { .. } => write!(f, "[{}]:{}", self.address, self.port),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(v: SocketAddr) -> Self {
        Endpoint::new(v.ip().into(), v.port())
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(e: Endpoint) -> Self {
        match IpAddr::from(e.address) {
            IpAddr::V4(ip) => SocketAddr::new(IpAddr::V4(ip), e.port),
            IpAddr::V6(ip) => SocketAddr::V6(SocketAddrV6::new(ip, e.port, 0, 0)),
        }
    }
}

/// An address range `<address>/<prefix>`.
///
/// The stored network has its host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    network: Address,
    prefix: u8,
}

impl Cidr {
    pub fn new(address: Address, prefix: u8) -> Result<Cidr, ParseError> {
        let bits = match address {
            Address::V4(_) => 32,
            Address::V6 { .. } => 128,
        };
        if prefix > bits {
            return Err(ParseError::OutOfRange);
        }

        let network = match address {
            Address::V4(v) => Address::V4(v & v4_mask(prefix)),
            Address::V6 { .. } => Address::from_u128(address.as_u128() & v6_mask(prefix)),
        };

        Ok(Cidr { network, prefix })
    }

    pub fn parse(s: &str) -> Result<Cidr, ParseError> {
        let (addr, prefix) = s.split_once('/').ok_or(ParseError::InvalidFormat)?;
        let address = Address::parse(addr)?;
        if prefix.is_empty() || prefix.len() > 3 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidFormat);
        }
        let prefix: u16 = prefix.bytes().fold(0, |acc, b| acc * 10 + (b - b'0') as u16);
        let prefix = u8::try_from(prefix).map_err(|_| ParseError::OutOfRange)?;
        Cidr::new(address, prefix)
    }

    #[inline(always)]
    pub fn network(&self) -> Address {
        self.network
    }

    #[inline(always)]
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `address` lies in this range. Never true across families.
    pub fn contains(&self, address: &Address) -> bool {
        match (self.network, address) {
            (Address::V4(net), Address::V4(a)) => a & v4_mask(self.prefix) == net,
            (Address::V6 { .. }, Address::V6 { .. }) => {
                address.as_u128() & v6_mask(self.prefix) == self.network.as_u128()
            }
            _ => false,
        }
    }
}

fn v4_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}

fn v6_mask(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix as u32)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cidr::parse(s)
    }
}
