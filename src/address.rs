use std::net::{Ipv4Addr, SocketAddrV4};

use socket2::{Domain, SockAddr};

use crate::error::{Error, Result};

/// The value returned by [`inet_addr`] for text that is not a numeric address.
pub const INADDR_NONE: u32 = 0xffff_ffff;

/// An IPv4 socket address laid out the way the socket layer consumes it.
///
/// The port and host address are kept in network byte order. Every byte that
/// is not explicitly set, including the reserved padding region, is zero:
/// some peers refuse connections when stale bytes are left in the padding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressStructure {
    family: i32,
    port: u16,
    addr: u32,
    zero: [u8; 8],
}

impl AddressStructure {
    /// Byte length of the structure as handed to the socket layer.
    pub const LEN: u32 = 16;

    const fn zeroed() -> AddressStructure {
        AddressStructure { family: 0, port: 0, addr: 0, zero: [0u8; 8] }
    }

    /// Builds a zero-filled address structure for `ip:port`.
    ///
    /// `ip` is converted with [`inet_addr`], so malformed text silently
    /// yields the all-ones address. Validating the text beforehand is up to
    /// the caller.
    pub fn build(family: Domain, ip: &str, port: u16) -> AddressStructure {
        let mut sa = AddressStructure::zeroed();
        sa.zero_padding();
        sa.family = i32::from(family);
        sa.port = port.to_be();
        sa.addr = inet_addr(ip);
        sa
    }

    /// Clears the reserved padding region.
    pub fn zero_padding(&mut self) {
        self.zero = [0u8; 8];
    }

    /// The address family number.
    pub fn family(&self) -> i32 {
        self.family
    }

    /// The port, in network byte order.
    pub fn port_be(&self) -> u16 {
        self.port
    }

    /// The host address, in network byte order.
    pub fn addr_be(&self) -> u32 {
        self.addr
    }

    /// The port in host byte order.
    pub fn port(&self) -> u16 {
        u16::from_be(self.port)
    }

    /// The host address.
    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from_be(self.addr))
    }

    /// The structure as it sits in memory: family, port, address, padding.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..2].copy_from_slice(&(self.family as u16).to_ne_bytes());
        bytes[2..4].copy_from_slice(&self.port.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.addr.to_ne_bytes());
        bytes[8..16].copy_from_slice(&self.zero);
        bytes
    }

    /// Converts into the socket layer's address type.
    ///
    /// Only IPv4 structures can be expressed; any other family is reported
    /// as [`Error::UnsupportedFamily`].
    pub fn to_sock_addr(&self) -> Result<SockAddr> {
        if self.family != i32::from(Domain::IPV4) {
            return Err(Error::UnsupportedFamily(self.family));
        }
        Ok(SockAddr::from(SocketAddrV4::from(*self)))
    }
}

impl From<SocketAddrV4> for AddressStructure {
    fn from(addr: SocketAddrV4) -> AddressStructure {
        let mut sa = AddressStructure::zeroed();
        sa.family = i32::from(Domain::IPV4);
        sa.port = addr.port().to_be();
        sa.addr = u32::from(*addr.ip()).to_be();
        sa
    }
}

impl From<AddressStructure> for SocketAddrV4 {
    fn from(sa: AddressStructure) -> SocketAddrV4 {
        SocketAddrV4::new(sa.ip(), sa.port())
    }
}

impl TryFrom<&SockAddr> for AddressStructure {
    type Error = Error;

    fn try_from(addr: &SockAddr) -> Result<AddressStructure> {
        addr.as_socket_ipv4()
            .map(AddressStructure::from)
            .ok_or(Error::UnsupportedFamily(addr.family() as i32))
    }
}

/// Converts numeric address text to a network byte order IPv4 address.
///
/// Accepts the classic forms `a.b.c.d`, `a.b.c` (16-bit tail), `a.b`
/// (24-bit tail) and `a`, where each part is decimal, octal (leading `0`) or
/// hexadecimal (leading `0x`). Anything else yields [`INADDR_NONE`].
pub fn inet_addr(text: &str) -> u32 {
    match parse_inet(text) {
        Some(host) => host.to_be(),
        None => INADDR_NONE,
    }
}

fn parse_inet(text: &str) -> Option<u32> {
    let mut parts = [0u32; 4];
    let mut n = 0;
    for part in text.split('.') {
        if n == 4 {
            return None;
        }
        parts[n] = parse_part(part)?;
        n += 1;
    }
    match n {
        1 => Some(parts[0]),
        2 if parts[0] <= 0xff && parts[1] <= 0xff_ffff => Some(parts[0] << 24 | parts[1]),
        3 if parts[0] <= 0xff && parts[1] <= 0xff && parts[2] <= 0xffff => {
            Some(parts[0] << 24 | parts[1] << 16 | parts[2])
        }
        4 if parts.iter().all(|p| *p <= 0xff) => {
            Some(parts[0] << 24 | parts[1] << 16 | parts[2] << 8 | parts[3])
        }
        _ => None,
    }
}

fn parse_part(part: &str) -> Option<u32> {
    let (digits, radix) = if let Some(hex) = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
        (hex, 16)
    } else if part.len() > 1 && part.starts_with('0') {
        (&part[1..], 8)
    } else {
        (part, 10)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}
