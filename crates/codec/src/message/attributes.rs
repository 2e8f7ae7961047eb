use std::{fmt::Debug, net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr}};

use bytes::{Buf, BufMut};
use num_enum::TryFromPrimitive;

use super::Error;

/// STUN Attributes Registry
///
/// [RFC8126]: https://datatracker.ietf.org/doc/html/rfc8126
/// [RFC5389]: https://datatracker.ietf.org/doc/html/rfc5389
///
/// A STUN attribute type is a hex number in the range 0x0000-0xFFFF.
/// STUN attribute types in the range 0x0000-0x7FFF are considered
/// comprehension-required; STUN attribute types in the range
/// 0x8000-0xFFFF are considered comprehension-optional.  A STUN agent
/// handles unknown comprehension-required and comprehension-optional
/// attributes differently.
#[repr(u16)]
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Debug, TryFromPrimitive)]
pub enum AttributeType {
    #[default]
    Unknown = 0x0000,
    MappedAddress = 0x0001,
    UserName = 0x0006,
    MessageIntegrity = 0x0008,
    ErrorCode = 0x0009,
    UnknownAttributes = 0x000A,
    ChannelNumber = 0x000C,
    Lifetime = 0x000D,
    XorPeerAddress = 0x0012,
    Data = 0x0013,
    Realm = 0x0014,
    Nonce = 0x0015,
    XorRelayedAddress = 0x0016,
    EvenPort = 0x0018,
    ReqeestedTransport = 0x0019,
    DontFragment = 0x001A,
    XorMappedAddress = 0x0020,
    ReservationToken = 0x0022,
    Priority = 0x0024,
    UseCandidate = 0x0025,
    Software = 0x8022,
    AlternateServer = 0x8023,
    Fingerprint = 0x8028,
    IceControlled = 0x8029,
    IceControlling = 0x802A,
}

/// dyn stun/turn message attribute.
pub trait Attribute<'a> {
    type Error: Debug;

    /// current attribute inner type.
    type Item;

    /// current attribute type.
    const TYPE: AttributeType;

    /// write the current attribute to the bytesfer.
    #[allow(unused_variables)]
    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, transaction_id: &'a [u8]) {}

    /// convert bytesfer to current attribute.
    fn deserialize(bytes: &'a [u8], transaction_id: &'a [u8]) -> Result<Self::Item, Self::Error>;
}

/// the IP address family carried by MAPPED-ADDRESS and its XOR variants.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum IpFamily {
    V4 = 0x01,
    V6 = 0x02,
}

const MAGIC_COOKIE: u32 = 0x2112A442;

fn ipv4_from_bytes(bytes: &[u8]) -> Result<Ipv4Addr, Error> {
    Ok(Ipv4Addr::from(<[u8; 4]>::try_from(bytes)?))
}

fn ipv6_from_bytes(bytes: &[u8]) -> Result<Ipv6Addr, Error> {
    Ok(Ipv6Addr::from(<[u8; 16]>::try_from(bytes)?))
}

/// XOR a transport address against the magic cookie (and, for IPv6, the
/// transaction id) per RFC 5389 §15.2.
fn xor(addr: SocketAddr, transaction_id: &[u8]) -> SocketAddr {
    let cookie = MAGIC_COOKIE.to_be_bytes();
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;

    let ip = match addr.ip() {
        IpAddr::V4(ip) => {
            let mut octets = ip.octets();
            for i in 0..4 {
                octets[i] ^= cookie[i];
            }
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        IpAddr::V6(ip) => {
            let mut octets = ip.octets();
            for i in 0..4 {
                octets[i] ^= cookie[i];
            }
            for i in 0..12 {
                octets[4 + i] ^= transaction_id[i];
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    };

    SocketAddr::new(ip, port)
}

/// MAPPED-ADDRESS / XOR-MAPPED-ADDRESS wire encoding, shared by every
/// attribute whose value is a transport address.
pub struct XAddress;

impl XAddress {
    pub fn serialize<B: BufMut>(
        addr: &SocketAddr,
        transaction_id: &[u8],
        bytes: &mut B,
        is_xor: bool,
    ) {
        let addr = if is_xor { xor(*addr, transaction_id) } else { *addr };

        bytes.put_u8(0);
        bytes.put_u8(if addr.is_ipv4() { IpFamily::V4 } else { IpFamily::V6 } as u8);
        bytes.put_u16(addr.port());

        match addr.ip() {
            IpAddr::V4(ip) => bytes.put(&ip.octets()[..]),
            IpAddr::V6(ip) => bytes.put(&ip.octets()[..]),
        }
    }

    pub fn deserialize(
        bytes: &[u8],
        transaction_id: &[u8],
        is_xor: bool,
    ) -> Result<SocketAddr, Error> {
        if bytes.len() < 4 {
            return Err(Error::InvalidInput);
        }

        let family = IpFamily::try_from(bytes[1]).map_err(|_| Error::InvalidInput)?;
        let port = u16::from_be_bytes(bytes[2..4].try_into()?);

        let ip = match family {
            IpFamily::V4 => IpAddr::V4(ipv4_from_bytes(&bytes[4..8])?),
            IpFamily::V6 => IpAddr::V6(ipv6_from_bytes(&bytes[4..20])?),
        };

        let addr = SocketAddr::new(ip, port);
        Ok(if is_xor { xor(addr, transaction_id) } else { addr })
    }
}

/// error codes used in STUN/TURN ERROR-CODE attributes.
///
/// [RFC5389]: https://datatracker.ietf.org/doc/html/rfc5389
/// [RFC5766]: https://datatracker.ietf.org/doc/html/rfc5766
/// [RFC8445]: https://datatracker.ietf.org/doc/html/rfc8445
const fn errno(code: u16) -> u16 {
    ((code / 100) << 8) | (code % 100)
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum ErrorType {
    TryAlternate = errno(300),
    BadRequest = errno(400),
    Unauthorized = errno(401),
    Forbidden = errno(403),
    UnknownAttribute = errno(420),
    AllocationMismatch = errno(437),
    StaleNonce = errno(438),
    AddressFamilyNotSupported = errno(440),
    WrongCredentials = errno(441),
    UnsupportedTransportAddress = errno(442),
    PeerAddressFamilyMismatch = errno(443),
    RoleConflict = errno(487),
    AllocationQuotaReached = errno(486),
    ServerError = errno(500),
    InsufficientCapacity = errno(508),
}

impl From<ErrorType> for &'static str {
    fn from(value: ErrorType) -> Self {
        match value {
            ErrorType::TryAlternate => "Try Alternate",
            ErrorType::BadRequest => "Bad Request",
            ErrorType::Unauthorized => "Unauthorized",
            ErrorType::Forbidden => "Forbidden",
            ErrorType::UnknownAttribute => "Unknown Attribute",
            ErrorType::AllocationMismatch => "Allocation Mismatch",
            ErrorType::StaleNonce => "Stale Nonce",
            ErrorType::AddressFamilyNotSupported => "Address Family not Supported",
            ErrorType::WrongCredentials => "Wrong Credentials",
            ErrorType::UnsupportedTransportAddress => "Unsupported Transport Address",
            ErrorType::PeerAddressFamilyMismatch => "Peer Address Family Mismatch",
            ErrorType::RoleConflict => "Role Conflict",
            ErrorType::AllocationQuotaReached => "Allocation Quota Reached",
            ErrorType::ServerError => "Server Error",
            ErrorType::InsufficientCapacity => "Insufficient Capacity",
        }
    }
}

/// [RFC8265]: https://datatracker.ietf.org/doc/html/rfc8265
///
/// The USERNAME attribute is used for message integrity.  It identifies
/// the username and password combination used in the message-integrity
/// check. It MUST contain a UTF-8-encoded sequence of fewer than 509
/// bytes and MUST have been processed using the OpaqueString profile
/// [RFC8265].
#[derive(Debug, Clone, Copy)]
pub struct UserName;

impl<'a> Attribute<'a> for UserName {
    type Error = Error;
    type Item = &'a str;

    const TYPE: AttributeType = AttributeType::UserName;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put(value.as_bytes());
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(std::str::from_utf8(bytes)?)
    }
}

/// The DATA attribute is present in all Send and Data indications.  The
/// value portion of this attribute is the application data that would
/// immediately follow the UDP header if the data had been sent directly
/// between client and peer.
#[derive(Debug, Clone, Copy)]
pub struct Data;

impl<'a> Attribute<'a> for Data {
    type Error = Error;
    type Item = &'a [u8];

    const TYPE: AttributeType = AttributeType::Data;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put(value);
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(bytes)
    }
}

/// [RFC3261]: https://datatracker.ietf.org/doc/html/rfc3261
/// [RFC8265]: https://datatracker.ietf.org/doc/html/rfc8265
///
/// The REALM attribute may be present in requests and responses. Presence
/// of REALM in a request indicates that long-term credentials are being
/// used for authentication.
#[derive(Debug, Clone, Copy)]
pub struct Realm;

impl<'a> Attribute<'a> for Realm {
    type Error = Error;
    type Item = &'a str;

    const TYPE: AttributeType = AttributeType::Realm;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put(value.as_bytes());
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(std::str::from_utf8(bytes)?)
    }
}

/// [RFC7616]: https://datatracker.ietf.org/doc/html/rfc7616
///
/// The NONCE attribute may be present in requests and responses. See
/// Section 5.4 of [RFC7616] for guidance on selection of nonce values.
#[derive(Debug, Clone, Copy)]
pub struct Nonce;

impl<'a> Attribute<'a> for Nonce {
    type Error = Error;
    type Item = &'a str;

    const TYPE: AttributeType = AttributeType::Nonce;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put(value.as_bytes());
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(std::str::from_utf8(bytes)?)
    }
}

/// The SOFTWARE attribute contains a textual description of the software
/// being used by the agent sending the message. It has no impact on
/// protocol operation and serves only diagnostic purposes.
#[derive(Debug, Clone, Copy)]
pub struct Software;

impl<'a> Attribute<'a> for Software {
    type Error = Error;
    type Item = &'a str;

    const TYPE: AttributeType = AttributeType::Software;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put(value.as_bytes());
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(std::str::from_utf8(bytes)?)
    }
}

/// [RFC2104]: https://datatracker.ietf.org/doc/html/rfc2104
/// [RFC5769]: https://datatracker.ietf.org/doc/html/rfc5769
///
/// The MESSAGE-INTEGRITY attribute contains an HMAC-SHA1 [RFC2104] of
/// the STUN message, computed up to and including the attribute
/// preceding MESSAGE-INTEGRITY, with the header length field adjusted
/// to end at MESSAGE-INTEGRITY. Since it uses the SHA-1 hash, the HMAC
/// is 20 bytes.
#[derive(Debug, Clone, Copy)]
pub struct MessageIntegrity;

impl<'a> Attribute<'a> for MessageIntegrity {
    type Error = Error;
    type Item = &'a [u8];

    const TYPE: AttributeType = AttributeType::MessageIntegrity;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put(value);
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(bytes)
    }
}

/// [RFC5389]: https://datatracker.ietf.org/doc/html/rfc5389
///
/// The XOR-PEER-ADDRESS specifies the address and port of the peer as
/// seen from the TURN server. It is encoded in the same way as
/// XOR-MAPPED-ADDRESS.
#[derive(Debug, Clone, Copy)]
pub struct XorPeerAddress;

impl<'a> Attribute<'a> for XorPeerAddress {
    type Error = Error;
    type Item = SocketAddr;

    const TYPE: AttributeType = AttributeType::XorPeerAddress;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, transaction_id: &'a [u8]) {
        XAddress::serialize(&value, transaction_id, bytes, true)
    }

    fn deserialize(bytes: &'a [u8], transaction_id: &'a [u8]) -> Result<Self::Item, Self::Error> {
        XAddress::deserialize(bytes, transaction_id, true)
    }
}

/// [RFC5389]: https://datatracker.ietf.org/doc/html/rfc5389
///
/// The XOR-RELAYED-ADDRESS is present in Allocate responses. It
/// specifies the address and port that the server allocated to the
/// client.
#[derive(Debug, Clone, Copy)]
pub struct XorRelayedAddress;

impl<'a> Attribute<'a> for XorRelayedAddress {
    type Error = Error;
    type Item = SocketAddr;

    const TYPE: AttributeType = AttributeType::XorRelayedAddress;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, transaction_id: &'a [u8]) {
        XAddress::serialize(&value, transaction_id, bytes, true)
    }

    fn deserialize(bytes: &'a [u8], transaction_id: &'a [u8]) -> Result<Self::Item, Self::Error> {
        XAddress::deserialize(bytes, transaction_id, true)
    }
}

/// [RFC3489]: https://datatracker.ietf.org/doc/html/rfc3489
///
/// XOR-MAPPED-ADDRESS is identical to MAPPED-ADDRESS except that the
/// reflexive transport address is obfuscated through the XOR function
/// defined in RFC 5389 §15.2.
#[derive(Debug, Clone, Copy)]
pub struct XorMappedAddress;

impl<'a> Attribute<'a> for XorMappedAddress {
    type Error = Error;
    type Item = SocketAddr;

    const TYPE: AttributeType = AttributeType::XorMappedAddress;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, transaction_id: &'a [u8]) {
        XAddress::serialize(&value, transaction_id, bytes, true)
    }

    fn deserialize(bytes: &'a [u8], transaction_id: &'a [u8]) -> Result<Self::Item, Self::Error> {
        XAddress::deserialize(bytes, transaction_id, true)
    }
}

/// [RFC3489]: https://datatracker.ietf.org/doc/html/rfc3489
///
/// The MAPPED-ADDRESS attribute indicates a reflexive transport address
/// of the client, encoded directly in binary (unlike its XOR variant).
#[derive(Debug, Clone, Copy)]
pub struct MappedAddress;

impl<'a> Attribute<'a> for MappedAddress {
    type Error = Error;
    type Item = SocketAddr;

    const TYPE: AttributeType = AttributeType::MappedAddress;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, transaction_id: &'a [u8]) {
        XAddress::serialize(&value, transaction_id, bytes, false)
    }

    fn deserialize(bytes: &'a [u8], transaction_id: &'a [u8]) -> Result<Self::Item, Self::Error> {
        XAddress::deserialize(bytes, transaction_id, false)
    }
}

/// The ALTERNATE-SERVER attribute is present in error responses with
/// error code 300 (Try Alternate). It carries a transport address of a
/// different server the client should try, encoded like MAPPED-ADDRESS.
#[derive(Debug, Clone, Copy)]
pub struct AlternateServer;

impl<'a> Attribute<'a> for AlternateServer {
    type Error = Error;
    type Item = SocketAddr;

    const TYPE: AttributeType = AttributeType::AlternateServer;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, transaction_id: &'a [u8]) {
        XAddress::serialize(&value, transaction_id, bytes, false)
    }

    fn deserialize(bytes: &'a [u8], transaction_id: &'a [u8]) -> Result<Self::Item, Self::Error> {
        XAddress::deserialize(bytes, transaction_id, false)
    }
}

/// [RFC3261]: https://datatracker.ietf.org/doc/html/rfc3261
/// [RFC7231]: https://datatracker.ietf.org/doc/html/rfc7231
///
/// The ERROR-CODE attribute is used in error response messages. It
/// contains a numeric error code value in the range 300-699 plus a
/// textual reason phrase encoded in UTF-8.
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           Reserved, should be 0         |Class|     Number    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      Reason Phrase (variable)                                ..
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ErrorCode<'a> {
    pub code: u16,
    pub message: &'a str,
}

impl<'a> Attribute<'a> for ErrorCode<'a> {
    type Error = Error;
    type Item = Self;

    const TYPE: AttributeType = AttributeType::ErrorCode;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        value.serialize(bytes);
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Self::try_from(bytes)
    }
}

impl From<ErrorType> for ErrorCode<'_> {
    /// create error from error type.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ice_agent_codec::message::attributes::ErrorType;
    ///
    /// // ErrorCode::from(ErrorType::TryAlternate);
    /// ```
    fn from(value: ErrorType) -> Self {
        Self {
            code: value as u16,
            message: value.into(),
        }
    }
}

impl ErrorCode<'_> {
    /// encode the error type as bytes.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use ice_agent_codec::message::attributes::{ErrorCode, ErrorType};
    ///
    /// let buffer = [
    ///     0x00u8, 0x00, 0x03, 0x00, 0x54, 0x72, 0x79, 0x20, 0x41, 0x6c, 0x74,
    ///     0x65, 0x72, 0x6e, 0x61, 0x74, 0x65,
    /// ];
    ///
    /// let mut buf = BytesMut::with_capacity(128);
    /// ErrorCode::from(ErrorType::TryAlternate).serialize(&mut buf);
    /// assert_eq!(&buf[..], &buffer);
    /// ```
    pub fn serialize<B: BufMut>(self, bytes: &mut B) {
        bytes.put_u16(0x0000);
        bytes.put_u16(self.code);
        bytes.put(self.message.as_bytes());
    }
}

impl<'a> TryFrom<&'a [u8]> for ErrorCode<'a> {
    type Error = Error;

    /// # Test
    ///
    /// ```
    /// use std::convert::TryFrom;
    /// use ice_agent_codec::message::attributes::{ErrorCode, ErrorType};
    ///
    /// let buffer = [
    ///     0x00u8, 0x00, 0x03, 0x00, 0x54, 0x72, 0x79, 0x20, 0x41, 0x6c, 0x74,
    ///     0x65, 0x72, 0x6e, 0x61, 0x74, 0x65,
    /// ];
    ///
    /// let error = ErrorCode::try_from(&buffer[..]).unwrap();
    /// assert_eq!(error.code, ErrorType::TryAlternate as u16);
    /// assert_eq!(error.message, "Try Alternate");
    /// ```
    fn try_from(packet: &'a [u8]) -> Result<Self, Self::Error> {
        if packet.len() < 4 {
            return Err(Error::InvalidInput);
        }

        if u16::from_be_bytes(packet[..2].try_into()?) != 0x0000 {
            return Err(Error::InvalidInput);
        }

        Ok(Self {
            code: u16::from_be_bytes(packet[2..4].try_into()?),
            message: std::str::from_utf8(&packet[4..])?,
        })
    }
}

impl Eq for ErrorCode<'_> {}
impl PartialEq for ErrorCode<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

/// The UNKNOWN-ATTRIBUTES attribute is present in error responses with
/// error code 420 (Unknown Attribute). It lists the comprehension-
/// required attribute types that were not understood.
#[derive(Debug, Clone, Copy)]
pub struct UnknownAttributes;

impl<'a> Attribute<'a> for UnknownAttributes {
    type Error = Error;
    type Item = Vec<u16>;

    const TYPE: AttributeType = AttributeType::UnknownAttributes;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        for kind in value {
            bytes.put_u16(kind);
        }
    }

    fn deserialize(mut bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        let mut kinds = Vec::with_capacity(bytes.len() / 2);
        while bytes.len() >= 2 {
            kinds.push(bytes.get_u16());
        }

        Ok(kinds)
    }
}

/// The LIFETIME attribute represents the duration for which the server
/// will maintain an allocation in the absence of a refresh, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct Lifetime;

impl<'a> Attribute<'a> for Lifetime {
    type Error = Error;
    type Item = u32;

    const TYPE: AttributeType = AttributeType::Lifetime;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put_u32(value)
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(u32::from_be_bytes(bytes.try_into()?))
    }
}

/// The client uses REQUESTED-TRANSPORT to request a specific transport
/// protocol for the allocated transport address. This implementation
/// only allows codepoint 17 (UDP); the RFFU octets are always zero.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum ReqeestedTransport {
    Udp = 0x11000000,
}

impl<'a> Attribute<'a> for ReqeestedTransport {
    type Error = Error;
    type Item = Self;

    const TYPE: AttributeType = AttributeType::ReqeestedTransport;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put_u32(value as u32)
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Self::try_from(u32::from_be_bytes(bytes.try_into()?)).map_err(|_| Error::InvalidInput)
    }
}

/// [RFC1952]: https://datatracker.ietf.org/doc/html/rfc1952
///
/// The FINGERPRINT attribute MAY be present in all STUN messages. It is
/// computed as CRC-32 of the message up to (but excluding) FINGERPRINT
/// itself, XOR'ed with `0x5354554e`. It MUST be the last attribute.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint;

impl<'a> Attribute<'a> for Fingerprint {
    type Error = Error;
    type Item = u32;

    const TYPE: AttributeType = AttributeType::Fingerprint;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put_u32(value)
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(u32::from_be_bytes(bytes.try_into()?))
    }
}

/// The CHANNEL-NUMBER attribute contains the number of the channel. The
/// value is a 16-bit unsigned integer followed by a two-octet RFFU
/// field, which MUST be zero.
#[derive(Debug, Clone, Copy)]
pub struct ChannelNumber;

impl<'a> Attribute<'a> for ChannelNumber {
    type Error = Error;
    type Item = u16;

    const TYPE: AttributeType = AttributeType::ChannelNumber;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put_u16(value);
        bytes.put_u16(0);
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        if bytes.len() < 2 {
            return Err(Error::InvalidInput);
        }

        Ok(u16::from_be_bytes(bytes[..2].try_into()?))
    }
}

/// The ICE-CONTROLLING attribute is present in a Binding request. The
/// attribute indicates that the client believes it is currently in the
/// controlling role. The content is a 64-bit tiebreaker value, used the
/// same way for all Binding requests within an ICE session unless a 487
/// response forces a change.
#[derive(Debug, Clone, Copy)]
pub struct IceControlling;

impl<'a> Attribute<'a> for IceControlling {
    type Error = Error;
    type Item = u64;

    const TYPE: AttributeType = AttributeType::IceControlling;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put_u64(value)
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(u64::from_be_bytes(bytes.try_into()?))
    }
}

/// The USE-CANDIDATE attribute indicates that the candidate pair
/// resulting from this check will be used for transmission of data. It
/// has no content; it serves only as a flag.
#[derive(Debug, Clone, Copy)]
pub struct UseCandidate;

impl<'a> Attribute<'a> for UseCandidate {
    type Error = Error;
    type Item = ();

    const TYPE: AttributeType = AttributeType::UseCandidate;

    fn serialize<B: BufMut>(_: Self::Item, _: &mut B, _: &'a [u8]) {}

    fn deserialize(_: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(())
    }
}

/// The ICE-CONTROLLED attribute is present in a Binding request. The
/// attribute indicates that the client believes it is currently in the
/// controlled role. Same tiebreaker semantics as ICE-CONTROLLING.
#[derive(Debug, Clone, Copy)]
pub struct IceControlled;

impl<'a> Attribute<'a> for IceControlled {
    type Error = Error;
    type Item = u64;

    const TYPE: AttributeType = AttributeType::IceControlled;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put_u64(value)
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(u64::from_be_bytes(bytes.try_into()?))
    }
}

/// The PRIORITY attribute indicates the priority that would be
/// associated with a peer-reflexive candidate, should one be discovered
/// by this check.
#[derive(Debug, Clone, Copy)]
pub struct Priority;

impl<'a> Attribute<'a> for Priority {
    type Error = Error;
    type Item = u32;

    const TYPE: AttributeType = AttributeType::Priority;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put_u32(value)
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(u32::from_be_bytes(bytes.try_into()?))
    }
}

/// The RESERVATION-TOKEN attribute contains a token that uniquely
/// identifies a relayed transport address being held in reserve by the
/// server, for use by a subsequent Allocate request requesting the same
/// relayed address.
#[derive(Debug, Clone, Copy)]
pub struct ReservationToken;

impl<'a> Attribute<'a> for ReservationToken {
    type Error = Error;
    type Item = u64;

    const TYPE: AttributeType = AttributeType::ReservationToken;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put_u64(value)
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(u64::from_be_bytes(bytes.try_into()?))
    }
}

/// This attribute allows the client to request that the port in the
/// relayed transport address be even, and (optionally) that the server
/// reserve the next-higher port number.
#[derive(Debug, Clone, Copy)]
pub struct EvenPort;

impl<'a> Attribute<'a> for EvenPort {
    type Error = Error;
    type Item = bool;

    const TYPE: AttributeType = AttributeType::EvenPort;

    fn serialize<B: BufMut>(value: Self::Item, bytes: &mut B, _: &'a [u8]) {
        bytes.put_u8(if value { 0b1000_0000 } else { 0b0000_0000 })
    }

    fn deserialize(bytes: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        if bytes.is_empty() {
            return Err(Error::InvalidInput);
        }

        Ok(bytes[0] & 0b1000_0000 != 0)
    }
}

/// The client uses DONT-FRAGMENT to request that the server set the DF
/// bit in the IP header when relaying application data, and to probe
/// server support for that behavior in an Allocate request. It has no
/// value part.
#[derive(Debug, Clone, Copy)]
pub struct DontFragment;

impl<'a> Attribute<'a> for DontFragment {
    type Error = Error;
    type Item = ();

    const TYPE: AttributeType = AttributeType::DontFragment;

    fn deserialize(_: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(())
    }
}
