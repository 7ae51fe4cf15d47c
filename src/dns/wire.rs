//! DNS wire format primitives (RFC 1035).
//!
//! Every multi-byte field is big-endian. Fields are read through bounds-checked
//! helpers over a byte slice; nothing here reinterprets memory as a struct.

use crate::error::DnsError;
use std::fmt;

/// Size of the fixed message header
pub const HEADER_SIZE: usize = 12;

// flags1: QR | Opcode | AA | TC | RD
pub const FLAG1_RESPONSE: u8 = 0x80;
pub const FLAG1_OPCODE_STATUS: u8 = 0x10;
pub const FLAG1_OPCODE_INVERSE: u8 = 0x08;
pub const FLAG1_AUTHORITATIVE: u8 = 0x04;
pub const FLAG1_TRUNCATED: u8 = 0x02;
pub const FLAG1_RD: u8 = 0x01;

// flags2: RA | Z | RCODE
pub const FLAG2_RA: u8 = 0x80;
pub const FLAG2_ERR_MASK: u8 = 0x0F;

/// Class IN (Internet)
pub const CLASS_IN: u16 = 1;

const TYPE_A: u16 = 1;
const TYPE_CNAME: u16 = 5;
const TYPE_AAAA: u16 = 28;
const TYPE_SRV: u16 = 33;

/// Read a big-endian u16 at `pos`
pub fn read_u16(buf: &[u8], pos: usize) -> Option<u16> {
    let bytes = buf.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Read a big-endian u32 at `pos`
pub fn read_u32(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// DNS response codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other(u8),
}

impl ResponseCode {
    /// Create from the flags2 octet (low nibble)
    pub fn from_flags2(flags2: u8) -> Self {
        match flags2 & FLAG2_ERR_MASK {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormErr,
            2 => ResponseCode::ServFail,
            3 => ResponseCode::NxDomain,
            4 => ResponseCode::NotImp,
            5 => ResponseCode::Refused,
            other => ResponseCode::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            ResponseCode::NoError => 0,
            ResponseCode::FormErr => 1,
            ResponseCode::ServFail => 2,
            ResponseCode::NxDomain => 3,
            ResponseCode::NotImp => 4,
            ResponseCode::Refused => 5,
            ResponseCode::Other(v) => v & FLAG2_ERR_MASK,
        }
    }
}

/// Resource record types the resolver names explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordType {
    A,
    CNAME,
    AAAA,
    SRV,
    Other(u16),
}

impl RecordType {
    /// Create from raw type value
    pub fn from_u16(value: u16) -> Self {
        match value {
            TYPE_A => RecordType::A,
            TYPE_CNAME => RecordType::CNAME,
            TYPE_AAAA => RecordType::AAAA,
            TYPE_SRV => RecordType::SRV,
            other => RecordType::Other(other),
        }
    }

    /// Convert to raw type value
    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => TYPE_A,
            RecordType::CNAME => TYPE_CNAME,
            RecordType::AAAA => TYPE_AAAA,
            RecordType::SRV => TYPE_SRV,
            RecordType::Other(v) => v,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::SRV => write!(f, "SRV"),
            RecordType::Other(v) => write!(f, "TYPE{}", v),
        }
    }
}

/// The fixed 12-byte message header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub id: u16,
    pub flags1: u8,
    pub flags2: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    /// Header for an outbound query: recursion desired, one question
    pub fn query(id: u16) -> Self {
        Header {
            id,
            flags1: FLAG1_RD,
            qdcount: 1,
            ..Header::default()
        }
    }

    /// Read the header from the start of a datagram
    pub fn read(buf: &[u8]) -> Result<Header, DnsError> {
        if buf.len() < HEADER_SIZE {
            return Err(DnsError::MalformedResponse("packet too short for DNS header"));
        }

        Ok(Header {
            id: u16::from_be_bytes([buf[0], buf[1]]),
            flags1: buf[2],
            flags2: buf[3],
            qdcount: u16::from_be_bytes([buf[4], buf[5]]),
            ancount: u16::from_be_bytes([buf[6], buf[7]]),
            nscount: u16::from_be_bytes([buf[8], buf[9]]),
            arcount: u16::from_be_bytes([buf[10], buf[11]]),
        })
    }

    /// Append the header in wire order
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.push(self.flags1);
        buf.push(self.flags2);
        buf.extend_from_slice(&self.qdcount.to_be_bytes());
        buf.extend_from_slice(&self.ancount.to_be_bytes());
        buf.extend_from_slice(&self.nscount.to_be_bytes());
        buf.extend_from_slice(&self.arcount.to_be_bytes());
    }

    pub fn is_response(&self) -> bool {
        self.flags1 & FLAG1_RESPONSE != 0
    }

    pub fn is_truncated(&self) -> bool {
        self.flags1 & FLAG1_TRUNCATED != 0
    }

    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::from_flags2(self.flags2)
    }
}
