//! Hostname label encoding and decoding, including name compression pointers.

use crate::error::DnsError;
use std::fmt;
use std::str::FromStr;

/// Maximum encoded length of a name, terminator included. Names whose
/// encoding reaches this length are rejected.
pub const MAX_NAME_LEN: usize = 32;

// Top two bits of a length octet set = 2-byte compression pointer
const POINTER_MASK: u8 = 0xC0;

// RFC 1035: Maximum hostname length when following pointers
const MAX_DECODED_LEN: usize = 253;

/// Validate `name` and return it without a trailing dot, plus its encoded length
fn checked_encoded_len(name: &str) -> Result<(&str, usize), DnsError> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        // Root: a single zero octet
        return Ok((name, 1));
    }

    // One length octet per label replaces each dot, plus the leading octet and the terminator
    let encoded_len = name.len() + 2;
    if encoded_len >= MAX_NAME_LEN {
        return Err(DnsError::EncodingOverflow);
    }
    if name.split('.').any(str::is_empty) {
        return Err(DnsError::InvalidName);
    }

    Ok((name, encoded_len))
}

/// Encode a dotted name as length-prefixed labels, appending to `buf`.
///
/// Returns the number of bytes written. Nothing is written on failure.
pub fn encode_name(name: &str, buf: &mut Vec<u8>) -> Result<usize, DnsError> {
    let (name, encoded_len) = checked_encoded_len(name)?;

    if !name.is_empty() {
        for label in name.split('.') {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
    }
    buf.push(0);

    Ok(encoded_len)
}

/// Encode a dotted name into a fresh buffer
pub fn encode(name: &str) -> Result<Vec<u8>, DnsError> {
    let mut buf = Vec::with_capacity(MAX_NAME_LEN);
    encode_name(name, &mut buf)?;
    Ok(buf)
}

/// Number of bytes a name occupies at `offset`, without following pointers.
///
/// A compression pointer ends the walk and counts as 2 bytes, a zero octet
/// counts as 1. Returns `None` if the walk leaves the buffer or reaches
/// [`MAX_NAME_LEN`].
pub fn span_len(buf: &[u8], offset: usize) -> Option<usize> {
    let mut len = 0usize;

    loop {
        let octet = *buf.get(offset.checked_add(len)?)?;

        if octet == 0 {
            len += 1;
            break;
        }

        if octet & POINTER_MASK == POINTER_MASK {
            // Second pointer octet must be present, its value is irrelevant here
            buf.get(offset + len + 1)?;
            len += 2;
            break;
        }

        len += octet as usize + 1;
        if len >= MAX_NAME_LEN {
            return None;
        }
    }

    if len >= MAX_NAME_LEN {
        None
    } else {
        Some(len)
    }
}

/// Decode the name at `start` into dotted form, following compression pointers.
///
/// Returns the name (no trailing dot, empty for the root) and the position just
/// past the name at its original location.
pub fn read_name(buf: &[u8], start: usize) -> Result<(String, usize), DnsError> {
    let mut labels: Vec<&str> = Vec::new();
    let mut pos = start;
    let mut end_pos = None;
    let mut total_len = 0usize;

    loop {
        let octet = *buf
            .get(pos)
            .ok_or(DnsError::MalformedResponse("name extends beyond packet"))?;

        if octet == 0 {
            if end_pos.is_none() {
                end_pos = Some(pos + 1);
            }
            break;
        }

        if octet & POINTER_MASK == POINTER_MASK {
            let low = *buf
                .get(pos + 1)
                .ok_or(DnsError::MalformedResponse("compression pointer extends beyond packet"))?;
            if end_pos.is_none() {
                end_pos = Some(pos + 2);
            }

            let target = (((octet & !POINTER_MASK) as usize) << 8) | low as usize;
            // Only backward pointers, so the walk always terminates
            if target >= pos {
                return Err(DnsError::MalformedResponse("forward compression pointer"));
            }
            pos = target;
            continue;
        }

        if octet & POINTER_MASK != 0 {
            return Err(DnsError::MalformedResponse("reserved label type"));
        }

        let len = octet as usize;
        let label = buf
            .get(pos + 1..pos + 1 + len)
            .ok_or(DnsError::MalformedResponse("label extends beyond packet"))?;

        total_len += len + 1;
        if total_len > MAX_DECODED_LEN {
            return Err(DnsError::MalformedResponse("name exceeds maximum length (253)"));
        }

        let label = std::str::from_utf8(label)
            .map_err(|_| DnsError::MalformedResponse("invalid UTF-8 in label"))?;
        labels.push(label);
        pos += 1 + len;
    }

    let end = end_pos.unwrap_or(pos + 1);
    Ok((labels.join("."), end))
}

/// An owned hostname whose encoding is known to fit [`MAX_NAME_LEN`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hostname {
    name: heapless::String<MAX_NAME_LEN>,
    encoded_len: usize,
}

impl Hostname {
    pub fn new(name: &str) -> Result<Self, DnsError> {
        let (name, encoded_len) = checked_encoded_len(name)?;
        let mut owned = heapless::String::new();
        owned
            .push_str(name)
            .map_err(|_| DnsError::EncodingOverflow)?;

        Ok(Hostname {
            name: owned,
            encoded_len,
        })
    }

    pub fn as_str(&self) -> &str {
        self.name.as_str()
    }

    /// Length of the wire encoding, terminator included
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    /// Append the wire encoding to `buf`
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        if !self.name.is_empty() {
            for label in self.name.split('.') {
                buf.push(label.len() as u8);
                buf.extend_from_slice(label.as_bytes());
            }
        }
        buf.push(0);
    }

    /// Case-insensitive comparison with a dotted name
    pub fn matches(&self, other: &str) -> bool {
        let other = other.strip_suffix('.').unwrap_or(other);
        self.name.eq_ignore_ascii_case(other)
    }
}

impl FromStr for Hostname {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hostname::new(s)
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
