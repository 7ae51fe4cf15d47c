//! Response parsing: header validation, question skip and answer-record walk.

use crate::dns::name::{read_name, span_len};
use crate::dns::wire::{read_u16, read_u32, Header, RecordType, CLASS_IN, HEADER_SIZE};
use crate::error::DnsError;
use std::net::Ipv4Addr;

// TYPE(2) + CLASS(2) + TTL(4) + RDLENGTH(2)
const RR_FIXED_LEN: usize = 10;
// QTYPE(2) + QCLASS(2)
const QUESTION_TAIL_LEN: usize = 4;

/// A received datagram whose header and question section have been validated
#[derive(Debug)]
pub struct Response<'a> {
    buf: &'a [u8],
    header: Header,
    answers_start: usize,
}

impl<'a> Response<'a> {
    /// Validate the header and skip the echoed question section
    pub fn parse(buf: &'a [u8]) -> Result<Response<'a>, DnsError> {
        let header = Header::read(buf)?;

        if !header.is_response() {
            return Err(DnsError::MalformedResponse("not a response (QR bit not set)"));
        }

        let mut pos = HEADER_SIZE;
        for _ in 0..header.qdcount {
            let name_len = span_len(buf, pos)
                .ok_or(DnsError::MalformedResponse("question name is malformed"))?;
            pos += name_len + QUESTION_TAIL_LEN;
            if pos > buf.len() {
                return Err(DnsError::MalformedResponse("packet too short for question"));
            }
        }

        Ok(Response {
            buf,
            header,
            answers_start: pos,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn id(&self) -> u16 {
        self.header.id
    }

    pub fn answer_count(&self) -> u16 {
        self.header.ancount
    }

    /// Offset of the first answer record
    pub fn question_end(&self) -> usize {
        self.answers_start
    }

    /// Walk the announced answer records
    pub fn answers(&self) -> Answers<'a> {
        Answers {
            buf: self.buf,
            pos: self.answers_start,
            remaining: self.header.ancount,
        }
    }

    /// Bytes covered by header, question and every answer record
    pub fn span(&self) -> Result<usize, DnsError> {
        let mut answers = self.answers();
        for record in answers.by_ref() {
            record?;
        }
        Ok(answers.pos)
    }

    /// First A/IN record carrying a 4-byte address
    pub fn first_ipv4(&self) -> Result<Option<Ipv4Addr>, DnsError> {
        for record in self.answers() {
            if let Some(addr) = record?.ipv4() {
                return Ok(Some(addr));
            }
        }
        Ok(None)
    }

    /// Decode every SRV/IN answer record
    pub fn srv_records(&self) -> Result<Vec<SrvRecord>, DnsError> {
        let mut records = Vec::new();
        for record in self.answers() {
            let record = record?;
            if record.rtype == RecordType::SRV && record.class == CLASS_IN {
                records.push(SrvRecord::parse(self.buf, &record)?);
            }
        }
        Ok(records)
    }
}

/// One answer record; the record data is not interpreted
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub name_offset: usize,
    pub rtype: RecordType,
    pub class: u16,
    pub ttl: u32,
    pub rdata: &'a [u8],
    rdata_offset: usize,
}

impl Record<'_> {
    /// The address carried by an A/IN record with 4 bytes of data
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        if self.rtype != RecordType::A || self.class != CLASS_IN {
            return None;
        }
        let octets: [u8; 4] = self.rdata.try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }
}

/// Iterator over answer records. Yields one error and stops on malformed input.
#[derive(Debug)]
pub struct Answers<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining: u16,
}

impl<'a> Iterator for Answers<'a> {
    type Item = Result<Record<'a>, DnsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let result = self.read_record();
        self.remaining = if result.is_ok() { self.remaining - 1 } else { 0 };
        Some(result)
    }
}

impl<'a> Answers<'a> {
    fn read_record(&mut self) -> Result<Record<'a>, DnsError> {
        let buf = self.buf;
        let name_offset = self.pos;
        let name_len = span_len(buf, name_offset)
            .ok_or(DnsError::MalformedResponse("answer name is malformed"))?;

        let fixed = name_offset + name_len;
        let truncated = DnsError::MalformedResponse("packet too short for answer record");
        let rtype = read_u16(buf, fixed).ok_or(truncated)?;
        let class = read_u16(buf, fixed + 2).ok_or(truncated)?;
        let ttl = read_u32(buf, fixed + 4).ok_or(truncated)?;
        let rdlength = read_u16(buf, fixed + 8).ok_or(truncated)? as usize;

        let rdata_offset = fixed + RR_FIXED_LEN;
        let rdata = buf
            .get(rdata_offset..rdata_offset + rdlength)
            .ok_or(DnsError::MalformedResponse("record data extends beyond packet"))?;

        self.pos = rdata_offset + rdlength;

        Ok(Record {
            name_offset,
            rtype: RecordType::from_u16(rtype),
            class,
            ttl,
            rdata,
            rdata_offset,
        })
    }
}

/// Decoded SRV record data (RFC 2782)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

impl SrvRecord {
    /// Decode from a record; `msg` is the whole datagram since the target may be compressed
    pub fn parse(msg: &[u8], record: &Record<'_>) -> Result<SrvRecord, DnsError> {
        let short = DnsError::MalformedResponse("SRV record data too short");
        if record.rdata.len() < 7 {
            return Err(short);
        }

        let start = record.rdata_offset;
        let priority = read_u16(msg, start).ok_or(short)?;
        let weight = read_u16(msg, start + 2).ok_or(short)?;
        let port = read_u16(msg, start + 4).ok_or(short)?;
        let (target, end) = read_name(msg, start + 6)?;

        if end > start + record.rdata.len() {
            return Err(DnsError::MalformedResponse("SRV target overruns record data"));
        }

        Ok(SrvRecord {
            priority,
            weight,
            port,
            target,
        })
    }
}

// ==================== Helper for building DNS packets (tests) ====================

/// DNS response builder for testing
#[cfg(test)]
pub mod builder {
    use super::*;
    use crate::dns::name::encode;
    use crate::dns::wire::{ResponseCode, FLAG1_RD, FLAG1_RESPONSE, FLAG2_RA};

    /// Pointer to the question name, which always sits right after the header
    pub const QUESTION_POINTER: [u8; 2] = [0xC0, HEADER_SIZE as u8];

    fn header(id: u16, rcode: ResponseCode, ancount: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        Header {
            id,
            flags1: FLAG1_RESPONSE | FLAG1_RD,
            flags2: FLAG2_RA | rcode.to_u8(),
            qdcount: 1,
            ancount,
            nscount: 0,
            arcount: 0,
        }
        .write(&mut buf);
        buf
    }

    fn question(buf: &mut Vec<u8>, domain: &str, rtype: RecordType) {
        buf.extend_from_slice(&encode(domain).unwrap());
        buf.extend_from_slice(&rtype.to_u16().to_be_bytes());
        buf.extend_from_slice(&CLASS_IN.to_be_bytes());
    }

    fn record_prefix(buf: &mut Vec<u8>, rtype: RecordType, ttl: u32, rdlength: u16) {
        buf.extend_from_slice(&rtype.to_u16().to_be_bytes());
        buf.extend_from_slice(&CLASS_IN.to_be_bytes());
        buf.extend_from_slice(&ttl.to_be_bytes());
        buf.extend_from_slice(&rdlength.to_be_bytes());
    }

    /// Response with one A record per address; names are compressed when `compress` is set
    pub fn build_a_response(domain: &str, addrs: &[Ipv4Addr], id: u16, compress: bool) -> Vec<u8> {
        let mut buf = header(id, ResponseCode::NoError, addrs.len() as u16);
        question(&mut buf, domain, RecordType::A);

        for addr in addrs {
            if compress {
                buf.extend_from_slice(&QUESTION_POINTER);
            } else {
                buf.extend_from_slice(&encode(domain).unwrap());
            }
            record_prefix(&mut buf, RecordType::A, 300, 4);
            buf.extend_from_slice(&addr.octets());
        }

        buf
    }

    /// Response with no answers and the given response code
    pub fn build_error_response(domain: &str, id: u16, rcode: ResponseCode) -> Vec<u8> {
        let mut buf = header(id, rcode, 0);
        question(&mut buf, domain, RecordType::A);
        buf
    }

    /// Response whose answers are SRV records (priority, weight, port, target)
    pub fn build_srv_response(domain: &str, targets: &[(u16, u16, u16, &str)], id: u16) -> Vec<u8> {
        let mut buf = header(id, ResponseCode::NoError, targets.len() as u16);
        question(&mut buf, domain, RecordType::SRV);

        for (priority, weight, port, target) in targets {
            let target = encode(target).unwrap();
            buf.extend_from_slice(&QUESTION_POINTER);
            record_prefix(&mut buf, RecordType::SRV, 3600, 6 + target.len() as u16);
            buf.extend_from_slice(&priority.to_be_bytes());
            buf.extend_from_slice(&weight.to_be_bytes());
            buf.extend_from_slice(&port.to_be_bytes());
            buf.extend_from_slice(&target);
        }

        buf
    }

    /// Prepend a CNAME answer to an A response (adjusting ANCOUNT)
    pub fn with_leading_cname(mut response: Vec<u8>, target: &str) -> Vec<u8> {
        let parsed = Response::parse(&response).unwrap();
        let at = parsed.question_end();
        let ancount = parsed.answer_count() + 1;

        let target = encode(target).unwrap();
        let mut cname = QUESTION_POINTER.to_vec();
        record_prefix(&mut cname, RecordType::CNAME, 60, target.len() as u16);
        cname.extend_from_slice(&target);

        response.splice(at..at, cname);
        response[6..8].copy_from_slice(&ancount.to_be_bytes());
        response
    }
}
