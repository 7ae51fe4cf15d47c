//! Outbound query construction.

use crate::dns::name::{encode_name, Hostname, MAX_NAME_LEN};
use crate::dns::wire::{Header, RecordType, HEADER_SIZE};
use crate::error::DnsError;

/// Build a complete query datagram: header, encoded name, QTYPE, QCLASS.
///
/// The header carries `id`, recursion desired and one question.
pub fn build_query(name: &str, class: u16, rtype: RecordType, id: u16) -> Result<Vec<u8>, DnsError> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + MAX_NAME_LEN + 4);
    Header::query(id).write(&mut buf);
    encode_name(name, &mut buf)?;
    push_question_tail(&mut buf, class, rtype);
    Ok(buf)
}

/// Same as [`build_query`] for an already validated hostname (never fails)
pub fn build_hostname_query(name: &Hostname, class: u16, rtype: RecordType, id: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + name.encoded_len() + 4);
    Header::query(id).write(&mut buf);
    name.encode_into(&mut buf);
    push_question_tail(&mut buf, class, rtype);
    buf
}

fn push_question_tail(buf: &mut Vec<u8>, class: u16, rtype: RecordType) {
    buf.extend_from_slice(&rtype.to_u16().to_be_bytes());
    buf.extend_from_slice(&class.to_be_bytes());
}
