//! DNS TXT wire format
//!
//! Just enough of RFC 1035 to ask one TXT question and read the answers:
//! query encoding, name skipping (with compression pointers), and TXT
//! character-string extraction.

use crate::error::SeedError;

/// Fixed DNS header length
pub const HEADER_LEN: usize = 12;
/// Largest reply accepted from the resolver
pub const MAX_RESPONSE_LEN: usize = 8192;

/// Record type for TXT
pub const TYPE_TXT: u16 = 16;
/// Internet class
pub const CLASS_IN: u16 = 1;

const FLAG_QR: u16 = 0x8000;
const FLAG_TC: u16 = 0x0200;
const FLAG_RD: u16 = 0x0100;
const RCODE_MASK: u16 = 0x000F;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
const POINTER_MASK: u8 = 0xC0;

/// Encode a recursive TXT query for `name`
pub fn build_txt_query(id: u16, name: &str) -> Result<Vec<u8>, SeedError> {
    let invalid = |reason: &str| SeedError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return Err(invalid("empty name"));
    }

    let mut packet = Vec::with_capacity(HEADER_LEN + trimmed.len() + 6);
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&FLAG_RD.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // ANCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT

    for label in trimmed.split('.') {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(invalid("label longer than 63 bytes"));
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);

    if packet.len() - HEADER_LEN > MAX_NAME_LEN {
        return Err(invalid("name longer than 255 bytes"));
    }

    packet.extend_from_slice(&TYPE_TXT.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(packet)
}

/// Parse a reply to the query with `id`, concatenating every TXT string
/// of every TXT answer in answer order
pub fn parse_txt_response(id: u16, response: &[u8]) -> Result<Vec<u8>, SeedError> {
    if response.len() > MAX_RESPONSE_LEN {
        return Err(SeedError::ResponseTooLarge {
            len: response.len(),
            limit: MAX_RESPONSE_LEN,
        });
    }

    let mut reader = Reader::new(response);
    let actual_id = reader.u16()?;
    if actual_id != id {
        return Err(SeedError::IdMismatch {
            expected: id,
            actual: actual_id,
        });
    }

    let flags = reader.u16()?;
    if flags & FLAG_QR == 0 {
        return Err(SeedError::malformed("message is not a response"));
    }
    if flags & FLAG_TC != 0 {
        return Err(SeedError::Truncated);
    }
    let rcode = (flags & RCODE_MASK) as u8;
    if rcode != 0 {
        return Err(SeedError::ResponseCode(rcode));
    }

    let questions = reader.u16()?;
    let answers = reader.u16()?;
    reader.skip(4)?; // NSCOUNT, ARCOUNT

    for _ in 0..questions {
        reader.skip_name()?;
        reader.skip(4)?; // QTYPE, QCLASS
    }

    let mut seeds = Vec::new();
    for index in 0..answers {
        reader.skip_name()?;
        let rtype = reader.u16()?;
        reader.skip(6)?; // CLASS, TTL
        let rdlen = reader.u16()? as usize;
        let rdata = reader.take(rdlen)?;

        if rtype != TYPE_TXT {
            tracing::trace!(index, rtype, "Skipping non-TXT answer");
            continue;
        }
        append_txt_strings(rdata, &mut seeds)?;
    }
    Ok(seeds)
}

fn append_txt_strings(rdata: &[u8], out: &mut Vec<u8>) -> Result<(), SeedError> {
    let mut pos = 0;
    while pos < rdata.len() {
        let len = rdata[pos] as usize;
        let start = pos + 1;
        let end = start + len;
        if end > rdata.len() {
            return Err(SeedError::malformed(format!(
                "invalid TXT length: {} exceeds record data of {}",
                len,
                rdata.len()
            )));
        }
        out.extend_from_slice(&rdata[start..end]);
        pos = end;
    }
    Ok(())
}

/// Bounds-checked cursor over a DNS message
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SeedError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| SeedError::malformed(format!("record runs past offset {}", self.pos)))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn skip(&mut self, len: usize) -> Result<(), SeedError> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, SeedError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, SeedError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Skip an encoded name; a compression pointer ends the name in place
    fn skip_name(&mut self) -> Result<(), SeedError> {
        let mut consumed = 0usize;
        loop {
            let len = self.u8()?;
            if len == 0 {
                return Ok(());
            }
            match len & POINTER_MASK {
                POINTER_MASK => {
                    self.skip(1)?;
                    return Ok(());
                }
                0 => {
                    consumed += len as usize + 1;
                    if consumed > MAX_NAME_LEN {
                        return Err(SeedError::malformed("name longer than 255 bytes"));
                    }
                    self.skip(len as usize)?;
                }
                _ => return Err(SeedError::malformed(format!("unknown label type {:#04x}", len))),
            }
        }
    }
}
