//! Minimal DNS message handling for service-type enumeration.
//!
//! Only what the type browser needs is implemented: building a single PTR
//! question and pulling PTR records out of responses. Names may use message
//! compression.

use thiserror::Error;

/// Multicast DNS port.
pub const MDNS_PORT: u16 = 5353;
/// Unicast DNS port used for wide-area servers.
pub const DNS_PORT: u16 = 53;

const HEADER_LEN: usize = 12;
const TYPE_PTR: u16 = 12;
const CLASS_IN: u16 = 1;
const CLASS_MASK: u16 = 0x7fff;
const FLAG_RESPONSE: u16 = 0x8000;
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
const MAX_POINTER_JUMPS: usize = 16;
const POINTER_TAG: u8 = 0xc0;

/// Errors raised while encoding or decoding DNS messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// A name contained an empty label, e.g. `a..b`.
    #[error("name '{name}' contains an empty label")]
    EmptyLabel {
        /// Offending name.
        name: String,
    },
    /// A label exceeded 63 bytes.
    #[error("label '{label}' exceeds {MAX_LABEL_LEN} bytes")]
    LabelTooLong {
        /// Offending label.
        label: String,
    },
    /// An encoded name exceeded 255 bytes.
    #[error("name exceeds {MAX_NAME_LEN} bytes")]
    NameTooLong,
    /// The message ended before a field could be read.
    #[error("message truncated at offset {offset}")]
    Truncated {
        /// Offset at which more bytes were expected.
        offset: usize,
    },
    /// Compression pointers formed a loop or chained too deeply.
    #[error("compression pointers loop at offset {offset}")]
    PointerLoop {
        /// Offset of the pointer that exceeded the jump budget.
        offset: usize,
    },
    /// A label used the reserved `0x40`/`0x80` length prefixes.
    #[error("unsupported label type {prefix:#04x} at offset {offset}")]
    UnsupportedLabel {
        /// The label's length byte.
        prefix: u8,
        /// Offset of the label.
        offset: usize,
    },
}

/// A PTR record pulled from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtrRecord {
    /// Owner name of the record.
    pub owner: String,
    /// Name the record points at.
    pub target: String,
    /// Record time to live in seconds; zero announces removal.
    pub ttl: u32,
}

/// Name queried to enumerate the service types advertised in `domain`.
#[must_use]
pub fn enumeration_name(domain: &str) -> String {
    format!("_services._dns-sd._udp.{}", domain.trim_end_matches('.'))
}

/// Encodes a one-question PTR query for `name`.
pub fn encode_query(name: &str) -> Result<Vec<u8>, WireError> {
    let mut message = Vec::with_capacity(HEADER_LEN + name.len() + 6);
    // id, flags, qdcount = 1, ancount, nscount, arcount
    for field in [0_u16, 0, 1, 0, 0, 0] {
        message.extend_from_slice(&field.to_be_bytes());
    }
    encode_name(name, &mut message)?;
    message.extend_from_slice(&TYPE_PTR.to_be_bytes());
    message.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(message)
}

fn encode_name(name: &str, out: &mut Vec<u8>) -> Result<(), WireError> {
    let start = out.len();
    let trimmed = name.trim_end_matches('.');
    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(WireError::EmptyLabel {
                    name: name.to_owned(),
                });
            }
            let length = u8::try_from(label.len())
                .ok()
                .filter(|length| usize::from(*length) <= MAX_LABEL_LEN)
                .ok_or_else(|| WireError::LabelTooLong {
                    label: label.to_owned(),
                })?;
            out.push(length);
            out.extend_from_slice(label.as_bytes());
        }
    }
    out.push(0);
    if out.len() - start > MAX_NAME_LEN {
        return Err(WireError::NameTooLong);
    }
    Ok(())
}

/// Extracts PTR records from the answer and additional sections of a
/// response. Queries yield no records.
pub fn decode_ptr_records(message: &[u8]) -> Result<Vec<PtrRecord>, WireError> {
    let mut reader = Reader::new(message);
    let _id = reader.u16()?;
    let flags = reader.u16()?;
    if flags & FLAG_RESPONSE == 0 {
        return Ok(Vec::new());
    }
    let questions = reader.u16()?;
    let answers = reader.u16()?;
    let authorities = reader.u16()?;
    let additionals = reader.u16()?;

    for _ in 0..questions {
        reader.skip_name()?;
        reader.skip(4)?;
    }

    let mut records = Vec::new();
    let sections = usize::from(answers) + usize::from(authorities) + usize::from(additionals);
    for _ in 0..sections {
        let owner = reader.name()?;
        let record_type = reader.u16()?;
        let class = reader.u16()? & CLASS_MASK;
        let ttl = reader.u32()?;
        let length = usize::from(reader.u16()?);
        let data_start = reader.offset;
        if record_type == TYPE_PTR && class == CLASS_IN {
            let target = read_name(message, data_start)?.0;
            records.push(PtrRecord { owner, target, ttl });
        }
        reader.offset = data_start;
        reader.skip(length)?;
    }
    Ok(records)
}

/// Splits `_http._tcp.mesh.local` into (`_http._tcp`, `mesh.local`).
#[must_use]
pub fn split_service_type(target: &str) -> Option<(String, String)> {
    let mut labels = target.trim_end_matches('.').splitn(3, '.');
    let service = labels.next()?;
    let protocol = labels.next()?;
    let domain = labels.next()?;
    let is_service_label = |label: &str| label.len() > 1 && label.starts_with('_');
    if !is_service_label(service) || !matches!(protocol, "_tcp" | "_udp") || domain.is_empty() {
        return None;
    }
    Some((format!("{service}.{protocol}"), domain.to_owned()))
}

struct Reader<'a> {
    message: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(message: &'a [u8]) -> Self {
        Self { message, offset: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let end = self.offset + N;
        let bytes = self
            .message
            .get(self.offset..end)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or(WireError::Truncated {
                offset: self.offset,
            })?;
        self.offset = end;
        Ok(bytes)
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        self.take::<2>().map(u16::from_be_bytes)
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        self.take::<4>().map(u32::from_be_bytes)
    }

    fn skip(&mut self, count: usize) -> Result<(), WireError> {
        let end = self.offset + count;
        if end > self.message.len() {
            return Err(WireError::Truncated {
                offset: self.offset,
            });
        }
        self.offset = end;
        Ok(())
    }

    fn name(&mut self) -> Result<String, WireError> {
        let (name, next) = read_name(self.message, self.offset)?;
        self.offset = next;
        Ok(name)
    }

    fn skip_name(&mut self) -> Result<(), WireError> {
        self.name().map(drop)
    }
}

/// Reads the name at `offset`, following compression pointers. Returns the
/// dotted name and the offset just past it in the original position.
fn read_name(message: &[u8], mut offset: usize) -> Result<(String, usize), WireError> {
    let mut labels: Vec<String> = Vec::new();
    let mut resume = None;
    let mut jumps = 0;
    loop {
        let prefix = *message.get(offset).ok_or(WireError::Truncated { offset })?;
        match prefix & POINTER_TAG {
            0 if prefix == 0 => {
                let next = resume.unwrap_or(offset + 1);
                return Ok((labels.join("."), next));
            }
            0 => {
                let start = offset + 1;
                let end = start + usize::from(prefix);
                let label = message
                    .get(start..end)
                    .ok_or(WireError::Truncated { offset: start })?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                offset = end;
            }
            POINTER_TAG => {
                let low = *message
                    .get(offset + 1)
                    .ok_or(WireError::Truncated { offset: offset + 1 })?;
                resume.get_or_insert(offset + 2);
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(WireError::PointerLoop { offset });
                }
                offset = (usize::from(prefix & !POINTER_TAG) << 8) | usize::from(low);
            }
            _ => return Err(WireError::UnsupportedLabel { prefix, offset }),
        }
    }
}
