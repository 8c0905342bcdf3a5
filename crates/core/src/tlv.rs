//! BER-TLV encoding and decoding
//!
//! Tags are carried as plain integers holding the tag bytes big-endian, so a
//! two byte tag `5F 50` is `0x5F50`. Lengths use the short form below 0x80 and
//! the long form (`0x80 | n` followed by `n` length bytes) otherwise. The
//! indefinite length form is rejected.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{Error, Result};

/// Most length bytes accepted after a long-form length prefix
const MAX_LENGTH_BYTES: usize = 4;

/// Errors raised while decoding TLV data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    /// Buffer ended inside a tag, length or value
    #[error("Truncated TLV: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes needed to continue
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// Length byte 0x80 (indefinite form)
    #[error("Indefinite length TLV not supported")]
    IndefiniteLength,

    /// Long-form length needs more bytes than supported
    #[error("TLV length field of {0} bytes not supported")]
    LengthOverflow(usize),

    /// Tag does not fit the integer representation
    #[error("TLV tag too long")]
    TagOverflow,

    /// Bytes left over after a single TLV
    #[error("{0} trailing bytes after TLV")]
    TrailingData(usize),
}

/// A single tag/value record
///
/// A parsed TLV keeps its tag and length bytes as they were received, so
/// re-encoding reproduces the input even for non-minimal long-form lengths.
/// Equality compares tag and value only.
#[derive(Clone)]
pub struct Tlv {
    tag: u32,
    value: Bytes,
    header: Bytes,
}

impl Tlv {
    /// Create a new TLV. The tag must be a well-formed BER tag.
    pub fn new<T: Into<Bytes>>(tag: u32, value: T) -> Self {
        let value = value.into();
        let header = encode_header(tag, value.len());
        Self { tag, value, header }
    }

    /// The tag
    pub const fn tag(&self) -> u32 {
        self.tag
    }

    /// The value bytes
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The value as a shared buffer
    pub fn into_value(self) -> Bytes {
        self.value
    }

    /// Length of the value
    pub fn length(&self) -> usize {
        self.value.len()
    }

    /// Parse exactly one TLV occupying the whole buffer
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (tlv, consumed) = Self::parse_next(data)?;
        if consumed != data.len() {
            return Err(TlvError::TrailingData(data.len() - consumed).into());
        }
        Ok(tlv)
    }

    /// Parse exactly one TLV occupying `length` bytes starting at `offset`
    pub fn parse_at(data: &[u8], offset: usize, length: usize) -> Result<Self> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= data.len())
            .ok_or(TlvError::Truncated {
                needed: offset.saturating_add(length),
                available: data.len(),
            })?;
        Self::parse(&data[offset..end])
    }

    /// Parse one TLV from the front of the buffer, returning it with the number of bytes consumed
    pub fn parse_next(data: &[u8]) -> Result<(Self, usize)> {
        let mut reader = Reader { data, pos: 0 };

        let mut tag = u32::from(reader.byte()?);
        if tag & 0x1F == 0x1F {
            loop {
                if tag > 0x00FF_FFFF {
                    return Err(TlvError::TagOverflow.into());
                }
                let next = reader.byte()?;
                tag = (tag << 8) | u32::from(next);
                if next & 0x80 == 0 {
                    break;
                }
            }
        }

        let length = match reader.byte()? {
            0x80 => return Err(TlvError::IndefiniteLength.into()),
            short if short < 0x80 => usize::from(short),
            long => {
                let count = usize::from(long & 0x7F);
                if count > MAX_LENGTH_BYTES {
                    return Err(TlvError::LengthOverflow(count).into());
                }
                reader
                    .take(count)?
                    .iter()
                    .fold(0usize, |acc, b| (acc << 8) | usize::from(*b))
            }
        };

        let header = Bytes::copy_from_slice(&data[..reader.pos]);
        let value = Bytes::copy_from_slice(reader.take(length)?);
        Ok((Self { tag, value, header }, reader.pos))
    }

    /// Parse consecutive TLVs until the buffer is exhausted
    pub fn parse_sequence(data: &[u8]) -> Result<Vec<Self>> {
        let mut tlvs = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let (tlv, consumed) = Self::parse_next(&data[offset..])?;
            offset += consumed;
            tlvs.push(tlv);
        }
        Ok(tlvs)
    }

    /// Parse one TLV and return its value, failing if the tag is not `expected_tag`
    pub fn unpack(expected_tag: u32, data: &[u8]) -> Result<Bytes> {
        let tlv = Self::parse(data)?;
        if tlv.tag != expected_tag {
            return Err(Error::UnexpectedTag {
                expected: expected_tag,
                actual: tlv.tag,
            });
        }
        Ok(tlv.value)
    }

    /// Encode tag, length and value
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.value.len() + 8);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the encoding to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.header);
        buf.put_slice(&self.value);
    }

    /// Encode a list of TLVs back to back
    pub fn encode_sequence<'a, I>(tlvs: I) -> Bytes
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut buf = BytesMut::new();
        for tlv in tlvs {
            tlv.encode_into(&mut buf);
        }
        buf.freeze()
    }
}

impl PartialEq for Tlv {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.value == other.value
    }
}

impl Eq for Tlv {}

impl fmt::Debug for Tlv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tlv(0x{:02x}, {})", self.tag, hex::encode(&self.value))
    }
}

/// Insertion-ordered tag to value map
///
/// Decoding a map keeps the position of the first occurrence of a tag and
/// the value of its last occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvMap {
    entries: Vec<(u32, Bytes)>,
}

impl TlvMap {
    /// Create an empty map
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Decode consecutive TLVs into a map
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut map = Self::new();
        for tlv in Tlv::parse_sequence(data)? {
            map.insert(tlv.tag, tlv.value);
        }
        Ok(map)
    }

    /// Insert or replace the value for `tag`
    pub fn insert<T: Into<Bytes>>(&mut self, tag: u32, value: T) {
        let value = value.into();
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((tag, value)),
        }
    }

    /// Look up the value for `tag`
    pub fn get(&self, tag: u32) -> Option<&Bytes> {
        self.entries.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
    }

    /// Whether `tag` is present
    pub fn contains(&self, tag: u32) -> bool {
        self.get(tag).is_some()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Bytes)> {
        self.entries.iter().map(|(t, v)| (*t, v))
    }

    /// Encode every entry as a TLV, in insertion order
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for (tag, value) in &self.entries {
            Tlv::new(*tag, value.clone()).encode_into(&mut buf);
        }
        buf.freeze()
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, TlvError> {
        Ok(self.take(1)?[0])
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TlvError> {
        let available = self.data.len() - self.pos;
        if n > available {
            return Err(TlvError::Truncated {
                needed: n,
                available,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

/// Minimal tag and length bytes for a value of `length` bytes
fn encode_header(tag: u32, length: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_slice(strip_leading_zeros(&tag.to_be_bytes()));
    if length < 0x80 {
        buf.put_u8(length as u8);
    } else {
        let be = (length as u32).to_be_bytes();
        let length_bytes = strip_leading_zeros(&be);
        buf.put_u8(0x80 | length_bytes.len() as u8);
        buf.put_slice(length_bytes);
    }
    buf.freeze()
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    &bytes[first..]
}
