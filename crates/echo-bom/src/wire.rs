// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire primitives: little-endian scalars, length-prefixed strings, type
//! descriptors and record tags.
//!
//! ```text
//! record  := kind:u8 id:[u8;16] (VALUE: shape:u8 body | REF)
//! OBJECT  := type u32:n (string entry)*n u32:c record*c
//! ARRAY   := type u32:n entry*n
//! BLOB    := type u32:len bytes
//! entry   := 0x00 type u32:len bytes | 0x01 record
//! type    := string u8:flags [u32:size] [type]
//! string  := u32:len utf8
//! ```

use std::io::{Read, Write};

use crate::error::{BomError, Result};
use crate::id::ContentId;
use crate::types::{TypeDescriptor, TypeRef};

/// Record kind: a full definition follows.
pub const KIND_VALUE: u8 = 0x01;
/// Record kind: a reference to an earlier definition.
pub const KIND_REF: u8 = 0x02;

/// Size of a REF record on the wire.
pub const REF_RECORD_LEN: usize = 1 + ContentId::LEN;

/// Entry tag: value stored inline.
pub(crate) const ENTRY_INLINE: u8 = 0x00;
/// Entry tag: value stored as a (deduplicable) record.
pub(crate) const ENTRY_RECORD: u8 = 0x01;

const TYPE_FLAG_BOUNDED: u8 = 0b01;
const TYPE_FLAG_PARENT: u8 = 0b10;

/// Body layout of a VALUE record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Shape {
    /// An object node: type tag, properties, children.
    Object = 0x01,
    /// An array node: element type, elements.
    Array = 0x02,
    /// A standalone value: type and payload bytes.
    Blob = 0x03,
}

impl Shape {
    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0x01 => Ok(Self::Object),
            0x02 => Ok(Self::Array),
            0x03 => Ok(Self::Blob),
            other => Err(BomError::malformed(format!("invalid record shape {other:#04x}"))),
        }
    }

    /// Lowercase name used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::Blob => "value",
        }
    }
}

/// Position-tracking little-endian writer over any `io::Write`.
pub(crate) struct WireWriter<'a, W: Write> {
    inner: &'a mut W,
    position: u64,
}

impl<'a, W: Write> WireWriter<'a, W> {
    pub(crate) fn new(inner: &'a mut W, position: u64) -> Self {
        Self { inner, position }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub(crate) fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub(crate) fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub(crate) fn write_len(&mut self, len: usize) -> Result<()> {
        let len: u32 = len
            .try_into()
            .map_err(|_| BomError::malformed(format!("length {len} does not fit in u32")))?;
        self.write_u32_le(len)
    }

    pub(crate) fn write_len_prefixed_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_len(bytes.len())?;
        self.write_bytes(bytes)
    }

    pub(crate) fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_len_prefixed_bytes(value.as_bytes())
    }

    pub(crate) fn write_id(&mut self, id: ContentId) -> Result<()> {
        self.write_bytes(id.as_bytes())
    }

    pub(crate) fn write_type(&mut self, ty: &TypeDescriptor) -> Result<()> {
        for link in ty.ancestors() {
            self.write_string(link.name())?;
            let mut flags = 0;
            if link.size().is_some() {
                flags |= TYPE_FLAG_BOUNDED;
            }
            if link.parent().is_some() {
                flags |= TYPE_FLAG_PARENT;
            }
            self.write_u8(flags)?;
            if let Some(size) = link.size() {
                self.write_u32_le(size)?;
            }
        }
        Ok(())
    }
}

/// Bounds applied while decoding, taken from the reader configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WireLimits {
    pub max_string_len: usize,
    pub max_payload_len: usize,
    pub max_entries: usize,
    pub max_type_depth: usize,
}

/// Position-tracking little-endian reader over any `io::Read`.
pub(crate) struct WireReader<'a, R: Read> {
    inner: &'a mut R,
    position: u64,
    limits: WireLimits,
}

impl<'a, R: Read> WireReader<'a, R> {
    pub(crate) fn new(inner: &'a mut R, limits: WireLimits) -> Self {
        Self {
            inner,
            position: 0,
            limits,
        }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        self.position += N as u64;
        Ok(buf)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        let [byte] = self.read_array::<1>()?;
        Ok(byte)
    }

    pub(crate) fn read_u32_le(&mut self) -> Result<u32> {
        self.read_array::<4>().map(u32::from_le_bytes)
    }

    pub(crate) fn read_id(&mut self) -> Result<ContentId> {
        self.read_array::<16>().map(ContentId)
    }

    /// Reads exactly `len` bytes without trusting `len` for the allocation.
    fn read_exact_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(64 * 1024));
        let read = self.inner.by_ref().take(len as u64).read_to_end(&mut buf)?;
        self.position += read as u64;
        if read != len {
            return Err(BomError::malformed(format!(
                "payload truncated: expected {len} bytes, found {read}"
            )));
        }
        Ok(buf)
    }

    pub(crate) fn read_payload(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32_le()? as usize;
        if len > self.limits.max_payload_len {
            return Err(BomError::malformed(format!(
                "payload of {len} bytes exceeds limit {}",
                self.limits.max_payload_len
            )));
        }
        self.read_exact_vec(len)
    }

    pub(crate) fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32_le()? as usize;
        if len > self.limits.max_string_len {
            return Err(BomError::malformed(format!(
                "string of {len} bytes exceeds limit {}",
                self.limits.max_string_len
            )));
        }
        let bytes = self.read_exact_vec(len)?;
        String::from_utf8(bytes).map_err(|_| BomError::malformed("invalid utf-8 in string"))
    }

    pub(crate) fn read_count(&mut self, what: &str) -> Result<usize> {
        let count = self.read_u32_le()? as usize;
        if count > self.limits.max_entries {
            return Err(BomError::malformed(format!(
                "{what} count {count} exceeds limit {}",
                self.limits.max_entries
            )));
        }
        Ok(count)
    }

    pub(crate) fn read_type(&mut self) -> Result<TypeRef> {
        let mut links = Vec::new();
        loop {
            if links.len() == self.limits.max_type_depth {
                return Err(BomError::malformed(format!(
                    "type chain deeper than {}",
                    self.limits.max_type_depth
                )));
            }
            let name = self.read_string()?;
            let flags = self.read_u8()?;
            if flags & !(TYPE_FLAG_BOUNDED | TYPE_FLAG_PARENT) != 0 {
                return Err(BomError::malformed(format!("invalid type flags {flags:#04x}")));
            }
            let size = if flags & TYPE_FLAG_BOUNDED != 0 {
                Some(self.read_u32_le()?)
            } else {
                None
            };
            links.push((name, size));
            if flags & TYPE_FLAG_PARENT == 0 {
                break;
            }
        }
        // Links arrive child-first; build from the root down.
        let mut parent: Option<TypeRef> = None;
        for (name, size) in links.into_iter().rev() {
            parent = Some(TypeDescriptor::new(name, size, parent));
        }
        parent.ok_or_else(|| BomError::malformed("empty type chain"))
    }
}
