// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Document framing for standalone BOM files.
//!
//! ```text
//! magic:   b"EBOM"
//! version: u16 LE (1)
//! flags:   u16 LE (bit0: written with dedup)
//! body:    one object record
//! ```

use std::io::{Read, Write};
use std::sync::Arc;

use crate::config::{ReaderConfig, WriterConfig};
use crate::context::LoadContext;
use crate::error::{BomError, Result};
use crate::id::ContentId;
use crate::object::ObjectNode;
use crate::reader::{ReadStats, Reader};
use crate::writer::{WriteStats, Writer};

/// File magic.
pub const MAGIC: [u8; 4] = *b"EBOM";
/// Current format version.
pub const VERSION: u16 = 1;
/// Header size in bytes.
pub const HEADER_LEN: usize = 8;

const FLAG_DEDUP: u16 = 0b1;

/// Parsed document header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentHeader {
    /// Format version.
    pub version: u16,
    /// Whether the writer deduplicated repeated records.
    pub dedup: bool,
}

impl DocumentHeader {
    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&MAGIC);
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        let flags = if self.dedup { FLAG_DEDUP } else { 0 };
        out[6..8].copy_from_slice(&flags.to_le_bytes());
        out
    }

    /// Reads and validates a header.
    ///
    /// # Errors
    /// Returns [`BomError::MalformedStream`] for a bad magic, an unsupported
    /// version, unknown flag bits or a truncated header.
    pub fn read_from<R: Read>(input: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_LEN];
        input.read_exact(&mut buf)?;
        if buf[..4] != MAGIC {
            return Err(BomError::malformed("not a BOM document (bad magic)"));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != VERSION {
            return Err(BomError::malformed(format!(
                "unsupported document version {version}"
            )));
        }
        let flags = u16::from_le_bytes([buf[6], buf[7]]);
        if flags & !FLAG_DEDUP != 0 {
            return Err(BomError::malformed(format!("unknown document flags {flags:#06x}")));
        }
        Ok(Self {
            version,
            dedup: flags & FLAG_DEDUP != 0,
        })
    }
}

/// Writes a header and `root` as a complete document.
///
/// # Errors
/// Returns stream and writer failures.
pub fn write_document<W: Write>(
    out: &mut W,
    root: &ObjectNode,
    config: WriterConfig,
) -> Result<(ContentId, WriteStats)> {
    let header = DocumentHeader {
        version: VERSION,
        dedup: config.dedup,
    };
    out.write_all(&header.to_bytes())?;
    let mut writer = Writer::new(config);
    let id = writer.write_object(out, root)?;
    let mut stats = writer.finish();
    stats.bytes_written += HEADER_LEN as u64;
    Ok((id, stats))
}

/// A document read back into memory.
#[derive(Debug)]
pub struct Document {
    /// Parsed header.
    pub header: DocumentHeader,
    /// Id of the root record.
    pub root_id: ContentId,
    /// Root object.
    pub root: Arc<ObjectNode>,
    /// Session state, holding every record the document defined.
    pub context: LoadContext,
    /// Reader counters.
    pub stats: ReadStats,
}

/// Reads a complete document.
///
/// # Errors
/// Returns header and reader failures.
pub fn read_document<R: Read>(input: &mut R, config: ReaderConfig) -> Result<Document> {
    let header = DocumentHeader::read_from(input)?;
    let mut context = LoadContext::with_config(config);
    let mut reader = Reader::new(config);
    let (root_id, node) = reader.read_node(&mut context, input)?;
    let root = node
        .as_object()
        .cloned()
        .ok_or_else(|| BomError::type_mismatch("object", node.kind_name()))?;
    let mut stats = reader.stats();
    stats.bytes_read += HEADER_LEN as u64;
    Ok(Document {
        header,
        root_id,
        root,
        context,
        stats,
    })
}
