// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Writer: walks object, array and value nodes and emits records.
//!
//! Every node becomes one record keyed by its [`ContentId`]. The writer keeps
//! a static-data table (`id → session byte offset`) for the lifetime of the
//! session. When dedup is on and an id is already in the table, the node is
//! emitted as a 17-byte REF record instead of a second copy of its body.
//!
//! Ids are entered into the table right after the record header is written,
//! before any property, element or child of that record. If the body then
//! fails, the entry is withdrawn so the session never refers back to a
//! truncated record.

use std::collections::hash_map::Entry;
use std::io::Write;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::array::ArrayNode;
use crate::config::WriterConfig;
use crate::error::{BomError, Result};
use crate::id::ContentId;
use crate::marshal::{Marshal, MarshalerRegistry};
use crate::object::ObjectNode;
use crate::value::ValueNode;
use crate::wire::{Shape, WireWriter, ENTRY_INLINE, ENTRY_RECORD, KIND_REF, KIND_VALUE};

/// Borrowed node handed to [`Writer::write`].
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// An object node.
    Object(&'a ObjectNode),
    /// An array node.
    Array(&'a ArrayNode),
    /// A standalone value.
    Value(&'a ValueNode),
}

impl Node<'_> {
    /// Content id of the wrapped node.
    pub fn content_id(&self) -> ContentId {
        match self {
            Self::Object(o) => o.content_id(),
            Self::Array(a) => a.content_id(),
            Self::Value(v) => v.content_id(),
        }
    }

    /// Record shape the node is written as.
    pub fn shape(&self) -> Shape {
        match self {
            Self::Object(_) => Shape::Object,
            Self::Array(_) => Shape::Array,
            Self::Value(_) => Shape::Blob,
        }
    }
}

impl<'a> From<&'a ObjectNode> for Node<'a> {
    fn from(node: &'a ObjectNode) -> Self {
        Self::Object(node)
    }
}

impl<'a> From<&'a ArrayNode> for Node<'a> {
    fn from(node: &'a ArrayNode) -> Self {
        Self::Array(node)
    }
}

impl<'a> From<&'a ValueNode> for Node<'a> {
    fn from(node: &'a ValueNode) -> Self {
        Self::Value(node)
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteAttributes {
    /// Overrides [`WriterConfig::dedup`] for this call when set.
    pub dedup: Option<bool>,
}

impl WriteAttributes {
    /// Attributes forcing dedup on or off for one call.
    pub const fn with_dedup(dedup: bool) -> Self {
        Self { dedup: Some(dedup) }
    }
}

/// Counters for one write session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// VALUE records emitted, nested ones included.
    pub value_records: u64,
    /// REF records emitted.
    pub ref_records: u64,
    /// Total bytes written.
    pub bytes_written: u64,
}

/// Single-threaded write session.
#[derive(Debug)]
pub struct Writer {
    config: WriterConfig,
    table: FxHashMap<ContentId, u64>,
    position: u64,
    stats: WriteStats,
}

impl Writer {
    /// Starts a session.
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            table: FxHashMap::default(),
            position: 0,
            stats: WriteStats::default(),
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Writes `node` as one record.
    ///
    /// `id` defaults to the node's content id. Supplying one lets a producer
    /// pre-declare the id a node is referenced by.
    ///
    /// # Errors
    /// Returns the first failure from the stream or from a nested node. Bytes
    /// already handed to `out` are not rolled back, but the failed record
    /// leaves the static-data table, so a later identical node is written in
    /// full.
    pub fn write<'a, W: Write>(
        &mut self,
        out: &mut W,
        node: impl Into<Node<'a>>,
        id: Option<ContentId>,
        attributes: WriteAttributes,
    ) -> Result<ContentId> {
        let node = node.into();
        let dedup = attributes.dedup.unwrap_or(self.config.dedup);
        let start = self.position;
        let mut wire = WireWriter::new(out, start);
        let result = self.emit_record(&mut wire, node, id, dedup);
        self.position = wire.position();
        self.stats.bytes_written += self.position - start;
        match &result {
            Ok(id) => debug!(
                %id,
                shape = node.shape().as_str(),
                bytes = self.position - start,
                "wrote record"
            ),
            Err(err) => debug!(error = %err, "write aborted"),
        }
        result
    }

    /// Writes an object with default attributes.
    ///
    /// # Errors
    /// See [`Writer::write`].
    pub fn write_object<W: Write>(&mut self, out: &mut W, node: &ObjectNode) -> Result<ContentId> {
        self.write(out, node, None, WriteAttributes::default())
    }

    /// Writes an array with default attributes.
    ///
    /// # Errors
    /// See [`Writer::write`].
    pub fn write_array<W: Write>(&mut self, out: &mut W, node: &ArrayNode) -> Result<ContentId> {
        self.write(out, node, None, WriteAttributes::default())
    }

    /// Writes a standalone value with default attributes.
    ///
    /// # Errors
    /// See [`Writer::write`].
    pub fn write_value<W: Write>(&mut self, out: &mut W, node: &ValueNode) -> Result<ContentId> {
        self.write(out, node, None, WriteAttributes::default())
    }

    /// Marshals `value` through `registry` and writes the resulting object.
    ///
    /// # Errors
    /// Returns [`BomError::UnknownType`] if `T` is not registered, any
    /// marshaler failure, or a write failure.
    pub fn write_native<T: Marshal, W: Write>(
        &mut self,
        out: &mut W,
        registry: &MarshalerRegistry,
        value: &T,
    ) -> Result<ContentId> {
        let node = registry.serialize(value)?;
        self.write_object(out, &node)
    }

    /// Emits an explicit REF record for an id already written this session.
    ///
    /// # Errors
    /// Returns [`BomError::UnresolvedReference`] when `id` has not been
    /// written yet; forward references are not representable.
    pub fn write_ref<W: Write>(&mut self, out: &mut W, id: ContentId) -> Result<()> {
        if !self.table.contains_key(&id) {
            return Err(BomError::UnresolvedReference(id));
        }
        let start = self.position;
        let mut wire = WireWriter::new(out, start);
        let result = self.emit_ref(&mut wire, id);
        self.position = wire.position();
        self.stats.bytes_written += self.position - start;
        result
    }

    /// Returns `true` if `id` has been emitted as a VALUE record.
    pub fn contains(&self, id: &ContentId) -> bool {
        self.table.contains_key(id)
    }

    /// Session offset at which `id`'s VALUE record starts.
    pub fn offset_of(&self, id: &ContentId) -> Option<u64> {
        self.table.get(id).copied()
    }

    /// Counters so far.
    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Ends the session, discarding the static-data table.
    pub fn finish(self) -> WriteStats {
        debug!(
            values = self.stats.value_records,
            refs = self.stats.ref_records,
            bytes = self.stats.bytes_written,
            "write session finished"
        );
        self.stats
    }

    fn emit_ref<W: Write>(&mut self, wire: &mut WireWriter<'_, W>, id: ContentId) -> Result<()> {
        wire.write_u8(KIND_REF)?;
        wire.write_id(id)?;
        self.stats.ref_records += 1;
        trace!(%id, "ref record");
        Ok(())
    }

    fn emit_record<W: Write>(
        &mut self,
        wire: &mut WireWriter<'_, W>,
        node: Node<'_>,
        id: Option<ContentId>,
        dedup: bool,
    ) -> Result<ContentId> {
        let id = id.unwrap_or_else(|| node.content_id());
        if dedup && self.table.contains_key(&id) {
            self.emit_ref(wire, id)?;
            return Ok(id);
        }

        let offset = wire.position();
        wire.write_u8(KIND_VALUE)?;
        wire.write_id(id)?;
        let inserted = match self.table.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(offset);
                true
            }
            Entry::Occupied(_) => false,
        };
        if let Err(err) = self.emit_body(wire, node, dedup) {
            if inserted {
                self.table.remove(&id);
            }
            debug!(%id, offset, error = %err, "value record abandoned");
            return Err(err);
        }
        self.stats.value_records += 1;
        trace!(%id, offset, shape = node.shape().as_str(), "value record");
        Ok(id)
    }

    fn emit_body<W: Write>(
        &mut self,
        wire: &mut WireWriter<'_, W>,
        node: Node<'_>,
        dedup: bool,
    ) -> Result<()> {
        wire.write_u8(node.shape() as u8)?;
        match node {
            Node::Object(object) => self.emit_object_body(wire, object, dedup),
            Node::Array(array) => self.emit_array_body(wire, array, dedup),
            Node::Value(value) => emit_value_body(wire, value),
        }
    }

    fn emit_object_body<W: Write>(
        &mut self,
        wire: &mut WireWriter<'_, W>,
        object: &ObjectNode,
        dedup: bool,
    ) -> Result<()> {
        wire.write_type(object.type_tag())?;
        wire.write_len(object.property_count())?;
        for (name, value) in object.properties() {
            wire.write_string(name)?;
            self.emit_entry(wire, value, dedup)?;
        }
        wire.write_len(object.children().len())?;
        for child in object.children() {
            self.emit_record(wire, Node::Object(child), None, dedup)?;
        }
        Ok(())
    }

    fn emit_array_body<W: Write>(
        &mut self,
        wire: &mut WireWriter<'_, W>,
        array: &ArrayNode,
        dedup: bool,
    ) -> Result<()> {
        wire.write_type(array.element_type())?;
        wire.write_len(array.len())?;
        for element in array {
            self.emit_entry(wire, element, dedup)?;
        }
        Ok(())
    }

    fn emit_entry<W: Write>(
        &mut self,
        wire: &mut WireWriter<'_, W>,
        value: &ValueNode,
        dedup: bool,
    ) -> Result<()> {
        if value.is_embedded() {
            wire.write_u8(ENTRY_RECORD)?;
            self.emit_record(wire, Node::Value(value), None, dedup)?;
        } else {
            wire.write_u8(ENTRY_INLINE)?;
            emit_value_body(wire, value)?;
        }
        Ok(())
    }
}

fn emit_value_body<W: Write>(wire: &mut WireWriter<'_, W>, value: &ValueNode) -> Result<()> {
    value.ty().check_len(value.len())?;
    wire.write_type(value.ty())?;
    wire.write_len_prefixed_bytes(value.bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::TypeDescriptor;
    use crate::wire::REF_RECORD_LEN;

    fn material(roughness: f32) -> ObjectNode {
        let mut node = ObjectNode::new(TypeDescriptor::object_type("Material"));
        node.set("roughness", &roughness);
        node.set("shader", &"pbr".to_owned());
        node
    }

    #[test]
    fn repeated_ids_become_ref_records() {
        let mut writer = Writer::new(WriterConfig::default());
        let mut out = Vec::new();
        let first = writer.write_object(&mut out, &material(0.5)).unwrap();
        let after_first = out.len();
        let second = writer.write_object(&mut out, &material(0.5)).unwrap();

        assert_eq!(first, second);
        assert_eq!(out.len() - after_first, REF_RECORD_LEN);
        assert_eq!(out[after_first], KIND_REF);
        assert!(REF_RECORD_LEN < after_first);
        assert_eq!(writer.offset_of(&first), Some(0));

        let stats = writer.finish();
        assert_eq!(stats.value_records, 1);
        assert_eq!(stats.ref_records, 1);
        assert_eq!(stats.bytes_written, out.len() as u64);
    }

    #[test]
    fn dedup_can_be_disabled_per_call() {
        let mut writer = Writer::new(WriterConfig::default());
        let mut out = Vec::new();
        writer.write_object(&mut out, &material(0.5)).unwrap();
        let once = out.len();
        writer
            .write(&mut out, &material(0.5), None, WriteAttributes::with_dedup(false))
            .unwrap();
        assert_eq!(out.len(), once * 2);
        assert_eq!(writer.stats().ref_records, 0);
    }

    #[test]
    fn shared_children_are_written_once() {
        let shared = std::sync::Arc::new(material(0.25));
        let mut batch = ObjectNode::new(TypeDescriptor::object_type("Batch"));
        batch.add_shared_child(shared.clone());
        batch.add_shared_child(shared);

        let mut writer = Writer::new(WriterConfig::default());
        writer.write_object(&mut Vec::new(), &batch).unwrap();
        let stats = writer.stats();
        assert_eq!(stats.value_records, 2);
        assert_eq!(stats.ref_records, 1);

        let mut flat = Writer::new(WriterConfig { dedup: false });
        flat.write_object(&mut Vec::new(), &batch).unwrap();
        assert_eq!(flat.stats().value_records, 3);
        assert_eq!(flat.stats().ref_records, 0);
    }

    #[test]
    fn explicit_ref_requires_an_emitted_id() {
        let mut writer = Writer::new(WriterConfig::default());
        let mut out = Vec::new();
        let node = material(1.0);
        let err = writer.write_ref(&mut out, node.content_id()).unwrap_err();
        assert_eq!(err, BomError::UnresolvedReference(node.content_id()));
        assert!(out.is_empty());

        let id = writer.write_object(&mut out, &node).unwrap();
        writer.write_ref(&mut out, id).unwrap();
        assert!(writer.contains(&id));
    }

    #[test]
    fn pre_declared_ids_are_honored() {
        let mut writer = Writer::new(WriterConfig::default());
        let declared = ContentId([7; 16]);
        let id = writer
            .write(
                &mut Vec::new(),
                &material(0.1),
                Some(declared),
                WriteAttributes::default(),
            )
            .unwrap();
        assert_eq!(id, declared);
        assert!(writer.contains(&declared));
    }

    #[test]
    fn stream_failures_propagate() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk on fire"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut writer = Writer::new(WriterConfig::default());
        let err = writer
            .write_value(&mut Broken, &ValueNode::scalar(1u8))
            .unwrap_err();
        assert!(matches!(err, BomError::Io { .. }));
    }

    #[test]
    fn failed_records_are_not_referenced_later() {
        /// Accepts `left` bytes, then fails.
        struct Short {
            left: usize,
        }
        impl Write for Short {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if self.left == 0 {
                    return Err(std::io::Error::other("device full"));
                }
                let n = buf.len().min(self.left);
                self.left -= n;
                Ok(n)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let node = material(0.5);
        let id = node.content_id();
        let mut writer = Writer::new(WriterConfig::default());
        // Room for the record header only; the body fails.
        let err = writer
            .write_object(&mut Short { left: 17 }, &node)
            .unwrap_err();
        assert!(matches!(err, BomError::Io { .. }));
        assert!(!writer.contains(&id));

        let mut out = Vec::new();
        assert_eq!(writer.write_object(&mut out, &node).unwrap(), id);
        assert_eq!(out[0], KIND_VALUE);
        assert!(out.len() > REF_RECORD_LEN);
        assert_eq!(writer.stats().value_records, 1);
        assert_eq!(writer.stats().ref_records, 0);
    }
}
