// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reader: parses records back into nodes.
//!
//! A VALUE record is parsed in full and then registered in the
//! [`LoadContext`] under its id; a REF record is answered from the context.
//! Streams must define a record before referring to it. Records registered
//! before a later failure stay in the context, so callers can recover the
//! parts of a document that did parse.

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::array::ArrayNode;
use crate::config::ReaderConfig;
use crate::context::{LoadContext, ResolvedNode};
use crate::error::{BomError, Result};
use crate::handle::NativeHandle;
use crate::id::ContentId;
use crate::marshal::MarshalerRegistry;
use crate::object::ObjectNode;
use crate::value::ValueNode;
use crate::wire::{Shape, WireReader, ENTRY_INLINE, ENTRY_RECORD, KIND_REF, KIND_VALUE};

/// Counters for one read session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// VALUE records parsed, nested ones included.
    pub value_records: u64,
    /// REF records resolved.
    pub ref_records: u64,
    /// Total bytes consumed.
    pub bytes_read: u64,
}

/// Single-threaded read session.
#[derive(Debug, Clone, Default)]
pub struct Reader {
    config: ReaderConfig,
    stats: ReadStats,
}

impl Reader {
    /// Starts a session with the given limits.
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            config,
            stats: ReadStats::default(),
        }
    }

    /// Session limits.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Counters so far.
    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Reads one record of any shape.
    ///
    /// A top-level read installs this reader's limits on `ctx`, so embedded
    /// values decoded later from the same context honor them too.
    ///
    /// # Errors
    /// Returns [`BomError::UnresolvedReference`] for a REF to an id not yet
    /// defined, [`BomError::MalformedStream`] for structural problems, and
    /// size or type errors for payloads that violate their descriptors.
    pub fn read_node<R: Read>(
        &mut self,
        ctx: &mut LoadContext,
        input: &mut R,
    ) -> Result<(ContentId, ResolvedNode)> {
        // Embedded sub-streams inherit the outermost session's limits.
        if ctx.embedded_depth() == 0 {
            ctx.set_reader_config(self.config);
        }
        let mut wire = WireReader::new(input, self.config.limits());
        let depth = ctx.embedded_depth();
        let result = self.read_record(ctx, &mut wire, depth);
        self.stats.bytes_read += wire.position();
        match &result {
            Ok((id, node)) => debug!(%id, shape = node.kind_name(), "read record"),
            Err(err) => debug!(error = %err, offset = wire.position(), "read aborted"),
        }
        result
    }

    /// Reads one object record.
    ///
    /// # Errors
    /// As [`Reader::read_node`], plus [`BomError::TypeMismatch`] when the
    /// record is not an object.
    pub fn read_object<R: Read>(
        &mut self,
        ctx: &mut LoadContext,
        input: &mut R,
    ) -> Result<Arc<ObjectNode>> {
        match self.read_node(ctx, input)?.1 {
            ResolvedNode::Object(object) => Ok(object),
            other => Err(BomError::type_mismatch("object", other.kind_name())),
        }
    }

    /// Reads one array record.
    ///
    /// # Errors
    /// As [`Reader::read_node`], plus [`BomError::TypeMismatch`] when the
    /// record is not an array.
    pub fn read_array<R: Read>(
        &mut self,
        ctx: &mut LoadContext,
        input: &mut R,
    ) -> Result<Arc<ArrayNode>> {
        match self.read_node(ctx, input)?.1 {
            ResolvedNode::Array(array) => Ok(array),
            other => Err(BomError::type_mismatch("array", other.kind_name())),
        }
    }

    /// Reads one standalone value record.
    ///
    /// # Errors
    /// As [`Reader::read_node`], plus [`BomError::TypeMismatch`] when the
    /// record is not a value.
    pub fn read_value<R: Read>(&mut self, ctx: &mut LoadContext, input: &mut R) -> Result<ValueNode> {
        match self.read_node(ctx, input)?.1 {
            ResolvedNode::Value(value) => Ok(value),
            other => Err(BomError::type_mismatch("value", other.kind_name())),
        }
    }

    /// Reads one object record and builds its native object through
    /// `registry`.
    ///
    /// # Errors
    /// As [`Reader::read_object`], plus [`BomError::UnknownType`] when no
    /// marshaler handles the object's type and any marshaler failure.
    pub fn read_native<R: Read>(
        &mut self,
        ctx: &mut LoadContext,
        registry: &MarshalerRegistry,
        input: &mut R,
    ) -> Result<NativeHandle> {
        match self.read_node(ctx, input)? {
            (id, ResolvedNode::Object(object)) => registry.deserialize_with_id(id, &object, ctx),
            (_, other) => Err(BomError::type_mismatch("object", other.kind_name())),
        }
    }

    fn read_record<R: Read>(
        &mut self,
        ctx: &mut LoadContext,
        wire: &mut WireReader<'_, R>,
        depth: usize,
    ) -> Result<(ContentId, ResolvedNode)> {
        if depth > self.config.max_depth {
            return Err(BomError::malformed(format!(
                "records nested deeper than {}",
                self.config.max_depth
            )));
        }
        let kind = wire.read_u8()?;
        let id = wire.read_id()?;
        match kind {
            KIND_REF => {
                let node = ctx
                    .get(&id)
                    .cloned()
                    .ok_or(BomError::UnresolvedReference(id))?;
                self.stats.ref_records += 1;
                trace!(%id, "resolved ref");
                Ok((id, node))
            }
            KIND_VALUE => {
                let shape = Shape::from_tag(wire.read_u8()?)?;
                let node = match shape {
                    Shape::Object => {
                        ResolvedNode::Object(Arc::new(self.read_object_body(ctx, wire, depth)?))
                    }
                    Shape::Array => {
                        ResolvedNode::Array(Arc::new(self.read_array_body(ctx, wire, depth)?))
                    }
                    Shape::Blob => ResolvedNode::Value(read_value_body(wire)?),
                };
                self.stats.value_records += 1;
                trace!(%id, shape = shape.as_str(), "registered record");
                Ok((id, ctx.register(id, node)))
            }
            other => Err(BomError::malformed(format!(
                "invalid record kind {other:#04x}"
            ))),
        }
    }

    fn read_object_body<R: Read>(
        &mut self,
        ctx: &mut LoadContext,
        wire: &mut WireReader<'_, R>,
        depth: usize,
    ) -> Result<ObjectNode> {
        let mut object = ObjectNode::new(wire.read_type()?);
        let properties = wire.read_count("property")?;
        for _ in 0..properties {
            let name = wire.read_string()?;
            if object.has_property(&name) {
                return Err(BomError::malformed(format!(
                    "duplicate property `{name}` in {}",
                    object.type_tag().name()
                )));
            }
            let value = self.read_entry(ctx, wire, depth)?;
            object.set_property(name, value);
        }
        let children = wire.read_count("child")?;
        for _ in 0..children {
            match self.read_record(ctx, wire, depth + 1)?.1 {
                ResolvedNode::Object(child) => object.add_shared_child(child),
                other => return Err(BomError::type_mismatch("object", other.kind_name())),
            }
        }
        Ok(object)
    }

    fn read_array_body<R: Read>(
        &mut self,
        ctx: &mut LoadContext,
        wire: &mut WireReader<'_, R>,
        depth: usize,
    ) -> Result<ArrayNode> {
        let mut array = ArrayNode::new(wire.read_type()?);
        let elements = wire.read_count("element")?;
        for _ in 0..elements {
            let value = self.read_entry(ctx, wire, depth)?;
            array.push(value)?;
        }
        Ok(array)
    }

    fn read_entry<R: Read>(
        &mut self,
        ctx: &mut LoadContext,
        wire: &mut WireReader<'_, R>,
        depth: usize,
    ) -> Result<ValueNode> {
        match wire.read_u8()? {
            ENTRY_INLINE => {
                let value = read_value_body(wire)?;
                if value.is_embedded() {
                    return Err(BomError::malformed(format!(
                        "embedded {} stored inline",
                        value.ty().name()
                    )));
                }
                Ok(value)
            }
            ENTRY_RECORD => match self.read_record(ctx, wire, depth + 1)?.1 {
                ResolvedNode::Value(value) => Ok(value),
                other => Err(BomError::type_mismatch("value", other.kind_name())),
            },
            other => Err(BomError::malformed(format!("invalid entry tag {other:#04x}"))),
        }
    }
}

fn read_value_body<R: Read>(wire: &mut WireReader<'_, R>) -> Result<ValueNode> {
    let ty = wire.read_type()?;
    let bytes = wire.read_payload()?;
    ValueNode::new(ty, bytes)
}
