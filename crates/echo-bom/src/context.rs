// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Load context: per-read-session table of resolved records.
//!
//! Every VALUE record the reader finishes is registered here under its id, and
//! every REF record is answered from here. Entries live for the whole session,
//! so all references to one id resolve to the same `Arc`. Marshalers cache the
//! native objects they build alongside.
//!
//! The context also carries the session's [`ReaderConfig`] and the number of
//! embedded values currently being decoded, so sub-streams parsed later
//! through [`ValueNode::read_object`] stay inside the same depth budget.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::array::ArrayNode;
use crate::config::ReaderConfig;
use crate::error::{BomError, Result};
use crate::handle::NativeHandle;
use crate::id::ContentId;
use crate::object::ObjectNode;
use crate::value::ValueNode;

/// A record materialized by the reader.
#[derive(Debug, Clone)]
pub enum ResolvedNode {
    /// Object record.
    Object(Arc<ObjectNode>),
    /// Array record.
    Array(Arc<ArrayNode>),
    /// Standalone or embedded value record.
    Value(ValueNode),
}

impl ResolvedNode {
    /// Lowercase shape name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Value(_) => "value",
        }
    }

    /// The object, if this is one.
    pub fn as_object(&self) -> Option<&Arc<ObjectNode>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The array, if this is one.
    pub fn as_array(&self) -> Option<&Arc<ArrayNode>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The value, if this is one.
    pub fn as_value(&self) -> Option<&ValueNode> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Session state shared by every reader pass over one document.
#[derive(Debug, Default)]
pub struct LoadContext {
    nodes: FxHashMap<ContentId, ResolvedNode>,
    natives: FxHashMap<ContentId, NativeHandle>,
    config: ReaderConfig,
    depth: usize,
}

impl LoadContext {
    /// Creates an empty context with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty context whose embedded reads use `config`.
    ///
    /// A [`Reader`](crate::Reader) starting a top-level read replaces these
    /// limits with its own.
    pub fn with_config(config: ReaderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Limits applied to embedded sub-streams.
    pub fn reader_config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Embedded values currently being decoded.
    pub fn embedded_depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn set_reader_config(&mut self, config: ReaderConfig) {
        self.config = config;
    }

    /// Runs `f` one embedded level deeper.
    ///
    /// The level counts against `max_depth` until `f` returns, whether it
    /// succeeds or not.
    pub(crate) fn descend<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.config.max_depth {
            return Err(BomError::malformed(format!(
                "embedded values nested deeper than {}",
                self.config.max_depth
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Number of distinct resolved records.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct resolved object records.
    pub fn object_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| matches!(n, ResolvedNode::Object(_)))
            .count()
    }

    /// Returns `true` if `id` has been resolved.
    pub fn contains(&self, id: &ContentId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Resolved record for `id`.
    pub fn get(&self, id: &ContentId) -> Option<&ResolvedNode> {
        self.nodes.get(id)
    }

    /// Resolved object for `id`.
    pub fn object(&self, id: &ContentId) -> Option<&Arc<ObjectNode>> {
        self.get(id).and_then(ResolvedNode::as_object)
    }

    /// Ids resolved so far, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &ContentId> + '_ {
        self.nodes.keys()
    }

    /// Registers `node` under `id` and returns the canonical entry.
    ///
    /// The first registration wins, so a record that appears twice (dedup off)
    /// still resolves to one shared node.
    pub(crate) fn register(&mut self, id: ContentId, node: ResolvedNode) -> ResolvedNode {
        self.nodes.entry(id).or_insert(node).clone()
    }

    /// Native object built from `id`, if a marshaler already ran for it.
    pub fn native(&self, id: &ContentId) -> Option<&NativeHandle> {
        self.natives.get(id)
    }

    /// Caches the native object built from `id`.
    pub fn set_native(&mut self, id: ContentId, handle: NativeHandle) {
        self.natives.insert(id, handle);
    }

    /// Number of cached native objects.
    pub fn native_count(&self) -> usize {
        self.natives.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::TypeDescriptor;

    #[test]
    fn first_registration_wins() {
        let mut ctx = LoadContext::new();
        let id = ContentId([1; 16]);
        let first = Arc::new(ObjectNode::new(TypeDescriptor::object_type("A")));
        let second = Arc::new(ObjectNode::new(TypeDescriptor::object_type("A")));

        ctx.register(id, ResolvedNode::Object(first.clone()));
        let canonical = ctx.register(id, ResolvedNode::Object(second));
        assert!(Arc::ptr_eq(canonical.as_object().unwrap(), &first));
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.object_count(), 1);
    }

    #[test]
    fn natives_are_cached_per_id() {
        let mut ctx = LoadContext::new();
        let id = ContentId([2; 16]);
        assert!(ctx.native(&id).is_none());
        ctx.set_native(id, NativeHandle::new(5u32));
        assert_eq!(ctx.native(&id).unwrap().downcast_ref::<u32>(), Some(&5));
        assert_eq!(ctx.native_count(), 1);
        assert!(ctx.is_empty());
    }

    #[test]
    fn descending_is_bounded_and_unwinds() {
        let mut ctx = LoadContext::with_config(ReaderConfig {
            max_depth: 2,
            ..ReaderConfig::default()
        });
        let reached = ctx
            .descend(|ctx| ctx.descend(|ctx| Ok(ctx.embedded_depth())))
            .unwrap();
        assert_eq!(reached, 2);

        let err = ctx
            .descend(|ctx| ctx.descend(|ctx| ctx.descend(|_| Ok(()))))
            .unwrap_err();
        assert!(matches!(err, BomError::MalformedStream(_)));
        assert_eq!(ctx.embedded_depth(), 0);
    }
}
