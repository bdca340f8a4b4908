// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Object nodes: the unit of one serializable thing.
//!
//! An object is a type tag, an ordered property bag and an ordered list of
//! child objects. Property order is part of the byte layout and of the content
//! id, so [`ObjectNode::set_property`] keeps the position of the first
//! insertion when a key is overwritten.

use std::io::Write;
use std::sync::Arc;

use crate::error::{BomError, Result};
use crate::handle::LiveRef;
use crate::id::ContentId;
use crate::types::TypeRef;
use crate::value::{BomValue, ValueNode};
use crate::writer::Writer;

/// Typed property bag with child objects.
#[derive(Debug, Clone)]
pub struct ObjectNode {
    type_tag: TypeRef,
    properties: Vec<(String, ValueNode)>,
    children: Vec<Arc<ObjectNode>>,
    live: Option<LiveRef>,
}

impl ObjectNode {
    /// Creates an empty object tagged `type_tag`.
    pub fn new(type_tag: TypeRef) -> Self {
        Self {
            type_tag,
            properties: Vec::new(),
            children: Vec::new(),
            live: None,
        }
    }

    /// Type tag.
    pub fn type_tag(&self) -> &TypeRef {
        &self.type_tag
    }

    /// Returns `true` when the tag is `name` or extends it.
    pub fn is_or_extends(&self, name: &str) -> bool {
        self.type_tag.is_or_extends(name)
    }

    /// Inserts or replaces a property, returning the previous value.
    ///
    /// A replaced key keeps its original position.
    pub fn set_property(&mut self, name: impl Into<String>, value: ValueNode) -> Option<ValueNode> {
        let name = name.into();
        if let Some(slot) = self.properties.iter_mut().find(|(k, _)| *k == name) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.properties.push((name, value));
        None
    }

    /// Looks up a property.
    pub fn get_property(&self, name: &str) -> Option<&ValueNode> {
        self.properties
            .iter()
            .find_map(|(k, v)| (k == name).then_some(v))
    }

    /// Returns `true` if the property is present.
    pub fn has_property(&self, name: &str) -> bool {
        self.get_property(name).is_some()
    }

    /// Removes a property; the remaining keys keep their order.
    pub fn remove_property(&mut self, name: &str) -> Option<ValueNode> {
        let index = self.properties.iter().position(|(k, _)| k == name)?;
        Some(self.properties.remove(index).1)
    }

    /// Properties in insertion order.
    pub fn properties(&self) -> impl ExactSizeIterator<Item = (&str, &ValueNode)> + '_ {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of properties.
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Appends a child object.
    pub fn add_child(&mut self, child: Self) {
        self.children.push(Arc::new(child));
    }

    /// Appends a child that is shared with other parents.
    pub fn add_shared_child(&mut self, child: Arc<Self>) {
        self.children.push(child);
    }

    /// Child objects in order.
    pub fn children(&self) -> &[Arc<Self>] {
        &self.children
    }

    /// Stores `value` under `name` using its canonical encoding.
    pub fn set<T: BomValue>(&mut self, name: impl Into<String>, value: &T) {
        self.set_property(name, value.to_value());
    }

    /// Reads a typed property; absence is `Ok(None)`.
    ///
    /// # Errors
    /// Returns [`BomError::TypeMismatch`] when the stored type is not
    /// compatible with `T`.
    pub fn get<T: BomValue>(&self, name: &str) -> Result<Option<T>> {
        self.get_property(name).map(T::from_value).transpose()
    }

    /// Reads a typed property that must be present.
    ///
    /// # Errors
    /// Returns [`BomError::InvalidNativeState`] when the property is missing,
    /// or the decoding error of [`ObjectNode::get`].
    pub fn require<T: BomValue>(&self, name: &str) -> Result<T> {
        self.get(name)?.ok_or_else(|| {
            BomError::InvalidNativeState(format!(
                "{} is missing required property `{name}`",
                self.type_tag.name()
            ))
        })
    }

    /// Cached native object, if one was attached.
    pub fn live(&self) -> Option<&LiveRef> {
        self.live.as_ref()
    }

    /// Attaches (or clears) the cached native object.
    pub fn set_live(&mut self, live: Option<LiveRef>) {
        self.live = live;
    }

    /// Content id of this object and everything below it.
    pub fn content_id(&self) -> ContentId {
        ContentId::of_object(self)
    }

    /// Serializes this object through `writer` using its default attributes.
    ///
    /// # Errors
    /// Propagates the first failure from the writer.
    pub fn visit<W: Write>(&self, writer: &mut Writer, out: &mut W) -> Result<ContentId> {
        writer.write_object(out, self)
    }
}

impl PartialEq for ObjectNode {
    fn eq(&self, other: &Self) -> bool {
        self.type_tag == other.type_tag
            && self.properties == other.properties
            && self.children == other.children
    }
}

impl Eq for ObjectNode {}
