// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Array nodes: homogeneous ordered sequences of values.

use std::io::Write;

use crate::error::{BomError, Result};
use crate::id::ContentId;
use crate::types::TypeRef;
use crate::value::ValueNode;
use crate::writer::Writer;

/// Ordered values whose types all are-or-extend `element_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayNode {
    element_type: TypeRef,
    elements: Vec<ValueNode>,
}

impl ArrayNode {
    /// Creates an empty array of `element_type`.
    pub fn new(element_type: TypeRef) -> Self {
        Self {
            element_type,
            elements: Vec::new(),
        }
    }

    /// Builds an array from `values`, checking each one.
    ///
    /// # Errors
    /// Returns [`BomError::TypeMismatch`] on the first incompatible value.
    pub fn from_values(
        element_type: TypeRef,
        values: impl IntoIterator<Item = ValueNode>,
    ) -> Result<Self> {
        let mut array = Self::new(element_type);
        for value in values {
            array.push(value)?;
        }
        Ok(array)
    }

    /// Element type.
    pub fn element_type(&self) -> &TypeRef {
        &self.element_type
    }

    /// Appends `value`.
    ///
    /// # Errors
    /// Returns [`BomError::TypeMismatch`] unless the value's type is or
    /// extends the element type.
    pub fn push(&mut self, value: ValueNode) -> Result<()> {
        if !value.is_or_extends(self.element_type.name()) {
            return Err(BomError::type_mismatch(
                self.element_type.name(),
                value.ty().name(),
            ));
        }
        self.elements.push(value);
        Ok(())
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> Option<&ValueNode> {
        self.elements.get(index)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` when there are no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ValueNode> {
        self.elements.iter()
    }

    /// Content id of this array.
    pub fn content_id(&self) -> ContentId {
        ContentId::of_array(self)
    }

    /// Serializes this array through `writer`.
    ///
    /// # Errors
    /// Propagates the first failure from the writer.
    pub fn visit<W: Write>(&self, writer: &mut Writer, out: &mut W) -> Result<ContentId> {
        writer.write_array(out, self)
    }
}

impl<'a> IntoIterator for &'a ArrayNode {
    type Item = &'a ValueNode;
    type IntoIter = std::slice::Iter<'a, ValueNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{builtin, TypeDescriptor};

    #[test]
    fn push_type_checks_elements() {
        let mut arr = ArrayNode::new(builtin::f32());
        arr.push(ValueNode::scalar(1.0f32)).unwrap();
        let err = arr.push(ValueNode::scalar(1u32)).unwrap_err();
        assert_eq!(
            err,
            BomError::TypeMismatch {
                expected: "f32".into(),
                found: "u32".into()
            }
        );
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn subtypes_are_accepted() {
        let meters = TypeDescriptor::extending("Meters", &builtin::f32());
        let value = ValueNode::new(meters, 3.0f32.to_le_bytes().to_vec()).unwrap();
        let arr = ArrayNode::from_values(builtin::f32(), [value.clone()]).unwrap();
        assert_eq!(arr.get(0), Some(&value));
        assert!(arr.get(1).is_none());
        assert!(ArrayNode::from_values(builtin::u8(), [value]).is_err());
    }
}
