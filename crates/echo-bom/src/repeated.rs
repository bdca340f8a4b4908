// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Repeated sub-structures inside one object.
//!
//! Two layouts are understood:
//!
//! * [`RepeatedLayout::Children`]: one child of type `sequence` carrying
//!   `name` and `size` properties, with the items as its children. This is
//!   what new data should use.
//! * [`RepeatedLayout::Dotted`]: flattened properties `name.size` and
//!   `name.<i>.<field>` on the owning object. Kept for older producers; items
//!   must be flat, non-empty property bags.
//!
//! Both store the count explicitly, and readers check it against what is
//! actually present.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{BomError, Result};
use crate::object::ObjectNode;
use crate::types::{builtin, TypeRef};

/// Encoding used for a repeated field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RepeatedLayout {
    /// A `sequence` child holding the items as children.
    #[default]
    Children,
    /// Flattened `name.size` / `name.<i>.<field>` properties.
    Dotted,
}

const NAME: &str = "name";
const SIZE: &str = "size";

fn count_u32(len: usize, name: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| BomError::InvalidNativeState(format!("too many `{name}` items: {len}")))
}

/// Writes `items` under `name` using `layout`.
///
/// # Errors
/// Returns [`BomError::InvalidNativeState`] if a dotted item has children or
/// no properties at all (the flattened layout cannot hold either), or the
/// item count does not fit a `u32`.
pub fn write_repeated(
    node: &mut ObjectNode,
    name: &str,
    items: impl IntoIterator<Item = ObjectNode>,
    layout: RepeatedLayout,
) -> Result<()> {
    match layout {
        RepeatedLayout::Children => {
            let mut sequence = ObjectNode::new(builtin::sequence());
            for item in items {
                sequence.add_child(item);
            }
            let size = count_u32(sequence.children().len(), name)?;
            sequence.set(NAME, &name.to_owned());
            sequence.set(SIZE, &size);
            node.add_child(sequence);
        }
        RepeatedLayout::Dotted => {
            let mut count = 0usize;
            for (index, item) in items.into_iter().enumerate() {
                if !item.children().is_empty() {
                    return Err(BomError::InvalidNativeState(format!(
                        "`{name}` item {index} has children; the dotted layout cannot hold them"
                    )));
                }
                if item.properties().next().is_none() {
                    return Err(BomError::InvalidNativeState(format!(
                        "`{name}` item {index} has no properties; the dotted layout cannot hold it"
                    )));
                }
                for (field, value) in item.properties() {
                    node.set_property(format!("{name}.{index}.{field}"), value.clone());
                }
                count = index + 1;
            }
            node.set(format!("{name}.{SIZE}"), &count_u32(count, name)?);
        }
    }
    Ok(())
}

/// Reports which layout (if any) holds `name` on `node`.
pub fn repeated_layout(node: &ObjectNode, name: &str) -> Option<RepeatedLayout> {
    if find_sequence(node, name).is_some() {
        Some(RepeatedLayout::Children)
    } else if node.has_property(&format!("{name}.{SIZE}")) {
        Some(RepeatedLayout::Dotted)
    } else {
        None
    }
}

fn find_sequence<'a>(node: &'a ObjectNode, name: &str) -> Option<&'a Arc<ObjectNode>> {
    node.children().iter().find(|child| {
        child.is_or_extends(builtin::SEQUENCE)
            && matches!(child.get::<String>(NAME), Ok(Some(n)) if n == name)
    })
}

/// Reads the items stored under `name`, in either layout.
///
/// A field that is absent in both layouts reads as empty. Dotted items are
/// rebuilt with `item_type` as their tag.
///
/// # Errors
/// Returns [`BomError::MalformedStream`] when the stored count disagrees
/// with the items present, and [`BomError::TypeMismatch`] when an item is not
/// an `item_type`.
pub fn read_repeated(
    node: &ObjectNode,
    name: &str,
    item_type: &TypeRef,
) -> Result<Vec<Arc<ObjectNode>>> {
    match repeated_layout(node, name) {
        Some(RepeatedLayout::Children) => read_children(node, name, item_type),
        Some(RepeatedLayout::Dotted) => read_dotted(node, name, item_type),
        None => Ok(Vec::new()),
    }
}

fn read_children(
    node: &ObjectNode,
    name: &str,
    item_type: &TypeRef,
) -> Result<Vec<Arc<ObjectNode>>> {
    let Some(sequence) = find_sequence(node, name) else {
        return Ok(Vec::new());
    };
    let size = sequence.require::<u32>(SIZE)? as usize;
    if size != sequence.children().len() {
        return Err(BomError::malformed(format!(
            "`{name}` declares {size} items but holds {}",
            sequence.children().len()
        )));
    }
    sequence
        .children()
        .iter()
        .map(|item| {
            if item.is_or_extends(item_type.name()) {
                Ok(Arc::clone(item))
            } else {
                Err(BomError::type_mismatch(item_type.name(), item.type_tag().name()))
            }
        })
        .collect()
}

fn read_dotted(node: &ObjectNode, name: &str, item_type: &TypeRef) -> Result<Vec<Arc<ObjectNode>>> {
    let size_key = format!("{name}.{SIZE}");
    let size = node.require::<u32>(&size_key)? as usize;
    let prefix = format!("{name}.");

    // Items are only built for indices that actually occur, so a bogus size
    // costs nothing.
    let mut items: BTreeMap<usize, ObjectNode> = BTreeMap::new();
    for (key, value) in node.properties() {
        if key == size_key {
            continue;
        }
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        let (index, field) = rest
            .split_once('.')
            .and_then(|(i, f)| Some((i.parse::<usize>().ok()?, f)))
            .ok_or_else(|| BomError::malformed(format!("unparseable repeated key `{key}`")))?;
        if index >= size {
            return Err(BomError::malformed(format!(
                "`{key}` is past the declared size {size}"
            )));
        }
        items
            .entry(index)
            .or_insert_with(|| ObjectNode::new(TypeRef::clone(item_type)))
            .set_property(field, value.clone());
    }
    if items.len() != size {
        return Err(BomError::malformed(format!(
            "`{name}` declares {size} items but holds {}",
            items.len()
        )));
    }
    Ok(items.into_values().map(Arc::new).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::TypeDescriptor;

    fn binding(slot: u32, stage: &str) -> ObjectNode {
        let mut node = ObjectNode::new(TypeDescriptor::object_type("Binding"));
        node.set("slot", &slot);
        node.set("stage", &stage.to_owned());
        node
    }

    fn bindings() -> Vec<ObjectNode> {
        vec![binding(0, "vertex"), binding(1, "fragment")]
    }

    #[test]
    fn both_layouts_read_back_the_same_items() {
        let ty = TypeDescriptor::object_type("Binding");
        for layout in [RepeatedLayout::Children, RepeatedLayout::Dotted] {
            let mut shader = ObjectNode::new(TypeDescriptor::object_type("Shader"));
            write_repeated(&mut shader, "bindings", bindings(), layout).unwrap();
            assert_eq!(repeated_layout(&shader, "bindings"), Some(layout));

            let items = read_repeated(&shader, "bindings", &ty).unwrap();
            let items: Vec<ObjectNode> = items.iter().map(|i| (**i).clone()).collect();
            assert_eq!(items, bindings());
        }
    }

    #[test]
    fn dotted_layout_uses_flat_property_names() {
        let mut shader = ObjectNode::new(TypeDescriptor::object_type("Shader"));
        write_repeated(&mut shader, "bindings", bindings(), RepeatedLayout::Dotted).unwrap();
        let names: Vec<_> = shader.properties().map(|(k, _)| k.to_owned()).collect();
        assert_eq!(
            names,
            [
                "bindings.0.slot",
                "bindings.0.stage",
                "bindings.1.slot",
                "bindings.1.stage",
                "bindings.size"
            ]
        );
    }

    #[test]
    fn absent_fields_read_as_empty() {
        let shader = ObjectNode::new(TypeDescriptor::object_type("Shader"));
        let ty = TypeDescriptor::object_type("Binding");
        assert!(read_repeated(&shader, "bindings", &ty).unwrap().is_empty());
        assert_eq!(repeated_layout(&shader, "bindings"), None);
    }

    #[test]
    fn count_mismatches_are_malformed() {
        let ty = TypeDescriptor::object_type("Binding");
        let mut shader = ObjectNode::new(TypeDescriptor::object_type("Shader"));
        write_repeated(&mut shader, "bindings", bindings(), RepeatedLayout::Dotted).unwrap();
        shader.set("bindings.size", &1u32);
        assert!(matches!(
            read_repeated(&shader, "bindings", &ty),
            Err(BomError::MalformedStream(_))
        ));

        let mut sequence = ObjectNode::new(builtin::sequence());
        sequence.set(NAME, &"bindings".to_owned());
        sequence.set(SIZE, &3u32);
        sequence.add_child(binding(0, "vertex"));
        let mut shader = ObjectNode::new(TypeDescriptor::object_type("Shader"));
        shader.add_child(sequence);
        assert!(matches!(
            read_repeated(&shader, "bindings", &ty),
            Err(BomError::MalformedStream(_))
        ));
    }

    #[test]
    fn item_types_are_checked() {
        let mut shader = ObjectNode::new(TypeDescriptor::object_type("Shader"));
        write_repeated(&mut shader, "bindings", bindings(), RepeatedLayout::Children).unwrap();
        let err = read_repeated(&shader, "bindings", &TypeDescriptor::object_type("Sampler"))
            .unwrap_err();
        assert!(matches!(err, BomError::TypeMismatch { .. }));
    }

    #[test]
    fn dotted_items_cannot_have_children() {
        let mut item = binding(0, "vertex");
        item.add_child(binding(1, "nested"));
        let mut shader = ObjectNode::new(TypeDescriptor::object_type("Shader"));
        let err = write_repeated(&mut shader, "bindings", [item], RepeatedLayout::Dotted)
            .unwrap_err();
        assert!(matches!(err, BomError::InvalidNativeState(_)));
    }

    #[test]
    fn oversized_dotted_counts_are_malformed() {
        let ty = TypeDescriptor::object_type("Binding");
        let mut shader = ObjectNode::new(TypeDescriptor::object_type("Shader"));
        shader.set("bindings.size", &u32::MAX);
        let err = read_repeated(&shader, "bindings", &ty).unwrap_err();
        assert!(matches!(err, BomError::MalformedStream(_)), "{err}");

        write_repeated(&mut shader, "bindings", bindings(), RepeatedLayout::Dotted).unwrap();
        shader.set("bindings.size", &u32::MAX);
        let err = read_repeated(&shader, "bindings", &ty).unwrap_err();
        assert!(err.to_string().contains("holds 2"), "{err}");
    }

    #[test]
    fn dotted_items_need_a_property() {
        let empty = ObjectNode::new(TypeDescriptor::object_type("Binding"));
        let mut shader = ObjectNode::new(TypeDescriptor::object_type("Shader"));
        let err = write_repeated(
            &mut shader,
            "bindings",
            [binding(0, "vertex"), empty],
            RepeatedLayout::Dotted,
        )
        .unwrap_err();
        assert!(matches!(err, BomError::InvalidNativeState(_)));
    }
}
