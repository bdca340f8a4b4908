// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Content ids: deterministic structural hashes of nodes.
//!
//! A [`ContentId`] is the first 128 bits of a domain-separated BLAKE3 digest.
//! Values hash their type, byte length and bytes. Objects and arrays hash a
//! Merkle summary: their type, then each property name and value digest (or
//! element digest), then each child's id. Two structurally equal nodes always
//! hash equal; the writer's dedup table and the reader's load context are both
//! keyed by this id, never by pointer identity.

use blake3::Hasher;

use crate::array::ArrayNode;
use crate::object::ObjectNode;
use crate::types::TypeDescriptor;
use crate::value::ValueNode;

/// 128-bit content hash used as dedup key and REF target.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ContentId(pub [u8; 16]);

impl ContentId {
    /// Width of an id on the wire.
    pub const LEN: usize = 16;

    /// View the id as a byte slice.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Hashes a value node.
    pub fn of_value(value: &ValueNode) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"bom:value\0");
        hash_value_body(&mut hasher, value);
        finish(&hasher)
    }

    /// Hashes an object node and, recursively, its properties and children.
    pub fn of_object(object: &ObjectNode) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"bom:object\0");
        hash_type(&mut hasher, object.type_tag());
        hasher.update(&(object.property_count() as u64).to_le_bytes());
        for (name, value) in object.properties() {
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hash_entry(&mut hasher, value);
        }
        hasher.update(&(object.children().len() as u64).to_le_bytes());
        for child in object.children() {
            hasher.update(ContentId::of_object(child).as_bytes());
        }
        finish(&hasher)
    }

    /// Hashes an array node and its elements.
    pub fn of_array(array: &ArrayNode) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"bom:array\0");
        hash_type(&mut hasher, array.element_type());
        hasher.update(&(array.len() as u64).to_le_bytes());
        for element in array.iter() {
            hash_entry(&mut hasher, element);
        }
        finish(&hasher)
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn finish(hasher: &Hasher) -> ContentId {
    let digest = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest.as_bytes()[..16]);
    ContentId(out)
}

/// Embedded documents contribute their own id; inline values their bytes.
fn hash_entry(hasher: &mut Hasher, value: &ValueNode) {
    if value.is_embedded() {
        hasher.update(&[1]);
        hasher.update(ContentId::of_value(value).as_bytes());
    } else {
        hasher.update(&[0]);
        hash_value_body(hasher, value);
    }
}

fn hash_value_body(hasher: &mut Hasher, value: &ValueNode) {
    hash_type(hasher, value.ty());
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.bytes());
}

fn hash_type(hasher: &mut Hasher, ty: &TypeDescriptor) {
    for link in ty.ancestors() {
        hasher.update(&(link.name().len() as u64).to_le_bytes());
        hasher.update(link.name().as_bytes());
        match link.size() {
            Some(size) => {
                hasher.update(&[1]);
                hasher.update(&size.to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }
    hasher.update(&[0xff]);
}
