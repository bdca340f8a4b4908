// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Type descriptors: the names every value, object and array is tagged with.
//!
//! A descriptor names a kind of value, declares a fixed byte size (or none, for
//! unbounded payloads), and optionally points at a parent descriptor. The
//! parent link forms an extension hierarchy used when resolving marshalers: a
//! `Meters` type that extends `f32` can be read anywhere an `f32` is expected.
//!
//! Parents are always existing descriptors, so chains are finite and acyclic
//! by construction.

use std::borrow::Cow;
use std::sync::Arc;

use crate::error::{BomError, Result};

/// Shared handle to an immutable descriptor.
pub type TypeRef = Arc<TypeDescriptor>;

/// Names a kind of value, its byte bound, and its parent type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    name: Cow<'static, str>,
    size: Option<u32>,
    parent: Option<TypeRef>,
}

impl TypeDescriptor {
    /// Builds a descriptor from its parts.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        size: Option<u32>,
        parent: Option<TypeRef>,
    ) -> TypeRef {
        Arc::new(Self {
            name: name.into(),
            size,
            parent,
        })
    }

    /// Builds a root descriptor whose payloads hold at most `size` bytes.
    pub fn bounded(name: impl Into<Cow<'static, str>>, size: u32) -> TypeRef {
        Self::new(name, Some(size), None)
    }

    /// Builds a root descriptor with no byte bound.
    pub fn unbounded(name: impl Into<Cow<'static, str>>) -> TypeRef {
        Self::new(name, None, None)
    }

    /// Builds a descriptor extending `parent`; the size bound is inherited.
    pub fn extending(name: impl Into<Cow<'static, str>>, parent: &TypeRef) -> TypeRef {
        Self::new(name, parent.size, Some(Arc::clone(parent)))
    }

    /// Builds an object type tag (a descriptor extending the builtin `object`).
    pub fn object_type(name: impl Into<Cow<'static, str>>) -> TypeRef {
        Self::extending(name, &builtin::object())
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared byte bound, `None` when unbounded.
    pub fn size(&self) -> Option<u32> {
        self.size
    }

    /// Parent descriptor, if this type extends another.
    pub fn parent(&self) -> Option<&TypeRef> {
        self.parent.as_ref()
    }

    /// Returns `true` when payloads of this type have no byte bound.
    pub fn is_unbounded(&self) -> bool {
        self.size.is_none()
    }

    /// Returns `true` when this type is `name` or has `name` in its parent chain.
    pub fn is_or_extends(&self, name: &str) -> bool {
        self.ancestors().any(|ty| ty.name() == name)
    }

    /// Iterates this descriptor followed by each parent up to the root.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Number of descriptors in the chain, including this one.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Checks that a payload of `len` bytes fits this type.
    ///
    /// # Errors
    /// Returns [`BomError::SizeMismatch`] when the type is bounded and `len`
    /// exceeds the bound.
    pub fn check_len(&self, len: usize) -> Result<()> {
        match self.size {
            Some(bound) if len > bound as usize => Err(BomError::SizeMismatch {
                type_name: self.name.to_string(),
                expected: bound as usize,
                actual: len,
            }),
            _ => Ok(()),
        }
    }

    /// Returns the nearest builtin descriptor name in the chain, if any.
    pub fn builtin_base(&self) -> Option<&'static str> {
        self.ancestors()
            .find_map(|ty| builtin::NAMES.iter().copied().find(|n| *n == ty.name()))
    }

    /// Returns `true` for types whose payload is an embedded object or array
    /// sub-document.
    pub fn is_embedded_document(&self) -> bool {
        self.is_or_extends(builtin::OBJECT) || self.is_or_extends(builtin::ARRAY)
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if let Some(parent) = &self.parent {
            write!(f, " : {parent}")?;
        }
        Ok(())
    }
}

/// Iterator over a descriptor and its parents.
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    next: Option<&'a TypeDescriptor>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a TypeDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

/// Builtin descriptors, created once per process.
pub mod builtin {
    use std::sync::LazyLock;

    use super::{TypeDescriptor, TypeRef};

    /// Name of the zero-sized null type.
    pub const NULL: &str = "null";
    /// Name of the boolean type.
    pub const BOOL: &str = "bool";
    /// Name of the signed 8-bit integer type.
    pub const I8: &str = "i8";
    /// Name of the unsigned 8-bit integer type.
    pub const U8: &str = "u8";
    /// Name of the signed 16-bit integer type.
    pub const I16: &str = "i16";
    /// Name of the unsigned 16-bit integer type.
    pub const U16: &str = "u16";
    /// Name of the signed 32-bit integer type.
    pub const I32: &str = "i32";
    /// Name of the unsigned 32-bit integer type.
    pub const U32: &str = "u32";
    /// Name of the signed 64-bit integer type.
    pub const I64: &str = "i64";
    /// Name of the unsigned 64-bit integer type.
    pub const U64: &str = "u64";
    /// Name of the 32-bit float type.
    pub const F32: &str = "f32";
    /// Name of the 64-bit float type.
    pub const F64: &str = "f64";
    /// Name of the UTF-8 string type.
    pub const STRING: &str = "string";
    /// Name of the opaque byte-blob type.
    pub const BYTES: &str = "bytes";
    /// Name of the embedded object sub-document type.
    pub const OBJECT: &str = "object";
    /// Name of the embedded array sub-document type.
    pub const ARRAY: &str = "array";
    /// Name of the container type used by the indexed-children repeated layout.
    pub const SEQUENCE: &str = "sequence";

    /// Every builtin name, roots first.
    pub const NAMES: [&str; 17] = [
        NULL, BOOL, I8, U8, I16, U16, I32, U32, I64, U64, F32, F64, STRING, BYTES, OBJECT, ARRAY,
        SEQUENCE,
    ];

    macro_rules! builtin_types {
        ($($(#[$doc:meta])* $fn_name:ident, $static_name:ident => $init:expr;)*) => {
            $(
                static $static_name: LazyLock<TypeRef> = LazyLock::new(|| $init);

                $(#[$doc])*
                pub fn $fn_name() -> TypeRef {
                    TypeRef::clone(&$static_name)
                }
            )*
        };
    }

    builtin_types! {
        /// `null`: zero-sized.
        null, NULL_TYPE => TypeDescriptor::bounded(NULL, 0);
        /// `bool`: one byte, `0` or `1`.
        bool, BOOL_TYPE => TypeDescriptor::bounded(BOOL, 1);
        /// `i8`.
        i8, I8_TYPE => TypeDescriptor::bounded(I8, 1);
        /// `u8`.
        u8, U8_TYPE => TypeDescriptor::bounded(U8, 1);
        /// `i16`, little-endian.
        i16, I16_TYPE => TypeDescriptor::bounded(I16, 2);
        /// `u16`, little-endian.
        u16, U16_TYPE => TypeDescriptor::bounded(U16, 2);
        /// `i32`, little-endian.
        i32, I32_TYPE => TypeDescriptor::bounded(I32, 4);
        /// `u32`, little-endian.
        u32, U32_TYPE => TypeDescriptor::bounded(U32, 4);
        /// `i64`, little-endian.
        i64, I64_TYPE => TypeDescriptor::bounded(I64, 8);
        /// `u64`, little-endian.
        u64, U64_TYPE => TypeDescriptor::bounded(U64, 8);
        /// `f32`, IEEE-754 little-endian.
        f32, F32_TYPE => TypeDescriptor::bounded(F32, 4);
        /// `f64`, IEEE-754 little-endian.
        f64, F64_TYPE => TypeDescriptor::bounded(F64, 8);
        /// `string`: unbounded UTF-8.
        string, STRING_TYPE => TypeDescriptor::unbounded(STRING);
        /// `bytes`: unbounded opaque payload.
        bytes, BYTES_TYPE => TypeDescriptor::unbounded(BYTES);
        /// `object`: an embedded object sub-document.
        object, OBJECT_TYPE => TypeDescriptor::unbounded(OBJECT);
        /// `array`: an embedded array sub-document.
        array, ARRAY_TYPE => TypeDescriptor::unbounded(ARRAY);
        /// `sequence`: container object for indexed repeated children.
        sequence, SEQUENCE_TYPE => TypeDescriptor::extending(SEQUENCE, &object());
    }

    /// Looks up a builtin descriptor by name.
    pub fn by_name(name: &str) -> Option<TypeRef> {
        let ty = match name {
            NULL => null(),
            BOOL => bool(),
            I8 => i8(),
            U8 => u8(),
            I16 => i16(),
            U16 => u16(),
            I32 => i32(),
            U32 => u32(),
            I64 => i64(),
            U64 => u64(),
            F32 => f32(),
            F64 => f64(),
            STRING => string(),
            BYTES => bytes(),
            OBJECT => object(),
            ARRAY => array(),
            SEQUENCE => sequence(),
            _ => return None,
        };
        Some(ty)
    }
}
