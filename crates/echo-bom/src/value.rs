// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Value nodes: a type descriptor plus the raw bytes of one datum.
//!
//! Scalars are stored little-endian. A value whose type is (or extends) the
//! builtin `object` or `array` carries a complete, self-contained BOM stream in
//! its bytes; [`ValueNode::read_object`] / [`ValueNode::read_array`] parse it
//! with a fresh [`Reader`] that shares the caller's [`LoadContext`].

use std::sync::Arc;

use bytes::Bytes;

use crate::array::ArrayNode;
use crate::config::WriterConfig;
use crate::context::LoadContext;
use crate::error::{BomError, Result};
use crate::handle::LiveRef;
use crate::id::ContentId;
use crate::object::ObjectNode;
use crate::reader::Reader;
use crate::types::{builtin, TypeRef};
use crate::writer::Writer;

/// A typed, byte-backed datum.
///
/// Equality and hashing cover the type and the bytes; the live reference is a
/// cache and never participates.
#[derive(Debug, Clone)]
pub struct ValueNode {
    ty: TypeRef,
    bytes: Bytes,
    live: Option<LiveRef>,
}

impl ValueNode {
    /// Wraps `bytes` as a value of type `ty`.
    ///
    /// # Errors
    /// Returns [`BomError::SizeMismatch`] if `ty` is bounded and `bytes` is
    /// longer than the bound.
    pub fn new(ty: TypeRef, bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        ty.check_len(bytes.len())?;
        Ok(Self {
            ty,
            bytes,
            live: None,
        })
    }

    /// Encodes a scalar under its builtin type.
    pub fn scalar<T: Scalar>(value: T) -> Self {
        Self {
            ty: T::descriptor(),
            bytes: Bytes::copy_from_slice(value.to_le_repr().as_ref()),
            live: None,
        }
    }

    /// Encodes a UTF-8 string under the builtin `string` type.
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            ty: builtin::string(),
            bytes: Bytes::from(value.into().into_bytes()),
            live: None,
        }
    }

    /// Wraps an opaque payload under the builtin `bytes` type.
    pub fn blob(value: impl Into<Bytes>) -> Self {
        Self {
            ty: builtin::bytes(),
            bytes: value.into(),
            live: None,
        }
    }

    /// The zero-sized `null` value.
    pub fn null() -> Self {
        Self {
            ty: builtin::null(),
            bytes: Bytes::new(),
            live: None,
        }
    }

    /// Serializes `object` through a throwaway [`Writer`] and wraps the stream.
    ///
    /// The value is typed with the object's tag when that tag extends `object`,
    /// and with the builtin `object` otherwise. With `keep_live`, the object's
    /// live reference is carried over.
    ///
    /// # Errors
    /// Propagates any failure from writing the object.
    pub fn from_object(object: &ObjectNode, keep_live: bool) -> Result<Self> {
        let mut buf = Vec::new();
        Writer::new(WriterConfig::default()).write_object(&mut buf, object)?;
        let ty = if object.type_tag().is_or_extends(builtin::OBJECT) {
            TypeRef::clone(object.type_tag())
        } else {
            builtin::object()
        };
        Ok(Self {
            ty,
            bytes: Bytes::from(buf),
            live: if keep_live { object.live().cloned() } else { None },
        })
    }

    /// Serializes `array` through a throwaway [`Writer`] and wraps the stream.
    ///
    /// # Errors
    /// Propagates any failure from writing the array.
    pub fn from_array(array: &ArrayNode) -> Result<Self> {
        let mut buf = Vec::new();
        Writer::new(WriterConfig::default()).write_array(&mut buf, array)?;
        Ok(Self {
            ty: builtin::array(),
            bytes: Bytes::from(buf),
            live: None,
        })
    }

    /// Type descriptor of this value.
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    /// Raw payload bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap shared copy of the payload.
    pub fn payload(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns `true` when the payload is an embedded object or array stream.
    pub fn is_embedded(&self) -> bool {
        self.ty.is_embedded_document()
    }

    /// Returns `true` when the type is `name` or extends it.
    pub fn is_or_extends(&self, name: &str) -> bool {
        self.ty.is_or_extends(name)
    }

    /// Replaces the payload, keeping the type.
    ///
    /// # Errors
    /// Returns [`BomError::SizeMismatch`] when the new payload exceeds the
    /// type's bound; the value is left untouched.
    pub fn set_bytes(&mut self, bytes: impl Into<Bytes>) -> Result<()> {
        let bytes = bytes.into();
        self.ty.check_len(bytes.len())?;
        self.bytes = bytes;
        Ok(())
    }

    /// Replaces the payload with the encoding of `value`, keeping the type.
    ///
    /// # Errors
    /// Returns [`BomError::SizeMismatch`] when `T` does not fit the type.
    pub fn set_scalar<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.set_bytes(Bytes::copy_from_slice(value.to_le_repr().as_ref()))
    }

    /// Decodes the leading bytes as a `T`.
    ///
    /// # Errors
    /// Returns [`BomError::SizeMismatch`] if `T` is wider than the payload or
    /// than the type's declared size.
    pub fn read_scalar<T: Scalar>(&self) -> Result<T> {
        let mut repr = T::Repr::default();
        let width = repr.as_ref().len();
        let available = match self.ty.size() {
            Some(bound) => self.bytes.len().min(bound as usize),
            None => self.bytes.len(),
        };
        if width > available {
            return Err(BomError::SizeMismatch {
                type_name: self.ty.name().to_owned(),
                expected: width,
                actual: available,
            });
        }
        repr.as_mut().copy_from_slice(&self.bytes[..width]);
        Ok(T::from_le_repr(repr))
    }

    /// Returns up to `n` leading bytes; never reads past the end.
    pub fn read_bytes(&self, n: usize) -> Bytes {
        self.bytes.slice(..n.min(self.bytes.len()))
    }

    /// Decodes the payload as UTF-8.
    ///
    /// # Errors
    /// Returns [`BomError::MalformedStream`] for invalid UTF-8.
    pub fn read_string(&self) -> Result<String> {
        std::str::from_utf8(&self.bytes)
            .map(str::to_owned)
            .map_err(|_| BomError::malformed(format!("{} payload is not utf-8", self.ty.name())))
    }

    /// Parses the embedded object stream, sharing `ctx` for reference
    /// resolution.
    ///
    /// The sub-stream is read with the context's limits, one embedded level
    /// below whatever `ctx` is already decoding.
    ///
    /// # Errors
    /// Returns [`BomError::TypeMismatch`] if the value is not an embedded
    /// object, [`BomError::MalformedStream`] past `max_depth`, or any error
    /// from reading the sub-stream.
    pub fn read_object(&self, ctx: &mut LoadContext) -> Result<Arc<ObjectNode>> {
        ctx.descend(|ctx| self.read_object_here(ctx))
    }

    /// Parses the embedded array stream, sharing `ctx` for reference
    /// resolution.
    ///
    /// # Errors
    /// Returns [`BomError::TypeMismatch`] if the value is not an embedded
    /// array, [`BomError::MalformedStream`] past `max_depth`, or any error
    /// from reading the sub-stream.
    pub fn read_array(&self, ctx: &mut LoadContext) -> Result<Arc<ArrayNode>> {
        ctx.descend(|ctx| self.read_array_here(ctx))
    }

    /// [`ValueNode::read_object`] at the current embedded level; callers
    /// descend themselves.
    pub(crate) fn read_object_here(&self, ctx: &mut LoadContext) -> Result<Arc<ObjectNode>> {
        if !self.ty.is_or_extends(builtin::OBJECT) {
            return Err(BomError::type_mismatch(builtin::OBJECT, self.ty.name()));
        }
        let mut input = self.bytes.as_ref();
        Reader::new(*ctx.reader_config()).read_object(ctx, &mut input)
    }

    pub(crate) fn read_array_here(&self, ctx: &mut LoadContext) -> Result<Arc<ArrayNode>> {
        if !self.ty.is_or_extends(builtin::ARRAY) {
            return Err(BomError::type_mismatch(builtin::ARRAY, self.ty.name()));
        }
        let mut input = self.bytes.as_ref();
        Reader::new(*ctx.reader_config()).read_array(ctx, &mut input)
    }

    /// Cached native object, if one was attached.
    pub fn live(&self) -> Option<&LiveRef> {
        self.live.as_ref()
    }

    /// Attaches (or clears) the cached native object.
    pub fn set_live(&mut self, live: Option<LiveRef>) {
        self.live = live;
    }

    /// Content id of this value.
    pub fn content_id(&self) -> ContentId {
        ContentId::of_value(self)
    }
}

impl PartialEq for ValueNode {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.bytes == other.bytes
    }
}

impl Eq for ValueNode {}

impl std::hash::Hash for ValueNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ty.hash(state);
        self.bytes.hash(state);
    }
}

/// Fixed-width little-endian scalar.
pub trait Scalar: Copy + Send + Sync + 'static {
    /// Byte representation, `[u8; N]`.
    type Repr: AsRef<[u8]> + AsMut<[u8]> + Default;

    /// Builtin descriptor for this scalar.
    fn descriptor() -> TypeRef;

    /// Little-endian encoding.
    fn to_le_repr(self) -> Self::Repr;

    /// Decodes from little-endian bytes.
    fn from_le_repr(repr: Self::Repr) -> Self;
}

impl Scalar for bool {
    type Repr = [u8; 1];

    fn descriptor() -> TypeRef {
        builtin::bool()
    }

    fn to_le_repr(self) -> Self::Repr {
        [u8::from(self)]
    }

    fn from_le_repr(repr: Self::Repr) -> Self {
        repr[0] != 0
    }
}

macro_rules! impl_scalar {
    ($($ty:ty => $builtin:ident),* $(,)?) => {
        $(
            impl Scalar for $ty {
                type Repr = [u8; std::mem::size_of::<$ty>()];

                fn descriptor() -> TypeRef {
                    builtin::$builtin()
                }

                fn to_le_repr(self) -> Self::Repr {
                    self.to_le_bytes()
                }

                fn from_le_repr(repr: Self::Repr) -> Self {
                    <$ty>::from_le_bytes(repr)
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => i8,
    u8 => u8,
    i16 => i16,
    u16 => u16,
    i32 => i32,
    u32 => u32,
    i64 => i64,
    u64 => u64,
    f32 => f32,
    f64 => f64,
}

/// Native types with a canonical value encoding.
///
/// Marshalers use this through [`ObjectNode::set`] and [`ObjectNode::get`] so
/// they never touch raw bytes.
pub trait BomValue: Sized {
    /// Builtin descriptor values of this type are tagged with.
    fn descriptor() -> TypeRef;

    /// Encodes `self` as a value node.
    fn to_value(&self) -> ValueNode;

    /// Decodes a value node.
    ///
    /// # Errors
    /// Returns [`BomError::TypeMismatch`] unless the node's type is or extends
    /// [`BomValue::descriptor`], or a decoding error for a bad payload.
    fn from_value(value: &ValueNode) -> Result<Self>;
}

fn expect_type(value: &ValueNode, expected: &TypeRef) -> Result<()> {
    if value.is_or_extends(expected.name()) {
        Ok(())
    } else {
        Err(BomError::type_mismatch(expected.name(), value.ty().name()))
    }
}

macro_rules! impl_bom_value_for_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl BomValue for $ty {
                fn descriptor() -> TypeRef {
                    <$ty as Scalar>::descriptor()
                }

                fn to_value(&self) -> ValueNode {
                    ValueNode::scalar(*self)
                }

                fn from_value(value: &ValueNode) -> Result<Self> {
                    expect_type(value, &<$ty as Scalar>::descriptor())?;
                    value.read_scalar::<$ty>()
                }
            }
        )*
    };
}

impl_bom_value_for_scalar!(bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl BomValue for String {
    fn descriptor() -> TypeRef {
        builtin::string()
    }

    fn to_value(&self) -> ValueNode {
        ValueNode::string(self.as_str())
    }

    fn from_value(value: &ValueNode) -> Result<Self> {
        expect_type(value, &builtin::string())?;
        value.read_string()
    }
}

impl BomValue for Vec<u8> {
    fn descriptor() -> TypeRef {
        builtin::bytes()
    }

    fn to_value(&self) -> ValueNode {
        ValueNode::blob(self.clone())
    }

    fn from_value(value: &ValueNode) -> Result<Self> {
        expect_type(value, &builtin::bytes())?;
        Ok(value.bytes().to_vec())
    }
}
