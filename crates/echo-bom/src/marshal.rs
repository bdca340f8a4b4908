// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Marshaler registry: per-type conversion between native objects and
//! object nodes, resolved by type name.
//!
//! The registry is an explicit handle. Populate it with `&mut` at startup, then
//! share it by `&` (or `Arc`) with every writer and reader; after population
//! it is read-only and safe for concurrent lookup.
//!
//! Lookup for a stream type tries the exact name first, then walks the
//! extends chain, so a registered `Material` marshaler also handles a
//! `PbrMaterial` that extends it. No match is [`BomError::UnknownType`], which
//! callers may treat as "skip this section".

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, trace};

use crate::context::LoadContext;
use crate::error::{BomError, Result};
use crate::handle::NativeHandle;
use crate::id::ContentId;
use crate::object::ObjectNode;
use crate::types::{TypeDescriptor, TypeRef};

/// A native type with a registered object-node encoding.
///
/// Implementations work purely through the [`ObjectNode`] property API and
/// may recurse into `registry` for nested native types.
pub trait Marshal: Any + Send + Sync + Sized {
    /// Type tag written for this native type.
    fn type_descriptor() -> TypeRef;

    /// Builds the object node for `self`.
    ///
    /// # Errors
    /// Implementations return any error from nested marshalers.
    fn marshal(&self, registry: &MarshalerRegistry) -> Result<ObjectNode>;

    /// Rebuilds a native object from `node`.
    ///
    /// # Errors
    /// Implementations return [`BomError::InvalidNativeState`] when the node
    /// lacks what the native type needs, or errors from nested marshalers.
    fn unmarshal(
        node: &ObjectNode,
        ctx: &mut LoadContext,
        registry: &MarshalerRegistry,
    ) -> Result<Self>;
}

/// Object-safe marshaler stored in the registry.
pub trait ErasedMarshaler: Send + Sync {
    /// Type tag handled by this marshaler.
    fn descriptor(&self) -> &TypeRef;

    /// Rust type name of the native side, for diagnostics.
    fn native_name(&self) -> &'static str;

    /// Serializes a type-erased native object.
    ///
    /// # Errors
    /// Returns [`BomError::TypeMismatch`] if `native` is not this marshaler's
    /// native type, or any marshaling failure.
    fn serialize_any(&self, native: &dyn Any, registry: &MarshalerRegistry) -> Result<ObjectNode>;

    /// Deserializes `node` into a type-erased native object.
    ///
    /// # Errors
    /// Returns any marshaling failure.
    fn deserialize_any(
        &self,
        node: &ObjectNode,
        ctx: &mut LoadContext,
        registry: &MarshalerRegistry,
    ) -> Result<NativeHandle>;
}

struct TypedMarshaler<T> {
    descriptor: TypeRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Marshal> ErasedMarshaler for TypedMarshaler<T> {
    fn descriptor(&self) -> &TypeRef {
        &self.descriptor
    }

    fn native_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn serialize_any(&self, native: &dyn Any, registry: &MarshalerRegistry) -> Result<ObjectNode> {
        downcast_native::<T>(native, &self.descriptor)?.marshal(registry)
    }

    fn deserialize_any(
        &self,
        node: &ObjectNode,
        ctx: &mut LoadContext,
        registry: &MarshalerRegistry,
    ) -> Result<NativeHandle> {
        T::unmarshal(node, ctx, registry).map(NativeHandle::new)
    }
}

type SerializeFn<T> = dyn Fn(&T, &MarshalerRegistry) -> Result<ObjectNode> + Send + Sync;
type DeserializeFn<T> =
    dyn Fn(&ObjectNode, &mut LoadContext, &MarshalerRegistry) -> Result<T> + Send + Sync;

struct FnMarshaler<T> {
    descriptor: TypeRef,
    serialize: Box<SerializeFn<T>>,
    deserialize: Box<DeserializeFn<T>>,
}

impl<T: Any + Send + Sync> ErasedMarshaler for FnMarshaler<T> {
    fn descriptor(&self) -> &TypeRef {
        &self.descriptor
    }

    fn native_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn serialize_any(&self, native: &dyn Any, registry: &MarshalerRegistry) -> Result<ObjectNode> {
        (self.serialize)(downcast_native::<T>(native, &self.descriptor)?, registry)
    }

    fn deserialize_any(
        &self,
        node: &ObjectNode,
        ctx: &mut LoadContext,
        registry: &MarshalerRegistry,
    ) -> Result<NativeHandle> {
        (self.deserialize)(node, ctx, registry).map(NativeHandle::new)
    }
}

fn downcast_native<'a, T: Any>(native: &'a dyn Any, descriptor: &TypeRef) -> Result<&'a T> {
    native
        .downcast_ref::<T>()
        .ok_or_else(|| BomError::type_mismatch(descriptor.name(), "foreign native object"))
}

/// Errors returned when populating the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A marshaler is already registered under this type name.
    #[error("duplicate marshaler registration for type: {0}")]
    DuplicateType(String),
    /// The native type already has a marshaler under another name.
    #[error("native type {native} is already registered as {existing}")]
    DuplicateNative {
        /// Rust type name of the native type.
        native: &'static str,
        /// Type name it is registered under.
        existing: String,
    },
    /// A property of this name is already bound on the type.
    #[error("duplicate property binding {type_name}.{property}")]
    DuplicateProperty {
        /// Owning type name.
        type_name: String,
        /// Property name.
        property: String,
    },
}

/// Name-keyed table of marshalers.
#[derive(Default)]
pub struct MarshalerRegistry {
    by_name: FxHashMap<String, Box<dyn ErasedMarshaler>>,
    by_native: FxHashMap<TypeId, String>,
}

impl std::fmt::Debug for MarshalerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("MarshalerRegistry")
            .field("types", &names)
            .finish_non_exhaustive()
    }
}

impl MarshalerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the [`Marshal`] impl of `T` under `T::type_descriptor()`.
    ///
    /// # Errors
    /// Returns [`RegistryError`] if the type name or the native type is
    /// already registered.
    pub fn register<T: Marshal>(&mut self) -> Result<(), RegistryError> {
        let descriptor = T::type_descriptor();
        self.insert::<T>(Box::new(TypedMarshaler::<T> {
            descriptor,
            _marker: PhantomData,
        }))
    }

    /// Registers a serialize/deserialize function pair for native type `T`
    /// under `descriptor`.
    ///
    /// # Errors
    /// Returns [`RegistryError`] if the type name or the native type is
    /// already registered.
    pub fn register_fn<T, S, D>(
        &mut self,
        descriptor: TypeRef,
        serialize: S,
        deserialize: D,
    ) -> Result<(), RegistryError>
    where
        T: Any + Send + Sync,
        S: Fn(&T, &Self) -> Result<ObjectNode> + Send + Sync + 'static,
        D: Fn(&ObjectNode, &mut LoadContext, &Self) -> Result<T> + Send + Sync + 'static,
    {
        self.insert::<T>(Box::new(FnMarshaler {
            descriptor,
            serialize: Box::new(serialize),
            deserialize: Box::new(deserialize),
        }))
    }

    fn insert<T: Any>(&mut self, marshaler: Box<dyn ErasedMarshaler>) -> Result<(), RegistryError> {
        let name = marshaler.descriptor().name().to_owned();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateType(name));
        }
        if let Some(existing) = self.by_native.get(&TypeId::of::<T>()) {
            return Err(RegistryError::DuplicateNative {
                native: std::any::type_name::<T>(),
                existing: existing.clone(),
            });
        }
        debug!(type_name = %name, native = std::any::type_name::<T>(), "registered marshaler");
        self.by_native.insert(TypeId::of::<T>(), name.clone());
        self.by_name.insert(name, marshaler);
        Ok(())
    }

    /// Number of registered marshalers.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Marshaler registered under exactly `type_name`.
    pub fn lookup(&self, type_name: &str) -> Option<&dyn ErasedMarshaler> {
        self.by_name.get(type_name).map(AsRef::as_ref)
    }

    /// Marshaler for `ty` or the nearest type it extends.
    pub fn lookup_by_extension(&self, ty: &TypeDescriptor) -> Option<&dyn ErasedMarshaler> {
        let found = ty
            .ancestors()
            .find_map(|link| self.lookup(link.name()));
        if let Some(marshaler) = found {
            if marshaler.descriptor().name() != ty.name() {
                trace!(
                    requested = ty.name(),
                    resolved = marshaler.descriptor().name(),
                    "marshaler resolved through extends chain"
                );
            }
        }
        found
    }

    /// Serializes `value` with the marshaler registered for its native type.
    ///
    /// # Errors
    /// Returns [`BomError::UnknownType`] if `T` is not registered, or the
    /// marshaler's own failure.
    pub fn serialize<T: Any>(&self, value: &T) -> Result<ObjectNode> {
        let marshaler = self
            .by_native
            .get(&TypeId::of::<T>())
            .and_then(|name| self.lookup(name))
            .ok_or_else(|| BomError::UnknownType(std::any::type_name::<T>().to_owned()))?;
        marshaler.serialize_any(value, self)
    }

    /// Serializes a shared native object and attaches it as the node's live
    /// reference.
    ///
    /// # Errors
    /// See [`MarshalerRegistry::serialize`].
    pub fn serialize_shared<T: Any + Send + Sync>(&self, value: &Arc<T>) -> Result<ObjectNode> {
        let mut node = self.serialize::<T>(value)?;
        node.set_live(Some(NativeHandle::from_arc(Arc::clone(value)).downgrade()));
        Ok(node)
    }

    /// Builds the native object for `node`, caching it in `ctx` by content id.
    ///
    /// # Errors
    /// Returns [`BomError::UnknownType`] when no marshaler handles the node's
    /// type or any type it extends, or the marshaler's own failure.
    pub fn deserialize(&self, node: &ObjectNode, ctx: &mut LoadContext) -> Result<NativeHandle> {
        self.deserialize_with_id(node.content_id(), node, ctx)
    }

    /// As [`MarshalerRegistry::deserialize`] for a node whose id is already
    /// known (typically the id of the record it was read from).
    ///
    /// # Errors
    /// See [`MarshalerRegistry::deserialize`].
    pub fn deserialize_with_id(
        &self,
        id: ContentId,
        node: &ObjectNode,
        ctx: &mut LoadContext,
    ) -> Result<NativeHandle> {
        if let Some(handle) = ctx.native(&id) {
            trace!(%id, "native cache hit");
            return Ok(handle.clone());
        }
        let marshaler = self
            .lookup_by_extension(node.type_tag())
            .ok_or_else(|| BomError::UnknownType(node.type_tag().name().to_owned()))?;
        let handle = marshaler.deserialize_any(node, ctx, self)?;
        ctx.set_native(id, handle.clone());
        Ok(handle)
    }

    /// Builds the native object for `node` as a `T`.
    ///
    /// # Errors
    /// As [`MarshalerRegistry::deserialize`], plus [`BomError::TypeMismatch`]
    /// when the resolved marshaler produces something other than a `T`.
    pub fn deserialize_as<T: Any + Send + Sync>(
        &self,
        node: &ObjectNode,
        ctx: &mut LoadContext,
    ) -> Result<Arc<T>> {
        self.deserialize(node, ctx)?.downcast::<T>().map_err(|_| {
            BomError::type_mismatch(std::any::type_name::<T>(), node.type_tag().name())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::TypeDescriptor;

    #[derive(Debug, PartialEq)]
    struct Tag(String);

    impl Marshal for Tag {
        fn type_descriptor() -> TypeRef {
            TypeDescriptor::object_type("Tag")
        }

        fn marshal(&self, _: &MarshalerRegistry) -> Result<ObjectNode> {
            let mut node = ObjectNode::new(Self::type_descriptor());
            node.set("name", &self.0);
            Ok(node)
        }

        fn unmarshal(node: &ObjectNode, _: &mut LoadContext, _: &MarshalerRegistry) -> Result<Self> {
            node.require::<String>("name").map(Self)
        }
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut registry = MarshalerRegistry::new();
        registry.register::<Tag>().unwrap();
        assert_eq!(
            registry.register::<Tag>(),
            Err(RegistryError::DuplicateType("Tag".into()))
        );
        let err = registry
            .register_fn::<Tag, _, _>(
                TypeDescriptor::object_type("OtherTag"),
                |_, _| Ok(ObjectNode::new(TypeDescriptor::object_type("OtherTag"))),
                |_, _, _| Ok(Tag(String::new())),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateNative { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn extension_chain_is_walked() {
        let mut registry = MarshalerRegistry::new();
        registry.register::<Tag>().unwrap();
        let special = TypeDescriptor::extending("SpecialTag", &Tag::type_descriptor());
        assert!(registry.lookup(special.name()).is_none());
        let found = registry.lookup_by_extension(&special).unwrap();
        assert_eq!(found.descriptor().name(), "Tag");
        assert!(registry
            .lookup_by_extension(&TypeDescriptor::object_type("Untagged"))
            .is_none());
    }

    #[test]
    fn natives_are_cached_in_the_context() {
        let mut registry = MarshalerRegistry::new();
        registry.register::<Tag>().unwrap();
        let node = registry.serialize(&Tag("hero".into())).unwrap();

        let mut ctx = LoadContext::new();
        let a = registry.deserialize(&node, &mut ctx).unwrap();
        let b = registry.deserialize(&node, &mut ctx).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(*registry.deserialize_as::<Tag>(&node, &mut ctx).unwrap(), Tag("hero".into()));
        assert!(matches!(
            registry.deserialize_as::<u32>(&node, &mut ctx),
            Err(BomError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_types_are_recoverable() {
        let registry = MarshalerRegistry::new();
        let err = registry.serialize(&Tag("x".into())).unwrap_err();
        assert!(err.is_recoverable());
        let node = ObjectNode::new(TypeDescriptor::object_type("Mystery"));
        let err = registry.deserialize(&node, &mut LoadContext::new()).unwrap_err();
        assert_eq!(err, BomError::UnknownType("Mystery".into()));
    }

    #[test]
    fn shared_serialization_sets_the_live_reference() {
        let mut registry = MarshalerRegistry::new();
        registry.register::<Tag>().unwrap();
        let native = Arc::new(Tag("lamp".into()));
        let node = registry.serialize_shared(&native).unwrap();
        let live = node.live().unwrap().upgrade().unwrap();
        assert_eq!(live.downcast_ref::<Tag>(), Some(&*native));
        drop(live);
        drop(native);
        assert!(node.live().unwrap().upgrade().is_none());
    }
}
