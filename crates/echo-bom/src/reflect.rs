// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reflection bridge: generic get/set of native fields by name.
//!
//! A [`PropertyTable`] binds named properties of marshaled native types to
//! typed accessors. Tools can then read or write a field either on a native
//! object they hold as `&dyn Any`, or on a [`ValueNode`] holding an embedded
//! object, without knowing the native type at compile time.
//!
//! Owner and value types are checked on every call and mismatches come back as
//! [`BomError::TypeMismatch`].

use std::any::Any;
use std::marker::PhantomData;

use rustc_hash::FxHashMap;

use crate::context::LoadContext;
use crate::error::{BomError, Result};
use crate::marshal::{Marshal, MarshalerRegistry, RegistryError};
use crate::types::{TypeDescriptor, TypeRef};
use crate::value::{BomValue, ValueNode};

/// Typed access to one property of an `O`.
pub trait PropertyAccessor<O, V>: Send + Sync {
    /// Reads the property.
    fn get(&self, owner: &O) -> V;

    /// Writes the property.
    ///
    /// # Errors
    /// Returns [`BomError::InvalidNativeState`] for read-only properties.
    fn set(&self, owner: &mut O, value: V) -> Result<()>;

    /// Returns `true` when [`PropertyAccessor::set`] always fails.
    fn is_read_only(&self) -> bool;
}

/// Accessor built from a getter and an optional setter.
pub struct FieldAccessor<O, V> {
    getter: fn(&O) -> V,
    setter: Option<fn(&mut O, V)>,
}

impl<O, V> FieldAccessor<O, V> {
    /// Read-write accessor.
    pub fn new(getter: fn(&O) -> V, setter: fn(&mut O, V)) -> Self {
        Self {
            getter,
            setter: Some(setter),
        }
    }

    /// Read-only accessor.
    pub fn read_only(getter: fn(&O) -> V) -> Self {
        Self {
            getter,
            setter: None,
        }
    }
}

impl<O, V> PropertyAccessor<O, V> for FieldAccessor<O, V> {
    fn get(&self, owner: &O) -> V {
        (self.getter)(owner)
    }

    fn set(&self, owner: &mut O, value: V) -> Result<()> {
        let setter = self
            .setter
            .ok_or_else(|| BomError::InvalidNativeState("property is read-only".into()))?;
        setter(owner, value);
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.setter.is_none()
    }
}

trait ErasedProperty: Send + Sync {
    fn accepts(&self, owner: &dyn Any) -> bool;
    fn value_type(&self) -> &TypeRef;
    fn is_read_only(&self) -> bool;
    fn get_any(&self, owner: &dyn Any) -> Option<ValueNode>;
    fn set_any(&self, owner: &mut dyn Any, value: &ValueNode) -> Option<Result<()>>;
}

struct BoundProperty<O, V, A> {
    value_type: TypeRef,
    accessor: A,
    _marker: PhantomData<fn(O) -> V>,
}

impl<O, V, A> ErasedProperty for BoundProperty<O, V, A>
where
    O: Any,
    V: BomValue,
    A: PropertyAccessor<O, V>,
{
    fn accepts(&self, owner: &dyn Any) -> bool {
        owner.is::<O>()
    }

    fn value_type(&self) -> &TypeRef {
        &self.value_type
    }

    fn is_read_only(&self) -> bool {
        self.accessor.is_read_only()
    }

    fn get_any(&self, owner: &dyn Any) -> Option<ValueNode> {
        let owner = owner.downcast_ref::<O>()?;
        Some(self.accessor.get(owner).to_value())
    }

    fn set_any(&self, owner: &mut dyn Any, value: &ValueNode) -> Option<Result<()>> {
        let owner = owner.downcast_mut::<O>()?;
        Some(V::from_value(value).and_then(|v| self.accessor.set(owner, v)))
    }
}

/// Public description of one bound property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Property name.
    pub name: String,
    /// Type of the property's values.
    pub value_type: TypeRef,
    /// Whether writes are rejected.
    pub read_only: bool,
}

type Bindings = Vec<(String, Box<dyn ErasedProperty>)>;

/// Bound properties, keyed by owning type name.
#[derive(Default)]
pub struct PropertyTable {
    by_type: FxHashMap<String, Bindings>,
}

impl std::fmt::Debug for PropertyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.by_type.keys().collect();
        types.sort();
        f.debug_struct("PropertyTable")
            .field("types", &types)
            .finish_non_exhaustive()
    }
}

impl PropertyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` on `O` through a getter and optional setter.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateProperty`] if `name` is already bound
    /// on `O`.
    pub fn bind<O, V>(
        &mut self,
        name: &str,
        getter: fn(&O) -> V,
        setter: Option<fn(&mut O, V)>,
    ) -> Result<(), RegistryError>
    where
        O: Marshal,
        V: BomValue + 'static,
    {
        let accessor = match setter {
            Some(setter) => FieldAccessor::new(getter, setter),
            None => FieldAccessor::read_only(getter),
        };
        self.bind_accessor::<O, V, _>(name, accessor)
    }

    /// Binds `name` on `O` through any [`PropertyAccessor`].
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateProperty`] if `name` is already bound
    /// on `O`.
    pub fn bind_accessor<O, V, A>(&mut self, name: &str, accessor: A) -> Result<(), RegistryError>
    where
        O: Marshal,
        V: BomValue + 'static,
        A: PropertyAccessor<O, V> + 'static,
    {
        let type_name = O::type_descriptor().name().to_owned();
        let bound = self.by_type.entry(type_name.clone()).or_default();
        if bound.iter().any(|(n, _)| n == name) {
            return Err(RegistryError::DuplicateProperty {
                type_name,
                property: name.to_owned(),
            });
        }
        bound.push((
            name.to_owned(),
            Box::new(BoundProperty::<O, V, A> {
                value_type: V::descriptor(),
                accessor,
                _marker: PhantomData,
            }),
        ));
        Ok(())
    }

    /// Properties bound on `ty` and the types it extends, nearest first.
    pub fn properties(&self, ty: &TypeDescriptor) -> Vec<PropertyInfo> {
        ty.ancestors()
            .filter_map(|link| self.by_type.get(link.name()))
            .flatten()
            .map(|(name, prop)| PropertyInfo {
                name: name.clone(),
                value_type: TypeRef::clone(prop.value_type()),
                read_only: prop.is_read_only(),
            })
            .collect()
    }

    fn find(&self, ty: &TypeDescriptor, property: &str) -> Result<&dyn ErasedProperty> {
        ty.ancestors()
            .filter_map(|link| self.by_type.get(link.name()))
            .flatten()
            .find_map(|(name, prop)| (name == property).then_some(prop.as_ref()))
            .ok_or_else(|| {
                BomError::InvalidNativeState(format!(
                    "{} has no bound property `{property}`",
                    ty.name()
                ))
            })
    }

    /// Reads `property` from a native object whose type tag is `ty`.
    ///
    /// # Errors
    /// Returns [`BomError::InvalidNativeState`] for an unknown property and
    /// [`BomError::TypeMismatch`] when `native` is not the bound owner type.
    pub fn get_native(
        &self,
        native: &dyn Any,
        ty: &TypeDescriptor,
        property: &str,
    ) -> Result<ValueNode> {
        self.find(ty, property)?
            .get_any(native)
            .ok_or_else(|| BomError::type_mismatch(ty.name(), "foreign native object"))
    }

    /// Writes `property` on a native object whose type tag is `ty`.
    ///
    /// # Errors
    /// Returns [`BomError::InvalidNativeState`] for an unknown or read-only
    /// property, and [`BomError::TypeMismatch`] when `native` is not the
    /// owner type or `value` is not the property's type.
    pub fn set_native(
        &self,
        native: &mut dyn Any,
        ty: &TypeDescriptor,
        property: &str,
        value: &ValueNode,
    ) -> Result<()> {
        let prop = self.find(ty, property)?;
        if prop.is_read_only() {
            return Err(BomError::InvalidNativeState(format!(
                "{}.{property} is read-only",
                ty.name()
            )));
        }
        prop.set_any(native, value)
            .unwrap_or_else(|| Err(BomError::type_mismatch(ty.name(), "foreign native object")))
    }

    /// Reads `property` from the object embedded in `target`.
    ///
    /// Uses the value's live native object when it has one of the right type,
    /// and otherwise decodes the embedded object through `registry`.
    ///
    /// # Errors
    /// As [`PropertyTable::get_native`], plus any decoding failure.
    pub fn get(
        &self,
        registry: &MarshalerRegistry,
        target: &ValueNode,
        property: &str,
    ) -> Result<ValueNode> {
        let prop = self.find(target.ty(), property)?;
        if let Some(live) = target.live().and_then(|l| l.upgrade()) {
            if prop.accepts(live.as_any()) {
                return self.get_native(live.as_any(), target.ty(), property);
            }
        }
        let mut ctx = LoadContext::new();
        let object = target.read_object(&mut ctx)?;
        let native = registry.deserialize(&object, &mut ctx)?;
        self.get_native(native.as_any(), object.type_tag(), property)
    }

    /// Writes `property` on the object embedded in `target` and re-encodes
    /// it.
    ///
    /// The embedded object is decoded, mutated through its native type and
    /// marshaled again; `target` is replaced only when every step succeeds.
    ///
    /// # Errors
    /// As [`PropertyTable::set_native`], plus any decoding or encoding
    /// failure.
    pub fn set(
        &self,
        registry: &MarshalerRegistry,
        target: &mut ValueNode,
        property: &str,
        value: &ValueNode,
    ) -> Result<()> {
        let prop = self.find(target.ty(), property)?;
        if !value.is_or_extends(prop.value_type().name()) {
            return Err(BomError::type_mismatch(
                prop.value_type().name(),
                value.ty().name(),
            ));
        }

        let object = {
            let mut ctx = LoadContext::new();
            target.read_object(&mut ctx)?
        };
        let marshaler = registry
            .lookup_by_extension(object.type_tag())
            .ok_or_else(|| BomError::UnknownType(object.type_tag().name().to_owned()))?;
        let mut native = marshaler.deserialize_any(&object, &mut LoadContext::new(), registry)?;
        let native_mut = native.get_mut().ok_or_else(|| {
            BomError::InvalidNativeState(format!(
                "{} native object is shared and cannot be mutated",
                object.type_tag().name()
            ))
        })?;
        self.set_native(native_mut, object.type_tag(), property, value)?;
        let updated = marshaler.serialize_any(native.as_any(), registry)?;
        *target = ValueNode::from_object(&updated, false)?;
        Ok(())
    }
}
