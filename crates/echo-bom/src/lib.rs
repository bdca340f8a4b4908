// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Binary Object Model (BOM) for Echo.
//!
//! `echo-bom` is a self-describing binary format for typed object graphs
//! (textures, shaders, scene nodes, materials) plus the machinery to write and
//! read it:
//!
//! - [`TypeDescriptor`]s tag every datum with a name, an optional byte bound
//!   and an optional parent type.
//! - [`ValueNode`], [`ObjectNode`] and [`ArrayNode`] form the in-memory tree.
//! - [`Writer`] emits one record per node, keyed by [`ContentId`], and
//!   replaces repeated sub-trees with short REF records.
//! - [`Reader`] parses records back, resolving REFs through a per-session
//!   [`LoadContext`] so every reference to one id shares one node.
//! - [`MarshalerRegistry`] converts between native Rust types and object
//!   nodes by type name, falling back along the extends chain.
//! - [`PropertyTable`] exposes bound native fields to generic tooling.
//!
//! # Ordering
//!
//! A record must be defined before anything refers to it. Forward references
//! and self-referential graphs cannot be expressed and read back as
//! [`BomError::UnresolvedReference`].
//!
//! # Errors
//!
//! Every failure is a [`BomError`] value. [`BomError::UnknownType`] is the one
//! recoverable kind: a caller may skip that section and keep the records that
//! were already resolved.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

mod array;
mod config;
mod context;
mod document;
mod error;
mod handle;
mod id;
mod json;
mod marshal;
mod object;
mod reader;
mod reflect;
mod repeated;
mod types;
mod value;
mod wire;
mod writer;

pub use array::ArrayNode;
pub use config::{BomConfig, ReaderConfig, WriterConfig};
pub use context::{LoadContext, ResolvedNode};
pub use document::{
    read_document, write_document, Document, DocumentHeader, HEADER_LEN, MAGIC, VERSION,
};
pub use error::{BomError, ErrorKind, Result};
pub use handle::{LiveRef, NativeHandle};
pub use id::ContentId;
pub use json::{CHILDREN_KEY, HEX_KEY, TYPE_KEY};
pub use marshal::{ErasedMarshaler, Marshal, MarshalerRegistry, RegistryError};
pub use object::ObjectNode;
pub use reader::{ReadStats, Reader};
pub use reflect::{FieldAccessor, PropertyAccessor, PropertyInfo, PropertyTable};
pub use repeated::{read_repeated, repeated_layout, write_repeated, RepeatedLayout};
pub use types::{builtin, Ancestors, TypeDescriptor, TypeRef};
pub use value::{BomValue, Scalar, ValueNode};
pub use wire::{Shape, KIND_REF, KIND_VALUE, REF_RECORD_LEN};
pub use writer::{Node, WriteAttributes, WriteStats, Writer};
