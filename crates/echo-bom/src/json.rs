// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON bridge for debugging and tooling. Lossy in both directions.
//!
//! BOM → JSON:
//! - scalars, strings and `null` map directly; non-finite floats become `null`
//! - `bytes` become lowercase hex strings
//! - objects become `{"$type": name, <props>..., "$children": [...]}`
//! - values of unknown non-builtin types become `{"$type": name, "$hex": ...}`
//!
//! JSON → BOM:
//! - numbers without a fractional part become `i64` (or `u64` above
//!   `i64::MAX`), everything else `f64`
//! - arrays must be homogeneous; mixed integer/float arrays are promoted to
//!   `f64`; an empty array has element type `null`

use serde_json::{Map, Number, Value};

use crate::array::ArrayNode;
use crate::context::LoadContext;
use crate::error::{BomError, Result};
use crate::object::ObjectNode;
use crate::types::{builtin, TypeDescriptor, TypeRef};
use crate::value::ValueNode;

/// Key holding an object's type name.
pub const TYPE_KEY: &str = "$type";
/// Key holding an object's children.
pub const CHILDREN_KEY: &str = "$children";
/// Key holding the hex payload of a value of unknown type.
pub const HEX_KEY: &str = "$hex";

/// 2^63: first `f64` past `i64::MAX`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "json null",
        Value::Bool(_) => "json bool",
        Value::Number(_) => "json number",
        Value::String(_) => "json string",
        Value::Array(_) => "json array",
        Value::Object(_) => "json object",
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

impl ValueNode {
    /// Renders this value as JSON, decoding embedded documents with `ctx`.
    ///
    /// Each embedded document rendered counts against the context's
    /// `max_depth`.
    ///
    /// # Errors
    /// Returns payload decoding errors (short scalars, bad UTF-8, malformed
    /// embedded streams) and [`BomError::MalformedStream`] for embedded
    /// documents nested past `max_depth`.
    pub fn to_json(&self, ctx: &mut LoadContext) -> Result<Value> {
        let Some(base) = self.ty().builtin_base() else {
            let mut map = Map::new();
            map.insert(TYPE_KEY.into(), Value::String(self.ty().name().to_owned()));
            map.insert(HEX_KEY.into(), Value::String(hex::encode(self.bytes())));
            return Ok(Value::Object(map));
        };
        let json = match base {
            builtin::NULL => Value::Null,
            builtin::BOOL => Value::Bool(self.read_scalar::<bool>()?),
            builtin::I8 => Value::from(self.read_scalar::<i8>()?),
            builtin::U8 => Value::from(self.read_scalar::<u8>()?),
            builtin::I16 => Value::from(self.read_scalar::<i16>()?),
            builtin::U16 => Value::from(self.read_scalar::<u16>()?),
            builtin::I32 => Value::from(self.read_scalar::<i32>()?),
            builtin::U32 => Value::from(self.read_scalar::<u32>()?),
            builtin::I64 => Value::from(self.read_scalar::<i64>()?),
            builtin::U64 => Value::from(self.read_scalar::<u64>()?),
            builtin::F32 => float(f64::from(self.read_scalar::<f32>()?)),
            builtin::F64 => float(self.read_scalar::<f64>()?),
            builtin::STRING => Value::String(self.read_string()?),
            builtin::BYTES => Value::String(hex::encode(self.bytes())),
            builtin::ARRAY => ctx.descend(|ctx| self.read_array_here(ctx)?.to_json(ctx))?,
            // `object` and everything extending it, `sequence` included.
            _ => ctx.descend(|ctx| self.read_object_here(ctx)?.to_json(ctx))?,
        };
        Ok(json)
    }

    /// Builds a value from JSON.
    ///
    /// # Errors
    /// Returns [`BomError::TypeMismatch`] for heterogeneous arrays and
    /// [`BomError::MalformedStream`] for a bad `$hex` payload.
    pub fn from_json(json: &Value) -> Result<Self> {
        match json {
            Value::Null => Ok(Self::null()),
            Value::Bool(b) => Ok(Self::scalar(*b)),
            Value::Number(n) => Ok(number_to_value(n)),
            Value::String(s) => Ok(Self::string(s.as_str())),
            Value::Array(_) => Self::from_array(&ArrayNode::from_json(json)?),
            Value::Object(map) => {
                if let (Some(Value::String(name)), Some(Value::String(payload)), 2) =
                    (map.get(TYPE_KEY), map.get(HEX_KEY), map.len())
                {
                    let bytes = hex::decode(payload)
                        .map_err(|e| BomError::malformed(format!("bad {HEX_KEY} payload: {e}")))?;
                    return Self::new(TypeDescriptor::unbounded(name.clone()), bytes);
                }
                Self::from_object(&ObjectNode::from_json(json)?, false)
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number_to_value(n: &Number) -> ValueNode {
    if let Some(i) = n.as_i64() {
        return ValueNode::scalar(i);
    }
    if let Some(u) = n.as_u64() {
        return ValueNode::scalar(u);
    }
    let f = n.as_f64().unwrap_or(f64::NAN);
    if f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f) {
        ValueNode::scalar(f as i64)
    } else {
        ValueNode::scalar(f)
    }
}

fn object_type_for(name: &str) -> TypeRef {
    match builtin::by_name(name) {
        Some(ty) if ty.is_or_extends(builtin::OBJECT) => ty,
        _ => TypeDescriptor::object_type(name.to_owned()),
    }
}

impl ObjectNode {
    /// Renders this object and its children as JSON.
    ///
    /// # Errors
    /// Returns the first property's decoding error.
    pub fn to_json(&self, ctx: &mut LoadContext) -> Result<Value> {
        let mut map = Map::new();
        map.insert(TYPE_KEY.into(), Value::String(self.type_tag().name().to_owned()));
        for (name, value) in self.properties() {
            map.insert(name.to_owned(), value.to_json(ctx)?);
        }
        if !self.children().is_empty() {
            let children = self
                .children()
                .iter()
                .map(|child| child.to_json(ctx))
                .collect::<Result<Vec<_>>>()?;
            map.insert(CHILDREN_KEY.into(), Value::Array(children));
        }
        Ok(Value::Object(map))
    }

    /// Builds an object from a JSON object.
    ///
    /// `$type` names the tag (default `object`), `$children` holds child
    /// objects, and every other key becomes a property.
    ///
    /// # Errors
    /// Returns [`BomError::TypeMismatch`] when `json` (or a child) is not a
    /// JSON object or `$type` is not a string, and any property conversion
    /// error.
    pub fn from_json(json: &Value) -> Result<Self> {
        let Value::Object(map) = json else {
            return Err(BomError::type_mismatch("json object", json_kind(json)));
        };
        let type_tag = match map.get(TYPE_KEY) {
            None => builtin::object(),
            Some(Value::String(name)) => object_type_for(name),
            Some(other) => return Err(BomError::type_mismatch("json string", json_kind(other))),
        };
        let mut node = Self::new(type_tag);
        for (key, value) in map {
            match key.as_str() {
                TYPE_KEY => {}
                CHILDREN_KEY => {
                    let Value::Array(children) = value else {
                        return Err(BomError::type_mismatch("json array", json_kind(value)));
                    };
                    for child in children {
                        node.add_child(Self::from_json(child)?);
                    }
                }
                _ => {
                    node.set_property(key.clone(), ValueNode::from_json(value)?);
                }
            }
        }
        Ok(node)
    }
}

impl ArrayNode {
    /// Renders the elements as a JSON array.
    ///
    /// # Errors
    /// Returns the first element's decoding error.
    pub fn to_json(&self, ctx: &mut LoadContext) -> Result<Value> {
        self.iter()
            .map(|element| element.to_json(ctx))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    /// Builds a homogeneous array from a JSON array.
    ///
    /// # Errors
    /// Returns [`BomError::TypeMismatch`] when `json` is not an array or its
    /// elements do not share a type (integers and floats excepted).
    pub fn from_json(json: &Value) -> Result<Self> {
        let Value::Array(items) = json else {
            return Err(BomError::type_mismatch("json array", json_kind(json)));
        };
        let values = items
            .iter()
            .map(ValueNode::from_json)
            .collect::<Result<Vec<_>>>()?;
        let Some(first) = values.first() else {
            return Ok(Self::new(builtin::null()));
        };

        if values.iter().all(ValueNode::is_embedded) {
            let shared = if values.iter().all(|v| v.is_or_extends(builtin::ARRAY)) {
                builtin::array()
            } else if values.iter().all(|v| v.is_or_extends(builtin::OBJECT)) {
                builtin::object()
            } else {
                return Err(BomError::type_mismatch(builtin::OBJECT, builtin::ARRAY));
            };
            return Self::from_values(shared, values);
        }

        let element_type = TypeRef::clone(first.ty());
        if let Some(odd) = values.iter().find(|v| v.ty() != &element_type) {
            let numeric = items.iter().all(Value::is_number);
            if !numeric {
                return Err(BomError::type_mismatch(element_type.name(), odd.ty().name()));
            }
            let promoted = items
                .iter()
                .map(|n| ValueNode::scalar(n.as_f64().unwrap_or(f64::NAN)));
            return Self::from_values(builtin::f64(), promoted);
        }
        Self::from_values(element_type, values)
    }
}
