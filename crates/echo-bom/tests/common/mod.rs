// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use std::sync::Arc;

use echo_bom::{
    read_repeated, write_repeated, BomError, LoadContext, Marshal, MarshalerRegistry, ObjectNode,
    RepeatedLayout, Result, TypeDescriptor, TypeRef, ValueNode,
};

// =============================================================================
// NATIVE FIXTURES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Marshal for Vec3 {
    fn type_descriptor() -> TypeRef {
        TypeDescriptor::object_type("Vec3")
    }

    fn marshal(&self, _: &MarshalerRegistry) -> Result<ObjectNode> {
        let mut node = ObjectNode::new(Self::type_descriptor());
        node.set("x", &self.x);
        node.set("y", &self.y);
        node.set("z", &self.z);
        Ok(node)
    }

    fn unmarshal(node: &ObjectNode, _: &mut LoadContext, _: &MarshalerRegistry) -> Result<Self> {
        Ok(Self {
            x: node.require("x")?,
            y: node.require("y")?,
            z: node.require("z")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub path: String,
    pub width: u32,
    pub height: u32,
}

impl Marshal for Texture {
    fn type_descriptor() -> TypeRef {
        TypeDescriptor::object_type("Texture")
    }

    fn marshal(&self, _: &MarshalerRegistry) -> Result<ObjectNode> {
        let mut node = ObjectNode::new(Self::type_descriptor());
        node.set("path", &self.path);
        node.set("width", &self.width);
        node.set("height", &self.height);
        Ok(node)
    }

    fn unmarshal(node: &ObjectNode, _: &mut LoadContext, _: &MarshalerRegistry) -> Result<Self> {
        Ok(Self {
            path: node.require("path")?,
            width: node.require("width")?,
            height: node.require("height")?,
        })
    }
}

/// Holds its texture as an embedded object property.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub roughness: f32,
    pub albedo: Arc<Texture>,
}

impl Marshal for Material {
    fn type_descriptor() -> TypeRef {
        TypeDescriptor::object_type("Material")
    }

    fn marshal(&self, registry: &MarshalerRegistry) -> Result<ObjectNode> {
        let mut node = ObjectNode::new(Self::type_descriptor());
        node.set("name", &self.name);
        node.set("roughness", &self.roughness);
        let albedo = registry.serialize_shared(&self.albedo)?;
        node.set_property("albedo", ValueNode::from_object(&albedo, true)?);
        Ok(node)
    }

    fn unmarshal(
        node: &ObjectNode,
        ctx: &mut LoadContext,
        registry: &MarshalerRegistry,
    ) -> Result<Self> {
        let albedo = node
            .get_property("albedo")
            .ok_or_else(|| BomError::InvalidNativeState("material has no albedo".into()))?
            .read_object(ctx)?;
        Ok(Self {
            name: node.require("name")?,
            roughness: node.require("roughness")?,
            albedo: registry.deserialize_as::<Texture>(&albedo, ctx)?,
        })
    }
}

/// Holds its materials as a repeated child sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub name: String,
    pub origin: Vec3,
    pub materials: Vec<Arc<Material>>,
}

impl Marshal for Scene {
    fn type_descriptor() -> TypeRef {
        TypeDescriptor::object_type("Scene")
    }

    fn marshal(&self, registry: &MarshalerRegistry) -> Result<ObjectNode> {
        let mut node = ObjectNode::new(Self::type_descriptor());
        node.set("name", &self.name);
        node.set_property(
            "origin",
            ValueNode::from_object(&registry.serialize(&self.origin)?, false)?,
        );
        let materials = self
            .materials
            .iter()
            .map(|material| registry.serialize_shared(material))
            .collect::<Result<Vec<_>>>()?;
        write_repeated(&mut node, "materials", materials, RepeatedLayout::Children)?;
        Ok(node)
    }

    fn unmarshal(
        node: &ObjectNode,
        ctx: &mut LoadContext,
        registry: &MarshalerRegistry,
    ) -> Result<Self> {
        let origin = node
            .get_property("origin")
            .ok_or_else(|| BomError::InvalidNativeState("scene has no origin".into()))?
            .read_object(ctx)?;
        let materials = read_repeated(node, "materials", &Material::type_descriptor())?
            .iter()
            .map(|item| registry.deserialize_as::<Material>(item, ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: node.require("name")?,
            origin: *registry.deserialize_as::<Vec3>(&origin, ctx)?,
            materials,
        })
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

pub fn registry() -> MarshalerRegistry {
    let mut registry = MarshalerRegistry::new();
    registry.register::<Vec3>().unwrap();
    registry.register::<Texture>().unwrap();
    registry.register::<Material>().unwrap();
    registry.register::<Scene>().unwrap();
    registry
}

pub fn brick() -> Arc<Texture> {
    Arc::new(Texture {
        path: "textures/brick.png".into(),
        width: 512,
        height: 256,
    })
}

pub fn material(name: &str, roughness: f32) -> Arc<Material> {
    Arc::new(Material {
        name: name.into(),
        roughness,
        albedo: brick(),
    })
}

pub fn scene() -> Scene {
    Scene {
        name: "lobby".into(),
        origin: Vec3 {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        },
        materials: vec![material("wall", 0.5), material("floor", 0.9)],
    }
}
