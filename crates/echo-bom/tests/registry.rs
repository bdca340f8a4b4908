// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

mod common;

use common::{brick, material, registry, scene, Material, Texture, Vec3};
use echo_bom::{
    BomError, LoadContext, Marshal, ObjectNode, PropertyTable, RegistryError, TypeDescriptor,
    ValueNode,
};

#[test]
fn lookups_are_safe_across_threads() {
    let registry = registry();
    let expected = registry.serialize(&scene()).unwrap();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    let node = registry.serialize(&scene()).unwrap();
                    let mut ctx = LoadContext::new();
                    let back = registry
                        .deserialize_as::<common::Scene>(&node, &mut ctx)
                        .unwrap();
                    (node, back)
                })
            })
            .collect();
        for handle in handles {
            let (node, back) = handle.join().unwrap();
            assert_eq!(node, expected);
            assert_eq!(*back, scene());
        }
    });
}

#[test]
fn subtypes_fall_back_to_the_nearest_marshaler() {
    let registry = registry();
    let mut node = ObjectNode::new(TypeDescriptor::extending(
        "NormalMap",
        &Texture::type_descriptor(),
    ));
    node.set("path", &"textures/brick_n.png".to_owned());
    node.set("width", &512u32);
    node.set("height", &256u32);

    let texture = registry
        .deserialize_as::<Texture>(&node, &mut LoadContext::new())
        .unwrap();
    assert_eq!(texture.path, "textures/brick_n.png");
}

#[test]
fn registration_conflicts_are_reported() {
    let mut registry = registry();
    assert_eq!(
        registry.register::<Vec3>(),
        Err(RegistryError::DuplicateType("Vec3".into()))
    );
    assert!(registry.type_names().contains(&"Material"));
}

#[test]
fn reflection_reads_live_and_decoded_objects() {
    let registry = registry();
    let mut table = PropertyTable::new();
    table
        .bind::<Material, f32>(
            "roughness",
            |m| m.roughness,
            Some(set_roughness as fn(&mut Material, f32)),
        )
        .unwrap();
    table.bind::<Texture, u32>("width", |t| t.width, None).unwrap();

    let wall = material("wall", 0.5);
    let live = ValueNode::from_object(&registry.serialize_shared(&wall).unwrap(), true).unwrap();
    let roughness = table.get(&registry, &live, "roughness").unwrap();
    assert_eq!(roughness.read_scalar::<f32>().unwrap(), 0.5);

    let mut detached =
        ValueNode::from_object(&registry.serialize(&*wall).unwrap(), false).unwrap();
    table
        .set(&registry, &mut detached, "roughness", &ValueNode::scalar(0.75_f32))
        .unwrap();
    let updated = detached.read_object(&mut LoadContext::new()).unwrap();
    assert_eq!(updated.require::<f32>("roughness").unwrap(), 0.75);

    let mut texture =
        ValueNode::from_object(&registry.serialize(&*brick()).unwrap(), false).unwrap();
    let err = table
        .set(&registry, &mut texture, "width", &ValueNode::scalar(1u32))
        .unwrap_err();
    assert!(matches!(err, BomError::InvalidNativeState(_)));
    assert!(table
        .properties(&Material::type_descriptor())
        .iter()
        .any(|info| info.name == "roughness" && !info.read_only));
}

fn set_roughness(material: &mut Material, roughness: f32) {
    material.roughness = roughness;
}

#[test]
fn json_view_of_a_scene_is_readable() {
    let registry = registry();
    let root = registry.serialize(&scene()).unwrap();
    let json = root.to_json(&mut LoadContext::new()).unwrap();

    assert_eq!(json["$type"], "Scene");
    assert_eq!(json["name"], "lobby");
    assert_eq!(json["origin"]["$type"], "Vec3");
    assert_eq!(json["origin"]["y"], 2.0);
    let sequence = &json["$children"][0];
    assert_eq!(sequence["$type"], "sequence");
    assert_eq!(sequence["size"], 2);
    assert_eq!(sequence["$children"][1]["name"], "floor");
    assert_eq!(sequence["$children"][0]["albedo"]["path"], "textures/brick.png");

    let back = ObjectNode::from_json(&json).unwrap();
    assert_eq!(back.type_tag().name(), "Scene");
    assert_eq!(back.children().len(), 1);
    assert_eq!(back.children()[0].children().len(), 2);
}
