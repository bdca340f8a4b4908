// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use common::{material, registry, Material, Scene, Vec3};
use echo_bom::{
    LoadContext, ObjectNode, Reader, ReaderConfig, TypeDescriptor, WriteAttributes, Writer,
    WriterConfig, REF_RECORD_LEN,
};

fn twin_scene() -> Scene {
    let wall = material("wall", 0.5);
    Scene {
        name: "twins".into(),
        origin: Vec3 {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        },
        materials: vec![Arc::clone(&wall), wall],
    }
}

#[test]
fn identical_materials_become_one_value_and_one_ref() {
    let registry = registry();
    let mut first = Vec::new();
    let mut writer = Writer::new(WriterConfig::default());
    let a = registry.serialize(&*material("wall", 0.5)).unwrap();
    let b = registry.serialize(&*material("wall", 0.5)).unwrap();
    assert_eq!(a.content_id(), b.content_id());

    writer.write_object(&mut first, &a).unwrap();
    let value_records = writer.stats().value_records;
    let mut second = Vec::new();
    writer.write_object(&mut second, &b).unwrap();
    assert_eq!(second.len(), REF_RECORD_LEN);
    assert_eq!(writer.stats().value_records, value_records);
    assert_eq!(writer.stats().ref_records, 1);

    let mut ctx = LoadContext::new();
    let mut reader = Reader::default();
    let ra = reader.read_object(&mut ctx, &mut first.as_slice()).unwrap();
    let rb = reader.read_object(&mut ctx, &mut second.as_slice()).unwrap();
    assert!(Arc::ptr_eq(&ra, &rb));
    assert_eq!(ctx.object_count(), 1);
    assert_eq!(reader.stats().ref_records, 1);
}

#[test]
fn shared_materials_resolve_to_one_native() {
    let registry = registry();
    let root = registry.serialize(&twin_scene()).unwrap();
    let mut out = Vec::new();
    Writer::new(WriterConfig::default())
        .write_object(&mut out, &root)
        .unwrap();

    let mut ctx = LoadContext::new();
    let read = Reader::default()
        .read_object(&mut ctx, &mut out.as_slice())
        .unwrap();
    let scene = registry.deserialize_as::<Scene>(&read, &mut ctx).unwrap();
    assert_eq!(scene.materials.len(), 2);
    assert!(Arc::ptr_eq(&scene.materials[0], &scene.materials[1]));
    assert_eq!(*scene.materials[0], *material("wall", 0.5));
}

#[test]
fn disabling_dedup_repeats_the_bytes_but_not_the_nodes() {
    let registry = registry();
    let root = registry.serialize(&twin_scene()).unwrap();

    let mut deduped = Vec::new();
    let stats_on = {
        let mut writer = Writer::new(WriterConfig::default());
        writer.write_object(&mut deduped, &root).unwrap();
        writer.finish()
    };
    let mut plain = Vec::new();
    let stats_off = {
        let mut writer = Writer::new(WriterConfig::default());
        writer
            .write(&mut plain, &root, None, WriteAttributes::with_dedup(false))
            .unwrap();
        writer.finish()
    };
    assert!(plain.len() > deduped.len());
    assert_eq!(stats_off.ref_records, 0);
    assert!(stats_on.ref_records >= 1);

    let mut ctx = LoadContext::new();
    let read = Reader::new(ReaderConfig::default())
        .read_object(&mut ctx, &mut plain.as_slice())
        .unwrap();
    let sequence = &read.children()[0];
    assert!(Arc::ptr_eq(&sequence.children()[0], &sequence.children()[1]));
    let materials = ctx
        .ids()
        .filter_map(|id| ctx.object(id))
        .filter(|node| node.is_or_extends("Material"))
        .count();
    assert_eq!(materials, 1);
}

#[test]
fn equal_structure_with_different_tags_is_not_shared() {
    let mut a = ObjectNode::new(TypeDescriptor::object_type("Left"));
    a.set("n", &1u32);
    let mut b = ObjectNode::new(TypeDescriptor::object_type("Right"));
    b.set("n", &1u32);

    let mut out = Vec::new();
    let mut writer = Writer::new(WriterConfig::default());
    writer.write_object(&mut out, &a).unwrap();
    writer.write_object(&mut out, &b).unwrap();
    assert_eq!(writer.stats().ref_records, 0);
    assert_eq!(writer.stats().value_records, 2);
}

#[test]
fn native_handles_are_cached_per_record() {
    let registry = registry();
    let wall = material("wall", 0.5);
    let mut out = Vec::new();
    let mut writer = Writer::new(WriterConfig::default());
    writer.write_native(&mut out, &registry, &*wall).unwrap();
    writer.write_native(&mut out, &registry, &*wall).unwrap();

    let mut ctx = LoadContext::new();
    let mut reader = Reader::default();
    let mut input = out.as_slice();
    let first = reader.read_native(&mut ctx, &registry, &mut input).unwrap();
    let second = reader.read_native(&mut ctx, &registry, &mut input).unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(first.downcast_ref::<Material>(), Some(&*wall));
}
