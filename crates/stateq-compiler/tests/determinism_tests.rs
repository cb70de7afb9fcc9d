//! Determinism: identical questions compile to byte-identical artifacts
//! and hashes, which is what lets the runtime cache by content.

mod common;

use common::{compiled, journey};
use stateq_compiler::{compile_json, content_hash};
use stateq_types::CompileOptions;

#[test]
fn test_json_output_is_stable_over_100_runs() {
    let doc = journey().to_string();
    let options = CompileOptions::default();
    let first = compile_json(&doc, &options);
    for i in 0..100 {
        assert_eq!(compile_json(&doc, &options), first, "run {i} differs");
    }
}

#[test]
fn test_hash_is_hex_sha256() {
    let q = compiled(journey());
    assert_eq!(q.content_hash.len(), 64);
    assert!(q.content_hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(q.content_hash, content_hash(&q.artifacts));
}

#[test]
fn test_hash_follows_generated_code() {
    let base = compiled(journey());

    let mut doc = journey();
    doc["question_variables"] = "a: 4; b: a^2".into();
    assert_ne!(compiled(doc).content_hash, base.content_hash);

    // Display-only changes that leave every artifact alone keep the hash.
    let mut doc = journey();
    doc["state_variables"][0]["type"] = "any".into();
    assert_eq!(compiled(doc).content_hash, base.content_hash);
}

#[test]
fn test_scene_order_does_not_change_keys() {
    let mut doc = journey();
    let scenes = doc["scenes"].as_array_mut().unwrap();
    scenes.swap(0, 1);
    doc["entry_scene"] = "s1".into();
    let swapped = compiled(doc);
    let base = compiled(journey());
    assert_eq!(
        swapped.artifacts.keys().collect::<Vec<_>>(),
        base.artifacts.keys().collect::<Vec<_>>()
    );
    assert_eq!(swapped.entry_scene, "s1");
}
