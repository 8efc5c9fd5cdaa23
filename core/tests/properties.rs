//! Property-based tests for values, descriptors, containers and the wire
//! codec.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use proptest::prelude::*;
use propsync::arena::ModelArena;
use propsync::document::Document;
use propsync::property::{Kind, NoReferences, PropertyDescriptor};
use propsync::registry::{TypeDef, TypeRegistry};
use propsync::serialization::{Deserializer, Serializer};
use propsync::value::Value;
use propsync::Error;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-(1i64 << 53) + 1..(1i64 << 53)).prop_map(Value::Int),
        (-1_000_000i32..1_000_000).prop_map(|n| Value::Float(f64::from(n) / 4.0)),
        Just(Value::Float(f64::NAN)),
        Just(Value::Float(f64::INFINITY)),
        Just(Value::Float(f64::NEG_INFINITY)),
        "[a-z]{0,8}".prop_map(Value::String),
        "[a-z]{1,6}".prop_map(Value::Symbol),
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::set),
            proptest::collection::vec((scalar(), inner), 0..6).prop_map(|pairs| {
                let mut entries: Vec<(Value, Value)> = Vec::new();
                for (k, v) in pairs {
                    if !entries.iter().any(|(seen, _)| *seen == k) {
                        entries.push((k, v));
                    }
                }
                Value::Map(entries)
            }),
        ]
    })
}

fn registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    registry
        .register(
            TypeDef::new("Holder")
                .property(PropertyDescriptor::new("count", Kind::Int))
                .property(PropertyDescriptor::new("items", Kind::list(Kind::Int)))
                .property(PropertyDescriptor::new("lookup", Kind::dict(Kind::String, Kind::Int)))
                .property(PropertyDescriptor::new("anything", Kind::Any)),
        )
        .expect("registers");
    Arc::new(registry)
}

// =============================================================================
// Wire codec
// =============================================================================

proptest! {
    /// decode(encode(v)) == v, with deferred and inline buffers alike
    #[test]
    fn prop_codec_round_trip(v in value(), deferred: bool) {
        let arena = ModelArena::new();
        let mut serializer = Serializer::new(&arena).deferred(deferred);
        let encoded = serializer.serialize(&v).expect("plain values encode");
        prop_assert_eq!(encoded.buffers.is_empty() || deferred, true);

        let registry = TypeRegistry::new();
        let mut de = Deserializer::new(&registry, &arena);
        let decoded = de.deserialize(&encoded).expect("own output decodes");
        prop_assert_eq!(decoded, v);
    }

    /// Encoded output only uses JSON numbers for finite floats
    #[test]
    fn prop_non_finite_floats_are_tagged(f: f64) {
        let arena = ModelArena::new();
        let json = Serializer::new(&arena).encode(&Value::Float(f)).expect("encodes");
        prop_assert_eq!(json.is_number(), f.is_finite());
    }
}

// =============================================================================
// Descriptors
// =============================================================================

proptest! {
    /// A value accepted by a kind reads back unchanged
    #[test]
    fn prop_descriptor_round_trip(n in any::<i64>()) {
        let desc = PropertyDescriptor::new("count", Kind::Int);
        let stored = desc.prepare("Holder", Value::Int(n), &NoReferences).expect("ints accepted");
        prop_assert_eq!(stored, Value::Int(n));
    }

    /// A rejected set leaves the previous value in place
    #[test]
    fn prop_invalid_set_keeps_value(n in any::<i32>(), bad in "[a-z]{1,8}") {
        let mut doc = Document::new(registry());
        let holder = doc.create("Holder").expect("concrete");
        doc.set(&holder, "count", n).expect("valid");
        let err = doc.set(&holder, "count", bad.as_str()).expect_err("strings rejected");
        prop_assert!(matches!(err, Error::Validation(_)));
        prop_assert_eq!(doc.get(&holder, "count").expect("declared"), Value::from(n));
    }
}

// =============================================================================
// Containers
// =============================================================================

proptest! {
    /// Every successful mutation notifies exactly once, reads never do
    #[test]
    fn prop_container_mutations_notify_once(items in proptest::collection::vec(any::<i32>(), 1..12)) {
        let mut doc = Document::new(registry());
        let holder = doc.create("Holder").expect("concrete");
        doc.add_root(&holder).expect("owned");
        let count = Rc::new(RefCell::new(0usize));
        let counter = Rc::clone(&count);
        doc.on_change(move |_| *counter.borrow_mut() += 1);

        for item in &items {
            doc.list_mut(&holder, "items").push(*item).expect("ints accepted");
        }
        prop_assert_eq!(*count.borrow(), items.len());

        let list = doc.list_mut(&holder, "items");
        prop_assert_eq!(list.len().expect("list"), items.len());
        prop_assert_eq!(list.get(0).expect("list"), Some(Value::from(items[0])));
        prop_assert_eq!(*count.borrow(), items.len());

        // Sorting an already sorted list still notifies.
        doc.list_mut(&holder, "items").sort().expect("sortable");
        doc.list_mut(&holder, "items").sort().expect("sortable");
        prop_assert_eq!(*count.borrow(), items.len() + 2);

        // Failed operations leave value and observers alone.
        let before = doc.get(&holder, "items").expect("declared");
        prop_assert!(doc.list_mut(&holder, "items").push("nope").is_err());
        prop_assert!(doc.dict_mut(&holder, "lookup").remove("missing").is_err());
        prop_assert_eq!(doc.get(&holder, "items").expect("declared"), before);
        prop_assert_eq!(*count.borrow(), items.len() + 2);
    }

    /// Plain sets of an equal value are silent
    #[test]
    fn prop_equal_sets_are_silent(v in value()) {
        let mut doc = Document::new(registry());
        let holder = doc.create("Holder").expect("concrete");
        doc.add_root(&holder).expect("owned");
        doc.set(&holder, "anything", v.clone()).expect("any value");
        let count = Rc::new(RefCell::new(0usize));
        let counter = Rc::clone(&count);
        doc.on_change(move |_| *counter.borrow_mut() += 1);
        doc.set(&holder, "anything", v).expect("any value");
        prop_assert_eq!(*count.borrow(), 0);
    }
}
