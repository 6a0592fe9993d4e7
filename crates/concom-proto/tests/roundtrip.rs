//! Property: decoding an encoded dynamic value yields the same value, for
//! any finite value the model can express, including after a trip through
//! JSON transport.

use std::collections::BTreeMap;

use concom_proto::{DynamicValue, Scalar, WireConfig};
use proptest::prelude::*;

fn arb_scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        "[a-zA-Z0-9 _.-]{0,24}".prop_map(Scalar::String),
        any::<i64>().prop_map(Scalar::Int),
        any::<bool>().prop_map(Scalar::Bool),
        // Restrict floats to finite values that survive JSON, where NaN and
        // infinities do not exist.
        (-1.0e6f32..1.0e6f32).prop_map(Scalar::Float),
        (-1.0e12f64..1.0e12f64).prop_map(Scalar::Double),
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(Scalar::Bytes),
    ]
}

fn arb_uniform_scalar_list() -> impl Strategy<Value = Vec<Scalar>> {
    prop_oneof![
        proptest::collection::vec("[a-z]{0,8}".prop_map(Scalar::String), 0..4),
        proptest::collection::vec(any::<i64>().prop_map(Scalar::Int), 0..4),
        proptest::collection::vec(any::<bool>().prop_map(Scalar::Bool), 0..4),
    ]
}

fn arb_value() -> impl Strategy<Value = DynamicValue> {
    let leaf = prop_oneof![
        arb_scalar().prop_map(DynamicValue::Scalar),
        arb_uniform_scalar_list().prop_map(DynamicValue::ScalarList),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        let map = proptest::collection::btree_map("[a-z_]{1,8}", inner, 0..4);
        prop_oneof![
            map.clone().prop_map(DynamicValue::Map),
            proptest::collection::vec(map, 0..3).prop_map(DynamicValue::MapList),
        ]
    })
}

fn arb_config() -> impl Strategy<Value = BTreeMap<String, DynamicValue>> {
    proptest::collection::btree_map("[a-z_]{1,8}", arb_value(), 0..4)
}

proptest! {
    #[test]
    fn roundtrip_preserves_value(map in arb_config()) {
        let wire = WireConfig::encode(&map).unwrap();
        prop_assert_eq!(wire.decode().unwrap(), DynamicValue::Map(map));
    }

    #[test]
    fn roundtrip_survives_json_transport(map in arb_config()) {
        let wire = WireConfig::encode(&map).unwrap();
        let transported = WireConfig::from_json_value(wire.to_json_value()).unwrap();
        prop_assert_eq!(transported.decode().unwrap(), DynamicValue::Map(map));
    }
}
