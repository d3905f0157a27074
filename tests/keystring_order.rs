//! KeyString Order Properties
//!
//! Byte order of encoded keys must match the natural order of the values
//! they encode, in both directions and across compound patterns.

#![allow(clippy::float_cmp)]

use std::cmp::Ordering;

use bson::Bson;
use proptest::prelude::*;
use storescope::keystring::{
    decode_entry, encode_key, Direction, KeyCodec, KeyPattern, NativeKeyCodec,
};

// =============================================================================
// Natural Ordering
// =============================================================================

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 1,
        Bson::String(_) => 2,
        Bson::Boolean(_) => 3,
        other => panic!("no rank for {:?}", other),
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

/// Exact comparison of an integer against a finite or infinite double
fn cmp_int_double(i: i64, d: f64) -> Ordering {
    if d >= 9.223_372_036_854_775_808e18 {
        return Ordering::Less;
    }
    if d < -9.223_372_036_854_775_808e18 {
        return Ordering::Greater;
    }
    let whole = d.trunc();
    match (i as i128).cmp(&(whole as i128)) {
        Ordering::Equal => 0.0f64.partial_cmp(&(d - whole)).unwrap_or(Ordering::Equal),
        other => other,
    }
}

fn natural_cmp(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::Double(x), Bson::Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Bson::Double(x), _) => cmp_int_double(as_i64(b).unwrap_or_default(), *x).reverse(),
        (_, Bson::Double(y)) => cmp_int_double(as_i64(a).unwrap_or_default(), *y),
        (Bson::Null, Bson::Null) => Ordering::Equal,
        _ => as_i64(a).cmp(&as_i64(b)),
    }
}

fn tuple_cmp(a: &[Bson], b: &[Bson], directions: &[Direction]) -> Ordering {
    for ((x, y), direction) in a.iter().zip(b).zip(directions) {
        let ord = natural_cmp(x, y);
        let ord = match direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

// =============================================================================
// Strategies
// =============================================================================

fn arb_scalar() -> impl Strategy<Value = Bson> {
    prop_oneof![
        Just(Bson::Null),
        any::<bool>().prop_map(Bson::Boolean),
        any::<i32>().prop_map(Bson::Int32),
        any::<i64>().prop_map(Bson::Int64),
        (-1000i64..1000).prop_map(Bson::Int64),
        any::<f64>().prop_filter("not NaN", |f| !f.is_nan()).prop_map(Bson::Double),
        (-1000i32..1000, 0u8..4).prop_map(|(whole, quarter)| Bson::Double(whole as f64 + quarter as f64 / 4.0)),
        "[a-c\\x00]{0,6}".prop_map(Bson::String),
        ".{0,12}".prop_map(Bson::String),
    ]
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Ascending), Just(Direction::Descending)]
}

fn pattern(directions: &[Direction]) -> KeyPattern {
    KeyPattern::new(
        directions
            .iter()
            .enumerate()
            .map(|(i, direction)| (format!("f{}", i), *direction))
            .collect(),
    )
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_single_field_order_preserved(a in arb_scalar(), b in arb_scalar(), direction in arb_direction()) {
        let pattern = pattern(&[direction]);
        let (key_a, _) = encode_key(std::slice::from_ref(&a), &pattern, 1).unwrap();
        let (key_b, _) = encode_key(std::slice::from_ref(&b), &pattern, 1).unwrap();

        match tuple_cmp(&[a.clone()], &[b.clone()], &[direction]) {
            Ordering::Less => prop_assert!(key_a < key_b, "{:?} < {:?}", a, b),
            Ordering::Greater => prop_assert!(key_a > key_b, "{:?} > {:?}", a, b),
            // 2 and 2.0 are equal values with distinct encodings
            Ordering::Equal => {}
        }
    }

    #[test]
    fn prop_compound_order_preserved(
        fields in prop::collection::vec((arb_scalar(), arb_scalar(), arb_direction()), 1..4),
    ) {
        let a: Vec<Bson> = fields.iter().map(|f| f.0.clone()).collect();
        let b: Vec<Bson> = fields.iter().map(|f| f.1.clone()).collect();
        let directions: Vec<Direction> = fields.iter().map(|f| f.2).collect();
        let pattern = pattern(&directions);

        let (key_a, _) = encode_key(&a, &pattern, 7).unwrap();
        let (key_b, _) = encode_key(&b, &pattern, 7).unwrap();

        match tuple_cmp(&a, &b, &directions) {
            Ordering::Less => prop_assert!(key_a < key_b),
            Ordering::Greater => prop_assert!(key_a > key_b),
            Ordering::Equal => {}
        }
    }

    #[test]
    fn prop_equal_values_order_by_record_id(value in arb_scalar(), r1 in any::<i64>(), r2 in any::<i64>()) {
        let pattern = KeyPattern::ascending(&["v"]);
        let (key_1, _) = encode_key(std::slice::from_ref(&value), &pattern, r1).unwrap();
        let (key_2, _) = encode_key(std::slice::from_ref(&value), &pattern, r2).unwrap();
        prop_assert_eq!(key_1.cmp(&key_2), r1.cmp(&r2));
    }

    #[test]
    fn prop_decode_recovers_values(
        value in arb_scalar(),
        direction in arb_direction(),
        record_id in any::<i64>(),
    ) {
        let pattern = pattern(&[direction]);
        let (key, type_bits) = encode_key(std::slice::from_ref(&value), &pattern, record_id).unwrap();

        let (decoded, decoded_id) = decode_entry(&key, &type_bits, &pattern).unwrap();
        prop_assert_eq!(decoded_id, record_id);
        let got = decoded.get("f0").unwrap();
        match (&value, got) {
            // -0.0 is normalised to 0.0
            (Bson::Double(x), Bson::Double(y)) => prop_assert!(x == y),
            _ => prop_assert_eq!(got, &value),
        }

        let through_codec = NativeKeyCodec.decode(&key, &type_bits, &pattern).unwrap();
        prop_assert_eq!(through_codec.key, decoded);
    }
}

// =============================================================================
// Fixed Cases
// =============================================================================

#[test]
fn test_id_index_keeps_record_id_in_value() {
    let pattern = KeyPattern::id();
    let (key, value) = encode_key(&[Bson::Int32(5)], &pattern, 42).unwrap();
    let (decoded, record_id) = decode_entry(&key, &value, &pattern).unwrap();
    assert_eq!(record_id, 42);
    assert_eq!(decoded.get("_id"), Some(&Bson::Int32(5)));

    // Same value, different record: identical key
    let (other_key, _) = encode_key(&[Bson::Int32(5)], &pattern, 43).unwrap();
    assert_eq!(key, other_key);
}

#[test]
fn test_type_classes_order() {
    let pattern = KeyPattern::ascending(&["v"]);
    let ordered = [
        Bson::MinKey,
        Bson::Null,
        Bson::Int64(i64::MIN),
        Bson::Double(-0.5),
        Bson::Int32(0),
        Bson::Double(f64::INFINITY),
        Bson::String(String::new()),
        Bson::String("a".into()),
        Bson::Boolean(false),
        Bson::Boolean(true),
        Bson::MaxKey,
    ];
    let keys: Vec<Vec<u8>> = ordered
        .iter()
        .map(|v| encode_key(std::slice::from_ref(v), &pattern, 0).unwrap().0)
        .collect();
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}
