//! Unit tests for the primitive codec and field containers.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use rstest::rstest;

use super::{
    CodecError,
    Cursor,
    FieldArray,
    FieldTable,
    FieldValue,
    write_long_str,
    write_short_str,
    write_u16,
    write_u32,
};

#[rstest]
#[case(&[0x12, 0x34][..], 0x1234_u16)]
#[case(&[0x00, 0x01][..], 1_u16)]
#[case(&[0xFF, 0xFF][..], u16::MAX)]
fn u16_decodes_network_order(#[case] bytes: &[u8], #[case] expected: u16) {
    let mut cur = Cursor::new(bytes);
    assert_eq!(cur.read_u16().expect("two bytes present"), expected);
    assert!(cur.is_exhausted());
}

#[test]
fn truncated_read_leaves_cursor_at_start() {
    let mut cur = Cursor::new(&[0x01, 0x02, 0x03]);
    cur.read_u16().expect("two bytes present");
    let err = cur.read_u32().expect_err("only one byte left");
    assert_eq!(err, CodecError::TruncatedInput { at: 2, need: 3 });
    // Retrying smaller reads from the same offset still works.
    assert_eq!(cur.position(), 2);
    assert_eq!(cur.read_u8().expect("one byte left"), 0x03);
}

#[test]
fn short_str_rewinds_over_length_byte_on_truncation() {
    // Length byte claims 5 content bytes, only 2 present.
    let mut cur = Cursor::new(&[0x05, b'a', b'b']);
    let err = cur.read_short_str().expect_err("content truncated");
    assert!(err.is_truncated());
    assert_eq!(cur.position(), 0);
}

#[test]
fn short_str_rejects_invalid_utf8() {
    let mut cur = Cursor::new(&[0x02, 0xFF, 0xFE]);
    assert_eq!(
        cur.read_short_str().expect_err("bad utf-8"),
        CodecError::InvalidUtf8
    );
}

#[test]
fn long_str_roundtrip_carries_binary() {
    let mut dst = BytesMut::new();
    write_long_str(&mut dst, &[0x00, 0xCE, 0xFF]).expect("fits prefix");
    let mut cur = Cursor::new(&dst);
    assert_eq!(cur.read_long_str().expect("present"), &[0x00, 0xCE, 0xFF]);
}

#[test]
fn short_str_longer_than_255_bytes_is_rejected_on_encode() {
    let mut dst = BytesMut::new();
    let oversize = "x".repeat(256);
    assert_eq!(
        write_short_str(&mut dst, &oversize).expect_err("too long"),
        CodecError::ValueTooLong { len: 256, max: 255 }
    );
}

#[test]
fn unknown_table_tag_is_a_hard_error() {
    let mut dst = BytesMut::new();
    // Table of 6 bytes: key "k" then tag 'Z' (unknown) and a payload byte.
    write_u32(&mut dst, 5);
    dst.extend_from_slice(&[0x01, b'k', b'Z', 0x00, 0x00]);
    let err = FieldTable::decode(&mut Cursor::new(&dst)).expect_err("unknown tag");
    assert_eq!(err, CodecError::UnknownTag { tag: b'Z' });
}

#[test]
fn table_overrun_is_not_reported_as_truncation() {
    let mut dst = BytesMut::new();
    // Declared length covers the key but cuts the i32 value short.
    write_u32(&mut dst, 5);
    dst.extend_from_slice(&[0x01, b'k', b'I', 0x00, 0x00]);
    let err = FieldTable::decode(&mut Cursor::new(&dst)).expect_err("overrun");
    assert_eq!(err, CodecError::LengthOverrun { declared: 5 });
    assert!(!err.is_truncated());
}

#[test]
fn truncated_table_prefix_rewinds_fully() {
    let mut dst = BytesMut::new();
    write_u32(&mut dst, 64);
    dst.extend_from_slice(&[0x01, b'k']);
    let mut cur = Cursor::new(&dst);
    let err = FieldTable::decode(&mut cur).expect_err("region incomplete");
    assert!(err.is_truncated());
    assert_eq!(cur.position(), 0);
}

#[test]
fn table_preserves_insertion_order() {
    let mut table = FieldTable::new();
    table.insert("zebra", 1_i32);
    table.insert("alpha", 2_i32);
    table.insert("mike", true);
    let keys: Vec<_> = table.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["zebra", "alpha", "mike"]);

    let mut dst = BytesMut::new();
    table.encode(&mut dst).expect("encodable");
    let decoded = FieldTable::decode(&mut Cursor::new(&dst)).expect("decodable");
    let decoded_keys: Vec<_> = decoded.iter().map(|(k, _)| k).collect();
    assert_eq!(decoded_keys, ["zebra", "alpha", "mike"]);
}

#[test]
fn table_insert_replaces_in_place() {
    let mut table = FieldTable::new();
    table.insert("a", 1_i32);
    table.insert("b", 2_i32);
    table.insert("a", 9_i32);
    assert_eq!(table.len(), 2);
    assert_eq!(table.get("a"), Some(&FieldValue::I32(9)));
    let keys: Vec<_> = table.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["a", "b"]);
}

#[test]
fn nested_containers_roundtrip() {
    let mut inner = FieldTable::new();
    inner.insert("flag", false);
    let array: FieldArray = vec![
        FieldValue::I64(-9),
        FieldValue::Decimal { scale: 2, value: 314 },
        FieldValue::Void,
    ]
    .into_iter()
    .collect();
    let mut table = FieldTable::new();
    table.insert("nested", FieldValue::Table(inner.clone()));
    table.insert("list", FieldValue::Array(array.clone()));
    table.insert("stamp", FieldValue::Timestamp(1_700_000_000));

    let mut dst = BytesMut::new();
    table.encode(&mut dst).expect("encodable");
    let decoded = FieldTable::decode(&mut Cursor::new(&dst)).expect("decodable");
    assert_eq!(decoded.get("nested"), Some(&FieldValue::Table(inner)));
    assert_eq!(decoded.get("list"), Some(&FieldValue::Array(array)));
}

#[test]
fn empty_table_is_four_zero_bytes() {
    let mut dst = BytesMut::new();
    FieldTable::new().encode(&mut dst).expect("encodable");
    assert_eq!(&dst[..], &[0, 0, 0, 0]);
    let decoded = FieldTable::decode(&mut Cursor::new(&dst)).expect("decodable");
    assert!(decoded.is_empty());
}

fn field_value_strategy() -> impl Strategy<Value = FieldValue> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(FieldValue::Bool),
        any::<i8>().prop_map(FieldValue::I8),
        any::<i16>().prop_map(FieldValue::I16),
        any::<i32>().prop_map(FieldValue::I32),
        any::<i64>().prop_map(FieldValue::I64),
        any::<u64>().prop_map(FieldValue::Timestamp),
        (any::<u8>(), any::<u32>())
            .prop_map(|(scale, value)| FieldValue::Decimal { scale, value }),
        "[a-z0-9 ]{0,32}".prop_map(FieldValue::ShortStr),
        proptest::collection::vec(any::<u8>(), 0..64)
            .prop_map(|v| FieldValue::LongStr(Bytes::from(v))),
        Just(FieldValue::Void),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4)
                .prop_map(|items| FieldValue::Array(items.into_iter().collect())),
            proptest::collection::vec(("[a-z]{1,8}", inner), 0..4).prop_map(|entries| {
                let mut table = FieldTable::new();
                for (key, value) in entries {
                    table.insert(key, value);
                }
                FieldValue::Table(table)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn field_value_roundtrips(value in field_value_strategy()) {
        let mut dst = BytesMut::new();
        value.encode(&mut dst).expect("encodable");
        let mut cur = Cursor::new(&dst);
        let decoded = FieldValue::decode(&mut cur).expect("decodable");
        prop_assert_eq!(decoded, value);
        prop_assert!(cur.is_exhausted());
    }

    #[test]
    fn integers_roundtrip_bytes(v in any::<u32>()) {
        let mut dst = BytesMut::new();
        write_u32(&mut dst, v);
        let mut re = BytesMut::new();
        write_u16(&mut re, u16::try_from(v >> 16).expect("high half"));
        write_u16(&mut re, u16::try_from(v & 0xFFFF).expect("low half"));
        prop_assert_eq!(&dst[..], &re[..]);
    }
}
