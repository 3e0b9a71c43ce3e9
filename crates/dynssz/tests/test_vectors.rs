//! Wire-format vectors with literal expected bytes and roots.

use dynssz::{DynSsz, FieldDef, NoSpecs, SszError, TypeDef, Value};

fn static_payload_def() -> std::sync::Arc<TypeDef> {
    TypeDef::container(
        "Payload",
        vec![
            FieldDef::new("a", TypeDef::uint64()),
            FieldDef::new("b", TypeDef::uint32()),
            FieldDef::new("c", TypeDef::bool()),
            FieldDef::new("d", TypeDef::uint16()),
        ],
    )
}

fn payload(a: u64, b: u32, c: bool, d: u16) -> Value {
    Value::Container(vec![
        Value::Uint64(a),
        Value::Uint32(b),
        Value::Bool(c),
        Value::Uint16(d),
    ])
}

#[test]
fn static_container_encoding() {
    let codec = DynSsz::new(NoSpecs);
    let def = static_payload_def();
    let value = payload(1, 2, true, 4);

    let bytes = codec.encode(&def, &value).unwrap();
    assert_eq!(hex::encode(&bytes), "010000000000000002000000010400");
    assert_eq!(codec.size(&def, &value).unwrap(), bytes.len());
    assert_eq!(codec.decode(&def, &bytes).unwrap(), value);

    // encode_to appends after the buffer's existing contents.
    let prefixed = codec.encode_to(&def, &value, vec![0xaa]).unwrap();
    assert_eq!(prefixed[0], 0xaa);
    assert_eq!(&prefixed[1..], &bytes[..]);
}

#[test]
fn static_container_root() {
    let codec = DynSsz::new(NoSpecs);
    let def = static_payload_def();
    let root = codec.hash_tree_root(&def, &payload(1, 2, true, 4)).unwrap();
    assert_eq!(
        hex::encode(root.as_slice()),
        "4138be0e47d6daea84065f2a1e4435e16d2b269f9c2c8fcf9e6cf03de1d5026e"
    );
}

#[test]
fn container_with_static_element_list() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Batch",
        vec![
            FieldDef::new("id", TypeDef::uint64()),
            FieldDef::new("items", TypeDef::slice(static_payload_def()))
                .with_tags(r#"ssz-max:"128""#),
        ],
    );
    let value = Value::Container(vec![
        Value::Uint64(1),
        Value::List(vec![payload(1, 2, true, 4), payload(5, 6, true, 8)]),
    ]);

    let bytes = codec.encode(&def, &value).unwrap();
    assert_eq!(
        hex::encode(&bytes),
        "01000000000000000c000000010000000000000002000000010400050000000000000006000000010800"
    );
    assert_eq!(codec.size(&def, &value).unwrap(), bytes.len());
    assert_eq!(codec.decode(&def, &bytes).unwrap(), value);
}

#[test]
fn empty_dynamic_field_points_past_fixed_region() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Sparse",
        vec![
            FieldDef::new("tag", TypeDef::uint32()),
            FieldDef::new("rest", TypeDef::slice(TypeDef::uint64()))
                .with_tags(r#"ssz-max:"16""#),
        ],
    );
    let value = Value::Container(vec![Value::Uint32(42), Value::List(vec![])]);

    let bytes = codec.encode(&def, &value).unwrap();
    // 4-byte fixed field + 4-byte offset slot; the offset equals the
    // fixed-region length and the variable region is empty.
    assert_eq!(hex::encode(&bytes), "2a00000008000000");
    assert_eq!(codec.decode(&def, &bytes).unwrap(), value);
}

#[test]
fn invalid_union_selector_is_rejected() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::union(
        "Either",
        vec![
            FieldDef::new("small", TypeDef::uint32()),
            FieldDef::new("large", TypeDef::uint64()),
        ],
    );
    let err = codec.decode(&def, &[0x05, 0, 0, 0, 0]).unwrap_err();
    assert!(matches!(
        err,
        SszError::InvalidUnionVariant { selector: 0x05 }
    ));
}

#[test]
fn union_round_trip_and_selector_byte() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::union(
        "Either",
        vec![
            FieldDef::new("small", TypeDef::uint32()),
            FieldDef::new("large", TypeDef::uint64()),
        ],
    );
    let value = Value::Union(1, Box::new(Value::Uint64(0x0807060504030201)));
    let bytes = codec.encode(&def, &value).unwrap();
    assert_eq!(hex::encode(&bytes), "010102030405060708");
    assert_eq!(codec.decode(&def, &bytes).unwrap(), value);
}

#[test]
fn unterminated_bitlist_is_rejected() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Flags",
        vec![FieldDef::new("bits", TypeDef::bits()).with_tags(r#"ssz-max:"64""#)],
    );
    // Offset 4, then a single 0x00 byte: no sentinel bit.
    let bytes = [0x04, 0x00, 0x00, 0x00, 0x00];
    assert!(matches!(
        codec.decode(&def, &bytes).unwrap_err(),
        SszError::BitlistNotTerminated
    ));
}

#[test]
fn bad_first_offset_is_rejected() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "OneDyn",
        vec![
            FieldDef::new("xs", TypeDef::slice(TypeDef::uint8()))
                .with_tags(r#"ssz-max:"256""#),
        ],
    );
    // Fixed region is one 4-byte offset slot; 0xff points far outside.
    let bytes = [0xff, 0x00, 0x00, 0x00];
    assert!(matches!(
        codec.decode(&def, &bytes).unwrap_err(),
        SszError::IncorrectOffset { .. }
    ));
}

#[test]
fn decreasing_offsets_are_rejected() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "TwoDyn",
        vec![
            FieldDef::new("xs", TypeDef::slice(TypeDef::uint8()))
                .with_tags(r#"ssz-max:"256""#),
            FieldDef::new("ys", TypeDef::slice(TypeDef::uint8()))
                .with_tags(r#"ssz-max:"256""#),
        ],
    );
    let bytes = [
        0x08, 0x00, 0x00, 0x00, // first offset = 8 (fixed length, ok)
        0x07, 0x00, 0x00, 0x00, // second offset decreases
        0xaa,
    ];
    assert!(matches!(
        codec.decode(&def, &bytes).unwrap_err(),
        SszError::IncorrectOffset { offset: 7, .. }
    ));
}

#[test]
fn bitvector_literal_and_padding() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Vote",
        vec![FieldDef::new("bits", TypeDef::bits()).with_tags(r#"ssz-bitsize:"10""#)],
    );
    let value = Value::Container(vec![Value::Bits(dynssz::BitSeq::from_bools(&[
        true, false, true, false, false, false, false, false, true, true,
    ]))]);
    let bytes = codec.encode(&def, &value).unwrap();
    assert_eq!(hex::encode(&bytes), "0503");
    assert_eq!(codec.decode(&def, &bytes).unwrap(), value);

    // Bits above the declared length must be zero.
    assert!(matches!(
        codec.decode(&def, &[0x05, 0x0f]).unwrap_err(),
        SszError::BitvectorPaddingNonZero
    ));
}

#[test]
fn bitlist_sentinel_literal() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Flags",
        vec![FieldDef::new("bits", TypeDef::bits()).with_tags(r#"ssz-bitmax:"64""#)],
    );
    let value = Value::Container(vec![Value::Bits(dynssz::BitSeq::from_bools(&[
        true, true, false, true,
    ]))]);
    let bytes = codec.encode(&def, &value).unwrap();
    // Offset 4, then data bits 1011 plus the sentinel at position 4.
    assert_eq!(hex::encode(&bytes), "040000001b");
    assert_eq!(codec.decode(&def, &bytes).unwrap(), value);
}

#[test]
fn uint256_is_raw_little_endian() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Balance",
        vec![FieldDef::new("wei", TypeDef::uint256())],
    );
    let value = Value::Container(vec![Value::Uint256(dynssz::U256::from(0xdeadbeefu64))]);
    let bytes = codec.encode(&def, &value).unwrap();
    assert_eq!(
        hex::encode(&bytes),
        "efbeadde00000000000000000000000000000000000000000000000000000000"
    );
    assert_eq!(codec.decode(&def, &bytes).unwrap(), value);
}

#[test]
fn list_too_big_is_rejected() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Tight",
        vec![
            FieldDef::new("xs", TypeDef::slice(TypeDef::uint64()))
                .with_tags(r#"ssz-max:"2""#),
        ],
    );
    // Offset 4 then three u64 bodies: 3 > max 2.
    let mut bytes = vec![0x04, 0x00, 0x00, 0x00];
    bytes.extend_from_slice(&[0u8; 24]);
    assert!(matches!(
        codec.decode(&def, &bytes).unwrap_err(),
        SszError::ListTooBig { len: 3, max: 2 }
    ));
}

#[test]
fn short_input_is_unexpected_eof() {
    let codec = DynSsz::new(NoSpecs);
    let def = static_payload_def();
    assert!(matches!(
        codec.decode(&def, &[0x01, 0x02]).unwrap_err(),
        SszError::InvalidByteLength { len: 2, expected: 15 }
    ));
}
