//! View descriptors: schema-ordered wire layout over runtime field
//! indices.

use dynssz::{DynSsz, FieldDef, NoSpecs, SszError, TypeDef, Value};

#[test]
fn view_reorders_and_subsets_fields() {
    let codec = DynSsz::new(NoSpecs);
    let runtime = TypeDef::container(
        "Full",
        vec![
            FieldDef::new("a", TypeDef::uint64()),
            FieldDef::new("b", TypeDef::uint32()),
            FieldDef::new("c", TypeDef::uint16()),
        ],
    );
    let view = TypeDef::container(
        "Narrow",
        vec![
            FieldDef::new("c", TypeDef::uint16()),
            FieldDef::new("a", TypeDef::uint64()),
        ],
    );

    let value = Value::Container(vec![
        Value::Uint64(0x1111_2222_3333_4444),
        Value::Uint32(0xdead_beef),
        Value::Uint16(0x0102),
    ]);

    // The wire layout follows the schema's declaration order; data access
    // follows the runtime layout.
    let bytes = codec.encode_view(&runtime, &view, &value).unwrap();
    assert_eq!(hex::encode(&bytes), "02014444333322221111");
    assert_eq!(codec.size_view(&runtime, &view, &value).unwrap(), 10);

    // Decoding under the view fills the runtime slots it covers.
    let decoded = codec.decode_view(&runtime, &view, &bytes).unwrap();
    let slots = match &decoded {
        Value::Container(slots) => slots,
        other => panic!("expected container, got {other:?}"),
    };
    assert_eq!(slots[0], Value::Uint64(0x1111_2222_3333_4444));
    assert_eq!(slots[2], Value::Uint16(0x0102));

    // Round-trip under the same view reproduces the bytes.
    assert_eq!(codec.encode_view(&runtime, &view, &decoded).unwrap(), bytes);

    // The full runtime layout is unaffected.
    let full_bytes = codec.encode(&runtime, &value).unwrap();
    assert_eq!(full_bytes.len(), 14);
    assert_ne!(full_bytes, bytes);
}

#[test]
fn view_with_dynamic_field_keeps_schema_order() {
    let codec = DynSsz::new(NoSpecs);
    let runtime = TypeDef::container(
        "Record",
        vec![
            FieldDef::new("x", TypeDef::uint8()),
            FieldDef::new("data", TypeDef::slice(TypeDef::uint8()))
                .with_tags(r#"ssz-max:"64""#),
            FieldDef::new("y", TypeDef::uint16()),
        ],
    );
    let view = TypeDef::container(
        "Trimmed",
        vec![
            FieldDef::new("y", TypeDef::uint16()),
            FieldDef::new("data", TypeDef::slice(TypeDef::uint8()))
                .with_tags(r#"ssz-max:"64""#),
        ],
    );

    let value = Value::Container(vec![
        Value::Uint8(9),
        Value::Bytes(b"viewdata".to_vec()),
        Value::Uint16(0x0708),
    ]);

    let bytes = codec.encode_view(&runtime, &view, &value).unwrap();
    // Fixed region: u16 + one offset slot (6 bytes), then the body.
    assert_eq!(hex::encode(&bytes), format!("080706000000{}", hex::encode(b"viewdata")));

    let decoded = codec.decode_view(&runtime, &view, &bytes).unwrap();
    assert_eq!(codec.encode_view(&runtime, &view, &decoded).unwrap(), bytes);

    // Streamed encode and decode agree under views too.
    let streamed = codec
        .encode_stream_view(&runtime, &view, &value, Vec::new())
        .unwrap();
    assert_eq!(streamed, bytes);
    let decoded_stream = codec
        .decode_stream_view(&runtime, &view, std::io::Cursor::new(&bytes), bytes.len())
        .unwrap();
    assert_eq!(decoded_stream, decoded);

    // The roots differ between view and runtime layouts but are stable.
    let view_root = codec.hash_tree_root_view(&runtime, &view, &value).unwrap();
    assert_eq!(
        codec.hash_tree_root_view(&runtime, &view, &decoded).unwrap(),
        view_root
    );
    assert_ne!(codec.hash_tree_root(&runtime, &value).unwrap(), view_root);
}

#[test]
fn view_field_missing_from_runtime_fails() {
    let codec = DynSsz::new(NoSpecs);
    let runtime = TypeDef::container(
        "Full",
        vec![FieldDef::new("a", TypeDef::uint64())],
    );
    let view = TypeDef::container(
        "Bad",
        vec![FieldDef::new("ghost", TypeDef::uint64())],
    );
    assert!(matches!(
        codec.encode_view(&runtime, &view, &Value::Container(vec![Value::Uint64(1)])),
        Err(SszError::ViewFieldMissing { .. })
    ));
}
