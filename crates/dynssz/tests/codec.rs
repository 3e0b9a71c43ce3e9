//! Round-trip, streaming-equivalence and capability properties.

use std::{any::Any, sync::Arc};

use dynssz::{
    BitSeq, CapabilityFlags, CustomValue, CustomVtable, DynSsz, FieldDef, HashWalker,
    MapResolver, NoSpecs, SpecResolver, SszDelegate, SszError, TypeDef, Value,
    merkle,
};

fn roundtrip(codec: &DynSsz, def: &Arc<TypeDef>, value: &Value) -> Vec<u8> {
    let bytes = codec.encode(def, value).unwrap();
    assert_eq!(codec.size(def, value).unwrap(), bytes.len(), "size agreement");

    // Streaming encoder produces identical bytes.
    let streamed = codec.encode_stream(def, value, Vec::new()).unwrap();
    assert_eq!(streamed, bytes, "streaming encoder equivalence");

    // Both decoder flavors recover the value.
    let decoded = codec.decode(def, &bytes).unwrap();
    assert_eq!(&decoded, value, "buffer decode round-trip");
    let decoded_stream = codec
        .decode_stream(def, std::io::Cursor::new(&bytes), bytes.len())
        .unwrap();
    assert_eq!(&decoded_stream, value, "streaming decode round-trip");

    // Re-encoding a decoded value reproduces the input bytes.
    assert_eq!(codec.encode(def, &decoded).unwrap(), bytes);

    // The root only depends on descriptor and value.
    let root = codec.hash_tree_root(def, value).unwrap();
    assert_eq!(codec.hash_tree_root(def, &decoded).unwrap(), root);

    bytes
}

#[test]
fn nested_dynamic_containers() {
    let codec = DynSsz::new(NoSpecs);
    let inner = TypeDef::container(
        "Inner",
        vec![
            FieldDef::new("tag", TypeDef::uint16()),
            FieldDef::new("data", TypeDef::slice(TypeDef::uint8()))
                .with_tags(r#"ssz-max:"64""#),
        ],
    );
    let outer = TypeDef::container(
        "Outer",
        vec![
            FieldDef::new("id", TypeDef::uint64()),
            FieldDef::new("inners", TypeDef::slice(inner.clone()))
                .with_tags(r#"ssz-max:"8""#),
            FieldDef::new("checksum", TypeDef::byte_array(4)),
        ],
    );

    let inner_val = |tag: u16, data: &[u8]| {
        Value::Container(vec![Value::Uint16(tag), Value::Bytes(data.to_vec())])
    };
    let value = Value::Container(vec![
        Value::Uint64(99),
        Value::List(vec![
            inner_val(1, b""),
            inner_val(2, b"abc"),
            inner_val(3, &[0xff; 40]),
        ]),
        Value::Bytes(vec![1, 2, 3, 4]),
    ]);
    roundtrip(&codec, &outer, &value);
}

#[test]
fn vector_of_dynamic_elements() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Pair",
        vec![
            FieldDef::new("parts", TypeDef::slice(TypeDef::slice(TypeDef::uint8())))
                .with_tags(r#"ssz-size:"2" ssz-max:"?,16""#),
        ],
    );
    let value = Value::Container(vec![Value::Vector(vec![
        Value::Bytes(b"left".to_vec()),
        Value::Bytes(b"right!".to_vec()),
    ])]);
    let bytes = roundtrip(&codec, &def, &value);
    // Two offsets of 4 bytes each; the first points right past the table.
    assert_eq!(bytes[4..8], [8, 0, 0, 0]);
}

#[test]
fn short_vector_value_pads_with_defaults() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Fixed",
        vec![
            FieldDef::new("slots", TypeDef::slice(TypeDef::uint64()))
                .with_tags(r#"ssz-size:"4""#),
        ],
    );
    let short = Value::Container(vec![Value::Vector(vec![Value::Uint64(1)])]);
    let full = Value::Container(vec![Value::Vector(vec![
        Value::Uint64(1),
        Value::Uint64(0),
        Value::Uint64(0),
        Value::Uint64(0),
    ])]);
    assert_eq!(
        codec.encode(&def, &short).unwrap(),
        codec.encode(&def, &full).unwrap()
    );
    assert_eq!(
        codec.size(&def, &short).unwrap(),
        codec.size(&def, &full).unwrap()
    );
    assert_eq!(
        codec.hash_tree_root(&def, &short).unwrap(),
        codec.hash_tree_root(&def, &full).unwrap()
    );
}

#[test]
fn optional_field_encodes_zero_value() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "MaybeNum",
        vec![
            FieldDef::new("n", TypeDef::optional(TypeDef::uint64())),
            FieldDef::new("tail", TypeDef::uint8()),
        ],
    );
    let absent = Value::Container(vec![Value::Optional(None), Value::Uint8(7)]);
    let bytes = codec.encode(&def, &absent).unwrap();
    assert_eq!(hex::encode(&bytes), "000000000000000007");

    // Decode allocates the slot around the zero value.
    let decoded = codec.decode(&def, &bytes).unwrap();
    assert_eq!(
        decoded,
        Value::Container(vec![
            Value::Optional(Some(Box::new(Value::Uint64(0)))),
            Value::Uint8(7),
        ])
    );
}

#[test]
fn strings_are_byte_lists() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Named",
        vec![FieldDef::new("name", TypeDef::string()).with_tags(r#"ssz-max:"32""#)],
    );
    let value = Value::Container(vec![Value::Bytes(b"hello".to_vec())]);
    let bytes = roundtrip(&codec, &def, &value);
    assert_eq!(&bytes[4..], b"hello");
}

#[test]
fn time_encodes_as_uint64_seconds() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Stamped",
        vec![FieldDef::new("at", TypeDef::time())],
    );
    let desc = codec.descriptor(&def).unwrap();
    assert!(desc.fields[0].desc.host.is_time);
    let value = Value::Container(vec![Value::Uint64(1_700_000_000)]);
    roundtrip(&codec, &def, &value);
}

#[test]
fn wrapper_is_transparent() {
    let codec = DynSsz::new(NoSpecs);
    let gwei = TypeDef::wrapper(
        "Gwei",
        FieldDef::new("amount", TypeDef::uint64()),
    );
    let value = Value::Uint64(32_000_000_000);
    let bytes = roundtrip(&codec, &gwei, &value);
    assert_eq!(bytes, 32_000_000_000u64.to_le_bytes());
    assert_eq!(
        codec.hash_tree_root(&gwei, &value).unwrap(),
        codec
            .hash_tree_root(&TypeDef::uint64(), &value)
            .unwrap()
    );
}

#[test]
fn uint128_round_trip() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Wide",
        vec![FieldDef::new("x", TypeDef::uint128())],
    );
    let value = Value::Container(vec![Value::Uint128(dynssz::U128::from(u128::MAX - 5))]);
    roundtrip(&codec, &def, &value);
}

#[test]
fn dynamic_spec_overrides_limit() {
    let def = TypeDef::container(
        "Bounded",
        vec![
            FieldDef::new("xs", TypeDef::slice(TypeDef::uint64()))
                .with_tags(r#"ssz-max:"4" dynssz-max:"XS_LIMIT""#),
        ],
    );
    let three = Value::Container(vec![Value::List(vec![
        Value::Uint64(1),
        Value::Uint64(2),
        Value::Uint64(3),
    ])]);

    // Static default allows three elements.
    let codec = DynSsz::new(NoSpecs);
    roundtrip(&codec, &def, &three);
    assert!(codec.descriptor(&def).unwrap().legacy_fast_path_allowed());

    // An override shrinking the limit rejects them and poisons the
    // legacy fast path.
    let tight = DynSsz::new(MapResolver::new().set("XS_LIMIT", 2));
    assert!(matches!(
        tight.encode(&def, &three).unwrap_err(),
        SszError::ListTooBig { len: 3, max: 2 }
    ));
    let desc = tight.descriptor(&def).unwrap();
    assert!(desc.flags.has_dynamic_max);
    assert!(!desc.legacy_fast_path_allowed());
}

#[test]
fn progressive_list_root_uses_progressive_scheme() {
    let codec = DynSsz::new(NoSpecs);
    let plain = TypeDef::container(
        "Plain",
        vec![
            FieldDef::new("xs", TypeDef::slice(TypeDef::uint64()))
                .with_tags(r#"ssz-max:"8""#),
        ],
    );
    let progressive = TypeDef::container(
        "Prog",
        vec![
            FieldDef::new("xs", TypeDef::slice(TypeDef::uint64()))
                .with_tags(r#"ssz-type:"progressive-list""#),
        ],
    );
    let value = Value::Container(vec![Value::List(vec![
        Value::Uint64(1),
        Value::Uint64(2),
    ])]);

    // Same wire bytes, different merkleization.
    assert_eq!(
        codec.encode(&plain, &value).unwrap(),
        codec.encode(&progressive, &value).unwrap()
    );
    roundtrip(&codec, &progressive, &value);

    let mut packed = [0u8; 32];
    packed[..8].copy_from_slice(&1u64.to_le_bytes());
    packed[8..16].copy_from_slice(&2u64.to_le_bytes());
    let leaf = merkle::merkleize_chunks(&packed, 1);
    let prog_root = merkle::mix_in_length(
        &merkle::hash32_concat(dynssz::Hash256::ZERO.as_slice(), leaf.as_slice()),
        2,
    );
    let field_root = codec
        .hash_tree_root(&progressive, &value)
        .unwrap();
    // The container has a single field, padded to one leaf.
    assert_eq!(field_root, prog_root);
}

#[test]
fn progressive_container_mixes_active_fields() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Prog",
        vec![
            FieldDef::new("a", TypeDef::uint64()).with_tags(r#"ssz-index:"0""#),
            FieldDef::new("b", TypeDef::uint32()).with_tags(r#"ssz-index:"2""#),
        ],
    );
    let value = Value::Container(vec![Value::Uint64(5), Value::Uint32(6)]);
    roundtrip(&codec, &def, &value);

    let mut c0 = [0u8; 32];
    c0[..8].copy_from_slice(&5u64.to_le_bytes());
    let mut c2 = [0u8; 32];
    c2[..4].copy_from_slice(&6u32.to_le_bytes());
    let zero = [0u8; 32];

    // Chunks [c0, 0, c2] under the 1,4,16,... progressive split.
    let mut tail_chunks = Vec::new();
    tail_chunks.extend_from_slice(&zero);
    tail_chunks.extend_from_slice(&c2);
    let tail = merkle::hash32_concat(
        dynssz::Hash256::ZERO.as_slice(),
        merkle::merkleize_chunks(&tail_chunks, 4).as_slice(),
    );
    let prog = merkle::hash32_concat(tail.as_slice(), &c0);

    let mut active = [0u8; 32];
    active[0] = 0b101;
    let expected = merkle::hash32_concat(prog.as_slice(), &active);
    assert_eq!(codec.hash_tree_root(&def, &value).unwrap(), expected);
}

// A fast-path type: a fixed 12-byte record implementing both the legacy
// and dynamic-spec-aware capability groups.
#[derive(Debug, Clone, PartialEq, Default)]
struct Seal {
    epoch: u64,
    salt: u32,
}

impl Seal {
    fn def() -> Arc<TypeDef> {
        TypeDef::custom("Seal", CustomVtable::new::<Seal>(CapabilityFlags::dynamic()))
    }
}

impl SszDelegate for Seal {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn SszDelegate> {
        Box::new(self.clone())
    }

    fn delegate_eq(&self, other: &dyn SszDelegate) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn size_ssz(&self) -> usize {
        12
    }

    fn marshal_ssz_to(&self, dst: &mut Vec<u8>) -> Result<(), SszError> {
        dst.extend_from_slice(&self.epoch.to_le_bytes());
        dst.extend_from_slice(&self.salt.to_le_bytes());
        Ok(())
    }

    fn unmarshal_ssz(&mut self, bytes: &[u8]) -> Result<(), SszError> {
        if bytes.len() != 12 {
            return Err(SszError::InvalidByteLength {
                len: bytes.len(),
                expected: 12,
            });
        }
        self.epoch = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        self.salt = u32::from_le_bytes(bytes[8..].try_into().expect("4 bytes"));
        Ok(())
    }

    fn hash_tree_root_with(&self, walker: &mut dyn HashWalker) -> Result<(), SszError> {
        let indx = walker.index();
        walker.append_uint64(self.epoch);
        walker.fill_up_to_32();
        walker.append_uint32(self.salt);
        walker.fill_up_to_32();
        walker.merkleize(indx, 0);
        Ok(())
    }

    fn size_ssz_dyn(&self, _specs: &dyn SpecResolver) -> Option<usize> {
        Some(self.size_ssz())
    }

    fn marshal_ssz_dyn(
        &self,
        _specs: &dyn SpecResolver,
        dst: &mut Vec<u8>,
    ) -> Option<Result<(), SszError>> {
        Some(self.marshal_ssz_to(dst))
    }

    fn unmarshal_ssz_dyn(
        &mut self,
        _specs: &dyn SpecResolver,
        bytes: &[u8],
    ) -> Option<Result<(), SszError>> {
        Some(self.unmarshal_ssz(bytes))
    }

    fn hash_tree_root_dyn(
        &self,
        _specs: &dyn SpecResolver,
        walker: &mut dyn HashWalker,
    ) -> Option<Result<(), SszError>> {
        Some(self.hash_tree_root_with(walker))
    }
}

#[test]
fn custom_delegate_round_trip() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Sealed",
        vec![
            FieldDef::new("height", TypeDef::uint64()),
            FieldDef::new("seal", Seal::def()).with_tags(r#"ssz-size:"12""#),
        ],
    );
    let value = Value::Container(vec![
        Value::Uint64(10),
        Value::Custom(CustomValue::new(Box::new(Seal {
            epoch: 3,
            salt: 0xabcd,
        }))),
    ]);
    roundtrip(&codec, &def, &value);
}

#[test]
fn disabling_legacy_fast_path_changes_nothing() {
    let def = TypeDef::container(
        "Sealed",
        vec![FieldDef::new("seal", Seal::def()).with_tags(r#"ssz-size:"12""#)],
    );
    let value = Value::Container(vec![Value::Custom(CustomValue::new(Box::new(
        Seal {
            epoch: 8,
            salt: 99,
        },
    )))]);

    let fast = DynSsz::new(NoSpecs);
    let slow = DynSsz::new(NoSpecs).without_legacy_fast_path();
    assert_eq!(
        fast.encode(&def, &value).unwrap(),
        slow.encode(&def, &value).unwrap()
    );
    assert_eq!(
        fast.hash_tree_root(&def, &value).unwrap(),
        slow.hash_tree_root(&def, &value).unwrap()
    );
    assert_eq!(
        fast.size(&def, &value).unwrap(),
        slow.size(&def, &value).unwrap()
    );
}

#[test]
fn delegate_errors_are_preserved() {
    #[derive(Debug, Clone, PartialEq, Default)]
    struct Broken;

    impl SszDelegate for Broken {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn clone_box(&self) -> Box<dyn SszDelegate> {
            Box::new(self.clone())
        }
        fn delegate_eq(&self, other: &dyn SszDelegate) -> bool {
            other.as_any().downcast_ref::<Self>() == Some(self)
        }
        fn size_ssz(&self) -> usize {
            0
        }
        fn marshal_ssz_to(&self, _dst: &mut Vec<u8>) -> Result<(), SszError> {
            Err(SszError::delegate("user marshal exploded"))
        }
        fn unmarshal_ssz(&mut self, _bytes: &[u8]) -> Result<(), SszError> {
            Ok(())
        }
        fn hash_tree_root_with(
            &self,
            _walker: &mut dyn HashWalker,
        ) -> Result<(), SszError> {
            Ok(())
        }
    }

    let def = TypeDef::custom(
        "Broken",
        CustomVtable::new::<Broken>(CapabilityFlags::legacy()),
    );
    let codec = DynSsz::new(NoSpecs);
    let err = codec
        .encode(&def, &Value::Custom(CustomValue::new(Box::new(Broken))))
        .unwrap_err();
    assert_eq!(err.to_string(), "delegate error: user marshal exploded");
}

#[test]
fn cache_purge_operations() {
    let codec = DynSsz::new(NoSpecs);
    let a = TypeDef::container("A", vec![FieldDef::new("x", TypeDef::uint64())]);
    let b = TypeDef::container("B", vec![FieldDef::new("y", TypeDef::uint32())]);
    codec.descriptor(&a).unwrap();
    codec.descriptor(&b).unwrap();
    assert!(codec.type_cache().len() >= 2);

    codec.type_cache().remove(&a, &a);
    assert!(codec.type_cache().get(&a, &a).is_none());
    assert!(codec.type_cache().get(&b, &b).is_some());

    codec.type_cache().remove_runtime(&b);
    assert!(codec.type_cache().get(&b, &b).is_none());

    codec.descriptor(&a).unwrap();
    codec.type_cache().clear();
    assert!(codec.type_cache().is_empty());
}

#[test]
fn randomized_round_trips() {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "Fuzzed",
        vec![
            FieldDef::new("nonce", TypeDef::uint64()),
            FieldDef::new("values", TypeDef::slice(TypeDef::uint64()))
                .with_tags(r#"ssz-max:"64""#),
            FieldDef::new("blob", TypeDef::slice(TypeDef::uint8()))
                .with_tags(r#"ssz-max:"256""#),
        ],
    );

    let mut rng = StdRng::seed_from_u64(0x55a1);
    for _ in 0..50 {
        let values = (0..rng.gen_range(0..64))
            .map(|_| Value::Uint64(rng.r#gen()))
            .collect();
        let blob = (0..rng.gen_range(0..256)).map(|_| rng.r#gen()).collect();
        let value = Value::Container(vec![
            Value::Uint64(rng.r#gen()),
            Value::List(values),
            Value::Bytes(blob),
        ]);
        roundtrip(&codec, &def, &value);
    }
}

#[test]
fn bitlist_and_bitvector_round_trip() {
    let codec = DynSsz::new(NoSpecs);
    let def = TypeDef::container(
        "BitsBoth",
        vec![
            FieldDef::new("fixed", TypeDef::bits()).with_tags(r#"ssz-bitsize:"12""#),
            FieldDef::new("growing", TypeDef::bits()).with_tags(r#"ssz-bitmax:"100""#),
        ],
    );
    let mut growing = BitSeq::new();
    for i in 0..37 {
        growing.push(i % 2 == 0);
    }
    let value = Value::Container(vec![
        Value::Bits(BitSeq::from_bools(&[
            true, false, false, true, false, false, true, false, true, true, false, true,
        ])),
        Value::Bits(growing),
    ]);
    roundtrip(&codec, &def, &value);
}
