//! End-to-end generation tests over a fixture type graph.

use std::sync::Arc;

use dynssz::{FieldDef, TypeDef};
use dynssz_codegen::{
    CodegenError, GeneratorRequest, TypeOptions, TypeRequest, cli, generate,
};

fn attestation_def() -> Arc<TypeDef> {
    TypeDef::container(
        "Attestation",
        vec![
            FieldDef::new("slot", TypeDef::uint64()),
            FieldDef::new("bits", TypeDef::bits()).with_tags(r#"ssz-bitmax:"2048""#),
        ],
    )
}

fn block_def() -> Arc<TypeDef> {
    TypeDef::container(
        "Block",
        vec![
            FieldDef::new("slot", TypeDef::uint64()),
            FieldDef::new("proposer", TypeDef::uint64()),
            FieldDef::new("root", TypeDef::byte_array(32)),
            FieldDef::new("attestations", TypeDef::slice(attestation_def()))
                .with_tags(r#"ssz-max:"64""#),
            FieldDef::new("graffiti", TypeDef::slice(TypeDef::uint8()))
                .with_tags(r#"ssz-max:"32" dynssz-max:"GRAFFITI_LIMIT""#),
        ],
    )
}

fn header_view() -> Arc<TypeDef> {
    TypeDef::container(
        "HeaderView",
        vec![
            FieldDef::new("slot", TypeDef::uint64()),
            FieldDef::new("root", TypeDef::byte_array(32)),
        ],
    )
}

#[test]
fn generates_all_core_routines() {
    let request = GeneratorRequest::new("generated_ssz.rs")
        .with_type(TypeRequest::new(block_def()))
        .with_type(TypeRequest::new(attestation_def()));
    let files = generate(&request).unwrap();
    assert_eq!(files.len(), 1);
    let out = &files[0].contents;

    for needle in [
        "impl Block {",
        "impl Attestation {",
        "pub fn ssz_size_dyn(",
        "pub fn marshal_ssz_dyn(",
        "pub fn unmarshal_ssz_dyn(",
        "pub fn hash_tree_root_dyn(",
        "SszDelegate for Block",
        "SszDelegate for Attestation",
    ] {
        assert!(out.contains(needle), "missing {needle:?} in:\n{out}");
    }

    // The retained dynssz-max expression is re-emitted.
    assert!(out.contains(r#"resolve_expr(specs, "GRAFFITI_LIMIT", 32u64)"#));

    // Specialized primitive encoding, not a descriptor walk.
    assert!(out.contains("dst.extend_from_slice(&self.slot.to_le_bytes());"));
    assert!(!out.contains("descriptor"));
}

#[test]
fn legacy_and_streaming_are_opt_in() {
    let plain = generate(
        &GeneratorRequest::new("out.rs").with_type(TypeRequest::new(attestation_def())),
    )
    .unwrap();
    assert!(!plain[0].contents.contains("pub fn size_ssz("));
    assert!(!plain[0].contents.contains("marshal_ssz_encoder"));

    let mut request =
        GeneratorRequest::new("out.rs").with_type(TypeRequest::new(attestation_def()));
    request.types[0].options = TypeOptions {
        legacy: true,
        streaming: true,
        ..TypeOptions::default()
    };
    let full = generate(&request).unwrap();
    for needle in [
        "pub fn size_ssz(",
        "pub fn marshal_ssz(",
        "pub fn unmarshal_ssz(",
        "pub fn hash_tree_root(",
        "pub fn marshal_ssz_encoder(",
        "pub fn unmarshal_ssz_decoder(",
    ] {
        assert!(full[0].contents.contains(needle), "missing {needle:?}");
    }
}

#[test]
fn no_dyn_expressions_drops_resolver_calls() {
    let mut request =
        GeneratorRequest::new("out.rs").with_type(TypeRequest::new(block_def()));
    request.types[0].options.no_dyn_expressions = true;
    let files = generate(&request).unwrap();
    assert!(!files[0].contents.contains("resolve_expr"));
}

#[test]
fn view_variants_dispatch_on_schema_name() {
    let mut request =
        GeneratorRequest::new("out.rs").with_type(TypeRequest::new(block_def()));
    request.types[0].views = vec![header_view()];
    let files = generate(&request).unwrap();
    let out = &files[0].contents;
    for needle in [
        "pub fn ssz_size_view(",
        "pub fn marshal_ssz_view(",
        "pub fn unmarshal_ssz_view(",
        "pub fn hash_tree_root_view(",
        r#""HeaderView" =>"#,
    ] {
        assert!(out.contains(needle), "missing {needle:?} in:\n{out}");
    }
}

#[test]
fn view_only_omits_core_routines() {
    let mut request =
        GeneratorRequest::new("out.rs").with_type(TypeRequest::new(block_def()));
    request.types[0].views = vec![header_view()];
    request.types[0].options.view_only = true;
    let files = generate(&request).unwrap();
    let out = &files[0].contents;
    assert!(out.contains("pub fn marshal_ssz_view("));
    assert!(!out.contains("pub fn marshal_ssz_dyn("));
    assert!(!out.contains("SszDelegate for Block"));
}

#[test]
fn per_type_output_files_are_routed() {
    let mut request = GeneratorRequest::new("default.rs")
        .with_type(TypeRequest::new(block_def()))
        .with_type(TypeRequest::new(attestation_def()));
    request.types[1].output = Some("attestation.rs".to_string());
    let files = generate(&request).unwrap();
    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["attestation.rs", "default.rs"]);
}

#[test]
fn union_fields_are_rejected() {
    let def = TypeDef::container(
        "HasUnion",
        vec![FieldDef::new(
            "choice",
            TypeDef::union(
                "Choice",
                vec![
                    FieldDef::new("a", TypeDef::uint32()),
                    FieldDef::new("b", TypeDef::uint64()),
                ],
            ),
        )],
    );
    let err = generate(&GeneratorRequest::new("out.rs").with_type(TypeRequest::new(def)))
        .unwrap_err();
    assert!(matches!(err, CodegenError::Generation(_)));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn empty_request_is_a_config_error() {
    let err = generate(&GeneratorRequest::new("out.rs")).unwrap_err();
    assert!(matches!(err, CodegenError::Config(_)));
    assert_eq!(err.exit_code(), 1);
}

struct FixtureSource;

impl cli::TypeGraphSource for FixtureSource {
    fn resolve(
        &self,
        _package: &str,
        name: &str,
    ) -> Result<Arc<TypeDef>, CodegenError> {
        match name {
            "Block" => Ok(block_def()),
            "Attestation" => Ok(attestation_def()),
            "HeaderView" => Ok(header_view()),
            other => Err(CodegenError::Resolution(format!("unknown type {other}"))),
        }
    }
}

#[test]
fn cli_run_wires_flags_through() {
    use clap::Parser;
    let args = cli::Args::parse_from([
        "dynssz-gen",
        "--package",
        "fixtures",
        "--types",
        "Block:views=HeaderView,Attestation:att.rs",
        "--legacy",
        "--streaming",
    ]);
    let files = cli::run(&args, &FixtureSource).unwrap();
    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["att.rs", "generated_ssz.rs"]);
    let main_out = &files[1].contents;
    assert!(main_out.contains("pub fn marshal_ssz_view("));
    assert!(main_out.contains("pub fn size_ssz("));
    assert!(main_out.contains("pub fn marshal_ssz_encoder("));
}

#[test]
fn cli_unknown_type_is_resolution_error() {
    use clap::Parser;
    let args = cli::Args::parse_from([
        "dynssz-gen",
        "--package",
        "fixtures",
        "--types",
        "Ghost",
    ]);
    let err = cli::run(&args, &FixtureSource).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
