//! The `dynssz-gen` command-line surface.
//!
//! The binary parses flags and type specifications and drives
//! [`crate::generate`]; resolving type names to nominal type graphs is
//! delegated to a [`TypeGraphSource`], because parsing host-language
//! packages is outside this tool (an embedding build supplies the graph,
//! typically from a build script).
//!
//! Exit codes: 0 on success, 1 on configuration errors, 2 on type
//! resolution errors, 3 on generation or output errors.

use std::sync::Arc;

use clap::Parser;

use dynssz::TypeDef;

use crate::{
    CodegenError, GeneratedFile, GeneratorRequest, TypeOptions, TypeRequest, generate,
};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "dynssz-gen",
    about = "Generate ahead-of-time SSZ codec routines for annotated types"
)]
pub struct Args {
    /// Package path containing the nominated types.
    #[arg(long)]
    pub package: String,

    /// Package name for the generated output (defaults to the source
    /// package's name).
    #[arg(long = "out-package")]
    pub out_package: Option<String>,

    /// Comma-separated types, each optionally suffixed with
    /// `:outputFile`, `:views=A;B` and `:viewonly`.
    #[arg(long)]
    pub types: String,

    /// Default output file for types without a per-type override.
    #[arg(long, default_value = "generated_ssz.rs")]
    pub output: String,

    /// Log generation progress.
    #[arg(long)]
    pub verbose: bool,

    /// Also emit legacy (`size_ssz`/`marshal_ssz`/...) method variants.
    #[arg(long)]
    pub legacy: bool,

    /// Drop dynamic-expression support from the generated code.
    #[arg(long = "no-dyn-expressions")]
    pub no_dyn_expressions: bool,

    /// Skip the fast-path bridge so generated types never shadow the
    /// reflection engine.
    #[arg(long = "no-fast-ssz")]
    pub no_fast_ssz: bool,

    /// Emit streaming encode/decode forms.
    #[arg(long)]
    pub streaming: bool,
}

/// One parsed entry of `--types`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    /// Type name in the package.
    pub name: String,
    /// Per-type output file.
    pub output: Option<String>,
    /// View schema names to specialize.
    pub views: Vec<String>,
    /// Emit only view variants.
    pub view_only: bool,
}

/// Parses the `--types` value: `A[:file][:views=X;Y][:viewonly],B,...`.
pub fn parse_type_specs(value: &str) -> Result<Vec<TypeSpec>, CodegenError> {
    let mut specs = Vec::new();
    for entry in value.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let mut parts = entry.split(':');
        let name = parts.next().expect("split yields at least one part");
        if name.is_empty() {
            return Err(CodegenError::Config(format!(
                "empty type name in {entry:?}"
            )));
        }
        let mut spec = TypeSpec {
            name: name.to_string(),
            output: None,
            views: Vec::new(),
            view_only: false,
        };
        for part in parts {
            if part == "viewonly" {
                spec.view_only = true;
            } else if let Some(views) = part.strip_prefix("views=") {
                spec.views = views
                    .split(';')
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect();
            } else if spec.output.is_none() {
                spec.output = Some(part.to_string());
            } else {
                return Err(CodegenError::Config(format!(
                    "unrecognized type suffix {part:?} in {entry:?}"
                )));
            }
        }
        specs.push(spec);
    }
    if specs.is_empty() {
        return Err(CodegenError::Config("--types names no types".to_string()));
    }
    Ok(specs)
}

/// Resolves type names to nominal type graphs. Supplied by the embedding
/// build; host-language source parsing is outside this tool.
pub trait TypeGraphSource {
    /// Resolves `name` within `package`.
    fn resolve(&self, package: &str, name: &str) -> Result<Arc<TypeDef>, CodegenError>;
}

/// A source with no packages; every lookup is a resolution error. Used by
/// the standalone binary, which cannot parse host source on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPackages;

impl TypeGraphSource for NoPackages {
    fn resolve(&self, package: &str, name: &str) -> Result<Arc<TypeDef>, CodegenError> {
        Err(CodegenError::Resolution(format!(
            "cannot resolve {name} in {package}: supply the type graph through \
             the dynssz_codegen library (the standalone binary does not parse \
             host packages)"
        )))
    }
}

/// Builds and runs a generation request from parsed arguments.
pub fn run(
    args: &Args,
    source: &dyn TypeGraphSource,
) -> Result<Vec<GeneratedFile>, CodegenError> {
    let specs = parse_type_specs(&args.types)?;
    let mut request = GeneratorRequest::new(args.output.clone());
    for spec in specs {
        let def = source.resolve(&args.package, &spec.name)?;
        let views = spec
            .views
            .iter()
            .map(|view| source.resolve(&args.package, view))
            .collect::<Result<Vec<_>, _>>()?;
        request = request.with_type(TypeRequest {
            def,
            views,
            options: TypeOptions {
                legacy: args.legacy,
                no_dyn_expressions: args.no_dyn_expressions,
                no_fast_ssz: args.no_fast_ssz,
                streaming: args.streaming,
                view_only: spec.view_only,
            },
            output: spec.output,
        });
    }
    generate(&request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_type_list() {
        let specs = parse_type_specs("Block,State").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "Block");
        assert!(specs[0].views.is_empty());
        assert!(!specs[1].view_only);
    }

    #[test]
    fn parses_suffixes() {
        let specs =
            parse_type_specs("Block:block.rs:views=Phase0;Altair:viewonly").unwrap();
        assert_eq!(
            specs,
            vec![TypeSpec {
                name: "Block".to_string(),
                output: Some("block.rs".to_string()),
                views: vec!["Phase0".to_string(), "Altair".to_string()],
                view_only: true,
            }]
        );
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(matches!(
            parse_type_specs(""),
            Err(CodegenError::Config(_))
        ));
        assert!(matches!(
            parse_type_specs(":file"),
            Err(CodegenError::Config(_))
        ));
        assert!(matches!(
            parse_type_specs("A:f1:f2:f3"),
            Err(CodegenError::Config(_))
        ));
    }

    #[test]
    fn no_packages_source_fails_resolution() {
        let err = NoPackages.resolve("pkg", "Block").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
