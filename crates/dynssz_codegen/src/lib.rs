//! # dynssz_codegen
//!
//! Generates ahead-of-time specialized SSZ routines from `dynssz` type
//! graphs: for each nominated type, a `ssz_size_dyn`, `marshal_ssz_dyn`,
//! `unmarshal_ssz_dyn` and `hash_tree_root_dyn` implementation (plus
//! optional legacy wrappers, streaming forms and view-specialized
//! variants), structurally mirroring the reflection codec without the
//! runtime descriptor walk. Generated code is `syn`-parseable and
//! formatted with `prettyplease`.
//!
//! The generator consumes an already-resolved nominal type graph; how the
//! embedding build produces that graph (build scripts, registries) is up
//! to the caller. See [`generate`] for library use and [`cli`] for the
//! `dynssz-gen` binary surface.

use std::{collections::BTreeMap, sync::Arc};

use thiserror::Error;
use tracing::debug;

use dynssz::{DynSsz, NoSpecs, SszError, TypeDef, descriptor::TypeDescriptor};

pub mod cli;
mod emit;

use emit::Emitter;

/// Errors surfaced by code generation.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// The request itself was malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A nominated type (or view) failed descriptor compilation.
    #[error("type resolution error: {0}")]
    Type(#[from] SszError),

    /// A nominated type name could not be resolved to a type graph.
    #[error("type resolution error: {0}")]
    Resolution(String),

    /// A descriptor cannot be expressed as generated code.
    #[error("code generation error: {0}")]
    Generation(String),

    /// Output could not be written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodegenError {
    /// The process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            CodegenError::Config(_) => 1,
            CodegenError::Type(_) | CodegenError::Resolution(_) => 2,
            CodegenError::Generation(_) | CodegenError::Io(_) => 3,
        }
    }
}

/// Per-type emission options.
#[derive(Debug, Clone, Default)]
pub struct TypeOptions {
    /// Emit legacy (`size_ssz`/`marshal_ssz`/...) wrappers.
    pub legacy: bool,
    /// Drop retained `dynssz-*` expressions; sizes and limits become
    /// static literals.
    pub no_dyn_expressions: bool,
    /// Skip the `SszDelegate` bridge, so the type never registers as a
    /// legacy fast path with the reflection engine.
    pub no_fast_ssz: bool,
    /// Emit streaming encode/decode forms.
    pub streaming: bool,
    /// Emit only the view-specialized variants.
    pub view_only: bool,
}

/// One nominated type.
#[derive(Debug)]
pub struct TypeRequest {
    /// The runtime type to generate code for. The def's name must be the
    /// Rust type name in the output package.
    pub def: Arc<TypeDef>,
    /// View schemas to specialize additionally.
    pub views: Vec<Arc<TypeDef>>,
    /// Emission options.
    pub options: TypeOptions,
    /// Output file override; the request default applies when `None`.
    pub output: Option<String>,
}

impl TypeRequest {
    /// A request with default options and no views.
    pub fn new(def: Arc<TypeDef>) -> Self {
        Self {
            def,
            views: Vec::new(),
            options: TypeOptions::default(),
            output: None,
        }
    }
}

/// A full generation request.
#[derive(Debug)]
pub struct GeneratorRequest {
    /// The nominated types.
    pub types: Vec<TypeRequest>,
    /// Default output file name.
    pub output: String,
}

impl GeneratorRequest {
    /// A request writing to `output` by default.
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            types: Vec::new(),
            output: output.into(),
        }
    }

    /// Adds a type.
    pub fn with_type(mut self, request: TypeRequest) -> Self {
        self.types.push(request);
        self
    }
}

/// One generated output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// File name the contents route to.
    pub name: String,
    /// Formatted Rust source.
    pub contents: String,
}

/// Runs generation, returning one entry per distinct output file.
///
/// Descriptors are compiled with static defaults (no spec overrides);
/// retained `dynssz-*` expressions are re-emitted into the generated code
/// unless a type's options disable them.
pub fn generate(request: &GeneratorRequest) -> Result<Vec<GeneratedFile>, CodegenError> {
    if request.types.is_empty() {
        return Err(CodegenError::Config("no types requested".to_string()));
    }

    let codec = DynSsz::new(NoSpecs);
    let mut files: BTreeMap<String, proc_macro2::TokenStream> = BTreeMap::new();

    for ty in &request.types {
        if ty.options.view_only && ty.views.is_empty() {
            return Err(CodegenError::Config(format!(
                "type {} is view-only but nominates no views",
                ty.def.name()
            )));
        }
        let desc = codec.descriptor(&ty.def)?;
        let views = compile_views(&codec, ty)?;
        debug!(ty = ty.def.name(), views = views.len(), "generating");

        let emitter = Emitter::new(&ty.options);
        let tokens = emitter.emit_type(ty.def.name(), &desc, &views)?;
        let file = ty.output.clone().unwrap_or_else(|| request.output.clone());
        files.entry(file).or_default().extend(tokens);
    }

    files
        .into_iter()
        .map(|(name, tokens)| {
            let file: syn::File = syn::parse2(tokens).map_err(|e| {
                CodegenError::Generation(format!("generated code does not parse: {e}"))
            })?;
            let contents = format!(
                "// Code generated by dynssz-gen; do not edit.\n\n{}",
                prettyplease::unparse(&file)
            );
            Ok(GeneratedFile { name, contents })
        })
        .collect()
}

fn compile_views(
    codec: &DynSsz,
    ty: &TypeRequest,
) -> Result<Vec<(Arc<TypeDef>, Arc<TypeDescriptor>)>, CodegenError> {
    ty.views
        .iter()
        .map(|view| {
            let desc = codec.descriptor_view(&ty.def, view)?;
            Ok((view.clone(), desc))
        })
        .collect()
}

/// Writes generated files under `base_dir`.
pub fn write_files(
    base_dir: &std::path::Path,
    files: &[GeneratedFile],
) -> Result<(), CodegenError> {
    for file in files {
        let path = base_dir.join(&file.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &file.contents)?;
    }
    Ok(())
}
