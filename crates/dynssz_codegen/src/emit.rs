//! Token emission for specialized codec routines.
//!
//! The emitter walks a compiled [`TypeDescriptor`] and produces inherent
//! `ssz_size_dyn` / `marshal_ssz_dyn` / `unmarshal_ssz_dyn` /
//! `hash_tree_root_dyn` methods (plus optional legacy, streaming and
//! view-specialized variants) for a user struct, structurally mirroring
//! the reflection codec without the runtime descriptor walk. A
//! [`dynssz::SszDelegate`] bridge is emitted too, so generated types plug
//! into the reflection engine as fast paths.

use std::sync::Arc;

use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::Ident;

use dynssz::{
    HostKind, SszKind,
    descriptor::TypeDescriptor,
    typedef::TypeDef,
};

use crate::{CodegenError, TypeOptions};

pub(crate) struct Emitter<'a> {
    options: &'a TypeOptions,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(options: &'a TypeOptions) -> Self {
        Self { options }
    }

    /// Emits all routines for one type: the inherent impl block and the
    /// delegate bridge.
    pub(crate) fn emit_type(
        &self,
        name: &str,
        desc: &Arc<TypeDescriptor>,
        views: &[(Arc<TypeDef>, Arc<TypeDescriptor>)],
    ) -> Result<TokenStream, CodegenError> {
        let ident = Ident::new(name, Span::call_site());

        let mut methods = TokenStream::new();
        if !self.options.view_only {
            methods.extend(self.emit_size(desc)?);
            methods.extend(self.emit_marshal(desc)?);
            methods.extend(self.emit_unmarshal(desc)?);
            methods.extend(self.emit_hash(desc)?);
            if self.options.legacy {
                methods.extend(self.emit_legacy_wrappers());
            }
            if self.options.streaming {
                methods.extend(self.emit_streaming(desc));
            }
        }
        if !views.is_empty() {
            methods.extend(self.emit_views(views)?);
        }

        let bridge = if self.options.view_only || self.options.no_fast_ssz {
            TokenStream::new()
        } else {
            self.emit_delegate_bridge(&ident, views)
        };

        Ok(quote! {
            impl #ident {
                #methods
            }

            #bridge
        })
    }

    // -- size --

    fn emit_size(&self, desc: &Arc<TypeDescriptor>) -> Result<TokenStream, CodegenError> {
        let body = self.container_size_expr(desc, &quote!(self))?;
        Ok(quote! {
            /// The exact encoded SSZ size under the given specs.
            #[allow(unused_variables)]
            pub fn ssz_size_dyn(&self, specs: &dyn ::dynssz::SpecResolver) -> usize {
                #body
            }
        })
    }

    fn container_size_expr(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        let mut terms = Vec::new();
        for field in &desc.fields {
            let field_access = self.field_access(access, &field.name);
            if field.desc.flags.is_dynamic {
                let size = self.value_size_expr(&field.desc, &field_access)?;
                terms.push(quote!(::dynssz::BYTES_PER_LENGTH_OFFSET + #size));
            } else {
                terms.push(self.static_size_expr(&field.desc));
            }
        }
        if terms.is_empty() {
            return Ok(quote!(0usize));
        }
        Ok(quote!(0usize #( + #terms)*))
    }

    /// The byte size of a static field, honoring retained size
    /// expressions when dynamic-expression support is enabled.
    fn static_size_expr(&self, desc: &Arc<TypeDescriptor>) -> TokenStream {
        let size = desc.size;
        match (&desc.size_expr, self.options.no_dyn_expressions) {
            (Some(expr), false) if desc.kind == SszKind::Vector && desc.host.is_byte_array => {
                let default = desc.length as u64;
                quote!((::dynssz::resolve_expr(specs, #expr, #default) as usize))
            }
            _ => quote!(#size),
        }
    }

    /// The runtime size of a dynamic value.
    fn value_size_expr(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        if !desc.flags.is_dynamic {
            return Ok(self.static_size_expr(desc));
        }
        match desc.kind {
            SszKind::Bitlist | SszKind::ProgressiveBitlist => {
                Ok(quote!((#access.len() / 8 + 1)))
            }
            SszKind::List | SszKind::ProgressiveList => {
                if desc.host.is_byte_array || desc.host.is_string {
                    return Ok(quote!(#access.len()));
                }
                let element = desc.element.as_ref().expect("list has element");
                if !element.flags.is_dynamic {
                    let elem_size = self.static_size_expr(element);
                    Ok(quote!((#access.len() * #elem_size)))
                } else {
                    let item_size =
                        self.value_size_expr(element, &quote!(item))?;
                    Ok(quote! {
                        #access
                            .iter()
                            .map(|item| ::dynssz::BYTES_PER_LENGTH_OFFSET + #item_size)
                            .sum::<usize>()
                    })
                }
            }
            SszKind::Container | SszKind::ProgressiveContainer => {
                Ok(quote!(#access.ssz_size_dyn(specs)))
            }
            SszKind::TypeWrapper => {
                let inner = desc.wrapped.as_ref().expect("wrapper has inner");
                self.value_size_expr(inner, access)
            }
            other => Err(CodegenError::Generation(format!(
                "dynamic {other:?} fields are not supported by the generator"
            ))),
        }
    }

    // -- marshal --

    fn emit_marshal(&self, desc: &Arc<TypeDescriptor>) -> Result<TokenStream, CodegenError> {
        let body = self.container_marshal_stmts(desc, &quote!(self))?;
        Ok(quote! {
            /// Appends the SSZ encoding under the given specs.
            #[allow(unused_variables)]
            pub fn marshal_ssz_dyn(
                &self,
                specs: &dyn ::dynssz::SpecResolver,
                dst: &mut Vec<u8>,
            ) -> Result<(), ::dynssz::SszError> {
                #body
                Ok(())
            }
        })
    }

    fn container_marshal_stmts(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        let mut fixed_terms = Vec::new();
        for field in &desc.fields {
            if field.desc.flags.is_dynamic {
                fixed_terms.push(quote!(::dynssz::BYTES_PER_LENGTH_OFFSET));
            } else {
                let size = self.static_size_expr(&field.desc);
                fixed_terms.push(quote!(#size));
            }
        }
        let fixed_len = if fixed_terms.is_empty() {
            quote!(0usize)
        } else {
            quote!(0usize #( + #fixed_terms)*)
        };

        let mut fixed_stmts = Vec::new();
        let mut body_stmts = Vec::new();
        for field in &desc.fields {
            let field_access = self.field_access(access, &field.name);
            if field.desc.flags.is_dynamic {
                let size = self.value_size_expr(&field.desc, &field_access)?;
                fixed_stmts.push(quote! {
                    dst.extend_from_slice(&(offset as u32).to_le_bytes());
                    offset += #size;
                });
                body_stmts.push(self.marshal_stmts(&field.desc, &field_access)?);
            } else {
                fixed_stmts.push(self.marshal_stmts(&field.desc, &field_access)?);
            }
        }

        let prelude = if desc.dyn_fields.is_empty() {
            TokenStream::new()
        } else {
            quote!(let mut offset: usize = #fixed_len;)
        };
        Ok(quote! {
            #prelude
            #(#fixed_stmts)*
            #(#body_stmts)*
        })
    }

    fn marshal_stmts(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        match desc.kind {
            SszKind::Bool => Ok(quote!(dst.push(u8::from(#access));)),
            SszKind::Uint8 => Ok(quote!(dst.push(#access);)),
            SszKind::Uint16 | SszKind::Uint32 | SszKind::Uint64 => {
                Ok(quote!(dst.extend_from_slice(&#access.to_le_bytes());))
            }
            SszKind::Uint128 => {
                Ok(quote!(dst.extend_from_slice(&#access.to_le_bytes::<16>());))
            }
            SszKind::Uint256 => {
                Ok(quote!(dst.extend_from_slice(&#access.to_le_bytes::<32>());))
            }
            SszKind::Bitvector => {
                let bits = desc.bit_length.unwrap_or(0);
                Ok(quote! {
                    if #access.len() != #bits {
                        return Err(::dynssz::SszError::IncorrectVectorLength {
                            len: #access.len(),
                            expected: #bits,
                        });
                    }
                    dst.extend_from_slice(#access.as_slice());
                })
            }
            SszKind::Bitlist | SszKind::ProgressiveBitlist => {
                let limit_check = self.bit_limit_check(desc, access);
                Ok(quote! {
                    #limit_check
                    dst.extend_from_slice(&#access.to_bitlist_bytes());
                })
            }
            SszKind::Vector => self.marshal_vector(desc, access),
            SszKind::List | SszKind::ProgressiveList => self.marshal_list(desc, access),
            SszKind::Container | SszKind::ProgressiveContainer => {
                Ok(quote!(#access.marshal_ssz_dyn(specs, dst)?;))
            }
            SszKind::TypeWrapper => {
                let inner = desc.wrapped.as_ref().expect("wrapper has inner");
                self.marshal_stmts(inner, access)
            }
            other => Err(CodegenError::Generation(format!(
                "{other:?} fields are not supported by the generator"
            ))),
        }
    }

    fn marshal_vector(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        if desc.host.is_byte_array {
            let len = self.vector_len_expr(desc);
            return Ok(quote! {
                if #access.len() != #len {
                    return Err(::dynssz::SszError::IncorrectVectorLength {
                        len: #access.len(),
                        expected: #len,
                    });
                }
                dst.extend_from_slice(#access.as_ref());
            });
        }
        let element = desc.element.as_ref().expect("vector has element");
        if element.flags.is_dynamic {
            return Err(CodegenError::Generation(
                "vectors of dynamic elements are not supported by the generator".into(),
            ));
        }
        let len = self.vector_len_expr(desc);
        let item = self.marshal_stmts(element, &quote!(item))?;
        Ok(quote! {
            if #access.len() != #len {
                return Err(::dynssz::SszError::IncorrectVectorLength {
                    len: #access.len(),
                    expected: #len,
                });
            }
            for item in #access.iter() {
                #item
            }
        })
    }

    fn marshal_list(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        let limit_check = self.list_limit_check(desc, access);
        if desc.host.is_byte_array {
            return Ok(quote! {
                #limit_check
                dst.extend_from_slice(#access.as_ref());
            });
        }
        if desc.host.is_string {
            return Ok(quote! {
                #limit_check
                dst.extend_from_slice(#access.as_bytes());
            });
        }
        let element = desc.element.as_ref().expect("list has element");
        if element.flags.is_dynamic {
            let item_size = self.value_size_expr(element, &quote!(item))?;
            let item = self.marshal_stmts(element, &quote!(item))?;
            return Ok(quote! {
                #limit_check
                let mut item_offset: usize =
                    #access.len() * ::dynssz::BYTES_PER_LENGTH_OFFSET;
                for item in #access.iter() {
                    dst.extend_from_slice(&(item_offset as u32).to_le_bytes());
                    item_offset += #item_size;
                }
                for item in #access.iter() {
                    #item
                }
            });
        }
        let item = self.marshal_stmts(element, &quote!(item))?;
        Ok(quote! {
            #limit_check
            for item in #access.iter() {
                #item
            }
        })
    }

    // -- unmarshal --

    fn emit_unmarshal(
        &self,
        desc: &Arc<TypeDescriptor>,
    ) -> Result<TokenStream, CodegenError> {
        let body = self.container_unmarshal_stmts(desc, &quote!(self))?;
        Ok(quote! {
            /// Decodes from `bytes` under the given specs, replacing the
            /// receiver's contents.
            #[allow(unused_variables)]
            pub fn unmarshal_ssz_dyn(
                &mut self,
                specs: &dyn ::dynssz::SpecResolver,
                bytes: &[u8],
            ) -> Result<(), ::dynssz::SszError> {
                #body
                Ok(())
            }
        })
    }

    fn container_unmarshal_stmts(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        let mut fixed_terms = Vec::new();
        for field in &desc.fields {
            if field.desc.flags.is_dynamic {
                fixed_terms.push(quote!(::dynssz::BYTES_PER_LENGTH_OFFSET));
            } else {
                let size = self.static_size_expr(&field.desc);
                fixed_terms.push(quote!(#size));
            }
        }
        let fixed_len = if fixed_terms.is_empty() {
            quote!(0usize)
        } else {
            quote!(0usize #( + #fixed_terms)*)
        };

        let dynamic = desc.flags.is_dynamic;
        let length_check = if dynamic {
            quote! {
                if bytes.len() < fixed_len {
                    return Err(::dynssz::SszError::UnexpectedEof {
                        needed: fixed_len,
                        available: bytes.len(),
                    });
                }
            }
        } else {
            quote! {
                if bytes.len() != fixed_len {
                    return Err(::dynssz::SszError::InvalidByteLength {
                        len: bytes.len(),
                        expected: fixed_len,
                    });
                }
            }
        };

        let mut fixed_stmts = Vec::new();
        let mut dyn_index = 0usize;
        for field in &desc.fields {
            let field_access = self.field_access(access, &field.name);
            if field.desc.flags.is_dynamic {
                let off = format_ident!("offset_{}", dyn_index);
                let check = if dyn_index == 0 {
                    quote! {
                        if #off != fixed_len {
                            return Err(::dynssz::SszError::IncorrectOffset {
                                offset: #off,
                                limit: bytes.len(),
                            });
                        }
                    }
                } else {
                    let prev = format_ident!("offset_{}", dyn_index - 1);
                    quote! {
                        if #off < #prev || #off > bytes.len() {
                            return Err(::dynssz::SszError::IncorrectOffset {
                                offset: #off,
                                limit: bytes.len(),
                            });
                        }
                    }
                };
                fixed_stmts.push(quote! {
                    let #off = u32::from_le_bytes(
                        bytes[pos..pos + 4].try_into().expect("length checked"),
                    ) as usize;
                    pos += 4;
                    #check
                });
                dyn_index += 1;
            } else {
                let size = self.static_size_expr(&field.desc);
                let stmts = self.unmarshal_stmts(&field.desc, &field_access, &quote!(src))?;
                fixed_stmts.push(quote! {
                    {
                        let field_size = #size;
                        let src = &bytes[pos..pos + field_size];
                        #stmts
                        pos += field_size;
                    }
                });
            }
        }

        let mut body_stmts = Vec::new();
        let dyn_count = dyn_index;
        for (i, dyn_ref) in desc.dyn_fields.iter().enumerate() {
            let field = &desc.fields[dyn_ref.field];
            let field_access = self.field_access(access, &field.name);
            let off = format_ident!("offset_{}", i);
            let end = if i + 1 == dyn_count {
                quote!(bytes.len())
            } else {
                let next = format_ident!("offset_{}", i + 1);
                quote!(#next)
            };
            let stmts = self.unmarshal_stmts(&field.desc, &field_access, &quote!(src))?;
            body_stmts.push(quote! {
                {
                    let src = &bytes[#off..#end];
                    #stmts
                }
            });
        }

        Ok(quote! {
            let fixed_len: usize = #fixed_len;
            #length_check
            let mut pos = 0usize;
            #(#fixed_stmts)*
            #(#body_stmts)*
        })
    }

    fn unmarshal_stmts(
        &self,
        desc: &Arc<TypeDescriptor>,
        target: &TokenStream,
        src: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        match desc.kind {
            SszKind::Bool => Ok(quote! {
                #target = match #src[0] {
                    0 => false,
                    1 => true,
                    value => {
                        return Err(::dynssz::SszError::InvalidValueRange { value });
                    }
                };
            }),
            SszKind::Uint8 => Ok(quote!(#target = #src[0];)),
            SszKind::Uint16 => Ok(quote! {
                #target = u16::from_le_bytes(#src.try_into().expect("length checked"));
            }),
            SszKind::Uint32 => Ok(quote! {
                #target = u32::from_le_bytes(#src.try_into().expect("length checked"));
            }),
            SszKind::Uint64 => Ok(quote! {
                #target = u64::from_le_bytes(#src.try_into().expect("length checked"));
            }),
            SszKind::Uint128 => Ok(quote! {
                #target = ::dynssz::U128::from_le_bytes::<16>(
                    #src.try_into().expect("length checked"),
                );
            }),
            SszKind::Uint256 => Ok(quote! {
                #target = ::dynssz::U256::from_le_bytes::<32>(
                    #src.try_into().expect("length checked"),
                );
            }),
            SszKind::Bitvector => {
                let bits = desc.bit_length.unwrap_or(0);
                Ok(quote! {
                    #target = ::dynssz::BitSeq::from_bitvector_bytes(#src.to_vec(), #bits)?;
                })
            }
            SszKind::Bitlist | SszKind::ProgressiveBitlist => {
                let limit_check = self.bit_limit_check(desc, target);
                Ok(quote! {
                    #target = ::dynssz::BitSeq::from_bitlist_bytes(#src)?;
                    #limit_check
                })
            }
            SszKind::Vector => self.unmarshal_vector(desc, target, src),
            SszKind::List | SszKind::ProgressiveList => {
                self.unmarshal_list(desc, target, src)
            }
            SszKind::Container | SszKind::ProgressiveContainer => {
                Ok(quote!(#target.unmarshal_ssz_dyn(specs, #src)?;))
            }
            SszKind::TypeWrapper => {
                let inner = desc.wrapped.as_ref().expect("wrapper has inner");
                self.unmarshal_stmts(inner, target, src)
            }
            other => Err(CodegenError::Generation(format!(
                "{other:?} fields are not supported by the generator"
            ))),
        }
    }

    fn unmarshal_vector(
        &self,
        desc: &Arc<TypeDescriptor>,
        target: &TokenStream,
        src: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        if desc.host.is_byte_array {
            return Ok(quote! {
                #target = #src.try_into().expect("length checked");
            });
        }
        let element = desc.element.as_ref().expect("vector has element");
        if element.flags.is_dynamic {
            return Err(CodegenError::Generation(
                "vectors of dynamic elements are not supported by the generator".into(),
            ));
        }
        let elem_size = self.static_size_expr(element);
        let elem_ty = rust_type(&element.runtime)?;
        let item = self.unmarshal_stmts(element, &quote!(item), &quote!(chunk))?;
        Ok(quote! {
            #target = #src
                .chunks(#elem_size)
                .map(|chunk| {
                    let mut item = <#elem_ty>::default();
                    #item
                    Ok(item)
                })
                .collect::<Result<Vec<_>, ::dynssz::SszError>>()?;
        })
    }

    fn unmarshal_list(
        &self,
        desc: &Arc<TypeDescriptor>,
        target: &TokenStream,
        src: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        if desc.host.is_byte_array {
            let limit_check = self.list_limit_check(desc, target);
            return Ok(quote! {
                #target = #src.to_vec();
                #limit_check
            });
        }
        if desc.host.is_string {
            let limit_check = self.list_limit_check(desc, target);
            return Ok(quote! {
                #target = String::from_utf8(#src.to_vec()).map_err(|_| {
                    ::dynssz::SszError::ValueMismatch {
                        type_name: "String".to_string(),
                        detail: "invalid utf-8".to_string(),
                    }
                })?;
                #limit_check
            });
        }
        let element = desc.element.as_ref().expect("list has element");
        let elem_ty = rust_type(&element.runtime)?;
        let limit_check = self.list_limit_check(desc, target);
        if !element.flags.is_dynamic {
            let elem_size = self.static_size_expr(element);
            let item = self.unmarshal_stmts(element, &quote!(item), &quote!(chunk))?;
            return Ok(quote! {
                {
                    let elem_size: usize = #elem_size;
                    if #src.len() % elem_size != 0 {
                        return Err(::dynssz::SszError::InvalidByteLength {
                            len: #src.len(),
                            expected: elem_size,
                        });
                    }
                    #target = #src
                        .chunks(elem_size)
                        .map(|chunk| {
                            let mut item = <#elem_ty>::default();
                            #item
                            Ok(item)
                        })
                        .collect::<Result<Vec<_>, ::dynssz::SszError>>()?;
                    #limit_check
                }
            });
        }
        let item = self.unmarshal_stmts(element, &quote!(item), &quote!(chunk))?;
        Ok(quote! {
            {
                let src = #src;
                let mut items = Vec::new();
                if !src.is_empty() {
                    let first = u32::from_le_bytes(
                        src.get(0..4)
                            .ok_or(::dynssz::SszError::UnexpectedEof {
                                needed: 4,
                                available: src.len(),
                            })?
                            .try_into()
                            .expect("length checked"),
                    ) as usize;
                    if first == 0
                        || first % ::dynssz::BYTES_PER_LENGTH_OFFSET != 0
                        || first > src.len()
                    {
                        return Err(::dynssz::SszError::IncorrectOffset {
                            offset: first,
                            limit: src.len(),
                        });
                    }
                    let count = first / ::dynssz::BYTES_PER_LENGTH_OFFSET;
                    let mut prev = first;
                    for index in 0..count {
                        let start = prev;
                        let end = if index + 1 == count {
                            src.len()
                        } else {
                            let at = (index + 1) * ::dynssz::BYTES_PER_LENGTH_OFFSET;
                            let next = u32::from_le_bytes(
                                src[at..at + 4].try_into().expect("length checked"),
                            ) as usize;
                            if next < prev || next > src.len() {
                                return Err(::dynssz::SszError::IncorrectOffset {
                                    offset: next,
                                    limit: src.len(),
                                });
                            }
                            next
                        };
                        let chunk = &src[start..end];
                        let mut item = <#elem_ty>::default();
                        #item
                        items.push(item);
                        prev = end;
                    }
                }
                #target = items;
                #limit_check
            }
        })
    }

    // -- hash --

    fn emit_hash(&self, desc: &Arc<TypeDescriptor>) -> Result<TokenStream, CodegenError> {
        let body = self.container_hash_stmts(desc, &quote!(self))?;
        Ok(quote! {
            /// Writes this value's chunks into `walker` and merkleizes
            /// them, leaving one root chunk.
            #[allow(unused_variables)]
            pub fn hash_tree_root_dyn(
                &self,
                specs: &dyn ::dynssz::SpecResolver,
                walker: &mut dyn ::dynssz::HashWalker,
            ) -> Result<(), ::dynssz::SszError> {
                #body
                Ok(())
            }
        })
    }

    fn container_hash_stmts(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        let mut field_stmts = Vec::new();
        for field in &desc.fields {
            let field_access = self.field_access(access, &field.name);
            field_stmts.push(self.hash_stmts(&field.desc, &field_access)?);
        }
        Ok(quote! {
            let indx = walker.index();
            #(#field_stmts)*
            walker.merkleize(indx, 0);
        })
    }

    fn hash_stmts(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        match desc.kind {
            SszKind::Bool => Ok(quote! {
                walker.append_bool(#access);
                walker.fill_up_to_32();
            }),
            SszKind::Uint8 => Ok(quote! {
                walker.append_uint8(#access);
                walker.fill_up_to_32();
            }),
            SszKind::Uint16 => Ok(quote! {
                walker.append_bytes(&#access.to_le_bytes());
                walker.fill_up_to_32();
            }),
            SszKind::Uint32 => Ok(quote! {
                walker.append_uint32(#access);
                walker.fill_up_to_32();
            }),
            SszKind::Uint64 => Ok(quote! {
                walker.append_uint64(#access);
                walker.fill_up_to_32();
            }),
            SszKind::Uint128 => Ok(quote! {
                walker.append_bytes(&#access.to_le_bytes::<16>());
                walker.fill_up_to_32();
            }),
            SszKind::Uint256 => Ok(quote! {
                walker.append_bytes(&#access.to_le_bytes::<32>());
            }),
            SszKind::Bitvector => {
                let chunks = desc.bit_length.unwrap_or(0).div_ceil(256);
                Ok(quote! {
                    {
                        let indx = walker.index();
                        walker.append_bytes(#access.as_slice());
                        walker.fill_up_to_32();
                        walker.merkleize(indx, #chunks);
                    }
                })
            }
            SszKind::Bitlist => {
                let limit = self.bit_limit_expr(desc);
                Ok(quote!(walker.put_bitlist(&#access, #limit);))
            }
            SszKind::ProgressiveBitlist => {
                Ok(quote!(walker.put_progressive_bitlist(&#access);))
            }
            SszKind::Vector => self.hash_vector(desc, access),
            SszKind::List => self.hash_list(desc, access),
            SszKind::ProgressiveList => self.hash_progressive_list(desc, access),
            SszKind::Container | SszKind::ProgressiveContainer => {
                Ok(quote!(#access.hash_tree_root_dyn(specs, walker)?;))
            }
            SszKind::TypeWrapper => {
                let inner = desc.wrapped.as_ref().expect("wrapper has inner");
                self.hash_stmts(inner, access)
            }
            other => Err(CodegenError::Generation(format!(
                "{other:?} fields are not supported by the generator"
            ))),
        }
    }

    fn hash_vector(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        let element = desc.element.as_ref().expect("vector has element");
        if desc.host.is_byte_array {
            let len = self.vector_len_expr(desc);
            return Ok(quote! {
                {
                    let indx = walker.index();
                    walker.append_bytes(#access.as_ref());
                    walker.fill_up_to_32();
                    walker.merkleize(indx, (#len).div_ceil(32));
                }
            });
        }
        if element.kind.is_basic() {
            let elem_size = element.size;
            let len = self.vector_len_expr(desc);
            let item = self.hash_pack_stmts(element, &quote!(item))?;
            return Ok(quote! {
                {
                    let indx = walker.index();
                    for item in #access.iter() {
                        #item
                    }
                    walker.fill_up_to_32();
                    walker.merkleize(indx, ((#len) * #elem_size).div_ceil(32));
                }
            });
        }
        let item = self.hash_stmts(element, &quote!(item))?;
        let len = self.vector_len_expr(desc);
        Ok(quote! {
            {
                let indx = walker.index();
                for item in #access.iter() {
                    #item
                }
                walker.merkleize(indx, #len);
            }
        })
    }

    fn hash_list(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        let limit = self.list_limit_expr(desc);
        if desc.host.is_byte_array {
            return Ok(quote! {
                {
                    let indx = walker.index();
                    walker.append_bytes(#access.as_ref());
                    walker.fill_up_to_32();
                    walker.merkleize_with_mixin(
                        indx,
                        #access.len() as u64,
                        (#limit as usize).div_ceil(32),
                    );
                }
            });
        }
        if desc.host.is_string {
            return Ok(quote! {
                {
                    let indx = walker.index();
                    walker.append_bytes(#access.as_bytes());
                    walker.fill_up_to_32();
                    walker.merkleize_with_mixin(
                        indx,
                        #access.len() as u64,
                        (#limit as usize).div_ceil(32),
                    );
                }
            });
        }
        let element = desc.element.as_ref().expect("list has element");
        if element.kind.is_basic() {
            let elem_size = element.size;
            let item = self.hash_pack_stmts(element, &quote!(item))?;
            return Ok(quote! {
                {
                    let indx = walker.index();
                    for item in #access.iter() {
                        #item
                    }
                    walker.fill_up_to_32();
                    walker.merkleize_with_mixin(
                        indx,
                        #access.len() as u64,
                        (#limit as usize * #elem_size).div_ceil(32),
                    );
                }
            });
        }
        let item = self.hash_stmts(element, &quote!(item))?;
        Ok(quote! {
            {
                let indx = walker.index();
                for item in #access.iter() {
                    #item
                }
                walker.merkleize_with_mixin(indx, #access.len() as u64, #limit as usize);
            }
        })
    }

    fn hash_progressive_list(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        let element = desc.element.as_ref().expect("list has element");
        let items = if element.kind.is_basic() {
            let item = self.hash_pack_stmts(element, &quote!(item))?;
            quote! {
                for item in #access.iter() {
                    #item
                }
                walker.fill_up_to_32();
            }
        } else {
            let item = self.hash_stmts(element, &quote!(item))?;
            quote! {
                for item in #access.iter() {
                    #item
                }
            }
        };
        Ok(quote! {
            {
                let indx = walker.index();
                #items
                walker.merkleize_progressive_with_mixin(indx, #access.len() as u64);
            }
        })
    }

    /// Packed (no per-item padding) append for basic sequence elements.
    fn hash_pack_stmts(
        &self,
        element: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> Result<TokenStream, CodegenError> {
        Ok(match element.kind {
            SszKind::Bool => quote!(walker.append_bool(*#access);),
            SszKind::Uint8 => quote!(walker.append_uint8(*#access);),
            SszKind::Uint16 => quote!(walker.append_bytes(&#access.to_le_bytes());),
            SszKind::Uint32 => quote!(walker.append_uint32(*#access);),
            SszKind::Uint64 => quote!(walker.append_uint64(*#access);),
            SszKind::Uint128 => quote!(walker.append_bytes(&#access.to_le_bytes::<16>());),
            SszKind::Uint256 => quote!(walker.append_bytes(&#access.to_le_bytes::<32>());),
            other => {
                return Err(CodegenError::Generation(format!(
                    "{other:?} is not a packable element kind"
                )));
            }
        })
    }

    // -- wrappers and bridges --

    fn emit_legacy_wrappers(&self) -> TokenStream {
        quote! {
            /// The exact encoded size under static defaults.
            pub fn size_ssz(&self) -> usize {
                self.ssz_size_dyn(&::dynssz::NoSpecs)
            }

            /// The SSZ encoding under static defaults.
            pub fn marshal_ssz(&self) -> Result<Vec<u8>, ::dynssz::SszError> {
                let mut dst = Vec::with_capacity(self.size_ssz());
                self.marshal_ssz_dyn(&::dynssz::NoSpecs, &mut dst)?;
                Ok(dst)
            }

            /// Appends the SSZ encoding under static defaults.
            pub fn marshal_ssz_to(
                &self,
                dst: &mut Vec<u8>,
            ) -> Result<(), ::dynssz::SszError> {
                self.marshal_ssz_dyn(&::dynssz::NoSpecs, dst)
            }

            /// Decodes under static defaults.
            pub fn unmarshal_ssz(&mut self, bytes: &[u8]) -> Result<(), ::dynssz::SszError> {
                self.unmarshal_ssz_dyn(&::dynssz::NoSpecs, bytes)
            }

            /// The 32-byte hash-tree-root under static defaults.
            pub fn hash_tree_root(
                &self,
            ) -> Result<::dynssz::Hash256, ::dynssz::SszError> {
                let mut hasher = ::dynssz::Hasher::new();
                self.hash_tree_root_dyn(&::dynssz::NoSpecs, &mut hasher)?;
                hasher.root()
            }
        }
    }

    fn emit_streaming(&self, desc: &Arc<TypeDescriptor>) -> TokenStream {
        let dynamic = desc.flags.is_dynamic;
        let size = desc.size;
        let read_len = if dynamic {
            quote!(dec.remaining())
        } else {
            quote!(#size)
        };
        quote! {
            /// Encodes into an encoder sink. Offsets are computed from the
            /// size pass, so the sink may be non-seekable.
            pub fn marshal_ssz_encoder(
                &self,
                specs: &dyn ::dynssz::SpecResolver,
                enc: &mut dyn ::dynssz::Encoder,
            ) -> Result<(), ::dynssz::SszError> {
                let mut dst = Vec::with_capacity(self.ssz_size_dyn(specs));
                self.marshal_ssz_dyn(specs, &mut dst)?;
                enc.encode_bytes(&dst)
            }

            /// Decodes from a decoder source, consuming this value's
            /// window.
            pub fn unmarshal_ssz_decoder(
                &mut self,
                specs: &dyn ::dynssz::SpecResolver,
                dec: &mut dyn ::dynssz::Decoder,
            ) -> Result<(), ::dynssz::SszError> {
                let len = #read_len;
                let bytes = dec.decode_bytes_ref(len)?.to_vec();
                self.unmarshal_ssz_dyn(specs, &bytes)
            }
        }
    }

    fn emit_views(
        &self,
        views: &[(Arc<TypeDef>, Arc<TypeDescriptor>)],
    ) -> Result<TokenStream, CodegenError> {
        let mut size_arms = Vec::new();
        let mut marshal_arms = Vec::new();
        let mut unmarshal_arms = Vec::new();
        let mut hash_arms = Vec::new();
        for (schema, desc) in views {
            let name = schema.name();
            let size = self.container_size_expr(desc, &quote!(self))?;
            let marshal = self.container_marshal_stmts(desc, &quote!(self))?;
            let unmarshal = self.container_unmarshal_stmts(desc, &quote!(self))?;
            let hash = self.container_hash_stmts(desc, &quote!(self))?;
            size_arms.push(quote!(#name => Some({ #size }),));
            marshal_arms.push(quote! {
                #name => Some((|| {
                    #marshal
                    Ok(())
                })()),
            });
            unmarshal_arms.push(quote! {
                #name => Some((|| {
                    #unmarshal
                    Ok(())
                })()),
            });
            hash_arms.push(quote! {
                #name => Some((|| {
                    #hash
                    Ok(())
                })()),
            });
        }
        Ok(quote! {
            /// The encoded size under a view schema; `None` when the view
            /// is not specialized here.
            #[allow(unused_variables)]
            pub fn ssz_size_view(
                &self,
                specs: &dyn ::dynssz::SpecResolver,
                view: &::std::sync::Arc<::dynssz::TypeDef>,
            ) -> Option<usize> {
                match view.name() {
                    #(#size_arms)*
                    _ => None,
                }
            }

            /// Encodes under a view schema; `None` when the view is not
            /// specialized here.
            #[allow(unused_variables)]
            pub fn marshal_ssz_view(
                &self,
                specs: &dyn ::dynssz::SpecResolver,
                view: &::std::sync::Arc<::dynssz::TypeDef>,
                dst: &mut Vec<u8>,
            ) -> Option<Result<(), ::dynssz::SszError>> {
                match view.name() {
                    #(#marshal_arms)*
                    _ => None,
                }
            }

            /// Decodes under a view schema; `None` when the view is not
            /// specialized here.
            #[allow(unused_variables)]
            pub fn unmarshal_ssz_view(
                &mut self,
                specs: &dyn ::dynssz::SpecResolver,
                view: &::std::sync::Arc<::dynssz::TypeDef>,
                bytes: &[u8],
            ) -> Option<Result<(), ::dynssz::SszError>> {
                match view.name() {
                    #(#unmarshal_arms)*
                    _ => None,
                }
            }

            /// Hashes under a view schema; `None` when the view is not
            /// specialized here.
            #[allow(unused_variables)]
            pub fn hash_tree_root_view(
                &self,
                specs: &dyn ::dynssz::SpecResolver,
                view: &::std::sync::Arc<::dynssz::TypeDef>,
                walker: &mut dyn ::dynssz::HashWalker,
            ) -> Option<Result<(), ::dynssz::SszError>> {
                match view.name() {
                    #(#hash_arms)*
                    _ => None,
                }
            }
        })
    }

    fn emit_delegate_bridge(
        &self,
        ident: &Ident,
        views: &[(Arc<TypeDef>, Arc<TypeDescriptor>)],
    ) -> TokenStream {
        let view_bridge = if views.is_empty() {
            TokenStream::new()
        } else {
            quote! {
                fn size_ssz_view(
                    &self,
                    specs: &dyn ::dynssz::SpecResolver,
                    view: &::std::sync::Arc<::dynssz::TypeDef>,
                ) -> Option<usize> {
                    #ident::ssz_size_view(self, specs, view)
                }

                fn marshal_ssz_view(
                    &self,
                    specs: &dyn ::dynssz::SpecResolver,
                    view: &::std::sync::Arc<::dynssz::TypeDef>,
                    dst: &mut Vec<u8>,
                ) -> Option<Result<(), ::dynssz::SszError>> {
                    #ident::marshal_ssz_view(self, specs, view, dst)
                }

                fn unmarshal_ssz_view(
                    &mut self,
                    specs: &dyn ::dynssz::SpecResolver,
                    view: &::std::sync::Arc<::dynssz::TypeDef>,
                    bytes: &[u8],
                ) -> Option<Result<(), ::dynssz::SszError>> {
                    #ident::unmarshal_ssz_view(self, specs, view, bytes)
                }

                fn hash_tree_root_view(
                    &self,
                    specs: &dyn ::dynssz::SpecResolver,
                    view: &::std::sync::Arc<::dynssz::TypeDef>,
                    walker: &mut dyn ::dynssz::HashWalker,
                ) -> Option<Result<(), ::dynssz::SszError>> {
                    #ident::hash_tree_root_view(self, specs, view, walker)
                }
            }
        };

        quote! {
            impl ::dynssz::SszDelegate for #ident {
                fn as_any(&self) -> &dyn ::std::any::Any {
                    self
                }

                fn clone_box(&self) -> Box<dyn ::dynssz::SszDelegate> {
                    Box::new(self.clone())
                }

                fn delegate_eq(&self, other: &dyn ::dynssz::SszDelegate) -> bool {
                    other.as_any().downcast_ref::<Self>() == Some(self)
                }

                fn size_ssz(&self) -> usize {
                    self.ssz_size_dyn(&::dynssz::NoSpecs)
                }

                fn marshal_ssz_to(&self, dst: &mut Vec<u8>) -> Result<(), ::dynssz::SszError> {
                    self.marshal_ssz_dyn(&::dynssz::NoSpecs, dst)
                }

                fn unmarshal_ssz(&mut self, bytes: &[u8]) -> Result<(), ::dynssz::SszError> {
                    self.unmarshal_ssz_dyn(&::dynssz::NoSpecs, bytes)
                }

                fn hash_tree_root_with(
                    &self,
                    walker: &mut dyn ::dynssz::HashWalker,
                ) -> Result<(), ::dynssz::SszError> {
                    self.hash_tree_root_dyn(&::dynssz::NoSpecs, walker)
                }

                fn size_ssz_dyn(&self, specs: &dyn ::dynssz::SpecResolver) -> Option<usize> {
                    Some(#ident::ssz_size_dyn(self, specs))
                }

                fn marshal_ssz_dyn(
                    &self,
                    specs: &dyn ::dynssz::SpecResolver,
                    dst: &mut Vec<u8>,
                ) -> Option<Result<(), ::dynssz::SszError>> {
                    Some(#ident::marshal_ssz_dyn(self, specs, dst))
                }

                fn unmarshal_ssz_dyn(
                    &mut self,
                    specs: &dyn ::dynssz::SpecResolver,
                    bytes: &[u8],
                ) -> Option<Result<(), ::dynssz::SszError>> {
                    Some(#ident::unmarshal_ssz_dyn(self, specs, bytes))
                }

                fn hash_tree_root_dyn(
                    &self,
                    specs: &dyn ::dynssz::SpecResolver,
                    walker: &mut dyn ::dynssz::HashWalker,
                ) -> Option<Result<(), ::dynssz::SszError>> {
                    Some(#ident::hash_tree_root_dyn(self, specs, walker))
                }

                #view_bridge
            }
        }
    }

    // -- helpers --

    fn field_access(&self, base: &TokenStream, name: &str) -> TokenStream {
        let ident = Ident::new(name, Span::call_site());
        quote!(#base.#ident)
    }

    /// Element-count expression for a vector, honoring a retained size
    /// expression when dynamic expressions are enabled.
    fn vector_len_expr(&self, desc: &Arc<TypeDescriptor>) -> TokenStream {
        let len = desc.length;
        match (&desc.size_expr, self.options.no_dyn_expressions) {
            (Some(expr), false) => {
                let default = len as u64;
                quote!((::dynssz::resolve_expr(specs, #expr, #default) as usize))
            }
            _ => quote!(#len),
        }
    }

    /// Capacity expression for a list, honoring a retained max expression.
    fn list_limit_expr(&self, desc: &Arc<TypeDescriptor>) -> TokenStream {
        let limit = desc.limit.unwrap_or(0);
        match (&desc.max_expr, self.options.no_dyn_expressions) {
            (Some(expr), false) => quote!(::dynssz::resolve_expr(specs, #expr, #limit)),
            _ => quote!(#limit),
        }
    }

    fn bit_limit_expr(&self, desc: &Arc<TypeDescriptor>) -> TokenStream {
        self.list_limit_expr(desc)
    }

    fn list_limit_check(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> TokenStream {
        if desc.limit.is_none() && desc.max_expr.is_none() {
            return TokenStream::new();
        }
        let limit = self.list_limit_expr(desc);
        quote! {
            {
                let limit = #limit as usize;
                if #access.len() > limit {
                    return Err(::dynssz::SszError::ListTooBig {
                        len: #access.len(),
                        max: limit,
                    });
                }
            }
        }
    }

    fn bit_limit_check(
        &self,
        desc: &Arc<TypeDescriptor>,
        access: &TokenStream,
    ) -> TokenStream {
        self.list_limit_check(desc, access)
    }
}

/// The Rust surface type for a type-graph node, used when generated code
/// needs to name element types.
fn rust_type(def: &Arc<TypeDef>) -> Result<syn::Type, CodegenError> {
    let text = match def.kind() {
        HostKind::Bool => "bool".to_string(),
        HostKind::Uint8 => "u8".to_string(),
        HostKind::Uint16 => "u16".to_string(),
        HostKind::Uint32 => "u32".to_string(),
        HostKind::Uint64 | HostKind::Time => "u64".to_string(),
        HostKind::Uint128 => "::dynssz::U128".to_string(),
        HostKind::Uint256 => "::dynssz::U256".to_string(),
        HostKind::Str => "String".to_string(),
        HostKind::Bits => "::dynssz::BitSeq".to_string(),
        HostKind::Struct | HostKind::Wrapper | HostKind::Union | HostKind::Custom => {
            def.name().to_string()
        }
        HostKind::Array | HostKind::Slice => {
            let element = def.element().ok_or_else(|| {
                CodegenError::Generation(format!(
                    "sequence type {} has no element",
                    def.name()
                ))
            })?;
            let inner = rust_type(element)?;
            let inner = quote!(#inner).to_string();
            if def.kind() == HostKind::Array {
                format!("[{inner}; {}]", def.len())
            } else {
                format!("Vec<{inner}>")
            }
        }
    };
    syn::parse_str(&text).map_err(|e| {
        CodegenError::Generation(format!("cannot name type {}: {e}", def.name()))
    })
}
