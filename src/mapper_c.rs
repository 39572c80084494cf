//! Mapper-C — `spec.md` §4.2.
//!
//! Converts the Explorer's cursor lists into an immutable [`Cas`]. Type-name
//! canonicalisation is grounded in the teacher's `map_clang_type` (a
//! recursive match over `clang::TypeKind`); the anonymous-record and
//! function-pointer naming policy is grounded in `try_extract_anonymous_field`
//! and `emit_delegate`, generalized from "name it and emit it immediately"
//! into "name it and register it as a CAS node".

use std::collections::HashSet;

use anyhow::{Context, Result};
use clang::{CallingConvention, Entity, EntityKind, Type as ClangType, TypeKind};
use tracing::{debug, trace, warn};

use crate::cas::*;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Location};
use crate::explorer::ExplorerOutput;

/// Source location of an entity, matching the `(file, line, column)` triple
/// the parser contract exposes on every cursor (`spec.md` §6) — used so
/// diagnostics point at the offending declaration rather than a blank
/// location.
fn location_of(entity: &Entity) -> Location {
    let Some(loc) = entity.get_location() else {
        return Location::default();
    };
    let file_location = loc.get_file_location();
    let file = file_location
        .file
        .map(|f| f.get_path())
        .unwrap_or_else(|| std::path::Path::new("<unknown>").to_path_buf());
    Location {
        file: file.display().to_string(),
        line: file_location.line,
        column: file_location.column,
    }
}

/// Convert one partition's Explorer output into a CAS. `namespace` isn't
/// stored on CAS nodes (CAS is namespace-agnostic, per `spec.md` §3.1) but
/// is threaded through for diagnostic messages.
pub fn map_partition(
    namespace: &str,
    output: &ExplorerOutput,
    diagnostics: &mut Diagnostics,
) -> Cas {
    let mut cas = Cas::default();

    for entity in &output.records {
        let name = entity.get_name().unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        match extract_record(&mut cas, entity, &name, diagnostics) {
            Ok(()) => {
                cas.push_root(CNodeKind::Record, name);
            }
            Err(e) => warn!(namespace, name = %name, err = %e, "skipping record"),
        }
    }

    for entity in &output.opaque_types {
        let name = entity.get_name().unwrap_or_default();
        if name.is_empty() || cas.type_by_name(&name).is_some() {
            continue;
        }
        cas.opaque_types.push(COpaqueType { name: name.clone() });
        cas.insert_type(CType {
            name: name.clone(),
            original_name: name.clone(),
            size_bytes: 0,
            align_bytes: 0,
            array_size: None,
            element_size: None,
            kind: CTypeKind::Record,
            is_system: entity.is_in_system_header(),
        });
        cas.push_root(CNodeKind::OpaqueType, name);
    }

    for entity in &output.enums {
        let name = entity.get_name().unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        match extract_enum(&mut cas, entity, &name, diagnostics) {
            Ok(()) => cas.push_root(CNodeKind::Enum, name),
            Err(e) => warn!(namespace, name = %name, err = %e, "skipping enum"),
        }
    }

    for entity in &output.typedefs {
        let name = entity.get_name().unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        match extract_typedef(&mut cas, entity, &name, diagnostics) {
            Ok(()) => {}
            Err(e) => warn!(namespace, name = %name, err = %e, "skipping typedef"),
        }
    }

    for entity in &output.variables {
        let name = entity.get_name().unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let Some(ty) = entity.get_type() else { continue };
        match canonicalize_type(&mut cas, &ty, diagnostics, &format!("variable `{name}`")) {
            Ok(type_name) => {
                cas.variables.push(CVariable {
                    name: name.clone(),
                    type_name,
                });
                cas.push_root(CNodeKind::Variable, name);
            }
            Err(e) => warn!(namespace, name = %name, err = %e, "skipping variable"),
        }
    }

    for entity in &output.functions {
        let name = entity.get_name().unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        match extract_function(&mut cas, entity, &name, diagnostics) {
            Ok(Some(())) => cas.push_root(CNodeKind::Function, name),
            Ok(None) => {} // dropped (va_list), diagnostic already pushed
            Err(e) => warn!(namespace, name = %name, err = %e, "skipping function"),
        }
    }

    for entity in &output.macros {
        let name = entity.get_name().unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        if let Some(macro_def) = lower_macro(entity, &name, diagnostics) {
            cas.macros.push(macro_def);
            cas.push_root(CNodeKind::MacroObject, name);
        }
    }

    cas
}

// ---------------------------------------------------------------------------
// Records (structs/unions), including anonymous nested members
// ---------------------------------------------------------------------------

fn extract_record(
    cas: &mut Cas,
    entity: &Entity,
    name: &str,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let is_union = entity.get_kind() == EntityKind::UnionDecl;
    let record = extract_record_fields(cas, entity, name, is_union, diagnostics)?;
    cas.records.push(record);
    Ok(())
}

/// Extracts one record's fields, recursing into anonymous nested
/// struct/union members. Registers this record's (and every nested
/// record's) `CType` — size and alignment come straight from clang's layout
/// oracle, not from summing field sizes — before returning, so a field
/// typed as a nested anonymous record resolves to a real size rather than
/// zero when computing that field's own padding below.
fn extract_record_fields(
    cas: &mut Cas,
    entity: &Entity,
    name: &str,
    is_union: bool,
    diagnostics: &mut Diagnostics,
) -> Result<CRecord> {
    let ty = entity.get_type().context("record has no type")?;
    let size_bytes = ty.get_sizeof().unwrap_or(0);
    let align_bytes = ty.get_alignof().unwrap_or(1);
    cas.insert_type(CType {
        name: name.to_string(),
        original_name: name.to_string(),
        size_bytes,
        align_bytes,
        array_size: None,
        element_size: None,
        kind: CTypeKind::Record,
        is_system: entity.is_in_system_header(),
    });

    let mut fields = Vec::new();
    let mut nested_records = Vec::new();
    let mut nested_function_pointers = Vec::new();
    // (offset_bits, size_bits) recorded alongside each field so padding can
    // be computed once every field's layout is known.
    let mut layout: Vec<(usize, usize)> = Vec::new();

    for child in entity.get_children() {
        if child.get_kind() != EntityKind::FieldDecl {
            continue;
        }
        let field_name = child.get_name().unwrap_or_default();
        let field_type = child.get_type().context("field has no type")?;
        let offset_bits = child.get_offset_of_field().unwrap_or(0);

        let type_name = if let Some(synth) = try_anonymous_field(
            cas,
            &field_type,
            name,
            &field_name,
            &mut nested_records,
            diagnostics,
        )? {
            synth
        } else if let Some(fnptr) = fnptr_shape(&field_type) {
            let synth_name = format!("FnPtr_{field_name}");
            register_synthetic_fnptr(cas, &synth_name, &fnptr, diagnostics)?;
            nested_function_pointers.push(cas.function_pointers.last().unwrap().clone());
            synth_name
        } else {
            canonicalize_type(
                cas,
                &field_type,
                diagnostics,
                &format!("field `{field_name}` of `{name}`"),
            )?
        };

        let field_size_bits = cas
            .type_by_name(&type_name)
            .map(|t| field_bits(t, child))
            .unwrap_or(0);
        layout.push((offset_bits, field_size_bits));

        fields.push(CRecordField {
            name: field_name,
            type_name,
            offset_bits,
            padding_bits: 0, // filled in below
        });
    }

    let total_bits = size_bytes * 8;
    for (i, field) in fields.iter_mut().enumerate() {
        let (offset, size) = layout[i];
        let next_offset = layout.get(i + 1).map(|(o, _)| *o).unwrap_or(total_bits);
        field.padding_bits = next_offset.saturating_sub(offset + size);
    }

    Ok(CRecord {
        name: name.to_string(),
        is_union,
        fields,
        nested_records,
        nested_function_pointers,
        type_ref: name.to_string(),
    })
}

fn field_bits(ty: &CType, child: Entity) -> usize {
    if child.is_bit_field() {
        child.get_bit_field_width().unwrap_or(0)
    } else {
        ty.size_bytes * 8
    }
}

/// Detects an anonymous struct/union field (`union { ... } u;`), extracts it
/// as a synthetic named record (`Anonymous_<Struct|Union>_<field>`, the
/// naming scheme of `spec.md` §3.1), registers it in `nested_records`, and
/// returns the synthetic name for the caller to use as the field's type.
fn try_anonymous_field(
    cas: &mut Cas,
    field_type: &ClangType,
    parent_name: &str,
    field_name: &str,
    nested_records: &mut Vec<CRecord>,
    diagnostics: &mut Diagnostics,
) -> Result<Option<String>> {
    let canonical = field_type.get_canonical_type();
    if canonical.get_kind() != TypeKind::Record {
        return Ok(None);
    }
    let Some(decl) = canonical.get_declaration() else {
        return Ok(None);
    };
    if !decl.is_anonymous() {
        return Ok(None);
    }
    let is_union = decl.get_kind() == EntityKind::UnionDecl;
    let kind_word = if is_union { "Union" } else { "Struct" };
    let synthetic_name = format!("Anonymous_{kind_word}_{field_name}");

    diagnostics.push(Diagnostic::new(
        DiagnosticKind::AnonymousNamed,
        synthetic_name.clone(),
        location_of(&decl),
    ));

    let nested = extract_record_fields(cas, &decl, &synthetic_name, is_union, diagnostics)
        .with_context(|| format!("anonymous field `{field_name}` of `{parent_name}`"))?;
    debug!(parent = parent_name, field = field_name, name = %synthetic_name, "anonymous record named");
    nested_records.push(nested);
    Ok(Some(synthetic_name))
}

/// Recognizes a function-pointer-shaped field type with no pre-existing
/// typedef name (`void (*)(void)` written inline in a struct).
fn fnptr_shape<'tu>(field_type: &ClangType<'tu>) -> Option<ClangType<'tu>> {
    let pointee = if field_type.get_kind() == TypeKind::Pointer {
        field_type.get_pointee_type()?
    } else {
        return None;
    };
    if pointee.get_kind() != TypeKind::FunctionPrototype
        && pointee.get_kind() != TypeKind::FunctionNoPrototype
    {
        return None;
    }
    // Already has a typedef name — the typedef pass handles it, don't
    // synthesize a second name for the same shape.
    if field_type.get_declaration().and_then(|d| d.get_name()).is_some() {
        return None;
    }
    Some(pointee)
}

fn register_synthetic_fnptr(
    cas: &mut Cas,
    name: &str,
    fn_type: &ClangType,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let fnptr = build_function_pointer(cas, name, fn_type, true, diagnostics)?;
    cas.function_pointers.push(fnptr);
    cas.insert_type(CType {
        name: name.to_string(),
        original_name: name.to_string(),
        size_bytes: std::mem::size_of::<usize>(),
        align_bytes: std::mem::align_of::<usize>(),
        array_size: None,
        element_size: None,
        kind: CTypeKind::FunctionPointer,
        is_system: false,
    });
    Ok(())
}

fn build_function_pointer(
    cas: &mut Cas,
    name: &str,
    fn_type: &ClangType,
    is_synthetic: bool,
    diagnostics: &mut Diagnostics,
) -> Result<CFunctionPointer> {
    let ret = fn_type
        .get_result_type()
        .context("function pointer has no return type")?;
    let return_type_name = canonicalize_type(
        cas,
        &ret,
        diagnostics,
        &format!("return type of function pointer `{name}`"),
    )?;
    let mut parameters = Vec::new();
    for arg in fn_type.get_argument_types().unwrap_or_default() {
        let type_name = canonicalize_type(
            cas,
            &arg,
            diagnostics,
            &format!("parameter of function pointer `{name}`"),
        )?;
        parameters.push(CFunctionPointerParameter { type_name });
    }
    Ok(CFunctionPointer {
        name: name.to_string(),
        is_synthetic,
        return_type_name,
        parameters,
    })
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

fn extract_enum(
    cas: &mut Cas,
    entity: &Entity,
    name: &str,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let underlying = entity
        .get_enum_underlying_type()
        .context("enum has no underlying type")?;
    let integer_type_name = canonicalize_type(
        cas,
        &underlying,
        diagnostics,
        &format!("underlying type of enum `{name}`"),
    )?;

    let mut values = Vec::new();
    for child in entity.get_children() {
        if child.get_kind() != EntityKind::EnumConstantDecl {
            continue;
        }
        let variant_name = child.get_name().unwrap_or_default();
        let (signed, _unsigned) = child.get_enum_constant_value().unwrap_or((0, 0));
        values.push(CEnumValue {
            name: variant_name,
            value: signed,
        });
    }

    cas.enums.push(CEnum {
        name: name.to_string(),
        integer_type_name: integer_type_name.clone(),
        values,
    });
    cas.insert_type(CType {
        name: name.to_string(),
        original_name: name.to_string(),
        size_bytes: underlying.get_sizeof().unwrap_or(4),
        align_bytes: underlying.get_alignof().unwrap_or(4),
        array_size: None,
        element_size: None,
        kind: CTypeKind::Enum,
        is_system: entity.is_in_system_header(),
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Typedefs (including function-pointer typedefs)
// ---------------------------------------------------------------------------

fn extract_typedef(
    cas: &mut Cas,
    entity: &Entity,
    name: &str,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let underlying = entity
        .get_typedef_underlying_type()
        .context("typedef has no underlying type")?;

    if is_struct_passthrough(&underlying, name) {
        trace!(name, "skipping struct/enum passthrough typedef");
        return Ok(());
    }

    let fnptr_pointee = match underlying.get_kind() {
        TypeKind::Pointer => underlying
            .get_pointee_type()
            .filter(|p| matches!(p.get_kind(), TypeKind::FunctionPrototype | TypeKind::FunctionNoPrototype)),
        TypeKind::FunctionPrototype | TypeKind::FunctionNoPrototype => Some(underlying),
        _ => None,
    };

    if let Some(fn_type) = fnptr_pointee {
        let fnptr = build_function_pointer(cas, name, &fn_type, false, diagnostics)?;
        cas.function_pointers.push(fnptr);
        cas.insert_type(CType {
            name: name.to_string(),
            original_name: name.to_string(),
            size_bytes: std::mem::size_of::<usize>(),
            align_bytes: std::mem::align_of::<usize>(),
            array_size: None,
            element_size: None,
            kind: CTypeKind::FunctionPointer,
            is_system: entity.is_in_system_header(),
        });
        return Ok(());
    }

    let underlying_type_name = canonicalize_type(
        cas,
        &underlying,
        diagnostics,
        &format!("underlying type of typedef `{name}`"),
    )?;
    cas.typedefs.push(CTypedef {
        name: name.to_string(),
        underlying_type_name: underlying_type_name.clone(),
    });
    if let Some(resolved) = cas.type_by_name(&underlying_type_name).cloned() {
        cas.insert_type(CType {
            name: name.to_string(),
            original_name: name.to_string(),
            size_bytes: resolved.size_bytes,
            align_bytes: resolved.align_bytes,
            array_size: resolved.array_size,
            element_size: resolved.element_size,
            kind: CTypeKind::Typedef,
            is_system: entity.is_in_system_header(),
        });
    }
    Ok(())
}

fn is_struct_passthrough(underlying: &ClangType, typedef_name: &str) -> bool {
    let display = underlying.get_display_name();
    for prefix in &["struct ", "enum ", "union "] {
        if let Some(rest) = display.strip_prefix(prefix)
            && rest == typedef_name
        {
            return true;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// `Ok(Some(()))` — extracted. `Ok(None)` — dropped (a `va_list` parameter
/// or return type; diagnostic already recorded). `Err` — unsupported type.
fn extract_function(
    cas: &mut Cas,
    entity: &Entity,
    name: &str,
    diagnostics: &mut Diagnostics,
) -> Result<Option<()>> {
    let fn_type = entity.get_type().context("function has no type")?;
    let ret_type = fn_type
        .get_result_type()
        .context("function has no return type")?;

    if is_va_list(&ret_type) {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::VariadicFunctionDropped,
            name.to_string(),
            location_of(entity),
        ));
        return Ok(None);
    }

    let args = entity.get_arguments().unwrap_or_default();
    let arg_types = fn_type.get_argument_types().unwrap_or_default();
    for at in &arg_types {
        if is_va_list(at) {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::VariadicFunctionDropped,
                name.to_string(),
                location_of(entity),
            ));
            return Ok(None);
        }
    }

    let return_type_name = canonicalize_type(
        cas,
        &ret_type,
        diagnostics,
        &format!("return type of function `{name}`"),
    )?;

    let mut parameters = Vec::new();
    let mut anon_count = 0usize;
    let mut seen_names: HashSet<String> = HashSet::new();
    for (i, arg_entity) in args.iter().enumerate() {
        let is_const = arg_entity
            .get_type()
            .map(|t| t.is_const_qualified())
            .unwrap_or(false);
        let ty = arg_types.get(i).cloned();
        let type_name = match ty {
            Some(t) => canonicalize_type(
                cas,
                &t,
                diagnostics,
                &format!("parameter {i} of function `{name}`"),
            )?,
            None => continue,
        };
        // Anonymous parameters are renamed `param`, `param2`, `param3`, …
        // at mapping time (`spec.md` §3.1's CAS non-empty-name invariant).
        let param_name = match arg_entity.get_name() {
            Some(n) if !n.is_empty() => n,
            _ => {
                anon_count += 1;
                if anon_count == 1 {
                    "param".to_string()
                } else {
                    format!("param{anon_count}")
                }
            }
        };
        seen_names.insert(param_name.clone());
        parameters.push(CFunctionParameter {
            name: param_name,
            type_name,
            is_const,
        });
    }

    let calling_convention = fn_type
        .get_calling_convention()
        .map(map_calling_convention)
        .unwrap_or(CallConv::C);

    cas.functions.push(CFunction {
        name: name.to_string(),
        return_type_name,
        calling_convention,
        parameters,
    });
    Ok(Some(()))
}

fn is_va_list(ty: &ClangType) -> bool {
    if ty.get_kind() != TypeKind::Typedef {
        return false;
    }
    ty.get_declaration()
        .and_then(|d| d.get_name())
        .is_some_and(|n| matches!(n.as_str(), "va_list" | "__builtin_va_list" | "__gnuc_va_list"))
}

fn map_calling_convention(_cc: CallingConvention) -> CallConv {
    // CAS only carries the C convention — spec.md §3.1 types
    // `calling_convention` as the single-valued `{C}` enum.
    CallConv::C
}

// ---------------------------------------------------------------------------
// Macro lowering — spec.md §4.2
// ---------------------------------------------------------------------------

fn lower_macro(entity: &Entity, name: &str, diagnostics: &mut Diagnostics) -> Option<CMacroObject> {
    if entity.is_function_like_macro() {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::MacroObjectNotTranspiled,
            name.to_string(),
            location_of(entity),
        ));
        return None;
    }
    let range = entity.get_range()?;
    let mut tokens: Vec<String> = range.tokenize().iter().map(|t| t.get_spelling()).collect();
    if tokens.first().is_some_and(|t| t == name) {
        tokens.remove(0);
    }
    if tokens.last().is_some_and(|t| t == "#") {
        tokens.pop();
    }

    let is_single_literal = match tokens.len() {
        1 => is_literal_token(&tokens[0]),
        2 if tokens[0] == "-" => is_literal_token(&tokens[1]),
        _ => false,
    };

    if !is_single_literal {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::MacroObjectNotTranspiled,
            name.to_string(),
            location_of(entity),
        ));
        return None;
    }

    Some(CMacroObject {
        name: name.to_string(),
        tokens,
    })
}

fn is_literal_token(token: &str) -> bool {
    if token.starts_with('"') || token.starts_with('\'') {
        return true;
    }
    let trimmed = token.trim_end_matches(['u', 'U', 'l', 'L', 'f', 'F']);
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).is_ok();
    }
    trimmed.parse::<f64>().is_ok()
}

// ---------------------------------------------------------------------------
// Type-name canonicalisation — spec.md §4.2
// ---------------------------------------------------------------------------

fn canonicalize_type(
    cas: &mut Cas,
    ty: &ClangType,
    diagnostics: &mut Diagnostics,
    context: &str,
) -> Result<String> {
    let name = canonical_name(cas, ty, diagnostics, context)?;
    Ok(name)
}

fn canonical_name(
    cas: &mut Cas,
    ty: &ClangType,
    diagnostics: &mut Diagnostics,
    context: &str,
) -> Result<String> {
    let original_name = ty.get_display_name();
    match ty.get_kind() {
        TypeKind::Void => Ok(ensure_builtin(cas, "void", CTypeKind::Void, 0, 0)),
        TypeKind::Bool => Ok(ensure_builtin(cas, "CBool", CTypeKind::Builtin, 1, 1)),
        TypeKind::CharS | TypeKind::SChar | TypeKind::CharU | TypeKind::UChar => {
            // char is lowered to u8 regardless of signedness — sign
            // semantics of the source character type are the caller's
            // concern (spec.md §4.2).
            Ok(ensure_builtin(cas, "u8", CTypeKind::Builtin, 1, 1))
        }
        TypeKind::Short => Ok(ensure_builtin(cas, "i16", CTypeKind::Builtin, 2, 2)),
        TypeKind::UShort => Ok(ensure_builtin(cas, "u16", CTypeKind::Builtin, 2, 2)),
        TypeKind::Int => Ok(ensure_builtin(cas, "i32", CTypeKind::Builtin, 4, 4)),
        TypeKind::UInt => Ok(ensure_builtin(cas, "u32", CTypeKind::Builtin, 4, 4)),
        TypeKind::Long | TypeKind::ULong => {
            let size = ty.get_sizeof().unwrap_or(8);
            let signed = ty.get_kind() == TypeKind::Long;
            let name = match (signed, size) {
                (true, 4) => "i32",
                (true, _) => "i64",
                (false, 4) => "u32",
                (false, _) => "u64",
            };
            Ok(ensure_builtin(cas, name, CTypeKind::Builtin, size, size))
        }
        TypeKind::LongLong => Ok(ensure_builtin(cas, "i64", CTypeKind::Builtin, 8, 8)),
        TypeKind::ULongLong => Ok(ensure_builtin(cas, "u64", CTypeKind::Builtin, 8, 8)),
        TypeKind::Float => Ok(ensure_builtin(cas, "f32", CTypeKind::Builtin, 4, 4)),
        TypeKind::Double => Ok(ensure_builtin(cas, "f64", CTypeKind::Builtin, 8, 8)),

        TypeKind::Pointer => {
            let pointee = ty.get_pointee_type().context("pointer has no pointee type")?;
            // `char*` canonicalises to the semantic name `CString`.
            if matches!(pointee.get_kind(), TypeKind::CharS | TypeKind::SChar | TypeKind::CharU | TypeKind::UChar) {
                return Ok(ensure_builtin(cas, "CString", CTypeKind::Pointer, 8, 8));
            }
            let inner = canonical_name(cas, &pointee, diagnostics, context)?;
            let name = format!("{inner}*");
            let (size, align) = (8, 8); // pointer width on all supported targets
            if cas.type_by_name(&name).is_none() {
                cas.insert_type(CType {
                    name: name.clone(),
                    original_name,
                    size_bytes: size,
                    align_bytes: align,
                    array_size: None,
                    element_size: None,
                    kind: CTypeKind::Pointer,
                    is_system: false,
                });
            }
            Ok(name)
        }

        TypeKind::ConstantArray => {
            let elem = ty.get_element_type().context("array has no element type")?;
            let len = ty.get_size().unwrap_or(0);
            let elem_name = canonical_name(cas, &elem, diagnostics, context)?;
            let elem_size = cas.type_by_name(&elem_name).map(|t| t.size_bytes).unwrap_or(0);
            let name = format!("{elem_name}[{len}]");
            if cas.type_by_name(&name).is_none() {
                cas.insert_type(CType {
                    name: name.clone(),
                    original_name,
                    size_bytes: elem_size * len,
                    align_bytes: cas.type_by_name(&elem_name).map(|t| t.align_bytes).unwrap_or(1),
                    array_size: Some(len),
                    element_size: Some(elem_size),
                    kind: CTypeKind::ConstArray,
                    is_system: false,
                });
            }
            Ok(name)
        }

        TypeKind::IncompleteArray => {
            let elem = ty.get_element_type().context("incomplete array has no element type")?;
            let inner = canonical_name(cas, &elem, diagnostics, context)?;
            let name = format!("{inner}*");
            if cas.type_by_name(&name).is_none() {
                cas.insert_type(CType {
                    name: name.clone(),
                    original_name,
                    size_bytes: 8,
                    align_bytes: 8,
                    array_size: None,
                    element_size: None,
                    kind: CTypeKind::Pointer,
                    is_system: false,
                });
            }
            Ok(name)
        }

        TypeKind::Elaborated => {
            let inner = ty
                .get_elaborated_type()
                .context("elaborated type has no inner type")?;
            canonical_name(cas, &inner, diagnostics, context)
        }

        TypeKind::Typedef => {
            if is_va_list(ty) {
                anyhow::bail!("va_list must be handled by the enclosing function, not inline");
            }
            let decl = ty.get_declaration();
            if let Some(decl) = decl
                && let Some(name) = decl.get_name()
                && !name.is_empty()
            {
                if cas.type_by_name(&name).is_none() {
                    // Referenced before its own typedef node was processed
                    // (e.g. a forward use within the same header) — resolve
                    // through to the canonical primitive as a placeholder;
                    // `extract_typedef` overwrites this entry when it runs.
                    let canonical = ty.get_canonical_type();
                    let resolved = canonical_name(cas, &canonical, diagnostics, context)?;
                    if let Some(resolved_ty) = cas.type_by_name(&resolved).cloned() {
                        cas.insert_type(CType {
                            name: name.clone(),
                            original_name: original_name.clone(),
                            kind: CTypeKind::Typedef,
                            ..resolved_ty
                        });
                    }
                }
                return Ok(name);
            }
            let canonical = ty.get_canonical_type();
            canonical_name(cas, &canonical, diagnostics, context)
        }

        TypeKind::Record => {
            let decl = ty.get_declaration();
            if let Some(decl) = decl
                && let Some(name) = decl.get_name()
                && !name.is_empty()
            {
                if ty.get_sizeof().is_err() && cas.type_by_name(&name).is_none() {
                    // Incomplete/opaque — register a zero-size placeholder;
                    // the explorer's opaque-type pass fills in the rest.
                    cas.insert_type(CType {
                        name: name.clone(),
                        original_name,
                        size_bytes: 0,
                        align_bytes: 0,
                        array_size: None,
                        element_size: None,
                        kind: CTypeKind::Record,
                        is_system: decl.is_in_system_header(),
                    });
                }
                return Ok(name);
            }
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnsupportedType,
                context.to_string(),
                Location::default(),
            ));
            anyhow::bail!("anonymous record type without name in {context}")
        }

        TypeKind::Enum => {
            let decl = ty.get_declaration();
            if let Some(decl) = decl
                && let Some(name) = decl.get_name()
                && !name.is_empty()
            {
                return Ok(name);
            }
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnsupportedType,
                context.to_string(),
                Location::default(),
            ));
            anyhow::bail!("anonymous enum type without name in {context}")
        }

        TypeKind::FunctionPrototype | TypeKind::FunctionNoPrototype => {
            let name = format!("FnPtr_{}", cas.function_pointers.len());
            register_synthetic_fnptr(cas, &name, ty, diagnostics)?;
            Ok(name)
        }

        other => {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnsupportedType,
                format!("{context} ({other:?})"),
                Location::default(),
            ));
            anyhow::bail!("unsupported clang TypeKind: {other:?}")
        }
    }
}

fn ensure_builtin(cas: &mut Cas, name: &str, kind: CTypeKind, size: usize, align: usize) -> String {
    if cas.type_by_name(name).is_none() {
        cas.insert_type(CType {
            name: name.to_string(),
            original_name: name.to_string(),
            size_bytes: size,
            align_bytes: align,
            array_size: None,
            element_size: None,
            kind,
            is_system: false,
        });
    }
    name.to_string()
}
