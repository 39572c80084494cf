//! Mapper-Target — `spec.md` §4.3.
//!
//! Transforms a [`Cas`] into a [`Tas`], applying every host-language
//! concern CAS deliberately stays neutral on: alias rewriting, array
//! wrapping, reserved-word sanitisation, ignored-name filtering, and enum
//! integer-width normalisation. Grounded in the teacher's `ctype_to_wintype`
//! (`emit.rs`), but restructured: the teacher resolves types lazily while
//! writing winmd rows; here the whole CAS is walked once up front and every
//! node is rewritten into its TAS counterpart before anything is emitted.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};

use crate::cas::*;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Location};
use crate::tas::*;

/// Reserved words in common target languages (Rust + C#), sanitised by
/// appending an underscore — `spec.md` §4.3 point 5.
const RESERVED_WORDS: &[&str] = &[
    "type", "fn", "impl", "trait", "match", "move", "ref", "box", "dyn", "as", "use", "mod",
    "struct", "enum", "static", "const", "let", "loop", "while", "for", "if", "else", "return",
    "self", "super", "crate", "pub", "in", "where", "class", "namespace", "public", "private",
    "internal", "virtual", "override", "object", "event", "delegate", "params", "out", "ref_",
    "base", "string", "bool",
];

fn sanitize(name: &str) -> String {
    if RESERVED_WORDS.contains(&name) {
        format!("{name}_")
    } else {
        name.to_string()
    }
}

struct Context<'a> {
    cas: &'a Cas,
    aliases: &'a HashMap<String, String>,
    ignored: &'a HashSet<String>,
    emit_system_types: bool,
    type_cache: HashMap<String, TType>,
}

/// Transforms `cas` into a `Tas` for one target. `target_triple` is `None`
/// for a single-target run, `Some(triple)` when this call is one branch of
/// a multi-target fan-out (`spec.md` §5) awaiting merge.
///
/// Returns `Err` if a CAS type reference doesn't resolve in `cas`'s type
/// table — per `spec.md` §7, "An Error in Mapper-Target aborts TAS
/// production". In practice `generate_from_config` already runs
/// `Cas::unresolved_type_refs_detailed` and aborts before this function is
/// called, so reaching this case here means that upstream invariant was
/// violated; this is the last line of defense, not the primary check.
pub fn map_to_target(
    cas: &Cas,
    aliases: &[(String, String)],
    ignored_names: &[String],
    emit_system_types: bool,
    class_name: &str,
    library_name: &str,
    target_triple: Option<String>,
    diagnostics: &mut Diagnostics,
) -> Result<Tas> {
    let alias_map: HashMap<String, String> = aliases
        .iter()
        .cloned()
        .map(|(from, to)| (from, to))
        .collect();
    let ignored: HashSet<String> = ignored_names.iter().cloned().collect();

    // An alias that targets a builtin name is suppressed rather than applied
    // — `spec.md` §4.3 point 1's built-in-shadow rule — so e.g. aliasing a
    // project type to `i32` can't silently make every `i32` reference that
    // name instead.
    let effective_aliases: HashMap<String, String> = alias_map
        .iter()
        .filter_map(|(from, to)| {
            if is_builtin_name(to) {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::AliasShadowsBuiltin,
                    from.clone(),
                    Location::default(),
                ));
                None
            } else {
                Some((from.clone(), to.clone()))
            }
        })
        .collect();

    let mut ctx = Context {
        cas,
        aliases: &effective_aliases,
        ignored: &ignored,
        emit_system_types,
        type_cache: HashMap::new(),
    };

    let mut tas = Tas {
        class_name: class_name.to_string(),
        library_name: library_name.to_string(),
        target_triple,
        ..Tas::default()
    };

    for f in &cas.functions {
        if ctx.ignored.contains(&f.name) {
            continue;
        }
        tas.functions.push(map_function(&mut ctx, f, diagnostics)?);
    }
    // Distinct synthetic field-pointer shapes can collapse onto the same
    // canonical builtin name (`spec.md` §4.3 point 6); keep one TAS entry
    // per final name rather than emitting the same function pointer twice.
    let mut seen_fnptr_names: HashSet<String> = HashSet::new();
    for fp in &cas.function_pointers {
        if ctx.ignored.contains(&fp.name) {
            continue;
        }
        let mapped = map_function_pointer(&mut ctx, fp, diagnostics)?;
        if seen_fnptr_names.insert(mapped.name.clone()) {
            tas.function_pointers.push(mapped);
        }
    }
    for r in &cas.records {
        if ctx.ignored.contains(&r.name) {
            continue;
        }
        tas.records.push(map_record(&mut ctx, r, diagnostics)?);
    }
    for o in &cas.opaque_types {
        if ctx.ignored.contains(&o.name) {
            continue;
        }
        tas.opaque_types.push(TOpaqueType {
            name: resolve_name(&ctx, &o.name),
        });
    }
    for td in &cas.typedefs {
        if ctx.ignored.contains(&td.name) {
            continue;
        }
        if !emit_system_types
            && cas
                .type_by_name(&td.name)
                .map(|t| t.is_system)
                .unwrap_or(false)
        {
            continue;
        }
        tas.typedefs.push(TTypedef {
            name: resolve_name(&ctx, &td.name),
            underlying_type_name: resolve_type(&mut ctx, &td.underlying_type_name, diagnostics)?.name,
        });
    }
    for e in &cas.enums {
        if ctx.ignored.contains(&e.name) {
            continue;
        }
        tas.enums.push(map_enum(&mut ctx, e));
    }
    for v in &cas.variables {
        if ctx.ignored.contains(&v.name) {
            continue;
        }
        tas.variables.push(TVariable {
            name: resolve_name(&ctx, &v.name),
            type_name: resolve_type(&mut ctx, &v.type_name, diagnostics)?.name,
        });
    }
    for m in &cas.macros {
        if ctx.ignored.contains(&m.name) {
            continue;
        }
        tas.macros.push(TMacroObject {
            name: resolve_name(&ctx, &m.name),
            tokens: m.tokens.clone(),
        });
    }

    for (kind, name) in &cas.roots {
        if ctx.ignored.contains(name) {
            continue;
        }
        tas.roots.push((map_node_kind(*kind), resolve_name(&ctx, name)));
    }

    tas.types = ctx.type_cache.into_values().collect();
    tas.types.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tas)
}

fn map_node_kind(kind: CNodeKind) -> TNodeKind {
    match kind {
        CNodeKind::Function => TNodeKind::Function,
        CNodeKind::FunctionPointer => TNodeKind::FunctionPointer,
        CNodeKind::Record => TNodeKind::Record,
        CNodeKind::OpaqueType => TNodeKind::OpaqueType,
        CNodeKind::Typedef => TNodeKind::Typedef,
        CNodeKind::Enum => TNodeKind::Enum,
        CNodeKind::Variable => TNodeKind::Variable,
        CNodeKind::MacroObject => TNodeKind::MacroObject,
    }
}

fn is_builtin_name(name: &str) -> bool {
    matches!(
        name,
        "void" | "CBool" | "u8" | "i16" | "u16" | "i32" | "u32" | "i64" | "u64" | "f32" | "f64"
            | "CString"
    )
}

/// Resolves a bare identifier (function/variable/macro/record/enum name,
/// not a type reference) through the alias table and reserved-word
/// sanitisation, in that order — an alias target still gets sanitised.
fn resolve_name(ctx: &Context, name: &str) -> String {
    let aliased = ctx.aliases.get(name).cloned().unwrap_or_else(|| name.to_string());
    sanitize(&aliased)
}

fn map_function(ctx: &mut Context, f: &CFunction, diagnostics: &mut Diagnostics) -> Result<TFunction> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut parameters = Vec::with_capacity(f.parameters.len());
    for p in &f.parameters {
        let base = sanitize(&p.name);
        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        let name = if *count == 1 {
            base
        } else {
            format!("{base}{count}")
        };
        parameters.push(TFunctionParameter {
            name,
            type_name: resolve_type(ctx, &p.type_name, diagnostics)?.name,
            is_const: p.is_const,
        });
    }
    Ok(TFunction {
        name: resolve_name(ctx, &f.name),
        return_type_name: resolve_type(ctx, &f.return_type_name, diagnostics)?.name,
        calling_convention: f.calling_convention,
        parameters,
    })
}

/// Common C function-pointer shapes mapped to a canonical target name —
/// `spec.md` §4.3 point 6. Matched against the CAS's own canonicalised
/// type names (`void`, `void*`, `i32`, …), before alias/sanitisation.
const FNPTR_BUILTIN_SHAPES: &[(&str, &[&str], &str)] = &[
    ("void", &[], "FnPtrVoid"),
    ("void*", &["void*"], "FnPtrPointerPointer"),
    ("void", &["void*"], "FnPtrVoidPointer"),
    ("i32", &["void*", "void*"], "FnPtrCompare"),
];

/// Looks up a synthetic function pointer's canonical built-in name by
/// shape. Named (non-synthetic) typedefs keep their own name — the table
/// only collapses anonymous, struct-field-synthesized shapes.
fn fnptr_builtin_name(fp: &CFunctionPointer) -> Option<&'static str> {
    if !fp.is_synthetic {
        return None;
    }
    FNPTR_BUILTIN_SHAPES.iter().find_map(|(ret, params, canon)| {
        let params_match = fp.parameters.len() == params.len()
            && fp
                .parameters
                .iter()
                .zip(*params)
                .all(|(p, expect)| p.type_name == *expect);
        (fp.return_type_name == *ret && params_match).then_some(*canon)
    })
}

fn map_function_pointer(
    ctx: &mut Context,
    fp: &CFunctionPointer,
    diagnostics: &mut Diagnostics,
) -> Result<TFunctionPointer> {
    let name = match fnptr_builtin_name(fp) {
        Some(canonical) => canonical.to_string(),
        None => resolve_name(ctx, &fp.name),
    };
    let mut parameters = Vec::with_capacity(fp.parameters.len());
    for p in &fp.parameters {
        parameters.push(TFunctionPointerParameter {
            type_name: resolve_type(ctx, &p.type_name, diagnostics)?.name,
        });
    }
    Ok(TFunctionPointer {
        name,
        is_synthetic: fp.is_synthetic,
        return_type_name: resolve_type(ctx, &fp.return_type_name, diagnostics)?.name,
        parameters,
    })
}

fn map_record(ctx: &mut Context, r: &CRecord, diagnostics: &mut Diagnostics) -> Result<TRecord> {
    let size_bytes = ctx.cas.type_by_name(&r.type_ref).map(|t| t.size_bytes).unwrap_or(0);
    let align_bytes = ctx.cas.type_by_name(&r.type_ref).map(|t| t.align_bytes).unwrap_or(1);

    let mut fields = Vec::with_capacity(r.fields.len());
    for f in &r.fields {
        let resolved = resolve_type(ctx, &f.type_name, diagnostics)?;
        // A field is wrapped when its C element type has no
        // target-primitive representation the array can be expressed
        // natively over (`spec.md` §4.3 point 3) — i.e. an array of a
        // struct/union/typedef rather than a scalar.
        let is_wrapped_array = resolved.array_len.is_some()
            && !matches!(resolved.elem_kind, TTypeKind::Builtin | TTypeKind::Void);
        fields.push(TStructField {
            name: sanitize(&f.name),
            type_name: resolved.name,
            offset_bits: f.offset_bits,
            padding_bits: f.padding_bits,
            is_wrapped_array,
            array_len: resolved.array_len,
        });
    }

    let mut nested_records = Vec::with_capacity(r.nested_records.len());
    for nested in &r.nested_records {
        nested_records.push(map_record(ctx, nested, diagnostics)?);
    }
    let mut nested_function_pointers = Vec::with_capacity(r.nested_function_pointers.len());
    for fp in &r.nested_function_pointers {
        nested_function_pointers.push(map_function_pointer(ctx, fp, diagnostics)?);
    }

    Ok(TRecord {
        name: resolve_name(ctx, &r.name),
        is_union: r.is_union,
        fields,
        nested_records,
        nested_function_pointers,
        size_bytes,
        align_bytes,
    })
}

fn map_enum(ctx: &mut Context, e: &CEnum) -> TEnum {
    let underlying = ctx.cas.type_by_name(&e.integer_type_name);
    let integer_type = match underlying.map(|t| t.size_bytes) {
        Some(4) | None => EnumIntegerType::I32,
        Some(_) => EnumIntegerType::U32,
    };
    let is_signed = matches!(e.integer_type_name.as_str(), "i8" | "i16" | "i32" | "i64");
    let integer_type = if is_signed {
        EnumIntegerType::I32
    } else {
        integer_type
    };
    TEnum {
        name: resolve_name(ctx, &e.name),
        integer_type,
        values: e
            .values
            .iter()
            .map(|v| TEnumValue {
                name: sanitize(&v.name),
                value: v.value,
            })
            .collect(),
    }
}

/// Result of resolving one CAS type reference: its final target name, plus
/// the bits `map_record` needs to decide array wrapping without re-walking
/// the type table.
struct ResolvedType {
    name: String,
    array_len: Option<usize>,
    elem_kind: TTypeKind,
}

fn resolve_type(
    ctx: &mut Context,
    type_name: &str,
    diagnostics: &mut Diagnostics,
) -> Result<ResolvedType> {
    let tt = resolve_ctype(ctx, type_name, diagnostics)?;
    let array_len = ctx.cas.type_by_name(type_name).and_then(|t| t.array_size);
    // The array `CType` itself is always `ConstArray` — that tells us
    // nothing about whether the *element* is a target primitive. Recover
    // the element name from the canonical `"{elem}[{len}]"` spelling
    // (`spec.md` §4.2) and look up its own kind instead.
    let elem_kind = match array_len {
        Some(_) => type_name
            .rsplit_once('[')
            .and_then(|(elem_name, _)| ctx.cas.type_by_name(elem_name))
            .map(|t| map_type_kind(t.kind))
            .unwrap_or(TTypeKind::Void),
        None => tt.kind,
    };
    Ok(ResolvedType {
        name: tt.name,
        array_len,
        elem_kind,
    })
}

fn map_type_kind(kind: CTypeKind) -> TTypeKind {
    match kind {
        CTypeKind::Builtin => TTypeKind::Builtin,
        CTypeKind::Void => TTypeKind::Void,
        CTypeKind::Pointer => TTypeKind::Pointer,
        CTypeKind::Record => TTypeKind::Record,
        CTypeKind::Enum => TTypeKind::Enum,
        CTypeKind::Typedef => TTypeKind::Typedef,
        CTypeKind::FunctionPointer => TTypeKind::FunctionPointer,
        CTypeKind::ConstArray => TTypeKind::ConstArray,
    }
}

/// Resolves one `CType` into its `TType`, recursively resolving pointee/
/// element types and memoising by final (post-alias) name. Mirrors the
/// teacher's `ctype_to_wintype`, generalised from "match and emit inline"
/// into "match and cache a TAS node".
fn resolve_ctype(ctx: &mut Context, name: &str, diagnostics: &mut Diagnostics) -> Result<TType> {
    // A synthetic function-pointer field type resolves to its canonical
    // built-in name (`spec.md` §4.3 point 6) rather than its per-field
    // synthesized name, so a field's `type_name` agrees with the entry the
    // field pointer itself ends up with in `tas.function_pointers`.
    let resolved_name = match ctx.cas.function_pointers.iter().find(|fp| fp.name == name) {
        Some(fp) => match fnptr_builtin_name(fp) {
            Some(canonical) => canonical.to_string(),
            None => resolve_name(ctx, name),
        },
        None => resolve_name(ctx, name),
    };
    if let Some(cached) = ctx.type_cache.get(&resolved_name) {
        return Ok(cached.clone());
    }

    let Some(cty) = ctx.cas.type_by_name(name).cloned() else {
        // The CAS closed-table invariant (`spec.md` §4.1) says every
        // `type_name` already resolves in `cas.types`; reaching here means
        // that invariant was violated upstream of `generate_from_config`'s
        // `Cas::unresolved_type_refs` check. Per `spec.md` §7, an error at
        // this stage aborts TAS production rather than substituting a
        // placeholder type.
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnsupportedType,
            name.to_string(),
            Location::default(),
        ));
        bail!("unresolved type reference `{name}` while building target surface");
    };

    // System typedefs are resolved straight through to their underlying
    // shape when the config excludes them from emission, rather than
    // appearing as a dangling reference (`spec.md` §4.3 point 4).
    if cty.kind == CTypeKind::Typedef && cty.is_system && !ctx.emit_system_types {
        if let Some(underlying_name) = ctx
            .cas
            .typedefs
            .iter()
            .find(|td| td.name == name)
            .map(|td| td.underlying_type_name.clone())
        {
            return resolve_ctype(ctx, &underlying_name, diagnostics);
        }
    }

    let ttype = TType {
        name: resolved_name.clone(),
        size_bytes: cty.size_bytes,
        align_bytes: cty.align_bytes,
        kind: map_type_kind(cty.kind),
    };
    ctx.type_cache.insert(resolved_name, ttype.clone());
    Ok(ttype)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(name: &str, size: usize, kind: CTypeKind) -> CType {
        CType {
            name: name.to_string(),
            original_name: name.to_string(),
            size_bytes: size,
            align_bytes: size.max(1),
            array_size: None,
            element_size: None,
            kind,
            is_system: false,
        }
    }

    #[test]
    fn reserved_word_parameter_gets_underscore_suffix() {
        assert_eq!(sanitize("type"), "type_");
        assert_eq!(sanitize("widget_id"), "widget_id");
    }

    #[test]
    fn duplicate_parameter_names_get_incrementing_suffixes() {
        let mut cas = Cas::default();
        cas.insert_type(builtin("i32", 4, CTypeKind::Builtin));
        let f = CFunction {
            name: "f".to_string(),
            return_type_name: "i32".to_string(),
            calling_convention: CallConv::C,
            parameters: vec![
                CFunctionParameter { name: "x".into(), type_name: "i32".into(), is_const: false },
                CFunctionParameter { name: "x".into(), type_name: "i32".into(), is_const: false },
                CFunctionParameter { name: "x".into(), type_name: "i32".into(), is_const: false },
            ],
        };
        let mut diagnostics = Diagnostics::new();
        let mut ctx = Context {
            cas: &cas,
            aliases: &HashMap::new(),
            ignored: &HashSet::new(),
            emit_system_types: false,
            type_cache: HashMap::new(),
        };
        let mapped = map_function(&mut ctx, &f, &mut diagnostics).expect("map_function");
        let names: Vec<&str> = mapped.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["x", "x2", "x3"]);
    }

    #[test]
    fn alias_targeting_a_builtin_is_suppressed_with_diagnostic() {
        let mut cas = Cas::default();
        cas.insert_type(builtin("i32", 4, CTypeKind::Builtin));
        let mut diagnostics = Diagnostics::new();
        let tas = map_to_target(
            &cas,
            &[("Handle".to_string(), "i32".to_string())],
            &[],
            false,
            "Lib",
            "lib",
            None,
            &mut diagnostics,
        )
        .expect("map_to_target");
        assert!(tas.typedefs.is_empty());
        assert!(diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::AliasShadowsBuiltin && d.name == "Handle"));
    }

    #[test]
    fn array_of_primitive_is_not_wrapped_but_array_of_record_is() {
        let mut cas = Cas::default();
        cas.insert_type(builtin("u8", 1, CTypeKind::Builtin));
        cas.insert_type(CType {
            name: "u8[4]".to_string(),
            original_name: "unsigned char[4]".to_string(),
            size_bytes: 4,
            align_bytes: 1,
            array_size: Some(4),
            element_size: Some(1),
            kind: CTypeKind::ConstArray,
            is_system: false,
        });
        cas.insert_type(builtin("Color", 4, CTypeKind::Record));
        cas.insert_type(CType {
            name: "Color[16]".to_string(),
            original_name: "Color[16]".to_string(),
            size_bytes: 64,
            align_bytes: 4,
            array_size: Some(16),
            element_size: Some(4),
            kind: CTypeKind::ConstArray,
            is_system: false,
        });
        cas.records.push(CRecord {
            name: "Image".to_string(),
            is_union: false,
            fields: vec![
                CRecordField { name: "tags".into(), type_name: "u8[4]".into(), offset_bits: 0, padding_bits: 0 },
                CRecordField { name: "pixels".into(), type_name: "Color[16]".into(), offset_bits: 32, padding_bits: 0 },
            ],
            nested_records: vec![],
            nested_function_pointers: vec![],
            type_ref: "Image".to_string(),
        });
        cas.insert_type(builtin("Image", 96, CTypeKind::Record));

        let mut diagnostics = Diagnostics::new();
        let tas = map_to_target(&cas, &[], &[], false, "Lib", "lib", None, &mut diagnostics)
            .expect("map_to_target");
        let image = tas.records.iter().find(|r| r.name == "Image").unwrap();
        let tags = image.fields.iter().find(|f| f.name == "tags").unwrap();
        let pixels = image.fields.iter().find(|f| f.name == "pixels").unwrap();
        assert!(!tags.is_wrapped_array);
        assert!(pixels.is_wrapped_array);
        assert_eq!(pixels.array_len, Some(16));
    }

    #[test]
    fn ignored_name_is_dropped_at_every_level() {
        let mut cas = Cas::default();
        cas.insert_type(builtin("i32", 4, CTypeKind::Builtin));
        cas.functions.push(CFunction {
            name: "internal_helper".to_string(),
            return_type_name: "i32".to_string(),
            calling_convention: CallConv::C,
            parameters: vec![],
        });
        cas.push_root(CNodeKind::Function, "internal_helper");
        let mut diagnostics = Diagnostics::new();
        let tas = map_to_target(
            &cas,
            &[],
            &["internal_helper".to_string()],
            false,
            "Lib",
            "lib",
            None,
            &mut diagnostics,
        )
        .expect("map_to_target");
        assert!(tas.functions.is_empty());
        assert!(tas.roots.is_empty());
    }
}
