//! Explorer — `spec.md` §4.1.
//!
//! Walks cursors of a parsed translation unit starting from the functions
//! declared in the user's header set, and closes transitively over every
//! type those functions (and the records/typedefs reachable from them)
//! reference — even when the referencing declaration lives outside the
//! partition's `traverse` files (a system header, or a header pulled in
//! only for a struct the user's API happens to return by value).
//!
//! Grounded in the teacher's `collect_structs`/`collect_enums`/
//! `collect_functions`/`collect_typedefs` (`extract.rs`), generalized from
//! "scan everything at the top level of one header" into a worklist BFS so
//! transitively-required types are promoted into scope per the discovery
//! algorithm in `spec.md` §4.1.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use clang::{Entity, EntityKind, Type as ClangType, TypeKind, sonar};
use tracing::{debug, trace, warn};

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Location};

/// Everything the Explorer discovered, still as clang cursors — Mapper-C
/// resolves these into CAS nodes.
pub struct ExplorerOutput<'tu> {
    pub functions: Vec<Entity<'tu>>,
    pub records: Vec<Entity<'tu>>,
    pub opaque_types: Vec<Entity<'tu>>,
    pub enums: Vec<Entity<'tu>>,
    pub typedefs: Vec<Entity<'tu>>,
    pub variables: Vec<Entity<'tu>>,
    pub macros: Vec<Entity<'tu>>,
    /// Names of records/enums/typedefs that were only reached transitively
    /// (outside the partition's `traverse` files) — tagged `is_system` by
    /// Mapper-C when building their `CType`.
    pub system_names: HashSet<String>,
}

pub fn explore<'tu>(
    entities: &[Entity<'tu>],
    traverse_files: &[PathBuf],
    diagnostics: &mut Diagnostics,
) -> ExplorerOutput<'tu> {
    let in_scope = |e: &Entity| should_emit(e, traverse_files);

    let mut functions = Vec::new();
    let mut seen_functions = HashSet::new();
    for decl in sonar::find_functions(entities.to_vec()) {
        if !in_scope(&decl.entity) {
            continue;
        }
        if decl.entity.is_variadic() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::VariadicFunctionDropped,
                decl.name.clone(),
                location_of(&decl.entity),
            ));
            continue;
        }
        if !seen_functions.insert(decl.name.clone()) {
            trace!(name = %decl.name, "duplicate function declaration, skipping");
            continue;
        }
        functions.push(decl.entity);
    }

    let mut records = Vec::new();
    let mut opaque_types = Vec::new();
    let mut enums = Vec::new();
    let mut typedefs = Vec::new();
    let mut seen_names: HashSet<String> = HashSet::new();
    let mut system_names: HashSet<String> = HashSet::new();

    // Worklist of type cursors reachable from the root function set, grown
    // as records/typedefs pull in further referenced types.
    let mut worklist: VecDeque<Entity<'tu>> = VecDeque::new();
    for f in &functions {
        if let Some(ty) = f.get_type() {
            if let Some(ret) = ty.get_result_type() {
                enqueue_type(&ret, &mut worklist);
            }
            for arg in ty.get_argument_types().unwrap_or_default() {
                enqueue_type(&arg, &mut worklist);
            }
        }
    }

    // Also seed the worklist with every record/enum/typedef lexically
    // present in the traverse set, even if no in-scope function reaches it
    // yet — matching the teacher's "scan everything at top level" behavior
    // for the partition's own headers.
    for entity in entities {
        if in_scope(entity)
            && matches!(
                entity.get_kind(),
                EntityKind::StructDecl
                    | EntityKind::UnionDecl
                    | EntityKind::EnumDecl
                    | EntityKind::TypedefDecl
                    | EntityKind::VarDecl
            )
        {
            if let Some(ty) = entity.get_type() {
                enqueue_type(&ty, &mut worklist);
            }
        }
    }

    while let Some(entity) = worklist.pop_front() {
        let name = match entity.get_name() {
            Some(n) if !n.is_empty() => n,
            _ => continue,
        };
        if !seen_names.insert(name.clone()) {
            continue;
        }
        if !in_scope(&entity) {
            system_names.insert(name.clone());
        }

        match entity.get_kind() {
            EntityKind::StructDecl | EntityKind::UnionDecl => {
                if entity.is_definition() {
                    // Enqueue field types before recording, so nested
                    // references are discovered in declaration order.
                    for field in entity.get_children() {
                        if field.get_kind() == EntityKind::FieldDecl
                            && let Some(fty) = field.get_type()
                        {
                            enqueue_type(&fty, &mut worklist);
                        }
                    }
                    debug!(name = %name, "explorer: record in scope");
                    records.push(entity);
                } else {
                    debug!(name = %name, "explorer: opaque type (no definition)");
                    opaque_types.push(entity);
                }
            }
            EntityKind::EnumDecl => {
                debug!(name = %name, "explorer: enum in scope");
                enums.push(entity);
            }
            EntityKind::TypedefDecl => {
                if let Some(underlying) = entity.get_typedef_underlying_type() {
                    enqueue_type(&underlying, &mut worklist);
                }
                debug!(name = %name, "explorer: typedef in scope");
                typedefs.push(entity);
            }
            other => {
                warn!(kind = ?other, name = %name, "explorer: unsupported cursor kind, skipping");
            }
        }
    }

    let mut variables = Vec::new();
    for entity in entities {
        if entity.get_kind() == EntityKind::VarDecl && in_scope(entity) {
            variables.push(*entity);
        }
    }

    let mut macros = Vec::new();
    for def in sonar::find_definitions(entities.to_vec()) {
        if in_scope(&def.entity) {
            macros.push(def.entity);
        }
    }
    for entity in entities {
        if entity.get_kind() == EntityKind::MacroDefinition && in_scope(entity) {
            // sonar only recognizes decimal/float literal bodies; keep raw
            // macro cursors too so Mapper-C can retry token-level lowering
            // (`spec.md` §4.2's macro lowering rule) for hex/octal bodies.
            macros.push(*entity);
        }
    }

    ExplorerOutput {
        functions,
        records,
        opaque_types,
        enums,
        typedefs,
        variables,
        macros,
        system_names,
    }
}

fn enqueue_type<'tu>(ty: &ClangType<'tu>, worklist: &mut VecDeque<Entity<'tu>>) {
    match ty.get_kind() {
        TypeKind::Pointer => {
            if let Some(pointee) = ty.get_pointee_type() {
                enqueue_type(&pointee, worklist);
            }
        }
        TypeKind::ConstantArray | TypeKind::IncompleteArray => {
            if let Some(elem) = ty.get_element_type() {
                enqueue_type(&elem, worklist);
            }
        }
        TypeKind::Elaborated => {
            if let Some(inner) = ty.get_elaborated_type() {
                enqueue_type(&inner, worklist);
            }
        }
        TypeKind::Typedef | TypeKind::Record | TypeKind::Enum => {
            if let Some(decl) = ty.get_declaration() {
                worklist.push_back(decl);
            }
        }
        TypeKind::FunctionPrototype => {
            if let Some(ret) = ty.get_result_type() {
                enqueue_type(&ret, worklist);
            }
            for arg in ty.get_argument_types().unwrap_or_default() {
                enqueue_type(&arg, worklist);
            }
        }
        _ => {}
    }
}

fn should_emit(entity: &Entity, traverse_files: &[PathBuf]) -> bool {
    let location = match entity.get_location() {
        Some(loc) => loc,
        None => return false,
    };
    let file_location = location.get_file_location();
    let file = match file_location.file {
        Some(f) => f,
        None => return false,
    };
    let file_path = file.get_path();
    traverse_files
        .iter()
        .any(|tf| file_path == *tf || file_path.ends_with(tf))
}

fn location_of(entity: &Entity) -> Location {
    let Some(loc) = entity.get_location() else {
        return Location::default();
    };
    let file_location = loc.get_file_location();
    let file = file_location
        .file
        .map(|f| f.get_path())
        .unwrap_or_else(|| Path::new("<unknown>").to_path_buf());
    Location {
        file: file.display().to_string(),
        line: file_location.line,
        column: file_location.column,
    }
}
