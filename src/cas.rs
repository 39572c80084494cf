//! C Abstract Surface — the platform-neutral intermediate produced by
//! [`crate::explorer`] + [`crate::mapper_c`].
//!
//! A [`Cas`] is a closed tree: every `type_name` referenced by any node
//! resolves in its `types` table. Node kinds mirror clang's declaration
//! kinds one level removed from any clang type — nothing here borrows
//! from `clang::Entity`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Calling convention. CAS only ever carries the C convention — this spec's
/// scope excludes stdcall/fastcall semantics (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallConv {
    C,
}

/// A C function declaration reachable from the configured root set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CFunction {
    pub name: String,
    pub return_type_name: String,
    pub calling_convention: CallConv,
    pub parameters: Vec<CFunctionParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CFunctionParameter {
    pub name: String,
    pub type_name: String,
    pub is_const: bool,
}

/// A function-pointer type — either a named typedef or synthesized from a
/// struct field with no typedef name (`FnPtr_<field-name>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CFunctionPointer {
    pub name: String,
    pub is_synthetic: bool,
    pub return_type_name: String,
    pub parameters: Vec<CFunctionPointerParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CFunctionPointerParameter {
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRecord {
    pub name: String,
    pub is_union: bool,
    pub fields: Vec<CRecordField>,
    pub nested_records: Vec<CRecord>,
    pub nested_function_pointers: Vec<CFunctionPointer>,
    /// Name of this record's entry in the `CType` table.
    pub type_ref: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRecordField {
    pub name: String,
    pub type_name: String,
    pub offset_bits: usize,
    pub padding_bits: usize,
}

/// A forward-declared record with no visible definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct COpaqueType {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CTypedef {
    pub name: String,
    pub underlying_type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CEnum {
    pub name: String,
    pub integer_type_name: String,
    pub values: Vec<CEnumValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CEnumValue {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVariable {
    pub name: String,
    pub type_name: String,
}

/// An object-like macro whose token stream is a single literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CMacroObject {
    pub name: String,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CTypeKind {
    Builtin,
    Void,
    Pointer,
    Record,
    Enum,
    Typedef,
    FunctionPointer,
    ConstArray,
}

/// A resolved type: the thing every `type_name` string points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CType {
    pub name: String,
    pub original_name: String,
    pub size_bytes: usize,
    pub align_bytes: usize,
    pub array_size: Option<usize>,
    pub element_size: Option<usize>,
    pub kind: CTypeKind,
    pub is_system: bool,
}

/// One discovered declaration, keyed by kind so name collisions across
/// kinds (a `struct Foo` and a macro `Foo`) can't merge into the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum CNodeKind {
    Function,
    FunctionPointer,
    Record,
    OpaqueType,
    Typedef,
    Enum,
    Variable,
    MacroObject,
}

/// The C Abstract Surface: a closed, self-contained mapping from
/// `(kind, qualified-name)` to declaration, plus the type table every
/// `type_name` field resolves through, plus the root declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cas {
    pub functions: Vec<CFunction>,
    pub function_pointers: Vec<CFunctionPointer>,
    pub records: Vec<CRecord>,
    pub opaque_types: Vec<COpaqueType>,
    pub typedefs: Vec<CTypedef>,
    pub enums: Vec<CEnum>,
    pub variables: Vec<CVariable>,
    pub macros: Vec<CMacroObject>,
    /// All resolved `CType`s, keyed by name. Preserves discovery order in
    /// the `Vec`; the map is purely an index so lookups don't require a
    /// linear scan (order never affects lookup results, only iteration).
    pub types: Vec<CType>,
    #[serde(skip)]
    type_index: HashMap<String, usize>,
    /// `(kind, name)` root declarations in discovery order — the order
    /// downstream emission must preserve so two runs over the same input
    /// produce byte-identical output.
    pub roots: Vec<(CNodeKind, String)>,
}

impl Cas {
    pub fn insert_type(&mut self, ty: CType) {
        if let Some(&idx) = self.type_index.get(&ty.name) {
            self.types[idx] = ty;
            return;
        }
        self.type_index.insert(ty.name.clone(), self.types.len());
        self.types.push(ty);
    }

    pub fn type_by_name(&self, name: &str) -> Option<&CType> {
        self.type_index.get(name).map(|&i| &self.types[i])
    }

    pub fn push_root(&mut self, kind: CNodeKind, name: impl Into<String>) {
        self.roots.push((kind, name.into()));
    }

    /// Rebuilds the `type_index` after deserializing from JSON (the index
    /// itself isn't serialized — see the round-trip invariant in
    /// `spec.md` §8).
    pub fn reindex(&mut self) {
        self.type_index.clear();
        for (i, ty) in self.types.iter().enumerate() {
            self.type_index.insert(ty.name.clone(), i);
        }
    }

    /// Every `type_name` referenced anywhere in the surface resolves in
    /// `types`. Returns the missing type names, deduplicated and sorted.
    /// `generate_from_config` calls this after assembling each triple's
    /// `Cas` and aborts if it's non-empty — see [`Cas::unresolved_type_refs_detailed`]
    /// for the referring-declaration-aware variant used to build that error.
    pub fn unresolved_type_refs(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .unresolved_type_refs_detailed()
            .into_iter()
            .map(|(_, ty)| ty)
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Same check as [`Cas::unresolved_type_refs`], but paired with the name
    /// of the declaration that referenced each missing type, in discovery
    /// order with duplicates kept — so a caller can report e.g. "function
    /// `sample_open` references unresolved type `SampleUnknown`" instead of
    /// just naming the dangling type.
    pub fn unresolved_type_refs_detailed(&self) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        for f in &self.functions {
            self.check_ref(&f.name, &f.return_type_name, &mut missing);
            for p in &f.parameters {
                self.check_ref(&f.name, &p.type_name, &mut missing);
            }
        }
        for fp in &self.function_pointers {
            self.check_ref(&fp.name, &fp.return_type_name, &mut missing);
            for p in &fp.parameters {
                self.check_ref(&fp.name, &p.type_name, &mut missing);
            }
        }
        for r in &self.records {
            self.check_record(r, &mut missing);
        }
        for td in &self.typedefs {
            self.check_ref(&td.name, &td.underlying_type_name, &mut missing);
        }
        for v in &self.variables {
            self.check_ref(&v.name, &v.type_name, &mut missing);
        }
        missing
    }

    fn check_ref(&self, referrer: &str, name: &str, missing: &mut Vec<(String, String)>) {
        if self.type_by_name(name).is_none() {
            missing.push((referrer.to_string(), name.to_string()));
        }
    }

    fn check_record(&self, record: &CRecord, missing: &mut Vec<(String, String)>) {
        for field in &record.fields {
            self.check_ref(&record.name, &field.type_name, missing);
        }
        for nested in &record.nested_records {
            self.check_record(nested, missing);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cas() -> Cas {
        let mut cas = Cas::default();
        cas.insert_type(CType {
            name: "i32".to_string(),
            original_name: "int".to_string(),
            size_bytes: 4,
            align_bytes: 4,
            array_size: None,
            element_size: None,
            kind: CTypeKind::Builtin,
            is_system: false,
        });
        cas.functions.push(CFunction {
            name: "sample_open".to_string(),
            return_type_name: "i32".to_string(),
            calling_convention: CallConv::C,
            parameters: vec![CFunctionParameter {
                name: "handle".to_string(),
                type_name: "i32".to_string(),
                is_const: false,
            }],
        });
        cas.push_root(CNodeKind::Function, "sample_open");
        cas
    }

    #[test]
    fn unresolved_type_refs_is_empty_for_a_closed_surface() {
        let cas = sample_cas();
        assert!(cas.unresolved_type_refs().is_empty());
    }

    #[test]
    fn unresolved_type_refs_detailed_names_the_referring_declaration() {
        let mut cas = sample_cas();
        cas.functions[0].return_type_name = "MissingType".to_string();
        let detailed = cas.unresolved_type_refs_detailed();
        assert_eq!(detailed, vec![("sample_open".to_string(), "MissingType".to_string())]);
    }

    /// Serialising a `Cas` to JSON and back reproduces the same tree
    /// (`spec.md` §8) — except `type_index`, which is `#[serde(skip)]` and
    /// must be rebuilt via `reindex()` immediately after deserializing, or
    /// `type_by_name` silently returns `None` for every name.
    #[test]
    fn json_round_trip_requires_reindex_to_restore_type_lookups() {
        let cas = sample_cas();
        let bytes = serde_json::to_vec(&cas).expect("serialize Cas");
        let mut restored: Cas = serde_json::from_slice(&bytes).expect("deserialize Cas");

        assert!(restored.type_by_name("i32").is_none(), "index isn't serialized");
        restored.reindex();
        assert!(restored.type_by_name("i32").is_some());

        assert_eq!(restored.functions, cas.functions);
        assert_eq!(restored.types, cas.types);
        assert_eq!(restored.roots, cas.roots);
    }
}
