//! Target Abstract Surface — produced by [`crate::mapper_target`], consumed
//! by an [`crate::emit::Emitter`].
//!
//! Mirrors [`crate::cas::Cas`] node-for-node; the differences are additive
//! (`TStructField::is_wrapped_array`, `TType`'s final target spelling).
//! Every type here derives `Serialize`/`Deserialize` and nothing is
//! skipped, so round-tripping through JSON reproduces the in-memory tree
//! exactly — this is the stable schema the pipeline's output commits to.

use serde::{Deserialize, Serialize};

use crate::cas::CallConv;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TFunction {
    pub name: String,
    pub return_type_name: String,
    pub calling_convention: CallConv,
    pub parameters: Vec<TFunctionParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TFunctionParameter {
    pub name: String,
    pub type_name: String,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TFunctionPointer {
    pub name: String,
    pub is_synthetic: bool,
    pub return_type_name: String,
    pub parameters: Vec<TFunctionPointerParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TFunctionPointerParameter {
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TRecord {
    pub name: String,
    pub is_union: bool,
    pub fields: Vec<TStructField>,
    pub nested_records: Vec<TRecord>,
    pub nested_function_pointers: Vec<TFunctionPointer>,
    pub size_bytes: usize,
    pub align_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TStructField {
    pub name: String,
    pub type_name: String,
    pub offset_bits: usize,
    pub padding_bits: usize,
    /// True when the C element type has no target-primitive representation;
    /// the field is backed by an inline byte buffer and the Emitter must
    /// synthesize a typed read accessor.
    pub is_wrapped_array: bool,
    /// Element count when this field came from a `T[N]` C array, whether
    /// or not it ended up wrapped.
    pub array_len: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TOpaqueType {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TTypedef {
    pub name: String,
    pub underlying_type_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumIntegerType {
    I32,
    U32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TEnum {
    pub name: String,
    pub integer_type: EnumIntegerType,
    pub values: Vec<TEnumValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TEnumValue {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TVariable {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TMacroObject {
    pub name: String,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TTypeKind {
    Builtin,
    Void,
    Pointer,
    Record,
    Enum,
    Typedef,
    FunctionPointer,
    ConstArray,
}

/// A resolved target type: the final, host-language-ready spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TType {
    pub name: String,
    pub size_bytes: usize,
    pub align_bytes: usize,
    pub kind: TTypeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum TNodeKind {
    Function,
    FunctionPointer,
    Record,
    OpaqueType,
    Typedef,
    Enum,
    Variable,
    MacroObject,
}

/// The Target Abstract Surface — host-language-ready names and layout,
/// immutable once produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tas {
    pub functions: Vec<TFunction>,
    pub function_pointers: Vec<TFunctionPointer>,
    pub records: Vec<TRecord>,
    pub opaque_types: Vec<TOpaqueType>,
    pub typedefs: Vec<TTypedef>,
    pub enums: Vec<TEnum>,
    pub variables: Vec<TVariable>,
    pub macros: Vec<TMacroObject>,
    pub types: Vec<TType>,
    pub roots: Vec<(TNodeKind, String)>,
    /// Emitter-consumed identifiers from the configuration contract
    /// (`class_name`, `library_name`), carried through so the Emitter
    /// doesn't need a second channel back to the config.
    pub class_name: String,
    pub library_name: String,
    /// Set when this TAS is the per-platform branch of a merge conflict
    /// rather than a plain single-target surface.
    pub target_triple: Option<String>,
}

impl Tas {
    pub fn type_by_name(&self, name: &str) -> Option<&TType> {
        self.types.iter().find(|t| t.name == name)
    }
}
