//! Multi-target platform merge.
//!
//! Each entry in `target_triples` runs Explorer → Mapper-C → Mapper-Target
//! independently (clang is reconfigured per-triple, so there is no shared
//! state to thread through); this module reconciles the resulting TASs into
//! one, keyed by `(kind, name)`. A node present under every triple with
//! bit-identical shape merges silently. A node that differs is either an
//! error (`MergeStrategy::Strict`, the default) or split into per-platform
//! variants (`MergeStrategy::PerPlatform`).

use std::collections::{BTreeMap, HashMap};

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Location};
use crate::tas::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Strict,
    PerPlatform,
}

/// One merged surface, plus any nodes that diverged per-platform under
/// [`MergeStrategy::PerPlatform`] (empty under `Strict`, since a divergence
/// there is a hard error instead).
pub struct MergedTas {
    pub base: Tas,
    pub per_platform: Vec<(String, Tas)>,
}

trait Named {
    fn name(&self) -> &str;
}

macro_rules! impl_named {
    ($($t:ty),*) => {
        $(impl Named for $t {
            fn name(&self) -> &str { &self.name }
        })*
    };
}

impl_named!(
    TFunction,
    TFunctionPointer,
    TRecord,
    TOpaqueType,
    TTypedef,
    TEnum,
    TVariable,
    TMacroObject
);

/// `branches` is `(target_triple, tas)` for every fan-out run. Must be
/// non-empty; a single branch passes through unchanged (no merge needed).
/// `config::load_config` rejects an empty `target_triples` list before
/// `generate_from_config` ever builds `branches`, so this is an internal
/// contract between this module and its one caller, not a user-reachable
/// condition.
pub fn merge_platforms(
    branches: Vec<(String, Tas)>,
    strategy: MergeStrategy,
    diagnostics: &mut Diagnostics,
) -> MergedTas {
    assert!(!branches.is_empty(), "merge_platforms requires at least one branch");
    if branches.len() == 1 {
        let (_, tas) = branches.into_iter().next().unwrap();
        return MergedTas {
            base: Tas {
                target_triple: None,
                ..tas
            },
            per_platform: Vec::new(),
        };
    }

    let triples: Vec<String> = branches.iter().map(|(t, _)| t.clone()).collect();
    let first = branches[0].1.clone();

    let mut base = Tas {
        class_name: first.class_name.clone(),
        library_name: first.library_name.clone(),
        target_triple: None,
        roots: first.roots.clone(),
        ..Tas::default()
    };
    let mut per_platform: BTreeMap<String, Tas> = triples
        .iter()
        .map(|t| {
            (
                t.clone(),
                Tas {
                    class_name: first.class_name.clone(),
                    library_name: first.library_name.clone(),
                    target_triple: Some(t.clone()),
                    ..Tas::default()
                },
            )
        })
        .collect();

    merge_section(
        &branches,
        |t| &t.functions,
        strategy,
        diagnostics,
        &mut base.functions,
        &mut per_platform,
        |tas| &mut tas.functions,
    );
    merge_section(
        &branches,
        |t| &t.function_pointers,
        strategy,
        diagnostics,
        &mut base.function_pointers,
        &mut per_platform,
        |tas| &mut tas.function_pointers,
    );
    merge_section(
        &branches,
        |t| &t.records,
        strategy,
        diagnostics,
        &mut base.records,
        &mut per_platform,
        |tas| &mut tas.records,
    );
    merge_section(
        &branches,
        |t| &t.opaque_types,
        strategy,
        diagnostics,
        &mut base.opaque_types,
        &mut per_platform,
        |tas| &mut tas.opaque_types,
    );
    merge_section(
        &branches,
        |t| &t.typedefs,
        strategy,
        diagnostics,
        &mut base.typedefs,
        &mut per_platform,
        |tas| &mut tas.typedefs,
    );
    merge_section(
        &branches,
        |t| &t.enums,
        strategy,
        diagnostics,
        &mut base.enums,
        &mut per_platform,
        |tas| &mut tas.enums,
    );
    merge_section(
        &branches,
        |t| &t.variables,
        strategy,
        diagnostics,
        &mut base.variables,
        &mut per_platform,
        |tas| &mut tas.variables,
    );
    merge_section(
        &branches,
        |t| &t.macros,
        strategy,
        diagnostics,
        &mut base.macros,
        &mut per_platform,
        |tas| &mut tas.macros,
    );

    // The type table is additive and rarely diverges in practice (size/align
    // come from the target ABI, not a per-triple design choice); union it by
    // name, keeping the first triple's entry as the representative.
    let mut seen = std::collections::HashSet::new();
    for (_, tas) in &branches {
        for ty in &tas.types {
            if seen.insert(ty.name.clone()) {
                base.types.push(ty.clone());
            }
        }
    }
    base.types.sort_by(|a, b| a.name.cmp(&b.name));

    MergedTas {
        base,
        per_platform: per_platform.into_iter().collect(),
    }
}

/// Merges one TAS section (functions, records, ...) keyed by node name.
/// Strict divergence raises a diagnostic and drops the node from `base_out`
/// entirely; PerPlatform divergence pushes each triple's variant into its
/// own branch in `per_platform_out` and likewise omits it from `base_out`.
fn merge_section<T, F, G>(
    branches: &[(String, Tas)],
    get: F,
    strategy: MergeStrategy,
    diagnostics: &mut Diagnostics,
    base_out: &mut Vec<T>,
    per_platform_out: &mut BTreeMap<String, Tas>,
    get_mut: G,
) where
    T: Clone + PartialEq + Named,
    F: Fn(&Tas) -> &Vec<T>,
    G: Fn(&mut Tas) -> &mut Vec<T>,
{
    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, Vec<(String, T)>> = HashMap::new();

    for (triple, tas) in branches {
        for item in get(tas) {
            let name = item.name().to_string();
            if !by_name.contains_key(&name) {
                order.push(name.clone());
            }
            by_name
                .entry(name)
                .or_default()
                .push((triple.clone(), item.clone()));
        }
    }

    for name in order {
        let variants = &by_name[&name];
        let first = &variants[0].1;
        let all_equal = variants.iter().all(|(_, v)| v == first);
        if all_equal {
            base_out.push(first.clone());
            continue;
        }
        match strategy {
            MergeStrategy::Strict => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::MergePlatformNodes,
                    name.clone(),
                    Location::default(),
                ));
            }
            MergeStrategy::PerPlatform => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::MergePlatformNodes,
                    name.clone(),
                    Location::default(),
                ));
                for (triple, item) in variants {
                    if let Some(tas) = per_platform_out.get_mut(triple) {
                        get_mut(tas).push(item.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tas_with_function(ret: &str) -> Tas {
        Tas {
            functions: vec![TFunction {
                name: "add".to_string(),
                return_type_name: ret.to_string(),
                calling_convention: crate::cas::CallConv::C,
                parameters: vec![],
            }],
            class_name: "Lib".to_string(),
            library_name: "lib".to_string(),
            ..Tas::default()
        }
    }

    #[test]
    fn single_branch_passes_through_unchanged() {
        let mut diagnostics = Diagnostics::new();
        let merged = merge_platforms(
            vec![("x86_64-unknown-linux-gnu".to_string(), tas_with_function("i32"))],
            MergeStrategy::Strict,
            &mut diagnostics,
        );
        assert_eq!(merged.base.functions.len(), 1);
        assert!(merged.per_platform.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn agreeing_platforms_merge_into_one_node_silently() {
        let mut diagnostics = Diagnostics::new();
        let merged = merge_platforms(
            vec![
                ("x86_64-unknown-linux-gnu".to_string(), tas_with_function("i32")),
                ("aarch64-unknown-linux-gnu".to_string(), tas_with_function("i32")),
            ],
            MergeStrategy::Strict,
            &mut diagnostics,
        );
        assert_eq!(merged.base.functions.len(), 1);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn strict_divergence_drops_node_and_raises_diagnostic() {
        let mut diagnostics = Diagnostics::new();
        let merged = merge_platforms(
            vec![
                ("x86_64-unknown-linux-gnu".to_string(), tas_with_function("i32")),
                ("aarch64-unknown-linux-gnu".to_string(), tas_with_function("i64")),
            ],
            MergeStrategy::Strict,
            &mut diagnostics,
        );
        assert!(merged.base.functions.is_empty());
        assert!(merged.per_platform.is_empty());
        assert!(diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::MergePlatformNodes && d.name == "add"));
    }

    #[test]
    fn per_platform_divergence_keeps_each_variant_on_its_own_branch() {
        let mut diagnostics = Diagnostics::new();
        let merged = merge_platforms(
            vec![
                ("x86_64-unknown-linux-gnu".to_string(), tas_with_function("i32")),
                ("aarch64-unknown-linux-gnu".to_string(), tas_with_function("i64")),
            ],
            MergeStrategy::PerPlatform,
            &mut diagnostics,
        );
        assert!(merged.base.functions.is_empty());
        assert_eq!(merged.per_platform.len(), 2);
        for (triple, tas) in &merged.per_platform {
            let f = tas.functions.iter().find(|f| f.name == "add").unwrap();
            if triple == "x86_64-unknown-linux-gnu" {
                assert_eq!(f.return_type_name, "i32");
            } else {
                assert_eq!(f.return_type_name, "i64");
            }
        }
    }
}
