//! surfacescrape — C header to foreign-language binding surface generator.
//!
//! Parses C headers via libclang, builds a platform-neutral C Abstract
//! Surface (`cas`), lowers it into a host-language-ready Target Abstract
//! Surface (`tas`) per target triple, merges multiple triples when
//! configured for more than one, and emits the result as JSON for a
//! downstream code generator to consume.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//!
//! // Reads surfacescrape.toml, parses headers, writes the JSON surface.
//! surfacescrape::run(Path::new("surfacescrape.toml"), None).unwrap();
//! ```
//!
//! Or get the TAS and diagnostics without writing to disk:
//!
//! ```no_run
//! use std::path::Path;
//!
//! let result = surfacescrape::generate(Path::new("surfacescrape.toml")).unwrap();
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

pub mod cas;
pub mod config;
pub mod diagnostics;
pub mod emit;
pub mod explorer;
pub mod mapper_c;
pub mod mapper_target;
pub mod merge;
pub mod tas;

use config::Config;
use diagnostics::Diagnostics;
use emit::JsonEmitter;
use merge::MergeStrategy;
use tas::Tas;

/// Everything one pipeline run produced: the merged surface(s) and every
/// diagnostic collected along the way. `per_platform` is empty unless
/// `merge_strategy = "per-platform"` and the triples actually diverged.
pub struct GenerateResult {
    pub tas: Tas,
    pub per_platform: Vec<(String, Tas)>,
    pub diagnostics: Diagnostics,
}

/// Runs the full pipeline and writes the result to the configured (or
/// overridden) output path. Returns the path written.
pub fn run(config_path: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let cfg = config::load_config(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let result = generate_from_config(&cfg, base_dir)?;

    let output_path = match output {
        Some(p) => p.to_path_buf(),
        None => base_dir.join(&cfg.output.file),
    };
    emit::emit_to_file(&JsonEmitter, &result.tas, &output_path)?;

    for (triple, tas) in &result.per_platform {
        let sibling = sibling_output_path(&output_path, triple);
        emit::emit_to_file(&JsonEmitter, tas, &sibling)?;
    }

    info!(
        path = %output_path.display(),
        functions = result.tas.functions.len(),
        records = result.tas.records.len(),
        diagnostics = result.diagnostics.len(),
        "wrote surface"
    );

    if result.diagnostics.has_errors() {
        anyhow::bail!(
            "{} error-level diagnostic(s) encountered; see log output",
            result
                .diagnostics
                .iter()
                .filter(|d| d.severity == diagnostics::Severity::Error)
                .count()
        );
    }

    Ok(output_path)
}

fn sibling_output_path(base: &Path, triple: &str) -> PathBuf {
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let ext = base.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let file_name = format!("{stem}.{triple}.{ext}");
    base.with_file_name(file_name)
}

/// Parses a `surfacescrape.toml` config and runs the pipeline without
/// writing to disk.
pub fn generate(config_path: &Path) -> Result<GenerateResult> {
    let cfg = config::load_config(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    generate_from_config(&cfg, base_dir)
}

/// Runs the pipeline from an already-loaded [`Config`]. `base_dir` is the
/// directory header paths in the config are resolved relative to
/// (typically the parent directory of the TOML file).
pub fn generate_from_config(cfg: &Config, base_dir: &Path) -> Result<GenerateResult> {
    info!(
        output = %cfg.output.name,
        partitions = cfg.partition.len(),
        triples = cfg.target_triples.len(),
        "loaded configuration"
    );

    let mut diagnostics = Diagnostics::new();
    let aliases: Vec<(String, String)> = cfg
        .alias
        .iter()
        .map(|a| (a.from.clone(), a.to.clone()))
        .collect();
    let class_name = cfg.class_name.clone().unwrap_or_else(|| cfg.output.name.clone());
    let library_name = cfg
        .library_name
        .clone()
        .unwrap_or_else(|| cfg.output.name.clone());

    let mut branches: Vec<(String, Tas)> = Vec::new();
    for triple in &cfg.target_triples {
        let cas = build_cas_for_triple(cfg, base_dir, triple, &mut diagnostics)?;

        // The CAS closed-table invariant (`spec.md` §4.1) — every
        // `type_name` referenced anywhere in the surface resolves in the
        // type table — must hold before Mapper-Target runs; a violation
        // here means Mapper-C produced a dangling reference, and emitting
        // from a surface with dangling references isn't recoverable.
        let unresolved = cas.unresolved_type_refs_detailed();
        if !unresolved.is_empty() {
            let detail = unresolved
                .iter()
                .map(|(decl, ty)| format!("`{decl}` references unresolved type `{ty}`"))
                .collect::<Vec<_>>()
                .join(", ");
            anyhow::bail!(
                "CAS for target `{triple}` has {} unresolved type reference(s): {detail}",
                unresolved.len()
            );
        }

        let tas = mapper_target::map_to_target(
            &cas,
            &aliases,
            &cfg.ignored_names,
            cfg.emit_system_types,
            &class_name,
            &library_name,
            Some(triple.clone()),
            &mut diagnostics,
        )?;
        branches.push((triple.clone(), tas));
    }

    let strategy = match cfg.merge_strategy {
        config::MergeStrategyConfig::Strict => MergeStrategy::Strict,
        config::MergeStrategyConfig::PerPlatform => MergeStrategy::PerPlatform,
    };
    let merged = merge::merge_platforms(branches, strategy, &mut diagnostics);

    Ok(GenerateResult {
        tas: merged.base,
        per_platform: merged.per_platform,
        diagnostics,
    })
}

/// Parses one target triple's translation units and folds every
/// partition's declarations into a single [`cas::Cas`].
fn build_cas_for_triple(
    cfg: &Config,
    base_dir: &Path,
    triple: &str,
    diagnostics: &mut Diagnostics,
) -> Result<cas::Cas> {
    let clang =
        clang::Clang::new().map_err(|e| anyhow::anyhow!("failed to initialize libclang: {e}"))?;
    let index = clang::Index::new(&clang, false, false);

    let mut merged = cas::Cas::default();
    for partition_cfg in &cfg.partition {
        let header_path = partition_cfg.wrapper_header(base_dir, &cfg.include_paths);

        let mut all_args: Vec<String> = cfg.clang_args.clone();
        all_args.extend(partition_cfg.clang_args.clone());
        all_args.push(format!("--target={triple}"));
        for inc in &cfg.include_paths {
            let flag = format!("-I{}", inc.display());
            if !all_args.contains(&flag) {
                all_args.push(flag);
            }
        }

        let tu = index
            .parser(header_path.to_str().context("non-UTF8 header path")?)
            .arguments(&all_args.iter().map(|s| s.as_str()).collect::<Vec<_>>())
            .detailed_preprocessing_record(true)
            .parse()
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {:?}", header_path.display(), e))?;

        let resolved_traverse: Vec<PathBuf> = partition_cfg
            .traverse_files()
            .iter()
            .map(|t| config::resolve_header(t, base_dir, &cfg.include_paths))
            .collect();
        let entities = tu.get_entity().get_children();

        let output = explorer::explore(&entities, &resolved_traverse, diagnostics);
        let partition_cas = mapper_c::map_partition(&partition_cfg.namespace, &output, diagnostics);
        fold_partition(&mut merged, partition_cas);
    }

    Ok(merged)
}

/// Folds one partition's CAS into the accumulator, skipping nodes already
/// present by name (later partitions don't override earlier ones — matches
/// the teacher's first-writer-wins registry behavior for shared headers).
fn fold_partition(acc: &mut cas::Cas, part: cas::Cas) {
    use std::collections::HashSet;

    let existing_fns: HashSet<String> = acc.functions.iter().map(|f| f.name.clone()).collect();
    for f in part.functions {
        if !existing_fns.contains(&f.name) {
            acc.functions.push(f);
        }
    }
    let existing_fps: HashSet<String> =
        acc.function_pointers.iter().map(|f| f.name.clone()).collect();
    for fp in part.function_pointers {
        if !existing_fps.contains(&fp.name) {
            acc.function_pointers.push(fp);
        }
    }
    let existing_records: HashSet<String> = acc.records.iter().map(|r| r.name.clone()).collect();
    for r in part.records {
        if !existing_records.contains(&r.name) {
            acc.records.push(r);
        }
    }
    let existing_opaque: HashSet<String> =
        acc.opaque_types.iter().map(|o| o.name.clone()).collect();
    for o in part.opaque_types {
        if !existing_opaque.contains(&o.name) {
            acc.opaque_types.push(o);
        }
    }
    let existing_typedefs: HashSet<String> = acc.typedefs.iter().map(|t| t.name.clone()).collect();
    for td in part.typedefs {
        if !existing_typedefs.contains(&td.name) {
            acc.typedefs.push(td);
        }
    }
    let existing_enums: HashSet<String> = acc.enums.iter().map(|e| e.name.clone()).collect();
    for e in part.enums {
        if !existing_enums.contains(&e.name) {
            acc.enums.push(e);
        }
    }
    let existing_vars: HashSet<String> = acc.variables.iter().map(|v| v.name.clone()).collect();
    for v in part.variables {
        if !existing_vars.contains(&v.name) {
            acc.variables.push(v);
        }
    }
    let existing_macros: HashSet<String> = acc.macros.iter().map(|m| m.name.clone()).collect();
    for m in part.macros {
        if !existing_macros.contains(&m.name) {
            acc.macros.push(m);
        }
    }
    for ty in part.types {
        if acc.type_by_name(&ty.name).is_none() {
            acc.insert_type(ty);
        }
    }
    for root in part.roots {
        acc.roots.push(root);
    }
}
