//! Configuration types for `surfacescrape.toml`.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub output: OutputConfig,
    /// Additional directories to search when resolving header and traverse
    /// paths. Each entry is tried in order after `base_dir` (the TOML
    /// file's parent directory). Also injected as `-I` flags for clang.
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,
    /// Extra clang arguments applied to **all** partitions. Per-partition
    /// `clang_args` are appended after these.
    #[serde(default)]
    pub clang_args: Vec<String>,
    #[serde(default)]
    pub partition: Vec<PartitionConfig>,
    #[serde(default)]
    pub namespace_overrides: HashMap<String, String>,
    /// Target triples to generate for. A single-entry list runs the
    /// pipeline once; multiple entries fan out independent pipeline runs
    /// and merge the resulting TASs.
    #[serde(default = "default_target_triples")]
    pub target_triples: Vec<String>,
    /// `{from, to}` name pairs rewritten during Mapper-Target.
    #[serde(default)]
    pub alias: Vec<AliasConfig>,
    /// Names dropped from TAS at every level, top-level and nested.
    #[serde(default)]
    pub ignored_names: Vec<String>,
    /// When false, system typedefs are resolved through but never emitted.
    #[serde(default)]
    pub emit_system_types: bool,
    /// Emitter-consumed identifiers, carried through to the TAS untouched.
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub library_name: Option<String>,
    /// How to resolve a platform divergence found while merging multiple
    /// `target_triples`. Defaults to erroring loudly rather than silently
    /// picking a winner.
    #[serde(default)]
    pub merge_strategy: MergeStrategyConfig,
}

fn default_target_triples() -> Vec<String> {
    vec!["x86_64-unknown-linux-gnu".to_string()]
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategyConfig {
    #[default]
    Strict,
    PerPlatform,
}

/// Output file settings.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Assembly/module name carried into the TAS.
    pub name: String,
    /// Output file path (e.g. `output.json`).
    #[serde(default = "default_output_file")]
    pub file: PathBuf,
}

fn default_output_file() -> PathBuf {
    PathBuf::from("output.json")
}

/// A single partition — maps a set of headers to one namespace.
#[derive(Debug, Deserialize)]
pub struct PartitionConfig {
    /// Namespace the partition's declarations are grouped under.
    pub namespace: String,
    /// Library name used for late-bound loading (e.g. `mylib.so`).
    pub library: String,
    /// Headers to include (all are parsed for dependency resolution).
    pub headers: Vec<PathBuf>,
    /// Which files to actually emit declarations from.
    /// If empty, uses `headers`.
    #[serde(default)]
    pub traverse: Vec<PathBuf>,
    /// Extra clang arguments (e.g. `-I/usr/include`).
    #[serde(default)]
    pub clang_args: Vec<String>,
}

impl PartitionConfig {
    /// Returns the traverse list, falling back to `headers` if empty.
    pub fn traverse_files(&self) -> &[PathBuf] {
        if self.traverse.is_empty() {
            &self.headers
        } else {
            &self.traverse
        }
    }

    /// Returns the translation unit file to parse.
    ///
    /// If there's a single header/source file, returns it directly.
    /// If there are multiple, generates a wrapper `.c` file in `out_dir`
    /// that `#include`s all of them.
    pub fn wrapper_header(&self, base_dir: &Path, include_paths: &[PathBuf]) -> PathBuf {
        if self.headers.len() == 1 {
            resolve_header(&self.headers[0], base_dir, include_paths)
        } else {
            let wrapper_dir = std::env::temp_dir().join("surfacescrape_wrappers");
            std::fs::create_dir_all(&wrapper_dir).expect("create wrapper dir");

            let safe_name = self.namespace.replace('.', "_");
            let wrapper_path = wrapper_dir.join(format!("{safe_name}_wrapper.c"));

            let mut content = String::new();
            for h in &self.headers {
                let abs = resolve_header(h, base_dir, include_paths);
                content.push_str(&format!("#include \"{}\"\n", abs.display()));
            }
            std::fs::write(&wrapper_path, &content).expect("write wrapper file");
            wrapper_path
        }
    }
}

/// Resolve a header path by searching `base_dir` first, then each
/// `include_paths` entry. Absolute paths are returned as-is. If the file
/// is not found anywhere, falls back to `base_dir.join(path)` so the
/// caller gets a meaningful error from clang.
pub fn resolve_header(path: &Path, base_dir: &Path, include_paths: &[PathBuf]) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let candidate = base_dir.join(path);
    if candidate.exists() {
        return candidate;
    }
    for inc in include_paths {
        let candidate = inc.join(path);
        if candidate.exists() {
            return candidate;
        }
    }
    base_dir.join(path)
}

/// A single `[[alias]]` entry renaming a CAS name before it reaches the TAS.
#[derive(Debug, Deserialize)]
pub struct AliasConfig {
    pub from: String,
    pub to: String,
}

/// Load and parse a `surfacescrape.toml` configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path.display(), e))?;

    // `#[serde(default = "default_target_triples")]` only fires when the
    // field is absent; an explicit `target_triples = []` deserializes fine
    // and would otherwise reach `merge::merge_platforms` with zero branches.
    // Reject it here so bad configuration surfaces as a config error
    // (`bin/surfacescrape.rs`'s exit code 2), not a panic deep in the merge.
    if config.target_triples.is_empty() {
        anyhow::bail!(
            "config file {} has an empty `target_triples` list; at least one target triple is required",
            path.display()
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> tempfile::TempPath {
        let mut file = tempfile::NamedTempFile::new().expect("create temp config file");
        std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write temp config file");
        file.into_temp_path()
    }

    #[test]
    fn empty_target_triples_is_a_config_error_not_a_default() {
        let path = write_config(
            r#"
            target_triples = []

            [output]
            name = "sample"
            "#,
        );
        let err = load_config(&path).expect_err("empty target_triples must be rejected");
        assert!(err.to_string().contains("target_triples"));
    }

    #[test]
    fn absent_target_triples_falls_back_to_the_default() {
        let path = write_config(
            r#"
            [output]
            name = "sample"
            "#,
        );
        let config = load_config(&path).expect("absent target_triples uses the default");
        assert_eq!(config.target_triples, vec!["x86_64-unknown-linux-gnu".to_string()]);
    }
}
