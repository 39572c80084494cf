//! Emitter contract — `spec.md` §6.
//!
//! Turning a [`Tas`] into host-language source is explicitly out of scope
//! (an external collaborator consumes the JSON this module writes); what
//! lives here is the contract an Emitter implements, plus one reference
//! implementation that serializes the TAS as the "stable JSON schema"
//! `spec.md` §6 requires of the pipeline's output. Grounded in the
//! teacher's `emit_winmd` entry point (`emit.rs`), narrowed from "write
//! ECMA-335 metadata rows" to "hand the caller bytes" since this crate has
//! no winmd writer to target.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::tas::Tas;

/// Anything that can turn a finished `Tas` into bytes for a host language.
/// `JsonEmitter` is the only implementation this crate ships; a real
/// Rust/C#/Python code generator is a downstream consumer of the JSON it
/// produces, not a module of this crate.
pub trait Emitter {
    fn emit(&self, tas: &Tas) -> Result<Vec<u8>>;
}

/// Serializes a `Tas` to pretty-printed, deterministically-ordered JSON.
/// Field order follows struct declaration order (serde_json preserves
/// this), and every `Vec` in `Tas` is already in discovery order, so two
/// runs over the same input produce byte-identical output.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEmitter;

impl Emitter for JsonEmitter {
    fn emit(&self, tas: &Tas) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(tas).context("serializing TAS to JSON")
    }
}

/// Writes `emitter`'s output for `tas` to `path`, creating parent
/// directories as needed.
pub fn emit_to_file(emitter: &dyn Emitter, tas: &Tas, path: &Path) -> Result<()> {
    let bytes = emitter.emit(tas)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("creating output file {}", path.display()))?;
    file.write_all(&bytes)
        .with_context(|| format!("writing output file {}", path.display()))?;
    Ok(())
}
