use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, ensure, Context, Result};
use rayon::prelude::*;

use crate::{
    meta::{read_script_json, read_string_literals},
    symbols::{parse_hex_address, SymbolTable},
    util::{
        csource::process_c_source,
        file::{buf_reader, buf_writer, compiled_path, is_compiled_path},
        listing::process_listing,
        rewrite::Rewriter,
        stack::process_stack_dump,
    },
};

/// Settings for one conversion run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub script: PathBuf,
    pub string_literals: PathBuf,
    pub target: PathBuf,
    /// Output path override, single-file targets only.
    pub output: Option<PathBuf>,
    /// Addresses or names to print symbol information for.
    pub queries: Vec<String>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TargetKind {
    /// Disassembly listing (`.lst`).
    Listing,
    /// Decompiled C source (`.c`).
    CSource,
    /// Stack trace dump (`.txt`).
    StackDump,
}

impl TargetKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "lst" => Some(Self::Listing),
            "c" => Some(Self::CSource),
            "txt" => Some(Self::StackDump),
            _ => None,
        }
    }
}

pub fn run(options: ProcessOptions) -> Result<()> {
    let script = read_script_json(&options.script)?;
    let literals = read_string_literals(&options.string_literals)?;
    let table = SymbolTable::load(&script, &literals)?;
    tracing::info!("Loaded {} named functions", table.function_count());

    for query in &options.queries {
        print_lookup(&table, query);
    }

    if options.target.is_dir() {
        ensure!(options.output.is_none(), "--output cannot be used with a directory target");
        compile_dir(&table, &options.target)
    } else {
        let kind = TargetKind::from_path(&options.target).ok_or_else(|| {
            anyhow!("Unsupported target '{}' (expected .lst, .c or .txt)", options.target.display())
        })?;
        let output = options.output.clone().unwrap_or_else(|| compiled_path(&options.target));
        compile_file(&table, kind, &options.target, &output)
    }
}

/// Compiles every supported file below `dir`.
fn compile_dir(table: &SymbolTable, dir: &Path) -> Result<()> {
    let dir_str =
        dir.to_str().ok_or_else(|| anyhow!("'{}' is not valid UTF-8", dir.display()))?;
    let pattern = format!("{}/**/*", glob::Pattern::escape(dir_str));
    let mut files = vec![];
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        if !path.is_file() || is_compiled_path(&path) {
            continue;
        }
        if let Some(kind) = TargetKind::from_path(&path) {
            files.push((kind, path));
        }
    }
    if files.is_empty() {
        tracing::warn!("No .lst, .c or .txt files found in '{}'", dir.display());
        return Ok(());
    }
    files.par_iter().try_for_each(|(kind, path)| compile_file(table, *kind, path, &compiled_path(path)))
}

pub fn compile_file(table: &SymbolTable, kind: TargetKind, input: &Path, output: &Path) -> Result<()> {
    let reader = buf_reader(input)?;
    let mut writer = buf_writer(output)?;
    let rewriter = Rewriter::new(table);
    match kind {
        TargetKind::Listing => {
            let stats = process_listing(&rewriter, reader, &mut writer)
                .with_context(|| format!("Failed to process listing '{}'", input.display()))?;
            tracing::info!(
                "{}: {} of {} lines written, {} of {} functions resolved",
                input.display(),
                stats.lines_written,
                stats.lines_read,
                stats.functions_resolved,
                stats.functions,
            );
        }
        TargetKind::CSource => {
            let stats = process_c_source(&rewriter, reader, &mut writer)
                .with_context(|| format!("Failed to process source '{}'", input.display()))?;
            tracing::info!(
                "{}: {} of {} lines changed",
                input.display(),
                stats.lines_changed,
                stats.lines
            );
        }
        TargetKind::StackDump => {
            let stats = process_stack_dump(&rewriter, reader, &mut writer)
                .with_context(|| format!("Failed to process stack dump '{}'", input.display()))?;
            tracing::info!(
                "{}: {} of {} frames resolved, {} modules",
                input.display(),
                stats.frames_resolved,
                stats.frames,
                stats.modules.len()
            );
        }
    }
    writer.flush().with_context(|| format!("Failed to write '{}'", output.display()))?;
    Ok(())
}

const MAX_SUGGESTIONS: usize = 5;

/// Interprets a lookup query as an address: `0x1234`, `1234` or a placeholder like `sub_1234`.
fn query_address(query: &str) -> Option<u32> {
    let digits = ["sub_", "off_", "byte_", "word_", "dword_", "qword_", "0x", "0X"]
        .iter()
        .find_map(|prefix| query.strip_prefix(prefix))
        .unwrap_or(query);
    if digits.is_empty() || digits.len() > 8 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(parse_hex_address(digits))
}

fn print_lookup(table: &SymbolTable, query: &str) {
    let Some(address) = table.address_of(query).or_else(|| query_address(query)) else {
        println!("{query}: not an address or known function name");
        for (address, name) in table.names_containing(query).into_iter().take(MAX_SUGGESTIONS) {
            println!("  did you mean {name} @ {address:#010X}?");
        }
        return;
    };
    let symbols = table.symbols_at(address);
    let listed = if table.is_known_address(address) { " (listed)" } else { "" };
    let named = table.function_name(address).map(|name| format!(" [{name}]")).unwrap_or_default();
    if symbols.is_empty() {
        println!("{query} @ {address:#010X}{named}{listed}: no symbols");
        return;
    }
    println!("{query} @ {address:#010X}{named}{listed}:");
    for symbol in symbols {
        println!("  {symbol}");
    }
}
