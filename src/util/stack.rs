//! Native crash dump (tombstone-style) rewriting.
//!
//! Frame lines look like
//! `#03 pc 0000000000a1b2c4  /data/app/lib/arm64/libil2cpp.so (sub_A1B200+196)`.
//! The pc is resolved against the known function starts and the
//! parenthesized description is replaced with `Name(0xSTART)+0xOFFSET`.
//! `(offset 0x...)` and `(BuildId: ...)` groups are kept in place.
use std::{
    collections::BTreeMap,
    io::{BufRead, Write},
};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::util::{file::for_each_line, rewrite::Rewriter};

static MODULE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        "^\\s*(?P<start>[0-9a-fA-F]+)-(?P<end>[0-9a-fA-F]+)\\s+[-rwxps]{4}\\s+.*?(?P<module>\\S+)\\s*$",
    )
    .unwrap()
});
static FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        "^(?P<frame>\\s*#\\d+\\s+pc\\s+(?P<addr>[0-9a-fA-F]{1,16})\\s+\\S+)(?P<tail>.*)$",
    )
    .unwrap()
});

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct StackStats {
    pub lines: usize,
    pub frames: usize,
    pub frames_resolved: usize,
    /// `(start, end)` → module path, from the memory map section of the dump.
    pub modules: BTreeMap<(u64, u64), String>,
}

/// Describes a frame address as `Name(0xSTART)+0xOFFSET`,
/// or as a bare placeholder when no enclosing function is known.
pub fn describe_address(rewriter: &Rewriter, address: u64) -> (String, bool) {
    let placeholder = format!("sub_{:08X}", address);
    let Ok(address) = u32::try_from(address) else {
        return (placeholder, false);
    };
    let table = rewriter.table();
    match table.resolve_range(address) {
        (0, _) => (placeholder, false),
        (start, offset) => {
            let fallback = format!("sub_{:08X}", start);
            let name = table.resolve_sub(start, &fallback);
            (format!("{}(0x{:08X})+0x{:X}", name, start, offset), true)
        }
    }
}

/// Splits ` (a) (b(c))` into its top-level bracket groups `["a", "b(c)"]`.
/// Returns `None` unless the text is nothing but balanced groups.
fn bracket_groups(text: &str) -> Option<Vec<&str>> {
    let mut groups = vec![];
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        rest = rest.strip_prefix('(')?;
        let mut depth = 1usize;
        let end = rest.char_indices().find_map(|(i, c)| {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
            None
        })?;
        groups.push(&rest[..end]);
        rest = rest[end + 1..].trim_start();
    }
    Some(groups)
}

/// Groups that annotate the module rather than describe the function.
fn is_annotation(group: &str) -> bool {
    group.starts_with("offset 0x") || group.starts_with("BuildId:")
}

fn rewrite_frame(rewriter: &Rewriter, captures: &Captures, stats: &mut StackStats) -> String {
    stats.frames += 1;
    let address = u64::from_str_radix(&captures["addr"], 16).unwrap_or(0);
    let (description, resolved) = describe_address(rewriter, address);
    if resolved {
        stats.frames_resolved += 1;
    }
    let frame = &captures["frame"];
    let tail = &captures["tail"];
    let Some(groups) = bracket_groups(tail) else {
        return format!("{frame} ({description}){tail}");
    };

    // The first non-annotation group is the old description. Without one,
    // the new description goes before the build id.
    let slot = groups
        .iter()
        .position(|group| !is_annotation(group))
        .or_else(|| groups.iter().position(|group| group.starts_with("BuildId:")))
        .unwrap_or(groups.len());
    let replaces = groups.get(slot).is_some_and(|group| !is_annotation(group));
    let mut out = frame.to_string();
    for (i, group) in groups.iter().enumerate() {
        if i == slot {
            out.push_str(&format!(" ({description})"));
            if replaces {
                continue;
            }
        }
        out.push_str(&format!(" ({group})"));
    }
    if slot == groups.len() {
        out.push_str(&format!(" ({description})"));
    }
    out
}

/// Rewrites the frame lines of a stack dump; every other line is copied as is.
pub fn process_stack_dump<R, W>(rewriter: &Rewriter, reader: R, writer: &mut W) -> Result<StackStats>
where
    R: BufRead,
    W: Write + ?Sized,
{
    let mut stats = StackStats::default();
    for_each_line(reader, |_, line| {
        stats.lines += 1;
        let result = if let Some(captures) = MODULE_RANGE.captures(line) {
            let start = u64::from_str_radix(&captures["start"], 16).unwrap_or(0);
            let end = u64::from_str_radix(&captures["end"], 16).unwrap_or(0);
            let module = captures["module"].to_string();
            tracing::debug!("Module {:#X}-{:#X}: {}", start, end, module);
            stats.modules.insert((start, end), module);
            writeln!(writer, "{line}")
        } else if let Some(captures) = FRAME.captures(line) {
            let frame = rewrite_frame(rewriter, &captures, &mut stats);
            writeln!(writer, "{frame}")
        } else {
            writeln!(writer, "{line}")
        };
        result.context("Failed to write stack dump line")
    })?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::symbols::SymbolTable;

    fn table() -> SymbolTable {
        let mut table = SymbolTable::new().unwrap();
        table.add_method(0x1000, "Player$$Update".to_string());
        table.add_method(0x2000, "Enemy$$Tick".to_string());
        table.add_metadata_method(0x800, "Method$Boot.Main()".to_string(), 0x900);
        table
    }

    #[test]
    fn test_describe_address() {
        let table = table();
        let rewriter = Rewriter::new(&table);
        assert_eq!(describe_address(&rewriter, 0x1010), ("Player$$Update(0x00001000)+0x10".to_string(), true));
        assert_eq!(describe_address(&rewriter, 0x2000), ("Enemy$$Tick(0x00002000)+0x0".to_string(), true));
        assert_eq!(describe_address(&rewriter, 0x900), ("Method$Boot.Main()(0x00000800)+0x100".to_string(), true));
        assert_eq!(describe_address(&rewriter, 0x10), ("sub_00000010".to_string(), false));
        assert_eq!(describe_address(&rewriter, 0x1_0000_0000), ("sub_100000000".to_string(), false));
    }

    fn rewrite(table: &SymbolTable, line: &str) -> String {
        let rewriter = Rewriter::new(table);
        let mut out = Vec::new();
        process_stack_dump(&rewriter, Cursor::new(line), &mut out).unwrap();
        String::from_utf8(out).unwrap().trim_end().to_string()
    }

    #[test]
    fn test_bracket_groups() {
        assert_eq!(bracket_groups(""), Some(vec![]));
        assert_eq!(
            bracket_groups("  (art::Thread::Dump(std::ostream&)+80) (BuildId: ab)"),
            Some(vec!["art::Thread::Dump(std::ostream&)+80", "BuildId: ab"])
        );
        assert_eq!(bracket_groups(" (offset 0x4b6000)"), Some(vec!["offset 0x4b6000"]));
        assert_eq!(bracket_groups(" (unclosed(x)"), None);
        assert_eq!(bracket_groups(" [deleted]"), None);
    }

    #[test]
    fn test_nested_brackets_replaced_whole() {
        let table = table();
        assert_eq!(
            rewrite(
                &table,
                "#00 pc 0000000000001010  /system/lib64/libart.so (art::Thread::Dump(std::ostream&)+80) (BuildId: ab)"
            ),
            "#00 pc 0000000000001010  /system/lib64/libart.so (Player$$Update(0x00001000)+0x10) (BuildId: ab)"
        );
        assert_eq!(
            rewrite(&table, "#01 pc 0000000000002008  /system/lib64/libart.so (operator()(int) const+8)"),
            "#01 pc 0000000000002008  /system/lib64/libart.so (Enemy$$Tick(0x00002000)+0x8)"
        );
    }

    #[test]
    fn test_apk_offset_kept() {
        let table = table();
        assert_eq!(
            rewrite(&table, "#01 pc 0000000000001010  /data/app/base.apk (offset 0x4b6000) (BuildId: ab)"),
            "#01 pc 0000000000001010  /data/app/base.apk (offset 0x4b6000) (Player$$Update(0x00001000)+0x10) (BuildId: ab)"
        );
        assert_eq!(
            rewrite(&table, "#02 pc 0000000000001010  /data/app/base.apk (offset 0x4b6000) (sub_1000+16)"),
            "#02 pc 0000000000001010  /data/app/base.apk (offset 0x4b6000) (Player$$Update(0x00001000)+0x10)"
        );
        assert_eq!(
            rewrite(&table, "#03 pc 0000000000001010  /data/app/base.apk (offset 0x4b6000)"),
            "#03 pc 0000000000001010  /data/app/base.apk (offset 0x4b6000) (Player$$Update(0x00001000)+0x10)"
        );
    }

    #[test]
    fn test_unbalanced_tail_kept_after_description() {
        let table = table();
        assert_eq!(
            rewrite(&table, "#04 pc 0000000000001010  /system/lib64/libc.so (broken"),
            "#04 pc 0000000000001010  /system/lib64/libc.so (Player$$Update(0x00001000)+0x10) (broken"
        );
    }

    #[test]
    fn test_process_stack_dump() {
        let table = table();
        let rewriter = Rewriter::new(&table);
        let input = "\
backtrace:
    #00 pc 0000000000001010  /data/app/lib/arm64/libil2cpp.so (sub_1000+16)
    #01 pc 0000000000002004  /data/app/lib/arm64/libil2cpp.so
    #02 pc 0000000000000010  /system/lib64/libc.so (abort+164) (BuildId: 1234abcd)
    #03 pc 0000000000002100  /data/app/lib/arm64/libil2cpp.so (BuildId: 99ff)
7a0c000000-7a0c100000 r-xp 00000000 fd:05 4321   /data/app/lib/arm64/libil2cpp.so
";
        let mut out = Vec::new();
        let stats = process_stack_dump(&rewriter, Cursor::new(input), &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec![
            "backtrace:",
            "    #00 pc 0000000000001010  /data/app/lib/arm64/libil2cpp.so (Player$$Update(0x00001000)+0x10)",
            "    #01 pc 0000000000002004  /data/app/lib/arm64/libil2cpp.so (Enemy$$Tick(0x00002000)+0x4)",
            "    #02 pc 0000000000000010  /system/lib64/libc.so (sub_00000010) (BuildId: 1234abcd)",
            "    #03 pc 0000000000002100  /data/app/lib/arm64/libil2cpp.so (Enemy$$Tick(0x00002000)+0x100) (BuildId: 99ff)",
            "7a0c000000-7a0c100000 r-xp 00000000 fd:05 4321   /data/app/lib/arm64/libil2cpp.so",
        ]);
        assert_eq!(stats.lines, 6);
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.frames_resolved, 3);
        assert_eq!(
            stats.modules.get(&(0x7a0c000000, 0x7a0c100000)).map(String::as_str),
            Some("/data/app/lib/arm64/libil2cpp.so")
        );
    }
}
