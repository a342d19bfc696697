use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::util::{file::for_each_line, rewrite::Rewriter};

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SourceStats {
    pub lines: usize,
    pub lines_changed: usize,
}

/// Rewrites placeholder names on every line of a decompiled source file.
/// The output always has exactly as many lines as the input.
pub fn process_c_source<R, W>(rewriter: &Rewriter, reader: R, writer: &mut W) -> Result<SourceStats>
where
    R: BufRead,
    W: Write + ?Sized,
{
    let mut stats = SourceStats::default();
    for_each_line(reader, |_, line| {
        let rewritten = rewriter.rewrite(line);
        stats.lines += 1;
        if rewritten != line {
            stats.lines_changed += 1;
        }
        writeln!(writer, "{rewritten}").context("Failed to write source line")
    })?;
    Ok(stats)
}
