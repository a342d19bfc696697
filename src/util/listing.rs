//! Disassembly listing (`.lst`) rewriting.
//!
//! Each line is split into an address prefix (`segment:offset`), a body and
//! a trailing `;` comment, then classified as a data definition, a function
//! header, a function footer or a function body line. Function bodies are
//! wrapped in `{` / `}` marker lines in the output.
use std::{
    borrow::Cow,
    io::{BufRead, Write},
};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::util::{
    file::for_each_line,
    rewrite::{Rewriter, DATA_NAME},
};

static DATA_DIRECTIVE: Lazy<Regex> = Lazy::new(|| Regex::new("^DC[BWDQ]$").unwrap());
static FUNCTION_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new("^sub_([0-9a-fA-F]{1,8})$").unwrap());

const NAME_WIDTH: usize = 16;
const DIRECTIVE_WIDTH: usize = 4;
const OPERAND_WIDTH: usize = 20;

/// A listing line broken into its fields.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ListingLine<'a> {
    pub segment: &'a str,
    pub offset: u32,
    /// Whether the line started with a `segment:offset` prefix.
    pub has_address: bool,
    /// Code or data text, leading whitespace removed. Whitespace before the
    /// comment is kept so the comment column survives.
    pub body: &'a str,
    /// Everything from the first `;`, or empty.
    pub comment: &'a str,
}

impl<'a> ListingLine<'a> {
    pub fn parse(line: &'a str) -> Self {
        let token = line.split(' ').next().unwrap_or_default();
        let (segment, offset, rest) = match token.split_once(':') {
            Some((segment, offset)) if !segment.is_empty() && !offset.is_empty() => {
                let offset = u32::from_str_radix(offset, 16).unwrap_or(0);
                (segment, Some(offset), &line[token.len()..])
            }
            _ => ("", None, line),
        };
        let rest = rest.trim();
        let (body, comment) = match rest.find(';') {
            Some(pos) => rest.split_at(pos),
            None => (rest, ""),
        };
        ListingLine {
            segment,
            offset: offset.unwrap_or(0),
            has_address: offset.is_some(),
            body,
            comment,
        }
    }

    /// Renders the normalized `segment:OFFSET` prefix.
    #[inline]
    pub fn prefix(&self) -> String { format!("{}:{:08X}", self.segment, self.offset) }
}

/// Splits a body into tokens, treating `", "` as a single separator-free comma.
fn tokenize(body: &str) -> Vec<String> {
    body.replace(", ", ",").split(' ').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// State carried from one listing line to the next.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ListingState {
    /// Between a function header and its footer.
    pub insub: bool,
    /// Placeholder name of the open function.
    pub current_sub: String,
    /// Resolved name of the open function.
    pub current_function: String,
    /// Width of the last non-empty body, used to align comment-only lines.
    pub lastcp: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LineKind {
    AnonymousData,
    NamedData,
    FunctionHeader,
    FunctionFooter,
    Body,
    Unrecognized,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProcessedLine {
    pub kind: LineKind,
    pub text: String,
    /// Marker line emitted right after a function header.
    pub opening: Option<String>,
}

impl ProcessedLine {
    #[inline]
    pub fn is_output_worthy(&self) -> bool { self.kind != LineKind::Unrecognized }
}

#[inline]
fn is_directive(token: &str) -> bool { DATA_DIRECTIVE.is_match(token) }

fn function_header(parts: &[String]) -> Option<u32> {
    match parts {
        [name] => FUNCTION_HEADER
            .captures(name)
            .and_then(|c| u32::from_str_radix(&c[1], 16).ok()),
        _ => None,
    }
}

fn is_function_footer(state: &ListingState, comment: &str) -> bool {
    !state.current_sub.is_empty()
        && comment
            .trim_end()
            .strip_prefix("; End of function ")
            .is_some_and(|name| name == state.current_sub)
}

/// Pads the name, directive and first operand to their columns.
fn format_data(name: &str, parts: &[String]) -> String {
    format!(
        "{:NAME_WIDTH$}{:DIRECTIVE_WIDTH$}{:OPERAND_WIDTH$}{}",
        name,
        parts[0],
        parts[1],
        parts[2..].join(" ")
    )
}

/// Replaces the placeholder in a data label with its metadata name.
/// Lines with an address prefix resolve through the line offset,
/// others through the placeholder's own hex digits.
fn resolve_data_label(rewriter: &Rewriter, line: &ListingLine, label: &str) -> String {
    let Some(captures) = DATA_NAME.captures(label) else {
        return label.to_string();
    };
    let Some(placeholder) = captures.get(0) else {
        return label.to_string();
    };
    let key = if line.has_address {
        Some(line.offset)
    } else {
        u32::from_str_radix(&captures[2], 16).ok()
    };
    let resolved = key.map_or(placeholder.as_str(), |key| {
        rewriter.table().resolve_data(key, placeholder.as_str())
    });
    format!("{}{}{}", &label[..placeholder.start()], resolved, &label[placeholder.end()..])
}

/// Keeps the first token and the spacing after it, rewrites the rest.
fn rewrite_body(rewriter: &Rewriter, body: &str) -> String {
    let Some(pos) = body.find(' ') else {
        return body.to_string();
    };
    let operands = body[pos..].trim_start_matches(' ');
    let split = body.len() - operands.len();
    format!("{}{}", &body[..split], rewriter.rewrite(operands))
}

/// Processes a single listing line, updating `state`.
pub fn process_line(rewriter: &Rewriter, state: &mut ListingState, line: &str) -> ProcessedLine {
    if line.is_empty() {
        let kind = if state.insub { LineKind::Body } else { LineKind::Unrecognized };
        return ProcessedLine { kind, text: String::new(), opening: None };
    }

    let fields = ListingLine::parse(line);
    let parts = tokenize(fields.body);
    let mut comment = Cow::Borrowed(fields.comment);
    let mut opening = None;

    let (kind, body) = if parts.len() >= 2 && is_directive(&parts[0]) {
        (LineKind::AnonymousData, format_data("", &parts))
    } else if parts.len() >= 3 && is_directive(&parts[1]) {
        let name = resolve_data_label(rewriter, &fields, &parts[0]);
        (LineKind::NamedData, format_data(&name, &parts[1..]))
    } else if let Some(start) = function_header(&parts) {
        let table = rewriter.table();
        state.current_sub = parts[0].clone();
        state.current_function = table.resolve_sub(start, &parts[0]).to_string();
        state.insub = true;
        opening = Some(format!("{} {{", fields.prefix()));
        let body = if state.current_function.starts_with("sub_") {
            fields.body.to_string()
        } else {
            state.current_function.clone()
        };
        (LineKind::FunctionHeader, body)
    } else if parts.is_empty() && is_function_footer(state, fields.comment) {
        comment = Cow::Owned(format!("; End of function {}", state.current_function));
        state.current_sub.clear();
        state.current_function.clear();
        state.insub = false;
        (LineKind::FunctionFooter, "}".to_string())
    } else if state.insub {
        (LineKind::Body, rewrite_body(rewriter, fields.body))
    } else {
        (LineKind::Unrecognized, fields.body.to_string())
    };

    let mut comment = rewriter.rewrite(&comment);
    if body.is_empty() {
        comment.insert_str(0, &" ".repeat(state.lastcp));
    } else {
        state.lastcp = body.chars().count();
    }
    let text = format!("{} {}{}", fields.prefix(), body, comment);
    ProcessedLine { kind, text, opening }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ListingStats {
    pub lines_read: usize,
    pub lines_written: usize,
    pub functions: usize,
    pub functions_resolved: usize,
}

/// Rewrites a whole listing, writing only the recognized lines.
pub fn process_listing<R, W>(rewriter: &Rewriter, reader: R, writer: &mut W) -> Result<ListingStats>
where
    R: BufRead,
    W: Write + ?Sized,
{
    let mut state = ListingState::default();
    let mut stats = ListingStats::default();
    for_each_line(reader, |lineno, line| {
        stats.lines_read += 1;
        let processed = process_line(rewriter, &mut state, line);
        if !processed.is_output_worthy() {
            return Ok(());
        }
        if processed.kind == LineKind::FunctionHeader {
            stats.functions += 1;
            if !state.current_function.starts_with("sub_") {
                stats.functions_resolved += 1;
            }
        }
        tracing::trace!("{} {}", lineno, processed.text);
        writeln!(writer, "{}", processed.text).context("Failed to write listing line")?;
        stats.lines_written += 1;
        if let Some(opening) = &processed.opening {
            writeln!(writer, "{}", opening).context("Failed to write listing line")?;
            stats.lines_written += 1;
        }
        Ok(())
    })?;
    if state.insub {
        tracing::warn!("Listing ended inside function {}", state.current_sub);
    }
    Ok(stats)
}
