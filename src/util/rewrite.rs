use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::symbols::SymbolTable;

pub static DATA_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new("(off_|byte_|word_|dword_|qword_)([0-9a-fA-F]{1,8})").unwrap());
pub static SUB_NAME: Lazy<Regex> = Lazy::new(|| Regex::new("sub_([0-9a-fA-F]{1,8})").unwrap());

/// Replaces every match of `pattern` in `text` with whatever `resolver`
/// returns for it. Matches the resolver declines keep their original text.
pub fn replace_matches<'t, F>(text: &'t str, pattern: &Regex, mut resolver: F) -> Cow<'t, str>
where F: FnMut(&Captures) -> Option<String> {
    pattern.replace_all(text, |captures: &Captures| {
        resolver(captures).unwrap_or_else(|| captures[0].to_string())
    })
}

/// Parses the hex digits in capture group `group`.
#[inline]
fn captured_address(captures: &Captures, group: usize) -> Option<u32> {
    captures.get(group).and_then(|m| u32::from_str_radix(m.as_str(), 16).ok())
}

/// Substitutes placeholder names (`off_1234`, `sub_5678`, ...) in free text.
#[derive(Debug, Copy, Clone)]
pub struct Rewriter<'a> {
    table: &'a SymbolTable,
}

impl<'a> Rewriter<'a> {
    #[inline]
    pub fn new(table: &'a SymbolTable) -> Self { Self { table } }

    #[inline]
    pub fn table(&self) -> &'a SymbolTable { self.table }

    pub fn rewrite(&self, text: &str) -> String {
        let text = replace_matches(text, &DATA_NAME, |captures| {
            let address = captured_address(captures, 2)?;
            Some(self.table.resolve_data(address, &captures[0]).to_string())
        });
        replace_matches(&text, &SUB_NAME, |captures| {
            let address = captured_address(captures, 1)?;
            Some(self.table.resolve_sub(address, &captures[0]).to_string())
        })
        .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        let mut table = SymbolTable::new().unwrap();
        table.add_metadata(0x1000, "g_flag".to_string());
        table.add_metadata(0xABCDEF, "Player_TypeInfo".to_string());
        table.add_method(0x2000, "Player$$Update".to_string());
        table.add_metadata_method(0x3000, "Method$Enemy.Tick()".to_string(), 0x3100);
        table
    }

    #[test]
    fn test_rewrite_data_and_subs() {
        let table = table();
        let rewriter = Rewriter::new(&table);
        assert_eq!(rewriter.rewrite("LDR X0, =off_1000"), "LDR X0, =g_flag");
        assert_eq!(rewriter.rewrite("ADRP X8, #qword_ABCDEF@PAGE"), "ADRP X8, #Player_TypeInfo@PAGE");
        assert_eq!(rewriter.rewrite("BL sub_2000"), "BL Player$$Update");
        assert_eq!(rewriter.rewrite("B sub_3000 ; sub_2000"), "B Method$Enemy.Tick() ; Player$$Update");
    }

    #[test]
    fn test_unknown_keeps_placeholder() {
        let table = table();
        let rewriter = Rewriter::new(&table);
        assert_eq!(rewriter.rewrite("BL sub_4000"), "BL sub_4000");
        assert_eq!(rewriter.rewrite("dword_1234 word_1000x"), "dword_1234 g_flagx");
        assert_eq!(rewriter.rewrite("no placeholders here"), "no placeholders here");
        assert_eq!(rewriter.rewrite(""), "");
    }

    #[test]
    fn test_not_context_aware() {
        let table = table();
        let rewriter = Rewriter::new(&table);
        assert_eq!(rewriter.rewrite("\"byte_1000\" ; nullsub_2000"), "\"g_flag\" ; nullPlayer$$Update");
    }

    #[test]
    fn test_idempotent_on_resolved_text() {
        let table = table();
        let rewriter = Rewriter::new(&table);
        let once = rewriter.rewrite("BL sub_2000 ; off_1000");
        assert_eq!(rewriter.rewrite(&once), once);
    }

    #[test]
    fn test_replace_matches_declined() {
        let out = replace_matches("sub_1 sub_2", &SUB_NAME, |captures| {
            (&captures[1] == "2").then(|| "two".to_string())
        });
        assert_eq!(out, "sub_1 two");
    }
}
