pub mod ranges;

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde_json::Value;

use crate::{
    meta::{ScriptJson, StringLiteral},
    symbols::ranges::{resolve_range, SortedStarts},
    util::dual_map::DualMap,
};

/// A symbol stored for an address, borrowed from the table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Symbol<'a> {
    StringLiteral(&'a str),
    ScriptString(&'a str),
    Method(&'a str),
    Metadata(&'a str),
    MetadataMethod { name: &'a str, method_address: u32 },
}

impl std::fmt::Display for Symbol<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::StringLiteral(text) => write!(f, "string literal: {text}"),
            Symbol::ScriptString(text) => write!(f, "script string: {text}"),
            Symbol::Method(signature) => write!(f, "method: {signature}"),
            Symbol::Metadata(signature) => write!(f, "metadata: {signature}"),
            Symbol::MetadataMethod { name, method_address } => {
                write!(f, "metadata method: {name}:{method_address}")
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct MetadataMethod {
    name: String,
    method_address: u32,
}

/// Address-indexed symbol information recovered from the script metadata.
/// Read-only once loaded.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    string_literals: HashMap<u32, String>,
    script_strings: HashMap<u32, String>,
    methods: HashMap<u32, String>,
    metadata: HashMap<u32, String>,
    metadata_methods: HashMap<u32, MetadataMethod>,
    addresses: HashSet<u32>,
    /// Function display names, used for reverse lookups.
    names: DualMap<u32, String>,
    method_starts: SortedStarts,
    metadata_method_starts: SortedStarts,
}

/// Parses hexadecimal text, with or without a `0x` prefix.
/// Anything unparsable becomes address 0.
pub fn parse_hex_address(text: &str) -> u32 {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).unwrap_or(0)
}

/// Interprets a JSON value as hexadecimal text, whatever its JSON type.
fn hex_text_address(value: &Value) -> u32 {
    match value {
        Value::String(s) => parse_hex_address(s),
        Value::Number(n) => parse_hex_address(&n.to_string()),
        _ => 0,
    }
}

/// Interprets a JSON value as an integer address.
fn integer_address(value: &Value) -> u32 {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with("0x") || s.starts_with("0X") {
                parse_hex_address(s)
            } else {
                s.parse().unwrap_or(0)
            }
        }
        _ => 0,
    }
}

fn join_fields<'a>(fields: impl IntoIterator<Item = Option<&'a str>>) -> String {
    fields.into_iter().flatten().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-")
}

impl SymbolTable {
    pub fn new() -> Result<Self> {
        Ok(Self {
            string_literals: HashMap::new(),
            script_strings: HashMap::new(),
            methods: HashMap::new(),
            metadata: HashMap::new(),
            metadata_methods: HashMap::new(),
            addresses: HashSet::new(),
            names: DualMap::new()?,
            method_starts: SortedStarts::new(),
            metadata_method_starts: SortedStarts::new(),
        })
    }

    pub fn load(script: &ScriptJson, literals: &[StringLiteral]) -> Result<Self> {
        let mut table = Self::new()?;
        for literal in literals {
            table.add_string_literal(hex_text_address(&literal.address), literal.value.clone());
        }
        for string in &script.strings {
            table.add_script_string(hex_text_address(&string.address), string.value.clone());
        }
        for method in &script.methods {
            let text = join_fields([
                method.name.as_deref(),
                method.signature.as_deref(),
                method.type_signature.as_deref(),
            ]);
            table.add_method(integer_address(&method.address), text);
        }
        for metadata in &script.metadata {
            let text = join_fields([metadata.name.as_deref(), metadata.signature.as_deref()]);
            table.add_metadata(integer_address(&metadata.address), text);
        }
        for method in &script.metadata_methods {
            table.add_metadata_method(
                integer_address(&method.address),
                method.name.clone(),
                integer_address(&method.method_address),
            );
        }
        table.addresses.extend(script.addresses.iter().map(integer_address));
        tracing::debug!(
            "Loaded {} string literals, {} script strings, {} methods, {} metadata, {} metadata methods",
            table.string_literals.len(),
            table.script_strings.len(),
            table.methods.len(),
            table.metadata.len(),
            table.metadata_methods.len(),
        );
        Ok(table)
    }

    pub fn add_string_literal(&mut self, address: u32, text: String) {
        self.string_literals.insert(address, text);
    }

    pub fn add_script_string(&mut self, address: u32, text: String) {
        self.script_strings.insert(address, text);
    }

    pub fn add_method(&mut self, address: u32, signature: String) {
        self.index_name(address, signature.clone(), true);
        self.methods.insert(address, signature);
        self.method_starts.insert(address);
    }

    pub fn add_metadata(&mut self, address: u32, signature: String) {
        self.metadata.insert(address, signature);
    }

    pub fn add_metadata_method(&mut self, address: u32, name: String, method_address: u32) {
        self.index_name(address, name.clone(), false);
        self.metadata_methods.insert(address, MetadataMethod { name, method_address });
        self.metadata_method_starts.insert(address);
    }

    /// Keeps the name index in line with `resolve_sub`: a method name always
    /// wins over a metadata-method name at the same address.
    fn index_name(&mut self, address: u32, name: String, is_method: bool) {
        if name.is_empty() || (!is_method && self.methods.contains_key(&address)) {
            return;
        }
        let displaced = self.names.insert(address, name);
        if let Some((old, name)) = displaced.by_value {
            tracing::debug!("Name {} moved from {:#010X} to {:#010X}", name, old, address);
        }
    }

    /// Metadata name for `address`, or `fallback`.
    #[inline]
    pub fn resolve_data<'a>(&'a self, address: u32, fallback: &'a str) -> &'a str {
        self.metadata.get(&address).map_or(fallback, String::as_str)
    }

    /// Method signature for `address`, else the metadata-method name, else `fallback`.
    pub fn resolve_sub<'a>(&'a self, address: u32, fallback: &'a str) -> &'a str {
        if let Some(method) = self.methods.get(&address) {
            method
        } else if let Some(method) = self.metadata_methods.get(&address) {
            &method.name
        } else {
            fallback
        }
    }

    /// Range start and offset of the function containing `address`:
    /// method starts first, then metadata-method starts. `(0, 0)` if unknown.
    pub fn resolve_range(&self, address: u32) -> (u32, u32) {
        resolve_range(address, &[&self.method_starts, &self.metadata_method_starts])
    }

    /// Every symbol stored for `address`, across all categories.
    pub fn symbols_at(&self, address: u32) -> Vec<Symbol<'_>> {
        let mut out = vec![];
        if let Some(text) = self.string_literals.get(&address) {
            out.push(Symbol::StringLiteral(text));
        }
        if let Some(text) = self.script_strings.get(&address) {
            out.push(Symbol::ScriptString(text));
        }
        if let Some(signature) = self.methods.get(&address) {
            out.push(Symbol::Method(signature));
        }
        if let Some(signature) = self.metadata.get(&address) {
            out.push(Symbol::Metadata(signature));
        }
        if let Some(method) = self.metadata_methods.get(&address) {
            out.push(Symbol::MetadataMethod {
                name: &method.name,
                method_address: method.method_address,
            });
        }
        out
    }

    /// Address of the function with display name `name`.
    #[inline]
    pub fn address_of(&self, name: &str) -> Option<u32> {
        self.names.get_by_value(&name.to_string()).copied()
    }

    /// Display name indexed for the function at `address`.
    #[inline]
    pub fn function_name(&self, address: u32) -> Option<&str> {
        self.names.get_by_key(&address).map(String::as_str)
    }

    /// Indexed function names containing `text`, sorted by address.
    pub fn names_containing(&self, text: &str) -> Vec<(u32, &str)> {
        let mut out: Vec<(u32, &str)> = self
            .names
            .iter()
            .filter(|(_, name)| name.contains(text))
            .map(|(&address, name)| (address, name.as_str()))
            .collect();
        out.sort_unstable();
        out
    }

    #[inline]
    pub fn is_known_address(&self, address: u32) -> bool { self.addresses.contains(&address) }

    #[inline]
    pub fn function_count(&self) -> usize { self.names.len() }
}
