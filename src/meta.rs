//! Script metadata documents produced by the metadata dumper.
//!
//! Only the fields the symbol table consumes are modelled. Address fields
//! are kept as raw JSON values; their interpretation (hex text or plain
//! integer) depends on the collection and happens at load time.
use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptJson {
    #[serde(rename = "ScriptMethod", default)]
    pub methods: Vec<ScriptMethod>,
    #[serde(rename = "ScriptString", default)]
    pub strings: Vec<ScriptString>,
    #[serde(rename = "ScriptMetadata", default)]
    pub metadata: Vec<ScriptMetadata>,
    #[serde(rename = "ScriptMetadataMethod", default)]
    pub metadata_methods: Vec<ScriptMetadataMethod>,
    #[serde(rename = "Addresses", default)]
    pub addresses: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScriptMethod {
    #[serde(default)]
    pub address: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub type_signature: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScriptString {
    #[serde(default)]
    pub address: Value,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScriptMetadata {
    #[serde(default)]
    pub address: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScriptMetadataMethod {
    #[serde(default)]
    pub address: Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub method_address: Value,
}

/// One entry of `stringliteral.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StringLiteral {
    #[serde(default)]
    pub address: Value,
    #[serde(default)]
    pub value: String,
}

fn read_json<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open file '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON '{}'", path.display()))
}

pub fn read_script_json<P: AsRef<Path>>(path: P) -> Result<ScriptJson> { read_json(path) }

pub fn read_string_literals<P: AsRef<Path>>(path: P) -> Result<Vec<StringLiteral>> {
    read_json(path)
}
