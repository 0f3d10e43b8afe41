//! Relational data catalog returned by `reldata2017`

use serde::{Deserialize, Serialize};

/// A named group of relations the server exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelDataGroup {
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub elements: Vec<RelDataElement>,
}

/// One relation: its column signature and documentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelDataElement {
    pub name: String,
    #[serde(default)]
    pub signature_names: Vec<String>,
    #[serde(default)]
    pub signature_types: Vec<String>,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub description: String,
}
