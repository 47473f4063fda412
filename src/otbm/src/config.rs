//! Codec configuration
//!
//! Options are plain data with defaults matching the strict decoding
//! behavior; they can also be loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// Handling of attribute tags outside the known grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributePolicy {
    /// Fail with `UnknownAttributeTag`
    #[default]
    Strict,
    /// Stop decoding the run and keep the remaining bytes under `UNPARSED`
    Preserve,
}

/// Handling of node type bytes outside the known set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodePolicy {
    /// Keep the node as `UNKNOWN_<n>` with its raw body
    #[default]
    PassThrough,
    /// Fail with `UnknownNodeType`
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    pub unknown_attributes: AttributePolicy,
    pub unknown_nodes: NodePolicy,
    /// Extension required for binary map paths (without the dot)
    pub map_extension: String,
    /// Extension required for document paths (without the dot)
    pub document_extension: String,
    /// Spaces per indentation level when writing JSON
    pub json_indent: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            unknown_attributes: AttributePolicy::default(),
            unknown_nodes: NodePolicy::default(),
            map_extension: "otbm".to_string(),
            document_extension: "json".to_string(),
            json_indent: 4,
        }
    }
}

impl CodecOptions {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load options from a TOML file; missing keys take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}
