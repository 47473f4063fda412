//! OTBM (Open Tibia Binary Map) codec
//!
//! Converts `.otbm` map containers into an ordered JSON document and back.
//!
//! # Format Overview
//!
//! An OTBM file is a tree of nodes delimited by single-byte markers:
//! - `0xFE` starts a node; the next raw byte is the node type
//! - `0xFF` ends the innermost open node
//! - `0xFD` escapes the following byte inside node bodies
//!
//! ## Container Layout
//!
//! - Bytes 0-3: Identifier (u32, raw)
//! - `0xFE 0x00`: Root node start
//! - 16 escaped bytes: map version (u32), width (u16), height (u16),
//!   items major version (u32), items minor version (u32)
//! - One MAP node (`0xFE 0x02 ... 0xFF`) holding tile areas, towns and waypoints
//! - `0xFF`: Root node end
//!
//! All integers are little-endian.
//!
//! ## Example
//!
//! ```no_run
//! # fn main() -> Result<(), otbm::Error> {
//! let document = otbm::decode("maps/forgotten.otbm")?;
//! println!("map is {:?}x{:?}", document.map_width(), document.map_height());
//!
//! otbm::encode(&document, "out/forgotten.otbm")?;
//! # Ok(())
//! # }
//! ```

pub mod attributes;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod document;
pub mod encoder;
pub mod node;
pub mod projection;
pub mod stream;

#[cfg(test)]
pub(crate) mod fixture;

// Re-export main types
pub use codec::{decode, encode, Codec};
pub use config::{AttributePolicy, CodecOptions, NodePolicy};
pub use decoder::{decode_tree, Decoder};
pub use document::Document;
pub use encoder::{encode_tree, Encoder};
pub use node::{
    Attributes, MapHeader, MapTree, Node, NodeKind, NodeType, Position, TileFlags, Value,
};
pub use projection::{lift, merge, project};
pub use stream::{ByteStream, Token};

/// Node start marker
pub const NODE_START: u8 = 0xFE;

/// Node end marker
pub const NODE_END: u8 = 0xFF;

/// Escape marker: the following byte is literal data
pub const ESCAPE: u8 = 0xFD;

/// Type byte of the outer root node that carries the map header
pub const ROOT_NODE_TYPE: u8 = 0x00;

/// Escaped header bytes inside the root node
pub const HEADER_SIZE: usize = 16;

/// Errors from OTBM decoding and encoding
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("File not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("Invalid extension for {path}: expected .{expected}")]
    InvalidExtension {
        path: std::path::PathBuf,
        expected: String,
    },

    #[error("Unexpected end of stream at offset {offset}")]
    EndOfStream { offset: u64 },

    #[error("Escape byte at offset {offset} is not followed by data")]
    TruncatedEscape { offset: u64 },

    #[error("Node {path} is not terminated (stream ended at offset {offset})")]
    UnterminatedNode { path: String, offset: u64 },

    #[error("Unknown attribute tag 0x{tag:02x} in {path} (node at offset {offset})")]
    UnknownAttributeTag { tag: u8, path: String, offset: u64 },

    #[error("Unknown node type 0x{tag:02x} at offset {offset}")]
    UnknownNodeType { tag: u8, offset: u64 },

    #[error("Text field {field} in {path} is not ASCII")]
    TextDecode { path: String, field: String },

    #[error("Field {field} in {path} is truncated")]
    TruncatedField { path: String, field: String },

    #[error("{count} unexpected trailing bytes in {path}")]
    TrailingBytes { path: String, count: usize },

    #[error("Invalid map header: {0}")]
    InvalidHeader(String),

    #[error("Unexpected {found} node in {path} at offset {offset}")]
    UnexpectedNode {
        found: String,
        path: String,
        offset: u64,
    },

    #[error("Map contains no MAP node")]
    MissingMapNode,

    #[error("Invalid document at {path}: {reason}")]
    InvalidDocument { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Check if data starts with an OTBM root node after the identifier
pub fn is_otbm(data: &[u8]) -> bool {
    data.len() >= 6 && data[4] == NODE_START && data[5] == ROOT_NODE_TYPE
}
