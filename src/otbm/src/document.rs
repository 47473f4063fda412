//! Structured document form of a map
//!
//! A [`Document`] is an ordered nested JSON object. Top-level keys hold the
//! map header fields and the `MAP` subtree; nodes are keyed
//! `"<TYPE>_<index>"` and hold their fields followed by their children.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::io::{Read, Write};

use crate::Result;

pub const IDENTIFIER_KEY: &str = "identifier";
pub const MAP_VERSION_KEY: &str = "map_version";
pub const MAP_WIDTH_KEY: &str = "map_width";
pub const MAP_HEIGHT_KEY: &str = "map_height";
pub const ITEMS_MAJOR_VERSION_KEY: &str = "items_major_version";
pub const ITEMS_MINOR_VERSION_KEY: &str = "items_minor_version";
pub const MAP_KEY: &str = "MAP";

/// Header keys in document order
pub const HEADER_KEYS: [&str; 6] = [
    IDENTIFIER_KEY,
    MAP_VERSION_KEY,
    MAP_WIDTH_KEY,
    MAP_HEIGHT_KEY,
    ITEMS_MAJOR_VERSION_KEY,
    ITEMS_MINOR_VERSION_KEY,
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Json>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Json>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Json> {
        &self.0
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Json> {
        &mut self.0
    }

    pub fn into_map(self) -> Map<String, Json> {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.0.get(key)
    }

    /// Follow nested keys, e.g. `["MAP", "TILE_AREA_1", "X"]`
    pub fn get_path(&self, path: &[&str]) -> Option<&Json> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.0.get(*first)?, |value, key| value.get(*key))
    }

    /// The projected MAP node
    pub fn map(&self) -> Option<&Map<String, Json>> {
        self.0.get(MAP_KEY).and_then(Json::as_object)
    }

    fn header_field(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Json::as_u64)
    }

    pub fn identifier(&self) -> Option<u32> {
        self.header_field(IDENTIFIER_KEY).and_then(|v| v.try_into().ok())
    }

    pub fn map_version(&self) -> Option<u32> {
        self.header_field(MAP_VERSION_KEY).and_then(|v| v.try_into().ok())
    }

    pub fn map_width(&self) -> Option<u16> {
        self.header_field(MAP_WIDTH_KEY).and_then(|v| v.try_into().ok())
    }

    pub fn map_height(&self) -> Option<u16> {
        self.header_field(MAP_HEIGHT_KEY).and_then(|v| v.try_into().ok())
    }

    pub fn items_major_version(&self) -> Option<u32> {
        self.header_field(ITEMS_MAJOR_VERSION_KEY)
            .and_then(|v| v.try_into().ok())
    }

    pub fn items_minor_version(&self) -> Option<u32> {
        self.header_field(ITEMS_MINOR_VERSION_KEY)
            .and_then(|v| v.try_into().ok())
    }

    /// Pretty JSON with `indent` spaces per level; non-ASCII is written as-is
    pub fn to_json_string(&self, indent: usize) -> Result<String> {
        let mut out = Vec::new();
        self.write_json(&mut out, indent)?;
        let text = String::from_utf8(out)
            .map_err(<serde_json::Error as serde::ser::Error>::custom)?;
        Ok(text)
    }

    pub fn write_json<W: Write>(&self, writer: W, indent: usize) -> Result<()> {
        let indent = vec![b' '; indent];
        let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
        let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
        self.serialize(&mut serializer)?;
        Ok(())
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn read_json<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        let value = json!({
            "identifier": 0,
            "map_version": 2,
            "map_width": 256,
            "map_height": 512,
            "items_major_version": 3,
            "items_minor_version": 57,
            "MAP": {
                "DESCRIPTION_1": "Saved with Remere's Map Editor",
                "TILE_AREA_1": { "X": 1000, "Y": 1000, "Z": 7 }
            }
        });
        match value {
            Json::Object(map) => Document::from_map(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_header_accessors() {
        let doc = sample();
        assert_eq!(doc.identifier(), Some(0));
        assert_eq!(doc.map_version(), Some(2));
        assert_eq!(doc.map_width(), Some(256));
        assert_eq!(doc.map_height(), Some(512));
        assert_eq!(doc.items_major_version(), Some(3));
        assert_eq!(doc.items_minor_version(), Some(57));
        assert!(doc.map().is_some());
    }

    #[test]
    fn test_get_path() {
        let doc = sample();
        assert_eq!(doc.get_path(&["MAP", "TILE_AREA_1", "Z"]), Some(&json!(7)));
        assert_eq!(doc.get_path(&["MAP", "TILE_AREA_2"]), None);
        assert_eq!(doc.get_path(&[]), None);
    }

    #[test]
    fn test_json_keeps_key_order() {
        let doc = sample();
        let text = doc.to_json_string(4).unwrap();
        assert!(text.contains("\n    \"identifier\": 0"));

        let parsed = Document::from_json_str(&text).unwrap();
        let keys: Vec<&String> = parsed.as_map().keys().collect();
        assert_eq!(
            keys,
            vec![
                "identifier",
                "map_version",
                "map_width",
                "map_height",
                "items_major_version",
                "items_minor_version",
                "MAP"
            ]
        );
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_json_keeps_non_ascii() {
        let mut doc = sample();
        doc.as_map_mut()
            .insert("note".into(), Json::String("Ab'dendriel café".into()));
        let text = doc.to_json_string(2).unwrap();
        assert!(text.contains("\"note\": \"Ab'dendriel café\""));
        assert!(text.contains("\n  \"MAP\": {"));
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(Document::from_json_str("[1, 2, 3]").is_err());
    }
}
