//! Node tree types
//!
//! The decoded form of an OTBM file before it is projected into a
//! [`Document`](crate::Document). Each node variant carries its own
//! positional fields; tagged attributes live in an ordered [`Attributes`] set.

use serde::{Deserialize, Serialize};

/// Node type tags as they appear after `0xFE`
pub mod tag {
    pub const MAP: u8 = 0x02;
    pub const TILE_AREA: u8 = 0x04;
    pub const TILE: u8 = 0x05;
    pub const ITEM: u8 = 0x06;
    pub const TOWNS: u8 = 0x0C;
    pub const TOWN: u8 = 0x0D;
    pub const HOUSE_TILE: u8 = 0x0E;
    pub const WAYPOINTS: u8 = 0x0F;
    pub const WAYPOINT: u8 = 0x10;
}

/// Classification of a node by its type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Map,
    TileArea,
    Tile,
    Item,
    Towns,
    Town,
    HouseTile,
    Waypoints,
    Waypoint,
    Unknown,
}

impl NodeType {
    pub const KNOWN: [NodeType; 9] = [
        NodeType::Map,
        NodeType::TileArea,
        NodeType::Tile,
        NodeType::Item,
        NodeType::Towns,
        NodeType::Town,
        NodeType::HouseTile,
        NodeType::Waypoints,
        NodeType::Waypoint,
    ];

    /// Classify a type byte
    pub fn from_tag(value: u8) -> Self {
        match value {
            tag::MAP => NodeType::Map,
            tag::TILE_AREA => NodeType::TileArea,
            tag::TILE => NodeType::Tile,
            tag::ITEM => NodeType::Item,
            tag::TOWNS => NodeType::Towns,
            tag::TOWN => NodeType::Town,
            tag::HOUSE_TILE => NodeType::HouseTile,
            tag::WAYPOINTS => NodeType::Waypoints,
            tag::WAYPOINT => NodeType::Waypoint,
            _ => NodeType::Unknown,
        }
    }

    /// Type byte for known node types
    pub fn tag(self) -> Option<u8> {
        match self {
            NodeType::Map => Some(tag::MAP),
            NodeType::TileArea => Some(tag::TILE_AREA),
            NodeType::Tile => Some(tag::TILE),
            NodeType::Item => Some(tag::ITEM),
            NodeType::Towns => Some(tag::TOWNS),
            NodeType::Town => Some(tag::TOWN),
            NodeType::HouseTile => Some(tag::HOUSE_TILE),
            NodeType::Waypoints => Some(tag::WAYPOINTS),
            NodeType::Waypoint => Some(tag::WAYPOINT),
            NodeType::Unknown => None,
        }
    }

    /// Name used in document keys
    pub fn name(self) -> &'static str {
        match self {
            NodeType::Map => "MAP",
            NodeType::TileArea => "TILE_AREA",
            NodeType::Tile => "TILE",
            NodeType::Item => "ITEM",
            NodeType::Towns => "TOWNS",
            NodeType::Town => "TOWN",
            NodeType::HouseTile => "HOUSE_TILE",
            NodeType::Waypoints => "WAYPOINTS",
            NodeType::Waypoint => "WAYPOINT",
            NodeType::Unknown => "UNKNOWN",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        if name == NodeType::Unknown.name() {
            return Some(NodeType::Unknown);
        }
        Self::KNOWN.into_iter().find(|t| t.name() == name)
    }

    /// Whether a tagged attribute run follows the positional fields
    pub fn has_attribute_run(self) -> bool {
        matches!(
            self,
            NodeType::Map
                | NodeType::TileArea
                | NodeType::Tile
                | NodeType::Item
                | NodeType::HouseTile
        )
    }

    /// Positional field keys, in wire order
    pub fn positional_keys(self) -> &'static [&'static str] {
        match self {
            NodeType::TileArea => &["X", "Y", "Z"],
            NodeType::Tile => &["X", "Y"],
            NodeType::Item => &["IDENTIFIER"],
            NodeType::Town => &["ID", "NAME", "X", "Y", "Z"],
            NodeType::HouseTile => &["X", "Y", "HOUSE_ID"],
            NodeType::Waypoint => &["NAME", "X", "Y", "Z"],
            NodeType::Unknown => &["TYPE", "BODY"],
            NodeType::Map | NodeType::Towns | NodeType::Waypoints => &[],
        }
    }
}

/// Absolute map coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

impl Position {
    pub fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }
}

/// Tile flag bits (attribute 0x03)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileFlags(pub u32);

impl TileFlags {
    pub const PROTECTION_ZONE: u32 = 0x01;
    pub const NO_PVP: u32 = 0x04;
    pub const NO_LOGOUT: u32 = 0x08;
    pub const PVP_ZONE: u32 = 0x10;

    /// Named flags and their document keys
    pub const NAMED: [(&'static str, u32); 4] = [
        ("PROTECTION_ZONE", Self::PROTECTION_ZONE),
        ("NO_PVP", Self::NO_PVP),
        ("NO_LOGOUT", Self::NO_LOGOUT),
        ("PVP_ZONE", Self::PVP_ZONE),
    ];

    /// Document key for bits outside the named flags
    pub const OTHER_KEY: &'static str = "OTHER_FLAGS";

    const NAMED_MASK: u32 =
        Self::PROTECTION_ZONE | Self::NO_PVP | Self::NO_LOGOUT | Self::PVP_ZONE;

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn set(&mut self, flag: u32, enabled: bool) {
        if enabled {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    /// Bits not covered by a named flag
    pub fn other_bits(self) -> u32 {
        self.0 & !Self::NAMED_MASK
    }

    pub fn set_other_bits(&mut self, bits: u32) {
        self.0 = (self.0 & Self::NAMED_MASK) | (bits & !Self::NAMED_MASK);
    }
}

/// Decoded attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Unsigned integer with its wire width in bytes
    Int { value: u32, width: u8 },
    /// ASCII text from a length-prefixed field
    Text(String),
    Flags(TileFlags),
    Coords(Position),
    /// Undecoded attribute bytes kept verbatim
    Raw(Vec<u8>),
}

impl Value {
    pub fn u8(value: u8) -> Self {
        Value::Int {
            value: value.into(),
            width: 1,
        }
    }

    pub fn u16(value: u16) -> Self {
        Value::Int {
            value: value.into(),
            width: 2,
        }
    }

    pub fn u32(value: u32) -> Self {
        Value::Int { value, width: 4 }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn as_int(&self) -> Option<u32> {
        match self {
            Value::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Ordered attribute set; re-inserting a key replaces its value in place
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, Value)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Node variant with its positional fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Map,
    TileArea {
        origin: Position,
    },
    /// Offsets are relative to the enclosing tile area
    Tile {
        x: u8,
        y: u8,
    },
    Item {
        id: u16,
    },
    Towns,
    Town {
        id: u32,
        name: String,
        position: Position,
    },
    HouseTile {
        x: u8,
        y: u8,
        house_id: u32,
    },
    Waypoints,
    Waypoint {
        name: String,
        position: Position,
    },
    /// Unrecognized type byte; the unescaped body is kept as-is
    Unknown {
        tag: u8,
        body: Vec<u8>,
    },
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Map => NodeType::Map,
            NodeKind::TileArea { .. } => NodeType::TileArea,
            NodeKind::Tile { .. } => NodeType::Tile,
            NodeKind::Item { .. } => NodeType::Item,
            NodeKind::Towns => NodeType::Towns,
            NodeKind::Town { .. } => NodeType::Town,
            NodeKind::HouseTile { .. } => NodeType::HouseTile,
            NodeKind::Waypoints => NodeType::Waypoints,
            NodeKind::Waypoint { .. } => NodeType::Waypoint,
            NodeKind::Unknown { .. } => NodeType::Unknown,
        }
    }

    /// Type byte written after `0xFE`
    pub fn tag(&self) -> u8 {
        match self {
            NodeKind::Unknown { tag, .. } => *tag,
            known => known.node_type().tag().unwrap_or_default(),
        }
    }
}

/// One node of the decoded tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// 1-based index among same-type nodes
    pub sibling_index: u32,
    pub attributes: Attributes,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind, sibling_index: u32) -> Self {
        Self {
            kind,
            sibling_index,
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Document key of this node
    pub fn segment(&self) -> String {
        segment(self.node_type(), self.sibling_index)
    }
}

/// Document key for a node of `node_type` with the given index
///
/// The map node is always `MAP`, and the first towns container is `TOWNS`.
pub fn segment(node_type: NodeType, sibling_index: u32) -> String {
    match node_type {
        NodeType::Map => node_type.name().to_string(),
        NodeType::Towns if sibling_index <= 1 => node_type.name().to_string(),
        other => format!("{}_{}", other.name(), sibling_index),
    }
}

/// Parse a document key back into a node type and index
pub fn parse_segment(key: &str) -> Option<(NodeType, u32)> {
    match key {
        "MAP" => return Some((NodeType::Map, 1)),
        "TOWNS" => return Some((NodeType::Towns, 1)),
        _ => {}
    }

    let (name, index) = key.rsplit_once('_')?;
    let index: u32 = index.parse().ok()?;
    let node_type = NodeType::from_name(name)?;
    if node_type == NodeType::Map || index == 0 {
        return None;
    }
    Some((node_type, index))
}

/// Map header carried by the root node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapHeader {
    pub identifier: u32,
    pub map_version: u32,
    pub map_width: u16,
    pub map_height: u16,
    pub items_major_version: u32,
    pub items_minor_version: u32,
}

/// A decoded map: header plus the MAP node subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTree {
    pub header: MapHeader,
    pub root: Node,
}

impl MapTree {
    /// Depth-first iterator over every node, parents before children
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        let mut stack = vec![&self.root];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}
