//! Node tree <-> document projection
//!
//! [`project`] walks the tree parent-to-child and deep-merges every node's
//! fields into the document at its key path. [`lift`] is the inverse used
//! before encoding: it reads a document back into a typed [`MapTree`].

use serde_json::{Map, Value as Json};

use crate::attributes::{rule_for_key, Field, UNPARSED_KEY};
use crate::document::{
    Document, HEADER_KEYS, IDENTIFIER_KEY, ITEMS_MAJOR_VERSION_KEY, ITEMS_MINOR_VERSION_KEY,
    MAP_HEIGHT_KEY, MAP_KEY, MAP_VERSION_KEY, MAP_WIDTH_KEY,
};
use crate::node::{
    parse_segment, Attributes, MapHeader, MapTree, Node, NodeKind, NodeType, Position, TileFlags,
    Value,
};
use crate::{Error, Result};

/// Node-tree key of attribute 0x09
const IDENTIFIER_ATTRIBUTE: &str = "IDENTIFIER";
/// Document key of attribute 0x09 on items, whose id owns `IDENTIFIER`
const ITEM_IDENTIFIER_KEY: &str = "ITEM_IDENTIFIER";
/// Key recording a non-default IDENTIFIER width
const IDENTIFIER_WIDTH_KEY: &str = "IDENTIFIER_WIDTH";
const IDENTIFIER_DEFAULT_WIDTH: u8 = 2;

/// Document key for a node-tree attribute key
fn document_key(node_type: NodeType, key: &str) -> &str {
    if node_type == NodeType::Item && key == IDENTIFIER_ATTRIBUTE {
        ITEM_IDENTIFIER_KEY
    } else {
        key
    }
}

/// Node-tree attribute key for a document key
fn tree_key(node_type: NodeType, key: &str) -> &str {
    if node_type == NodeType::Item && key == ITEM_IDENTIFIER_KEY {
        IDENTIFIER_ATTRIBUTE
    } else {
        key
    }
}

/// Deep-merge `source` into `target`
///
/// Objects present on both sides are merged recursively; any other value from
/// `source` replaces the one in `target`. Existing sibling keys are kept.
pub fn merge(target: &mut Map<String, Json>, source: Map<String, Json>) {
    for (key, value) in source {
        match value {
            Json::Object(incoming) => {
                if let Some(Json::Object(existing)) = target.get_mut(&key) {
                    merge(existing, incoming);
                    continue;
                }
                target.insert(key, Json::Object(incoming));
            }
            other => {
                target.insert(key, other);
            }
        }
    }
}

/// Wrap `leaf` in one object per path segment
fn nest(path: &[String], leaf: Map<String, Json>) -> Map<String, Json> {
    path.iter().rev().fold(leaf, |inner, key| {
        let mut outer = Map::new();
        outer.insert(key.clone(), Json::Object(inner));
        outer
    })
}

/// Project a decoded tree into its document form
pub fn project(tree: &MapTree) -> Document {
    let header = &tree.header;
    let mut doc = Map::new();
    doc.insert(IDENTIFIER_KEY.into(), header.identifier.into());
    doc.insert(MAP_VERSION_KEY.into(), header.map_version.into());
    doc.insert(MAP_WIDTH_KEY.into(), header.map_width.into());
    doc.insert(MAP_HEIGHT_KEY.into(), header.map_height.into());
    doc.insert(ITEMS_MAJOR_VERSION_KEY.into(), header.items_major_version.into());
    doc.insert(ITEMS_MINOR_VERSION_KEY.into(), header.items_minor_version.into());

    let mut path = Vec::new();
    project_node(&tree.root, &mut path, &mut doc);
    Document::from_map(doc)
}

fn project_node(node: &Node, path: &mut Vec<String>, doc: &mut Map<String, Json>) {
    path.push(node.segment());

    let mut fields = Map::new();
    positional_fields(&node.kind, &mut fields);
    for (key, value) in node.attributes.iter() {
        attribute_fields(node.node_type(), key, value, &mut fields);
    }
    merge(doc, nest(path, fields));

    for child in &node.children {
        project_node(child, path, doc);
    }
    path.pop();
}

fn insert_position(fields: &mut Map<String, Json>, position: &Position) {
    fields.insert("X".into(), position.x.into());
    fields.insert("Y".into(), position.y.into());
    fields.insert("Z".into(), position.z.into());
}

fn positional_fields(kind: &NodeKind, fields: &mut Map<String, Json>) {
    match kind {
        NodeKind::Map | NodeKind::Towns | NodeKind::Waypoints => {}
        NodeKind::TileArea { origin } => insert_position(fields, origin),
        NodeKind::Tile { x, y } => {
            fields.insert("X".into(), (*x).into());
            fields.insert("Y".into(), (*y).into());
        }
        NodeKind::Item { id } => {
            fields.insert("IDENTIFIER".into(), (*id).into());
        }
        NodeKind::Town { id, name, position } => {
            fields.insert("ID".into(), (*id).into());
            fields.insert("NAME".into(), name.clone().into());
            insert_position(fields, position);
        }
        NodeKind::HouseTile { x, y, house_id } => {
            fields.insert("X".into(), (*x).into());
            fields.insert("Y".into(), (*y).into());
            fields.insert("HOUSE_ID".into(), (*house_id).into());
        }
        NodeKind::Waypoint { name, position } => {
            fields.insert("NAME".into(), name.clone().into());
            insert_position(fields, position);
        }
        NodeKind::Unknown { tag, body } => {
            fields.insert("TYPE".into(), (*tag).into());
            fields.insert("BODY".into(), hex::encode(body).into());
        }
    }
}

fn attribute_fields(node_type: NodeType, key: &str, value: &Value, fields: &mut Map<String, Json>) {
    match value {
        Value::Int { value, width } => {
            fields.insert(document_key(node_type, key).into(), (*value).into());
            if key == IDENTIFIER_ATTRIBUTE && *width != IDENTIFIER_DEFAULT_WIDTH {
                fields.insert(IDENTIFIER_WIDTH_KEY.into(), (*width).into());
            }
        }
        Value::Text(text) => {
            fields.insert(key.into(), text.clone().into());
        }
        Value::Flags(flags) => {
            for (name, bit) in TileFlags::NAMED {
                fields.insert(name.into(), u8::from(flags.contains(bit)).into());
            }
            if flags.other_bits() != 0 {
                fields.insert(TileFlags::OTHER_KEY.into(), flags.other_bits().into());
            }
        }
        Value::Coords(position) => {
            fields.insert(format!("{}_X", key), position.x.into());
            fields.insert(format!("{}_Y", key), position.y.into());
            fields.insert(format!("{}_Z", key), position.z.into());
        }
        Value::Raw(bytes) => {
            fields.insert(key.into(), hex::encode(bytes).into());
        }
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> Error {
    Error::InvalidDocument {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Unsigned integer field that must fit in `T`
fn uint<T: TryFrom<u64>>(value: &Json, path: &str, key: &str) -> Result<T> {
    let number = value
        .as_u64()
        .ok_or_else(|| invalid(path, format!("{} must be an unsigned integer", key)))?;
    T::try_from(number).map_err(|_| invalid(path, format!("{} value {} is out of range", key, number)))
}

fn required<'a>(obj: &'a Map<String, Json>, path: &str, key: &str) -> Result<&'a Json> {
    obj.get(key)
        .ok_or_else(|| invalid(path, format!("missing {}", key)))
}

fn required_uint<T: TryFrom<u64>>(obj: &Map<String, Json>, path: &str, key: &str) -> Result<T> {
    uint(required(obj, path, key)?, path, key)
}

fn required_text(obj: &Map<String, Json>, path: &str, key: &str) -> Result<String> {
    required(obj, path, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(path, format!("{} must be a string", key)))
}

fn required_position(obj: &Map<String, Json>, path: &str) -> Result<Position> {
    Ok(Position {
        x: required_uint(obj, path, "X")?,
        y: required_uint(obj, path, "Y")?,
        z: required_uint(obj, path, "Z")?,
    })
}

/// Rebuild a typed tree from a document
pub fn lift(document: &Document) -> Result<MapTree> {
    let doc = document.as_map();
    let header = MapHeader {
        identifier: required_uint(doc, "", IDENTIFIER_KEY)?,
        map_version: required_uint(doc, "", MAP_VERSION_KEY)?,
        map_width: required_uint(doc, "", MAP_WIDTH_KEY)?,
        map_height: required_uint(doc, "", MAP_HEIGHT_KEY)?,
        items_major_version: required_uint(doc, "", ITEMS_MAJOR_VERSION_KEY)?,
        items_minor_version: required_uint(doc, "", ITEMS_MINOR_VERSION_KEY)?,
    };

    if let Some(key) = doc
        .keys()
        .find(|k| *k != MAP_KEY && !HEADER_KEYS.contains(&k.as_str()))
    {
        return Err(invalid("", format!("unexpected top-level key {}", key)));
    }

    let map = required(doc, "", MAP_KEY)?
        .as_object()
        .ok_or_else(|| invalid(MAP_KEY, "MAP must be an object"))?;
    let root = lift_node(NodeType::Map, 1, map, MAP_KEY)?;
    Ok(MapTree { header, root })
}

fn lift_node(
    node_type: NodeType,
    sibling_index: u32,
    obj: &Map<String, Json>,
    path: &str,
) -> Result<Node> {
    let kind = lift_kind(node_type, obj, path)?;
    let mut node = Node::new(kind, sibling_index);
    let positional = node_type.positional_keys();

    for (key, value) in obj {
        if positional.contains(&key.as_str()) {
            continue;
        }

        if let Json::Object(child) = value {
            let child_path = format!("{}/{}", path, key);
            let (child_type, index) = parse_segment(key)
                .filter(|(t, _)| *t != NodeType::Map)
                .ok_or_else(|| invalid(&child_path, "not a node key"))?;
            node.children
                .push(lift_node(child_type, index, child, &child_path)?);
            continue;
        }

        if !node_type.has_attribute_run() {
            return Err(invalid(
                path,
                format!("{} nodes carry no attribute {}", node_type.name(), key),
            ));
        }
        lift_attribute(&mut node.attributes, tree_key(node_type, key), value, path)?;
    }

    Ok(node)
}

fn lift_kind(node_type: NodeType, obj: &Map<String, Json>, path: &str) -> Result<NodeKind> {
    let kind = match node_type {
        NodeType::Map => NodeKind::Map,
        NodeType::TileArea => NodeKind::TileArea {
            origin: required_position(obj, path)?,
        },
        NodeType::Tile => NodeKind::Tile {
            x: required_uint(obj, path, "X")?,
            y: required_uint(obj, path, "Y")?,
        },
        NodeType::Item => NodeKind::Item {
            id: required_uint(obj, path, "IDENTIFIER")?,
        },
        NodeType::Towns => NodeKind::Towns,
        NodeType::Town => NodeKind::Town {
            id: required_uint(obj, path, "ID")?,
            name: required_text(obj, path, "NAME")?,
            position: required_position(obj, path)?,
        },
        NodeType::HouseTile => NodeKind::HouseTile {
            x: required_uint(obj, path, "X")?,
            y: required_uint(obj, path, "Y")?,
            house_id: required_uint(obj, path, "HOUSE_ID")?,
        },
        NodeType::Waypoints => NodeKind::Waypoints,
        NodeType::Waypoint => NodeKind::Waypoint {
            name: required_text(obj, path, "NAME")?,
            position: required_position(obj, path)?,
        },
        NodeType::Unknown => {
            let tag: u8 = required_uint(obj, path, "TYPE")?;
            if NodeType::from_tag(tag) != NodeType::Unknown {
                return Err(invalid(path, format!("TYPE 0x{:02x} is a known node type", tag)));
            }
            let body = required_text(obj, path, "BODY")?;
            NodeKind::Unknown {
                tag,
                body: hex::decode(&body).map_err(|e| invalid(path, format!("BODY: {}", e)))?,
            }
        }
    };
    Ok(kind)
}

/// Fold one document field back into the attribute set
///
/// Expanded fields (flag booleans, destination coordinates, identifier width)
/// update the single attribute they came from, which keeps its first position.
fn lift_attribute(attributes: &mut Attributes, key: &str, value: &Json, path: &str) -> Result<()> {
    if let Some((_, bit)) = TileFlags::NAMED.iter().find(|(name, _)| *name == key) {
        let enabled = uint::<u8>(value, path, key)? != 0;
        let mut flags = current_flags(attributes);
        flags.set(*bit, enabled);
        attributes.insert("TILE_FLAGS", Value::Flags(flags));
        return Ok(());
    }
    if key == TileFlags::OTHER_KEY {
        let mut flags = current_flags(attributes);
        flags.set_other_bits(uint(value, path, key)?);
        attributes.insert("TILE_FLAGS", Value::Flags(flags));
        return Ok(());
    }

    if let Some(axis) = key.strip_prefix("DESTINATION_") {
        let mut position = match attributes.get("DESTINATION") {
            Some(Value::Coords(position)) => *position,
            _ => Position::default(),
        };
        match axis {
            "X" => position.x = uint(value, path, key)?,
            "Y" => position.y = uint(value, path, key)?,
            "Z" => position.z = uint(value, path, key)?,
            _ => return Err(invalid(path, format!("unknown attribute {}", key))),
        }
        attributes.insert("DESTINATION", Value::Coords(position));
        return Ok(());
    }

    if key == IDENTIFIER_WIDTH_KEY {
        let new_width: u8 = uint(value, path, key)?;
        match attributes.get_mut(IDENTIFIER_ATTRIBUTE) {
            Some(Value::Int { width, .. }) => *width = new_width,
            _ => {
                attributes.insert(
                    IDENTIFIER_ATTRIBUTE,
                    Value::Int {
                        value: 0,
                        width: new_width,
                    },
                );
            }
        }
        return Ok(());
    }

    if key == UNPARSED_KEY {
        let text = value
            .as_str()
            .ok_or_else(|| invalid(path, "UNPARSED must be a hex string"))?;
        let bytes = hex::decode(text).map_err(|e| invalid(path, format!("UNPARSED: {}", e)))?;
        attributes.insert(key, Value::Raw(bytes));
        return Ok(());
    }

    let rule = rule_for_key(key).ok_or_else(|| invalid(path, format!("unknown attribute {}", key)))?;
    let lifted = match rule.field {
        Field::Text => Value::Text(
            value
                .as_str()
                .ok_or_else(|| invalid(path, format!("{} must be a string", key)))?
                .to_string(),
        ),
        Field::U8 => Value::u8(uint(value, path, key)?),
        Field::U16 => Value::u16(uint(value, path, key)?),
        Field::Remainder => {
            let width = match attributes.get(key) {
                Some(Value::Int { width, .. }) => *width,
                _ => IDENTIFIER_DEFAULT_WIDTH,
            };
            Value::Int {
                value: uint(value, path, key)?,
                width,
            }
        }
        Field::Flags | Field::Coords => {
            return Err(invalid(path, format!("{} is not a document field", key)));
        }
    };
    attributes.insert(key, lifted);
    Ok(())
}

fn current_flags(attributes: &Attributes) -> TileFlags {
    match attributes.get("TILE_FLAGS") {
        Some(Value::Flags(flags)) => *flags,
        _ => TileFlags::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_tree;
    use crate::fixture;
    use serde_json::json;

    fn object(value: Json) -> Map<String, Json> {
        match value {
            Json::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_merge_keeps_siblings() {
        let mut target = object(json!({
            "MAP": { "TILE_AREA_1": { "X": 1, "TILE_1": { "X": 0 } } }
        }));
        let source = object(json!({
            "MAP": { "TILE_AREA_1": { "Y": 2, "TILE_2": { "X": 1 } } }
        }));
        merge(&mut target, source);

        assert_eq!(
            Json::Object(target),
            json!({
                "MAP": {
                    "TILE_AREA_1": {
                        "X": 1,
                        "TILE_1": { "X": 0 },
                        "Y": 2,
                        "TILE_2": { "X": 1 }
                    }
                }
            })
        );
    }

    #[test]
    fn test_merge_prefers_source_leaf() {
        let mut target = object(json!({ "A": { "B": 1, "C": 2 } }));
        merge(&mut target, object(json!({ "A": { "B": 3 } })));
        assert_eq!(Json::Object(target), json!({ "A": { "B": 3, "C": 2 } }));
    }

    #[test]
    fn test_nest() {
        let path = vec!["MAP".to_string(), "TOWNS".to_string()];
        let nested = nest(&path, object(json!({ "X": 1 })));
        assert_eq!(Json::Object(nested), json!({ "MAP": { "TOWNS": { "X": 1 } } }));
    }

    #[test]
    fn test_project_sample_map() {
        let tree = decode_tree(&fixture::sample_map()).unwrap();
        let doc = project(&tree);

        assert_eq!(doc.identifier(), Some(1));
        assert_eq!(doc.map_width(), Some(100));

        assert_eq!(
            doc.get_path(&["MAP", "DESCRIPTION_2"]),
            Some(&json!("No description"))
        );
        assert_eq!(
            doc.get_path(&["MAP", "HOUSE_FILE"]),
            Some(&json!("map-house.xml"))
        );

        let tile = doc.get_path(&["MAP", "TILE_AREA_1", "TILE_1"]).unwrap();
        assert_eq!(tile["X"], json!(1));
        assert_eq!(tile["Y"], json!(2));
        assert_eq!(tile["PROTECTION_ZONE"], json!(1));
        assert_eq!(tile["NO_PVP"], json!(1));
        assert_eq!(tile["NO_LOGOUT"], json!(0));
        assert_eq!(tile["PVP_ZONE"], json!(0));
        assert!(tile.get("OTHER_FLAGS").is_none());

        let teleport = &tile["ITEM_2"];
        assert_eq!(teleport["IDENTIFIER"], json!(0x0583));
        assert_eq!(teleport["DESTINATION_X"], json!(1010));
        assert_eq!(teleport["DESTINATION_Y"], json!(1020));
        assert_eq!(teleport["DESTINATION_Z"], json!(6));

        let coins = doc
            .get_path(&["MAP", "TILE_AREA_1", "TILE_2", "ITEM_2"])
            .unwrap();
        assert_eq!(coins["COUNT"], json!(100));
        assert_eq!(coins["ACTION_ID"], json!(0xFF));
        assert_eq!(coins["UNIQUE_ID"], json!(1000));

        let house = doc.get_path(&["MAP", "TILE_AREA_1", "HOUSE_TILE_1"]).unwrap();
        assert_eq!(house["HOUSE_ID"], json!(12));
        assert_eq!(house["ITEM_1"]["HOUSE_DOOR_ID"], json!(3));

        assert_eq!(
            doc.get_path(&["MAP", "TOWNS", "TOWN_2", "NAME"]),
            Some(&json!("Carlin"))
        );
        assert_eq!(
            doc.get_path(&["MAP", "WAYPOINTS_1", "WAYPOINT_1", "NAME"]),
            Some(&json!("temple"))
        );
    }

    #[test]
    fn test_field_order() {
        let tree = decode_tree(&fixture::sample_map()).unwrap();
        let doc = project(&tree);
        let map = doc.map().unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "DESCRIPTION_1",
                "DESCRIPTION_2",
                "SPAWN_FILE",
                "HOUSE_FILE",
                "TILE_AREA_1",
                "TOWNS",
                "WAYPOINTS_1"
            ]
        );
    }

    #[test]
    fn test_empty_container_projects_to_object() {
        let data = fixture::MapBuilder::new(&fixture::header())
            .open(crate::node::tag::MAP)
            .open(crate::node::tag::TOWNS)
            .close()
            .close()
            .close()
            .finish();
        let doc = project(&decode_tree(&data).unwrap());
        assert_eq!(doc.get_path(&["MAP", "TOWNS"]), Some(&json!({})));
    }

    #[test]
    fn test_lift_inverts_project() {
        let tree = decode_tree(&fixture::sample_map()).unwrap();
        let lifted = lift(&project(&tree)).unwrap();
        assert_eq!(lifted, tree);
    }

    #[test]
    fn test_flag_and_width_extras() {
        let mut tile = Node::new(NodeKind::Tile { x: 0, y: 0 }, 1);
        tile.attributes
            .insert("TILE_FLAGS", Value::Flags(TileFlags(0x0000_0111)));
        let mut item = Node::new(NodeKind::Item { id: 1 }, 1);
        item.attributes.insert(
            "IDENTIFIER",
            Value::Int {
                value: 0x0A0B0C,
                width: 3,
            },
        );
        tile.children.push(item);
        let mut area = Node::new(
            NodeKind::TileArea {
                origin: Position::new(0, 0, 7),
            },
            1,
        );
        area.children.push(tile);
        let mut root = Node::new(NodeKind::Map, 1);
        root.children.push(area);
        let tree = MapTree {
            header: fixture::header(),
            root,
        };

        let doc = project(&tree);
        let tile = doc.get_path(&["MAP", "TILE_AREA_1", "TILE_1"]).unwrap();
        assert_eq!(tile["PROTECTION_ZONE"], json!(1));
        assert_eq!(tile["PVP_ZONE"], json!(1));
        assert_eq!(tile["OTHER_FLAGS"], json!(0x100));
        assert_eq!(tile["ITEM_1"]["IDENTIFIER"], json!(1));
        assert_eq!(tile["ITEM_1"]["ITEM_IDENTIFIER"], json!(0x0A0B0C));
        assert_eq!(tile["ITEM_1"]["IDENTIFIER_WIDTH"], json!(3));

        assert_eq!(lift(&doc).unwrap(), tree);
    }

    #[test]
    fn test_item_identifier_keys() {
        // Item id, then attribute 0x09 with its default width
        let body = [0x64, 0x00, crate::attributes::tag::IDENTIFIER, 0x34, 0x12];
        let data = fixture::single_item(&body);
        let tree = decode_tree(&data).unwrap();
        let doc = project(&tree);

        let item = doc
            .get_path(&["MAP", "TILE_AREA_1", "TILE_1", "ITEM_1"])
            .unwrap();
        assert_eq!(item, &json!({ "IDENTIFIER": 100, "ITEM_IDENTIFIER": 0x1234 }));
        assert_eq!(lift(&doc).unwrap(), tree);

        // Other nodes keep the plain key
        let mut tile = Node::new(NodeKind::Tile { x: 0, y: 0 }, 1);
        tile.attributes.insert("IDENTIFIER", Value::u16(7));
        let mut fields = Map::new();
        for (key, value) in tile.attributes.iter() {
            attribute_fields(tile.node_type(), key, value, &mut fields);
        }
        assert_eq!(Json::Object(fields), json!({ "IDENTIFIER": 7 }));

        let mut misplaced = doc.clone();
        misplaced.as_map_mut()["MAP"]["TILE_AREA_1"]["TILE_1"]
            .as_object_mut()
            .unwrap()
            .insert("ITEM_IDENTIFIER".into(), json!(1));
        assert!(matches!(lift(&misplaced), Err(Error::InvalidDocument { .. })));
    }

    #[test]
    fn test_lift_errors() {
        let doc = project(&decode_tree(&fixture::sample_map()).unwrap());

        let mut missing = doc.clone();
        missing.as_map_mut().remove("map_width");
        assert!(matches!(lift(&missing), Err(Error::InvalidDocument { .. })));

        let mut extra = doc.clone();
        extra.as_map_mut().insert("spawns".into(), json!(1));
        assert!(matches!(lift(&extra), Err(Error::InvalidDocument { .. })));

        let mut bad_child = doc.clone();
        bad_child.as_map_mut()["MAP"]
            .as_object_mut()
            .unwrap()
            .insert("FOO_1".into(), json!({}));
        assert!(matches!(lift(&bad_child), Err(Error::InvalidDocument { .. })));

        let mut bad_attr = doc.clone();
        bad_attr.as_map_mut()["MAP"]["TOWNS"]["TOWN_1"]
            .as_object_mut()
            .unwrap()
            .insert("COUNT".into(), json!(1));
        assert!(matches!(lift(&bad_attr), Err(Error::InvalidDocument { .. })));

        let mut too_wide = doc;
        too_wide.as_map_mut()["MAP"]["TILE_AREA_1"]["TILE_1"]
            .as_object_mut()
            .unwrap()
            .insert("X".into(), json!(300));
        assert!(matches!(lift(&too_wide), Err(Error::InvalidDocument { .. })));
    }
}
