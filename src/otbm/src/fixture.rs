//! Hand-built OTBM byte fixtures for tests

use crate::attributes::tag as attr;
use crate::node::{tag, MapHeader};
use crate::stream::write_escaped;
use crate::{NODE_END, NODE_START, ROOT_NODE_TYPE};

/// Writes raw OTBM bytes; bodies are escaped, markers are not
pub(crate) struct MapBuilder {
    out: Vec<u8>,
}

impl MapBuilder {
    /// Identifier, root node start and escaped header fields
    pub fn new(header: &MapHeader) -> Self {
        let mut out = header.identifier.to_le_bytes().to_vec();
        out.extend_from_slice(&[NODE_START, ROOT_NODE_TYPE]);

        let mut fields = Vec::new();
        fields.extend_from_slice(&header.map_version.to_le_bytes());
        fields.extend_from_slice(&header.map_width.to_le_bytes());
        fields.extend_from_slice(&header.map_height.to_le_bytes());
        fields.extend_from_slice(&header.items_major_version.to_le_bytes());
        fields.extend_from_slice(&header.items_minor_version.to_le_bytes());
        write_escaped(&mut out, &fields).unwrap();

        Self { out }
    }

    pub fn open(mut self, value: u8) -> Self {
        self.out.extend_from_slice(&[NODE_START, value]);
        self
    }

    pub fn body(mut self, bytes: &[u8]) -> Self {
        write_escaped(&mut self.out, bytes).unwrap();
        self
    }

    pub fn close(mut self) -> Self {
        self.out.push(NODE_END);
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.out.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }
}

/// identifier=1, version=2, 100x100, items 3.1
pub(crate) fn header() -> MapHeader {
    MapHeader {
        identifier: 1,
        map_version: 2,
        map_width: 100,
        map_height: 100,
        items_major_version: 3,
        items_minor_version: 1,
    }
}

pub(crate) fn position(x: u16, y: u16, z: u8) -> Vec<u8> {
    let mut out = x.to_le_bytes().to_vec();
    out.extend_from_slice(&y.to_le_bytes());
    out.push(z);
    out
}

/// u16 length prefix plus bytes
pub(crate) fn string(text: &str) -> Vec<u8> {
    let mut out = (text.len() as u16).to_le_bytes().to_vec();
    out.extend_from_slice(text.as_bytes());
    out
}

pub(crate) fn text_attr(value: u8, text: &str) -> Vec<u8> {
    let mut out = vec![value];
    out.extend(string(text));
    out
}

/// MAP > TILE_AREA > TILE > ITEM with the given item body
pub(crate) fn single_item(item_body: &[u8]) -> Vec<u8> {
    MapBuilder::new(&header())
        .open(tag::MAP)
        .open(tag::TILE_AREA)
        .body(&position(1000, 1000, 7))
        .open(tag::TILE)
        .body(&[0, 0])
        .open(tag::ITEM)
        .body(item_body)
        .close()
        .close()
        .close()
        .close()
        .close()
        .finish()
}

/// A small but complete map exercising every node type and most attributes
pub(crate) fn sample_map() -> Vec<u8> {
    let mut map_attrs = text_attr(attr::DESCRIPTION, "Saved with Remere's Map Editor");
    map_attrs.extend(text_attr(attr::DESCRIPTION, "No description"));
    map_attrs.extend(text_attr(attr::EXT_SPAWN_FILE, "map-spawn.xml"));
    map_attrs.extend(text_attr(attr::EXT_HOUSE_FILE, "map-house.xml"));

    // Area y=254 puts a 0xFE byte in the body
    let area = position(1000, 254, 7);

    let mut teleport = vec![0x83, 0x05];
    teleport.push(attr::TELEPORT_DEST);
    teleport.extend(position(1010, 1020, 6));

    let mut sign = vec![0xD1, 0x05];
    sign.extend(text_attr(attr::TEXT, "Welcome to Thais"));

    // Action id 0x00FF needs an escape
    #[rustfmt::skip]
    let coins = [
        0xD7, 0x0B, attr::COUNT, 100, attr::ACTION_ID, 0xFF, 0x00, attr::UNIQUE_ID, 0xE8,
        0x03,
    ];

    let mut town_thais = 1u32.to_le_bytes().to_vec();
    town_thais.extend(string("Thais"));
    town_thais.extend(position(1000, 1000, 7));

    let mut town_carlin = 2u32.to_le_bytes().to_vec();
    town_carlin.extend(string("Carlin"));
    town_carlin.extend(position(900, 800, 7));

    let mut waypoint = string("temple");
    waypoint.extend(position(1000, 1000, 7));

    let mut house_tile = vec![7, 8];
    house_tile.extend(12u32.to_le_bytes());

    MapBuilder::new(&header())
        .open(tag::MAP)
        .body(&map_attrs)
        .open(tag::TILE_AREA)
        .body(&area)
        // TILE_1: flags, ground + teleport
        .open(tag::TILE)
        .body(&[1, 2, attr::TILE_FLAGS, 0x05, 0x00, 0x00, 0x00])
        .open(tag::ITEM)
        .body(&[0x66, 0x00])
        .close()
        .open(tag::ITEM)
        .body(&teleport)
        .close()
        .close()
        // TILE_2: sign + coins
        .open(tag::TILE)
        .body(&[3, 4])
        .open(tag::ITEM)
        .body(&sign)
        .close()
        .open(tag::ITEM)
        .body(&coins)
        .close()
        .close()
        // TILE_3: item id 0xFEFD needs two escapes
        .open(tag::TILE)
        .body(&[5, 6])
        .open(tag::ITEM)
        .body(&[0xFD, 0xFE])
        .close()
        .close()
        .open(tag::HOUSE_TILE)
        .body(&house_tile)
        .open(tag::ITEM)
        .body(&[0xB9, 0x04, attr::HOUSEDOORID, 3])
        .close()
        .close()
        .close()
        .open(tag::TOWNS)
        .open(tag::TOWN)
        .body(&town_thais)
        .close()
        .open(tag::TOWN)
        .body(&town_carlin)
        .close()
        .close()
        .open(tag::WAYPOINTS)
        .open(tag::WAYPOINT)
        .body(&waypoint)
        .close()
        .close()
        .close()
        .close()
        .finish()
}
