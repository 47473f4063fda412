//! Node tree encoder
//!
//! Re-emits the OTBM byte layout from a [`MapTree`]: markers and type bytes
//! raw, every body byte escaped. Bodies are always written before children.

use byteorder::{LittleEndian as LE, WriteBytesExt};
use std::io::Write;

use crate::attributes::{encode_run, write_position, write_string};
use crate::document::Document;
use crate::node::{MapTree, Node, NodeKind};
use crate::projection::lift;
use crate::stream::write_escaped;
use crate::{Error, Result, HEADER_SIZE, NODE_END, NODE_START, ROOT_NODE_TYPE};

/// Encoder for OTBM byte streams
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    /// Write a complete map to `writer`
    pub fn encode_tree<W: Write>(&self, tree: &MapTree, writer: &mut W) -> Result<()> {
        let header = &tree.header;
        writer.write_u32::<LE>(header.identifier)?;
        writer.write_all(&[NODE_START, ROOT_NODE_TYPE])?;

        let mut fields = Vec::with_capacity(HEADER_SIZE);
        fields.write_u32::<LE>(header.map_version)?;
        fields.write_u16::<LE>(header.map_width)?;
        fields.write_u16::<LE>(header.map_height)?;
        fields.write_u32::<LE>(header.items_major_version)?;
        fields.write_u32::<LE>(header.items_minor_version)?;
        write_escaped(writer, &fields)?;

        self.encode_node(&tree.root, "", writer)?;
        writer.write_u8(NODE_END)?;
        Ok(())
    }

    /// Lift a document back into a tree and write it
    pub fn encode_document<W: Write>(&self, document: &Document, writer: &mut W) -> Result<()> {
        let tree = lift(document)?;
        self.encode_tree(&tree, writer)
    }

    fn encode_node<W: Write>(&self, node: &Node, parent: &str, writer: &mut W) -> Result<()> {
        let path = if parent.is_empty() {
            node.segment()
        } else {
            format!("{}/{}", parent, node.segment())
        };

        let mut body = Vec::new();
        encode_positional(&node.kind, &mut body, &path)?;
        if node.node_type().has_attribute_run() {
            encode_run(&node.attributes, &mut body, &path)?;
        } else if !node.attributes.is_empty() {
            return Err(Error::InvalidDocument {
                path,
                reason: format!("{} nodes carry no attributes", node.node_type().name()),
            });
        }

        tracing::trace!(%path, body = body.len(), children = node.children.len(), "encode node");
        writer.write_all(&[NODE_START, node.kind.tag()])?;
        write_escaped(writer, &body)?;
        for child in &node.children {
            self.encode_node(child, &path, writer)?;
        }
        writer.write_u8(NODE_END)?;
        Ok(())
    }
}

/// Unescaped positional fields, in wire order
fn encode_positional(kind: &NodeKind, body: &mut Vec<u8>, path: &str) -> Result<()> {
    match kind {
        NodeKind::Map | NodeKind::Towns | NodeKind::Waypoints => {}
        NodeKind::TileArea { origin } => write_position(body, origin)?,
        NodeKind::Tile { x, y } => body.extend_from_slice(&[*x, *y]),
        NodeKind::Item { id } => body.write_u16::<LE>(*id)?,
        NodeKind::Town { id, name, position } => {
            body.write_u32::<LE>(*id)?;
            write_string(body, name, path, "NAME")?;
            write_position(body, position)?;
        }
        NodeKind::HouseTile { x, y, house_id } => {
            body.extend_from_slice(&[*x, *y]);
            body.write_u32::<LE>(*house_id)?;
        }
        NodeKind::Waypoint { name, position } => {
            write_string(body, name, path, "NAME")?;
            write_position(body, position)?;
        }
        NodeKind::Unknown { body: raw, .. } => body.extend_from_slice(raw),
    }
    Ok(())
}

/// Encode a tree into an in-memory byte buffer
pub fn encode_tree(tree: &MapTree) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    Encoder.encode_tree(tree, &mut out)?;
    Ok(out)
}
