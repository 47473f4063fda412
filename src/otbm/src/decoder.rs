//! Node tree decoder
//!
//! Drives the escape-aware byte stream, tracks the open-node path and the
//! sibling counters, and turns each node body into a typed [`NodeKind`] plus
//! its attribute run. A body is decoded when its first child opens, or at
//! its end marker for leaf nodes, so attribute records are seen in stream
//! order.

use byteorder::{ByteOrder, LE};
use std::collections::HashMap;
use std::io::Read;

use crate::attributes::{decode_run, BodyReader, RunContext};
use crate::config::{CodecOptions, NodePolicy};
use crate::node::{segment, MapHeader, MapTree, Node, NodeKind, NodeType};
use crate::stream::{ByteStream, Token};
use crate::{Error, Result, HEADER_SIZE, NODE_START, ROOT_NODE_TYPE};

/// Node currently open on the path
struct Frame {
    node_type: NodeType,
    tag: u8,
    sibling_index: u32,
    segment: String,
    /// Raw offset of the `0xFE` that opened the node
    offset: u64,
    /// Body bytes not yet decoded
    pending: Vec<u8>,
    /// Decoded form, once the first child has opened
    node: Option<Node>,
    children: Vec<Node>,
}

/// Mutable state of one decode call
#[derive(Default)]
pub struct DecoderState {
    counters: HashMap<NodeType, u32>,
    descriptions: u32,
    path: Vec<Frame>,
}

impl DecoderState {
    /// Next 1-based index for `node_type`
    ///
    /// Items are numbered per tile: entering a tile or house tile restarts them.
    fn next_index(&mut self, node_type: NodeType) -> u32 {
        if matches!(node_type, NodeType::Tile | NodeType::HouseTile) {
            self.counters.insert(NodeType::Item, 0);
        }
        let counter = self.counters.entry(node_type).or_insert(0);
        *counter += 1;
        *counter
    }

    /// `/`-joined segments of the open path
    pub fn path_string(&self) -> String {
        if self.path.is_empty() {
            return "ROOT".to_string();
        }
        self.path
            .iter()
            .map(|f| f.segment.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Decoder for OTBM byte streams
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    options: CodecOptions,
}

impl Decoder {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Decode a complete map from `reader`
    pub fn decode_tree<R: Read>(&self, reader: R) -> Result<MapTree> {
        let mut stream = ByteStream::new(reader);
        let header = read_header(&mut stream)?;
        tracing::debug!(?header, "read map header");

        let mut state = DecoderState::default();
        let mut map: Option<Node> = None;

        loop {
            let offset = stream.offset();
            match stream.next_token()? {
                None => {
                    return Err(Error::UnterminatedNode {
                        path: state.path_string(),
                        offset,
                    });
                }
                Some(Token::Start) => {
                    let value = stream.try_next_byte()?.ok_or_else(|| Error::UnterminatedNode {
                        path: state.path_string(),
                        offset: stream.offset(),
                    })?;
                    self.open(&mut state, value, offset, map.is_some())?;
                }
                Some(Token::End) => {
                    let Some(frame) = state.path.pop() else {
                        // Root node closed
                        break;
                    };
                    let node = self.close(frame, &mut state)?;
                    match state.path.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => map = Some(node),
                    }
                }
                Some(Token::Data(byte)) => match state.path.last_mut() {
                    Some(frame) => frame.pending.push(byte),
                    None => {
                        return Err(Error::TrailingBytes {
                            path: state.path_string(),
                            count: 1,
                        });
                    }
                },
            }
        }

        let mut trailing = 0;
        while stream.try_next_byte()?.is_some() {
            trailing += 1;
        }
        if trailing > 0 {
            return Err(Error::TrailingBytes {
                path: "end of file".to_string(),
                count: trailing,
            });
        }

        let root = map.ok_or(Error::MissingMapNode)?;
        tracing::debug!(bytes = stream.offset(), "decoded node tree");
        Ok(MapTree { header, root })
    }

    fn open(&self, state: &mut DecoderState, value: u8, offset: u64, has_map: bool) -> Result<()> {
        let node_type = NodeType::from_tag(value);
        let at_root = state.path.is_empty();

        // The MAP node is the single child of the root, and only MAP lives there
        if (node_type == NodeType::Map) != at_root || (at_root && has_map) {
            return Err(Error::UnexpectedNode {
                found: node_type_label(node_type, value),
                path: state.path_string(),
                offset,
            });
        }

        if node_type == NodeType::Unknown {
            match self.options.unknown_nodes {
                NodePolicy::Reject => {
                    return Err(Error::UnknownNodeType { tag: value, offset });
                }
                NodePolicy::PassThrough => {
                    tracing::warn!(
                        tag = value,
                        offset,
                        path = %state.path_string(),
                        "passing through unknown node type"
                    );
                }
            }
        }

        // The parent's body is complete once its first child starts
        if !at_root {
            let path = state.path_string();
            if let Some(parent) = state.path.last_mut() {
                let node = self.flush(parent, &path, &mut state.descriptions)?;
                parent.node = Some(node);
            }
        }

        let sibling_index = state.next_index(node_type);
        let segment = segment(node_type, sibling_index);
        tracing::trace!(%segment, offset, depth = state.depth(), "open node");

        state.path.push(Frame {
            node_type,
            tag: value,
            sibling_index,
            segment,
            offset,
            pending: Vec::new(),
            node: None,
            children: Vec::new(),
        });
        Ok(())
    }

    fn close(&self, mut frame: Frame, state: &mut DecoderState) -> Result<Node> {
        let path = if state.path.is_empty() {
            frame.segment.clone()
        } else {
            format!("{}/{}", state.path_string(), frame.segment)
        };
        tracing::trace!(%path, children = frame.children.len(), "close node");

        let mut node = self.flush(&mut frame, &path, &mut state.descriptions)?;
        node.children = frame.children;
        Ok(node)
    }

    /// Decode the pending body bytes of `frame`
    ///
    /// The first flush reads the positional fields and the attribute run. Bytes
    /// that follow a child continue the attribute run; node types without one
    /// reject them.
    fn flush(&self, frame: &mut Frame, path: &str, descriptions: &mut u32) -> Result<Node> {
        let body = std::mem::take(&mut frame.pending);
        let mut reader = BodyReader::new(&body, path);
        let mut node = match frame.node.take() {
            Some(node) => node,
            None => Node::new(
                decode_kind(frame.node_type, frame.tag, &mut reader)?,
                frame.sibling_index,
            ),
        };

        if frame.node_type.has_attribute_run() {
            let mut ctx = RunContext {
                path,
                offset: frame.offset,
                policy: self.options.unknown_attributes,
                descriptions,
            };
            decode_run(&mut reader, &mut node.attributes, &mut ctx)?;
        } else if !reader.is_empty() {
            return Err(Error::TrailingBytes {
                path: path.to_string(),
                count: reader.remaining().len(),
            });
        }

        Ok(node)
    }
}

/// Read the positional fields of a node body
fn decode_kind(node_type: NodeType, value: u8, reader: &mut BodyReader<'_>) -> Result<NodeKind> {
    let kind = match node_type {
        NodeType::Map => NodeKind::Map,
        NodeType::TileArea => NodeKind::TileArea {
            origin: reader.position("POSITION")?,
        },
        NodeType::Tile => NodeKind::Tile {
            x: reader.u8("X")?,
            y: reader.u8("Y")?,
        },
        NodeType::Item => NodeKind::Item {
            id: reader.u16("IDENTIFIER")?,
        },
        NodeType::Towns => NodeKind::Towns,
        NodeType::Town => NodeKind::Town {
            id: reader.u32("ID")?,
            name: reader.string("NAME")?,
            position: reader.position("POSITION")?,
        },
        NodeType::HouseTile => NodeKind::HouseTile {
            x: reader.u8("X")?,
            y: reader.u8("Y")?,
            house_id: reader.u32("HOUSE_ID")?,
        },
        NodeType::Waypoints => NodeKind::Waypoints,
        NodeType::Waypoint => NodeKind::Waypoint {
            name: reader.string("NAME")?,
            position: reader.position("POSITION")?,
        },
        NodeType::Unknown => NodeKind::Unknown {
            tag: value,
            body: reader.take_rest().to_vec(),
        },
    };
    Ok(kind)
}

fn node_type_label(node_type: NodeType, value: u8) -> String {
    match node_type {
        NodeType::Unknown => format!("unknown (0x{:02x})", value),
        known => known.name().to_string(),
    }
}

/// Read the identifier and the root node's header fields
fn read_header<R: Read>(stream: &mut ByteStream<R>) -> Result<MapHeader> {
    let mut identifier = [0u8; 4];
    for byte in identifier.iter_mut() {
        *byte = stream.next_byte()?;
    }

    let start = stream.next_byte()?;
    let root_type = stream.next_byte()?;
    if start != NODE_START || root_type != ROOT_NODE_TYPE {
        return Err(Error::InvalidHeader(format!(
            "expected root node 0xfe 0x00, got 0x{:02x} 0x{:02x}",
            start, root_type
        )));
    }

    let mut fields = [0u8; HEADER_SIZE];
    for byte in fields.iter_mut() {
        match stream.next_token()? {
            Some(Token::Data(value)) => *byte = value,
            Some(marker) => {
                return Err(Error::InvalidHeader(format!(
                    "{:?} marker inside header fields at offset {}",
                    marker,
                    stream.offset() - 1
                )));
            }
            None => {
                return Err(Error::EndOfStream {
                    offset: stream.offset(),
                })
            }
        }
    }

    Ok(MapHeader {
        identifier: LE::read_u32(&identifier),
        map_version: LE::read_u32(&fields[0..4]),
        map_width: LE::read_u16(&fields[4..6]),
        map_height: LE::read_u16(&fields[6..8]),
        items_major_version: LE::read_u32(&fields[8..12]),
        items_minor_version: LE::read_u32(&fields[12..16]),
    })
}

/// Decode a map from an in-memory byte slice with default options
pub fn decode_tree(data: &[u8]) -> Result<MapTree> {
    Decoder::default().decode_tree(data)
}
