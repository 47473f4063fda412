//! Tagged attribute runs
//!
//! An attribute run is a sequence of `[tag:u8][payload]` records inside a
//! node body. Payloads are fixed-width little-endian integers, u16
//! length-prefixed ASCII strings, a u32 flag set, or a coordinate triple.
//! A run is decoded record by record until the body is exhausted.

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::config::AttributePolicy;
use crate::node::{Attributes, Position, TileFlags, Value};
use crate::{Error, Result};

/// Attribute tags
pub mod tag {
    pub const DESCRIPTION: u8 = 0x01;
    pub const EXT_FILE: u8 = 0x02;
    pub const TILE_FLAGS: u8 = 0x03;
    pub const ACTION_ID: u8 = 0x04;
    pub const UNIQUE_ID: u8 = 0x05;
    pub const TEXT: u8 = 0x06;
    pub const TELEPORT_DEST: u8 = 0x08;
    pub const IDENTIFIER: u8 = 0x09;
    pub const DEPOT_ID: u8 = 0x0a;
    pub const EXT_SPAWN_FILE: u8 = 0x0b;
    pub const EXT_HOUSE_FILE: u8 = 0x0d;
    pub const HOUSEDOORID: u8 = 0x0e;
    pub const COUNT: u8 = 0x0f;
    pub const RUNE_CHARGES: u8 = 0x16;
}

/// Key holding undecoded bytes under [`AttributePolicy::Preserve`]
pub const UNPARSED_KEY: &str = "UNPARSED";

/// Description keys are numbered: `DESCRIPTION_1`, `DESCRIPTION_2`, ...
pub const DESCRIPTION_PREFIX: &str = "DESCRIPTION_";

/// Payload shape of an attribute record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Text,
    U8,
    U16,
    Flags,
    Coords,
    /// Integer spanning the rest of the run (1 to 4 bytes)
    Remainder,
}

/// One row of the attribute grammar
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub tag: u8,
    pub key: &'static str,
    pub field: Field,
}

/// Attribute grammar, keyed by tag on decode and by node-tree key on encode
#[rustfmt::skip]
pub const RULES: &[Rule] = &[
    Rule { tag: tag::DESCRIPTION, key: "DESCRIPTION", field: Field::Text },
    Rule { tag: tag::EXT_FILE, key: "EXT_FILE", field: Field::Text },
    Rule { tag: tag::TILE_FLAGS, key: "TILE_FLAGS", field: Field::Flags },
    Rule { tag: tag::ACTION_ID, key: "ACTION_ID", field: Field::U16 },
    Rule { tag: tag::UNIQUE_ID, key: "UNIQUE_ID", field: Field::U16 },
    Rule { tag: tag::TEXT, key: "TEXT", field: Field::Text },
    Rule { tag: tag::TELEPORT_DEST, key: "DESTINATION", field: Field::Coords },
    Rule { tag: tag::IDENTIFIER, key: "IDENTIFIER", field: Field::Remainder },
    Rule { tag: tag::DEPOT_ID, key: "DEPOT_ID", field: Field::U16 },
    Rule { tag: tag::EXT_SPAWN_FILE, key: "SPAWN_FILE", field: Field::Text },
    Rule { tag: tag::EXT_HOUSE_FILE, key: "HOUSE_FILE", field: Field::Text },
    Rule { tag: tag::HOUSEDOORID, key: "HOUSE_DOOR_ID", field: Field::U8 },
    Rule { tag: tag::COUNT, key: "COUNT", field: Field::U8 },
    Rule { tag: tag::RUNE_CHARGES, key: "RUNE_CHARGES", field: Field::U16 },
];

pub fn rule_for_tag(value: u8) -> Option<&'static Rule> {
    RULES.iter().find(|s| s.tag == value)
}

/// Look up the grammar row for a node-tree attribute key
pub fn rule_for_key(key: &str) -> Option<&'static Rule> {
    if key.starts_with(DESCRIPTION_PREFIX) {
        return rule_for_tag(tag::DESCRIPTION);
    }
    RULES
        .iter()
        .find(|s| s.key == key && s.tag != tag::DESCRIPTION)
}

/// Little-endian reader over an unescaped node body
pub(crate) struct BodyReader<'a> {
    cursor: Cursor<&'a [u8]>,
    path: &'a str,
}

impl<'a> BodyReader<'a> {
    pub fn new(body: &'a [u8], path: &'a str) -> Self {
        Self {
            cursor: Cursor::new(body),
            path,
        }
    }

    fn truncated(&self, field: &str) -> Error {
        Error::TruncatedField {
            path: self.path.to_string(),
            field: field.to_string(),
        }
    }

    pub fn u8(&mut self, field: &str) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.truncated(field))
    }

    pub fn u16(&mut self, field: &str) -> Result<u16> {
        self.cursor.read_u16::<LE>().map_err(|_| self.truncated(field))
    }

    pub fn u32(&mut self, field: &str) -> Result<u32> {
        self.cursor.read_u32::<LE>().map_err(|_| self.truncated(field))
    }

    pub fn position(&mut self, field: &str) -> Result<Position> {
        Ok(Position {
            x: self.u16(field)?,
            y: self.u16(field)?,
            z: self.u8(field)?,
        })
    }

    /// u16 length prefix followed by ASCII bytes
    pub fn string(&mut self, field: &str) -> Result<String> {
        let len = self.u16(field)? as usize;
        let rest = self.remaining();
        if rest.len() < len {
            return Err(self.truncated(field));
        }
        let bytes = &rest[..len];
        if !bytes.is_ascii() {
            return Err(Error::TextDecode {
                path: self.path.to_string(),
                field: field.to_string(),
            });
        }
        self.advance(len);
        Ok(bytes.iter().map(|&b| char::from(b)).collect())
    }

    pub fn remaining(&self) -> &'a [u8] {
        let data: &'a [u8] = *self.cursor.get_ref();
        let pos = (self.cursor.position() as usize).min(data.len());
        &data[pos..]
    }

    /// Consume and return everything left in the body
    pub fn take_rest(&mut self) -> &'a [u8] {
        let rest = self.remaining();
        self.advance(rest.len());
        rest
    }

    pub fn is_empty(&self) -> bool {
        self.remaining().is_empty()
    }

    fn advance(&mut self, count: usize) {
        let pos = self.cursor.position() + count as u64;
        self.cursor.set_position(pos);
    }
}

/// Per-decode attribute state shared across nodes
pub(crate) struct RunContext<'a> {
    pub path: &'a str,
    /// Raw offset of the owning node, for error reports
    pub offset: u64,
    pub policy: AttributePolicy,
    /// Decode-global description counter
    pub descriptions: &'a mut u32,
}

/// Decode an attribute run into `attributes`
///
/// Every record is followed by the next one until the body ends. Keys written
/// twice overwrite the earlier value in place.
pub(crate) fn decode_run(
    reader: &mut BodyReader<'_>,
    attributes: &mut Attributes,
    ctx: &mut RunContext<'_>,
) -> Result<()> {
    while !reader.is_empty() {
        let record = reader.remaining();
        let value = reader.u8("attribute tag")?;

        let Some(rule) = rule_for_tag(value) else {
            match ctx.policy {
                AttributePolicy::Strict => {
                    return Err(Error::UnknownAttributeTag {
                        tag: value,
                        path: ctx.path.to_string(),
                        offset: ctx.offset,
                    });
                }
                AttributePolicy::Preserve => {
                    tracing::warn!(
                        path = ctx.path,
                        tag = value,
                        bytes = record.len(),
                        "preserving undecoded attribute bytes"
                    );
                    reader.take_rest();
                    attributes.insert(UNPARSED_KEY, Value::Raw(record.to_vec()));
                    return Ok(());
                }
            }
        };

        let decoded = match rule.field {
            Field::Text => Value::Text(reader.string(rule.key)?),
            Field::U8 => Value::u8(reader.u8(rule.key)?),
            Field::U16 => Value::u16(reader.u16(rule.key)?),
            Field::Flags => Value::Flags(TileFlags(reader.u32(rule.key)?)),
            Field::Coords => Value::Coords(reader.position(rule.key)?),
            Field::Remainder => remainder_int(reader.take_rest(), rule.key, ctx.path)?,
        };

        if rule.tag == tag::DESCRIPTION {
            *ctx.descriptions += 1;
            let key = format!("{}{}", DESCRIPTION_PREFIX, ctx.descriptions);
            attributes.insert(key, decoded);
        } else {
            attributes.insert(rule.key, decoded);
        }
    }

    Ok(())
}

fn remainder_int(bytes: &[u8], field: &str, path: &str) -> Result<Value> {
    match bytes.len() {
        0 => Err(Error::TruncatedField {
            path: path.to_string(),
            field: field.to_string(),
        }),
        1..=4 => {
            let value = bytes
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
            Ok(Value::Int {
                value,
                width: bytes.len() as u8,
            })
        }
        n => Err(Error::TrailingBytes {
            path: path.to_string(),
            count: n - 4,
        }),
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> Error {
    Error::InvalidDocument {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Append a u16 length-prefixed ASCII string
pub(crate) fn write_string(buf: &mut Vec<u8>, text: &str, path: &str, field: &str) -> Result<()> {
    if !text.is_ascii() {
        return Err(invalid(path, format!("{} is not ASCII", field)));
    }
    let len = u16::try_from(text.len())
        .map_err(|_| invalid(path, format!("{} is longer than 65535 bytes", field)))?;
    buf.write_u16::<LE>(len)?;
    buf.extend_from_slice(text.as_bytes());
    Ok(())
}

pub(crate) fn write_position(buf: &mut Vec<u8>, position: &Position) -> Result<()> {
    buf.write_u16::<LE>(position.x)?;
    buf.write_u16::<LE>(position.y)?;
    buf.write_u8(position.z)?;
    Ok(())
}

fn int_of(value: &Value, key: &str, path: &str) -> Result<u32> {
    value
        .as_int()
        .ok_or_else(|| invalid(path, format!("{} must be an integer", key)))
}

fn narrow<T: TryFrom<u32>>(value: u32, key: &str, path: &str) -> Result<T> {
    T::try_from(value).map_err(|_| invalid(path, format!("{} value {} is out of range", key, value)))
}

/// Encode an attribute set back into its run, in insertion order
pub fn encode_run(attributes: &Attributes, buf: &mut Vec<u8>, path: &str) -> Result<()> {
    for (key, value) in attributes.iter() {
        if key == UNPARSED_KEY {
            match value {
                Value::Raw(bytes) => buf.extend_from_slice(bytes),
                _ => return Err(invalid(path, "UNPARSED must hold raw bytes")),
            }
            continue;
        }

        let rule = rule_for_key(key)
            .ok_or_else(|| invalid(path, format!("unknown attribute {}", key)))?;
        buf.write_u8(rule.tag)?;

        match (rule.field, value) {
            (Field::Text, Value::Text(text)) => write_string(buf, text, path, key)?,
            (Field::U8, v) => buf.write_u8(narrow(int_of(v, key, path)?, key, path)?)?,
            (Field::U16, v) => buf.write_u16::<LE>(narrow(int_of(v, key, path)?, key, path)?)?,
            (Field::Flags, Value::Flags(flags)) => buf.write_u32::<LE>(flags.bits())?,
            (Field::Coords, Value::Coords(position)) => write_position(buf, position)?,
            (Field::Remainder, Value::Int { value, width }) => {
                if !(1..=4).contains(width) {
                    return Err(invalid(path, format!("{} width {} is not 1-4", key, width)));
                }
                if *width < 4 && *value >> (u32::from(*width) * 8) != 0 {
                    return Err(invalid(path, format!("{} does not fit {} bytes", key, width)));
                }
                buf.extend_from_slice(&value.to_le_bytes()[..usize::from(*width)]);
            }
            (field, _) => {
                return Err(invalid(path, format!("{} must be {:?}", key, field)));
            }
        }
    }

    Ok(())
}
