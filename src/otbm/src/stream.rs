//! Escape-aware byte stream
//!
//! Splits a raw OTBM byte source into structural markers and literal data.
//! Inside node bodies `0xFD` marks the following byte as data, which is how
//! values equal to `0xFD`, `0xFE` or `0xFF` are carried. This layer knows
//! nothing about node types or attributes.

use byteorder::ReadBytesExt;
use std::io::{self, Read, Write};

use crate::{Error, Result, ESCAPE, NODE_END, NODE_START};

/// One logical unit of the node stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `0xFE` node start marker
    Start,
    /// `0xFF` node end marker
    End,
    /// Literal body byte (already unescaped)
    Data(u8),
}

/// Forward-only cursor over a raw byte source
pub struct ByteStream<R> {
    reader: R,
    offset: u64,
}

impl<R: Read> ByteStream<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Number of raw bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Pull one raw byte, `None` at end of input
    pub fn try_next_byte(&mut self) -> Result<Option<u8>> {
        match self.reader.read_u8() {
            Ok(byte) => {
                self.offset += 1;
                Ok(Some(byte))
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Pull one raw byte, failing with `EndOfStream` at end of input
    pub fn next_byte(&mut self) -> Result<u8> {
        self.try_next_byte()?.ok_or(Error::EndOfStream {
            offset: self.offset,
        })
    }

    /// Pull the next marker or unescaped data byte
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        let Some(byte) = self.try_next_byte()? else {
            return Ok(None);
        };

        let token = match byte {
            NODE_START => Token::Start,
            NODE_END => Token::End,
            ESCAPE => {
                let escape_offset = self.offset - 1;
                match self.try_next_byte()? {
                    Some(literal) => Token::Data(literal),
                    None => {
                        return Err(Error::TruncatedEscape {
                            offset: escape_offset,
                        })
                    }
                }
            }
            other => Token::Data(other),
        };

        Ok(Some(token))
    }
}

/// Whether a body byte collides with a marker and must be escaped
#[inline]
pub fn needs_escape(byte: u8) -> bool {
    matches!(byte, ESCAPE | NODE_START | NODE_END)
}

/// Write body bytes, prefixing every marker-valued byte with `0xFD`
pub fn write_escaped<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let mut run_start = 0;
    for (i, &byte) in data.iter().enumerate() {
        if needs_escape(byte) {
            writer.write_all(&data[run_start..i])?;
            writer.write_all(&[ESCAPE, byte])?;
            run_start = i + 1;
        }
    }
    writer.write_all(&data[run_start..])
}
