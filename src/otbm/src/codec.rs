//! File-level entry points
//!
//! [`Codec`] validates paths, then drives the decoder and projection (or the
//! lift and encoder). Output files are written to a temporary sibling and
//! renamed into place, so a failed encode never leaves a partial file.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::config::CodecOptions;
use crate::decoder::Decoder;
use crate::document::Document;
use crate::encoder::Encoder;
use crate::projection::project;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Codec {
    options: CodecOptions,
}

impl Codec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    fn decoder(&self) -> Decoder {
        Decoder::new(self.options.clone())
    }

    /// Decode an `.otbm` file into its document
    pub fn decode(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        check_input(path, &self.options.map_extension)?;
        tracing::debug!(path = %path.display(), "decoding map");

        let reader = BufReader::new(File::open(path)?);
        let tree = self.decoder().decode_tree(reader)?;
        let document = project(&tree);

        tracing::debug!(
            path = %path.display(),
            nodes = tree.nodes().count(),
            "decoded map"
        );
        Ok(document)
    }

    /// Decode an in-memory map
    pub fn decode_bytes(&self, data: &[u8]) -> Result<Document> {
        let tree = self.decoder().decode_tree(data)?;
        Ok(project(&tree))
    }

    /// Encode a document into map bytes
    pub fn encode_bytes(&self, document: &Document) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        Encoder::new().encode_document(document, &mut out)?;
        Ok(out)
    }

    /// Encode a document and write it to an `.otbm` file
    pub fn encode(&self, document: &Document, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        check_extension(path, &self.options.map_extension)?;

        let data = self.encode_bytes(document)?;
        write_file(path, &data)?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "encoded map");
        Ok(())
    }

    /// Convert an `.otbm` file into a `.json` document file
    pub fn map_to_json(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<Document> {
        let output = output.as_ref();
        check_extension(output, &self.options.document_extension)?;

        let document = self.decode(input)?;
        let text = document.to_json_string(self.options.json_indent)?;
        write_file(output, text.as_bytes())?;
        tracing::debug!(path = %output.display(), bytes = text.len(), "wrote document");
        Ok(document)
    }

    /// Convert a `.json` document file back into an `.otbm` file
    pub fn json_to_map(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<()> {
        let input = input.as_ref();
        check_input(input, &self.options.document_extension)?;

        let document = Document::read_json(BufReader::new(File::open(input)?))?;
        self.encode(&document, output)
    }
}

/// Decode `path` with default options
pub fn decode(path: impl AsRef<Path>) -> Result<Document> {
    Codec::default().decode(path)
}

/// Encode `document` to `path` with default options
pub fn encode(document: &Document, path: impl AsRef<Path>) -> Result<()> {
    Codec::default().encode(document, path)
}

fn check_extension(path: &Path, expected: &str) -> Result<()> {
    let matches = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(expected));
    if !matches {
        return Err(Error::InvalidExtension {
            path: path.to_path_buf(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Existence first, then extension
fn check_input(path: &Path, expected: &str) -> Result<()> {
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    check_extension(path, expected)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `data` to `path` via a temporary file, creating parent directories
fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_path(path);
    let result = fs::write(&temp, data).and_then(|()| fs::rename(&temp, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}
