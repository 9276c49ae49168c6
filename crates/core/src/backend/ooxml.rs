//! Reading parts out of Office Open XML packages.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::engine::ConversionError;

pub(crate) const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(crate) const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub(crate) const S_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub(crate) const R_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// An opened OOXML package.
pub(crate) struct Package {
    archive: ZipArchive<BufReader<File>>,
}

impl Package {
    /// Opens a package; a broken container is reported as corrupt input.
    pub fn open(path: &Path) -> Result<Self, ConversionError> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| ConversionError::corrupt(format!("not a valid package: {}", e)))?;
        Ok(Self { archive })
    }

    pub fn names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Reads a part as UTF-8 text, or `None` when it is absent.
    pub fn text(&mut self, name: &str) -> Result<Option<String>, ConversionError> {
        match self.archive.by_name(name) {
            Ok(mut entry) => {
                let mut text = String::new();
                entry
                    .read_to_string(&mut text)
                    .map_err(|e| ConversionError::corrupt(format!("unreadable part {}: {}", name, e)))?;
                Ok(Some(text))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(ConversionError::corrupt(format!(
                "unreadable part {}: {}",
                name, e
            ))),
        }
    }

    /// Reads a part that must exist.
    pub fn required_text(&mut self, name: &str) -> Result<String, ConversionError> {
        self.text(name)?
            .ok_or_else(|| ConversionError::corrupt(format!("missing part {}", name)))
    }

    /// Reads a part as raw bytes.
    pub fn bytes(&mut self, name: &str) -> Result<Vec<u8>, ConversionError> {
        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|e| ConversionError::corrupt(format!("unreadable part {}: {}", name, e)))?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Parses XML, reporting malformed markup as corrupt input.
pub(crate) fn parse_xml<'a>(
    name: &str,
    text: &'a str,
) -> Result<roxmltree::Document<'a>, ConversionError> {
    roxmltree::Document::parse(text)
        .map_err(|e| ConversionError::corrupt(format!("malformed {}: {}", name, e)))
}

/// Whether `node` is the element `ns:local`.
pub(crate) fn is_element(node: &roxmltree::Node<'_, '_>, ns: &str, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(ns)
}

/// Number embedded in a part name such as `ppt/slides/slide12.xml`.
pub(crate) fn part_number(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix)?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}
