//! OVF descriptor parsing.
//!
//! Only the disk references are consumed: every `Disk` element carries an
//! `ovf:fileRef` attribute of the form `<diskGroupId>/<diskId>`, and the disk
//! group id names the image directory holding that disk's volumes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::error::{BackupError, Result};

/// One `Disk` element's file reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskReference {
    /// Raw `fileRef` value
    pub file_ref: String,
}

impl DiskReference {
    /// Segment before the first `/`; the whole value if there is none.
    pub fn disk_group(&self) -> &str {
        disk_group(&self.file_ref)
    }
}

/// Extract the disk group id from a file reference.
pub fn disk_group(file_ref: &str) -> &str {
    file_ref.split('/').next().unwrap_or(file_ref)
}

/// Parsed OVF document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OvfDescriptor {
    /// Disk references in document order, duplicates included
    pub disks: Vec<DiskReference>,
}

impl OvfDescriptor {
    /// Parse an OVF document.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut disks = Vec::new();
        let mut depth = 0usize;
        let mut saw_root = false;
        let mut disk_ordinal = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    if depth == 0 && saw_root {
                        return Err(parse_error(&reader, "multiple root elements"));
                    }
                    saw_root = true;
                    depth += 1;
                    if e.local_name().as_ref() == b"Disk" {
                        disk_ordinal += 1;
                        disks.push(disk_reference(e, disk_ordinal)?);
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    if depth == 0 && saw_root {
                        return Err(parse_error(&reader, "multiple root elements"));
                    }
                    saw_root = true;
                    if e.local_name().as_ref() == b"Disk" {
                        disk_ordinal += 1;
                        disks.push(disk_reference(e, disk_ordinal)?);
                    }
                }
                Ok(Event::End(_)) => {
                    depth = depth.checked_sub(1)
                        .ok_or_else(|| parse_error(&reader, "unexpected closing tag"))?;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(parse_error(&reader, &e.to_string())),
            }
        }

        if !saw_root {
            return Err(BackupError::Parse("document has no root element".to_string()));
        }
        if depth != 0 {
            return Err(BackupError::Parse(format!("{} unclosed element(s) at end of document", depth)));
        }

        debug!(disks = disks.len(), "Parsed OVF descriptor");
        Ok(Self { disks })
    }

    /// Disk group ids in document order, duplicates included.
    pub fn disk_groups(&self) -> Vec<String> {
        self.disks.iter().map(|d| d.disk_group().to_string()).collect()
    }
}

fn disk_reference(element: &BytesStart<'_>, ordinal: usize) -> Result<DiskReference> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| BackupError::Parse(format!("Disk #{}: {}", ordinal, e)))?;
        if attr.key.local_name().as_ref() == b"fileRef" {
            let value = attr.unescape_value()
                .map_err(|e| BackupError::Parse(format!("Disk #{}: {}", ordinal, e)))?;
            return Ok(DiskReference { file_ref: value.into_owned() });
        }
    }
    Err(BackupError::Parse(format!("Disk #{} has no fileRef attribute", ordinal)))
}

fn parse_error(reader: &Reader<&[u8]>, message: &str) -> BackupError {
    BackupError::Parse(format!("at byte {}: {}", reader.buffer_position(), message))
}

/// Re-indent an XML document with two spaces per level.
pub fn pretty_print(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => writer.write_event(event)
                .map_err(|e| BackupError::Parse(format!("failed to render XML: {}", e)))?,
            Err(e) => return Err(parse_error(&reader, &e.to_string())),
        }
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| BackupError::Parse(format!("rendered XML is not UTF-8: {}", e)))
}
