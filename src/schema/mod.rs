//! In-memory message schema.
//!
//! A [`MavSchema`] is built once from a set of XML message definitions and
//! shared read-only behind an [`Arc`] for the lifetime of the process. The
//! per-message derived data the wire codec depends on (field wire order,
//! payload sizes, the CRC-extra byte) is computed when the schema is sealed
//! and never recomputed.

use std::collections::BTreeMap;
use std::sync::Arc;

use crc_any::CRCu16;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

mod parser;
mod types;

pub use types::MavType;

/// One `<entry>` of an enum.
#[derive(Debug, PartialEq, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MavEnumEntry {
    pub name: String,
    pub value: u64,
    pub description: Option<String>,
    /// Per-index command parameter descriptions, ordered by `index`.
    pub params: Vec<String>,
}

/// A named enumeration, possibly a bitmask.
#[derive(Debug, PartialEq, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MavEnum {
    pub name: String,
    pub description: Option<String>,
    pub entries: Vec<MavEnumEntry>,
    pub bitmask: bool,
}

impl MavEnum {
    pub fn entry(&self, name: &str) -> Option<&MavEnumEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entry_by_value(&self, value: u64) -> Option<&MavEnumEntry> {
        self.entries.iter().find(|e| e.value == value)
    }

    /// Names of the entries whose value bits are all set in `bits`.
    /// Zero-valued entries never match.
    pub fn decode_bitmask(&self, bits: u64) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.value != 0 && bits & e.value == e.value)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Later definitions of an enum with the same name extend the earlier
    /// one; entries are appended as-is.
    fn combine(&mut self, other: MavEnum) {
        self.entries.extend(other.entries);
        self.bitmask |= other.bitmask;
        if self.description.is_none() {
            self.description = other.description;
        }
    }
}

/// One `<field>` of a message.
#[derive(Debug, PartialEq, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MavField {
    pub name: String,
    pub mavtype: MavType,
    pub description: Option<String>,
    pub enumtype: Option<String>,
    pub display: Option<String>,
    pub units: Option<String>,
    pub print_format: Option<String>,
    pub is_extension: bool,
}

impl MavField {
    pub fn is_bitmask(&self) -> bool {
        self.enumtype.is_some() && self.display.as_deref() == Some("bitmask")
    }
}

/// A message descriptor together with its cached wire layout.
#[derive(Debug, PartialEq, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MavMessage {
    pub id: u32,
    pub name: String,
    pub description: Option<String>,
    /// Base fields followed by extension fields, both in declaration order.
    pub fields: Vec<MavField>,
    // derived on seal()
    wire_order: Vec<usize>,
    base_wire_size: usize,
    wire_size: usize,
    crc_extra: u8,
}

impl MavMessage {
    /// Fields in serialisation order: base fields stably sorted by
    /// descending primitive element size, then extensions in declaration
    /// order (extensions are never reordered).
    pub fn wire_fields(&self) -> impl Iterator<Item = &MavField> {
        self.wire_order.iter().map(|&i| &self.fields[i])
    }

    /// Wire-ordered fields paired with their declaration index.
    pub(crate) fn wire_indexed(&self) -> impl Iterator<Item = (usize, &MavField)> {
        self.wire_order.iter().map(|&i| (i, &self.fields[i]))
    }

    /// Wire size of the base fields, the exact v1 payload length.
    pub fn base_wire_size(&self) -> usize {
        self.base_wire_size
    }

    /// Wire size of all fields, the maximum (untruncated) v2 payload length.
    pub fn wire_size(&self) -> usize {
        self.wire_size
    }

    /// The schema-derived byte mixed into every frame CRC.
    pub fn crc_extra(&self) -> u8 {
        self.crc_extra
    }

    /// Computes the derived wire layout. Called once per message while the
    /// schema is under construction.
    fn seal(&mut self) -> Result<(), SchemaError> {
        if self.id > 0x00FF_FFFF {
            return Err(SchemaError::MessageIdOutOfRange {
                id: self.id,
                message: self.name.clone(),
            });
        }

        let (mut base, extensions): (Vec<usize>, Vec<usize>) =
            (0..self.fields.len()).partition(|&i| !self.fields[i].is_extension);
        // sort_by is stable: declaration order survives within a size class
        base.sort_by_key(|&i| std::cmp::Reverse(self.fields[i].mavtype.element_len()));

        self.base_wire_size = base.iter().map(|&i| self.fields[i].mavtype.wire_len()).sum();
        self.wire_size = self.fields.iter().map(|f| f.mavtype.wire_len()).sum();
        if self.wire_size > 255 {
            return Err(SchemaError::PayloadTooLarge {
                message: self.name.clone(),
                size: self.wire_size,
            });
        }

        self.wire_order = base;
        self.wire_order.extend(extensions);
        self.crc_extra = self.compute_crc_extra();
        Ok(())
    }

    /// An 8-bit checksum of the key fields of the message schema, so that
    /// sender and receiver detect incompatible definition changes. Only base
    /// fields participate, in wire order.
    fn compute_crc_extra(&self) -> u8 {
        let mut crc = CRCu16::crc16mcrf4cc();

        crc.digest(self.name.as_bytes());
        crc.digest(b" ");

        for field in self.wire_fields().filter(|f| !f.is_extension) {
            crc.digest(field.mavtype.canonical_name().as_bytes());
            crc.digest(b" ");
            crc.digest(field.name.as_bytes());
            crc.digest(b" ");
            let count = field.mavtype.element_count();
            if count > 1 {
                crc.digest(&[count as u8]);
            }
        }

        let crcval = crc.get_crc();
        ((crcval & 0xFF) ^ (crcval >> 8)) as u8
    }
}

/// The process-wide registry of enums and messages.
#[derive(Debug, Default)]
pub struct MavSchema {
    enums: BTreeMap<String, Arc<MavEnum>>,
    messages: BTreeMap<String, Arc<MavMessage>>,
    by_id: BTreeMap<u32, Arc<MavMessage>>,
    pub version: Option<u8>,
    pub dialect: Option<u8>,
}

impl MavSchema {
    /// Loads every `*.xml` file in `dir` (in arbitrary order) and any files
    /// they `<include>`.
    pub fn load_dir<P: AsRef<std::path::Path>>(dir: P) -> Result<Arc<Self>, SchemaError> {
        parser::load_dir(dir.as_ref())
    }

    /// Builds a schema from in-memory XML documents, merged in order.
    pub fn parse_definitions(documents: &[&str]) -> Result<Arc<Self>, SchemaError> {
        parser::parse_definitions(documents)
    }

    pub fn message(&self, name: &str) -> Option<&Arc<MavMessage>> {
        self.messages.get(name)
    }

    pub fn message_by_id(&self, id: u32) -> Option<&Arc<MavMessage>> {
        self.by_id.get(&id)
    }

    pub fn enum_named(&self, name: &str) -> Option<&Arc<MavEnum>> {
        self.enums.get(name)
    }

    pub fn messages(&self) -> impl Iterator<Item = &Arc<MavMessage>> {
        self.messages.values()
    }

    pub fn enums(&self) -> impl Iterator<Item = &Arc<MavEnum>> {
        self.enums.values()
    }

    pub(crate) fn add_enum(&mut self, enm: MavEnum) {
        match self.enums.remove(&enm.name) {
            Some(existing) => {
                let mut merged = Arc::unwrap_or_clone(existing);
                merged.combine(enm);
                self.enums.insert(merged.name.clone(), Arc::new(merged));
            }
            None => {
                self.enums.insert(enm.name.clone(), Arc::new(enm));
            }
        }
    }

    pub(crate) fn add_message(&mut self, mut message: MavMessage) -> Result<(), SchemaError> {
        message.seal()?;
        if let Some(existing) = self.by_id.get(&message.id) {
            return Err(SchemaError::DuplicateMessageId {
                id: message.id,
                existing: existing.name.clone(),
                duplicate: message.name,
            });
        }
        if self.messages.contains_key(&message.name) {
            return Err(SchemaError::DuplicateMessageName(message.name));
        }
        let message = Arc::new(message);
        self.by_id.insert(message.id, Arc::clone(&message));
        self.messages.insert(message.name.clone(), message);
        Ok(())
    }

    /// Reconciles bitmask markings between enums and the fields bound to
    /// them: an enum declared `bitmask="true"` marks its fields
    /// `display="bitmask"`, and a legacy `display="bitmask"` field marks its
    /// enum.
    pub(crate) fn reconcile_bitmasks(&mut self) {
        let mut bitmask_enums: Vec<String> = self
            .enums
            .values()
            .filter(|e| e.bitmask)
            .map(|e| e.name.clone())
            .collect();

        for message in self.messages.values() {
            for field in &message.fields {
                if field.display.as_deref() == Some("bitmask") {
                    if let Some(enumtype) = &field.enumtype {
                        if !bitmask_enums.contains(enumtype) {
                            bitmask_enums.push(enumtype.clone());
                        }
                    }
                }
            }
        }

        for name in &bitmask_enums {
            if let Some(enm) = self.enums.remove(name) {
                let mut enm = Arc::unwrap_or_clone(enm);
                enm.bitmask = true;
                self.enums.insert(name.clone(), Arc::new(enm));
            }
        }

        let names: Vec<String> = self.messages.keys().cloned().collect();
        for name in names {
            let message = self.messages.get(&name).unwrap();
            let needs_update = message.fields.iter().any(|f| {
                f.display.is_none()
                    && f.enumtype
                        .as_ref()
                        .is_some_and(|e| bitmask_enums.contains(e))
            });
            if !needs_update {
                continue;
            }
            let mut message = Arc::unwrap_or_clone(self.messages.remove(&name).unwrap());
            for field in &mut message.fields {
                if field.display.is_none()
                    && field
                        .enumtype
                        .as_ref()
                        .is_some_and(|e| bitmask_enums.contains(e))
                {
                    field.display = Some("bitmask".to_string());
                }
            }
            let message = Arc::new(message);
            self.by_id.insert(message.id, Arc::clone(&message));
            self.messages.insert(name, message);
        }
    }
}
