//! XML message-definition loader.
//!
//! Parses documents following the MAVLink 1.0 definition schema
//! (`<mavlink><enums>…</enums><messages>…</messages></mavlink>`) into a
//! [`MavSchema`]. Definitions may span several files: `<include>` elements
//! are followed once each, identically named enums are merged by appending
//! entries, and duplicate message ids fail the load.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use quick_xml::{events::Event, Reader};

use super::{MavEnum, MavEnumEntry, MavField, MavMessage, MavSchema, MavType};
use crate::error::SchemaError;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum MavXmlElement {
    Version,
    Mavlink,
    Dialect,
    Include,
    Enums,
    Enum,
    Entry,
    Description,
    Param,
    Messages,
    Message,
    Field,
    Deprecated,
    Wip,
    Extensions,
}

const fn identify_element(s: &[u8]) -> Option<MavXmlElement> {
    use self::MavXmlElement::*;
    match s {
        b"version" => Some(Version),
        b"mavlink" => Some(Mavlink),
        b"dialect" => Some(Dialect),
        b"include" => Some(Include),
        b"enums" => Some(Enums),
        b"enum" => Some(Enum),
        b"entry" => Some(Entry),
        b"description" => Some(Description),
        b"param" => Some(Param),
        b"messages" => Some(Messages),
        b"message" => Some(Message),
        b"field" => Some(Field),
        b"deprecated" => Some(Deprecated),
        b"wip" => Some(Wip),
        b"extensions" => Some(Extensions),
        _ => None,
    }
}

fn is_valid_parent(p: Option<MavXmlElement>, s: MavXmlElement) -> bool {
    use self::MavXmlElement::*;
    match s {
        Version => p == Some(Mavlink),
        Mavlink => p.is_none(),
        Dialect => p == Some(Mavlink),
        Include => p == Some(Mavlink),
        Enums => p == Some(Mavlink),
        Enum => p == Some(Enums),
        Entry => p == Some(Enum),
        Description => p == Some(Entry) || p == Some(Message) || p == Some(Enum),
        Param => p == Some(Entry),
        Messages => p == Some(Mavlink),
        Message => p == Some(Messages),
        Field => p == Some(Message),
        Deprecated => p == Some(Entry) || p == Some(Message) || p == Some(Enum),
        Wip => p == Some(Entry) || p == Some(Message) || p == Some(Enum),
        Extensions => p == Some(Message),
    }
}

pub(super) fn load_dir(dir: &Path) -> Result<Arc<MavSchema>, SchemaError> {
    let entries = std::fs::read_dir(dir).map_err(|source| SchemaError::Io {
        source,
        path: dir.to_path_buf(),
    })?;

    let mut files: Vec<PathBuf> = vec![];
    for entry in entries {
        let entry = entry.map_err(|source| SchemaError::Io {
            source,
            path: dir.to_path_buf(),
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "xml") {
            files.push(path);
        }
    }

    let mut schema = MavSchema::default();
    let mut parsed: HashSet<PathBuf> = HashSet::new();
    for file in files {
        load_file(&mut schema, dir, &file, &mut parsed)?;
    }
    schema.reconcile_bitmasks();
    Ok(Arc::new(schema))
}

fn load_file(
    schema: &mut MavSchema,
    dir: &Path,
    path: &Path,
    parsed: &mut HashSet<PathBuf>,
) -> Result<(), SchemaError> {
    if !parsed.insert(path.to_path_buf()) {
        return Ok(());
    }

    let file = File::open(path).map_err(|source| SchemaError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    let mut includes = vec![];
    parse_document(schema, &mut reader, &mut includes)?;

    for include in includes {
        let include_path = dir.join(include);
        load_file(schema, dir, &include_path, parsed)?;
    }
    Ok(())
}

pub(super) fn parse_definitions(documents: &[&str]) -> Result<Arc<MavSchema>, SchemaError> {
    let mut schema = MavSchema::default();
    for document in documents {
        let mut reader = Reader::from_reader(document.as_bytes());
        let mut includes = vec![];
        parse_document(&mut schema, &mut reader, &mut includes)?;
        if !includes.is_empty() {
            warn!("ignoring <include> elements in an in-memory definition");
        }
    }
    schema.reconcile_bitmasks();
    Ok(Arc::new(schema))
}

fn parse_document<B: BufRead>(
    schema: &mut MavSchema,
    reader: &mut Reader<B>,
    includes: &mut Vec<String>,
) -> Result<(), SchemaError> {
    reader.config_mut().trim_text(true);
    reader.config_mut().expand_empty_elements = true;

    let mut stack: Vec<MavXmlElement> = vec![];
    let mut skip_depth = 0usize;
    let mut text: Option<String> = None;

    let mut message = MavMessage::default();
    let mut message_has_id = false;
    let mut field = MavField::default();
    let mut field_has_type = false;
    let mut mavenum = MavEnum::default();
    let mut entry = MavEnumEntry::default();
    let mut entry_value: Option<u64> = None;
    let mut auto_value = 0u64;
    let mut entry_params: Vec<(usize, String)> = vec![];
    let mut param_index: Option<usize> = None;
    let mut is_in_extension = false;

    let mut buf = Vec::new();
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(SchemaError::Xml)?;
        match event {
            Event::Eof => break,
            Event::Start(bytes) => {
                if skip_depth > 0 {
                    skip_depth += 1;
                    buf.clear();
                    continue;
                }
                let id = identify_element(bytes.name().into_inner());
                let id = match id {
                    Some(id) if is_valid_parent(stack.last().copied(), id) => id,
                    // unrecognised or misplaced elements are skipped whole
                    _ => {
                        skip_depth = 1;
                        buf.clear();
                        continue;
                    }
                };

                match id {
                    MavXmlElement::Extensions => {
                        is_in_extension = true;
                    }
                    MavXmlElement::Message => {
                        message = MavMessage::default();
                        message_has_id = false;
                        is_in_extension = false;
                    }
                    MavXmlElement::Field => {
                        field = MavField {
                            is_extension: is_in_extension,
                            ..Default::default()
                        };
                        field_has_type = false;
                    }
                    MavXmlElement::Enum => {
                        mavenum = MavEnum::default();
                        auto_value = 0;
                    }
                    MavXmlElement::Entry => {
                        entry = MavEnumEntry::default();
                        entry_value = None;
                        entry_params = vec![];
                    }
                    MavXmlElement::Param => {
                        param_index = None;
                    }
                    _ => (),
                }

                for attr in bytes.attributes() {
                    let attr = attr.map_err(|e| SchemaError::Xml(e.into()))?;
                    let value = String::from_utf8_lossy(&attr.value);
                    match id {
                        MavXmlElement::Enum => match attr.key.into_inner() {
                            b"name" => mavenum.name = value.to_string(),
                            b"bitmask" => mavenum.bitmask = attr.value.as_ref() == b"true",
                            _ => (),
                        },
                        MavXmlElement::Entry => match attr.key.into_inner() {
                            b"name" => entry.name = value.to_string(),
                            b"value" => {
                                // hexadecimal values are common in bitmask enums
                                let (src, radix) = value
                                    .strip_prefix("0x")
                                    .map(|v| (v, 16))
                                    .unwrap_or((value.as_ref(), 10));
                                entry_value = Some(
                                    u64::from_str_radix(src, radix).map_err(|_| {
                                        SchemaError::InvalidAttribute {
                                            element: "entry",
                                            attribute: "value",
                                            value: value.to_string(),
                                        }
                                    })?,
                                );
                            }
                            _ => (),
                        },
                        MavXmlElement::Message => match attr.key.into_inner() {
                            b"name" => message.name = value.to_string(),
                            b"id" => {
                                message.id =
                                    value
                                        .parse()
                                        .map_err(|_| SchemaError::InvalidAttribute {
                                            element: "message",
                                            attribute: "id",
                                            value: value.to_string(),
                                        })?;
                                message_has_id = true;
                            }
                            _ => (),
                        },
                        MavXmlElement::Field => match attr.key.into_inner() {
                            b"name" => field.name = value.to_string(),
                            b"type" => {
                                field.mavtype = MavType::parse_for_field(&value, &field.name)?;
                                field_has_type = true;
                            }
                            b"enum" => field.enumtype = Some(value.to_string()),
                            b"display" => field.display = Some(value.to_string()),
                            b"units" => field.units = Some(value.to_string()),
                            b"print_format" => field.print_format = Some(value.to_string()),
                            _ => (),
                        },
                        MavXmlElement::Param => {
                            if attr.key.into_inner() == b"index" {
                                param_index =
                                    Some(value.parse().map_err(|_| {
                                        SchemaError::InvalidAttribute {
                                            element: "param",
                                            attribute: "index",
                                            value: value.to_string(),
                                        }
                                    })?);
                            }
                        }
                        _ => (),
                    }
                }

                // required attributes
                match id {
                    MavXmlElement::Enum if mavenum.name.is_empty() => {
                        return Err(SchemaError::MissingAttribute {
                            element: "enum",
                            attribute: "name",
                        });
                    }
                    MavXmlElement::Entry if entry.name.is_empty() => {
                        return Err(SchemaError::MissingAttribute {
                            element: "entry",
                            attribute: "name",
                        });
                    }
                    _ => (),
                }

                stack.push(id);
            }
            Event::Text(bytes) => {
                if skip_depth > 0 {
                    buf.clear();
                    continue;
                }
                use self::MavXmlElement::*;
                let s = String::from_utf8_lossy(&bytes).to_string();
                match (stack.last(), stack.get(stack.len().wrapping_sub(2))) {
                    (Some(&Description), _)
                    | (Some(&Field), Some(&Message))
                    | (Some(&Include), Some(&Mavlink))
                    | (Some(&Version), Some(&Mavlink))
                    | (Some(&Dialect), Some(&Mavlink))
                    | (Some(&Param), Some(&Entry))
                    | (Some(&Deprecated), _) => {
                        text = Some(text.map(|t| t + &s).unwrap_or(s));
                    }
                    _ => (),
                }
            }
            Event::GeneralRef(bytes) => {
                if skip_depth > 0 {
                    buf.clear();
                    continue;
                }
                let entity = String::from_utf8_lossy(&bytes);
                text = Some(
                    text.map(|t| format!("{t}&{entity};"))
                        .unwrap_or(format!("&{entity};")),
                );
            }
            Event::End(_) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    buf.clear();
                    continue;
                }
                match stack.last() {
                    Some(&MavXmlElement::Field) => {
                        if field.name.is_empty() {
                            return Err(SchemaError::MissingAttribute {
                                element: "field",
                                attribute: "name",
                            });
                        }
                        if !field_has_type {
                            return Err(SchemaError::MissingAttribute {
                                element: "field",
                                attribute: "type",
                            });
                        }
                        field.description = text.take().map(|t| t.replace('\n', " "));
                        message.fields.push(std::mem::take(&mut field));
                    }
                    Some(&MavXmlElement::Entry) => {
                        // values may be omitted and count up from the last
                        // explicit value
                        entry.value = match entry_value.take() {
                            Some(v) => {
                                auto_value = auto_value.max(v);
                                v
                            }
                            None => {
                                auto_value += 1;
                                auto_value
                            }
                        };
                        entry_params.sort_by_key(|&(index, _)| index);
                        entry.params = entry_params.drain(..).map(|(_, d)| d).collect();
                        mavenum.entries.push(std::mem::take(&mut entry));
                    }
                    Some(&MavXmlElement::Message) => {
                        if message.name.is_empty() {
                            return Err(SchemaError::MissingAttribute {
                                element: "message",
                                attribute: "name",
                            });
                        }
                        if !message_has_id {
                            return Err(SchemaError::MissingAttribute {
                                element: "message",
                                attribute: "id",
                            });
                        }
                        is_in_extension = false;
                        schema.add_message(std::mem::take(&mut message))?;
                    }
                    Some(&MavXmlElement::Enum) => {
                        schema.add_enum(std::mem::take(&mut mavenum));
                    }
                    Some(&MavXmlElement::Include) => {
                        if let Some(t) = text.take() {
                            includes.push(t.replace('\n', ""));
                        }
                    }
                    Some(&MavXmlElement::Description) => {
                        let description = text.take().map(|t| t.replace('\n', " "));
                        match stack.get(stack.len().wrapping_sub(2)) {
                            Some(&MavXmlElement::Message) => message.description = description,
                            Some(&MavXmlElement::Enum) => mavenum.description = description,
                            Some(&MavXmlElement::Entry) => entry.description = description,
                            _ => (),
                        }
                    }
                    Some(&MavXmlElement::Version) => {
                        if let Some(t) = text.take() {
                            schema.version =
                                Some(t.parse().map_err(|_| SchemaError::InvalidAttribute {
                                    element: "version",
                                    attribute: "value",
                                    value: t,
                                })?);
                        }
                    }
                    Some(&MavXmlElement::Dialect) => {
                        if let Some(t) = text.take() {
                            schema.dialect =
                                Some(t.parse().map_err(|_| SchemaError::InvalidAttribute {
                                    element: "dialect",
                                    attribute: "value",
                                    value: t,
                                })?);
                        }
                    }
                    Some(&MavXmlElement::Param) => {
                        if let Some(index) = param_index.take() {
                            entry_params.push((index, text.take().unwrap_or_default()));
                        }
                    }
                    _ => (),
                }
                text = None;
                stack.pop();
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}
