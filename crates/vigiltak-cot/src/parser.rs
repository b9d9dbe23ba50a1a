//! CoT wire decoding.
//!
//! Inbound traffic arrives in one of three framings: plain CoT XML, TAK
//! protocol mesh frames (magic header, common on multicast) and TAK
//! protocol stream frames (varint length prefix, common on TCP links).
//! [`decode`] sniffs the leading bytes and dispatches, falling back to an
//! XML parse before declaring a buffer unreadable.

use crate::event::{CotEvent, Point, COT_VERSION, UNKNOWN_ACCURACY};
use crate::proto::{self, pb};
use chrono::{DateTime, Utc};
use prost::Message;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// TAK Protocol Version 1 mesh frame header: magic, version, magic.
pub const MESH_HEADER: &[u8] = &[0xBF, 0x01, 0xBF];

const XML_DECLARATION: &[u8] = b"<?xml";
/// Some senders ship a bare `<event>` document with no XML declaration.
const BARE_EVENT_PREFIX: &[u8] = b"<event version=";
const PATCHED_DECLARATION: &[u8] = b"<?xml version='1.0' encoding='utf8'?>";

/// The three framings an event travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Xml,
    MeshBinary,
    StreamBinary,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::Xml => "xml",
            WireFormat::MeshBinary => "mesh",
            WireFormat::StreamBinary => "stream",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid timestamp in '{field}': {value}")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("invalid number in '{field}': {value}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("stream frame length prefix is malformed")]
    InvalidVarint,
    #[error("stream frame shorter than its declared length")]
    Truncated,
    #[error("buffer is neither CoT XML nor TAK protocol")]
    NoCot,
}

/// Classifies a buffer by its leading bytes.
///
/// `StreamBinary` is a candidate, not a verdict: anything without a
/// recognizable prefix lands there and is confirmed only by a successful
/// protobuf decode. Empty buffers classify as nothing.
pub fn detect_wire_format(raw: &[u8]) -> Option<WireFormat> {
    if raw.is_empty() {
        None
    } else if raw.starts_with(MESH_HEADER) {
        Some(WireFormat::MeshBinary)
    } else if raw.starts_with(XML_DECLARATION) || raw.starts_with(b"<event") {
        Some(WireFormat::Xml)
    } else {
        Some(WireFormat::StreamBinary)
    }
}

/// Decodes a single event from any supported framing.
pub fn decode(raw: &[u8]) -> Result<CotEvent, DecodeError> {
    match detect_wire_format(raw) {
        None => Err(DecodeError::NoCot),
        Some(WireFormat::Xml) => {
            if raw.starts_with(BARE_EVENT_PREFIX) {
                let mut patched =
                    Vec::with_capacity(PATCHED_DECLARATION.len() + raw.len());
                patched.extend_from_slice(PATCHED_DECLARATION);
                patched.extend_from_slice(raw);
                parse_xml(&patched)
            } else {
                parse_xml(raw)
            }
        }
        Some(WireFormat::MeshBinary) => parse_mesh(raw),
        Some(WireFormat::StreamBinary) => match parse_stream(raw) {
            Ok(event) => Ok(event),
            // Leading whitespace defeats the prefix sniff, so give the
            // XML parser one chance before declaring the buffer garbage.
            Err(_) => parse_xml(raw).map_err(|_| DecodeError::NoCot),
        },
    }
}

/// Decodes a mesh frame: magic header plus protobuf payload.
pub fn parse_mesh(raw: &[u8]) -> Result<CotEvent, DecodeError> {
    let body = raw.strip_prefix(MESH_HEADER).ok_or(DecodeError::NoCot)?;
    let message = pb::TakMessage::decode(body)?;
    proto::event_from_tak_message(message)
}

/// Decodes a stream frame: varint payload length plus protobuf payload.
pub fn parse_stream(raw: &[u8]) -> Result<CotEvent, DecodeError> {
    let (len, consumed) = read_varint(raw)?;
    let end = consumed
        .checked_add(len as usize)
        .ok_or(DecodeError::Truncated)?;
    let body = raw.get(consumed..end).ok_or(DecodeError::Truncated)?;
    let message = pb::TakMessage::decode(body)?;
    proto::event_from_tak_message(message)
}

/// Reads a protobuf base-128 varint. Returns the value and the number of
/// bytes consumed. Anything past ten bytes is malformed.
pub fn read_varint(buf: &[u8]) -> Result<(u64, usize), DecodeError> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= 10 {
            return Err(DecodeError::InvalidVarint);
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(DecodeError::InvalidVarint)
}

/// Parses a CoT XML document.
///
/// Detail children are flattened to dotted map keys: attributes become
/// `element.attribute` and text content becomes the element path itself,
/// with nesting joined by dots.
pub fn parse_xml(raw: &[u8]) -> Result<CotEvent, DecodeError> {
    let mut reader = Reader::from_reader(raw);
    reader.config_mut().trim_text(true);

    let mut version: Option<String> = None;
    let mut uid: Option<String> = None;
    let mut event_type: Option<String> = None;
    let mut how: Option<String> = None;
    let mut time: Option<DateTime<Utc>> = None;
    let mut start: Option<DateTime<Utc>> = None;
    let mut stale: Option<DateTime<Utc>> = None;
    let mut point: Option<Point> = None;
    let mut detail = BTreeMap::new();
    let mut path: Vec<String> = Vec::new();
    let mut in_detail = false;
    let mut saw_event = false;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => match e.name().as_ref() {
                b"event" if !saw_event => {
                    saw_event = true;
                    for attr in e.attributes() {
                        let attr = attr
                            .map_err(|err| DecodeError::Xml(quick_xml::Error::InvalidAttr(err)))?;
                        let value = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
                        match attr.key.as_ref() {
                            b"version" => version = Some(value),
                            b"uid" => uid = Some(value),
                            b"type" => event_type = Some(value),
                            b"how" => how = Some(value),
                            b"time" => time = Some(parse_datetime("time", &value)?),
                            b"start" => start = Some(parse_datetime("start", &value)?),
                            b"stale" => stale = Some(parse_datetime("stale", &value)?),
                            _ => {}
                        }
                    }
                }
                b"point" if !in_detail => point = Some(parse_point_attrs(&e)?),
                b"detail" if !in_detail => in_detail = true,
                _ if in_detail => {
                    path.push(element_name(&e));
                    collect_attrs(&e, &path, &mut detail)?;
                }
                _ => {}
            },
            Ok(XmlEvent::Empty(e)) => match e.name().as_ref() {
                b"point" if !in_detail => point = Some(parse_point_attrs(&e)?),
                _ if in_detail => {
                    path.push(element_name(&e));
                    collect_attrs(&e, &path, &mut detail)?;
                    path.pop();
                }
                _ => {}
            },
            Ok(XmlEvent::Text(t)) => {
                if in_detail && !path.is_empty() {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    if !text.is_empty() {
                        detail.insert(path.join("."), text);
                    }
                }
            }
            Ok(XmlEvent::End(e)) => match e.name().as_ref() {
                b"detail" => {
                    in_detail = false;
                    path.clear();
                }
                b"event" => break,
                _ if in_detail => {
                    path.pop();
                }
                _ => {}
            },
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(DecodeError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    if !saw_event {
        return Err(DecodeError::MissingField("event"));
    }
    Ok(CotEvent {
        version: version.unwrap_or_else(|| COT_VERSION.to_string()),
        uid: uid.ok_or(DecodeError::MissingField("uid"))?,
        event_type: event_type.ok_or(DecodeError::MissingField("type"))?,
        how: how.unwrap_or_default(),
        time: time.ok_or(DecodeError::MissingField("time"))?,
        start: start.ok_or(DecodeError::MissingField("start"))?,
        stale: stale.ok_or(DecodeError::MissingField("stale"))?,
        point: point.ok_or(DecodeError::MissingField("point"))?,
        detail,
    })
}

/// Parses a bare detail fragment, as carried in protobuf `xml_detail`.
pub(crate) fn parse_detail_fragment(
    fragment: &str,
) -> Result<BTreeMap<String, String>, DecodeError> {
    let mut reader = Reader::from_str(fragment);
    reader.config_mut().trim_text(true);
    let mut detail = BTreeMap::new();
    let mut path: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) => {
                path.push(element_name(&e));
                collect_attrs(&e, &path, &mut detail)?;
            }
            Ok(XmlEvent::Empty(e)) => {
                path.push(element_name(&e));
                collect_attrs(&e, &path, &mut detail)?;
                path.pop();
            }
            Ok(XmlEvent::Text(t)) => {
                if !path.is_empty() {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    if !text.is_empty() {
                        detail.insert(path.join("."), text);
                    }
                }
            }
            Ok(XmlEvent::End(_)) => {
                path.pop();
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(DecodeError::Xml(e)),
            _ => {}
        }
    }
    Ok(detail)
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn collect_attrs(
    e: &BytesStart,
    path: &[String],
    detail: &mut BTreeMap<String, String>,
) -> Result<(), DecodeError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DecodeError::Xml(quick_xml::Error::InvalidAttr(err)))?;
        let key = format!(
            "{}.{}",
            path.join("."),
            String::from_utf8_lossy(attr.key.as_ref())
        );
        detail.insert(key, String::from_utf8_lossy(attr.value.as_ref()).into_owned());
    }
    Ok(())
}

fn parse_point_attrs(e: &BytesStart) -> Result<Point, DecodeError> {
    let mut lat = None;
    let mut lon = None;
    let mut hae = 0.0;
    let mut ce = UNKNOWN_ACCURACY;
    let mut le = UNKNOWN_ACCURACY;
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DecodeError::Xml(quick_xml::Error::InvalidAttr(err)))?;
        let value = String::from_utf8_lossy(attr.value.as_ref());
        match attr.key.as_ref() {
            b"lat" => lat = Some(parse_f64("lat", &value)?),
            b"lon" => lon = Some(parse_f64("lon", &value)?),
            b"hae" => hae = parse_f64("hae", &value)?,
            b"ce" => ce = parse_f64("ce", &value)?,
            b"le" => le = parse_f64("le", &value)?,
            _ => {}
        }
    }
    Ok(Point {
        lat: lat.ok_or(DecodeError::MissingField("lat"))?,
        lon: lon.ok_or(DecodeError::MissingField("lon"))?,
        hae,
        ce,
        le,
    })
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, DecodeError> {
    value.trim().parse().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_datetime(field: &'static str, value: &str) -> Result<DateTime<Utc>, DecodeError> {
    value
        .parse()
        .map_err(|_| DecodeError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}
