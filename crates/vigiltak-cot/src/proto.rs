//! TAK Protocol Version 1 encoding.
//!
//! Message definitions are written by hand against the published field
//! numbering instead of being generated at build time, which keeps the
//! crate free of a protoc toolchain dependency. Two framings share the
//! same payload: mesh (magic header, used for multicast) and stream
//! (varint length prefix, used on TCP/TLS links).
//!
//! Encoding is XML-first: the event is serialized to CoT XML, re-parsed,
//! and only then converted to protobuf. An event that cannot survive that
//! round trip reports [`EncodeError`] so the caller can fall back to
//! sending the XML form.

use crate::event::{millis_to_datetime, CotEvent, Point, COT_VERSION, UNKNOWN_ACCURACY};
use crate::parser::{DecodeError, WireFormat, MESH_HEADER};
use prost::Message;
use std::collections::BTreeMap;
use thiserror::Error;

/// Wire messages for TAK Protocol Version 1.
pub mod pb {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TakMessage {
        #[prost(message, optional, tag = "1")]
        pub tak_control: Option<TakControl>,
        #[prost(message, optional, tag = "2")]
        pub cot_event: Option<CotEvent>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TakControl {
        #[prost(uint32, tag = "1")]
        pub min_proto_version: u32,
        #[prost(uint32, tag = "2")]
        pub max_proto_version: u32,
        #[prost(string, tag = "3")]
        pub contact_uid: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CotEvent {
        #[prost(string, tag = "1")]
        pub event_type: String,
        #[prost(string, tag = "2")]
        pub access: String,
        #[prost(string, tag = "3")]
        pub qos: String,
        #[prost(string, tag = "4")]
        pub opex: String,
        #[prost(string, tag = "5")]
        pub uid: String,
        #[prost(uint64, tag = "6")]
        pub send_time: u64,
        #[prost(uint64, tag = "7")]
        pub start_time: u64,
        #[prost(uint64, tag = "8")]
        pub stale_time: u64,
        #[prost(string, tag = "9")]
        pub how: String,
        #[prost(double, tag = "10")]
        pub lat: f64,
        #[prost(double, tag = "11")]
        pub lon: f64,
        #[prost(double, tag = "12")]
        pub hae: f64,
        #[prost(double, tag = "13")]
        pub ce: f64,
        #[prost(double, tag = "14")]
        pub le: f64,
        #[prost(message, optional, tag = "15")]
        pub detail: Option<Detail>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Detail {
        /// Detail children with no dedicated message, as an XML fragment.
        #[prost(string, tag = "1")]
        pub xml_detail: String,
        #[prost(message, optional, tag = "2")]
        pub contact: Option<Contact>,
        #[prost(message, optional, tag = "3")]
        pub group: Option<Group>,
        #[prost(message, optional, tag = "4")]
        pub precision_location: Option<PrecisionLocation>,
        #[prost(message, optional, tag = "5")]
        pub status: Option<Status>,
        #[prost(message, optional, tag = "6")]
        pub takv: Option<Takv>,
        #[prost(message, optional, tag = "7")]
        pub track: Option<Track>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Contact {
        #[prost(string, tag = "1")]
        pub endpoint: String,
        #[prost(string, tag = "2")]
        pub callsign: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Group {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub role: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PrecisionLocation {
        #[prost(string, tag = "1")]
        pub geopointsrc: String,
        #[prost(string, tag = "2")]
        pub altsrc: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Status {
        #[prost(uint32, tag = "1")]
        pub battery: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Takv {
        #[prost(string, tag = "1")]
        pub device: String,
        #[prost(string, tag = "2")]
        pub platform: String,
        #[prost(string, tag = "3")]
        pub os: String,
        #[prost(string, tag = "4")]
        pub version: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Track {
        #[prost(double, tag = "1")]
        pub speed: f64,
        #[prost(double, tag = "2")]
        pub course: f64,
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("event did not survive transcode to TAK protocol: {0}")]
    Transcode(#[source] DecodeError),
}

/// Encodes an event on the requested wire format.
pub fn encode(event: &CotEvent, format: WireFormat) -> Result<Vec<u8>, EncodeError> {
    match format {
        WireFormat::Xml => Ok(crate::serializer::serialize_event(event).into_bytes()),
        WireFormat::MeshBinary => encode_mesh(event),
        WireFormat::StreamBinary => encode_stream(event),
    }
}

/// Encodes a mesh frame: magic header followed by the protobuf payload.
pub fn encode_mesh(event: &CotEvent) -> Result<Vec<u8>, EncodeError> {
    let body = transcode(event)?.encode_to_vec();
    let mut frame = Vec::with_capacity(MESH_HEADER.len() + body.len());
    frame.extend_from_slice(MESH_HEADER);
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Encodes a stream frame: varint payload length followed by the payload.
pub fn encode_stream(event: &CotEvent) -> Result<Vec<u8>, EncodeError> {
    let body = transcode(event)?.encode_to_vec();
    let mut frame = Vec::with_capacity(2 + body.len());
    write_varint(&mut frame, body.len() as u64);
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Serialize-then-reparse before converting, so the bytes on a binary
/// link always describe the same event an XML receiver would have seen.
fn transcode(event: &CotEvent) -> Result<pb::TakMessage, EncodeError> {
    let xml = crate::serializer::serialize_event(event);
    let reparsed = crate::parser::decode(xml.as_bytes()).map_err(EncodeError::Transcode)?;
    Ok(event_to_tak_message(&reparsed))
}

pub(crate) fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Converts a model event into the wire message. Detail keys with a
/// dedicated protobuf message move there; everything else is carried in
/// `xml_detail` as serialized children.
pub fn event_to_tak_message(event: &CotEvent) -> pb::TakMessage {
    let mut extra = event.detail.clone();

    let contact = submessage2(&mut extra, "contact.endpoint", "contact.callsign", |endpoint, callsign| {
        pb::Contact { endpoint, callsign }
    });
    let group = submessage2(&mut extra, "__group.name", "__group.role", |name, role| {
        pb::Group { name, role }
    });
    let precision_location = submessage2(
        &mut extra,
        "precisionlocation.geopointsrc",
        "precisionlocation.altsrc",
        |geopointsrc, altsrc| pb::PrecisionLocation { geopointsrc, altsrc },
    );
    let status = take_u32(&mut extra, "status.battery").map(|battery| pb::Status { battery });
    let takv = {
        let device = extra.remove("takv.device");
        let platform = extra.remove("takv.platform");
        let os = extra.remove("takv.os");
        let version = extra.remove("takv.version");
        if device.is_some() || platform.is_some() || os.is_some() || version.is_some() {
            Some(pb::Takv {
                device: device.unwrap_or_default(),
                platform: platform.unwrap_or_default(),
                os: os.unwrap_or_default(),
                version: version.unwrap_or_default(),
            })
        } else {
            None
        }
    };
    let track = {
        let speed = take_f64(&mut extra, "track.speed");
        let course = take_f64(&mut extra, "track.course");
        if speed.is_some() || course.is_some() {
            Some(pb::Track {
                speed: speed.unwrap_or(0.0),
                course: course.unwrap_or(0.0),
            })
        } else {
            None
        }
    };

    let xml_detail = if extra.is_empty() {
        String::new()
    } else {
        crate::serializer::detail_children(&extra)
    };
    let has_structured = contact.is_some()
        || group.is_some()
        || precision_location.is_some()
        || status.is_some()
        || takv.is_some()
        || track.is_some();
    let detail = if has_structured || !xml_detail.is_empty() {
        Some(pb::Detail {
            xml_detail,
            contact,
            group,
            precision_location,
            status,
            takv,
            track,
        })
    } else {
        None
    };

    pb::TakMessage {
        tak_control: Some(pb::TakControl {
            min_proto_version: 1,
            max_proto_version: 1,
            contact_uid: event.uid.clone(),
        }),
        cot_event: Some(pb::CotEvent {
            event_type: event.event_type.clone(),
            access: String::new(),
            qos: String::new(),
            opex: String::new(),
            uid: event.uid.clone(),
            send_time: event.time_millis(),
            start_time: event.start_millis(),
            stale_time: event.stale_millis(),
            how: event.how.clone(),
            lat: event.point.lat,
            lon: event.point.lon,
            hae: event.point.hae,
            ce: event.point.ce,
            le: event.point.le,
            detail,
        }),
    }
}

/// Converts a decoded wire message back into the model.
///
/// The wire format carries no schema version, so the canonical "2.0" is
/// restored, and proto3 zero accuracy values come back as unknown.
pub fn event_from_tak_message(message: pb::TakMessage) -> Result<CotEvent, DecodeError> {
    let pb_event = message.cot_event.ok_or(DecodeError::MissingField("cotEvent"))?;

    let mut detail = BTreeMap::new();
    if let Some(d) = pb_event.detail {
        if let Some(c) = d.contact {
            insert_nonempty(&mut detail, "contact.endpoint", c.endpoint);
            insert_nonempty(&mut detail, "contact.callsign", c.callsign);
        }
        if let Some(g) = d.group {
            insert_nonempty(&mut detail, "__group.name", g.name);
            insert_nonempty(&mut detail, "__group.role", g.role);
        }
        if let Some(p) = d.precision_location {
            insert_nonempty(&mut detail, "precisionlocation.geopointsrc", p.geopointsrc);
            insert_nonempty(&mut detail, "precisionlocation.altsrc", p.altsrc);
        }
        if let Some(s) = d.status {
            detail.insert("status.battery".to_string(), s.battery.to_string());
        }
        if let Some(t) = d.takv {
            insert_nonempty(&mut detail, "takv.device", t.device);
            insert_nonempty(&mut detail, "takv.platform", t.platform);
            insert_nonempty(&mut detail, "takv.os", t.os);
            insert_nonempty(&mut detail, "takv.version", t.version);
        }
        if let Some(t) = d.track {
            detail.insert("track.speed".to_string(), t.speed.to_string());
            detail.insert("track.course".to_string(), t.course.to_string());
        }
        if !d.xml_detail.is_empty() {
            for (key, value) in crate::parser::parse_detail_fragment(&d.xml_detail)? {
                detail.entry(key).or_insert(value);
            }
        }
    }

    Ok(CotEvent {
        version: COT_VERSION.to_string(),
        uid: pb_event.uid,
        event_type: pb_event.event_type,
        how: pb_event.how,
        time: millis_to_datetime(pb_event.send_time),
        start: millis_to_datetime(pb_event.start_time),
        stale: millis_to_datetime(pb_event.stale_time),
        point: Point {
            lat: pb_event.lat,
            lon: pb_event.lon,
            hae: pb_event.hae,
            ce: accuracy_or_unknown(pb_event.ce),
            le: accuracy_or_unknown(pb_event.le),
        },
        detail,
    })
}

fn accuracy_or_unknown(value: f64) -> f64 {
    if value == 0.0 {
        UNKNOWN_ACCURACY
    } else {
        value
    }
}

fn insert_nonempty(detail: &mut BTreeMap<String, String>, key: &str, value: String) {
    if !value.is_empty() {
        detail.insert(key.to_string(), value);
    }
}

fn submessage2<T>(
    extra: &mut BTreeMap<String, String>,
    key_a: &str,
    key_b: &str,
    build: impl FnOnce(String, String) -> T,
) -> Option<T> {
    let a = extra.remove(key_a);
    let b = extra.remove(key_b);
    if a.is_some() || b.is_some() {
        Some(build(a.unwrap_or_default(), b.unwrap_or_default()))
    } else {
        None
    }
}

fn take_f64(extra: &mut BTreeMap<String, String>, key: &str) -> Option<f64> {
    let raw = extra.remove(key)?;
    match raw.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            // Unparseable numbers ride along in xml_detail instead.
            extra.insert(key.to_string(), raw);
            None
        }
    }
}

fn take_u32(extra: &mut BTreeMap<String, String>, key: &str) -> Option<u32> {
    let raw = extra.remove(key)?;
    match raw.parse::<u32>() {
        Ok(value) => Some(value),
        Err(_) => {
            extra.insert(key.to_string(), raw);
            None
        }
    }
}
