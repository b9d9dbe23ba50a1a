//! CoT XML serialization.
//!
//! Events are written with `write!` into a pre-sized `String` rather than
//! through an XML writer. The output is exactly the element shape the
//! parser accepts, and serializing never fails. Values are written as-is;
//! a value containing markup characters will not survive the XML-first
//! transcode into TAK protocol and the caller falls back to sending XML.

use crate::event::CotEvent;
use chrono::SecondsFormat;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Serializes an event to a CoT XML document with declaration.
pub fn serialize_event(event: &CotEvent) -> String {
    let mut xml = String::with_capacity(512);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    write!(
        xml,
        r#"<event version="{}" uid="{}" type="{}" time="{}" start="{}" stale="{}" how="{}">"#,
        event.version,
        event.uid,
        event.event_type,
        event.time.to_rfc3339_opts(SecondsFormat::Millis, true),
        event.start.to_rfc3339_opts(SecondsFormat::Millis, true),
        event.stale.to_rfc3339_opts(SecondsFormat::Millis, true),
        event.how,
    )
    .unwrap();
    write!(
        xml,
        r#"<point lat="{}" lon="{}" hae="{}" ce="{}" le="{}"/>"#,
        event.point.lat, event.point.lon, event.point.hae, event.point.ce, event.point.le,
    )
    .unwrap();
    if !event.detail.is_empty() {
        xml.push_str("<detail>");
        xml.push_str(&detail_children(&event.detail));
        xml.push_str("</detail>");
    }
    xml.push_str("</event>");
    xml
}

/// Renders the flattened detail map back into child elements.
///
/// Dotted keys regroup into one element per leading segment with the
/// remainder as attribute names; bare keys become text-only elements.
/// `BTreeMap` ordering keeps keys with a shared prefix adjacent, so each
/// element is emitted exactly once.
pub(crate) fn detail_children(detail: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let mut entries = detail.iter().peekable();
    while let Some((key, value)) = entries.next() {
        match key.split_once('.') {
            Some((elem, attr)) => {
                write!(out, r#"<{elem} {attr}="{value}""#).unwrap();
                while let Some((next_key, next_value)) = entries.peek() {
                    match next_key.split_once('.') {
                        Some((next_elem, next_attr)) if next_elem == elem => {
                            write!(out, r#" {next_attr}="{next_value}""#).unwrap();
                            entries.next();
                        }
                        _ => break,
                    }
                }
                out.push_str("/>");
            }
            None => {
                write!(out, "<{key}>{value}</{key}>").unwrap();
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Point;
    use chrono::Duration;

    fn sample_event() -> CotEvent {
        CotEvent::new(
            "VIKING1-20240115103000",
            "a-f-G-U-C",
            "m-g",
            Point::new(-27.4698, 153.0251, 0.0).with_accuracy(10.0, 25.0),
            Duration::seconds(300),
        )
    }

    #[test]
    fn serializes_declaration_and_attributes() {
        let xml = serialize_event(&sample_event());
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains(r#"uid="VIKING1-20240115103000""#));
        assert!(xml.contains(r#"type="a-f-G-U-C""#));
        assert!(xml.contains(r#"how="m-g""#));
        assert!(xml.contains(r#"lat="-27.4698""#));
        assert!(xml.contains(r#"ce="10""#));
        assert!(xml.ends_with("</event>"));
    }

    #[test]
    fn empty_detail_omits_the_element() {
        let xml = serialize_event(&sample_event());
        assert!(!xml.contains("<detail>"));
    }

    #[test]
    fn dotted_keys_regroup_into_one_element() {
        let event = sample_event()
            .with_detail("contact.callsign", "VIKING1")
            .with_detail("contact.endpoint", "*:-1:stcp");
        let xml = serialize_event(&event);
        assert!(xml.contains(r#"<contact callsign="VIKING1" endpoint="*:-1:stcp"/>"#));
        assert_eq!(xml.matches("<contact").count(), 1);
    }

    #[test]
    fn bare_keys_become_text_elements() {
        let event = sample_event().with_detail("peopleCount", "4");
        let xml = serialize_event(&event);
        assert!(xml.contains("<detail><peopleCount>4</peopleCount></detail>"));
    }

    #[test]
    fn timestamps_use_utc_z_suffix() {
        let xml = serialize_event(&sample_event());
        let time_attr = xml.split(r#"time=""#).nth(1).unwrap();
        let value = &time_attr[..time_attr.find('"').unwrap()];
        assert!(value.ends_with('Z'), "expected Z suffix, got {value}");
    }
}
