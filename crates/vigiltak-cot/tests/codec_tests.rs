//! End-to-end codec coverage: real ATAK-shaped documents through every
//! framing, plus the transcode fallback path.

use chrono::Duration;
use vigiltak_cot::{
    decode, encode, encode_mesh, encode_stream, parse_xml, serialize_event, CotEvent, EncodeError,
    Point, WireFormat, MESH_HEADER, UNKNOWN_ACCURACY,
};

const ATAK_POSITION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<event version="2.0" uid="ANDROID-789e4508d2f01f82" type="a-f-G-U-C" time="2024-01-15T10:30:00.000Z" start="2024-01-15T10:30:00.000Z" stale="2024-01-15T10:36:15.000Z" how="h-g-i-g-o">
  <point lat="-27.4698" lon="153.0251" hae="23.7" ce="11.2" le="9999999.0"/>
  <detail>
    <contact endpoint="*:-1:stcp" callsign="VIKING1"/>
    <__group name="Alpha" role="Team Lead"/>
    <takv device="SAMSUNG SM-G781B" platform="ATAK-CIV" os="30" version="4.10.0"/>
    <track speed="1.2" course="254.7"/>
    <status battery="78"/>
    <precisionlocation geopointsrc="GPS" altsrc="GPS"/>
  </detail>
</event>"#;

#[test]
fn parses_full_atak_position_report() {
    let event = parse_xml(ATAK_POSITION.as_bytes()).unwrap();
    assert_eq!(event.uid, "ANDROID-789e4508d2f01f82");
    assert_eq!(event.event_type, "a-f-G-U-C");
    assert_eq!(event.how, "h-g-i-g-o");
    assert_eq!(event.point.lat, -27.4698);
    assert_eq!(event.point.hae, 23.7);
    assert_eq!(event.callsign(), Some("VIKING1"));
    assert_eq!(event.group_name(), Some("Alpha"));
    assert_eq!(event.detail["takv.platform"], "ATAK-CIV");
    assert_eq!(event.detail["track.course"], "254.7");
    assert_eq!(event.detail["status.battery"], "78");
    assert_eq!(event.detail["precisionlocation.geopointsrc"], "GPS");
}

#[test]
fn mesh_round_trip_preserves_identity_and_position() {
    let original = parse_xml(ATAK_POSITION.as_bytes()).unwrap();
    let frame = encode_mesh(&original).unwrap();
    assert_eq!(&frame[..MESH_HEADER.len()], MESH_HEADER);

    let decoded = decode(&frame).unwrap();
    assert_eq!(decoded.uid, original.uid);
    assert_eq!(decoded.event_type, original.event_type);
    assert_eq!(decoded.how, original.how);
    assert_eq!(decoded.point.lat, original.point.lat);
    assert_eq!(decoded.point.lon, original.point.lon);
    assert_eq!(decoded.stale_millis(), original.stale_millis());
    assert_eq!(decoded.callsign(), Some("VIKING1"));
    assert_eq!(decoded.group_name(), Some("Alpha"));
}

#[test]
fn stream_round_trip_preserves_identity() {
    let original = parse_xml(ATAK_POSITION.as_bytes()).unwrap();
    let frame = encode_stream(&original).unwrap();
    // No magic header on stream frames.
    assert_ne!(&frame[..3], MESH_HEADER);

    let decoded = decode(&frame).unwrap();
    assert_eq!(decoded.uid, original.uid);
    assert_eq!(decoded.time_millis(), original.time_millis());
}

#[test]
fn unstructured_detail_survives_binary_transit() {
    let event = CotEvent::new(
        "SENSOR-7",
        "b-m-p-s-p-loc",
        "m-g",
        Point::new(-27.3, 152.9, 26.0).with_accuracy(999.99, 999999.99),
        Duration::seconds(5),
    )
    .with_detail("peopleCount", "4")
    .with_detail("hostiles", "2")
    .with_detail("weaponsDetected", "true");

    let decoded = decode(&encode_mesh(&event).unwrap()).unwrap();
    assert_eq!(decoded.detail["peopleCount"], "4");
    assert_eq!(decoded.detail["hostiles"], "2");
    assert_eq!(decoded.detail["weaponsDetected"], "true");
}

#[test]
fn xml_encode_decode_round_trip() {
    let original = parse_xml(ATAK_POSITION.as_bytes()).unwrap();
    let bytes = encode(&original, WireFormat::Xml).unwrap();
    let xml = String::from_utf8(bytes).unwrap();
    assert!(xml.starts_with("<?xml"));

    let reparsed = decode(xml.as_bytes()).unwrap();
    assert_eq!(reparsed, original);
}

#[test]
fn binary_float_zero_accuracy_comes_back_unknown() {
    // A sender that never set ce/le leaves proto3 zeros on the wire.
    let mut event = parse_xml(ATAK_POSITION.as_bytes()).unwrap();
    event.point.ce = 0.0;
    event.point.le = 0.0;
    let decoded = decode(&encode_stream(&event).unwrap()).unwrap();
    assert_eq!(decoded.point.ce, UNKNOWN_ACCURACY);
    assert_eq!(decoded.point.le, UNKNOWN_ACCURACY);
}

#[test]
fn markup_in_detail_value_fails_transcode() {
    let event = CotEvent::new(
        "TEST-1",
        "a-f-G",
        "m-g",
        Point::new(0.0, 0.0, 0.0),
        Duration::seconds(60),
    )
    .with_detail("remarks", "ceiling<5m");

    // XML form still serializes; the binary transcode reports the failure
    // so a caller can fall back to sending XML.
    assert!(serialize_event(&event).contains("ceiling<5m"));
    assert!(matches!(
        encode_mesh(&event),
        Err(EncodeError::Transcode(_))
    ));
    assert!(matches!(
        encode(&event, WireFormat::StreamBinary),
        Err(EncodeError::Transcode(_))
    ));
}

#[test]
fn serialize_then_parse_is_stable_for_detail_maps() {
    let event = CotEvent::new(
        "VIKING1-X",
        "b-t-f",
        "h-e",
        Point::new(-27.4698, 153.0251, 0.0).with_accuracy(10.0, 10.0),
        Duration::seconds(20),
    )
    .with_detail("contact.callsign", "VIKING1")
    .with_detail("__group.name", "Alpha")
    .with_detail("remarks", "two vehicles stopped");

    let reparsed = parse_xml(serialize_event(&event).as_bytes()).unwrap();
    assert_eq!(reparsed.detail, event.detail);
}
