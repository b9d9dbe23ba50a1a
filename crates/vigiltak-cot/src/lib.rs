//! Cursor on Target event model and wire codecs.
//!
//! Features:
//! - CoT XML parsing with open-ended detail preserved as a flat map
//! - TAK Protocol Version 1 mesh and stream framing (hand-written prost
//!   messages, no protoc at build time)
//! - Format detection so one decode entry point serves every link type
//! - XML-first binary encoding with a reportable fallback when an event
//!   cannot be transcoded
//!
//! # Example
//!
//! ```
//! use vigiltak_cot::{decode, encode, CotEvent, Point, WireFormat};
//! use chrono::Duration;
//!
//! let event = CotEvent::new(
//!     "VIKING1-0001",
//!     "a-f-G-U-C",
//!     "m-g",
//!     Point::new(-27.4698, 153.0251, 0.0),
//!     Duration::seconds(300),
//! );
//! let frame = encode(&event, WireFormat::MeshBinary).unwrap();
//! let decoded = decode(&frame).unwrap();
//! assert_eq!(decoded.uid, "VIKING1-0001");
//! ```

pub mod event;
pub mod parser;
pub mod proto;
pub mod serializer;
pub mod validate;

pub use event::{CotEvent, Point, COT_VERSION, UNKNOWN_ACCURACY};
pub use parser::{
    decode, detect_wire_format, parse_mesh, parse_stream, parse_xml, read_varint, DecodeError,
    WireFormat, MESH_HEADER,
};
pub use proto::{encode, encode_mesh, encode_stream, event_to_tak_message, EncodeError};
pub use serializer::serialize_event;
pub use validate::{validate_event, validate_point, ValidationError};
